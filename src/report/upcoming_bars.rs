//! Interventional active studies with a date in the horizon, one stacked
//! phase x status bar page per date field.

use anyhow::Result;

use super::ReportContext;
use crate::category::{Category, Phase, Status};
use crate::export::ArtifactWriter;
use crate::pivot::{CountTable, Pivot};
use crate::render::plotly::{self, Figure};
use crate::source::{StudyScope, UpcomingQuery};
use crate::window::{extract_events_of, EventKind, UpcomingEvent};

const REPORT: &str = "upcoming-bars";

pub const STATUS_COLORS: [(&str, &str); 4] = [
    ("NOT_YET_RECRUITING", "#deebf7"),
    ("RECRUITING", "#9ecae1"),
    ("ENROLLING_BY_INVITATION", "#6baed6"),
    ("ACTIVE_NOT_RECRUITING", "#2171b5"),
];

pub fn artifact_name(kind: EventKind) -> &'static str {
    match kind {
        EventKind::Start => "upcoming_starts_bars.html",
        EventKind::PrimaryCompletion => "upcoming_primary_bars.html",
        EventKind::Completion => "upcoming_completion_bars.html",
    }
}

fn page_title(kind: EventKind, months: u32) -> String {
    let what = match kind {
        EventKind::Start => "Starts",
        EventKind::PrimaryCompletion => "Primary completions",
        EventKind::Completion => "Completions",
    };
    format!("{} in the next {} months · Phase × Status", what, months)
}

/// Phase x active-status counts of the given events.
pub fn phase_by_status(events: &[UpcomingEvent<'_>]) -> Pivot {
    let counts: CountTable = events
        .iter()
        .map(|e| (e.record.phase().label(), e.record.status().label(), 1u64))
        .collect();
    let active: Vec<&str> = Status::ACTIVE.iter().map(|s| s.label()).collect();
    Pivot::build(&counts, &Phase::fixed_labels(), &active)
}

pub async fn build(ctx: &ReportContext<'_>, out: &mut ArtifactWriter) -> Result<()> {
    let months = ctx.config.upcoming_horizon_months;
    let window = ctx.window(months)?;
    let records = ctx
        .source
        .upcoming_studies(UpcomingQuery {
            scope: StudyScope::Interventional,
            window: &window,
            statuses: Status::ACTIVE,
            with_aux: false,
        })
        .await?;

    for kind in EventKind::ALL {
        let name = artifact_name(kind);
        let events = extract_events_of(&records, &window, &[kind]);
        if events.is_empty() {
            out.skip(REPORT, name, &format!("no {} dates in window", kind.as_str()));
            continue;
        }
        let pivot = phase_by_status(&events);
        let figure = Figure::stacked_bars(
            &pivot,
            &STATUS_COLORS,
            "Phase",
            &format!("Trials (next {} months)", months),
            "Status",
        );
        let title = page_title(kind, months);
        out.write_html(REPORT, name, &title, &plotly::page(&title, &figure))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trial::TrialRecord;
    use crate::window::Window;
    use chrono::NaiveDate;

    #[test]
    fn colors_cover_the_active_statuses() {
        let active: Vec<&str> = Status::ACTIVE.iter().map(|s| s.label()).collect();
        let colored: Vec<&str> = STATUS_COLORS.iter().map(|(s, _)| *s).collect();
        assert_eq!(active, colored);
    }

    #[test]
    fn pivot_is_phase_by_active_status() {
        let day = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        let rec = |id: &str, phase: &str, status: &str| TrialRecord {
            nct_id: id.into(),
            phase_raw: Some(phase.into()),
            status_raw: Some(status.into()),
            start_date: Some(day),
            ..Default::default()
        };
        let records = vec![
            rec("NCT1", "PHASE2", "RECRUITING"),
            rec("NCT2", "Phase 2", "Recruiting"),
            rec("NCT3", "PHASE3", "NOT_YET_RECRUITING"),
        ];
        let window = Window::new(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), 12).unwrap();
        let events = extract_events_of(&records, &window, &[EventKind::Start]);
        let pivot = phase_by_status(&events);
        assert_eq!(pivot.rows.len(), 9);
        assert_eq!(pivot.columns.len(), 4);
        assert_eq!(pivot.get("Phase 2", "RECRUITING"), 2);
        assert_eq!(pivot.row_totals()[5], 1);
        assert_eq!(pivot.total(), 3);
    }
}
