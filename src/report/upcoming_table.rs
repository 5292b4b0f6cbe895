//! Upcoming trial events in the next few months, as CSV plus a DataTables
//! page. The `WithCharts` variant adds filter-aware client-side charts.

use anyhow::Result;
use chrono::NaiveDate;
use serde::Serialize;

use super::ReportContext;
use crate::category::{Category, Phase, Status};
use crate::export::ArtifactWriter;
use crate::logging::{log, obj, v_str, Domain, Level};
use crate::render::table::{self, ChartOptions, DataTable};
use crate::render::thousands;
use crate::source::{StudyScope, UpcomingQuery};
use crate::trial::{truncate_chars, TITLE_MAX_CHARS};
use crate::window::{extract_events, EventKind, UpcomingEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    Compact,
    WithCharts,
}

impl Variant {
    fn report(self) -> &'static str {
        match self {
            Variant::Compact => "upcoming-table",
            Variant::WithCharts => "upcoming-graph",
        }
    }

    pub fn csv_name(self, months: u32) -> String {
        match self {
            Variant::Compact => format!("upcoming_trials_next{}m_sorted_smaller.csv", months),
            Variant::WithCharts => format!("upcoming_trials_next{}m_sorted.csv", months),
        }
    }

    pub fn html_name(self, months: u32) -> String {
        match self {
            Variant::Compact => format!("upcoming_trials_next{}m_smaller.html", months),
            Variant::WithCharts => format!("upcoming_trials_next{}m_graph.html", months),
        }
    }
}

pub const COLUMNS: [&str; 14] = [
    "event_date",
    "event_type",
    "event_date_type",
    "nct_id",
    "title",
    "phase_std",
    "status",
    "enrollment",
    "enrollment_type",
    "lead_sponsor",
    "intervention_types",
    "interventions",
    "conditions",
    "last_update_posted_date",
];

/// One event row. Field order matches [`COLUMNS`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpcomingRow {
    pub event_date: NaiveDate,
    pub event_type: EventKind,
    pub event_date_type: String,
    pub nct_id: String,
    pub title: Option<String>,
    pub phase_std: Phase,
    pub status: Status,
    pub enrollment: Option<i64>,
    pub enrollment_type: Option<String>,
    pub lead_sponsor: Option<String>,
    pub intervention_types: Option<String>,
    pub interventions: Option<String>,
    pub conditions: Option<String>,
    pub last_update_posted_date: Option<NaiveDate>,
}

impl UpcomingRow {
    pub fn from_event(event: &UpcomingEvent<'_>) -> Self {
        let r = event.record;
        Self {
            event_date: event.date,
            event_type: event.kind,
            event_date_type: event.date_type.clone(),
            nct_id: r.nct_id.clone(),
            title: r.title.as_deref().map(|t| truncate_chars(t, TITLE_MAX_CHARS)),
            phase_std: r.phase(),
            status: r.status(),
            enrollment: r.enrollment,
            enrollment_type: r.enrollment_type.clone(),
            lead_sponsor: r.lead_sponsor.clone(),
            intervention_types: r.intervention_types.clone(),
            interventions: r.interventions.clone(),
            conditions: r.conditions.clone(),
            last_update_posted_date: r.last_update_posted_date,
        }
    }

    /// Display cells, enrollment with thousands separators.
    pub fn cells(&self) -> Vec<String> {
        let opt = |v: &Option<String>| v.clone().unwrap_or_default();
        vec![
            self.event_date.to_string(),
            self.event_type.as_str().to_string(),
            self.event_date_type.clone(),
            self.nct_id.clone(),
            opt(&self.title),
            self.phase_std.label().to_string(),
            self.status.label().to_string(),
            self.enrollment.map(thousands).unwrap_or_default(),
            opt(&self.enrollment_type),
            opt(&self.lead_sponsor),
            opt(&self.intervention_types),
            opt(&self.interventions),
            opt(&self.conditions),
            self.last_update_posted_date.map(|d| d.to_string()).unwrap_or_default(),
        ]
    }
}

pub fn data_table(rows: &[UpcomingRow]) -> DataTable {
    DataTable {
        columns: COLUMNS.iter().map(|c| c.to_string()).collect(),
        rows: rows.iter().map(UpcomingRow::cells).collect(),
    }
}

pub async fn build(ctx: &ReportContext<'_>, out: &mut ArtifactWriter, variant: Variant) -> Result<()> {
    let report = variant.report();
    let months = ctx.config.table_horizon_months;
    let window = ctx.window(months)?;
    let records = ctx
        .source
        .upcoming_studies(UpcomingQuery {
            scope: StudyScope::Interventional,
            window: &window,
            statuses: Status::ACTIVE,
            with_aux: true,
        })
        .await?;
    let rows: Vec<UpcomingRow> = extract_events(&records, &window)
        .iter()
        .map(UpcomingRow::from_event)
        .collect();
    log(
        Level::Debug,
        Domain::Aggregate,
        "events",
        obj(&[
            ("report", v_str(report)),
            ("studies", serde_json::json!(records.len())),
            ("events", serde_json::json!(rows.len())),
            ("window_end", v_str(&window.end().to_string())),
        ]),
    );

    out.write_csv(report, &variant.csv_name(months), &COLUMNS, &rows)?;

    let charts = match variant {
        Variant::Compact => None,
        Variant::WithCharts => Some(ChartOptions {
            top_sponsors: ctx.config.top_sponsors,
            top_interventions: ctx.config.top_interventions,
            phase_order: Phase::fixed_labels(),
            status_order: Status::fixed_labels(),
        }),
    };
    let title = format!("Upcoming trial events, next {} months", months);
    let html = table::page(&title, &data_table(&rows), ctx.config.table_font_px, charts.as_ref());
    out.write_html(report, &variant.html_name(months), &title, &html)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trial::TrialRecord;

    fn event_row() -> UpcomingRow {
        let record = TrialRecord {
            nct_id: "NCT1".into(),
            title: Some("t".repeat(200)),
            phase_raw: Some("PHASE1/PHASE2".into()),
            status_raw: Some("Recruiting".into()),
            enrollment: Some(12500),
            ..Default::default()
        };
        let event = UpcomingEvent {
            date: NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
            kind: EventKind::PrimaryCompletion,
            date_type: "ESTIMATED".into(),
            record: &record,
        };
        UpcomingRow::from_event(&event)
    }

    #[test]
    fn row_normalizes_and_truncates() {
        let row = event_row();
        assert_eq!(row.title.as_deref().map(|t| t.chars().count()), Some(180));
        assert_eq!(row.phase_std, Phase::Phase1_2);
        assert_eq!(row.status, Status::Recruiting);
    }

    #[test]
    fn cells_line_up_with_columns() {
        let cells = event_row().cells();
        assert_eq!(cells.len(), COLUMNS.len());
        assert_eq!(cells[0], "2024-02-01");
        assert_eq!(cells[1], "PRIMARY_COMPLETION");
        assert_eq!(cells[5], "Phase 1/2");
        assert_eq!(cells[6], "RECRUITING");
        assert_eq!(cells[7], "12,500");
        assert_eq!(cells[13], "");
    }

    #[test]
    fn file_names_follow_horizon() {
        assert_eq!(Variant::Compact.csv_name(3), "upcoming_trials_next3m_sorted_smaller.csv");
        assert_eq!(Variant::Compact.html_name(3), "upcoming_trials_next3m_smaller.html");
        assert_eq!(Variant::WithCharts.csv_name(6), "upcoming_trials_next6m_sorted.csv");
        assert_eq!(Variant::WithCharts.html_name(6), "upcoming_trials_next6m_graph.html");
    }
}
