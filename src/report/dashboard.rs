//! Registry-wide dashboard feeds: phase counts, phase x status cells,
//! upcoming primary completions and the lead-sponsor pipeline.

use anyhow::Result;
use chrono::NaiveDate;
use serde::Serialize;

use super::{phase_status_table, ReportContext};
use crate::category::{Category, Phase, Status};
use crate::export::ArtifactWriter;
use crate::logging::{log, obj, v_str, Domain, Level};
use crate::pivot::{top_n, CountTable, OrderedCounts, Pivot};
use crate::render::plotly::{self, Figure};
use crate::source::{StudyScope, UpcomingQuery};
use crate::trial::truncate_chars;
use crate::window::{extract_events_of, EventKind};

const REPORT: &str = "dashboard";
pub const UPCOMING_TITLE_MAX_CHARS: usize = 120;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseCount {
    pub phase_std: String,
    pub n: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseStatusCount {
    pub phase_std: String,
    pub status: String,
    pub n: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpcomingCompletion {
    pub nct_id: String,
    pub title: Option<String>,
    pub phase_std: Phase,
    pub overall_status: Status,
    pub primary_completion_date: NaiveDate,
    pub primary_completion_date_type: String,
    pub lead_sponsor: Option<String>,
    pub enrollment: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SponsorPhaseCount {
    pub sponsor_name: String,
    pub phase_std: String,
    pub n: u64,
}

pub async fn build(ctx: &ReportContext<'_>, out: &mut ArtifactWriter) -> Result<()> {
    // Phase and phase x status over every study.
    let raw = ctx.source.phase_status_counts(StudyScope::All).await?;
    let table = phase_status_table(REPORT, &raw);
    let pivot = Pivot::build(&table, &Phase::fixed_labels(), &Status::fixed_labels());

    let phase_counts = counts_by_phase(&table);
    let rows: Vec<PhaseCount> = phase_counts
        .iter()
        .map(|(phase, n)| PhaseCount { phase_std: phase.to_string(), n })
        .collect();
    out.write_json(REPORT, "counts_by_phase.json", &rows)?;

    let cells: Vec<PhaseStatusCount> = pivot
        .melt()
        .into_iter()
        .map(|c| PhaseStatusCount { phase_std: c.row, status: c.column, n: c.n })
        .collect();
    out.write_json(REPORT, "phase_status.json", &cells)?;

    // Primary completions of active studies inside the horizon.
    let window = ctx.window(ctx.config.dashboard_horizon_months)?;
    let records = ctx
        .source
        .upcoming_studies(UpcomingQuery {
            scope: StudyScope::All,
            window: &window,
            statuses: Status::ACTIVE,
            with_aux: false,
        })
        .await?;
    let upcoming: Vec<UpcomingCompletion> =
        extract_events_of(&records, &window, &[EventKind::PrimaryCompletion])
            .into_iter()
            .map(|e| UpcomingCompletion {
                nct_id: e.record.nct_id.clone(),
                title: e.record.title.as_deref().map(|t| truncate_chars(t, UPCOMING_TITLE_MAX_CHARS)),
                phase_std: e.record.phase(),
                overall_status: e.record.status(),
                primary_completion_date: e.date,
                primary_completion_date_type: e.date_type,
                lead_sponsor: e.record.lead_sponsor.clone(),
                enrollment: e.record.enrollment,
            })
            .collect();
    out.write_json(REPORT, "upcoming_12m.json", &upcoming)?;

    // Lead-sponsor pipeline.
    let sponsor_counts: CountTable = ctx
        .source
        .sponsor_phase_counts()
        .await?
        .into_iter()
        .map(|c| (c.sponsor, Phase::normalize(c.phase.as_deref()).label(), c.n))
        .collect();
    let pipeline = sponsor_pipeline(&sponsor_counts, ctx.config.sponsor_pipeline_top);
    log(
        Level::Debug,
        Domain::Aggregate,
        "sponsor_pipeline",
        obj(&[
            ("report", v_str(REPORT)),
            ("sponsors", serde_json::json!(sponsor_counts.row_totals().len())),
            ("rows", serde_json::json!(pipeline.len())),
        ]),
    );
    out.write_json(REPORT, "sponsor_pipeline_top50.json", &pipeline)?;

    let title = "ClinicalTrials.gov · Trials by Phase";
    let figure = Figure::bar(&phase_counts, "Phase", "Number of Trials", Some(title));
    out.write_html(REPORT, "counts_by_phase.html", title, &plotly::page(title, &figure))?;
    Ok(())
}

/// Per-phase totals in fixed phase order, zero-filled.
pub fn counts_by_phase(table: &CountTable) -> OrderedCounts {
    let totals = table.row_totals();
    OrderedCounts::build(totals.iter().map(|(p, n)| (p.as_str(), *n)), &Phase::fixed_labels())
}

/// Sponsor x phase counts for the `top` sponsors by study count, ordered by
/// sponsor name, then phase order. Only non-zero cells.
pub fn sponsor_pipeline(counts: &CountTable, top: usize) -> Vec<SponsorPhaseCount> {
    let mut sponsors: Vec<String> = top_n(&counts.row_totals(), top)
        .into_iter()
        .map(|(s, _)| s)
        .collect();
    sponsors.sort();
    let mut rows = Vec::new();
    for sponsor in &sponsors {
        for phase in Phase::ORDER {
            let n = counts.get(sponsor, phase.label());
            if n > 0 {
                rows.push(SponsorPhaseCount {
                    sponsor_name: sponsor.clone(),
                    phase_std: phase.label().to_string(),
                    n,
                });
            }
        }
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_by_phase_is_zero_filled_in_order() {
        let table: CountTable = vec![
            ("Phase 3", "RECRUITING", 2u64),
            ("Phase 1", "COMPLETED", 1),
            ("Phase 3", "COMPLETED", 4),
        ]
        .into_iter()
        .collect();
        let counts = counts_by_phase(&table);
        assert_eq!(counts.categories, Phase::fixed_labels());
        assert_eq!(counts.counts, vec![0, 1, 0, 0, 0, 6, 0, 0, 0]);
    }

    #[test]
    fn pipeline_keeps_top_sponsors_by_name() {
        let table: CountTable = vec![
            ("Zeta", "Phase 2", 5u64),
            ("Alpha", "Phase 1", 1),
            ("Beta", "Phase 3", 2),
            ("Beta", "Phase 1", 2),
            ("Zeta", "Unknown", 1),
        ]
        .into_iter()
        .collect();
        let rows = sponsor_pipeline(&table, 2);
        let got: Vec<(&str, &str, u64)> = rows
            .iter()
            .map(|r| (r.sponsor_name.as_str(), r.phase_std.as_str(), r.n))
            .collect();
        assert_eq!(
            got,
            vec![
                ("Beta", "Phase 1", 2),
                ("Beta", "Phase 3", 2),
                ("Zeta", "Phase 2", 5),
                ("Zeta", "Unknown", 1),
            ]
        );
    }

    #[test]
    fn pipeline_of_nothing_is_empty() {
        assert!(sponsor_pipeline(&CountTable::new(), 50).is_empty());
    }
}
