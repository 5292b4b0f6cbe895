//! Report pipelines.
//!
//! Each report is a linear job over one source: query, normalize, pivot,
//! render, write. Reports share the run's as-of timestamp and writer.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};

use crate::category::{Category, Phase, Status};
use crate::config::Config;
use crate::export::{ArtifactWriter, Manifest};
use crate::logging::{log, log_unmapped, obj, v_str, Domain, Level, ProfileScope};
use crate::pivot::CountTable;
use crate::source::{self, RawPhaseStatusCount, TrialSource};
use crate::window::Window;

pub mod dashboard;
pub mod phase_status;
pub mod timeline;
pub mod upcoming_bars;
pub mod upcoming_table;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, clap::ValueEnum)]
pub enum ReportKind {
    Dashboard,
    PhaseStatus,
    UpcomingBars,
    Timeline,
    UpcomingTable,
    UpcomingGraph,
    /// Every report above.
    All,
}

impl ReportKind {
    pub const EVERY: [ReportKind; 6] = [
        ReportKind::Dashboard,
        ReportKind::PhaseStatus,
        ReportKind::UpcomingBars,
        ReportKind::Timeline,
        ReportKind::UpcomingTable,
        ReportKind::UpcomingGraph,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ReportKind::Dashboard => "dashboard",
            ReportKind::PhaseStatus => "phase-status",
            ReportKind::UpcomingBars => "upcoming-bars",
            ReportKind::Timeline => "timeline",
            ReportKind::UpcomingTable => "upcoming-table",
            ReportKind::UpcomingGraph => "upcoming-graph",
            ReportKind::All => "all",
        }
    }
}

/// Resolve `all` and duplicates into a run order. Empty selects everything.
pub fn expand(kinds: &[ReportKind]) -> Vec<ReportKind> {
    if kinds.is_empty() || kinds.contains(&ReportKind::All) {
        return ReportKind::EVERY.to_vec();
    }
    ReportKind::EVERY
        .iter()
        .copied()
        .filter(|k| kinds.contains(k))
        .collect()
}

/// What every report sees.
pub struct ReportContext<'a> {
    pub config: &'a Config,
    pub source: &'a dyn TrialSource,
    pub as_of: DateTime<Utc>,
}

impl ReportContext<'_> {
    /// The as-of date, start of every window.
    pub fn today(&self) -> NaiveDate {
        self.as_of.date_naive()
    }

    pub fn window(&self, months: u32) -> Result<Window> {
        Window::new(self.today(), months)
    }
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub reports: Vec<ReportKind>,
    pub manifest: Manifest,
}

/// Connect to the configured source and build the selected reports.
pub async fn run(config: &Config, kinds: &[ReportKind]) -> Result<RunSummary> {
    let source = source::connect(&config.source).await?;
    run_with_source(config, source.as_ref(), kinds).await
}

pub async fn run_with_source(
    config: &Config,
    source: &dyn TrialSource,
    kinds: &[ReportKind],
) -> Result<RunSummary> {
    let as_of = source.as_of().await.context("failed to read as-of timestamp")?;
    log(
        Level::Info,
        Domain::Source,
        "as_of",
        obj(&[("source", v_str(&source.describe())), ("as_of", v_str(&as_of.to_rfc3339()))]),
    );
    let mut out = ArtifactWriter::new(&config.out_dir, as_of)?;
    let ctx = ReportContext { config, source, as_of };
    let reports = expand(kinds);
    for kind in &reports {
        let _scope = ProfileScope::with_context("report", &[("report", v_str(kind.name()))]);
        build(*kind, &ctx, &mut out)
            .await
            .with_context(|| format!("report {} failed", kind.name()))?;
    }
    let manifest = out.finish()?;
    Ok(RunSummary { reports, manifest })
}

async fn build(kind: ReportKind, ctx: &ReportContext<'_>, out: &mut ArtifactWriter) -> Result<()> {
    match kind {
        ReportKind::Dashboard => dashboard::build(ctx, out).await,
        ReportKind::PhaseStatus => phase_status::build(ctx, out).await,
        ReportKind::UpcomingBars => upcoming_bars::build(ctx, out).await,
        ReportKind::Timeline => timeline::build(ctx, out).await,
        ReportKind::UpcomingTable => upcoming_table::build(ctx, out, upcoming_table::Variant::Compact).await,
        ReportKind::UpcomingGraph => upcoming_table::build(ctx, out, upcoming_table::Variant::WithCharts).await,
        ReportKind::All => Ok(()),
    }
}

/// Normalize raw (phase, status) counts into a phase x status count table.
pub(crate) fn phase_status_table(report: &str, counts: &[RawPhaseStatusCount]) -> CountTable {
    let mut table = CountTable::new();
    let (mut unknown_phase, mut unknown_status) = (0, 0);
    for c in counts {
        let phase = Phase::normalize(c.phase.as_deref());
        let status = Status::normalize(c.status.as_deref());
        if phase == Phase::Unknown {
            unknown_phase += c.n;
        }
        if status == Status::Unknown {
            unknown_status += c.n;
        }
        table.add(phase.label(), status.label(), c.n);
    }
    log_unmapped(report, "phase", unknown_phase, table.total());
    log_unmapped(report, "status", unknown_status, table.total());
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_resolves_all_and_orders() {
        assert_eq!(expand(&[]), ReportKind::EVERY.to_vec());
        assert_eq!(expand(&[ReportKind::Timeline, ReportKind::All]), ReportKind::EVERY.to_vec());
        assert_eq!(
            expand(&[ReportKind::UpcomingGraph, ReportKind::Dashboard, ReportKind::UpcomingGraph]),
            vec![ReportKind::Dashboard, ReportKind::UpcomingGraph]
        );
    }

    #[test]
    fn cli_names_match() {
        use clap::ValueEnum;
        for kind in ReportKind::value_variants() {
            let value = kind.to_possible_value().unwrap();
            assert_eq!(value.get_name(), kind.name());
        }
    }

    #[test]
    fn phase_status_table_normalizes_and_sums() {
        let raw = |p: Option<&str>, s: Option<&str>, n| RawPhaseStatusCount {
            phase: p.map(String::from),
            status: s.map(String::from),
            n,
        };
        let table = phase_status_table(
            "test",
            &[
                raw(Some("PHASE2"), Some("RECRUITING"), 3),
                raw(Some("Phase 2"), Some("Recruiting"), 2),
                raw(None, Some("WITHHELD"), 1),
            ],
        );
        assert_eq!(table.get("Phase 2", "RECRUITING"), 5);
        assert_eq!(table.get("Unknown", "UNKNOWN"), 1);
        assert_eq!(table.total(), 6);
    }
}
