//! Interventional studies, phase x status heatmap.

use anyhow::Result;

use super::{phase_status_table, ReportContext};
use crate::category::{Category, Phase, Status};
use crate::export::ArtifactWriter;
use crate::logging::{log, obj, v_num, v_str, Domain, Level};
use crate::pivot::Pivot;
use crate::render::plotly::{self, Figure};
use crate::source::StudyScope;

const REPORT: &str = "phase-status";
const TITLE: &str = "All Interventional Trials · Phase × Status (ordered lifecycle)";

/// Color scale ceiling: the 95th percentile of cell counts, floored. None
/// when the table is all zero so the scale falls back to the data range.
pub fn color_cap(pivot: &Pivot) -> Option<f64> {
    let q = pivot.quantile(0.95)?;
    if q <= 0.0 {
        return None;
    }
    Some(q.floor())
}

pub async fn build(ctx: &ReportContext<'_>, out: &mut ArtifactWriter) -> Result<()> {
    let raw = ctx.source.phase_status_counts(StudyScope::Interventional).await?;
    let table = phase_status_table(REPORT, &raw);
    let pivot = Pivot::build(&table, &Phase::fixed_labels(), &Status::fixed_labels());
    let zmax = color_cap(&pivot);
    log(
        Level::Debug,
        Domain::Aggregate,
        "heatmap",
        obj(&[
            ("report", v_str(REPORT)),
            ("total", serde_json::json!(pivot.total())),
            ("zmax", zmax.map(v_num).unwrap_or(serde_json::Value::Null)),
        ]),
    );
    let figure = Figure::heatmap(&pivot, zmax, TITLE, "Phase");
    out.write_html(REPORT, "phase_status_all.html", TITLE, &plotly::page(TITLE, &figure))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pivot::CountTable;

    #[test]
    fn cap_is_floored_95th_percentile() {
        // 20 cells: 0..=19, p95 position 18.05 -> 18.05, floored to 18.
        let counts: CountTable = (0..20u64).map(|i| (format!("r{}", i), "c", i)).collect();
        let pivot = Pivot::build(&counts, &[], &["c"]);
        assert_eq!(color_cap(&pivot), Some(18.0));
    }

    #[test]
    fn all_zero_table_has_no_cap() {
        let pivot = Pivot::build(&CountTable::new(), &Phase::fixed_labels(), &Status::fixed_labels());
        assert_eq!(pivot.total(), 0);
        assert_eq!(color_cap(&pivot), None);
    }
}
