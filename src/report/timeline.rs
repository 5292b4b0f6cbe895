use anyhow::Result;

use super::ReportContext;
use crate::category::Status;
use crate::export::ArtifactWriter;
use crate::render::plotly::{self, Figure};
use crate::source::{StudyScope, UpcomingQuery};
use crate::window::{extract_events, monthly_timeline, EventKind, TimelineRow};

const REPORT: &str = "timeline";
const TITLE: &str = "Upcoming trial events per month";

pub fn timeline_figure(rows: &[TimelineRow]) -> Figure {
    let months: Vec<String> = rows.iter().map(|r| r.month.format("%Y-%m-%d").to_string()).collect();
    let series: Vec<(&str, Vec<u64>)> = EventKind::ALL
        .iter()
        .map(|kind| (kind.series_name(), rows.iter().map(|r| r.get(*kind)).collect()))
        .collect();
    Figure::monthly_lines(&months, &series, "Event", "Trials per month")
}

pub async fn build(ctx: &ReportContext<'_>, out: &mut ArtifactWriter) -> Result<()> {
    let window = ctx.window(ctx.config.timeline_horizon_months)?;
    let records = ctx
        .source
        .upcoming_studies(UpcomingQuery {
            scope: StudyScope::Interventional,
            window: &window,
            statuses: Status::ACTIVE,
            with_aux: false,
        })
        .await?;
    let events = extract_events(&records, &window);
    let rows = monthly_timeline(&events, &window);

    out.write_json(REPORT, "timeline_upcoming.json", &rows)?;
    let figure = timeline_figure(&rows);
    out.write_html(REPORT, "timeline_upcoming.html", TITLE, &plotly::page(TITLE, &figure))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::Window;
    use chrono::NaiveDate;
    use serde_json::json;

    #[test]
    fn figure_has_one_line_per_kind() {
        let window = Window::new(NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(), 2).unwrap();
        let rows = monthly_timeline(&[], &window);
        let fig = timeline_figure(&rows);
        assert_eq!(fig.data.len(), 3);
        assert_eq!(fig.data[0]["name"], "starts");
        assert_eq!(fig.data[2]["name"], "completions");
        assert_eq!(fig.data[1]["x"], json!(["2024-01-01", "2024-02-01", "2024-03-01"]));
        assert_eq!(fig.data[1]["y"], json!([0, 0, 0]));
    }
}
