//! Plotly.js figures as JSON, and the page that draws one.

use serde_json::{json, Value};

use super::{escape, script_json};
use crate::pivot::{OrderedCounts, Pivot};

const PLOTLY_CDN: &str = "https://cdn.plot.ly/plotly-2.35.2.min.js";

#[derive(Debug, Clone, PartialEq)]
pub struct Figure {
    pub data: Vec<Value>,
    pub layout: Value,
}

fn base_layout() -> Value {
    json!({
        "template": "plotly_white",
        "plot_bgcolor": "white",
        "paper_bgcolor": "white",
        "margin": { "l": 60, "r": 20, "t": 10, "b": 60 },
    })
}

fn merge(mut base: Value, extra: Value) -> Value {
    if let (Some(base), Value::Object(extra)) = (base.as_object_mut(), extra) {
        for (k, v) in extra {
            base.insert(k, v);
        }
    }
    base
}

impl Figure {
    /// One bar per category.
    pub fn bar(counts: &OrderedCounts, x_title: &str, y_title: &str, title: Option<&str>) -> Self {
        let mut layout = merge(
            base_layout(),
            json!({
                "xaxis": { "title": { "text": x_title } },
                "yaxis": { "title": { "text": y_title }, "rangemode": "tozero" },
            }),
        );
        if let Some(title) = title {
            layout = merge(layout, json!({ "title": { "text": title }, "margin": { "l": 60, "r": 20, "t": 60, "b": 60 } }));
        }
        Self {
            data: vec![json!({
                "type": "bar",
                "x": counts.categories,
                "y": counts.counts,
            })],
            layout,
        }
    }

    /// Rows on the x axis, one stacked trace per column, totals above each stack.
    pub fn stacked_bars(pivot: &Pivot, colors: &[(&str, &str)], x_title: &str, y_title: &str, legend: &str) -> Self {
        let mut data: Vec<Value> = pivot
            .columns
            .iter()
            .enumerate()
            .map(|(c, column)| {
                let mut trace = json!({
                    "type": "bar",
                    "name": column,
                    "x": pivot.rows,
                    "y": pivot.column_series(c),
                });
                if let Some((_, color)) = colors.iter().find(|(name, _)| name == column) {
                    trace["marker"] = json!({ "color": color });
                }
                trace
            })
            .collect();
        let totals = pivot.row_totals();
        let labels: Vec<String> = totals.iter().map(|t| super::thousands(*t as i64)).collect();
        data.push(json!({
            "type": "scatter",
            "mode": "text",
            "x": pivot.rows,
            "y": totals,
            "text": labels,
            "textposition": "top center",
            "showlegend": false,
            "hoverinfo": "skip",
        }));
        Self {
            data,
            layout: merge(
                base_layout(),
                json!({
                    "barmode": "stack",
                    "hovermode": "x unified",
                    "legend": { "title": { "text": legend } },
                    "xaxis": { "title": { "text": x_title }, "categoryorder": "array", "categoryarray": pivot.rows },
                    "yaxis": { "title": { "text": y_title }, "rangemode": "tozero" },
                }),
            ),
        }
    }

    /// Rows top to bottom, columns along a top axis, color capped at `zmax`.
    pub fn heatmap(pivot: &Pivot, zmax: Option<f64>, title: &str, y_title: &str) -> Self {
        let mut trace = json!({
            "type": "heatmap",
            "x": pivot.columns,
            "y": pivot.rows,
            "z": pivot.cells,
            "colorscale": "Blues",
            "texttemplate": "%{z:,}",
            "textfont": { "size": 11 },
        });
        if let Some(zmax) = zmax {
            trace["zmin"] = json!(0);
            trace["zmax"] = json!(zmax);
        }
        Self {
            data: vec![trace],
            layout: merge(
                base_layout(),
                json!({
                    "title": { "text": title },
                    "margin": { "l": 60, "r": 20, "t": 60, "b": 60 },
                    "xaxis": { "side": "top" },
                    "yaxis": { "title": { "text": y_title }, "autorange": "reversed" },
                }),
            ),
        }
    }

    /// One line per series over monthly x values (`YYYY-MM-DD`).
    pub fn monthly_lines(x: &[String], series: &[(&str, Vec<u64>)], legend: &str, y_title: &str) -> Self {
        let data = series
            .iter()
            .map(|(name, y)| {
                json!({
                    "type": "scatter",
                    "mode": "lines+markers",
                    "name": name,
                    "x": x,
                    "y": y,
                })
            })
            .collect();
        Self {
            data,
            layout: merge(
                base_layout(),
                json!({
                    "hovermode": "x unified",
                    "legend": { "title": { "text": legend } },
                    "xaxis": { "dtick": "M1", "tickformat": "%b %Y", "ticklabelmode": "period" },
                    "yaxis": { "title": { "text": y_title }, "rangemode": "tozero" },
                }),
            ),
        }
    }
}

const PAGE_TEMPLATE: &str = r##"<!doctype html>
<html lang="en">
<head>
<meta charset="utf-8"/>
<meta name="viewport" content="width=device-width, initial-scale=1"/>
<title>__TITLE__</title>
<style>
  html, body { background:#fff; margin:0; font-family: system-ui, -apple-system, Segoe UI, Roboto, sans-serif; }
  #figure { width: 100%; height: 100vh; }
</style>
</head>
<body>
<div id="figure"></div>
<script src="__PLOTLY_CDN__"></script>
<script>
  const fig = __FIGURE__;
  Plotly.newPlot('figure', fig.data, fig.layout, __CONFIG__);
  window.addEventListener('resize', () => Plotly.Plots.resize('figure'));
</script>
</body>
</html>
"##;

/// Full standalone page drawing `figure`.
pub fn page(title: &str, figure: &Figure) -> String {
    let fig = json!({ "data": figure.data, "layout": figure.layout });
    let config = json!({
        "responsive": true,
        "displaylogo": false,
        "modeBarButtonsToRemove": ["toImage", "lasso2d", "select2d"],
    });
    PAGE_TEMPLATE
        .replace("__TITLE__", &escape(title))
        .replace("__PLOTLY_CDN__", PLOTLY_CDN)
        .replace("__CONFIG__", &script_json(&config))
        .replace("__FIGURE__", &script_json(&fig))
}

pub fn plotly_cdn() -> &'static str {
    PLOTLY_CDN
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pivot::CountTable;

    fn pivot() -> Pivot {
        let counts: CountTable = vec![("Phase 1", "RECRUITING", 3u64), ("Phase 2", "RECRUITING", 1)]
            .into_iter()
            .collect();
        Pivot::build(&counts, &["Phase 1", "Phase 2"], &["RECRUITING", "NOT_YET_RECRUITING"])
    }

    #[test]
    fn stacked_bars_add_a_totals_trace() {
        let fig = Figure::stacked_bars(&pivot(), &[("RECRUITING", "#9ecae1")], "Phase", "Trials", "Status");
        assert_eq!(fig.data.len(), 3);
        assert_eq!(fig.data[0]["marker"]["color"], "#9ecae1");
        assert!(fig.data[1].get("marker").is_none());
        assert_eq!(fig.data[2]["y"], json!([3, 1]));
        assert_eq!(fig.layout["barmode"], "stack");
    }

    #[test]
    fn heatmap_caps_color_scale() {
        let fig = Figure::heatmap(&pivot(), Some(2.0), "t", "Phase");
        assert_eq!(fig.data[0]["zmax"], 2.0);
        assert_eq!(fig.data[0]["z"], json!([[3, 0], [1, 0]]));
        let fig = Figure::heatmap(&pivot(), None, "t", "Phase");
        assert!(fig.data[0].get("zmax").is_none());
    }

    #[test]
    fn page_embeds_figure_and_escapes_title() {
        let counts = OrderedCounts::build([("Phase 1", 2u64)], &["Phase 1"]);
        let html = page("A <b> page", &Figure::bar(&counts, "Phase", "Trials", None));
        assert!(html.contains("<title>A &lt;b&gt; page</title>"));
        assert!(html.contains(PLOTLY_CDN));
        assert!(html.contains("\"type\":\"bar\""));
        assert!(!html.contains("__FIGURE__"));
    }
}
