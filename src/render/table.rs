//! DataTables pages for the upcoming-events table.

use serde_json::json;

use super::plotly::plotly_cdn;
use super::{escape, script_json};

const DATATABLES_CSS: &str = "https://cdn.datatables.net/2.1.7/css/dataTables.dataTables.min.css";
const DATATABLES_JS: &str = "https://cdn.datatables.net/2.1.7/js/dataTables.min.js";
const JQUERY_JS: &str = "https://code.jquery.com/jquery-3.7.1.min.js";

/// Plain rectangular table of display strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Client-side chart settings for the interactive page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartOptions {
    pub top_sponsors: usize,
    pub top_interventions: usize,
    pub phase_order: Vec<&'static str>,
    pub status_order: Vec<&'static str>,
}

pub fn mobile_font_px(font_px: u32) -> u32 {
    font_px.saturating_sub(1).max(10)
}

/// `<table id="t">` with escaped cells.
pub fn table_html(table: &DataTable) -> String {
    let mut html = String::from("<table id=\"t\" class=\"display compact\">\n<thead>\n<tr>");
    for column in &table.columns {
        html.push_str("<th>");
        html.push_str(&escape(column));
        html.push_str("</th>");
    }
    html.push_str("</tr>\n</thead>\n<tbody>\n");
    for row in &table.rows {
        html.push_str("<tr>");
        for cell in row {
            html.push_str("<td>");
            html.push_str(&escape(cell));
            html.push_str("</td>");
        }
        html.push_str("</tr>\n");
    }
    html.push_str("</tbody>\n</table>");
    html
}

const TABLE_STYLE: &str = r##"
  html, body { background:#fff; margin:16px; font-family: system-ui, -apple-system, Segoe UI, Roboto, sans-serif; }
  table.dataTable { width: 100% !important; background:#fff; }
  #t, #t th, #t td { font-size: __FONT__px; line-height: 1.25; }
  #t thead th, #t tbody td { padding: 4px 6px; }
  #t_wrapper .dt-scroll-head table,
  #t_wrapper .dt-scroll-head th,
  #t_wrapper .dt-scroll-body table,
  #t_wrapper .dt-scroll-body td { font-size: __FONT__px; line-height: 1.25; }
  #t_wrapper .dt-search input,
  #t_wrapper .dt-length select,
  #t_wrapper .dt-info,
  #t_wrapper .dt-paging button { font-size: __FONT__px; }
  @media (max-width: 768px) {
    #t, #t th, #t td { font-size: __MOBILE_FONT__px; }
  }
"##;

const TABLE_PAGE: &str = r##"<!doctype html>
<html lang="en">
<head>
<meta charset="utf-8"/>
<meta name="viewport" content="width=device-width, initial-scale=1"/>
<title>__TITLE__</title>
<link rel="stylesheet" href="__DT_CSS__"/>
<style>__STYLE__</style>
</head>
<body>
__TABLE__
<script src="__JQUERY__"></script>
<script src="__DT_JS__"></script>
<script>
  new DataTable('#t', {
    pageLength: 25,
    order: [[0, 'asc'], [1, 'asc']],
    scrollX: true,
    language: { emptyTable: "" }
  });
</script>
</body>
</html>
"##;

const GRAPH_STYLE: &str = r##"
  .toolbar { display: flex; flex-wrap: wrap; gap: 12px; align-items: center; margin: 8px 0 16px; font-size: __FONT__px; }
  .charts { display: grid; gap: 16px; margin-top: 16px; grid-template-columns: repeat(12, 1fr); }
  .card { grid-column: span 12; background: #fff; border: 1px solid #eee; border-radius: 12px; padding: 12px; }
  .card h3 { margin: 0 0 8px; font-size: __HEADING_FONT__px; }
  @media (min-width: 900px) {
    #chart_phase_total.card, #chart_status_total.card { grid-column: span 6; }
  }
  button, select, input[type="number"] {
    font-size: __FONT__px; padding: 4px 8px; border-radius: 8px; border: 1px solid #ddd; background: #fff;
  }
  .sponsor-cell { cursor: pointer; text-decoration: underline; text-underline-offset: 2px; }
"##;

const GRAPH_PAGE: &str = r##"<!doctype html>
<html lang="en">
<head>
<meta charset="utf-8"/>
<meta name="viewport" content="width=device-width, initial-scale=1"/>
<title>__TITLE__</title>
<link rel="stylesheet" href="__DT_CSS__"/>
<style>__STYLE__</style>
</head>
<body>
<div class="toolbar">
  <button id="resetFiltersBtn" title="Clear all table filters">Reset filters</button>
  <label>Top sponsors: <input id="topSponsors" type="number" min="3" max="50" value="__TOP_SPONSORS__"/></label>
  <label>Top intervention types: <input id="topInterventions" type="number" min="5" max="100" value="__TOP_INTERVENTIONS__"/></label>
</div>
__TABLE__
<div class="charts">
  <div id="chart_phase_sponsor" class="card"><h3>Trials per Phase per Lead Sponsor (Top-N by total count)</h3><div id="chart_phase_sponsor_plot"></div></div>
  <div id="chart_phase_total" class="card"><h3>Total Trials per Phase</h3><div id="chart_phase_total_plot"></div></div>
  <div id="chart_status_total" class="card"><h3>Total Trials per Status</h3><div id="chart_status_total_plot"></div></div>
  <div id="chart_intervention_total" class="card"><h3>Intervention Type Counts</h3><div id="chart_intervention_total_plot"></div></div>
</div>
<script src="__JQUERY__"></script>
<script src="__DT_JS__"></script>
<script src="__PLOTLY__"></script>
<script>
  const OPTS = __OPTIONS__;
  const dt = new DataTable('#t', {
    pageLength: 25,
    order: [[0, 'asc'], [1, 'asc']],
    scrollX: true,
    autoWidth: false,
    language: { emptyTable: "" },
    createdRow: function(row) {
      const idx = columnIndex('lead_sponsor');
      if (idx !== -1) row.cells[idx].classList.add('sponsor-cell');
    }
  });
  window.addEventListener('load', () => dt.columns.adjust());

  function columnIndex(name) {
    let idx = -1;
    dt.columns().every(function(i) {
      if ((this.header().textContent || '').trim() === name) idx = i;
    });
    return idx;
  }

  function clean(v) {
    if (v === null || v === undefined) return '';
    const div = document.createElement('div');
    div.innerHTML = String(v);
    return (div.textContent || '').trim();
  }

  function filteredRows() {
    const headers = [];
    dt.columns().every(function() { headers.push((this.header().textContent || '').trim()); });
    return dt.rows({ search: 'applied' }).data().toArray().map(row => {
      const obj = {};
      headers.forEach((h, i) => obj[h] = clean(row[i]));
      return obj;
    });
  }

  function countBy(rows, key) {
    const m = new Map();
    for (const r of rows) {
      const k = r[key] || 'Unknown';
      m.set(k, (m.get(k) || 0) + 1);
    }
    return m;
  }

  function ordered(order, counts) {
    return order.filter(k => counts.has(k)).concat(Array.from(counts.keys()).filter(k => !order.includes(k)));
  }

  const LAYOUT = { yaxis: { title: 'Trials', rangemode: 'tozero' }, margin: { t: 10, r: 10, b: 80, l: 50 } };

  function updateCharts() {
    const rows = filteredRows();

    const topN = Math.max(1, Number(document.getElementById('topSponsors').value || OPTS.top_sponsors));
    const sponsorPhase = new Map();
    for (const r of rows) {
      const s = r['lead_sponsor'] || 'Unknown';
      const p = r['phase_std'] || 'Unknown';
      if (!sponsorPhase.has(s)) sponsorPhase.set(s, new Map());
      const inner = sponsorPhase.get(s);
      inner.set(p, (inner.get(p) || 0) + 1);
    }
    const sponsors = Array.from(sponsorPhase.entries())
      .map(([s, m]) => [s, Array.from(m.values()).reduce((a, b) => a + b, 0)])
      .sort((a, b) => b[1] - a[1] || a[0].localeCompare(b[0]))
      .slice(0, topN)
      .map(d => d[0]);
    Plotly.react('chart_phase_sponsor_plot', OPTS.phase_order.map(phase => ({
      type: 'bar',
      name: phase,
      x: sponsors,
      y: sponsors.map(s => sponsorPhase.get(s).get(phase) || 0)
    })), Object.assign({}, LAYOUT, { barmode: 'stack', xaxis: { automargin: true }, margin: { t: 10, r: 10, b: 60, l: 50 } }));

    const byPhase = countBy(rows, 'phase_std');
    const phases = ordered(OPTS.phase_order, byPhase);
    Plotly.react('chart_phase_total_plot', [{ type: 'bar', x: phases, y: phases.map(p => byPhase.get(p)) }],
      Object.assign({}, LAYOUT, { xaxis: { tickangle: -30 } }));

    const byStatus = countBy(rows, 'status');
    const statuses = ordered(OPTS.status_order, byStatus);
    Plotly.react('chart_status_total_plot', [{ type: 'bar', x: statuses, y: statuses.map(s => byStatus.get(s)) }],
      Object.assign({}, LAYOUT, { xaxis: { tickangle: -30 } }));

    const topI = Math.max(1, Number(document.getElementById('topInterventions').value || OPTS.top_interventions));
    const byType = new Map();
    for (const r of rows) {
      (r['intervention_types'] || '').split(',').map(t => t.trim()).filter(t => t)
        .forEach(t => byType.set(t, (byType.get(t) || 0) + 1));
    }
    const types = Array.from(byType.entries()).sort((a, b) => b[1] - a[1] || a[0].localeCompare(b[0])).slice(0, topI);
    Plotly.react('chart_intervention_total_plot', [{ type: 'bar', x: types.map(d => d[0]), y: types.map(d => d[1]) }],
      Object.assign({}, LAYOUT, { xaxis: { tickangle: -30 }, margin: { t: 10, r: 10, b: 100, l: 50 } }));
  }

  document.querySelector('#t tbody').addEventListener('click', function(e) {
    const cell = e.target && e.target.closest('td');
    if (!cell) return;
    const idx = columnIndex('lead_sponsor');
    if (dt.cell(cell).index().column !== idx) return;
    const sponsor = clean(cell.textContent);
    if (!sponsor) return;
    const escaped = sponsor.replace(/[.*+?^${}()|[\]\\]/g, '\\$&');
    dt.column(idx).search('^' + escaped + '$', true, false).draw();
  });

  document.getElementById('resetFiltersBtn').addEventListener('click', () => {
    dt.search('');
    dt.columns().every(function() { this.search(''); });
    dt.draw();
  });
  document.getElementById('topSponsors').addEventListener('change', updateCharts);
  document.getElementById('topInterventions').addEventListener('change', updateCharts);
  dt.on('draw', updateCharts);
  updateCharts();
</script>
</body>
</html>
"##;

fn table_style(font_px: u32) -> String {
    TABLE_STYLE
        .replace("__MOBILE_FONT__", &mobile_font_px(font_px).to_string())
        .replace("__FONT__", &font_px.to_string())
}

/// Sortable, searchable table page. `charts` adds the filter-aware chart panel.
pub fn page(title: &str, table: &DataTable, font_px: u32, charts: Option<&ChartOptions>) -> String {
    let template = match charts {
        None => TABLE_PAGE.replace("__STYLE__", &table_style(font_px)),
        Some(opts) => {
            let style = format!(
                "{}{}",
                table_style(font_px),
                GRAPH_STYLE
                    .replace("__HEADING_FONT__", &(font_px + 2).to_string())
                    .replace("__FONT__", &font_px.to_string())
            );
            let options = json!({
                "top_sponsors": opts.top_sponsors,
                "top_interventions": opts.top_interventions,
                "phase_order": opts.phase_order,
                "status_order": opts.status_order,
            });
            GRAPH_PAGE
                .replace("__STYLE__", &style)
                .replace("__TOP_SPONSORS__", &opts.top_sponsors.to_string())
                .replace("__TOP_INTERVENTIONS__", &opts.top_interventions.to_string())
                .replace("__PLOTLY__", plotly_cdn())
                .replace("__OPTIONS__", &script_json(&options))
        }
    };
    // The table goes in last so cell text is never scanned for placeholders.
    template
        .replace("__TITLE__", &escape(title))
        .replace("__DT_CSS__", DATATABLES_CSS)
        .replace("__DT_JS__", DATATABLES_JS)
        .replace("__JQUERY__", JQUERY_JS)
        .replace("__TABLE__", &table_html(table))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> DataTable {
        DataTable {
            columns: vec!["event_date".into(), "lead_sponsor".into()],
            rows: vec![vec!["2024-02-01".into(), "R&D <Labs> __TITLE__".into()]],
        }
    }

    #[test]
    fn mobile_font_has_a_floor() {
        assert_eq!(mobile_font_px(11), 10);
        assert_eq!(mobile_font_px(14), 13);
        assert_eq!(mobile_font_px(9), 10);
        assert_eq!(mobile_font_px(0), 10);
    }

    #[test]
    fn table_cells_are_escaped() {
        let html = table_html(&table());
        assert!(html.contains("<th>lead_sponsor</th>"));
        assert!(html.contains("<td>R&amp;D &lt;Labs&gt; __TITLE__</td>"));
    }

    #[test]
    fn plain_page_sets_fonts_without_charts() {
        let html = page("Upcoming", &table(), 12, None);
        assert!(html.contains("font-size: 12px"));
        assert!(html.contains("font-size: 11px"));
        assert!(!html.contains("__STYLE__"));
        assert!(!html.contains("__DT_JS__"));
        assert!(!html.contains("plotly"));
        assert!(html.contains("__TITLE__</td>"));
    }

    #[test]
    fn graph_page_carries_chart_options() {
        let opts = ChartOptions {
            top_sponsors: 7,
            top_interventions: 15,
            phase_order: vec!["Phase 1", "Unknown"],
            status_order: vec!["RECRUITING"],
        };
        let html = page("Upcoming", &table(), 11, Some(&opts));
        assert!(html.contains("value=\"7\""));
        assert!(html.contains("\"top_interventions\":15"));
        assert!(html.contains("\"phase_order\":[\"Phase 1\",\"Unknown\"]"));
        assert!(html.contains("cdn.plot.ly"));
        assert!(html.contains("font-size: 13px"));
    }
}
