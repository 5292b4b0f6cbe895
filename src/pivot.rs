//! Count aggregation and category-ordered pivots.
//!
//! A `CountTable` accumulates (row, column) counts in insertion order. A
//! `Pivot` reindexes it over fixed row and column orders: every fixed
//! category is present, absent combinations are zero, and categories seen
//! in the data but missing from the fixed order are appended after it in
//! first-seen order.

use serde::Serialize;
use std::collections::HashMap;

/// Merge a fixed order with observed labels: fixed labels first, then any
/// observed label not in the fixed order, in first-seen order.
pub fn ordered_labels<'a, I>(fixed: &[&str], observed: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut labels: Vec<String> = fixed.iter().map(|s| s.to_string()).collect();
    for label in observed {
        if !labels.iter().any(|l| l == label) {
            labels.push(label.to_string());
        }
    }
    labels
}

// =============================================================================
// Aggregation
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct CountTable {
    cells: Vec<(String, String, u64)>,
    index: HashMap<(String, String), usize>,
}

impl CountTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, row: &str, column: &str, n: u64) {
        let key = (row.to_string(), column.to_string());
        match self.index.get(&key) {
            Some(&i) => self.cells[i].2 += n,
            None => {
                self.index.insert(key, self.cells.len());
                self.cells.push((row.to_string(), column.to_string(), n));
            }
        }
    }

    pub fn increment(&mut self, row: &str, column: &str) {
        self.add(row, column, 1);
    }

    pub fn get(&self, row: &str, column: &str) -> u64 {
        self.index
            .get(&(row.to_string(), column.to_string()))
            .map(|&i| self.cells[i].2)
            .unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.cells.iter().map(|c| c.2).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Cells in first-seen order.
    pub fn cells(&self) -> impl Iterator<Item = (&str, &str, u64)> {
        self.cells.iter().map(|(r, c, n)| (r.as_str(), c.as_str(), *n))
    }

    /// Row totals in first-seen order.
    pub fn row_totals(&self) -> Vec<(String, u64)> {
        let mut totals: Vec<(String, u64)> = Vec::new();
        let mut seen: HashMap<&str, usize> = HashMap::new();
        for (row, _, n) in self.cells() {
            match seen.get(row) {
                Some(&i) => totals[i].1 += n,
                None => {
                    seen.insert(row, totals.len());
                    totals.push((row.to_string(), n));
                }
            }
        }
        totals
    }
}

impl<R: AsRef<str>, C: AsRef<str>> FromIterator<(R, C, u64)> for CountTable {
    fn from_iter<T: IntoIterator<Item = (R, C, u64)>>(iter: T) -> Self {
        let mut table = CountTable::new();
        for (row, column, n) in iter {
            table.add(row.as_ref(), column.as_ref(), n);
        }
        table
    }
}

// =============================================================================
// Pivot
// =============================================================================

/// One cell of a melted pivot, for long-format exports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PivotCell {
    pub row: String,
    pub column: String,
    pub n: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Pivot {
    pub rows: Vec<String>,
    pub columns: Vec<String>,
    /// Row-major, `cells[r][c]`.
    pub cells: Vec<Vec<u64>>,
}

impl Pivot {
    pub fn build(counts: &CountTable, row_order: &[&str], column_order: &[&str]) -> Self {
        let rows = ordered_labels(row_order, counts.cells().map(|(r, _, _)| r));
        let columns = ordered_labels(column_order, counts.cells().map(|(_, c, _)| c));
        let cells = rows
            .iter()
            .map(|r| columns.iter().map(|c| counts.get(r, c)).collect())
            .collect();
        Self { rows, columns, cells }
    }

    pub fn get(&self, row: &str, column: &str) -> u64 {
        let r = self.rows.iter().position(|x| x == row);
        let c = self.columns.iter().position(|x| x == column);
        match (r, c) {
            (Some(r), Some(c)) => self.cells[r][c],
            _ => 0,
        }
    }

    pub fn total(&self) -> u64 {
        self.cells.iter().flatten().sum()
    }

    pub fn row_totals(&self) -> Vec<u64> {
        self.cells.iter().map(|row| row.iter().sum()).collect()
    }

    pub fn column_totals(&self) -> Vec<u64> {
        (0..self.columns.len())
            .map(|c| self.cells.iter().map(|row| row[c]).sum())
            .collect()
    }

    /// Column-major series, one per column, for stacked charts.
    pub fn column_series(&self, column: usize) -> Vec<u64> {
        self.cells.iter().map(|row| row[column]).collect()
    }

    /// Long format, row-major, zero cells included.
    pub fn melt(&self) -> Vec<PivotCell> {
        let mut out = Vec::with_capacity(self.rows.len() * self.columns.len());
        for (r, row) in self.rows.iter().enumerate() {
            for (c, column) in self.columns.iter().enumerate() {
                out.push(PivotCell {
                    row: row.clone(),
                    column: column.clone(),
                    n: self.cells[r][c],
                });
            }
        }
        out
    }

    /// Value at quantile `q` of all cells, linearly interpolated between
    /// closest ranks. None for an empty table.
    pub fn quantile(&self, q: f64) -> Option<f64> {
        let mut values: Vec<u64> = self.cells.iter().flatten().copied().collect();
        if values.is_empty() {
            return None;
        }
        values.sort_unstable();
        let pos = q.clamp(0.0, 1.0) * (values.len() - 1) as f64;
        let lo = pos.floor() as usize;
        let hi = pos.ceil() as usize;
        let frac = pos - lo as f64;
        Some(values[lo] as f64 + (values[hi] as f64 - values[lo] as f64) * frac)
    }
}

// =============================================================================
// Single dimension
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderedCounts {
    pub categories: Vec<String>,
    pub counts: Vec<u64>,
}

impl OrderedCounts {
    pub fn build<'a, I>(observed: I, order: &[&str]) -> Self
    where
        I: IntoIterator<Item = (&'a str, u64)>,
    {
        let observed: Vec<(&str, u64)> = observed.into_iter().collect();
        let categories = ordered_labels(order, observed.iter().map(|(label, _)| *label));
        let counts = categories
            .iter()
            .map(|c| observed.iter().filter(|(l, _)| l == c).map(|(_, n)| n).sum())
            .collect();
        Self { categories, counts }
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.categories.iter().map(|c| c.as_str()).zip(self.counts.iter().copied())
    }
}

/// Rank labels by count descending, ties broken by label, keeping at most `n`.
pub fn top_n(totals: &[(String, u64)], n: usize) -> Vec<(String, u64)> {
    let mut ranked = totals.to_vec();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(n);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::{Category, Phase, Status};

    fn phase_order() -> Vec<&'static str> {
        Phase::fixed_labels()
    }

    #[test]
    fn empty_input_yields_full_zero_table() {
        let counts = CountTable::new();
        let status = Status::fixed_labels();
        let pivot = Pivot::build(&counts, &phase_order(), &status);
        assert_eq!(pivot.rows.len(), 9);
        assert_eq!(pivot.columns.len(), 9);
        assert_eq!(pivot.total(), 0);
        assert!(pivot.cells.iter().flatten().all(|&n| n == 0));
    }

    #[test]
    fn zero_fill_and_total_preserved() {
        let counts: CountTable = [
            ("Phase 1", "RECRUITING", 3u64),
            ("Phase 3", "COMPLETED", 5),
            ("Phase 1", "RECRUITING", 2),
            ("Unknown", "UNKNOWN", 1),
        ]
        .into_iter()
        .collect();
        let status = Status::fixed_labels();
        let pivot = Pivot::build(&counts, &phase_order(), &status);
        assert_eq!(pivot.total(), counts.total());
        assert_eq!(pivot.total(), 11);
        assert_eq!(pivot.get("Phase 1", "RECRUITING"), 5);
        assert_eq!(pivot.get("Phase 2", "RECRUITING"), 0);
        assert_eq!(pivot.rows, phase_order());
        assert_eq!(pivot.columns, status);
    }

    #[test]
    fn extras_appended_in_first_seen_order() {
        let counts: CountTable = [
            ("Phase 2", "ZETA", 1u64),
            ("Phase 5", "RECRUITING", 1),
            ("Phase 2", "ALPHA", 1),
            ("Phase 0", "ZETA", 1),
        ]
        .into_iter()
        .collect();
        let pivot = Pivot::build(&counts, &phase_order(), &["RECRUITING", "COMPLETED"]);
        assert_eq!(&pivot.rows[..9], phase_order().as_slice());
        assert_eq!(&pivot.rows[9..], ["Phase 5", "Phase 0"]);
        assert_eq!(pivot.columns, ["RECRUITING", "COMPLETED", "ZETA", "ALPHA"]);
        assert_eq!(pivot.get("Phase 0", "ZETA"), 1);
        assert_eq!(pivot.total(), 4);
    }

    #[test]
    fn only_unknown_still_renders_full_order() {
        let counts: CountTable = [("Unknown", "n", 7u64)].into_iter().collect();
        let pivot = Pivot::build(&counts, &phase_order(), &["n"]);
        assert_eq!(pivot.rows.len(), 9);
        assert_eq!(pivot.row_totals(), [0, 0, 0, 0, 0, 0, 0, 0, 7]);
        assert_eq!(pivot.column_totals(), [7]);
    }

    #[test]
    fn melt_is_row_major_with_zeros() {
        let counts: CountTable = [("b", "y", 2u64)].into_iter().collect();
        let pivot = Pivot::build(&counts, &["a", "b"], &["x", "y"]);
        let melted = pivot.melt();
        assert_eq!(melted.len(), 4);
        assert_eq!(melted[0], PivotCell { row: "a".into(), column: "x".into(), n: 0 });
        assert_eq!(melted[3], PivotCell { row: "b".into(), column: "y".into(), n: 2 });
    }

    #[test]
    fn single_dimension_example() {
        let raw = [Some("PHASE_1"), Some("Phase 2"), None, Some("PHASE1/PHASE2")];
        let labels: Vec<&str> = raw.iter().map(|r| Phase::normalize(*r).label()).collect();
        let counts = OrderedCounts::build(labels.iter().map(|l| (*l, 1)), &phase_order());
        assert_eq!(counts.categories, phase_order());
        assert_eq!(counts.counts, [0, 1, 1, 1, 0, 0, 0, 0, 1]);
        assert_eq!(counts.total(), 4);
    }

    #[test]
    fn single_dimension_empty_and_extras() {
        let empty = OrderedCounts::build(std::iter::empty(), &phase_order());
        assert_eq!(empty.counts, [0; 9]);
        let extra = OrderedCounts::build([("Other", 2), ("Phase 4", 1)], &phase_order());
        assert_eq!(extra.categories.last().unwrap(), "Other");
        assert_eq!(extra.total(), 3);
    }

    #[test]
    fn quantile_interpolates() {
        let counts: CountTable = (1..=5u64).map(|i| (i.to_string(), "c".to_string(), i * 10)).collect();
        let pivot = Pivot::build(&counts, &[], &["c"]);
        assert_eq!(pivot.quantile(0.0), Some(10.0));
        assert_eq!(pivot.quantile(1.0), Some(50.0));
        assert_eq!(pivot.quantile(0.5), Some(30.0));
        assert!((pivot.quantile(0.95).unwrap() - 48.0).abs() < 1e-9);
        let empty = Pivot::build(&CountTable::new(), &[], &[]);
        assert_eq!(empty.quantile(0.95), None);
    }

    #[test]
    fn top_n_breaks_ties_by_label() {
        let totals = vec![
            ("b".to_string(), 3),
            ("a".to_string(), 3),
            ("c".to_string(), 9),
            ("d".to_string(), 1),
        ];
        let top = top_n(&totals, 3);
        let names: Vec<&str> = top.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["c", "a", "b"]);
    }

    #[test]
    fn row_totals_first_seen() {
        let counts: CountTable = [("x", "p", 1u64), ("y", "p", 2), ("x", "q", 4)].into_iter().collect();
        assert_eq!(counts.row_totals(), [("x".to_string(), 5), ("y".to_string(), 2)]);
    }
}
