//! Trial records as fetched from the source.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::category::{Category, Phase, Status};

/// Maximum title length carried into the upcoming-events table.
pub const TITLE_MAX_CHARS: usize = 180;
/// Maximum length of each intervention or condition name before joining.
pub const AUX_NAME_MAX_CHARS: usize = 60;

/// One study row. Raw phase and status are kept as fetched; use
/// [`TrialRecord::phase`] and [`TrialRecord::status`] for canonical values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    pub nct_id: String,
    pub title: Option<String>,
    pub phase_raw: Option<String>,
    pub status_raw: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub start_date_type: Option<String>,
    pub primary_completion_date: Option<NaiveDate>,
    pub primary_completion_date_type: Option<String>,
    pub completion_date: Option<NaiveDate>,
    pub completion_date_type: Option<String>,
    pub enrollment: Option<i64>,
    pub enrollment_type: Option<String>,
    pub last_update_posted_date: Option<NaiveDate>,
    pub lead_sponsor: Option<String>,
    pub intervention_types: Option<String>,
    pub interventions: Option<String>,
    pub conditions: Option<String>,
}

impl TrialRecord {
    pub fn phase(&self) -> Phase {
        Phase::normalize(self.phase_raw.as_deref())
    }

    pub fn status(&self) -> Status {
        Status::normalize(self.status_raw.as_deref())
    }
}

/// Auxiliary per-study text rows (sponsor, intervention, condition tables).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuxRow {
    pub nct_id: String,
    pub kind: Option<String>,
    pub name: Option<String>,
}

/// Truncate to at most `max` characters (not bytes).
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

/// Join distinct values in sorted order. None when there is nothing to join.
pub fn join_distinct<'a, I>(values: I, sep: &str) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut values: Vec<&str> = values.into_iter().filter(|v| !v.is_empty()).collect();
    if values.is_empty() {
        return None;
    }
    values.sort_unstable();
    values.dedup();
    Some(values.join(sep))
}

/// Fill the aggregated intervention and condition columns of `records`
/// from raw auxiliary rows. Names are truncated before de-duplication.
pub fn attach_aux(records: &mut [TrialRecord], interventions: &[AuxRow], conditions: &[AuxRow]) {
    let interventions = group_by_study(interventions);
    let conditions = group_by_study(conditions);
    for record in records.iter_mut() {
        let ivs = interventions.get(record.nct_id.as_str()).map(Vec::as_slice).unwrap_or(&[]);
        record.intervention_types = join_distinct(ivs.iter().filter_map(|r| r.kind.as_deref()), ", ");
        record.interventions = join_truncated(ivs, " · ");

        let conds = conditions.get(record.nct_id.as_str()).map(Vec::as_slice).unwrap_or(&[]);
        record.conditions = join_truncated(conds, ", ");
    }
}

fn group_by_study(rows: &[AuxRow]) -> HashMap<&str, Vec<&AuxRow>> {
    let mut grouped: HashMap<&str, Vec<&AuxRow>> = HashMap::new();
    for row in rows {
        grouped.entry(row.nct_id.as_str()).or_default().push(row);
    }
    grouped
}

fn join_truncated(rows: &[&AuxRow], sep: &str) -> Option<String> {
    let names: Vec<String> = rows
        .iter()
        .filter_map(|r| r.name.as_deref())
        .map(|n| truncate_chars(n, AUX_NAME_MAX_CHARS))
        .collect();
    join_distinct(names.iter().map(|s| s.as_str()), sep)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_counts_chars() {
        assert_eq!(truncate_chars("abcdef", 3), "abc");
        assert_eq!(truncate_chars("ab", 3), "ab");
        assert_eq!(truncate_chars("é·é·é", 2), "é·");
    }

    #[test]
    fn join_distinct_sorts_and_dedups() {
        assert_eq!(join_distinct(["b", "a", "b", ""], ", "), Some("a, b".to_string()));
        assert_eq!(join_distinct(Vec::<&str>::new(), ", "), None);
        assert_eq!(join_distinct([""], ", "), None);
    }

    #[test]
    fn attach_aux_groups_by_study() {
        let mut records = vec![
            TrialRecord { nct_id: "NCT1".into(), ..Default::default() },
            TrialRecord { nct_id: "NCT2".into(), ..Default::default() },
        ];
        let aux = |id: &str, kind: &str, name: &str| AuxRow {
            nct_id: id.into(),
            kind: Some(kind.into()),
            name: Some(name.into()),
        };
        let interventions = vec![
            aux("NCT1", "DRUG", "Zeta"),
            aux("NCT1", "DEVICE", "Alpha"),
            aux("NCT1", "DRUG", "Zeta"),
        ];
        let conditions = vec![aux("NCT2", "", &"x".repeat(80))];
        attach_aux(&mut records, &interventions, &conditions);

        assert_eq!(records[0].intervention_types.as_deref(), Some("DEVICE, DRUG"));
        assert_eq!(records[0].interventions.as_deref(), Some("Alpha · Zeta"));
        assert_eq!(records[0].conditions, None);
        assert_eq!(records[1].conditions.as_deref().map(|c| c.len()), Some(60));
        assert_eq!(records[1].interventions, None);
    }

    #[test]
    fn canonical_accessors() {
        let record = TrialRecord {
            nct_id: "NCT1".into(),
            phase_raw: Some("PHASE2_3".into()),
            status_raw: None,
            ..Default::default()
        };
        assert_eq!(record.phase(), Phase::Phase2_3);
        assert_eq!(record.status(), Status::Unknown);
    }
}
