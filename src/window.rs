//! Upcoming-event extraction over a calendar-month window.
//!
//! A window starts on an as-of date and spans a whole number of calendar
//! months. The end is computed with calendar arithmetic (month-end
//! clamped), never as a fixed number of days, and is exclusive.

use anyhow::{anyhow, Result};
use chrono::{Datelike, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::trial::TrialRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: NaiveDate,
    pub months: u32,
    end: NaiveDate,
}

impl Window {
    pub fn new(start: NaiveDate, months: u32) -> Result<Self> {
        let end = start
            .checked_add_months(Months::new(months))
            .ok_or_else(|| anyhow!("window of {} months from {} overflows", months, start))?;
        Ok(Self { start, months, end })
    }

    /// Exclusive end date.
    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date < self.end
    }

    /// First day of every calendar month touched by `[start, end]`,
    /// inclusive of the end's month.
    pub fn months_spanned(&self) -> Vec<NaiveDate> {
        let mut out = Vec::new();
        let mut month = first_of_month(self.start);
        let last = first_of_month(self.end);
        while month <= last {
            out.push(month);
            match month.checked_add_months(Months::new(1)) {
                Some(next) => month = next,
                None => break,
            }
        }
        out
    }
}

pub fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

// =============================================================================
// Events
// =============================================================================

/// Event kinds in display precedence: starts before primary completions
/// before completions on the same date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    Start,
    PrimaryCompletion,
    Completion,
}

impl EventKind {
    pub const ALL: [EventKind; 3] = [EventKind::Start, EventKind::PrimaryCompletion, EventKind::Completion];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Start => "START",
            EventKind::PrimaryCompletion => "PRIMARY_COMPLETION",
            EventKind::Completion => "COMPLETION",
        }
    }

    /// Name of the timeline series for this kind.
    pub fn series_name(&self) -> &'static str {
        match self {
            EventKind::Start => "starts",
            EventKind::PrimaryCompletion => "primary_completions",
            EventKind::Completion => "completions",
        }
    }

    /// The date and date-type fields of `record` for this kind.
    pub fn date_of<'a>(&self, record: &'a TrialRecord) -> (Option<NaiveDate>, Option<&'a str>) {
        match self {
            EventKind::Start => (record.start_date, record.start_date_type.as_deref()),
            EventKind::PrimaryCompletion => (
                record.primary_completion_date,
                record.primary_completion_date_type.as_deref(),
            ),
            EventKind::Completion => (record.completion_date, record.completion_date_type.as_deref()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpcomingEvent<'a> {
    pub date: NaiveDate,
    pub kind: EventKind,
    pub date_type: String,
    pub record: &'a TrialRecord,
}

/// Union of all in-window start, primary-completion and completion dates of
/// active records, sorted by date, then kind precedence, then study id.
pub fn extract_events<'a>(records: &'a [TrialRecord], window: &Window) -> Vec<UpcomingEvent<'a>> {
    extract_events_of(records, window, &EventKind::ALL)
}

pub fn extract_events_of<'a>(
    records: &'a [TrialRecord],
    window: &Window,
    kinds: &[EventKind],
) -> Vec<UpcomingEvent<'a>> {
    let mut events = Vec::new();
    for record in records {
        if !record.status().is_active() {
            continue;
        }
        for kind in kinds {
            if let (Some(date), date_type) = kind.date_of(record) {
                if window.contains(date) {
                    events.push(UpcomingEvent {
                        date,
                        kind: *kind,
                        date_type: date_type.unwrap_or("ESTIMATED").to_string(),
                        record,
                    });
                }
            }
        }
    }
    events.sort_by(|a, b| {
        a.date
            .cmp(&b.date)
            .then(a.kind.cmp(&b.kind))
            .then_with(|| a.record.nct_id.cmp(&b.record.nct_id))
    });
    events
}

// =============================================================================
// Monthly timeline
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimelineRow {
    pub month: NaiveDate,
    pub starts: u64,
    pub primary_completions: u64,
    pub completions: u64,
}

impl TimelineRow {
    pub fn get(&self, kind: EventKind) -> u64 {
        match kind {
            EventKind::Start => self.starts,
            EventKind::PrimaryCompletion => self.primary_completions,
            EventKind::Completion => self.completions,
        }
    }
}

/// Per-month event counts over every month the window spans, zero-filled.
pub fn monthly_timeline(events: &[UpcomingEvent<'_>], window: &Window) -> Vec<TimelineRow> {
    let mut rows: BTreeMap<NaiveDate, TimelineRow> = window
        .months_spanned()
        .into_iter()
        .map(|month| {
            (
                month,
                TimelineRow { month, starts: 0, primary_completions: 0, completions: 0 },
            )
        })
        .collect();
    for event in events {
        if let Some(row) = rows.get_mut(&first_of_month(event.date)) {
            match event.kind {
                EventKind::Start => row.starts += 1,
                EventKind::PrimaryCompletion => row.primary_completions += 1,
                EventKind::Completion => row.completions += 1,
            }
        }
    }
    rows.into_values().collect()
}
