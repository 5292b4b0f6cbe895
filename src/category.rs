//! Canonical phase and status categories.
//!
//! The source database carries several spellings for the same phase or
//! status (upper-snake codes from the current registry export, display
//! strings from the legacy one). Everything downstream works on the
//! canonical enums below; raw strings never leave the source layer
//! un-normalized.

use serde::{Deserialize, Serialize};

/// A closed set of display categories with a fixed presentation order.
pub trait Category: Copy + Eq + Ord + 'static {
    /// Every member, in display order. Unknown is always last.
    const ORDER: &'static [Self];

    /// Exact-match lookup of a raw label. Total: unmapped and null map to Unknown.
    fn normalize(raw: Option<&str>) -> Self;

    fn label(self) -> &'static str;

    fn fixed_labels() -> Vec<&'static str> {
        Self::ORDER.iter().map(|c| c.label()).collect()
    }
}

// =============================================================================
// Phase
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Phase {
    #[serde(rename = "Early Phase 1")]
    EarlyPhase1,
    #[serde(rename = "Phase 1")]
    Phase1,
    #[serde(rename = "Phase 1/2")]
    Phase1_2,
    #[serde(rename = "Phase 2")]
    Phase2,
    #[serde(rename = "Phase 2/3")]
    Phase2_3,
    #[serde(rename = "Phase 3")]
    Phase3,
    #[serde(rename = "Phase 4")]
    Phase4,
    #[serde(rename = "Not Applicable")]
    NotApplicable,
    Unknown,
}

impl Category for Phase {
    const ORDER: &'static [Self] = &[
        Phase::EarlyPhase1,
        Phase::Phase1,
        Phase::Phase1_2,
        Phase::Phase2,
        Phase::Phase2_3,
        Phase::Phase3,
        Phase::Phase4,
        Phase::NotApplicable,
        Phase::Unknown,
    ];

    fn normalize(raw: Option<&str>) -> Self {
        match raw {
            Some("EARLY_PHASE1" | "EARLY_PHASE_1" | "Early Phase 1") => Phase::EarlyPhase1,
            Some("PHASE1" | "PHASE_1" | "Phase 1") => Phase::Phase1,
            Some(
                "PHASE1/PHASE2" | "PHASE1_PHASE2" | "PHASE1_2" | "PHASE_1_2" | "Phase 1/Phase 2"
                | "Phase 1/2",
            ) => Phase::Phase1_2,
            Some("PHASE2" | "PHASE_2" | "Phase 2") => Phase::Phase2,
            Some(
                "PHASE2/PHASE3" | "PHASE2_PHASE3" | "PHASE2_3" | "PHASE_2_3" | "Phase 2/Phase 3"
                | "Phase 2/3",
            ) => Phase::Phase2_3,
            Some("PHASE3" | "PHASE_3" | "Phase 3") => Phase::Phase3,
            Some("PHASE4" | "PHASE_4" | "Phase 4") => Phase::Phase4,
            Some("NA" | "NOT_APPLICABLE" | "N/A" | "Not Applicable") => Phase::NotApplicable,
            _ => Phase::Unknown,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Phase::EarlyPhase1 => "Early Phase 1",
            Phase::Phase1 => "Phase 1",
            Phase::Phase1_2 => "Phase 1/2",
            Phase::Phase2 => "Phase 2",
            Phase::Phase2_3 => "Phase 2/3",
            Phase::Phase3 => "Phase 3",
            Phase::Phase4 => "Phase 4",
            Phase::NotApplicable => "Not Applicable",
            Phase::Unknown => "Unknown",
        }
    }
}

// =============================================================================
// Status
// =============================================================================

/// Overall recruitment status, in lifecycle order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    NotYetRecruiting,
    Recruiting,
    EnrollingByInvitation,
    ActiveNotRecruiting,
    Suspended,
    Completed,
    Terminated,
    Withdrawn,
    Unknown,
}

impl Status {
    /// Statuses considered in progress for upcoming-event reporting.
    pub const ACTIVE: &'static [Status] = &[
        Status::NotYetRecruiting,
        Status::Recruiting,
        Status::EnrollingByInvitation,
        Status::ActiveNotRecruiting,
    ];

    pub fn is_active(self) -> bool {
        Self::ACTIVE.contains(&self)
    }

    /// Raw spellings that normalize to this status. Used to push status
    /// filters down into source queries.
    pub fn raw_variants(self) -> &'static [&'static str] {
        match self {
            Status::NotYetRecruiting => &["NOT_YET_RECRUITING", "Not yet recruiting"],
            Status::Recruiting => &["RECRUITING", "Recruiting"],
            Status::EnrollingByInvitation => &["ENROLLING_BY_INVITATION", "Enrolling by invitation"],
            Status::ActiveNotRecruiting => &["ACTIVE_NOT_RECRUITING", "Active, not recruiting"],
            Status::Suspended => &["SUSPENDED", "Suspended"],
            Status::Completed => &["COMPLETED", "Completed"],
            Status::Terminated => &["TERMINATED", "Terminated"],
            Status::Withdrawn => &["WITHDRAWN", "Withdrawn"],
            Status::Unknown => &["UNKNOWN", "Unknown status"],
        }
    }
}

impl Category for Status {
    const ORDER: &'static [Self] = &[
        Status::NotYetRecruiting,
        Status::Recruiting,
        Status::EnrollingByInvitation,
        Status::ActiveNotRecruiting,
        Status::Suspended,
        Status::Completed,
        Status::Terminated,
        Status::Withdrawn,
        Status::Unknown,
    ];

    fn normalize(raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return Status::Unknown;
        };
        Self::ORDER
            .iter()
            .copied()
            .find(|status| status.raw_variants().contains(&raw))
            .unwrap_or(Status::Unknown)
    }

    fn label(self) -> &'static str {
        self.raw_variants()[0]
    }
}

/// Collect the raw spellings for a set of statuses, for use in `IN (...)` filters.
pub fn raw_status_filter(statuses: &[Status]) -> Vec<String> {
    statuses
        .iter()
        .flat_map(|s| s.raw_variants().iter().map(|v| v.to_string()))
        .collect()
}
