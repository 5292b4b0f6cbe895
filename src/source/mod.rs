//! Read-only access to trial records.
//!
//! `TrialSource` is the single seam between report pipelines and storage.
//! Sources return raw labels; normalization happens in the pipelines so
//! every backend shares one lookup table.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::category::Status;
use crate::config::SourceConfig;
use crate::trial::TrialRecord;
use crate::window::Window;

pub mod postgres;
pub mod sqlite;

pub use postgres::PgSource;
pub use sqlite::SqliteSource;

/// Study types admitted by [`StudyScope::Interventional`].
pub const INTERVENTIONAL_TYPES: [&str; 2] = ["INTERVENTIONAL", "Interventional"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StudyScope {
    All,
    Interventional,
}

impl StudyScope {
    pub fn interventional_only(self) -> bool {
        matches!(self, StudyScope::Interventional)
    }
}

/// Study count grouped by raw phase and raw status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPhaseStatusCount {
    pub phase: Option<String>,
    pub status: Option<String>,
    pub n: u64,
}

/// Study count grouped by lead sponsor and raw phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSponsorPhaseCount {
    pub sponsor: String,
    pub phase: Option<String>,
    pub n: u64,
}

/// Filter for studies with at least one date in a window.
#[derive(Debug, Clone, Copy)]
pub struct UpcomingQuery<'a> {
    pub scope: StudyScope,
    pub window: &'a Window,
    pub statuses: &'a [Status],
    /// Also fetch and aggregate intervention and condition names.
    pub with_aux: bool,
}

#[async_trait]
pub trait TrialSource: Send + Sync {
    /// Short name for logs.
    fn describe(&self) -> String;

    /// The instant the source is read at.
    async fn as_of(&self) -> Result<DateTime<Utc>>;

    async fn phase_status_counts(&self, scope: StudyScope) -> Result<Vec<RawPhaseStatusCount>>;

    /// Lead-sponsor counts over all studies.
    async fn sponsor_phase_counts(&self) -> Result<Vec<RawSponsorPhaseCount>>;

    /// Studies whose start, primary-completion or completion date falls in
    /// the window and whose raw status is one of the given statuses' variants.
    async fn upcoming_studies(&self, query: UpcomingQuery<'_>) -> Result<Vec<TrialRecord>>;
}

/// Open the source the configuration names.
pub async fn connect(config: &SourceConfig) -> Result<Box<dyn TrialSource>> {
    match config {
        SourceConfig::Postgres(settings) => Ok(Box::new(PgSource::connect(settings).await?)),
        SourceConfig::Snapshot(path) => Ok(Box::new(SqliteSource::open(path)?)),
    }
}

pub(crate) fn count_from_i64(n: i64) -> u64 {
    u64::try_from(n).unwrap_or(0)
}
