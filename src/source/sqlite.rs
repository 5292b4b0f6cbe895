//! Local SQLite snapshot of the AACT tables.
//!
//! Same table and column names as the `ctgov` schema, unqualified. Dates
//! are ISO-8601 text so string comparison orders them. An optional
//! `snapshot_meta` table pins the as-of timestamp of the snapshot.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection, OpenFlags, OptionalExtension, Row};
use std::path::Path;
use std::sync::Mutex;

use super::{
    count_from_i64, RawPhaseStatusCount, RawSponsorPhaseCount, StudyScope, TrialSource,
    UpcomingQuery, INTERVENTIONAL_TYPES,
};
use crate::category::raw_status_filter;
use crate::logging::{log, log_query, obj, v_str, Domain, Level, ProfileScope};
use crate::trial::{attach_aux, AuxRow, TrialRecord};

pub const SNAPSHOT_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS studies (
    nct_id TEXT PRIMARY KEY,
    brief_title TEXT,
    study_type TEXT,
    phase TEXT,
    overall_status TEXT,
    start_date TEXT,
    start_date_type TEXT,
    primary_completion_date TEXT,
    primary_completion_date_type TEXT,
    completion_date TEXT,
    completion_date_type TEXT,
    enrollment INTEGER,
    enrollment_type TEXT,
    last_update_posted_date TEXT
);
CREATE TABLE IF NOT EXISTS sponsors (
    nct_id TEXT NOT NULL,
    name TEXT,
    lead_or_collaborator TEXT
);
CREATE TABLE IF NOT EXISTS interventions (
    nct_id TEXT NOT NULL,
    intervention_type TEXT,
    name TEXT
);
CREATE TABLE IF NOT EXISTS conditions (
    nct_id TEXT NOT NULL,
    name TEXT
);
CREATE TABLE IF NOT EXISTS snapshot_meta (
    key TEXT PRIMARY KEY,
    value TEXT
);
";

/// Ids per auxiliary query, below SQLite's host parameter limit.
const AUX_CHUNK: usize = 500;

pub struct SqliteSource {
    conn: Mutex<Connection>,
    label: String,
}

impl SqliteSource {
    /// Open an existing snapshot read-only.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("failed to open snapshot {}", path.display()))?;
        let source = Self::from_connection(conn, format!("snapshot:{}", path.display()));
        log(
            Level::Info,
            Domain::Source,
            "connected",
            obj(&[("source", v_str(&source.label))]),
        );
        Ok(source)
    }

    /// Create (or extend) a snapshot file with the snapshot schema.
    pub fn create(path: &Path) -> Result<Connection> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to create snapshot {}", path.display()))?;
        init_schema(&conn)?;
        Ok(conn)
    }

    pub fn from_connection(conn: Connection, label: String) -> Self {
        Self { conn: Mutex::new(conn), label }
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.conn.lock().map_err(|_| anyhow!("snapshot connection poisoned"))?;
        f(&conn)
    }
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(&format!("BEGIN;{}COMMIT;", SNAPSHOT_SCHEMA))?;
    Ok(())
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn text(s: impl Into<String>) -> SqlValue {
    SqlValue::Text(s.into())
}

fn date_value(d: NaiveDate) -> SqlValue {
    text(d.format("%Y-%m-%d").to_string())
}

/// `where` fragment and parameters restricting to interventional studies.
fn scope_filter(scope: StudyScope) -> (String, Vec<SqlValue>) {
    if scope.interventional_only() {
        (
            format!("s.study_type in ({})", placeholders(INTERVENTIONAL_TYPES.len())),
            INTERVENTIONAL_TYPES.iter().map(|t| text(*t)).collect(),
        )
    } else {
        ("1 = 1".to_string(), Vec::new())
    }
}

fn parse_as_of(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

fn decode_record(row: &Row<'_>) -> rusqlite::Result<TrialRecord> {
    Ok(TrialRecord {
        nct_id: row.get("nct_id")?,
        title: row.get("brief_title")?,
        phase_raw: row.get("phase")?,
        status_raw: row.get("overall_status")?,
        start_date: row.get("start_date")?,
        start_date_type: row.get("start_date_type")?,
        primary_completion_date: row.get("primary_completion_date")?,
        primary_completion_date_type: row.get("primary_completion_date_type")?,
        completion_date: row.get("completion_date")?,
        completion_date_type: row.get("completion_date_type")?,
        enrollment: row.get("enrollment")?,
        enrollment_type: row.get("enrollment_type")?,
        last_update_posted_date: row.get("last_update_posted_date")?,
        lead_sponsor: row.get("lead_sponsor")?,
        intervention_types: None,
        interventions: None,
        conditions: None,
    })
}

fn aux_rows(conn: &Connection, table_sql: &str, ids: &[String]) -> Result<Vec<AuxRow>> {
    let mut out = Vec::new();
    for chunk in ids.chunks(AUX_CHUNK) {
        let sql = format!("{} where nct_id in ({})", table_sql, placeholders(chunk.len()));
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(chunk.iter()), |row| {
            Ok(AuxRow {
                nct_id: row.get("nct_id")?,
                kind: row.get("kind")?,
                name: row.get("name")?,
            })
        })?;
        for row in rows {
            out.push(row?);
        }
    }
    log_query("aux", out.len());
    Ok(out)
}

#[async_trait]
impl TrialSource for SqliteSource {
    fn describe(&self) -> String {
        self.label.clone()
    }

    async fn as_of(&self) -> Result<DateTime<Utc>> {
        self.with_conn(|conn| {
            let has_meta: bool = conn
                .query_row(
                    "select count(*) > 0 from sqlite_master where type = 'table' and name = 'snapshot_meta'",
                    [],
                    |row| row.get(0),
                )?;
            if !has_meta {
                return Ok(Utc::now());
            }
            let raw: Option<String> = conn
                .query_row("select value from snapshot_meta where key = 'as_of'", [], |row| {
                    row.get::<_, Option<String>>(0)
                })
                .optional()?
                .flatten();
            match raw {
                None => Ok(Utc::now()),
                Some(raw) => parse_as_of(&raw)
                    .ok_or_else(|| anyhow!("snapshot_meta.as_of is not a timestamp: {:?}", raw)),
            }
        })
    }

    async fn phase_status_counts(&self, scope: StudyScope) -> Result<Vec<RawPhaseStatusCount>> {
        let _scope = ProfileScope::new("sqlite_phase_status_counts");
        let (filter, params) = scope_filter(scope);
        let sql = format!(
            "select s.phase, s.overall_status, count(*) as n from studies s where {} group by 1, 2",
            filter
        );
        let counts = self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(params), |row| {
                Ok(RawPhaseStatusCount {
                    phase: row.get(0)?,
                    status: row.get(1)?,
                    n: count_from_i64(row.get(2)?),
                })
            })?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .context("phase/status query failed")
        })?;
        log_query("phase_status_counts", counts.len());
        Ok(counts)
    }

    async fn sponsor_phase_counts(&self) -> Result<Vec<RawSponsorPhaseCount>> {
        let _scope = ProfileScope::new("sqlite_sponsor_phase_counts");
        let counts = self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "select sp.name, s.phase, count(*) as n
                 from studies s
                 join sponsors sp on sp.nct_id = s.nct_id
                 where sp.lead_or_collaborator = 'lead' and sp.name is not null
                 group by 1, 2",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok(RawSponsorPhaseCount {
                    sponsor: row.get(0)?,
                    phase: row.get(1)?,
                    n: count_from_i64(row.get(2)?),
                })
            })?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .context("sponsor/phase query failed")
        })?;
        log_query("sponsor_phase_counts", counts.len());
        Ok(counts)
    }

    async fn upcoming_studies(&self, query: UpcomingQuery<'_>) -> Result<Vec<TrialRecord>> {
        let _scope = ProfileScope::new("sqlite_upcoming_studies");
        let (filter, mut params) = scope_filter(query.scope);
        let statuses = raw_status_filter(query.statuses);
        let sql = format!(
            "select
               s.nct_id, s.brief_title, s.phase, s.overall_status,
               s.start_date, s.start_date_type,
               s.primary_completion_date, s.primary_completion_date_type,
               s.completion_date, s.completion_date_type,
               s.enrollment, s.enrollment_type, s.last_update_posted_date,
               (select sp.name from sponsors sp
                  where sp.nct_id = s.nct_id and sp.lead_or_collaborator = 'lead'
                  order by sp.name limit 1) as lead_sponsor
             from studies s
             where {filter}
               and s.overall_status in ({statuses})
               and ((s.start_date >= ? and s.start_date < ?)
                 or (s.primary_completion_date >= ? and s.primary_completion_date < ?)
                 or (s.completion_date >= ? and s.completion_date < ?))
             order by s.nct_id",
            filter = filter,
            statuses = placeholders(statuses.len()),
        );
        params.extend(statuses.into_iter().map(text));
        for _ in 0..3 {
            params.push(date_value(query.window.start));
            params.push(date_value(query.window.end()));
        }

        let records = self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(params), decode_record)?;
            let mut records = rows
                .collect::<rusqlite::Result<Vec<_>>>()
                .context("upcoming query failed")?;
            log_query("upcoming_studies", records.len());

            if query.with_aux && !records.is_empty() {
                let ids: Vec<String> = records.iter().map(|r| r.nct_id.clone()).collect();
                let interventions = aux_rows(
                    conn,
                    "select nct_id, intervention_type as kind, name from interventions",
                    &ids,
                )?;
                let conditions =
                    aux_rows(conn, "select nct_id, null as kind, name from conditions", &ids)?;
                attach_aux(&mut records, &interventions, &conditions);
            }
            Ok(records)
        })?;
        Ok(records)
    }
}
