use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::TryStreamExt;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use std::str::FromStr;

use super::{
    count_from_i64, RawPhaseStatusCount, RawSponsorPhaseCount, StudyScope, TrialSource,
    UpcomingQuery, INTERVENTIONAL_TYPES,
};
use crate::category::raw_status_filter;
use crate::config::PgSettings;
use crate::logging::{log, log_query, obj, v_str, Domain, Level, ProfileScope};
use crate::trial::{attach_aux, AuxRow, TrialRecord};

const SQL_AS_OF: &str = "select now() as ts";

const SQL_PHASE_STATUS: &str = "
select s.phase, s.overall_status, count(*)::bigint as n
from ctgov.studies s
where (not $1 or s.study_type = any($2))
group by 1, 2
";

const SQL_SPONSOR_PHASE: &str = "
select sp.name as sponsor, s.phase, count(*)::bigint as n
from ctgov.studies s
join ctgov.sponsors sp on sp.nct_id = s.nct_id
where sp.lead_or_collaborator = 'lead' and sp.name is not null
group by 1, 2
";

const SQL_UPCOMING: &str = "
select
  s.nct_id,
  s.brief_title,
  s.phase,
  s.overall_status,
  s.start_date, s.start_date_type,
  s.primary_completion_date, s.primary_completion_date_type,
  s.completion_date, s.completion_date_type,
  s.enrollment::bigint as enrollment, s.enrollment_type,
  s.last_update_posted_date,
  (select sp.name
     from ctgov.sponsors sp
     where sp.nct_id = s.nct_id and sp.lead_or_collaborator = 'lead'
     order by sp.name limit 1) as lead_sponsor
from ctgov.studies s
where (not $1 or s.study_type = any($2))
  and s.overall_status = any($3)
  and ((s.start_date >= $4 and s.start_date < $5)
    or (s.primary_completion_date >= $4 and s.primary_completion_date < $5)
    or (s.completion_date >= $4 and s.completion_date < $5))
";

const SQL_INTERVENTIONS: &str = "
select i.nct_id, i.intervention_type as kind, i.name
from ctgov.interventions i
where i.nct_id = any($1)
";

const SQL_CONDITIONS: &str = "
select c.nct_id, null::text as kind, c.name
from ctgov.conditions c
where c.nct_id = any($1)
";

/// Live AACT PostgreSQL source. One connection, one query at a time.
pub struct PgSource {
    pool: PgPool,
    label: String,
}

impl PgSource {
    pub async fn connect(settings: &PgSettings) -> Result<Self> {
        let label = format!("postgres://{}:{}/{}", settings.host, settings.port, settings.database);
        let url = settings.url()?;
        let options = PgConnectOptions::from_str(url.as_str())
            .with_context(|| format!("invalid connection settings for {}", label))?;
        let _scope = ProfileScope::with_context("pg_connect", &[("source", v_str(&label))]);
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .with_context(|| format!("failed to connect to {}", label))?;
        log(
            Level::Info,
            Domain::Source,
            "connected",
            obj(&[("source", v_str(&label)), ("user", v_str(&settings.user))]),
        );
        Ok(Self { pool, label })
    }

    async fn aux_rows(&self, sql: &str, ids: &[String]) -> Result<Vec<AuxRow>> {
        let rows = sqlx::query(sql)
            .bind(ids)
            .fetch_all(&self.pool)
            .await
            .context("auxiliary query failed")?;
        let aux = rows
            .iter()
            .map(|row| {
                Ok(AuxRow {
                    nct_id: row.try_get("nct_id")?,
                    kind: row.try_get("kind")?,
                    name: row.try_get("name")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()?;
        log_query("aux", aux.len());
        Ok(aux)
    }
}

fn interventional_types() -> Vec<String> {
    INTERVENTIONAL_TYPES.iter().map(|s| s.to_string()).collect()
}

fn decode_record(row: &PgRow) -> Result<TrialRecord, sqlx::Error> {
    Ok(TrialRecord {
        nct_id: row.try_get("nct_id")?,
        title: row.try_get("brief_title")?,
        phase_raw: row.try_get("phase")?,
        status_raw: row.try_get("overall_status")?,
        start_date: row.try_get("start_date")?,
        start_date_type: row.try_get("start_date_type")?,
        primary_completion_date: row.try_get("primary_completion_date")?,
        primary_completion_date_type: row.try_get("primary_completion_date_type")?,
        completion_date: row.try_get("completion_date")?,
        completion_date_type: row.try_get("completion_date_type")?,
        enrollment: row.try_get("enrollment")?,
        enrollment_type: row.try_get("enrollment_type")?,
        last_update_posted_date: row.try_get("last_update_posted_date")?,
        lead_sponsor: row.try_get("lead_sponsor")?,
        intervention_types: None,
        interventions: None,
        conditions: None,
    })
}

#[async_trait]
impl TrialSource for PgSource {
    fn describe(&self) -> String {
        self.label.clone()
    }

    async fn as_of(&self) -> Result<DateTime<Utc>> {
        let row = sqlx::query(SQL_AS_OF)
            .fetch_one(&self.pool)
            .await
            .context("as-of query failed")?;
        Ok(row.try_get("ts")?)
    }

    async fn phase_status_counts(&self, scope: StudyScope) -> Result<Vec<RawPhaseStatusCount>> {
        let _scope = ProfileScope::new("pg_phase_status_counts");
        let rows = sqlx::query(SQL_PHASE_STATUS)
            .bind(scope.interventional_only())
            .bind(interventional_types())
            .fetch_all(&self.pool)
            .await
            .context("phase/status query failed")?;
        let counts = rows
            .iter()
            .map(|row| {
                Ok(RawPhaseStatusCount {
                    phase: row.try_get("phase")?,
                    status: row.try_get("overall_status")?,
                    n: count_from_i64(row.try_get("n")?),
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()?;
        log_query("phase_status_counts", counts.len());
        Ok(counts)
    }

    async fn sponsor_phase_counts(&self) -> Result<Vec<RawSponsorPhaseCount>> {
        let _scope = ProfileScope::new("pg_sponsor_phase_counts");
        let rows = sqlx::query(SQL_SPONSOR_PHASE)
            .fetch_all(&self.pool)
            .await
            .context("sponsor/phase query failed")?;
        let counts = rows
            .iter()
            .map(|row| {
                Ok(RawSponsorPhaseCount {
                    sponsor: row.try_get("sponsor")?,
                    phase: row.try_get("phase")?,
                    n: count_from_i64(row.try_get("n")?),
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()?;
        log_query("sponsor_phase_counts", counts.len());
        Ok(counts)
    }

    async fn upcoming_studies(&self, query: UpcomingQuery<'_>) -> Result<Vec<TrialRecord>> {
        let _scope = ProfileScope::new("pg_upcoming_studies");
        let mut records = Vec::new();
        {
            let mut rows = sqlx::query(SQL_UPCOMING)
                .bind(query.scope.interventional_only())
                .bind(interventional_types())
                .bind(raw_status_filter(query.statuses))
                .bind(query.window.start)
                .bind(query.window.end())
                .fetch(&self.pool);
            while let Some(row) = rows.try_next().await.context("upcoming query failed")? {
                records.push(decode_record(&row)?);
            }
        }
        log_query("upcoming_studies", records.len());

        if query.with_aux && !records.is_empty() {
            let ids: Vec<String> = records.iter().map(|r| r.nct_id.clone()).collect();
            let interventions = self.aux_rows(SQL_INTERVENTIONS, &ids).await?;
            let conditions = self.aux_rows(SQL_CONDITIONS, &ids).await?;
            attach_aux(&mut records, &interventions, &conditions);
        }
        Ok(records)
    }
}
