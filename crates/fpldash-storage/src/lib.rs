//! Postgres-backed table store for the mirrored FPL datasets.
//!
//! All writes are idempotent upserts by primary key: existing rows with a
//! matching id are fully overwritten, absent rows are inserted, nothing is
//! ever deleted. Reads are the fixed ordered selects the dashboard tabs use.

use async_trait::async_trait;
use fpldash_core::{EventRow, FixtureRow, TeamRow};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use thiserror::Error;
use tracing::debug;

pub const CRATE_NAME: &str = "fpldash-storage";

pub const EVENTS_TABLE: &str = "events";
pub const TEAMS_TABLE: &str = "teams";
pub const FIXTURES_TABLE: &str = "fixtures";

/// Upper bound on rows per upsert statement; large collections are split
/// into consecutive chunks of at most this size by the caller.
pub const UPSERT_CHUNK: usize = 500;

/// Fixed row cap for the read views. Not a pagination protocol.
pub const VIEW_ROW_LIMIT: i64 = 500;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("upsert into {table} failed: {source}")]
    Write {
        table: &'static str,
        #[source]
        source: sqlx::Error,
    },
    #[error("select from {table} failed: {source}")]
    Read {
        table: &'static str,
        #[source]
        source: sqlx::Error,
    },
    #[error("store connection failed: {0}")]
    Connect(#[source] sqlx::Error),
    #[error("schema bootstrap failed: {0}")]
    Schema(#[source] sqlx::Error),
}

/// Persisted-table boundary, substitutable in tests.
///
/// Each upsert call is one store round-trip over one bounded batch; chunking
/// of oversized collections happens in the refresh pipeline.
#[async_trait]
pub trait TableStore: Send + Sync {
    async fn upsert_events(&self, rows: &[EventRow]) -> Result<u64, StorageError>;
    async fn upsert_teams(&self, rows: &[TeamRow]) -> Result<u64, StorageError>;
    async fn upsert_fixtures(&self, rows: &[FixtureRow]) -> Result<u64, StorageError>;

    async fn list_events(&self) -> Result<Vec<EventRow>, StorageError>;
    async fn list_teams(&self) -> Result<Vec<TeamRow>, StorageError>;
    async fn list_fixtures(&self) -> Result<Vec<FixtureRow>, StorageError>;
}

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(StorageError::Connect)?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the three mirror tables if they do not exist yet.
    pub async fn init_schema(&self) -> Result<(), StorageError> {
        for statement in [
            r#"
            CREATE TABLE IF NOT EXISTS events (
                id BIGINT PRIMARY KEY,
                name TEXT NOT NULL DEFAULT '',
                deadline_time TIMESTAMPTZ,
                is_current BOOLEAN NOT NULL DEFAULT FALSE,
                is_next BOOLEAN NOT NULL DEFAULT FALSE,
                finished BOOLEAN NOT NULL DEFAULT FALSE,
                data_checked BOOLEAN NOT NULL DEFAULT FALSE,
                average_entry_score BIGINT,
                highest_score BIGINT,
                updated_at TIMESTAMPTZ NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS teams (
                id BIGINT PRIMARY KEY,
                name TEXT NOT NULL DEFAULT '',
                short_name TEXT NOT NULL DEFAULT '',
                code BIGINT NOT NULL DEFAULT 0,
                updated_at TIMESTAMPTZ NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS fixtures (
                id BIGINT PRIMARY KEY,
                event_id BIGINT,
                kickoff_time TIMESTAMPTZ,
                team_h_id BIGINT NOT NULL,
                team_a_id BIGINT NOT NULL,
                team_h_score BIGINT,
                team_a_score BIGINT,
                finished BOOLEAN NOT NULL DEFAULT FALSE,
                started BOOLEAN NOT NULL DEFAULT FALSE,
                provisional_start_time BOOLEAN NOT NULL DEFAULT FALSE,
                minutes BIGINT,
                code BIGINT,
                updated_at TIMESTAMPTZ NOT NULL
            )
            "#,
        ] {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(StorageError::Schema)?;
        }
        Ok(())
    }
}

fn events_upsert(rows: &[EventRow]) -> QueryBuilder<'_, Postgres> {
    let mut qb = QueryBuilder::new(
        "INSERT INTO events (id, name, deadline_time, is_current, is_next, finished, \
         data_checked, average_entry_score, highest_score, updated_at) ",
    );
    qb.push_values(rows, |mut b, row| {
        b.push_bind(row.id)
            .push_bind(&row.name)
            .push_bind(row.deadline_time)
            .push_bind(row.is_current)
            .push_bind(row.is_next)
            .push_bind(row.finished)
            .push_bind(row.data_checked)
            .push_bind(row.average_entry_score)
            .push_bind(row.highest_score)
            .push_bind(row.updated_at);
    });
    qb.push(
        " ON CONFLICT (id) DO UPDATE SET \
         name = EXCLUDED.name, \
         deadline_time = EXCLUDED.deadline_time, \
         is_current = EXCLUDED.is_current, \
         is_next = EXCLUDED.is_next, \
         finished = EXCLUDED.finished, \
         data_checked = EXCLUDED.data_checked, \
         average_entry_score = EXCLUDED.average_entry_score, \
         highest_score = EXCLUDED.highest_score, \
         updated_at = EXCLUDED.updated_at",
    );
    qb
}

fn teams_upsert(rows: &[TeamRow]) -> QueryBuilder<'_, Postgres> {
    let mut qb =
        QueryBuilder::new("INSERT INTO teams (id, name, short_name, code, updated_at) ");
    qb.push_values(rows, |mut b, row| {
        b.push_bind(row.id)
            .push_bind(&row.name)
            .push_bind(&row.short_name)
            .push_bind(row.code)
            .push_bind(row.updated_at);
    });
    qb.push(
        " ON CONFLICT (id) DO UPDATE SET \
         name = EXCLUDED.name, \
         short_name = EXCLUDED.short_name, \
         code = EXCLUDED.code, \
         updated_at = EXCLUDED.updated_at",
    );
    qb
}

fn fixtures_upsert(rows: &[FixtureRow]) -> QueryBuilder<'_, Postgres> {
    let mut qb = QueryBuilder::new(
        "INSERT INTO fixtures (id, event_id, kickoff_time, team_h_id, team_a_id, \
         team_h_score, team_a_score, finished, started, provisional_start_time, \
         minutes, code, updated_at) ",
    );
    qb.push_values(rows, |mut b, row| {
        b.push_bind(row.id)
            .push_bind(row.event_id)
            .push_bind(row.kickoff_time)
            .push_bind(row.team_h_id)
            .push_bind(row.team_a_id)
            .push_bind(row.team_h_score)
            .push_bind(row.team_a_score)
            .push_bind(row.finished)
            .push_bind(row.started)
            .push_bind(row.provisional_start_time)
            .push_bind(row.minutes)
            .push_bind(row.code)
            .push_bind(row.updated_at);
    });
    qb.push(
        " ON CONFLICT (id) DO UPDATE SET \
         event_id = EXCLUDED.event_id, \
         kickoff_time = EXCLUDED.kickoff_time, \
         team_h_id = EXCLUDED.team_h_id, \
         team_a_id = EXCLUDED.team_a_id, \
         team_h_score = EXCLUDED.team_h_score, \
         team_a_score = EXCLUDED.team_a_score, \
         finished = EXCLUDED.finished, \
         started = EXCLUDED.started, \
         provisional_start_time = EXCLUDED.provisional_start_time, \
         minutes = EXCLUDED.minutes, \
         code = EXCLUDED.code, \
         updated_at = EXCLUDED.updated_at",
    );
    qb
}

fn decode_event(row: &PgRow) -> Result<EventRow, sqlx::Error> {
    Ok(EventRow {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        deadline_time: row.try_get("deadline_time")?,
        is_current: row.try_get("is_current")?,
        is_next: row.try_get("is_next")?,
        finished: row.try_get("finished")?,
        data_checked: row.try_get("data_checked")?,
        average_entry_score: row.try_get("average_entry_score")?,
        highest_score: row.try_get("highest_score")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn decode_team(row: &PgRow) -> Result<TeamRow, sqlx::Error> {
    Ok(TeamRow {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        short_name: row.try_get("short_name")?,
        code: row.try_get("code")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn decode_fixture(row: &PgRow) -> Result<FixtureRow, sqlx::Error> {
    Ok(FixtureRow {
        id: row.try_get("id")?,
        event_id: row.try_get("event_id")?,
        kickoff_time: row.try_get("kickoff_time")?,
        team_h_id: row.try_get("team_h_id")?,
        team_a_id: row.try_get("team_a_id")?,
        team_h_score: row.try_get("team_h_score")?,
        team_a_score: row.try_get("team_a_score")?,
        finished: row.try_get("finished")?,
        started: row.try_get("started")?,
        provisional_start_time: row.try_get("provisional_start_time")?,
        minutes: row.try_get("minutes")?,
        code: row.try_get("code")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl TableStore for PgStore {
    async fn upsert_events(&self, rows: &[EventRow]) -> Result<u64, StorageError> {
        if rows.is_empty() {
            return Ok(0);
        }
        let result = events_upsert(rows)
            .build()
            .execute(&self.pool)
            .await
            .map_err(|source| StorageError::Write {
                table: EVENTS_TABLE,
                source,
            })?;
        debug!(table = EVENTS_TABLE, written = result.rows_affected(), "upsert batch");
        Ok(result.rows_affected())
    }

    async fn upsert_teams(&self, rows: &[TeamRow]) -> Result<u64, StorageError> {
        if rows.is_empty() {
            return Ok(0);
        }
        let result = teams_upsert(rows)
            .build()
            .execute(&self.pool)
            .await
            .map_err(|source| StorageError::Write {
                table: TEAMS_TABLE,
                source,
            })?;
        debug!(table = TEAMS_TABLE, written = result.rows_affected(), "upsert batch");
        Ok(result.rows_affected())
    }

    async fn upsert_fixtures(&self, rows: &[FixtureRow]) -> Result<u64, StorageError> {
        if rows.is_empty() {
            return Ok(0);
        }
        let result = fixtures_upsert(rows)
            .build()
            .execute(&self.pool)
            .await
            .map_err(|source| StorageError::Write {
                table: FIXTURES_TABLE,
                source,
            })?;
        debug!(table = FIXTURES_TABLE, written = result.rows_affected(), "upsert batch");
        Ok(result.rows_affected())
    }

    async fn list_events(&self) -> Result<Vec<EventRow>, StorageError> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, deadline_time, is_current, is_next, finished, data_checked,
                   average_entry_score, highest_score, updated_at
              FROM events
             ORDER BY id
             LIMIT $1
            "#,
        )
        .bind(VIEW_ROW_LIMIT)
        .fetch_all(&self.pool)
        .await
        .map_err(|source| StorageError::Read {
            table: EVENTS_TABLE,
            source,
        })?;

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            out.push(decode_event(row).map_err(|source| StorageError::Read {
                table: EVENTS_TABLE,
                source,
            })?);
        }
        Ok(out)
    }

    async fn list_teams(&self) -> Result<Vec<TeamRow>, StorageError> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, short_name, code, updated_at
              FROM teams
             ORDER BY name
             LIMIT $1
            "#,
        )
        .bind(VIEW_ROW_LIMIT)
        .fetch_all(&self.pool)
        .await
        .map_err(|source| StorageError::Read {
            table: TEAMS_TABLE,
            source,
        })?;

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            out.push(decode_team(row).map_err(|source| StorageError::Read {
                table: TEAMS_TABLE,
                source,
            })?);
        }
        Ok(out)
    }

    async fn list_fixtures(&self) -> Result<Vec<FixtureRow>, StorageError> {
        let rows = sqlx::query(
            r#"
            SELECT id, event_id, kickoff_time, team_h_id, team_a_id, team_h_score,
                   team_a_score, finished, started, provisional_start_time, minutes,
                   code, updated_at
              FROM fixtures
             ORDER BY kickoff_time ASC NULLS LAST, id
             LIMIT $1
            "#,
        )
        .bind(VIEW_ROW_LIMIT)
        .fetch_all(&self.pool)
        .await
        .map_err(|source| StorageError::Read {
            table: FIXTURES_TABLE,
            source,
        })?;

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            out.push(decode_fixture(row).map_err(|source| StorageError::Read {
                table: FIXTURES_TABLE,
                source,
            })?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn sample_event() -> EventRow {
        EventRow {
            id: 1,
            name: "GW1".into(),
            deadline_time: None,
            is_current: true,
            is_next: false,
            finished: false,
            data_checked: false,
            average_entry_score: None,
            highest_score: None,
            updated_at: Utc.with_ymd_and_hms(2024, 8, 16, 12, 0, 0).single().unwrap(),
        }
    }

    #[test]
    fn upsert_statements_overwrite_on_conflict_by_id() {
        let rows = vec![sample_event()];
        let sql = events_upsert(&rows).sql().to_string();
        assert!(sql.starts_with("INSERT INTO events"));
        assert!(sql.contains("ON CONFLICT (id) DO UPDATE SET"));
        assert!(sql.contains("updated_at = EXCLUDED.updated_at"));
    }

    #[test]
    fn upsert_statement_binds_one_tuple_per_row() {
        let rows = vec![sample_event(), EventRow { id: 2, ..sample_event() }];
        let sql = events_upsert(&rows).sql().to_string();
        // Ten columns per row; the second tuple starts at placeholder $11.
        assert!(sql.contains("$10"));
        assert!(sql.contains("$11"));
        assert!(!sql.contains("$21"));
    }
}
