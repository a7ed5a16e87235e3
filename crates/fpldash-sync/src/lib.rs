//! Refresh pipeline orchestration.
//!
//! Each refresh is one linear pass: fetch the upstream dataset, normalize
//! every record, upsert into the persisted tables. Any stage failure aborts
//! the remainder of the invocation; the caller re-runs the whole cycle.

use chrono::{DateTime, Utc};
use fpldash_core::{event_row, fixture_row, team_row};
use fpldash_storage::{StorageError, TableStore, UPSERT_CHUNK};
use fpldash_upstream::{FplApi, UpstreamError};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, info_span};
use uuid::Uuid;

pub const CRATE_NAME: &str = "fpldash-sync";

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Outcome of one events+teams refresh: mapped record counts per table.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct EventsTeamsRefresh {
    pub events: u64,
    pub teams: u64,
}

/// Outcome of one fixtures refresh.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct FixturesRefresh {
    pub fixtures: u64,
}

/// Mirror gameweeks and teams from the bootstrap endpoint.
///
/// The two tables are written sequentially, not transactionally: a teams
/// failure after events landed leaves events committed, and the cycle is
/// safe to re-run end to end.
pub async fn refresh_events_teams(
    api: &dyn FplApi,
    store: &dyn TableStore,
    now: DateTime<Utc>,
) -> Result<EventsTeamsRefresh, SyncError> {
    let run_id = Uuid::new_v4();
    let span = info_span!("refresh_events_teams", %run_id);
    let _guard = span.enter();

    let payload = api.fetch_bootstrap().await?;
    let events: Vec<_> = payload.events.iter().map(|raw| event_row(raw, now)).collect();
    let teams: Vec<_> = payload.teams.iter().map(|raw| team_row(raw, now)).collect();

    store.upsert_events(&events).await.inspect_err(log_stage)?;
    store.upsert_teams(&teams).await.inspect_err(log_stage)?;

    let summary = EventsTeamsRefresh {
        events: events.len() as u64,
        teams: teams.len() as u64,
    };
    info!(
        events = summary.events,
        teams = summary.teams,
        "events+teams refresh complete"
    );
    Ok(summary)
}

/// Mirror the fixtures list, upserting in chunks of at most
/// [`UPSERT_CHUNK`] rows. Chunks already committed before a failure stay
/// persisted; the remaining chunks are abandoned.
pub async fn refresh_fixtures(
    api: &dyn FplApi,
    store: &dyn TableStore,
    now: DateTime<Utc>,
) -> Result<FixturesRefresh, SyncError> {
    let run_id = Uuid::new_v4();
    let span = info_span!("refresh_fixtures", %run_id);
    let _guard = span.enter();

    let raw = api.fetch_fixtures().await?;
    let rows: Vec<_> = raw.iter().map(|f| fixture_row(f, now)).collect();

    let mut written = 0u64;
    for chunk in rows.chunks(UPSERT_CHUNK) {
        store.upsert_fixtures(chunk).await.inspect_err(log_stage)?;
        written += chunk.len() as u64;
    }

    info!(fixtures = written, "fixtures refresh complete");
    Ok(FixturesRefresh { fixtures: written })
}

fn log_stage(err: &StorageError) {
    error!(error = %err, "refresh write stage failed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use fpldash_core::{BootstrapPayload, EventRow, FixtureRow, RawEvent, RawFixture, RawTeam, TeamRow};
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 8, 16, 12, 0, 0).single().unwrap()
    }

    struct StubApi {
        events: Vec<RawEvent>,
        teams: Vec<RawTeam>,
        fixtures: Vec<RawFixture>,
    }

    impl StubApi {
        fn fixtures_only(fixtures: Vec<RawFixture>) -> Self {
            Self {
                events: vec![],
                teams: vec![],
                fixtures,
            }
        }
    }

    #[async_trait]
    impl FplApi for StubApi {
        async fn fetch_bootstrap(&self) -> Result<BootstrapPayload, UpstreamError> {
            Ok(BootstrapPayload {
                events: self.events.clone(),
                teams: self.teams.clone(),
            })
        }

        async fn fetch_fixtures(&self) -> Result<Vec<RawFixture>, UpstreamError> {
            Ok(self.fixtures.clone())
        }
    }

    #[derive(Default)]
    struct MemStore {
        events: Mutex<BTreeMap<i64, EventRow>>,
        teams: Mutex<BTreeMap<i64, TeamRow>>,
        fixtures: Mutex<BTreeMap<i64, FixtureRow>>,
        fixture_batches: Mutex<Vec<usize>>,
        fixture_calls: AtomicUsize,
        fail_teams: bool,
        fail_fixture_call: Option<usize>,
    }

    fn write_err(table: &'static str) -> StorageError {
        StorageError::Write {
            table,
            source: sqlx::Error::RowNotFound,
        }
    }

    #[async_trait]
    impl TableStore for MemStore {
        async fn upsert_events(&self, rows: &[EventRow]) -> Result<u64, StorageError> {
            let mut map = self.events.lock().unwrap();
            for row in rows {
                map.insert(row.id, row.clone());
            }
            Ok(rows.len() as u64)
        }

        async fn upsert_teams(&self, rows: &[TeamRow]) -> Result<u64, StorageError> {
            if self.fail_teams {
                return Err(write_err("teams"));
            }
            let mut map = self.teams.lock().unwrap();
            for row in rows {
                map.insert(row.id, row.clone());
            }
            Ok(rows.len() as u64)
        }

        async fn upsert_fixtures(&self, rows: &[FixtureRow]) -> Result<u64, StorageError> {
            let call = self.fixture_calls.fetch_add(1, Ordering::SeqCst) + 1;
            self.fixture_batches.lock().unwrap().push(rows.len());
            if self.fail_fixture_call == Some(call) {
                return Err(write_err("fixtures"));
            }
            let mut map = self.fixtures.lock().unwrap();
            for row in rows {
                map.insert(row.id, row.clone());
            }
            Ok(rows.len() as u64)
        }

        async fn list_events(&self) -> Result<Vec<EventRow>, StorageError> {
            Ok(self.events.lock().unwrap().values().cloned().collect())
        }

        async fn list_teams(&self) -> Result<Vec<TeamRow>, StorageError> {
            Ok(self.teams.lock().unwrap().values().cloned().collect())
        }

        async fn list_fixtures(&self) -> Result<Vec<FixtureRow>, StorageError> {
            Ok(self.fixtures.lock().unwrap().values().cloned().collect())
        }
    }

    fn sample_bootstrap() -> StubApi {
        StubApi {
            events: vec![serde_json::from_str(
                r#"{"id":1,"name":"GW1","deadline_time":"2024-08-16T17:30:00Z",
                    "is_current":true,"is_next":false,"finished":false,
                    "data_checked":false,"average_entry_score":null,"highest_score":null}"#,
            )
            .unwrap()],
            teams: vec![serde_json::from_str(
                r#"{"id":1,"name":"Arsenal","short_name":"ARS","code":3}"#,
            )
            .unwrap()],
            fixtures: vec![],
        }
    }

    fn raw_fixtures(n: i64) -> Vec<RawFixture> {
        (1..=n)
            .map(|id| {
                serde_json::from_str(&format!(
                    r#"{{"id":{id},"team_h":1,"team_a":2}}"#
                ))
                .unwrap()
            })
            .collect()
    }

    #[tokio::test]
    async fn events_teams_refresh_persists_and_counts() {
        let api = sample_bootstrap();
        let store = MemStore::default();

        let summary = refresh_events_teams(&api, &store, fixed_now()).await.unwrap();
        assert_eq!(summary.events, 1);
        assert_eq!(summary.teams, 1);

        let events = store.events.lock().unwrap();
        let event = events.get(&1).unwrap();
        assert_eq!(event.name, "GW1");
        assert!(event.is_current);
        assert_eq!(event.updated_at, fixed_now());

        let teams = store.teams.lock().unwrap();
        let team = teams.get(&1).unwrap();
        assert_eq!(team.short_name, "ARS");
        assert_eq!(team.code, 3);
    }

    #[tokio::test]
    async fn rerunning_events_teams_is_idempotent() {
        let api = sample_bootstrap();
        let store = MemStore::default();

        let first = refresh_events_teams(&api, &store, fixed_now()).await.unwrap();
        let second = refresh_events_teams(&api, &store, fixed_now()).await.unwrap();
        assert_eq!(first.events, second.events);
        assert_eq!(first.teams, second.teams);
        assert_eq!(store.events.lock().unwrap().len(), 1);
        assert_eq!(store.teams.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn teams_failure_leaves_events_committed() {
        let api = sample_bootstrap();
        let store = MemStore {
            fail_teams: true,
            ..MemStore::default()
        };

        let err = refresh_events_teams(&api, &store, fixed_now()).await.unwrap_err();
        assert!(matches!(err, SyncError::Storage(_)));
        assert_eq!(store.events.lock().unwrap().len(), 1);
        assert!(store.teams.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn fixtures_upsert_in_chunks_of_at_most_500() {
        let api = StubApi::fixtures_only(raw_fixtures(1001));
        let store = MemStore::default();

        let summary = refresh_fixtures(&api, &store, fixed_now()).await.unwrap();
        assert_eq!(summary.fixtures, 1001);
        assert_eq!(*store.fixture_batches.lock().unwrap(), vec![500, 500, 1]);
        assert_eq!(store.fixtures.lock().unwrap().len(), 1001);
    }

    #[tokio::test]
    async fn failed_chunk_aborts_the_rest_but_keeps_prior_chunks() {
        let api = StubApi::fixtures_only(raw_fixtures(1200));
        let store = MemStore {
            fail_fixture_call: Some(2),
            ..MemStore::default()
        };

        let err = refresh_fixtures(&api, &store, fixed_now()).await.unwrap_err();
        assert!(matches!(err, SyncError::Storage(_)));
        // Chunk one landed, chunk two failed, chunk three never ran.
        assert_eq!(store.fixture_batches.lock().unwrap().len(), 2);
        assert_eq!(store.fixtures.lock().unwrap().len(), 500);
    }

    #[tokio::test]
    async fn rerunning_fixtures_keeps_exactly_one_row_per_id() {
        let api = StubApi::fixtures_only(raw_fixtures(42));
        let store = MemStore::default();

        refresh_fixtures(&api, &store, fixed_now()).await.unwrap();
        let second = refresh_fixtures(&api, &store, fixed_now()).await.unwrap();
        assert_eq!(second.fixtures, 42);
        assert_eq!(store.fixtures.lock().unwrap().len(), 42);
    }

    #[tokio::test]
    async fn empty_fixtures_write_nothing() {
        let api = StubApi::fixtures_only(vec![]);
        let store = MemStore::default();

        let summary = refresh_fixtures(&api, &store, fixed_now()).await.unwrap();
        assert_eq!(summary.fixtures, 0);
        assert!(store.fixture_batches.lock().unwrap().is_empty());
    }
}
