//! Core domain model for the FPL mirror: raw upstream record shapes and the
//! persisted row types they normalize into.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const CRATE_NAME: &str = "fpldash-core";

/// Subset of the bootstrap-static payload that gets mirrored locally.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BootstrapPayload {
    #[serde(default)]
    pub events: Vec<RawEvent>,
    #[serde(default)]
    pub teams: Vec<RawTeam>,
}

/// Raw gameweek record as served by the bootstrap endpoint.
///
/// Only `id` is required; everything else is tolerated as absent or null so
/// a malformed upstream record never sinks the whole batch.
#[derive(Debug, Clone, Deserialize)]
pub struct RawEvent {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub deadline_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_current: Option<bool>,
    #[serde(default)]
    pub is_next: Option<bool>,
    #[serde(default)]
    pub finished: Option<bool>,
    #[serde(default)]
    pub data_checked: Option<bool>,
    #[serde(default)]
    pub average_entry_score: Option<i64>,
    #[serde(default)]
    pub highest_score: Option<i64>,
}

/// Raw team record from the bootstrap endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct RawTeam {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub short_name: String,
    #[serde(default)]
    pub code: i64,
}

/// Raw fixture record from the fixtures endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct RawFixture {
    pub id: i64,
    /// Gameweek assignment; null until the fixture is scheduled.
    #[serde(default)]
    pub event: Option<i64>,
    #[serde(default)]
    pub kickoff_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub team_h: i64,
    #[serde(default)]
    pub team_a: i64,
    #[serde(default)]
    pub team_h_score: Option<i64>,
    #[serde(default)]
    pub team_a_score: Option<i64>,
    #[serde(default)]
    pub finished: Option<bool>,
    #[serde(default)]
    pub started: Option<bool>,
    #[serde(default)]
    pub provisional_start_time: Option<bool>,
    #[serde(default)]
    pub minutes: Option<i64>,
    #[serde(default)]
    pub code: Option<i64>,
}

/// Persisted gameweek row, keyed by the stable upstream id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRow {
    pub id: i64,
    pub name: String,
    pub deadline_time: Option<DateTime<Utc>>,
    pub is_current: bool,
    pub is_next: bool,
    pub finished: bool,
    pub data_checked: bool,
    pub average_entry_score: Option<i64>,
    pub highest_score: Option<i64>,
    pub updated_at: DateTime<Utc>,
}

/// Persisted team row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamRow {
    pub id: i64,
    pub name: String,
    pub short_name: String,
    pub code: i64,
    pub updated_at: DateTime<Utc>,
}

/// Persisted fixture row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixtureRow {
    pub id: i64,
    pub event_id: Option<i64>,
    pub kickoff_time: Option<DateTime<Utc>>,
    pub team_h_id: i64,
    pub team_a_id: i64,
    pub team_h_score: Option<i64>,
    pub team_a_score: Option<i64>,
    pub finished: bool,
    pub started: bool,
    pub provisional_start_time: bool,
    pub minutes: Option<i64>,
    pub code: Option<i64>,
    pub updated_at: DateTime<Utc>,
}

/// Normalize a raw gameweek, stamping `updated_at` with the sync time.
pub fn event_row(raw: &RawEvent, now: DateTime<Utc>) -> EventRow {
    EventRow {
        id: raw.id,
        name: raw.name.clone(),
        deadline_time: raw.deadline_time,
        is_current: raw.is_current.unwrap_or(false),
        is_next: raw.is_next.unwrap_or(false),
        finished: raw.finished.unwrap_or(false),
        data_checked: raw.data_checked.unwrap_or(false),
        average_entry_score: raw.average_entry_score,
        highest_score: raw.highest_score,
        updated_at: now,
    }
}

/// Normalize a raw team, stamping `updated_at` with the sync time.
pub fn team_row(raw: &RawTeam, now: DateTime<Utc>) -> TeamRow {
    TeamRow {
        id: raw.id,
        name: raw.name.clone(),
        short_name: raw.short_name.clone(),
        code: raw.code,
        updated_at: now,
    }
}

/// Normalize a raw fixture: `event` becomes `event_id`, `team_h`/`team_a`
/// become the home/away ids, flags coerce to false when absent, scores and
/// kickoff stay null until the match is played or scheduled.
pub fn fixture_row(raw: &RawFixture, now: DateTime<Utc>) -> FixtureRow {
    FixtureRow {
        id: raw.id,
        event_id: raw.event,
        kickoff_time: raw.kickoff_time,
        team_h_id: raw.team_h,
        team_a_id: raw.team_a,
        team_h_score: raw.team_h_score,
        team_a_score: raw.team_a_score,
        finished: raw.finished.unwrap_or(false),
        started: raw.started.unwrap_or(false),
        provisional_start_time: raw.provisional_start_time.unwrap_or(false),
        minutes: raw.minutes,
        code: raw.code,
        updated_at: now,
    }
}
