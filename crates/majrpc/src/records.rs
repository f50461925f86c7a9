//! Typed views over gateway payloads.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tournament contest, as returned by contest lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contest {
    /// Internal contest id, used by every follow-up call.
    pub unique_id: u64,
    /// The short id players search by.
    pub friendly_id: u64,
    pub name: String,
    /// Milliseconds since the epoch. The gateway reports seconds.
    pub created_time_ms: u64,
    pub start_time_ms: u64,
    pub finish_time_ms: u64,
}

/// A player found by friendly-id search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub account_id: u64,
    pub nickname: String,
}

/// The signed-in account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub account_id: u64,
    pub nickname: String,
}

/// One decoded step inside a finished game's record stream.
#[derive(Debug, Clone)]
pub struct GameStep {
    /// The schema message name the step was wrapped in.
    pub name: String,
    pub data: Value,
}

/// A finished game: the response metadata plus the decoded step stream.
#[derive(Debug, Clone)]
pub struct GameRecord {
    /// The raw `fetchGameRecord` response, minus the undecoded data blob.
    pub head: Value,
    pub steps: Vec<GameStep>,
}
