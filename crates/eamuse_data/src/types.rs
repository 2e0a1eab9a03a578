//! Row types handed out by the stores.

use crate::validated::ValidatedDict;
use serde::{Deserialize, Serialize};

pub type UserId = i64;
pub type ArcadeId = i64;

/// A physical cabinet, keyed by its PCBID.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Machine {
    pub id: i64,
    pub pcbid: String,
    pub name: String,
    pub description: String,
    pub arcade: Option<ArcadeId>,
    pub port: u16,
    pub game: Option<String>,
    pub version: Option<i64>,
    pub data: ValidatedDict,
}

/// A location grouping machines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Arcade {
    pub id: ArcadeId,
    pub name: String,
    pub description: String,
    /// Holds `paseli_enabled` and `paseli_infinite` among anything else.
    pub data: ValidatedDict,
}

/// A user's best score on one song/chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub key: i64,
    pub song_id: i64,
    pub chart: i64,
    pub points: i64,
    /// When the record was set.
    pub timestamp: i64,
    /// When the row was last written.
    pub update: i64,
    pub location: i64,
    /// Attempts recorded for this song/chart.
    pub plays: i64,
    pub data: ValidatedDict,
}

/// One recorded play.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    pub key: i64,
    pub song_id: i64,
    pub chart: i64,
    pub points: i64,
    pub timestamp: i64,
    pub location: i64,
    pub new_record: bool,
    pub data: ValidatedDict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayCount {
    pub song_id: i64,
    pub chart: i64,
    pub plays: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastPlayed {
    pub song_id: i64,
    pub chart: i64,
    pub timestamp: i64,
}

/// A persisted observability or audit event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    pub event_type: String,
    pub timestamp: i64,
    pub userid: Option<UserId>,
    pub arcadeid: Option<ArcadeId>,
    pub data: ValidatedDict,
}

pub(crate) fn encode_blob(data: &ValidatedDict) -> Result<String, serde_json::Error> {
    serde_json::to_string(data)
}

pub(crate) fn decode_blob(text: &str) -> Result<ValidatedDict, serde_json::Error> {
    serde_json::from_str::<serde_json::Value>(text).map(ValidatedDict::from_value)
}
