//! `PullRecord` — one extracted pull request.
//!
//! The server's JSON object is preserved verbatim for output: the extractor
//! never renames or drops a field it doesn't recognize. `PullRecord` is a
//! thin validating wrapper around the raw [`serde_json::Value`] node rather
//! than a fully-typed struct, per the "opaque value tree" design note — a
//! typed struct would have to enumerate every field GitHub might ever send.

use chrono::{DateTime, Utc};
use serde_json::Value;

/// The lifecycle state of a pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrState {
    Open,
    Closed,
    Merged,
}

impl PrState {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "OPEN" => Some(Self::Open),
            "CLOSED" => Some(Self::Closed),
            "MERGED" => Some(Self::Merged),
            _ => None,
        }
    }
}

/// A single node from a `pullRequests`/`search` connection, validated just
/// enough to drive pagination and the incremental watermark. The full JSON
/// object (including every field this type doesn't inspect) is what
/// actually reaches the [`crate::engine::sink::Sink`].
#[derive(Debug, Clone)]
pub struct PullRecord {
    raw: Value,
    number: i64,
    state: PrState,
    updated_at: DateTime<Utc>,
}

/// A required field was missing or had the wrong shape.
#[derive(Debug, thiserror::Error)]
#[error("pull request node missing or malformed field `{field}`")]
pub struct MalformedRecord {
    pub field: &'static str,
}

impl PullRecord {
    /// Validate a raw connection node. Required fields per the design
    /// documentation: `number`, `title`, `state`, `createdAt`, `updatedAt`,
    /// `url`. Missing optional fields (e.g. a deleted-user `author`) are
    /// left as JSON `null` in `raw` and do not fail validation.
    pub fn from_node(raw: Value) -> Result<Self, MalformedRecord> {
        let number = raw
            .get("number")
            .and_then(Value::as_i64)
            .ok_or(MalformedRecord { field: "number" })?;

        let _title = raw
            .get("title")
            .and_then(Value::as_str)
            .ok_or(MalformedRecord { field: "title" })?;

        let state = raw
            .get("state")
            .and_then(Value::as_str)
            .and_then(PrState::parse)
            .ok_or(MalformedRecord { field: "state" })?;

        let _created_at = raw
            .get("createdAt")
            .and_then(Value::as_str)
            .ok_or(MalformedRecord { field: "createdAt" })?;

        let updated_at_raw = raw
            .get("updatedAt")
            .and_then(Value::as_str)
            .ok_or(MalformedRecord { field: "updatedAt" })?;
        let updated_at = DateTime::parse_from_rfc3339(updated_at_raw)
            .map_err(|_| MalformedRecord { field: "updatedAt" })?
            .with_timezone(&Utc);

        let _url = raw
            .get("url")
            .and_then(Value::as_str)
            .ok_or(MalformedRecord { field: "url" })?;

        Ok(Self {
            raw,
            number,
            state,
            updated_at,
        })
    }

    pub fn number(&self) -> i64 {
        self.number
    }

    pub fn state(&self) -> PrState {
        self.state
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Consume the record, returning the untouched JSON value for the sink
    /// to serialize verbatim.
    pub fn into_value(self) -> Value {
        self.raw
    }
}
