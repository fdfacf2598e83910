//! `FetchState` — the resumable checkpoint for one repository.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// The on-disk (and in-memory mirror) shape of a repository's checkpoint.
///
/// Invariants: `checksum` validates the other fields (see
/// [`FetchState::checksum_hex`]); if `last_cursor` is `Some`, then
/// `last_issue_number` is also `Some`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FetchState {
    pub repository: String,
    pub last_cursor: Option<String>,
    pub last_issue_number: Option<i64>,
    pub prs_written: u64,
    pub watermark: Option<DateTime<Utc>>,
    pub fetch_started_at: DateTime<Utc>,
    pub fetch_id: String,
    #[serde(default)]
    pub checksum: String,
}

impl FetchState {
    pub fn new(repository: String, fetch_id: String, fetch_started_at: DateTime<Utc>) -> Self {
        Self {
            repository,
            last_cursor: None,
            last_issue_number: None,
            prs_written: 0,
            watermark: None,
            fetch_started_at,
            fetch_id,
            checksum: String::new(),
        }
    }

    /// Compute the checksum over the canonical serialization of every field
    /// except `checksum` itself (held empty during hashing).
    pub fn checksum_hex(&self) -> Result<String, serde_json::Error> {
        let mut clean = self.clone();
        clean.checksum = String::new();
        let canonical = serde_json::to_vec(&clean)?;
        let mut hasher = Sha256::new();
        hasher.update(&canonical);
        Ok(hex::encode(hasher.finalize()))
    }

    /// Stamp `self.checksum` with the freshly computed digest.
    pub fn seal(&mut self) -> Result<(), serde_json::Error> {
        self.checksum = self.checksum_hex()?;
        Ok(())
    }

    /// `true` if the stored checksum matches a fresh recomputation.
    pub fn verify(&self) -> Result<bool, serde_json::Error> {
        Ok(self.checksum == self.checksum_hex()?)
    }

    /// Invariant: a non-null cursor implies a known last issue number.
    pub fn is_internally_consistent(&self) -> bool {
        self.last_cursor.is_none() || self.last_issue_number.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_round_trips() {
        let mut state = FetchState::new("o/r".into(), "fetch-1".into(), Utc::now());
        state.last_cursor = Some("cursor123".into());
        state.last_issue_number = Some(10);
        state.prs_written = 10;
        state.seal().unwrap();
        assert!(state.verify().unwrap());
    }

    #[test]
    fn tampering_invalidates_checksum() {
        let mut state = FetchState::new("o/r".into(), "fetch-1".into(), Utc::now());
        state.seal().unwrap();
        state.prs_written = 999;
        assert!(!state.verify().unwrap());
    }

    #[test]
    fn cursor_without_issue_number_is_inconsistent() {
        let mut state = FetchState::new("o/r".into(), "fetch-1".into(), Utc::now());
        state.last_cursor = Some("c".into());
        assert!(!state.is_internally_consistent());
        state.last_issue_number = Some(1);
        assert!(state.is_internally_consistent());
    }
}
