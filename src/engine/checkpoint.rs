//! `Checkpointer` — durable, atomic persistence of [`FetchState`].
//!
//! Every write goes to a temp file in the same directory, fsynced, then
//! renamed over the real path, so a crash mid-write never leaves a
//! corrupt checkpoint behind. Corruption is instead caught on load, by
//! comparing the stored checksum against a fresh recomputation.

use crate::engine::model::FetchState;
use crate::errors::{RelayError, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub struct Checkpointer {
    state_dir: PathBuf,
}

impl Checkpointer {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
        }
    }

    fn path_for(&self, repository: &str) -> PathBuf {
        let safe_name = repository.replace('/', "-");
        self.state_dir.join(format!("{safe_name}.state"))
    }

    /// Load and verify the checkpoint for `repository`. Returns
    /// `Ok(None)` if no checkpoint file exists; a checksum mismatch is
    /// reported as [`RelayError::State`], not silently ignored.
    pub fn load(&self, repository: &str) -> Result<Option<FetchState>> {
        let path = self.path_for(repository);
        let bytes = match std::fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(RelayError::filesystem(e, path)),
        };

        let state: FetchState = serde_json::from_slice(&bytes)?;
        if !state.verify()? {
            return Err(RelayError::state_corrupt(&path));
        }
        if !state.is_internally_consistent() {
            return Err(RelayError::state_corrupt(&path));
        }
        Ok(Some(state))
    }

    /// Seal and durably persist `state`, replacing any prior checkpoint
    /// for the same repository. Called after every successfully committed
    /// page, never mid-page.
    pub fn save(&self, state: &mut FetchState) -> Result<()> {
        state.seal()?;
        let path = self.path_for(&state.repository);
        std::fs::create_dir_all(&self.state_dir)
            .map_err(|e| RelayError::filesystem(e, self.state_dir.clone()))?;

        let tmp_path = self.state_dir.join(format!(".{}.tmp", Uuid::new_v4()));
        write_atomic(&tmp_path, &path, &serde_json::to_vec_pretty(state)?)
    }
}

fn write_atomic(tmp_path: &Path, final_path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = std::fs::File::create(tmp_path)
        .map_err(|e| RelayError::filesystem(e, tmp_path.to_path_buf()))?;
    file.write_all(bytes)
        .map_err(|e| RelayError::filesystem(e, tmp_path.to_path_buf()))?;
    file.sync_all()
        .map_err(|e| RelayError::filesystem(e, tmp_path.to_path_buf()))?;
    drop(file);

    std::fs::rename(tmp_path, final_path)
        .map_err(|e| RelayError::filesystem(e, final_path.to_path_buf()))?;

    if let Some(dir) = final_path.parent() {
        if let Ok(dir_handle) = std::fs::File::open(dir) {
            let _ = dir_handle.sync_all();
        }
    }
    Ok(())
}
