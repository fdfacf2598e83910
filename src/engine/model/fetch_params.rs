//! `FetchParameters` — the immutable inputs of one invocation.

use std::path::PathBuf;
use std::time::Duration;

/// Which shape of pagination the `QueryPlanner` should drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    /// Complete after the first successful page regardless of `hasNextPage`.
    FirstPage,
    /// Walk the entire `repository.pullRequests` connection.
    All,
    /// Walk the `search` connection bounded by the prior watermark.
    Incremental,
}

/// The frozen inputs of a single `fetch` invocation. Built by [`crate::config`]
/// from CLI flags, environment variables, and the config file, honoring the
/// documented precedence. Never serialized with the auth token attached —
/// see [`FetchParameters::redacted`].
#[derive(Debug, Clone)]
pub struct FetchParameters {
    pub owner: String,
    pub name: String,
    pub batch_size: u32,
    pub since: Option<chrono::NaiveDate>,
    pub until: Option<chrono::NaiveDate>,
    pub mode: FetchMode,
    pub output_path: String,
    pub state_dir: PathBuf,
    pub metadata_path: PathBuf,
    pub request_timeout: Duration,
    pub graphql_endpoint: String,
    pub auth_token: String,
}

impl FetchParameters {
    pub fn repository(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }

    /// A copy with the auth token scrubbed, suitable for embedding in
    /// `FetchMetadata` or a log line.
    pub fn redacted(&self) -> RedactedParameters<'_> {
        RedactedParameters(self)
    }
}

/// `Display`/`Serialize` view of [`FetchParameters`] that omits `auth_token`.
pub struct RedactedParameters<'a>(&'a FetchParameters);

impl serde::Serialize for RedactedParameters<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let p = self.0;
        let mut s = serializer.serialize_struct("FetchParameters", 9)?;
        s.serialize_field("repository", &p.repository())?;
        s.serialize_field("batch_size", &p.batch_size)?;
        s.serialize_field("since", &p.since)?;
        s.serialize_field("until", &p.until)?;
        s.serialize_field(
            "mode",
            match p.mode {
                FetchMode::FirstPage => "first-page",
                FetchMode::All => "all",
                FetchMode::Incremental => "incremental",
            },
        )?;
        s.serialize_field("output_path", &p.output_path)?;
        s.serialize_field("state_dir", &p.state_dir)?;
        s.serialize_field("metadata_path", &p.metadata_path)?;
        s.serialize_field("graphql_endpoint", &p.graphql_endpoint)?;
        s.end()
    }
}
