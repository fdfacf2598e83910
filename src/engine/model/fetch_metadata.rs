//! `FetchMetadata` — the sidecar summary written once at termination.

use super::fetch_params::FetchParameters;
use serde::Serialize;

/// Constant identifying the query family this crate speaks. Bumped only
/// when the shape of the GraphQL documents changes in a way a consumer of
/// the metadata sidecar would care about.
pub const METHOD_VERSION: &str = "graphql-all-in-one-v1";

#[derive(Debug, Clone, Serialize)]
pub struct FetchResults {
    pub total_prs: u64,
    pub api_calls: u64,
    pub duration_ms: u64,
    pub complete: bool,
}

/// Serialized once, at FINALIZING or ABORTING.
#[derive(Debug, Serialize)]
pub struct FetchMetadata<'a> {
    pub relay_version: &'static str,
    pub method_version: &'static str,
    pub fetch_id: String,
    pub parameters: super::fetch_params::RedactedParameters<'a>,
    pub results: FetchResults,
    pub incremental: bool,
    pub previous_fetch: Option<String>,
}

impl<'a> FetchMetadata<'a> {
    pub fn new(
        params: &'a FetchParameters,
        fetch_id: String,
        results: FetchResults,
        incremental: bool,
        previous_fetch: Option<String>,
    ) -> Self {
        Self {
            relay_version: env!("CARGO_PKG_VERSION"),
            method_version: METHOD_VERSION,
            fetch_id,
            parameters: params.redacted(),
            results,
            incremental,
            previous_fetch,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::model::FetchMode;
    use std::path::PathBuf;
    use std::time::Duration;

    #[test]
    fn redacted_parameters_omit_the_auth_token() {
        let params = FetchParameters {
            owner: "octo".into(),
            name: "demo".into(),
            batch_size: 50,
            since: None,
            until: None,
            mode: FetchMode::All,
            output_path: "-".into(),
            state_dir: PathBuf::from(".sirseer-relay/state"),
            metadata_path: PathBuf::from("fetch-metadata.json"),
            request_timeout: Duration::from_secs(60),
            graphql_endpoint: "https://api.github.com/graphql".into(),
            auth_token: "super-secret".into(),
        };
        let metadata = FetchMetadata::new(
            &params,
            "fetch-1".into(),
            FetchResults {
                total_prs: 0,
                api_calls: 0,
                duration_ms: 0,
                complete: true,
            },
            false,
            None,
        );
        let value = serde_json::to_value(&metadata).unwrap();
        assert!(value.get("parameters").unwrap().get("auth_token").is_none());
        assert!(!serde_json::to_string(&value).unwrap().contains("super-secret"));
    }
}
