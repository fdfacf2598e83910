//! Configuration resolution.
//!
//! Turns a parsed [`FetchArgs`] into a validated [`FetchParameters`],
//! applying the documented precedence at each field independently:
//! CLI flag, then environment variable, then a per-repository override in
//! the config file, then the config file's own default, then a built-in
//! default. `$NAME`-style references inside config file string values are
//! expanded against the process environment.

use crate::cli::args::FetchArgs;
use crate::engine::model::{FetchMode, FetchParameters};
use crate::errors::{RelayError, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_ENDPOINT: &str = "https://api.github.com/graphql";
const DEFAULT_BATCH_SIZE: u32 = 50;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
const DEFAULT_METADATA_FILE: &str = "fetch-metadata.json";

/// The on-disk shape of `.sirseer-relay.yaml`: `defaults.*` for built-in
/// fallbacks, `github.*` for endpoint and token-env naming, and one
/// `repositories.<owner/name>` override block per repository.
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    defaults: Defaults,
    #[serde(default)]
    github: GithubConfig,
    #[serde(default)]
    repositories: HashMap<String, RepositoryOverride>,
}

#[derive(Debug, Default, Deserialize)]
struct Defaults {
    #[serde(default)]
    batch_size: Option<u32>,
    #[serde(default)]
    state_dir: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct GithubConfig {
    #[serde(default)]
    api_endpoint: Option<String>,
    #[serde(default)]
    graphql_endpoint: Option<String>,
    #[serde(default)]
    token_env: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RepositoryOverride {
    #[serde(default)]
    batch_size: Option<u32>,
    #[serde(default)]
    request_timeout: Option<u64>,
    #[serde(default)]
    state_dir: Option<String>,
}

impl ConfigFile {
    fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| RelayError::filesystem(e, path.to_path_buf()))?;
        serde_yaml::from_str(&raw)
            .map_err(|e| RelayError::Parameter(format!("malformed config file {}: {e}", path.display())))
    }

    fn repo_override<'a>(&'a self, repository: &str) -> Option<&'a RepositoryOverride> {
        self.repositories.get(repository)
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".sirseer-relay.yaml"))
}

fn expand(raw: &str) -> Result<String> {
    shellexpand::env(raw)
        .map(|s| s.into_owned())
        .map_err(|e| RelayError::Parameter(format!("could not expand `{raw}`: {e}")))
}

/// Split `"owner/name"` into its two parts, enforcing exactly one slash
/// with non-empty text on both sides.
pub fn parse_repository(raw: &str) -> Result<(String, String)> {
    let mut parts = raw.splitn(3, '/');
    let owner = parts.next().unwrap_or("");
    let name = parts.next().unwrap_or("");
    let rest = parts.next();

    if owner.is_empty() || name.is_empty() || rest.is_some() {
        return Err(RelayError::InvalidRepository(format!(
            "expected `owner/name`, got `{raw}`"
        )));
    }
    Ok((owner.to_string(), name.to_string()))
}

fn parse_date(raw: &str, flag: &str) -> Result<chrono::NaiveDate> {
    chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| RelayError::Parameter(format!("{flag} must be `YYYY-MM-DD`, got `{raw}`")))
}

/// Build the frozen [`FetchParameters`] for one invocation, honoring the
/// full precedence chain and rejecting invalid combinations before any
/// network request is made.
pub fn resolve_parameters(args: &FetchArgs) -> Result<FetchParameters> {
    let (owner, name) = parse_repository(&args.repository)?;
    let repository = format!("{owner}/{name}");

    if args.all && args.incremental {
        return Err(RelayError::Parameter(
            "--all and --incremental are mutually exclusive".into(),
        ));
    }

    let explicit_config = args
        .config
        .clone()
        .or_else(|| std::env::var("SIRSEER_CONFIG").ok().map(PathBuf::from));

    let config = if let Some(path) = explicit_config {
        if !path.exists() {
            return Err(RelayError::filesystem(
                std::io::Error::new(std::io::ErrorKind::NotFound, "config file not found"),
                path,
            ));
        }
        ConfigFile::load(&path)?
    } else {
        match default_config_path() {
            Some(path) if path.exists() => ConfigFile::load(&path)?,
            _ => ConfigFile::default(),
        }
    };
    let repo_override = config.repo_override(&repository);

    let batch_size = args
        .batch_size
        .or_else(|| env_u32("SIRSEER_BATCH_SIZE"))
        .or(repo_override.and_then(|r| r.batch_size))
        .or(config.defaults.batch_size)
        .unwrap_or(DEFAULT_BATCH_SIZE);
    if !(1..=100).contains(&batch_size) {
        return Err(RelayError::Parameter(format!(
            "--batch-size must be between 1 and 100, got {batch_size}"
        )));
    }

    let request_timeout_secs = args
        .request_timeout
        .or(repo_override.and_then(|r| r.request_timeout))
        .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS);

    let state_dir_raw = args
        .state_dir
        .clone()
        .map(|p| p.to_string_lossy().into_owned())
        .or_else(|| std::env::var("SIRSEER_STATE_DIR").ok())
        .or_else(|| repo_override.and_then(|r| r.state_dir.clone()))
        .or_else(|| config.defaults.state_dir.clone())
        .unwrap_or_else(|| ".sirseer-relay/state".to_string());
    let state_dir = PathBuf::from(expand(&state_dir_raw)?);

    // `SIRSEER_API_URL` and `GITHUB_GRAPHQL_ENDPOINT` are accepted
    // interchangeably; the first one set wins.
    let endpoint = std::env::var("SIRSEER_API_URL")
        .ok()
        .or_else(|| std::env::var("GITHUB_GRAPHQL_ENDPOINT").ok())
        .or_else(|| config.github.graphql_endpoint.clone())
        .or_else(|| config.github.api_endpoint.clone())
        .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());

    // The config file can rename which environment variable carries the
    // token (`github.token_env`); `GITHUB_TOKEN` is the built-in default.
    let token_env_name = config.github.token_env.as_deref().unwrap_or("GITHUB_TOKEN");
    let auth_token = args
        .token
        .clone()
        .or_else(|| std::env::var(token_env_name).ok())
        .ok_or_else(|| {
            RelayError::Auth(format!(
                "no token given; use --token or set {token_env_name}"
            ))
        })?;

    let since = args.since.as_deref().map(|s| parse_date(s, "--since")).transpose()?;
    let until = args.until.as_deref().map(|s| parse_date(s, "--until")).transpose()?;
    if let (Some(s), Some(u)) = (since, until) {
        if s >= u {
            return Err(RelayError::Parameter(format!(
                "--since ({s}) must be strictly before --until ({u})"
            )));
        }
    }

    let mode = if args.incremental {
        FetchMode::Incremental
    } else if args.all {
        FetchMode::All
    } else {
        FetchMode::FirstPage
    };
    let output_path = resolve_output(args, &repository)?;

    let metadata_path = args
        .metadata_file
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_METADATA_FILE));

    Ok(FetchParameters {
        owner,
        name,
        batch_size,
        since,
        until,
        mode,
        output_path,
        state_dir,
        metadata_path,
        request_timeout: Duration::from_secs(request_timeout_secs),
        graphql_endpoint: endpoint,
        auth_token,
    })
}

fn resolve_output(args: &FetchArgs, repository: &str) -> Result<String> {
    if args.output != "-" {
        return Ok(args.output.clone());
    }
    if let Some(dir) = &args.output_dir {
        let safe_name = repository.replace('/', "_");
        return Ok(dir.join(format!("{safe_name}.ndjson")).to_string_lossy().into_owned());
    }
    Ok("-".to_string())
}

fn env_u32(name: &str) -> Option<u32> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> FetchArgs {
        FetchArgs {
            repository: "octo/demo".into(),
            output: "-".into(),
            output_dir: None,
            all: false,
            incremental: false,
            since: None,
            until: None,
            batch_size: None,
            request_timeout: None,
            config: None,
            token: Some("tok".into()),
            metadata_file: None,
            state_dir: None,
        }
    }

    #[test]
    fn rejects_malformed_repository() {
        assert!(parse_repository("no-slash").is_err());
        assert!(parse_repository("a/b/c").is_err());
        assert!(parse_repository("/name").is_err());
        assert!(parse_repository("owner/").is_err());
    }

    #[test]
    fn accepts_well_formed_repository() {
        assert_eq!(
            parse_repository("octo/demo").unwrap(),
            ("octo".to_string(), "demo".to_string())
        );
    }

    #[test]
    fn cli_flag_overrides_default_batch_size() {
        let mut args = base_args();
        args.batch_size = Some(10);
        let params = resolve_parameters(&args).unwrap();
        assert_eq!(params.batch_size, 10);
    }

    #[test]
    fn rejects_out_of_range_batch_size() {
        let mut args = base_args();
        args.batch_size = Some(500);
        assert!(resolve_parameters(&args).is_err());
    }

    #[test]
    fn rejects_all_and_incremental_together() {
        let mut args = base_args();
        args.all = true;
        args.incremental = true;
        assert!(resolve_parameters(&args).is_err());
    }

    #[test]
    fn rejects_inverted_date_bounds() {
        let mut args = base_args();
        args.since = Some("2026-03-01".into());
        args.until = Some("2026-01-01".into());
        assert!(resolve_parameters(&args).is_err());
    }

    #[test]
    fn missing_token_is_an_auth_error() {
        let mut args = base_args();
        args.token = None;
        temp_env::with_var_unset("GITHUB_TOKEN", || {
            assert!(matches!(resolve_parameters(&args), Err(RelayError::Auth(_))));
        });
    }

    #[test]
    fn config_file_token_env_renames_the_token_variable() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join(".sirseer-relay.yaml");
        std::fs::write(&config_path, "github:\n  token_env: MY_CUSTOM_TOKEN\n").unwrap();

        let mut args = base_args();
        args.token = None;
        args.config = Some(config_path);

        temp_env::with_var("MY_CUSTOM_TOKEN", Some("from-custom-env"), || {
            let params = resolve_parameters(&args).unwrap();
            assert_eq!(params.auth_token, "from-custom-env");
        });
    }

    #[test]
    fn config_file_defaults_batch_size_applies_below_cli_and_env() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join(".sirseer-relay.yaml");
        std::fs::write(&config_path, "defaults:\n  batch_size: 77\n").unwrap();

        let mut args = base_args();
        args.config = Some(config_path);

        temp_env::with_var_unset("SIRSEER_BATCH_SIZE", || {
            let params = resolve_parameters(&args).unwrap();
            assert_eq!(params.batch_size, 77);
        });
    }

    #[test]
    fn graphql_endpoint_env_var_overrides_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join(".sirseer-relay.yaml");
        std::fs::write(
            &config_path,
            "github:\n  graphql_endpoint: https://example.invalid/graphql\n",
        )
        .unwrap();

        let mut args = base_args();
        args.config = Some(config_path);

        temp_env::with_var("GITHUB_GRAPHQL_ENDPOINT", Some("https://override.invalid/graphql"), || {
            let params = resolve_parameters(&args).unwrap();
            assert_eq!(params.graphql_endpoint, "https://override.invalid/graphql");
        });
    }
}
