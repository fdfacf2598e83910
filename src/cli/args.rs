//! CLI argument structures for the `sirseer-relay` binary.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// A one-shot extractor of pull request history from a GitHub-compatible
/// GraphQL hosting service.
#[derive(Parser, Debug)]
#[command(name = "sirseer-relay", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fetch the complete pull request history of a repository.
    Fetch(FetchArgs),
}

/// Arguments for the `fetch` subcommand.
#[derive(Parser, Debug, Clone)]
pub struct FetchArgs {
    /// Repository to fetch, in `owner/name` form.
    ///
    /// Must contain exactly one slash, with non-empty text on both sides.
    pub repository: String,

    /// Output path for the NDJSON stream, or `-` for standard output.
    #[arg(long, default_value = "-")]
    pub output: String,

    /// Directory to write the default-named output file into, when
    /// `--output` is not given an explicit path.
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Fetch the complete history in one invocation (mutually exclusive
    /// with `--incremental`).
    #[arg(long, conflicts_with = "incremental")]
    pub all: bool,

    /// Fetch only pull requests updated since the last successful run
    /// (mutually exclusive with `--all`; requires prior state).
    #[arg(long)]
    pub incremental: bool,

    /// Only fetch PRs updated on or after this date (`YYYY-MM-DD`).
    #[arg(long)]
    pub since: Option<String>,

    /// Only fetch PRs updated before this date (`YYYY-MM-DD`).
    #[arg(long)]
    pub until: Option<String>,

    /// Requested page size for each GraphQL query, 1..100. Falls back to
    /// `SIRSEER_BATCH_SIZE`, then the config file, then 50.
    #[arg(long)]
    pub batch_size: Option<u32>,

    /// Per-request timeout, in seconds. Falls back to the config file,
    /// then 60.
    #[arg(long)]
    pub request_timeout: Option<u64>,

    /// Path to a `.sirseer-relay.yaml`-style config file.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// GitHub (or compatible) API token. Prefer `GITHUB_TOKEN` over this
    /// flag, since command-line arguments are visible in process listings.
    #[arg(long)]
    pub token: Option<String>,

    /// Path to write the fetch metadata sidecar to.
    #[arg(long)]
    pub metadata_file: Option<PathBuf>,

    /// Directory holding resumable checkpoint state.
    #[arg(long)]
    pub state_dir: Option<PathBuf>,
}
