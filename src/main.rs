//! `sirseer-relay` binary entry point.
//!
//! Parses arguments, resolves configuration, wires the fetch engine, and
//! maps its result to a process exit code. Cancellation (Ctrl-C or
//! SIGTERM) tears the run down through the same [`CancellationToken`] the
//! page loop already races its sleeps against.

use clap::Parser;
use sirseer_relay::cli::{Cli, Command};
use sirseer_relay::engine::PageLoop;
use sirseer_relay::{config, RelayError};
use tokio_util::sync::CancellationToken;
use tracing::error;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let exit_code = match run(cli).await {
        Ok(()) => 0,
        Err(err) => {
            error!(error = %err, "fetch failed");
            eprintln!("sirseer-relay: {err}");
            err.exit_code()
        }
    };
    std::process::exit(exit_code);
}

async fn run(cli: Cli) -> Result<(), RelayError> {
    let Command::Fetch(args) = cli.command;
    let params = config::resolve_parameters(&args)?;

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_cancel.cancel();
        }
    });
    #[cfg(unix)]
    {
        let term_cancel = cancel.clone();
        tokio::spawn(async move {
            if let Ok(mut sigterm) =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            {
                sigterm.recv().await;
                term_cancel.cancel();
            }
        });
    }

    let loop_runner = PageLoop::new(params, cancel)?;
    let results = loop_runner.run().await?;
    tracing::info!(
        total_prs = results.total_prs,
        api_calls = results.api_calls,
        duration_ms = results.duration_ms,
        complete = results.complete,
        "fetch finished"
    );
    Ok(())
}
