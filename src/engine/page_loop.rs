//! `PageLoop` — drives one fetch from INIT to FINALIZING/ABORTING.
//!
//! The state machine is explicit rather than a plain `loop {}` with
//! scattered breaks, because the termination conditions (empty repository,
//! `--mode=first-page`, cancellation mid-page, a non-retryable failure)
//! each need to leave the sink and checkpoint in a well-defined state.

use crate::engine::checkpoint::Checkpointer;
use crate::engine::model::{
    FetchMetadata, FetchMode, FetchParameters, FetchResults, FetchState, PullRecord,
};
use crate::engine::query_planner::{PlannedQuery, QueryPlanner, ResponseShape};
use crate::engine::retry::{FailureKind, Outcome, RetryController};
use crate::engine::sink::Sink;
use crate::engine::transport::Transport;
use crate::errors::{RelayError, Result};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

/// Terminal outcome of a run, used to choose between the FINALIZING and
/// ABORTING metadata-sidecar write.
enum Termination {
    Finalized,
    Aborted(RelayError),
}

/// Owns every collaborator needed to run one fetch to completion.
pub struct PageLoop {
    transport: Transport,
    planner: QueryPlanner,
    checkpointer: Checkpointer,
    params: FetchParameters,
    cancel: CancellationToken,
    api_calls: u64,
}

impl PageLoop {
    pub fn new(params: FetchParameters, cancel: CancellationToken) -> Result<Self> {
        let transport = Transport::new(&params.graphql_endpoint, &params.auth_token, params.request_timeout)
            .map_err(|e| RelayError::Network(e.to_string()))?;
        let planner = QueryPlanner::new(params.mode, params.batch_size);
        let checkpointer = Checkpointer::new(params.state_dir.clone());

        Ok(Self {
            transport,
            planner,
            checkpointer,
            params,
            cancel,
            api_calls: 0,
        })
    }

    pub async fn run(mut self) -> Result<FetchResults> {
        let started = Instant::now();
        let fetch_id = Uuid::new_v4().to_string();
        let repository = self.params.repository();

        // Checked before the sink ever touches the output path, so an
        // incremental fetch with no prior state fails without truncating
        // (or creating) an output file and without issuing any request.
        let previous = self.checkpointer.load(&repository)?;
        if self.params.mode == FetchMode::Incremental && previous.is_none() {
            return Err(RelayError::no_previous_state());
        }
        let previous_fetch_id = previous.as_ref().map(|s| s.fetch_id.clone());

        let mut sink = Sink::open(&self.params.output_path)?;

        let mut state = previous.unwrap_or_else(|| {
            FetchState::new(repository.clone(), fetch_id.clone(), chrono::Utc::now())
        });

        let outcome = self.drive(&mut sink, &mut state).await;

        let (complete, termination) = match outcome {
            Ok(complete) => (complete, Termination::Finalized),
            Err(e) => (false, Termination::Aborted(e)),
        };

        let finalize_result = sink.finalize();
        let results = FetchResults {
            total_prs: state.prs_written,
            api_calls: self.api_calls,
            duration_ms: started.elapsed().as_millis() as u64,
            complete,
        };

        let metadata = FetchMetadata::new(
            &self.params,
            fetch_id,
            results.clone(),
            self.params.mode == FetchMode::Incremental,
            previous_fetch_id,
        );
        if let Err(e) = write_metadata(&self.params.metadata_path, &metadata) {
            warn!(error = %e, "failed to write fetch metadata sidecar");
        }

        finalize_result?;

        match termination {
            Termination::Finalized => Ok(results),
            Termination::Aborted(e) => Err(e),
        }
    }

    /// Walk pages until completion, cancellation, or an unrecoverable
    /// failure. Returns whether the fetch ran to completion.
    async fn drive(&mut self, sink: &mut Sink, state: &mut FetchState) -> Result<bool> {
        // Incremental mode walks the `search` connection, which is a
        // different connection than `repository.pullRequests`; a cursor
        // minted by one is meaningless to the other, so incremental always
        // starts from `after: null` and relies on the watermark bound
        // (fixed for the life of this run) to pick up where the last run
        // left off instead.
        let mut after = if self.params.mode == FetchMode::Incremental {
            None
        } else {
            state.last_cursor.clone()
        };
        let watermark = if self.params.mode == FetchMode::Incremental {
            state.watermark
        } else {
            None
        };

        loop {
            if self.cancel.is_cancelled() {
                return Err(RelayError::Cancelled);
            }

            let planned = self.planner.plan_next(
                &self.params.owner,
                &self.params.name,
                self.params.since,
                self.params.until,
                watermark,
                after.as_deref(),
            );

            let (page, shrunk) = self.request_page(&planned).await?;
            if shrunk {
                // The plan was re-issued at a smaller batch size inside
                // request_page; refresh `after` is unnecessary since the
                // cursor we're paging from hasn't moved.
                warn!(
                    batch_size = self.planner.batch_size(),
                    "reducing page size after a complexity error"
                );
            }

            let (nodes, has_next, end_cursor) = extract_page(&page, planned.shape)?;

            let mut last_issue_number = state.last_issue_number;
            for node in nodes {
                let record = PullRecord::from_node(node)
                    .map_err(|e| RelayError::Remote(format!("malformed pull request node: {e}")))?;
                last_issue_number = Some(record.number());
                let updated_at = record.updated_at();
                sink.write_record(record)?;
                state.prs_written += 1;
                state.watermark = Some(state.watermark.map_or(updated_at, |w| w.max(updated_at)));
            }
            sink.flush()?;

            state.last_cursor = end_cursor.clone();
            state.last_issue_number = last_issue_number;

            // `--mode=first-page` stops after one page without ever
            // establishing resumable state for a future invocation.
            if self.params.mode != FetchMode::FirstPage {
                self.checkpointer.save(state)?;
            }

            info!(prs_written = state.prs_written, has_next, "page committed");

            if self.params.mode == FetchMode::FirstPage {
                return Ok(true);
            }
            if !has_next {
                return Ok(true);
            }
            after = end_cursor;
        }
    }

    /// Issue a request, retrying transport and remote failures per
    /// [`RetryController`], and transparently shrinking the batch size on a
    /// complexity error before re-issuing. Returns the accepted JSON body
    /// and whether a shrink occurred.
    async fn request_page(&mut self, planned: &PlannedQuery) -> Result<(serde_json::Value, bool)> {
        let mut variables = planned.variables.clone();
        let mut shrunk_any = false;
        let mut retry = RetryController::new(RetryController::default_ceiling());

        loop {
            self.api_calls += 1;
            match self.transport.execute(planned.query, &variables).await {
                Ok(resp) => match retry.classify_response(&resp) {
                    Outcome::Accept => {
                        return Ok((resp.body_json()?, shrunk_any));
                    }
                    Outcome::RetryAfter(delay) => {
                        warn!(wait = ?delay, "Rate limit hit, waiting before retrying");
                        RetryController::wait(delay, &self.cancel)
                            .await
                            .map_err(to_relay_error)?;
                    }
                    Outcome::Fail(FailureKind::BadRequest(msg)) if msg.contains("complexity") => {
                        if !self.planner.shrink() {
                            return Err(RelayError::Remote(msg));
                        }
                        shrunk_any = true;
                        variables["first"] = serde_json::json!(self.planner.batch_size());
                        retry = RetryController::new(RetryController::default_ceiling());
                    }
                    Outcome::Fail(kind) => return Err(to_relay_error(kind)),
                },
                Err(transport_err) => match retry.classify_transport_error(&transport_err) {
                    Outcome::Accept => unreachable!("transport errors never classify as Accept"),
                    Outcome::RetryAfter(delay) => {
                        warn!(wait = ?delay, "Rate limit or transport backoff, waiting before retrying");
                        RetryController::wait(delay, &self.cancel)
                            .await
                            .map_err(to_relay_error)?;
                    }
                    Outcome::Fail(kind) => return Err(to_relay_error(kind)),
                },
            }
        }
    }
}

fn to_relay_error(kind: FailureKind) -> RelayError {
    match kind {
        FailureKind::Auth(m) => RelayError::Auth(m),
        FailureKind::BadRequest(m) => RelayError::Parameter(m),
        FailureKind::BudgetExhausted { attempts, last } => {
            RelayError::Network(format!("gave up after {attempts} attempts: {last}"))
        }
        FailureKind::RateLimitTooLong(d) => RelayError::RateLimitTooLong(format!("{d:?}")),
        FailureKind::Cancelled => RelayError::Cancelled,
        FailureKind::Transport(m) => RelayError::Network(m),
        FailureKind::Remote(m) => RelayError::Remote(m),
    }
}

fn extract_page(
    body: &serde_json::Value,
    shape: ResponseShape,
) -> Result<(Vec<serde_json::Value>, bool, Option<String>)> {
    if let Some(errors) = body.get("errors") {
        return Err(RelayError::Remote(errors.to_string()));
    }

    let connection = match shape {
        ResponseShape::RepositoryConnection => {
            match body.pointer("/data/repository") {
                None | Some(serde_json::Value::Null) => {
                    return Err(RelayError::Remote(
                        "repository not found (response `repository` field is null)".into(),
                    ));
                }
                Some(repo) => repo.get("pullRequests").ok_or_else(|| {
                    RelayError::Remote("missing repository.pullRequests in response".into())
                })?,
            }
        }
        ResponseShape::SearchConnection => body
            .pointer("/data/search")
            .ok_or_else(|| RelayError::Remote("missing search in response".into()))?,
    };

    let nodes = connection
        .get("nodes")
        .and_then(|n| n.as_array())
        .cloned()
        .unwrap_or_default();
    let has_next = connection
        .pointer("/pageInfo/hasNextPage")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    let end_cursor = connection
        .pointer("/pageInfo/endCursor")
        .and_then(|v| v.as_str())
        .map(str::to_owned);

    Ok((nodes, has_next, end_cursor))
}

fn write_metadata(path: &std::path::Path, metadata: &FetchMetadata<'_>) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(metadata)?;
    std::fs::write(path, bytes).map_err(|e| RelayError::filesystem(e, path.to_path_buf()))
}
