//! `QueryPlanner` — builds the GraphQL documents and owns batch sizing.
//!
//! Pull request payloads are treated as an opaque value tree: the planner
//! never generates typed response structs, only raw query strings and
//! `serde_json::Value` variable maps. This keeps unknown fields the remote
//! adds later passing straight through to the sink instead of being
//! silently dropped by a schema-typed deserializer.

use crate::engine::model::FetchMode;
use serde_json::{json, Value};

const MIN_BATCH_SIZE: u32 = 1;
const MAX_BATCH_SIZE: u32 = 100;

const INITIAL_SCAN_QUERY: &str = r#"
query RelayPullRequests($owner: String!, $name: String!, $first: Int!, $after: String) {
  repository(owner: $owner, name: $name) {
    pullRequests(first: $first, after: $after, orderBy: {field: CREATED_AT, direction: ASC}) {
      totalCount
      pageInfo { hasNextPage endCursor }
      nodes {
        number
        title
        state
        createdAt
        updatedAt
        url
        author { login }
        baseRefName
        headRefName
        body
        merged
        mergedAt
        closedAt
        labels(first: 20) { nodes { name } }
      }
    }
  }
}
"#;

const INCREMENTAL_SEARCH_QUERY: &str = r#"
query RelayIncrementalPullRequests($query: String!, $first: Int!, $after: String) {
  search(query: $query, type: ISSUE, first: $first, after: $after) {
    issueCount
    pageInfo { hasNextPage endCursor }
    nodes {
      ... on PullRequest {
        number
        title
        state
        createdAt
        updatedAt
        url
        author { login }
        baseRefName
        headRefName
        body
        merged
        mergedAt
        closedAt
        labels(first: 20) { nodes { name } }
      }
    }
  }
}
"#;

/// One GraphQL document ready to send, plus the shape the caller should
/// expect in the response so it can find the connection node.
pub struct PlannedQuery {
    pub query: &'static str,
    pub variables: Value,
    pub shape: ResponseShape,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    RepositoryConnection,
    SearchConnection,
}

pub struct QueryPlanner {
    batch_size: u32,
    mode: FetchMode,
}

impl QueryPlanner {
    pub fn new(mode: FetchMode, initial_batch_size: u32) -> Self {
        Self {
            batch_size: initial_batch_size.clamp(MIN_BATCH_SIZE, MAX_BATCH_SIZE),
            mode,
        }
    }

    pub fn batch_size(&self) -> u32 {
        self.batch_size
    }

    /// Halve the batch size in response to a complexity error. Monotonic:
    /// never restored once shrunk, even if later pages would have fit at
    /// the original size.
    pub fn shrink(&mut self) -> bool {
        if self.batch_size <= MIN_BATCH_SIZE {
            return false;
        }
        self.batch_size = (self.batch_size / 2).max(MIN_BATCH_SIZE);
        true
    }

    pub fn plan_first_page(&self, owner: &str, name: &str) -> PlannedQuery {
        self.plan_repository_page(owner, name, None)
    }

    pub fn plan_repository_page(&self, owner: &str, name: &str, after: Option<&str>) -> PlannedQuery {
        PlannedQuery {
            query: INITIAL_SCAN_QUERY,
            variables: json!({
                "owner": owner,
                "name": name,
                "first": self.batch_size,
                "after": after,
            }),
            shape: ResponseShape::RepositoryConnection,
        }
    }

    /// `since`/`until` are inclusive bounds expressed in the remote's search
    /// qualifier syntax (`updated:YYYY-MM-DD..YYYY-MM-DD`). `watermark` is
    /// the prior fetch's most recent `updatedAt`; when present it is the
    /// effective lower bound, since it is always at least as tight as any
    /// `--since` the prior run was given and is what makes a repeated
    /// incremental run converge on zero new records.
    pub fn plan_incremental_page(
        &self,
        owner: &str,
        name: &str,
        since: Option<chrono::NaiveDate>,
        until: Option<chrono::NaiveDate>,
        watermark: Option<chrono::DateTime<chrono::Utc>>,
        after: Option<&str>,
    ) -> PlannedQuery {
        let mut search_query = format!("repo:{owner}/{name} is:pr");
        let lower = watermark
            .map(|w| w.to_rfc3339())
            .or_else(|| since.map(|s| s.to_string()));
        match (lower, until) {
            (Some(l), Some(u)) => {
                search_query.push_str(&format!(" updated:{l}..{u}"));
            }
            (Some(l), None) => search_query.push_str(&format!(" updated:>={l}")),
            (None, Some(u)) => search_query.push_str(&format!(" updated:<={u}")),
            (None, None) => {}
        }

        PlannedQuery {
            query: INCREMENTAL_SEARCH_QUERY,
            variables: json!({
                "query": search_query,
                "first": self.batch_size,
                "after": after,
            }),
            shape: ResponseShape::SearchConnection,
        }
    }

    /// Build the next page request given the prior cursor, honoring `mode`.
    /// `watermark` is ignored outside `Incremental` mode.
    pub fn plan_next(
        &self,
        owner: &str,
        name: &str,
        since: Option<chrono::NaiveDate>,
        until: Option<chrono::NaiveDate>,
        watermark: Option<chrono::DateTime<chrono::Utc>>,
        after: Option<&str>,
    ) -> PlannedQuery {
        match self.mode {
            FetchMode::FirstPage | FetchMode::All => self.plan_repository_page(owner, name, after),
            FetchMode::Incremental => {
                self.plan_incremental_page(owner, name, since, until, watermark, after)
            }
        }
    }
}

/// Validate `since`/`until` fatally before any request is issued.
pub fn validate_date_range(
    since: Option<chrono::NaiveDate>,
    until: Option<chrono::NaiveDate>,
) -> Result<(), String> {
    if let (Some(s), Some(u)) = (since, until) {
        if s >= u {
            return Err(format!("--since ({s}) must be strictly before --until ({u})"));
        }
    }
    Ok(())
}
