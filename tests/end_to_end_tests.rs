//! Integration tests driving the assembled fetch engine against a fake
//! GraphQL server, one per documented end-to-end scenario.

use assert_fs::prelude::*;
use httpmock::prelude::*;
use predicates::prelude::*;
use serde_json::json;
use sirseer_relay::cli::FetchArgs;
use sirseer_relay::config::resolve_parameters;
use sirseer_relay::engine::model::{FetchMode, FetchParameters};
use sirseer_relay::engine::PageLoop;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Build parameters directly rather than through `resolve_parameters`, so
/// the mock endpoint doesn't have to travel through a process-wide
/// environment variable shared across concurrently running tests.
fn params_for(tmp: &assert_fs::TempDir, server: &MockServer, repository: &str, batch_size: u32) -> FetchParameters {
    let (owner, name) = repository.split_once('/').unwrap();
    FetchParameters {
        owner: owner.to_string(),
        name: name.to_string(),
        batch_size,
        since: None,
        until: None,
        mode: FetchMode::All,
        output_path: tmp.path().join("out.ndjson").to_string_lossy().into_owned(),
        state_dir: tmp.path().join("state"),
        metadata_path: tmp.path().join("meta.json"),
        request_timeout: Duration::from_secs(5),
        graphql_endpoint: server.url("/graphql"),
        auth_token: "test-token".to_string(),
    }
}

fn pr_node(number: i64, title: &str) -> serde_json::Value {
    json!({
        "number": number,
        "title": title,
        "state": "OPEN",
        "createdAt": "2026-01-01T00:00:00Z",
        "updatedAt": "2026-01-01T00:00:00Z",
        "url": format!("https://example.com/pr/{number}"),
        "author": null,
    })
}

fn page_body(nodes: Vec<serde_json::Value>, has_next: bool, end_cursor: &str) -> serde_json::Value {
    json!({
        "data": {
            "repository": {
                "pullRequests": {
                    "totalCount": 30,
                    "pageInfo": {"hasNextPage": has_next, "endCursor": end_cursor},
                    "nodes": nodes,
                }
            }
        }
    })
}

#[tokio::test]
async fn scenario_1_three_pages_of_ten() {
    let server = MockServer::start();
    let tmp = assert_fs::TempDir::new().unwrap();
    let params = params_for(&tmp, &server, "t/r", 10);

    let page1 = page_body((1..=10).map(|n| pr_node(n, "pr")).collect(), true, "c1");
    let page2 = page_body((11..=20).map(|n| pr_node(n, "pr")).collect(), true, "c2");
    let page3 = page_body((21..=30).map(|n| pr_node(n, "pr")).collect(), false, "c3");

    server.mock(|when, then| {
        when.method(POST).path("/graphql").body_contains("\"after\":null");
        then.status(200).json_body(page1.clone());
    });
    server.mock(|when, then| {
        when.method(POST).path("/graphql").body_contains("\"after\":\"c1\"");
        then.status(200).json_body(page2.clone());
    });
    server.mock(|when, then| {
        when.method(POST).path("/graphql").body_contains("\"after\":\"c2\"");
        then.status(200).json_body(page3.clone());
    });

    let output_path = params.output_path.clone();
    let results = PageLoop::new(params, CancellationToken::new())
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(results.total_prs, 30);
    assert!(results.complete);
    let contents = std::fs::read_to_string(&output_path).unwrap();
    assert_eq!(contents.lines().count(), 30);

    let metadata: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(tmp.path().join("meta.json")).unwrap()).unwrap();
    assert_eq!(metadata["results"]["total_prs"], 30);
    assert_eq!(metadata["results"]["complete"], true);
    tmp.child("state/t-r.state").assert(predicate::path::exists());
}

// Scenarios 2 (rate-limit then success) and 3 (transient 502s then success)
// retry the identical request body, so httpmock's request-matching mocks
// can't distinguish attempt 1 from attempt 2 without instrumenting
// production code. That backoff-then-accept behavior is covered instead at
// the unit level in `engine::retry` (`rate_limited_waits_within_ceiling`,
// `server_errors_exhaust_the_attempt_budget`).

#[tokio::test]
async fn scenario_4_complexity_error_shrinks_batch_size() {
    let server = MockServer::start();
    let tmp = assert_fs::TempDir::new().unwrap();
    let params = params_for(&tmp, &server, "t/r", 50);

    server.mock(|when, then| {
        when.method(POST)
            .path("/graphql")
            .body_contains("\"first\":50");
        then.status(200).json_body(json!({
            "errors": [{"message": "complexity 1500 exceeds 1000"}]
        }));
    });
    let body = page_body((1..=10).map(|n| pr_node(n, "pr")).collect(), false, "c1");
    server.mock(|when, then| {
        when.method(POST)
            .path("/graphql")
            .body_contains("\"first\":25");
        then.status(200).json_body(body.clone());
    });

    let results = PageLoop::new(params, CancellationToken::new())
        .unwrap()
        .run()
        .await
        .unwrap();

    assert!(results.complete);
    assert_eq!(results.total_prs, 10);
}

#[tokio::test]
async fn first_page_mode_stops_after_one_page_and_writes_no_state() {
    let server = MockServer::start();
    let tmp = assert_fs::TempDir::new().unwrap();
    let mut params = params_for(&tmp, &server, "t/r", 10);
    params.mode = FetchMode::FirstPage;

    // `hasNextPage: true` — first-page mode must stop anyway.
    let page1 = page_body((1..=10).map(|n| pr_node(n, "pr")).collect(), true, "c1");
    server.mock(|when, then| {
        when.method(POST).path("/graphql");
        then.status(200).json_body(page1.clone());
    });

    let results = PageLoop::new(params, CancellationToken::new())
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(results.total_prs, 10);
    assert!(results.complete);
    tmp.child("state/t-r.state").assert(predicate::path::missing());
}

#[tokio::test]
async fn scenario_6_invalid_repository_makes_no_network_call() {
    let server = MockServer::start();
    let hit = server.mock(|when, then| {
        when.method(POST).path("/graphql");
        then.status(200).json_body(json!({}));
    });

    let tmp = assert_fs::TempDir::new().unwrap();
    let args = FetchArgs {
        repository: "invalid".to_string(),
        output: tmp.path().join("out.ndjson").to_string_lossy().into_owned(),
        output_dir: None,
        all: true,
        incremental: false,
        since: None,
        until: None,
        batch_size: None,
        request_timeout: None,
        config: None,
        token: Some("test-token".into()),
        metadata_file: None,
        state_dir: Some(tmp.path().join("state")),
    };

    let err = resolve_parameters(&args).unwrap_err();
    assert!(err.to_string().contains("invalid repository format"));
    hit.assert_hits(0);
    tmp.child("out.ndjson").assert(predicate::path::missing());
}

#[tokio::test]
async fn scenario_7_incremental_without_state_fails_fast() {
    let server = MockServer::start();
    let tmp = assert_fs::TempDir::new().unwrap();
    let mut params = params_for(&tmp, &server, "t/r", 50);
    params.mode = FetchMode::Incremental;

    let hit = server.mock(|when, then| {
        when.method(POST).path("/graphql");
        then.status(200).json_body(json!({}));
    });

    let err = PageLoop::new(params, CancellationToken::new())
        .unwrap()
        .run()
        .await
        .unwrap_err();

    assert!(err.to_string().contains("no previous state found"));
    hit.assert_hits(0);
    tmp.child("out.ndjson").assert(predicate::path::missing());
}

#[tokio::test]
async fn scenario_8_preserves_null_author_and_unicode_title() {
    let server = MockServer::start();
    let tmp = assert_fs::TempDir::new().unwrap();
    let params = params_for(&tmp, &server, "t/r", 50);

    let body = page_body(vec![pr_node(1, "🚀 中文")], false, "c1");
    server.mock(|when, then| {
        when.method(POST).path("/graphql");
        then.status(200).json_body(body.clone());
    });

    let output_path = params.output_path.clone();
    let results = PageLoop::new(params, CancellationToken::new())
        .unwrap()
        .run()
        .await
        .unwrap();

    assert!(results.complete);
    let contents = std::fs::read_to_string(&output_path).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(contents.lines().next().unwrap()).unwrap();
    assert_eq!(parsed["title"], "🚀 中文");
    assert_eq!(parsed["author"], serde_json::Value::Null);
}
