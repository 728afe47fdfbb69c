//! End-to-end harvest against a mock API server

use crate::common::*;
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use subreddit_harvest::crawler::run_harvest;
use subreddit_harvest::records::RecordType;
use subreddit_harvest::storage::{open_ledger, RunLedger, RunStatus};
use subreddit_harvest::{Config, FetchError, HarvestError};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn api_response(body: Value) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_json(body)
        .insert_header("x-ratelimit-remaining", "598.0")
        .insert_header("x-ratelimit-used", "2")
        .insert_header("x-ratelimit-reset", "300")
}

fn listing(children: Vec<Value>) -> Value {
    json!({"kind": "Listing", "data": {"children": children, "after": null}})
}

fn with_replies(mut comment: Value, replies: Vec<Value>) -> Value {
    comment["data"]["replies"] = listing(replies);
    comment
}

async fn mount_token(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/api/v1/access_token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"access_token": "tok", "expires_in": 3600})),
        )
        .mount(server)
        .await;
}

fn server_config(dir: &TempDir, server: &MockServer, extra: &str) -> Config {
    let mut config = test_config(dir.path(), &["rust"], extra);
    config.client.api_base = server.uri();
    config.client.auth_url = format!("{}/api/v1/access_token", server.uri());
    config.output.summary_path = Some(dir.path().join("summary.md").display().to_string());
    config
}

#[tokio::test]
async fn test_full_harvest_against_mock_api() {
    let server = MockServer::start().await;
    mount_token(&server).await;

    Mock::given(method("GET"))
        .and(path("/r/rust/about"))
        .respond_with(api_response(community("rust")))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/r/rust/new"))
        .and(query_param("limit", "2"))
        .respond_with(api_response(listing(vec![
            submission("a", "alice"),
            submission("b", "bob"),
        ])))
        .mount(&server)
        .await;

    // c1 has one visible reply and one collapsed behind a placeholder
    let more = json!({"kind": "more", "data": {
        "id": "c3", "name": "t1_c3", "parent_id": "t1_c1", "count": 1, "children": ["c3"]
    }});
    let c1 = with_replies(
        comment("c1", "a", "t3_a", "carol"),
        vec![comment("c2", "a", "t1_c1", "dave"), more],
    );
    Mock::given(method("GET"))
        .and(path("/comments/a"))
        .respond_with(api_response(json!([
            listing(vec![submission("a", "alice")]),
            listing(vec![c1]),
        ])))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/morechildren"))
        .and(query_param("children", "c3"))
        .and(query_param("link_id", "t3_a"))
        .respond_with(api_response(json!({"json": {"errors": [], "data": {
            "things": [comment("c3", "a", "t1_c1", "alice")]
        }}})))
        .expect(1)
        .mount(&server)
        .await;

    // One try plus one retry
    Mock::given(method("GET"))
        .and(path("/comments/b"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = server_config(&dir, &server, "comment-expansion-depth = 4");
    let data = dir.path().join("data");

    let stats = run_harvest(config, "hash", CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(stats.emitted_count(RecordType::Config), 1);
    assert_eq!(stats.emitted_count(RecordType::Community), 1);
    assert_eq!(stats.emitted_count(RecordType::Submission), 2);
    assert_eq!(stats.emitted_count(RecordType::Comment), 3);
    assert_eq!(stats.failures.len(), 1);
    assert_eq!(stats.failures[0].resource, "b");
    assert_eq!(stats.failures[0].kind, "transient_network");

    // Breadth-first flattening: c1, then its replies in order
    let comments = read_csv(&partition_file(&data, RecordType::Comment));
    let id = column(RecordType::Comment, "id");
    let parent = column(RecordType::Comment, "parent_id");
    let reply_ids = column(RecordType::Comment, "reply_ids");
    let order: Vec<&str> = comments[1..].iter().map(|r| r[id].as_str()).collect();
    assert_eq!(order, vec!["c1", "c2", "c3"]);
    assert_eq!(comments[1][parent], "a");
    assert_eq!(comments[1][reply_ids], "[\"c2\",\"c3\"]");
    assert_eq!(comments[3][parent], "c1");

    let communities = read_csv(&partition_file(&data, RecordType::Community));
    assert_eq!(communities[1][column(RecordType::Community, "id")], "id_rust");

    let ledger = open_ledger(&dir.path().join("harvest.db")).unwrap();
    let run = ledger.get_latest_run().unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(ledger.get_partitions(run.id).unwrap().len(), 4);

    let summary = std::fs::read_to_string(dir.path().join("summary.md")).unwrap();
    assert!(summary.contains("| submission | 2 | 0 |"));
}

#[tokio::test]
async fn test_nonexistent_community_redirect_is_not_found() {
    let server = MockServer::start().await;
    mount_token(&server).await;

    Mock::given(method("GET"))
        .and(path("/r/rust/about"))
        .respond_with(
            ResponseTemplate::new(302).insert_header("location", "/subreddits/search.json?q=rust"),
        )
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = server_config(&dir, &server, "");

    let stats = run_harvest(config, "hash", CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(stats.emitted_count(RecordType::Config), 1);
    assert_eq!(stats.emitted_count(RecordType::Community), 0);
    assert_eq!(stats.failures.len(), 1);
    assert_eq!(stats.failures[0].kind, "not_found");
}

#[tokio::test]
async fn test_rejected_credentials_fail_before_the_run() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/access_token"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = server_config(&dir, &server, "");

    let result = run_harvest(config, "hash", CancellationToken::new()).await;

    assert!(matches!(
        result,
        Err(HarvestError::Fetch(FetchError::Authentication(_)))
    ));
    assert!(!dir.path().join("harvest.db").exists());
    assert!(!dir.path().join("data").exists());
}

#[tokio::test]
async fn test_rate_limited_fetch_is_retried_after_wait() {
    let server = MockServer::start().await;
    mount_token(&server).await;

    Mock::given(method("GET"))
        .and(path("/r/rust/about"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "0"))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/r/rust/about"))
        .respond_with(api_response(community("rust")))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/r/rust/new"))
        .respond_with(api_response(listing(vec![])))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = server_config(&dir, &server, "");

    let stats = run_harvest(config, "hash", CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(stats.emitted_count(RecordType::Community), 1);
    assert_eq!(stats.emitted_count(RecordType::Submission), 0);
    assert!(stats.failures.is_empty());
}

#[tokio::test]
async fn test_expansion_waits_out_an_exhausted_quota() {
    let server = MockServer::start().await;
    mount_token(&server).await;

    Mock::given(method("GET"))
        .and(path("/r/rust/about"))
        .respond_with(api_response(community("rust")))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/r/rust/new"))
        .respond_with(api_response(listing(vec![submission("a", "alice")])))
        .mount(&server)
        .await;

    // The tree arrives with the window used up and two threads collapsed
    let placeholders: Vec<Value> = ["c2", "c3"]
        .iter()
        .map(|id| {
            json!({"kind": "more", "data": {
                "id": id, "name": format!("t1_{}", id), "parent_id": "t3_a",
                "count": 1, "children": [id]
            }})
        })
        .collect();
    let mut forest = vec![comment("c1", "a", "t3_a", "carol")];
    forest.extend(placeholders);
    Mock::given(method("GET"))
        .and(path("/comments/a"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([
                    listing(vec![submission("a", "alice")]),
                    listing(forest),
                ]))
                .insert_header("x-ratelimit-remaining", "0")
                .insert_header("x-ratelimit-used", "600")
                .insert_header("x-ratelimit-reset", "0.5"),
        )
        .mount(&server)
        .await;
    for id in ["c2", "c3"] {
        Mock::given(method("GET"))
            .and(path("/api/morechildren"))
            .and(query_param("children", id))
            .respond_with(api_response(json!({"json": {"errors": [], "data": {
                "things": [comment(id, "a", "t3_a", "dave")]
            }}})))
            .expect(1)
            .mount(&server)
            .await;
    }

    let dir = TempDir::new().unwrap();
    let config = server_config(&dir, &server, "comment-expansion-depth = 8");

    let started = Instant::now();
    let stats = run_harvest(config, "hash", CancellationToken::new())
        .await
        .unwrap();

    assert!(started.elapsed() >= Duration::from_millis(400));
    assert_eq!(stats.rate_limit_waits, 1);
    assert_eq!(stats.emitted_count(RecordType::Comment), 3);

    let ledger = open_ledger(&dir.path().join("harvest.db")).unwrap();
    let run = ledger.get_latest_run().unwrap().unwrap();
    assert_eq!(run.rate_limit_waits, 1);
}
