//! Full runs through the coordinator with a scripted client, real partition
//! files and a real ledger

use crate::common::*;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use subreddit_harvest::client::{FetchError, QuotaSnapshot};
use subreddit_harvest::crawler::{Coordinator, RateGovernor};
use subreddit_harvest::output::{generate_summary, PartitionStore, RecordSink};
use subreddit_harvest::records::RecordType;
use subreddit_harvest::storage::{RunLedger, RunStatus, SqliteLedger};
use subreddit_harvest::HarvestError;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const RUN_START: i64 = 1700000000;

fn coordinator(
    dir: &TempDir,
    config: subreddit_harvest::Config,
    client: ScriptedClient,
    cancel: CancellationToken,
) -> Coordinator<ScriptedClient, PartitionStore, SqliteLedger> {
    let sink = PartitionStore::new(dir.path().join("data"), RUN_START);
    let ledger = SqliteLedger::new(&dir.path().join("harvest.db")).unwrap();
    let governor = Arc::new(RateGovernor::new(&config.governor));
    Coordinator::new(
        config,
        Arc::new(client),
        governor,
        sink,
        ledger,
        cancel,
        "test-hash",
        RUN_START,
    )
    .unwrap()
}

/// One community, two submissions; comments for `b` fail
fn scenario_client() -> ScriptedClient {
    let mut client = ScriptedClient::default();
    client.communities.insert(
        "rust".to_string(),
        batch("rust", vec![submission("a", "alice"), submission("b", "bob")]),
    );
    client.comments.insert(
        "a".to_string(),
        Ok(vec![
            comment("c1", "a", "t3_a", "carol"),
            comment("c2", "a", "t3_a", "dave"),
            comment("c3", "a", "t1_c1", "alice"),
        ]),
    );
    client.comments.insert(
        "b".to_string(),
        Err(FetchError::TransientNetwork("connection reset".to_string())),
    );
    client
}

#[tokio::test]
async fn test_failed_comment_tree_does_not_abort_the_run() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path(), &["rust"], "submission-ordering = \"new\"");
    let mut coordinator = coordinator(&dir, config, scenario_client(), CancellationToken::new());

    let stats = coordinator.run().await.unwrap();

    assert_eq!(stats.emitted_count(RecordType::Config), 1);
    assert_eq!(stats.emitted_count(RecordType::Community), 1);
    assert_eq!(stats.emitted_count(RecordType::Submission), 2);
    assert_eq!(stats.emitted_count(RecordType::Comment), 3);
    assert_eq!(stats.emitted_count(RecordType::Author), 0);
    assert_eq!(stats.failures.len(), 1);
    assert_eq!(stats.failures[0].tier, "comment_tree");
    assert_eq!(stats.failures[0].resource, "b");
    assert!(!stats.cancelled);

    let data = dir.path().join("data");
    let expected_rows = [
        (RecordType::Config, 1),
        (RecordType::Community, 1),
        (RecordType::Submission, 2),
        (RecordType::Comment, 3),
    ];
    for (record_type, rows) in expected_rows {
        let path = partition_file(&data, record_type);
        assert_eq!(path.file_name().unwrap(), "1700000000.csv");

        let csv = read_csv(&path);
        assert_eq!(csv.len(), rows + 1, "{} partition", record_type);
        assert_eq!(
            csv[0],
            record_type
                .field_names()
                .iter()
                .map(|f| f.to_string())
                .collect::<Vec<_>>()
        );
    }
    assert!(!data.join("author").exists());

    // Every comment hangs off submission a or another comment of the batch
    let comments = read_csv(&partition_file(&data, RecordType::Comment));
    let id = column(RecordType::Comment, "id");
    let parent = column(RecordType::Comment, "parent_id");
    let submission_id = column(RecordType::Comment, "submission_id");
    let ids: Vec<&str> = comments[1..].iter().map(|row| row[id].as_str()).collect();
    for row in &comments[1..] {
        assert_eq!(row[submission_id], "a");
        assert!(row[parent] == "a" || ids.contains(&row[parent].as_str()));
    }

    let ledger = coordinator.ledger();
    let run = ledger.get_run(coordinator.run_id()).unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.config_hash, "test-hash");
    assert!(run.finished_at.is_some());

    let partitions = ledger.get_partitions(run.id).unwrap();
    let order: Vec<RecordType> = partitions.iter().map(|p| p.record_type).collect();
    assert_eq!(
        order,
        vec![
            RecordType::Config,
            RecordType::Community,
            RecordType::Submission,
            RecordType::Comment
        ]
    );
    assert_eq!(ledger.get_fetch_failures(run.id).unwrap().len(), 1);
}

#[tokio::test]
async fn test_quoted_fields_survive_the_round_trip() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path(), &["rust"], "");
    let mut coordinator = coordinator(&dir, config, scenario_client(), CancellationToken::new());

    coordinator.run().await.unwrap();

    let submissions = read_csv(&partition_file(
        &dir.path().join("data"),
        RecordType::Submission,
    ));
    let body = column(RecordType::Submission, "body_text");
    assert_eq!(submissions[1][body], "Says \"hello\", then leaves");

    let config_rows = read_csv(&partition_file(&dir.path().join("data"), RecordType::Config));
    let ids = column(RecordType::Config, "community_ids");
    assert_eq!(config_rows[1][ids], "[\"rust\"]");
}

#[tokio::test]
async fn test_missing_community_reduces_output() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path(), &["rust", "gone"], "");
    let mut coordinator = coordinator(&dir, config, scenario_client(), CancellationToken::new());

    let stats = coordinator.run().await.unwrap();

    assert_eq!(stats.emitted_count(RecordType::Community), 1);
    assert!(stats
        .failures
        .iter()
        .any(|f| f.tier == "community" && f.resource == "gone" && f.kind == "not_found"));
    assert_eq!(
        coordinator.ledger().get_run(coordinator.run_id()).unwrap().status,
        RunStatus::Completed
    );
}

#[tokio::test]
async fn test_persistence_failure_halts_the_run() {
    let dir = TempDir::new().unwrap();
    let data = dir.path().join("data");
    std::fs::create_dir_all(&data).unwrap();
    // A plain file where the comment directory should go
    std::fs::write(data.join("comment"), "in the way").unwrap();

    let config = test_config(dir.path(), &["rust"], "");
    let mut coordinator = coordinator(&dir, config, scenario_client(), CancellationToken::new());

    let result = coordinator.run().await;
    assert!(matches!(result, Err(HarvestError::Persistence(_))));

    // Records written before the failure are complete
    let submissions = read_csv(&partition_file(&data, RecordType::Submission));
    assert_eq!(submissions.len(), 3);

    let run = coordinator
        .ledger()
        .get_run(coordinator.run_id())
        .unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    assert!(coordinator
        .sink()
        .partitions()
        .iter()
        .all(|p| p.record_type != RecordType::Comment));
}

#[tokio::test]
async fn test_cancellation_closes_partitions_and_marks_run_interrupted() {
    let dir = TempDir::new().unwrap();
    let cancel = CancellationToken::new();
    let mut client = scenario_client();
    client.cancel_on = Some(("a".to_string(), cancel.clone()));

    let config = test_config(dir.path(), &["rust"], "");
    let mut coordinator = coordinator(&dir, config, client, cancel);

    let stats = tokio::time::timeout(Duration::from_secs(5), coordinator.run())
        .await
        .expect("run should stop after cancellation")
        .unwrap();

    assert!(stats.cancelled);
    assert_eq!(stats.emitted_count(RecordType::Submission), 2);
    assert_eq!(stats.emitted_count(RecordType::Comment), 0);
    assert!(stats.failures.is_empty());

    let data = dir.path().join("data");
    assert_eq!(read_csv(&partition_file(&data, RecordType::Submission)).len(), 3);
    assert!(!data.join("comment").exists());

    let run = coordinator
        .ledger()
        .get_run(coordinator.run_id())
        .unwrap();
    assert_eq!(run.status, RunStatus::Interrupted);
}

#[tokio::test]
async fn test_exhausted_quota_waits_for_reset() {
    let dir = TempDir::new().unwrap();
    let client = scenario_client();
    *client.quota.lock().unwrap() = Some(QuotaSnapshot {
        remaining: 0,
        used: 600,
        reset_at: Utc::now() + chrono::Duration::milliseconds(300),
    });

    let config = test_config(dir.path(), &["rust"], "");
    let mut coordinator = coordinator(&dir, config, client, CancellationToken::new());

    let started = std::time::Instant::now();
    let stats = coordinator.run().await.unwrap();

    assert_eq!(stats.rate_limit_waits, 1);
    assert!(started.elapsed() >= Duration::from_millis(250));
    assert_eq!(stats.emitted_count(RecordType::Comment), 3);
    assert_eq!(
        coordinator
            .ledger()
            .get_run(coordinator.run_id())
            .unwrap()
            .rate_limit_waits,
        1
    );
}

#[tokio::test]
async fn test_authors_fetched_once_each_when_enabled() {
    let dir = TempDir::new().unwrap();
    let mut client = scenario_client();
    for name in ["alice", "bob", "carol", "dave"] {
        client.authors.insert(name.to_string(), author(name));
    }

    let config = test_config(dir.path(), &["rust"], "fetch-authors = true");
    let mut coordinator = coordinator(&dir, config, client, CancellationToken::new());

    let stats = coordinator.run().await.unwrap();

    assert_eq!(stats.emitted_count(RecordType::Author), 4);
    let authors = read_csv(&partition_file(
        &dir.path().join("data"),
        RecordType::Author,
    ));
    assert_eq!(authors.len(), 5);
}

#[tokio::test]
async fn test_summary_written_when_configured() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path(), &["rust"], "");
    let summary_path = dir.path().join("reports").join("summary.md");
    config.output.summary_path = Some(summary_path.display().to_string());

    let mut coordinator = coordinator(&dir, config, scenario_client(), CancellationToken::new());
    coordinator.run().await.unwrap();

    let markdown = std::fs::read_to_string(&summary_path).unwrap();
    assert!(markdown.contains("| comment | 3 | 0 |"));
    assert!(markdown.contains("## Failed Fetches (1)"));

    let summary = generate_summary(coordinator.ledger(), None).unwrap();
    assert_eq!(summary.total_records(), 7);
    assert_eq!(summary.partitions.len(), 4);
}

#[tokio::test]
async fn test_second_run_gets_new_files() {
    let dir = TempDir::new().unwrap();

    for _ in 0..2 {
        let config = test_config(dir.path(), &["rust"], "");
        let mut coordinator =
            coordinator(&dir, config, scenario_client(), CancellationToken::new());
        coordinator.run().await.unwrap();
    }

    let community_dir = dir.path().join("data").join("community");
    assert!(community_dir.join("1700000000.csv").exists());
    assert!(community_dir.join("1700000000-1.csv").exists());

    let ledger = SqliteLedger::new(&dir.path().join("harvest.db")).unwrap();
    let latest = ledger.get_latest_run().unwrap().unwrap();
    assert_eq!(latest.id, 2);
    let partitions = ledger.get_partitions(latest.id).unwrap();
    assert!(partitions
        .iter()
        .all(|p| p.path.to_string_lossy().ends_with("-1.csv")));
}

