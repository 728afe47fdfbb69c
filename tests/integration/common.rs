//! Shared fixtures: payload builders, a scripted client and CSV helpers

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use subreddit_harvest::client::{
    CommunityBatch, FetchError, ListingRequest, QuotaSnapshot, ResourceClient,
};
use subreddit_harvest::config::{parse_config, Config};
use subreddit_harvest::records::RecordType;
use tokio_util::sync::CancellationToken;

/// Client answering from fixed tables
#[derive(Default)]
pub struct ScriptedClient {
    pub communities: HashMap<String, Result<CommunityBatch, FetchError>>,
    pub comments: HashMap<String, Result<Vec<Value>, FetchError>>,
    pub authors: HashMap<String, Value>,
    /// Reported once, after the first fetch
    pub quota: Mutex<Option<QuotaSnapshot>>,
    /// Cancels the token and hangs when this submission's comments are fetched
    pub cancel_on: Option<(String, CancellationToken)>,
    pub calls: Mutex<Vec<String>>,
}

impl ScriptedClient {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn log(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl ResourceClient for ScriptedClient {
    async fn fetch_top_level(
        &self,
        community: &str,
        _request: &ListingRequest,
    ) -> Result<CommunityBatch, FetchError> {
        self.log(format!("community:{}", community));
        self.communities
            .get(community)
            .cloned()
            .unwrap_or_else(|| Err(FetchError::NotFound(community.to_string())))
    }

    async fn fetch_children(
        &self,
        submission_id: &str,
        _expansion_depth: u32,
    ) -> Result<Vec<Value>, FetchError> {
        self.log(format!("comments:{}", submission_id));
        if let Some((id, token)) = &self.cancel_on {
            if id == submission_id {
                token.cancel();
                std::future::pending::<()>().await;
            }
        }
        self.comments
            .get(submission_id)
            .cloned()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn fetch_author(&self, name: &str) -> Result<Value, FetchError> {
        self.log(format!("author:{}", name));
        self.authors
            .get(name)
            .cloned()
            .ok_or_else(|| FetchError::NotFound(name.to_string()))
    }

    fn current_quota(&self) -> Option<QuotaSnapshot> {
        self.quota.lock().unwrap().take()
    }
}

/// Builds a config from TOML, with output under `dir`
pub fn test_config(dir: &Path, communities: &[&str], extra: &str) -> Config {
    let list = communities
        .iter()
        .map(|c| format!("\"{}\"", c))
        .collect::<Vec<_>>()
        .join(", ");
    parse_config(&format!(
        r#"
[harvest]
communities = [{list}]
submissions-per-community = 2
{extra}

[client]
user-agent = "harvest-test/0.1"
max-retries = 1
retry-delay-ms = 1

[credentials]
client-id = "id"
client-secret = "secret"
username = "user"
password = "pass"

[output]
data-dir = "{data}"
ledger-path = "{ledger}"
"#,
        list = list,
        extra = extra,
        data = dir.join("data").display(),
        ledger = dir.join("harvest.db").display(),
    ))
    .unwrap()
}

pub fn community(name: &str) -> Value {
    json!({"kind": "t5", "data": {
        "id": format!("id_{}", name), "name": format!("t5_id_{}", name),
        "display_name": name, "title": format!("The {} community", name),
        "subscribers": 1200, "created_utc": 1200000000.0
    }})
}

pub fn submission(id: &str, author: &str) -> Value {
    json!({"kind": "t3", "data": {
        "id": id, "name": format!("t3_{}", id), "author": author,
        "created_utc": 1700000000.0, "title": format!("Post {}", id),
        "selftext": "Says \"hello\", then leaves", "url": "https://example.com/post",
        "score": 12, "upvote_ratio": 0.9, "num_comments": 3, "subreddit_id": "t5_id_rust",
        "permalink": format!("/r/rust/comments/{}/", id), "link_flair_text": null,
        "author_flair_text": null, "edited": false, "locked": false,
        "is_original_content": false, "is_self": true, "over_18": false, "stickied": false
    }})
}

pub fn comment(id: &str, submission_id: &str, parent: &str, author: &str) -> Value {
    json!({"kind": "t1", "data": {
        "id": id, "name": format!("t1_{}", id), "body": format!("comment {}", id),
        "author": author, "created_utc": 1700000100.0, "edited": false,
        "is_submitter": false, "score": 3, "stickied": false, "subreddit_id": "t5_id_rust",
        "link_id": format!("t3_{}", submission_id), "parent_id": parent, "replies": ""
    }})
}

pub fn author(name: &str) -> Value {
    json!({"kind": "t2", "data": {
        "id": format!("u_{}", name), "name": name, "comment_karma": 10,
        "created_utc": 1500000000.0, "link_karma": 5, "verified": true
    }})
}

pub fn batch(name: &str, submissions: Vec<Value>) -> Result<CommunityBatch, FetchError> {
    Ok(CommunityBatch {
        community: community(name),
        submissions,
    })
}

/// Splits quoted CSV rows, honoring doubled quotes
pub fn read_csv(path: &Path) -> Vec<Vec<String>> {
    let content = std::fs::read_to_string(path).unwrap();
    content
        .split_terminator("\r\n")
        .map(|line| {
            let mut fields = Vec::new();
            let mut field = String::new();
            let mut chars = line.chars().peekable();
            let mut quoted = false;
            while let Some(c) = chars.next() {
                match (c, quoted) {
                    ('"', false) => quoted = true,
                    ('"', true) if chars.peek() == Some(&'"') => {
                        field.push('"');
                        chars.next();
                    }
                    ('"', true) => quoted = false,
                    (',', false) => fields.push(std::mem::take(&mut field)),
                    (c, _) => field.push(c),
                }
            }
            fields.push(field);
            fields
        })
        .collect()
}

/// The single partition file written for a record type
pub fn partition_file(data_dir: &Path, record_type: RecordType) -> PathBuf {
    let dir = data_dir.join(record_type.as_str());
    let mut files: Vec<PathBuf> = std::fs::read_dir(&dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect();
    assert_eq!(files.len(), 1, "expected one partition in {}", dir.display());
    files.remove(0)
}

/// Column index of a field in a partition header
pub fn column(record_type: RecordType, field: &str) -> usize {
    record_type
        .field_names()
        .iter()
        .position(|f| *f == field)
        .unwrap()
}
