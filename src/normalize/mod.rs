//! Record normalizer
//!
//! Maps raw upstream payloads into the flat typed records of [`crate::records`].
//! Normalization is pure: the same payload and `scraped_at` always produce the
//! same record.

mod fields;

pub use fields::strip_namespace;

use crate::records::{
    AuthorRecord, CommentRecord, CommunityRecord, Record, RecordType, ScrapeConfigRecord,
    SubmissionRecord,
};
use fields::Fields;
use serde_json::Value;
use thiserror::Error;

/// A payload that lacks a required field or carries one of the wrong shape
///
/// The scheduler drops the offending record and counts it; the rest of the
/// batch is kept.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("malformed {record_type} record: field '{field}' {reason}")]
pub struct MalformedRecordError {
    pub record_type: RecordType,
    pub field: String,
    pub reason: String,
}

/// Normalizes one raw payload into a typed record
///
/// # Arguments
///
/// * `record_type` - The record type the payload is expected to hold
/// * `raw` - The upstream object, either bare or wrapped in a `{kind, data}` envelope
/// * `scraped_at` - Start time of the fetch that produced the payload
///
/// # Returns
///
/// * `Ok(Record)` - The normalized record
/// * `Err(MalformedRecordError)` - A required field is missing or mistyped
pub fn normalize(
    record_type: RecordType,
    raw: &Value,
    scraped_at: i64,
) -> Result<Record, MalformedRecordError> {
    let fields = Fields::new(record_type, raw)?;

    let record = match record_type {
        RecordType::Config => Record::Config(config(&fields, scraped_at)?),
        RecordType::Community => Record::Community(community(&fields, scraped_at)?),
        RecordType::Submission => Record::Submission(submission(&fields, scraped_at)?),
        RecordType::Comment => Record::Comment(comment(&fields, scraped_at)?),
        RecordType::Author => Record::Author(author(&fields, scraped_at)?),
    };

    Ok(record)
}

fn config(f: &Fields<'_>, scraped_at: i64) -> Result<ScrapeConfigRecord, MalformedRecordError> {
    let count = |key: &str| -> Result<u32, MalformedRecordError> {
        u32::try_from(f.int(key)?).map_err(|_| f.error(key, "out of range"))
    };

    Ok(ScrapeConfigRecord {
        community_ids: f.str_list("community_ids")?,
        submissions_per_community: count("submissions_per_community")?,
        submission_ordering_mode: f.str("submission_ordering_mode")?,
        time_filter: f.str("time_filter")?,
        comment_expansion_depth: count("comment_expansion_depth")?,
        scraped_at,
    })
}

fn community(f: &Fields<'_>, scraped_at: i64) -> Result<CommunityRecord, MalformedRecordError> {
    Ok(CommunityRecord {
        id: f.id("id")?,
        display_name: f.str("display_name")?,
        title: f.str("title")?,
        subscriber_count: f.int("subscribers")?,
        created_at: f.timestamp("created_utc")?,
        scraped_at,
    })
}

fn submission(f: &Fields<'_>, scraped_at: i64) -> Result<SubmissionRecord, MalformedRecordError> {
    Ok(SubmissionRecord {
        id: f.id("id")?,
        author: f.str("author")?,
        created_at: f.timestamp("created_utc")?,
        title: f.str("title")?,
        body_text: f.opt_str("selftext")?.unwrap_or_default(),
        url: f.str("url")?,
        score: f.int("score")?,
        upvote_ratio: f.float("upvote_ratio")?,
        comment_count: f.int("num_comments")?,
        community_id: f.id("subreddit_id")?,
        permalink: f.str("permalink")?,
        flair: f.opt_str("link_flair_text")?,
        author_flair: f.opt_str("author_flair_text")?,
        edited: f.edited("edited")?,
        locked: f.boolean("locked")?,
        is_original_content: f.flag("is_original_content")?,
        is_self_post: f.boolean("is_self")?,
        is_adult: f.boolean("over_18")?,
        is_pinned: f.boolean("stickied")?,
        scraped_at,
    })
}

fn comment(f: &Fields<'_>, scraped_at: i64) -> Result<CommentRecord, MalformedRecordError> {
    Ok(CommentRecord {
        id: f.id("id")?,
        body_text: f.str("body")?,
        author: f.str("author")?,
        created_at: f.timestamp("created_utc")?,
        edited: f.edited("edited")?,
        is_submission_author: f.flag("is_submitter")?,
        score: f.int("score")?,
        is_pinned: f.flag("stickied")?,
        community_id: f.id("subreddit_id")?,
        submission_id: f.id("link_id")?,
        parent_id: f.id("parent_id")?,
        reply_ids: reply_ids(f)?,
        scraped_at,
    })
}

fn author(f: &Fields<'_>, scraped_at: i64) -> Result<AuthorRecord, MalformedRecordError> {
    Ok(AuthorRecord {
        id: f.id("id")?,
        name: f.str("name")?,
        comment_karma: f.int("comment_karma")?,
        created_at: f.timestamp("created_utc")?,
        has_verified_email: f.flag("has_verified_email")?,
        icon_url: f.opt_str("icon_img")?,
        is_staff: f.flag("is_employee")?,
        is_moderator: f.flag("is_mod")?,
        is_gold_member: f.flag("is_gold")?,
        link_karma: f.int("link_karma")?,
        is_verified: f.flag("verified")?,
        scraped_at,
    })
}

/// Derives the ordered direct-reply ids of a comment
///
/// Accepts either a pre-flattened `reply_ids` array or the nested `replies`
/// listing as delivered upstream (an empty string when there are none).
/// Collapsed placeholders inside the listing are not replies and are skipped.
fn reply_ids(f: &Fields<'_>) -> Result<Vec<String>, MalformedRecordError> {
    if f.raw("reply_ids").is_some() {
        return Ok(f
            .str_list("reply_ids")?
            .iter()
            .map(|id| strip_namespace(id).to_string())
            .collect());
    }

    let children = match f.raw("replies") {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::String(s)) if s.is_empty() => return Ok(Vec::new()),
        Some(listing) => listing
            .pointer("/data/children")
            .and_then(Value::as_array)
            .ok_or_else(|| f.error("replies", "expected a listing"))?,
    };

    children
        .iter()
        .filter(|child| child.get("kind").and_then(Value::as_str) == Some("t1"))
        .map(|child| {
            child
                .pointer("/data/id")
                .and_then(Value::as_str)
                .map(|id| strip_namespace(id).to_string())
                .ok_or_else(|| f.error("replies", "reply without an id"))
        })
        .collect()
}
