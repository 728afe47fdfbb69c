use std::fmt;

/// Edit marker carried by submissions and comments
///
/// Upstream reports either `false` or the unix time of the last edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edited {
    Never,
    At(i64),
}

impl fmt::Display for Edited {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Never => f.write_str("false"),
            Self::At(ts) => write!(f, "{}", ts),
        }
    }
}

/// Parameters of one run, emitted once at the start of the run
#[derive(Debug, Clone, PartialEq)]
pub struct ScrapeConfigRecord {
    pub community_ids: Vec<String>,
    pub submissions_per_community: u32,
    pub submission_ordering_mode: String,
    pub time_filter: String,
    pub comment_expansion_depth: u32,
    pub scraped_at: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommunityRecord {
    pub id: String,
    pub display_name: String,
    pub title: String,
    pub subscriber_count: i64,
    pub created_at: i64,
    pub scraped_at: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionRecord {
    pub id: String,
    pub author: String,
    pub created_at: i64,
    pub title: String,
    pub body_text: String,
    pub url: String,
    pub score: i64,
    pub upvote_ratio: f64,
    pub comment_count: i64,
    pub community_id: String,
    pub permalink: String,
    pub flair: Option<String>,
    pub author_flair: Option<String>,
    pub edited: Edited,
    pub locked: bool,
    pub is_original_content: bool,
    pub is_self_post: bool,
    pub is_adult: bool,
    pub is_pinned: bool,
    pub scraped_at: i64,
}

/// One comment; `parent_id` points at the submission or another comment
#[derive(Debug, Clone, PartialEq)]
pub struct CommentRecord {
    pub id: String,
    pub body_text: String,
    pub author: String,
    pub created_at: i64,
    pub edited: Edited,
    pub is_submission_author: bool,
    pub score: i64,
    pub is_pinned: bool,
    pub community_id: String,
    pub submission_id: String,
    pub parent_id: String,
    pub reply_ids: Vec<String>,
    pub scraped_at: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuthorRecord {
    pub id: String,
    pub name: String,
    pub comment_karma: i64,
    pub created_at: i64,
    pub has_verified_email: bool,
    pub icon_url: Option<String>,
    pub is_staff: bool,
    pub is_moderator: bool,
    pub is_gold_member: bool,
    pub link_karma: i64,
    pub is_verified: bool,
    pub scraped_at: i64,
}

/// Fixed column order and row rendering for a record type
pub trait Tabular {
    /// Header names, in column order
    const FIELDS: &'static [&'static str];

    /// Row values, in the same order as `FIELDS`
    fn values(&self) -> Vec<String>;
}

fn opt(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

fn list(values: &[String]) -> String {
    serde_json::to_string(values).unwrap_or_else(|_| "[]".to_string())
}

impl Tabular for ScrapeConfigRecord {
    const FIELDS: &'static [&'static str] = &[
        "community_ids",
        "submissions_per_community",
        "submission_ordering_mode",
        "time_filter",
        "comment_expansion_depth",
        "scraped_at",
    ];

    fn values(&self) -> Vec<String> {
        vec![
            list(&self.community_ids),
            self.submissions_per_community.to_string(),
            self.submission_ordering_mode.clone(),
            self.time_filter.clone(),
            self.comment_expansion_depth.to_string(),
            self.scraped_at.to_string(),
        ]
    }
}

impl Tabular for CommunityRecord {
    const FIELDS: &'static [&'static str] = &[
        "id",
        "display_name",
        "title",
        "subscriber_count",
        "created_at",
        "scraped_at",
    ];

    fn values(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            self.display_name.clone(),
            self.title.clone(),
            self.subscriber_count.to_string(),
            self.created_at.to_string(),
            self.scraped_at.to_string(),
        ]
    }
}

impl Tabular for SubmissionRecord {
    const FIELDS: &'static [&'static str] = &[
        "id",
        "author",
        "created_at",
        "title",
        "body_text",
        "url",
        "score",
        "upvote_ratio",
        "comment_count",
        "community_id",
        "permalink",
        "flair",
        "author_flair",
        "edited",
        "locked",
        "is_original_content",
        "is_self_post",
        "is_adult",
        "is_pinned",
        "scraped_at",
    ];

    fn values(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            self.author.clone(),
            self.created_at.to_string(),
            self.title.clone(),
            self.body_text.clone(),
            self.url.clone(),
            self.score.to_string(),
            self.upvote_ratio.to_string(),
            self.comment_count.to_string(),
            self.community_id.clone(),
            self.permalink.clone(),
            opt(&self.flair),
            opt(&self.author_flair),
            self.edited.to_string(),
            self.locked.to_string(),
            self.is_original_content.to_string(),
            self.is_self_post.to_string(),
            self.is_adult.to_string(),
            self.is_pinned.to_string(),
            self.scraped_at.to_string(),
        ]
    }
}

impl Tabular for CommentRecord {
    const FIELDS: &'static [&'static str] = &[
        "id",
        "body_text",
        "author",
        "created_at",
        "edited",
        "is_submission_author",
        "score",
        "is_pinned",
        "community_id",
        "submission_id",
        "parent_id",
        "reply_ids",
        "scraped_at",
    ];

    fn values(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            self.body_text.clone(),
            self.author.clone(),
            self.created_at.to_string(),
            self.edited.to_string(),
            self.is_submission_author.to_string(),
            self.score.to_string(),
            self.is_pinned.to_string(),
            self.community_id.clone(),
            self.submission_id.clone(),
            self.parent_id.clone(),
            list(&self.reply_ids),
            self.scraped_at.to_string(),
        ]
    }
}

impl Tabular for AuthorRecord {
    const FIELDS: &'static [&'static str] = &[
        "id",
        "name",
        "comment_karma",
        "created_at",
        "has_verified_email",
        "icon_url",
        "is_staff",
        "is_moderator",
        "is_gold_member",
        "link_karma",
        "is_verified",
        "scraped_at",
    ];

    fn values(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            self.name.clone(),
            self.comment_karma.to_string(),
            self.created_at.to_string(),
            self.has_verified_email.to_string(),
            opt(&self.icon_url),
            self.is_staff.to_string(),
            self.is_moderator.to_string(),
            self.is_gold_member.to_string(),
            self.link_karma.to_string(),
            self.is_verified.to_string(),
            self.scraped_at.to_string(),
        ]
    }
}
