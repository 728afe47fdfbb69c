//! Typed records produced by a harvest
//!
//! Every upstream payload is normalized into one of five flat record types.
//! Each type has a fixed column order used for its partition header and rows.

mod types;

pub use types::{
    AuthorRecord, CommentRecord, CommunityRecord, Edited, ScrapeConfigRecord, SubmissionRecord,
    Tabular,
};

use std::fmt;

/// Kind of record, one partition per kind and run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecordType {
    Config,
    Community,
    Submission,
    Comment,
    Author,
}

impl RecordType {
    /// All record types, in tier order
    pub const ALL: [RecordType; 5] = [
        Self::Config,
        Self::Community,
        Self::Submission,
        Self::Comment,
        Self::Author,
    ];

    /// Stable name, used as the partition directory and in the run ledger
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Config => "config",
            Self::Community => "community",
            Self::Submission => "submission",
            Self::Comment => "comment",
            Self::Author => "author",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "config" => Some(Self::Config),
            "community" => Some(Self::Community),
            "submission" => Some(Self::Submission),
            "comment" => Some(Self::Comment),
            "author" => Some(Self::Author),
            _ => None,
        }
    }

    /// Header names for this type's partition
    pub fn field_names(&self) -> &'static [&'static str] {
        match self {
            Self::Config => ScrapeConfigRecord::FIELDS,
            Self::Community => CommunityRecord::FIELDS,
            Self::Submission => SubmissionRecord::FIELDS,
            Self::Comment => CommentRecord::FIELDS,
            Self::Author => AuthorRecord::FIELDS,
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalized record of any type
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Config(ScrapeConfigRecord),
    Community(CommunityRecord),
    Submission(SubmissionRecord),
    Comment(CommentRecord),
    Author(AuthorRecord),
}

impl Record {
    pub fn record_type(&self) -> RecordType {
        match self {
            Self::Config(_) => RecordType::Config,
            Self::Community(_) => RecordType::Community,
            Self::Submission(_) => RecordType::Submission,
            Self::Comment(_) => RecordType::Comment,
            Self::Author(_) => RecordType::Author,
        }
    }

    /// Row values in the order given by `record_type().field_names()`
    pub fn values(&self) -> Vec<String> {
        match self {
            Self::Config(r) => r.values(),
            Self::Community(r) => r.values(),
            Self::Submission(r) => r.values(),
            Self::Comment(r) => r.values(),
            Self::Author(r) => r.values(),
        }
    }

    /// Identifier of the record, if it has one
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Config(_) => None,
            Self::Community(r) => Some(&r.id),
            Self::Submission(r) => Some(&r.id),
            Self::Comment(r) => Some(&r.id),
            Self::Author(r) => Some(&r.id),
        }
    }

    pub fn scraped_at(&self) -> i64 {
        match self {
            Self::Config(r) => r.scraped_at,
            Self::Community(r) => r.scraped_at,
            Self::Submission(r) => r.scraped_at,
            Self::Comment(r) => r.scraped_at,
            Self::Author(r) => r.scraped_at,
        }
    }
}
