//! Books, their chunks, published editions, clips, and the public feed.

pub mod sqlite;

pub use sqlite::Library;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::text::{Chapter, detect_chapters};

/// Most tags an edition may carry.
pub const MAX_TAGS: usize = 10;

/// Longest clip quote, in characters.
pub const MAX_QUOTE_CHARS: usize = 280;

/// Longest clip, in seconds.
pub const MAX_CLIP_SECS: f64 = 60.0;

/// Weight of a like against a listen when ranking the feed.
pub const LIKE_WEIGHT: u64 = 3;

#[derive(Debug, thiserror::Error)]
pub enum LibraryError {
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },
    #[error("invalid input: {0}")]
    Invalid(String),
    #[error("duplicate: {0}")]
    Duplicate(String),
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl LibraryError {
    pub(crate) fn not_found(kind: &'static str, id: impl ToString) -> Self {
        LibraryError::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

pub type LibraryResult<T> = Result<T, LibraryError>;

/// An imported book.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Book {
    pub id: i64,
    pub title: String,
    pub author: String,
    pub content_hash: String,
    pub text: String,
    pub created_at: String,
}

impl Book {
    /// Chapters detected in the book's text.
    pub fn chapters(&self) -> Vec<Chapter> {
        detect_chapters(&self.text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkStatus {
    Pending,
    Modernized,
    Failed,
}

impl ChunkStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ChunkStatus::Pending => "pending",
            ChunkStatus::Modernized => "modernized",
            ChunkStatus::Failed => "failed",
        }
    }
}

impl FromStr for ChunkStatus {
    type Err = LibraryError;

    fn from_str(s: &str) -> LibraryResult<Self> {
        match s {
            "pending" => Ok(ChunkStatus::Pending),
            "modernized" => Ok(ChunkStatus::Modernized),
            "failed" => Ok(ChunkStatus::Failed),
            other => Err(LibraryError::Invalid(format!("unknown chunk status: {other}"))),
        }
    }
}

/// A chunk as kept in the library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredChunk {
    pub book_id: i64,
    pub position: usize,
    pub chapter: usize,
    pub original: String,
    pub modernized: Option<String>,
    pub status: ChunkStatus,
}

/// How far modernization of a book has come.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    pub total: usize,
    pub modernized: usize,
    pub failed: usize,
}

impl Progress {
    pub fn pending(&self) -> usize {
        self.total - self.modernized - self.failed
    }

    /// Every chunk modernized (and there is at least one).
    pub fn is_complete(&self) -> bool {
        self.total > 0 && self.modernized == self.total
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    /// Listed in the feed.
    Public,
    /// Reachable by share code only.
    Unlisted,
    /// Owner only.
    Private,
}

impl Visibility {
    pub fn as_str(self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Unlisted => "unlisted",
            Visibility::Private => "private",
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Visibility {
    type Err = LibraryError;

    fn from_str(s: &str) -> LibraryResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "public" => Ok(Visibility::Public),
            "unlisted" => Ok(Visibility::Unlisted),
            "private" => Ok(Visibility::Private),
            other => Err(LibraryError::Invalid(format!(
                "unknown visibility `{other}` (expected public, unlisted, or private)"
            ))),
        }
    }
}

/// A published, shareable modernized version of a book.
#[derive(Debug, Clone, PartialEq)]
pub struct Edition {
    pub id: i64,
    pub book_id: i64,
    pub title: String,
    pub author: String,
    pub description: String,
    pub tags: Vec<String>,
    pub visibility: Visibility,
    pub share_code: String,
    pub voice: Option<String>,
    pub audio_dir: Option<String>,
    pub listens: u64,
    pub likes: u64,
    pub created_at: String,
}

/// Input for [`Library::publish_edition`].
#[derive(Debug, Clone, PartialEq)]
pub struct NewEdition {
    pub book_id: i64,
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub visibility: Visibility,
    pub voice: Option<String>,
    pub audio_dir: Option<String>,
}

impl NewEdition {
    pub fn new(book_id: i64, title: impl Into<String>) -> Self {
        Self {
            book_id,
            title: title.into(),
            description: String::new(),
            tags: Vec::new(),
            visibility: Visibility::Public,
            voice: None,
            audio_dir: None,
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// A short shareable audio excerpt with its quoted text.
#[derive(Debug, Clone, PartialEq)]
pub struct Clip {
    pub id: i64,
    pub edition_id: i64,
    pub quote: String,
    pub start_secs: f64,
    pub duration_secs: f64,
    pub listens: u64,
    pub likes: u64,
    pub created_at: String,
}

/// Input for [`Library::create_clip`].
#[derive(Debug, Clone, PartialEq)]
pub struct NewClip {
    pub edition_id: i64,
    pub quote: String,
    pub start_secs: f64,
    pub duration_secs: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeedOrder {
    #[default]
    Recent,
    Popular,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FeedItem {
    Edition(Edition),
    Clip(Clip),
}

impl FeedItem {
    /// Ids share one sequence, so a larger id is always newer.
    pub fn id(&self) -> i64 {
        match self {
            FeedItem::Edition(e) => e.id,
            FeedItem::Clip(c) => c.id,
        }
    }

    pub fn score(&self) -> u64 {
        let (likes, listens) = match self {
            FeedItem::Edition(e) => (e.likes, e.listens),
            FeedItem::Clip(c) => (c.likes, c.listens),
        };
        likes * LIKE_WEIGHT + listens
    }
}

/// Trim, lowercase, strip a leading `#`, drop empties and repeats, cap at [`MAX_TAGS`].
pub fn normalize_tags<S: AsRef<str>>(tags: &[S]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for tag in tags {
        let tag = tag.as_ref().trim().trim_start_matches('#').trim().to_lowercase();
        let tag = tag.split_whitespace().collect::<Vec<_>>().join("-");
        if tag.is_empty() || out.contains(&tag) {
            continue;
        }
        out.push(tag);
        if out.len() == MAX_TAGS {
            break;
        }
    }
    out
}

/// Check clip bounds and return the trimmed quote.
pub fn validate_clip(clip: &NewClip) -> LibraryResult<String> {
    let quote = clip.quote.trim();
    if quote.is_empty() {
        return Err(LibraryError::Invalid("clip quote is empty".to_string()));
    }
    let len = quote.chars().count();
    if len > MAX_QUOTE_CHARS {
        return Err(LibraryError::Invalid(format!(
            "clip quote is {len} characters (max {MAX_QUOTE_CHARS})"
        )));
    }
    if !clip.start_secs.is_finite() || clip.start_secs < 0.0 {
        return Err(LibraryError::Invalid("clip start must be zero or later".to_string()));
    }
    if !clip.duration_secs.is_finite()
        || clip.duration_secs <= 0.0
        || clip.duration_secs > MAX_CLIP_SECS
    {
        return Err(LibraryError::Invalid(format!(
            "clip duration must be above 0 and at most {MAX_CLIP_SECS} seconds"
        )));
    }
    Ok(quote.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clip(quote: &str, start: f64, duration: f64) -> NewClip {
        NewClip {
            edition_id: 1,
            quote: quote.to_string(),
            start_secs: start,
            duration_secs: duration,
        }
    }

    #[test]
    fn tags_are_normalized() {
        let tags = normalize_tags(&["  #Gothic ", "gothic", "", "Science Fiction", "#"]);
        assert_eq!(tags, vec!["gothic", "science-fiction"]);
    }

    #[test]
    fn tags_are_capped() {
        let many: Vec<String> = (0..20).map(|i| format!("t{i}")).collect();
        let tags = normalize_tags(&many);
        assert_eq!(tags.len(), MAX_TAGS);
        assert_eq!(tags[0], "t0");
    }

    #[test]
    fn visibility_parses() {
        assert_eq!("PUBLIC".parse::<Visibility>().unwrap(), Visibility::Public);
        assert_eq!(" unlisted".parse::<Visibility>().unwrap(), Visibility::Unlisted);
        assert!("secret".parse::<Visibility>().is_err());
    }

    #[test]
    fn clip_validation() {
        assert_eq!(validate_clip(&clip("  Call me Ishmael. ", 0.0, 5.0)).unwrap(), "Call me Ishmael.");
        assert!(validate_clip(&clip("   ", 0.0, 5.0)).is_err());
        assert!(validate_clip(&clip(&"x".repeat(281), 0.0, 5.0)).is_err());
        assert!(validate_clip(&clip(&"x".repeat(280), 0.0, 5.0)).is_ok());
        assert!(validate_clip(&clip("q", -1.0, 5.0)).is_err());
        assert!(validate_clip(&clip("q", 0.0, 0.0)).is_err());
        assert!(validate_clip(&clip("q", 0.0, 60.0)).is_ok());
        assert!(validate_clip(&clip("q", 0.0, 60.5)).is_err());
        assert!(validate_clip(&clip("q", f64::NAN, 5.0)).is_err());
    }

    #[test]
    fn progress_math() {
        let p = Progress {
            total: 10,
            modernized: 6,
            failed: 1,
        };
        assert_eq!(p.pending(), 3);
        assert!(!p.is_complete());
        assert!(!Progress::default().is_complete());
    }

    #[test]
    fn feed_score_weights_likes() {
        let item = FeedItem::Clip(Clip {
            id: 1,
            edition_id: 1,
            quote: "q".to_string(),
            start_secs: 0.0,
            duration_secs: 1.0,
            listens: 4,
            likes: 2,
            created_at: String::new(),
        });
        assert_eq!(item.score(), 10);
    }
}
