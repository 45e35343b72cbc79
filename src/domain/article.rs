use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Lightweight per-article record kept in memory for every cached article.
///
/// The body lives separately in the content store and is loaded lazily.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Abstract {
    pub id: String,
    pub feed_url: String,
    pub title: Option<String>,
    pub link: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub fetched_at: DateTime<Utc>,
    #[serde(default)]
    pub read: bool,
    #[serde(default)]
    pub favorite: bool,
}

impl Abstract {
    pub fn new(id: String, feed_url: &str) -> Self {
        Self {
            id,
            feed_url: feed_url.to_string(),
            title: None,
            link: None,
            published_at: None,
            fetched_at: Utc::now(),
            read: false,
            favorite: false,
        }
    }

    /// Generate a deterministic ID from feed URL and entry ID
    pub fn generate_id(feed_url: &str, entry_id: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(feed_url.as_bytes());
        hasher.update(entry_id.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or("(Untitled)")
    }

    /// Date used for ordering and retention; falls back to when we first saw it.
    pub fn effective_date(&self) -> DateTime<Utc> {
        self.published_at.unwrap_or(self.fetched_at)
    }

    pub fn state(&self) -> ArticleState {
        ArticleState {
            read: self.read,
            favorite: self.favorite,
        }
    }
}

/// Read/favorite flags of an article.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleState {
    pub read: bool,
    pub favorite: bool,
}

/// Partial state change requested by the user; `None` leaves a flag untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StateChange {
    pub read: Option<bool>,
    pub favorite: Option<bool>,
}

impl StateChange {
    pub fn read(read: bool) -> Self {
        Self {
            read: Some(read),
            favorite: None,
        }
    }

    pub fn favorite(favorite: bool) -> Self {
        Self {
            read: None,
            favorite: Some(favorite),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.read.is_none() && self.favorite.is_none()
    }
}

/// Sort newest first; undated articles go by fetch time.
pub fn sort_newest_first(articles: &mut [Abstract]) {
    articles.sort_by(|a, b| {
        b.effective_date()
            .cmp(&a.effective_date())
            .then_with(|| a.id.cmp(&b.id))
    });
}
