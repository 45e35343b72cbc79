use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Upper bound on remembered retention tombstones for incremental backends.
pub const MAX_TOMBSTONES: usize = 2000;

/// Conditional-fetch token used to skip unchanged sources.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Validator {
    #[default]
    None,
    Http {
        etag: Option<String>,
        last_modified: Option<String>,
    },
    Cursor {
        value: String,
    },
}

impl Validator {
    pub fn etag(&self) -> Option<&str> {
        match self {
            Validator::Http { etag, .. } => etag.as_deref(),
            _ => None,
        }
    }

    pub fn last_modified(&self) -> Option<&str> {
        match self {
            Validator::Http { last_modified, .. } => last_modified.as_deref(),
            _ => None,
        }
    }

    pub fn cursor(&self) -> Option<&str> {
        match self {
            Validator::Cursor { value } => Some(value),
            _ => None,
        }
    }
}

/// Per-feed metadata plus the ordered catalog of its article ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub url: String,
    pub title: Option<String>,
    pub link: Option<String>,
    /// Backend-side identifier (TTRSS feed id, Inoreader stream id).
    #[serde(default)]
    pub remote_id: Option<String>,
    #[serde(default)]
    pub folder: Vec<String>,
    /// Article ids, newest first.
    #[serde(default)]
    pub catalog: Vec<String>,
    #[serde(default)]
    pub validator: Validator,
    pub last_fetched_at: Option<DateTime<Utc>>,
    /// Ids dropped by retention; never re-imported from upstream.
    #[serde(default)]
    pub tombstones: BTreeSet<String>,
}

impl Summary {
    pub fn new(url: String) -> Self {
        Self {
            url,
            title: None,
            link: None,
            remote_id: None,
            folder: Vec::new(),
            catalog: Vec::new(),
            validator: Validator::None,
            last_fetched_at: None,
            tombstones: BTreeSet::new(),
        }
    }

    /// Deterministic storage key for a feed URL.
    pub fn storage_key(url: &str) -> String {
        hex::encode(Sha256::digest(url.as_bytes()))
    }

    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.url)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.catalog.iter().any(|c| c == id)
    }

    /// Remove ids from the catalog, remembering them as tombstones.
    pub fn expire(&mut self, ids: &BTreeSet<String>) {
        self.catalog.retain(|id| !ids.contains(id));
        self.tombstones.extend(ids.iter().cloned());
        if self.tombstones.len() > MAX_TOMBSTONES {
            let excess = self.tombstones.len() - MAX_TOMBSTONES;
            let dropped: Vec<String> = self.tombstones.iter().take(excess).cloned().collect();
            for id in dropped {
                self.tombstones.remove(&id);
            }
        }
    }
}

/// Plain feed description exchanged with the OPML collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedListEntry {
    pub url: String,
    pub title: Option<String>,
    pub link: Option<String>,
    pub folder: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_key_deterministic() {
        let a = Summary::storage_key("https://example.com/feed.xml");
        let b = Summary::storage_key("https://example.com/feed.xml");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, Summary::storage_key("https://example.com/other.xml"));
    }

    #[test]
    fn test_validator_accessors() {
        let v = Validator::Http {
            etag: Some("\"abc\"".into()),
            last_modified: None,
        };
        assert_eq!(v.etag(), Some("\"abc\""));
        assert_eq!(v.last_modified(), None);
        assert_eq!(v.cursor(), None);

        let c = Validator::Cursor { value: "42".into() };
        assert_eq!(c.cursor(), Some("42"));
    }

    #[test]
    fn test_expire_removes_from_catalog() {
        let mut summary = Summary::new("https://example.com/feed.xml".into());
        summary.catalog = vec!["a".into(), "b".into(), "c".into()];
        let ids: BTreeSet<String> = ["b".to_string()].into_iter().collect();
        summary.expire(&ids);
        assert_eq!(summary.catalog, vec!["a".to_string(), "c".to_string()]);
        assert!(summary.tombstones.contains("b"));
    }

    #[test]
    fn test_summary_serde_defaults() {
        let json = r#"{"url":"https://example.com/feed.xml","title":null,"link":null,"last_fetched_at":null}"#;
        let summary: Summary = serde_json::from_str(json).unwrap();
        assert!(summary.catalog.is_empty());
        assert_eq!(summary.validator, Validator::None);
    }
}
