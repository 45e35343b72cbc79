pub mod sqlite;

use crate::app::Result;
use crate::domain::{Abstract, Summary};

pub use sqlite::SqliteStore;

/// Meta key holding the serialized feed tree.
pub const META_FEED_TREE: &str = "feed_tree";
/// Meta key holding the account-wide sync cursor of incremental backends.
pub const META_SYNC_CURSOR: &str = "sync_cursor";

/// Durable persistence for one account.
///
/// Every mutating call has been persisted by the time it returns.
pub trait ContentStore: Send + Sync {
    // Feed summaries
    fn put_summary(&self, summary: &Summary) -> Result<()>;
    fn get_summary(&self, url: &str) -> Result<Option<Summary>>;
    fn list_feeds(&self) -> Result<Vec<String>>;
    /// Removes the summary, its abstracts and their content. Idempotent.
    fn delete_feed(&self, url: &str) -> Result<()>;

    // Article metadata
    fn put_abstracts(&self, abstracts: &[Abstract]) -> Result<()>;
    fn get_abstracts(&self, feed_url: &str) -> Result<Vec<Abstract>>;

    // Article bodies
    fn put_content(&self, id: &str, body: &str) -> Result<()>;
    fn put_contents(&self, bodies: &[(String, String)]) -> Result<usize>;
    fn get_content(&self, id: &str) -> Result<Option<String>>;

    /// Removes abstracts and content for `ids`. Idempotent.
    fn delete_articles(&self, ids: &[String]) -> Result<()>;

    // Account-level values
    fn get_meta(&self, key: &str) -> Result<Option<String>>;
    fn put_meta(&self, key: &str, value: &str) -> Result<()>;

    /// Drop everything this account has persisted.
    fn clear(&self) -> Result<()>;
}
