use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use rusqlite_migration::{Migrations, M};

use crate::app::{EstuaryError, Result};
use crate::domain::{Abstract, Summary};
use crate::store::ContentStore;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    fn run_migrations(&self) -> Result<()> {
        let migrations = Migrations::new(vec![M::up(include_str!(
            "../../migrations/001-initial/up.sql"
        ))]);

        let mut conn = self.conn()?;

        // Full sync so a returned write survives a crash.
        conn.pragma_update(None, "synchronous", "FULL")?;
        migrations
            .to_latest(&mut conn)
            .map_err(|e| match e {
                rusqlite_migration::Error::RusqliteError { err, .. } => EstuaryError::Storage(err),
                other => EstuaryError::Storage(rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error::new(1),
                    Some(format!("migration failed: {}", other)),
                )),
            })?;

        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| {
            EstuaryError::Storage(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(1),
                Some(e.to_string()),
            ))
        })
    }
}

impl ContentStore for SqliteStore {
    fn put_summary(&self, summary: &Summary) -> Result<()> {
        let conn = self.conn()?;
        let data = serde_json::to_string(summary)?;

        conn.execute(
            "INSERT INTO feeds (key, url, summary) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET summary = ?3",
            params![Summary::storage_key(&summary.url), summary.url, data],
        )?;

        Ok(())
    }

    fn get_summary(&self, url: &str) -> Result<Option<Summary>> {
        let conn = self.conn()?;

        let data: Option<String> = conn
            .query_row(
                "SELECT summary FROM feeds WHERE key = ?1",
                params![Summary::storage_key(url)],
                |row| row.get(0),
            )
            .optional()?;

        match data {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }

    fn list_feeds(&self) -> Result<Vec<String>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare("SELECT url FROM feeds ORDER BY url")?;
        let urls = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;

        Ok(urls)
    }

    fn delete_feed(&self, url: &str) -> Result<()> {
        let mut conn = self.conn()?;
        let key = Summary::storage_key(url);

        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM articles WHERE id IN (SELECT id FROM abstracts WHERE feed_key = ?1)",
            params![key],
        )?;
        tx.execute("DELETE FROM abstracts WHERE feed_key = ?1", params![key])?;
        tx.execute("DELETE FROM feeds WHERE key = ?1", params![key])?;
        tx.commit()?;

        Ok(())
    }

    fn put_abstracts(&self, abstracts: &[Abstract]) -> Result<()> {
        if abstracts.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn()?;

        let tx = conn.transaction()?;
        for article in abstracts {
            let data = serde_json::to_string(article)?;
            tx.execute(
                "INSERT INTO abstracts (id, feed_key, data) VALUES (?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET feed_key = ?2, data = ?3",
                params![article.id, Summary::storage_key(&article.feed_url), data],
            )?;
        }
        tx.commit()?;

        Ok(())
    }

    fn get_abstracts(&self, feed_url: &str) -> Result<Vec<Abstract>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare("SELECT data FROM abstracts WHERE feed_key = ?1")?;
        let rows = stmt
            .query_map(params![Summary::storage_key(feed_url)], |row| {
                row.get::<_, String>(0)
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.iter()
            .map(|data| serde_json::from_str(data).map_err(EstuaryError::from))
            .collect()
    }

    fn put_content(&self, id: &str, body: &str) -> Result<()> {
        let conn = self.conn()?;

        conn.execute(
            "INSERT INTO articles (id, body, stored_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET body = ?2, stored_at = ?3",
            params![id, body, Utc::now().to_rfc3339()],
        )?;

        Ok(())
    }

    fn put_contents(&self, bodies: &[(String, String)]) -> Result<usize> {
        if bodies.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn()?;

        let tx = conn.transaction()?;
        let stored_at = Utc::now().to_rfc3339();
        let mut count = 0;

        for (id, body) in bodies {
            count += tx.execute(
                "INSERT OR IGNORE INTO articles (id, body, stored_at) VALUES (?1, ?2, ?3)",
                params![id, body, stored_at],
            )?;
        }

        tx.commit()?;
        Ok(count)
    }

    fn get_content(&self, id: &str) -> Result<Option<String>> {
        let conn = self.conn()?;

        let body = conn
            .query_row(
                "SELECT body FROM articles WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;

        Ok(body)
    }

    fn delete_articles(&self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn()?;

        let tx = conn.transaction()?;
        for id in ids {
            tx.execute("DELETE FROM abstracts WHERE id = ?1", params![id])?;
            tx.execute("DELETE FROM articles WHERE id = ?1", params![id])?;
        }
        tx.commit()?;

        Ok(())
    }

    fn get_meta(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn()?;

        let value = conn
            .query_row(
                "SELECT value FROM meta WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;

        Ok(value)
    }

    fn put_meta(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn()?;

        conn.execute(
            "INSERT INTO meta (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = ?2",
            params![key, value],
        )?;

        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            "BEGIN;
             DELETE FROM articles;
             DELETE FROM abstracts;
             DELETE FROM feeds;
             DELETE FROM meta;
             COMMIT;",
        )?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = "https://example.com/feed.xml";

    fn article(id: &str, feed: &str) -> Abstract {
        let mut a = Abstract::new(id.to_string(), feed);
        a.title = Some(format!("Title {}", id));
        a
    }

    #[test]
    fn test_put_and_get_summary() {
        let store = SqliteStore::in_memory().unwrap();
        let mut summary = Summary::new(FEED.into());
        summary.title = Some("Example".into());
        summary.catalog = vec!["a".into()];
        store.put_summary(&summary).unwrap();

        let retrieved = store.get_summary(FEED).unwrap().unwrap();
        assert_eq!(retrieved, summary);
        assert!(store.get_summary("https://missing.example/feed").unwrap().is_none());
    }

    #[test]
    fn test_put_summary_overwrites() {
        let store = SqliteStore::in_memory().unwrap();
        let mut summary = Summary::new(FEED.into());
        store.put_summary(&summary).unwrap();
        summary.title = Some("Renamed".into());
        store.put_summary(&summary).unwrap();

        assert_eq!(store.list_feeds().unwrap(), vec![FEED.to_string()]);
        assert_eq!(
            store.get_summary(FEED).unwrap().unwrap().title,
            Some("Renamed".into())
        );
    }

    #[test]
    fn test_abstracts_by_feed() {
        let store = SqliteStore::in_memory().unwrap();
        store
            .put_abstracts(&[
                article("a", FEED),
                article("b", FEED),
                article("c", "https://other.example/feed"),
            ])
            .unwrap();

        let mut ids: Vec<String> = store
            .get_abstracts(FEED)
            .unwrap()
            .into_iter()
            .map(|a| a.id)
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_put_abstracts_updates_state() {
        let store = SqliteStore::in_memory().unwrap();
        let mut a = article("a", FEED);
        store.put_abstracts(&[a.clone()]).unwrap();
        a.read = true;
        store.put_abstracts(&[a]).unwrap();

        let stored = store.get_abstracts(FEED).unwrap();
        assert_eq!(stored.len(), 1);
        assert!(stored[0].read);
    }

    #[test]
    fn test_put_contents_does_not_rewrite() {
        let store = SqliteStore::in_memory().unwrap();
        let bodies = vec![("a".to_string(), "<p>first</p>".to_string())];
        assert_eq!(store.put_contents(&bodies).unwrap(), 1);

        let again = vec![("a".to_string(), "<p>second</p>".to_string())];
        assert_eq!(store.put_contents(&again).unwrap(), 0);
        assert_eq!(store.get_content("a").unwrap(), Some("<p>first</p>".into()));

        store.put_content("a", "<p>forced</p>").unwrap();
        assert_eq!(store.get_content("a").unwrap(), Some("<p>forced</p>".into()));
    }

    #[test]
    fn test_delete_feed_cascades_and_is_idempotent() {
        let store = SqliteStore::in_memory().unwrap();
        store.put_summary(&Summary::new(FEED.into())).unwrap();
        store.put_abstracts(&[article("a", FEED)]).unwrap();
        store.put_content("a", "body").unwrap();

        store.delete_feed(FEED).unwrap();
        store.delete_feed(FEED).unwrap();

        assert!(store.get_summary(FEED).unwrap().is_none());
        assert!(store.get_abstracts(FEED).unwrap().is_empty());
        assert!(store.get_content("a").unwrap().is_none());
    }

    #[test]
    fn test_delete_articles() {
        let store = SqliteStore::in_memory().unwrap();
        store
            .put_abstracts(&[article("a", FEED), article("b", FEED)])
            .unwrap();
        store.put_content("a", "body").unwrap();

        store.delete_articles(&["a".to_string()]).unwrap();
        store.delete_articles(&["a".to_string()]).unwrap();

        let remaining = store.get_abstracts(FEED).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, "b");
        assert!(store.get_content("a").unwrap().is_none());
    }

    #[test]
    fn test_meta_and_clear() {
        let store = SqliteStore::in_memory().unwrap();
        store.put_meta("k", "v1").unwrap();
        store.put_meta("k", "v2").unwrap();
        assert_eq!(store.get_meta("k").unwrap(), Some("v2".into()));

        store.put_summary(&Summary::new(FEED.into())).unwrap();
        store.clear().unwrap();
        assert!(store.get_meta("k").unwrap().is_none());
        assert!(store.list_feeds().unwrap().is_empty());
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("account").join("collection.db");
        {
            let store = SqliteStore::new(&path).unwrap();
            store.put_summary(&Summary::new(FEED.into())).unwrap();
        }
        let store = SqliteStore::new(&path).unwrap();
        assert_eq!(store.list_feeds().unwrap(), vec![FEED.to_string()]);
    }
}
