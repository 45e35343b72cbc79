//! Per-account façade over fetching, caching and state changes.
//!
//! ```text
//! FetchStrategy ──fetch──> merge ──> ContentStore
//!                            │
//!                          Catalog (memory) <── update_abstract ──> DirtyTracker ──commit──> store / upstream
//! ```

pub mod dirty;
pub mod merge;
pub mod refresh;

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;

use crate::app::{EstuaryError, Result};
use crate::config::FetchConfig;
use crate::domain::{
    article::sort_newest_first, Abstract, Account, BackendKind, FeedListEntry, FeedTree,
    StateChange, Summary,
};
use crate::fetcher::{build_strategy, FeedFetch, FeedSource, FetchStrategy, FetchedFeed, RemoteFeed, SyncRequest};
use crate::store::{ContentStore, SqliteStore, META_FEED_TREE, META_SYNC_CURSOR};

use self::dirty::{ArticleMutation, DirtyTracker, StructuralChange};
use self::merge::Catalog;
use self::refresh::{RefreshGuard, RefreshState};

/// Virtual feed aggregating unread articles of every feed.
pub const UNREAD_FEED: &str = "<unread>";

/// File name of an account's cache inside its storage directory.
pub const DATABASE_FILE: &str = "collection.db";

/// Outcome of a commit. Failed upstream pushes stay pending.
#[derive(Debug, Default)]
pub struct CommitReport {
    /// Article changes written to the store.
    pub persisted: usize,
    /// Article changes accepted by the remote service.
    pub pushed: usize,
    /// Feed additions/removals settled.
    pub structural: usize,
    pub failures: Vec<(String, EstuaryError)>,
}

impl CommitReport {
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Outcome of a whole-account refresh.
#[derive(Debug, Default)]
pub struct RefreshReport {
    pub updated: usize,
    pub unchanged: usize,
    pub new_articles: usize,
    pub added_feeds: Vec<String>,
    pub removed_feeds: Vec<String>,
    /// Feeds that could not be fetched or merged, with the reason.
    pub failures: Vec<(String, EstuaryError)>,
}

/// Returned by [`Collection::update_abstract`]; `commit` flushes right away.
pub struct PendingCommit<'a> {
    collection: &'a Collection,
}

impl PendingCommit<'_> {
    pub async fn commit(self) -> Result<CommitReport> {
        self.collection.commit().await
    }
}

pub struct Collection {
    account: Account,
    store: Arc<dyn ContentStore>,
    strategy: Arc<dyn FetchStrategy>,
    catalog: RwLock<Catalog>,
    dirty: DirtyTracker,
    refreshing: RefreshGuard,
    committing: tokio::sync::Mutex<()>,
}

impl Collection {
    pub fn new(account: Account, store: Arc<dyn ContentStore>, strategy: Arc<dyn FetchStrategy>) -> Self {
        Self {
            account,
            store,
            strategy,
            catalog: RwLock::new(Catalog::default()),
            dirty: DirtyTracker::new(),
            refreshing: RefreshGuard::new(),
            committing: tokio::sync::Mutex::new(()),
        }
    }

    /// Open the on-disk cache of `account` under `storage_root`.
    pub fn open(account: Account, storage_root: &Path, fetch: &FetchConfig) -> Result<Self> {
        let path = storage_root.join(&account.key).join(DATABASE_FILE);
        let store: Arc<dyn ContentStore> = Arc::new(SqliteStore::new(&path)?);
        let strategy = build_strategy(&account, fetch)?;
        Ok(Self::new(account, store, strategy))
    }

    pub fn account(&self) -> &Account {
        &self.account
    }

    pub fn kind(&self) -> BackendKind {
        self.strategy.kind()
    }

    pub fn refresh_state(&self) -> RefreshState {
        self.refreshing.state()
    }

    fn read(&self) -> RwLockReadGuard<'_, Catalog> {
        self.catalog.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Catalog> {
        self.catalog.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Load the cache and, for remote accounts, open a session.
    ///
    /// A failed login is logged and the cached state stays usable offline.
    pub async fn init(&self) -> Result<()> {
        self.load()?;

        if let Err(e) = self.strategy.authenticate().await {
            tracing::warn!(
                "Could not authenticate account {}: {}; working from cache",
                self.account.key,
                e
            );
        }
        Ok(())
    }

    /// Populate the in-memory catalog from the store.
    pub fn load(&self) -> Result<()> {
        let mut catalog = Catalog::default();

        for url in self.store.list_feeds()? {
            let Some(mut summary) = self.store.get_summary(&url)? else {
                continue;
            };
            let abstracts = self.store.get_abstracts(&url)?;

            // Rows written by an interrupted merge may be missing from the catalog.
            summary.catalog.retain(|id| abstracts.iter().any(|a| &a.id == id));
            for article in &abstracts {
                if !summary.contains(&article.id) {
                    summary.catalog.push(article.id.clone());
                }
            }
            for article in abstracts {
                catalog.put_abstract(article);
            }
            catalog.summaries.insert(url, summary);
        }

        catalog.tree = match self.store.get_meta(META_FEED_TREE)? {
            Some(json) => serde_json::from_str(&json)?,
            None => FeedTree::new(),
        };
        let summaries = &catalog.summaries;
        catalog.tree.retain(&|url| summaries.contains_key(url));
        for summary in catalog.summaries.values() {
            if !catalog.tree.contains(&summary.url) {
                catalog.tree.insert(&summary.url, &summary.folder);
            }
        }
        catalog.cursor = self.store.get_meta(META_SYNC_CURSOR)?;

        tracing::debug!(
            "Loaded {} feeds and {} articles for account {}",
            catalog.summaries.len(),
            catalog.abstracts.len(),
            self.account.key
        );
        *self.write() = catalog;
        Ok(())
    }

    // ---- reads -------------------------------------------------------------

    /// Articles of `feed` newest first; [`UNREAD_FEED`] spans every feed.
    pub fn get_articles(&self, feed: &str) -> Result<Vec<Abstract>> {
        let catalog = self.read();

        let mut articles: Vec<Abstract> = if feed == UNREAD_FEED {
            catalog
                .abstracts
                .values()
                .filter(|a| !a.read)
                .cloned()
                .collect()
        } else {
            let summary = catalog
                .summaries
                .get(feed)
                .ok_or_else(|| EstuaryError::NotFound(format!("feed {}", feed)))?;
            catalog.articles_of(summary).cloned().collect()
        };

        sort_newest_first(&mut articles);
        Ok(articles)
    }

    pub fn get_favorites(&self) -> Vec<Abstract> {
        let catalog = self.read();
        let mut favorites: Vec<Abstract> = catalog
            .favorites
            .iter()
            .filter_map(|id| catalog.abstracts.get(id))
            .cloned()
            .collect();
        sort_newest_first(&mut favorites);
        favorites
    }

    pub fn get_abstract(&self, id: &str) -> Option<Abstract> {
        self.read().abstracts.get(id).cloned()
    }

    pub fn get_summary(&self, url: &str) -> Option<Summary> {
        self.read().summaries.get(url).cloned()
    }

    /// Summaries in feed tree order.
    pub fn summaries(&self) -> Vec<Summary> {
        let catalog = self.read();
        catalog
            .tree
            .urls()
            .iter()
            .filter_map(|url| catalog.summaries.get(url))
            .cloned()
            .collect()
    }

    pub fn feed_tree(&self) -> FeedTree {
        self.read().tree.clone()
    }

    /// Feed tuples for OPML export.
    pub fn get_feed_list(&self) -> Vec<FeedListEntry> {
        let catalog = self.read();
        catalog
            .tree
            .entries()
            .into_iter()
            .filter_map(|(folder, url)| {
                catalog.summaries.get(&url).map(|summary| FeedListEntry {
                    url,
                    title: summary.title.clone(),
                    link: summary.link.clone(),
                    folder,
                })
            })
            .collect()
    }

    /// Unread articles in one feed, or everywhere when `feed` is `None`.
    pub fn unread_count(&self, feed: Option<&str>) -> usize {
        let catalog = self.read();
        match feed {
            None | Some(UNREAD_FEED) => catalog.abstracts.values().filter(|a| !a.read).count(),
            Some(url) => catalog
                .summaries
                .get(url)
                .map(|summary| catalog.articles_of(summary).filter(|a| !a.read).count())
                .unwrap_or(0),
        }
    }

    /// Article body from the cache, fetched from the backend on first access.
    pub async fn get_content(&self, id: &str) -> Result<String> {
        if let Some(body) = self.store.get_content(id)? {
            return Ok(body);
        }

        let article = self
            .get_abstract(id)
            .ok_or_else(|| EstuaryError::NotFound(format!("article {}", id)))?;
        match self.strategy.fetch_content(&article).await? {
            Some(body) => {
                self.store.put_content(id, &body)?;
                Ok(body)
            }
            None => Err(EstuaryError::NotFound(format!("content for article {}", id))),
        }
    }

    // ---- feeds -------------------------------------------------------------

    pub async fn add_feed(&self, url: &str) -> Result<Summary> {
        self.add_feed_to(url, &[]).await
    }

    /// Validate `url` with one fetch and file it under `folder`.
    ///
    /// Nothing is stored when validation fails.
    pub async fn add_feed_to(&self, url: &str, folder: &[String]) -> Result<Summary> {
        if let Some(existing) = self.get_summary(url) {
            tracing::info!("Feed {} already present", url);
            return Ok(existing);
        }

        let fetched = self.strategy.add_feed(url).await?;
        let url = fetched.url.clone();
        let summary = {
            let mut catalog = self.write();
            let mut plan = merge::plan(&catalog, fetched, &|id| self.dirty.is_pending(id), Utc::now());
            plan.summary.folder = folder.to_vec();
            plan.summary_changed = true;
            merge::persist(self.store.as_ref(), &plan)?;

            let summary = plan.summary.clone();
            merge::apply(&mut catalog, plan);
            catalog.tree.insert(&url, folder);
            summary
        };

        tracing::info!(
            "Added feed {} ({} articles) to account {}",
            url,
            summary.catalog.len(),
            self.account.key
        );
        self.dirty.mark_structural(StructuralChange::Added(url));
        self.commit().await?;
        Ok(summary)
    }

    /// Remove a feed with its articles, favorites and tree placement.
    pub async fn del_feed(&self, url: &str) -> Result<CommitReport> {
        let removed = self
            .write()
            .remove_feed(url)
            .ok_or_else(|| EstuaryError::NotFound(format!("feed {}", url)))?;

        tracing::info!(
            "Removed feed {} ({} articles) from account {}",
            url,
            removed.catalog.len(),
            self.account.key
        );
        self.dirty
            .mark_structural(StructuralChange::Removed(FeedSource::from(&removed)));
        self.commit().await
    }

    /// Add every entry into its folder; failures don't stop the import.
    pub async fn import_feeds(&self, entries: &[FeedListEntry]) -> Vec<(String, Result<Summary>)> {
        let mut results = Vec::with_capacity(entries.len());
        for entry in entries {
            let result = self.add_feed_to(&entry.url, &entry.folder).await;
            if let Err(e) = &result {
                tracing::warn!("Import of {} failed: {}", entry.url, e);
            }
            results.push((entry.url.clone(), result));
        }
        results
    }

    // ---- folders -----------------------------------------------------------

    pub fn add_folder(&self, parent: &[String], name: &str) -> Result<()> {
        self.edit_tree(|tree| tree.add_folder(parent, name))
    }

    /// Remove a folder; what it contained moves to the parent.
    pub fn remove_folder(&self, path: &[String]) -> Result<()> {
        self.edit_tree(|tree| tree.remove_folder(path))
    }

    pub fn move_feed(&self, url: &str, folder: &[String]) -> Result<()> {
        self.edit_tree(|tree| tree.move_feed(url, folder))
    }

    /// Apply `edit` to a copy of the tree, persist, then swap it in.
    fn edit_tree<F>(&self, edit: F) -> Result<()>
    where
        F: FnOnce(&mut FeedTree) -> Result<()>,
    {
        let mut catalog = self.write();
        let mut tree = catalog.tree.clone();
        edit(&mut tree)?;

        let moved: Vec<Summary> = tree
            .entries()
            .into_iter()
            .filter_map(|(folder, url)| {
                let summary = catalog.summaries.get(&url)?;
                (summary.folder != folder).then(|| Summary {
                    folder,
                    ..summary.clone()
                })
            })
            .collect();

        for summary in &moved {
            self.store.put_summary(summary)?;
        }
        self.store
            .put_meta(META_FEED_TREE, &serde_json::to_string(&tree)?)?;

        for summary in moved {
            catalog.summaries.insert(summary.url.clone(), summary);
        }
        catalog.tree = tree;
        Ok(())
    }

    // ---- article state -----------------------------------------------------

    /// Change flags in memory and stage them for the next commit.
    pub fn update_abstract(&self, id: &str, change: StateChange) -> Result<PendingCommit<'_>> {
        self.apply_change(id, change)?;
        Ok(PendingCommit { collection: self })
    }

    pub async fn add_to_favorites(&self, id: &str) -> Result<CommitReport> {
        self.update_abstract(id, StateChange::favorite(true))?
            .commit()
            .await
    }

    pub async fn remove_from_favorites(&self, id: &str) -> Result<CommitReport> {
        self.update_abstract(id, StateChange::favorite(false))?
            .commit()
            .await
    }

    /// Mark every unread article of `feed` (or [`UNREAD_FEED`]) read in one commit.
    pub async fn mark_all_read(&self, feed: &str) -> Result<CommitReport> {
        let unread: Vec<String> = self
            .get_articles(feed)?
            .into_iter()
            .filter(|a| !a.read)
            .map(|a| a.id)
            .collect();

        for id in &unread {
            self.apply_change(id, StateChange::read(true))?;
        }
        self.commit().await
    }

    fn apply_change(&self, id: &str, change: StateChange) -> Result<()> {
        let mut catalog = self.write();
        let mut article = catalog
            .abstracts
            .get(id)
            .cloned()
            .ok_or_else(|| EstuaryError::NotFound(format!("article {}", id)))?;

        let mut mutation = ArticleMutation::new(id, &article.feed_url);
        if let Some(read) = change.read.filter(|r| *r != article.read) {
            article.read = read;
            mutation.read = Some(read);
        }
        if let Some(favorite) = change.favorite.filter(|f| *f != article.favorite) {
            article.favorite = favorite;
            mutation.favorite = Some(favorite);
        }
        if mutation.read.is_none() && mutation.favorite.is_none() {
            return Ok(());
        }

        catalog.put_abstract(article);
        self.dirty.mark_mutated(mutation);
        Ok(())
    }

    /// Flush staged changes to the store, then to the remote service.
    ///
    /// A storage failure puts everything back and fails the commit. Remote
    /// failures are reported in the result and stay pending.
    pub async fn commit(&self) -> Result<CommitReport> {
        let _serial = self.committing.lock().await;
        let snapshot = self.dirty.snapshot();
        if snapshot.is_empty() {
            return Ok(CommitReport::default());
        }

        if let Err(e) = self.persist_pending(&snapshot) {
            tracing::error!("Commit for account {} failed: {}", self.account.key, e);
            self.dirty.restore(snapshot);
            return Err(e);
        }

        let mut report = CommitReport {
            persisted: snapshot.mutations.len(),
            structural: snapshot.structural.len(),
            ..CommitReport::default()
        };

        if self.strategy.kind() != BackendKind::Local {
            let mut failed_mutations = Vec::new();
            let mut failed_structural = Vec::new();

            for mutation in &snapshot.mutations {
                if self.get_abstract(&mutation.id).is_none() {
                    continue;
                }
                match self.strategy.push_mutation(mutation).await {
                    Ok(()) => report.pushed += 1,
                    Err(e) => {
                        tracing::warn!("Push of {} failed: {}", mutation.id, e);
                        report.failures.push((mutation.id.clone(), e));
                        failed_mutations.push(mutation.clone());
                    }
                }
            }

            for change in &snapshot.structural {
                let StructuralChange::Removed(source) = change else {
                    continue;
                };
                if let Err(e) = self.strategy.del_feed(source).await {
                    tracing::warn!("Unsubscribe of {} failed: {}", source.url, e);
                    report.failures.push((source.url.clone(), e));
                    report.structural -= 1;
                    failed_structural.push(change.clone());
                }
            }

            self.dirty.requeue(failed_mutations, failed_structural);
        }
        self.dirty.settle(&snapshot);

        tracing::debug!(
            "Committed {} changes ({} pushed, {} structural) for account {}",
            report.persisted,
            report.pushed,
            report.structural,
            self.account.key
        );
        Ok(report)
    }

    fn persist_pending(&self, pending: &dirty::PendingSet) -> Result<()> {
        let catalog = self.read();

        let abstracts: Vec<Abstract> = pending
            .mutations
            .iter()
            .filter_map(|m| catalog.abstracts.get(&m.id))
            .cloned()
            .collect();
        self.store.put_abstracts(&abstracts)?;

        if pending.structural.is_empty() {
            return Ok(());
        }
        for change in &pending.structural {
            match change {
                StructuralChange::Removed(source) if !catalog.summaries.contains_key(&source.url) => {
                    self.store.delete_feed(&source.url)?;
                }
                StructuralChange::Added(url) => {
                    if let Some(summary) = catalog.summaries.get(url) {
                        self.store.put_summary(summary)?;
                    }
                }
                StructuralChange::Removed(_) => {}
            }
        }
        self.store
            .put_meta(META_FEED_TREE, &serde_json::to_string(&catalog.tree)?)?;
        Ok(())
    }

    // ---- fetching ----------------------------------------------------------

    /// Fetch every feed and merge the results.
    ///
    /// Returns `None` when a refresh of this account is already running.
    pub async fn refresh(&self, force: bool) -> Result<Option<RefreshReport>> {
        let Some(_ticket) = self.refreshing.try_begin() else {
            tracing::info!("Refresh of account {} already running", self.account.key);
            return Ok(None);
        };

        let request = {
            let catalog = self.read();
            SyncRequest {
                feeds: catalog.summaries.values().map(FeedSource::from).collect(),
                cursor: catalog.cursor.clone(),
                force,
            }
        };
        tracing::info!(
            "Refreshing {} feeds of account {}",
            request.feeds.len(),
            self.account.key
        );

        let batch = self.strategy.fetch_all(request).await?;
        let mut report = RefreshReport::default();
        let mut catalog = self.write();

        if let Some(subscriptions) = batch.subscriptions {
            self.sync_subscriptions(&mut catalog, subscriptions, &mut report)?;
        }

        for (url, result) in batch.results {
            match result {
                Ok(FeedFetch::NotModified) => report.unchanged += 1,
                Ok(FeedFetch::Updated(fetched)) => {
                    if !catalog.summaries.contains_key(&url) {
                        tracing::debug!("Dropping result for removed feed {}", url);
                        continue;
                    }
                    match self.merge_into(&mut catalog, fetched) {
                        Ok(Some(added)) => {
                            report.updated += 1;
                            report.new_articles += added;
                        }
                        Ok(None) => report.unchanged += 1,
                        Err(e) => {
                            tracing::error!("Storing {} failed: {}", url, e);
                            report.failures.push((url, e));
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!("Fetch of {} failed: {}", url, e);
                    report.failures.push((url, e));
                }
            }
        }

        if let Some(cursor) = batch.cursor {
            if report.failures.is_empty() {
                self.store.put_meta(META_SYNC_CURSOR, &cursor)?;
                catalog.cursor = Some(cursor);
            }
        }

        tracing::info!(
            "Account {}: {} updated, {} unchanged, {} new articles, {} failed",
            self.account.key,
            report.updated,
            report.unchanged,
            report.new_articles,
            report.failures.len()
        );
        Ok(Some(report))
    }

    /// Fetch one feed. Returns the number of new articles.
    pub async fn refresh_feed(&self, url: &str, force: bool) -> Result<usize> {
        let source = self
            .get_summary(url)
            .map(|s| FeedSource::from(&s))
            .ok_or_else(|| EstuaryError::NotFound(format!("feed {}", url)))?;

        match self.strategy.fetch_one(&source, force).await? {
            FeedFetch::NotModified => Ok(0),
            FeedFetch::Updated(fetched) => {
                let mut catalog = self.write();
                if !catalog.summaries.contains_key(url) {
                    return Ok(0);
                }
                Ok(self.merge_into(&mut catalog, fetched)?.unwrap_or(0))
            }
        }
    }

    /// Returns the number of new articles, or `None` if nothing changed.
    fn merge_into(&self, catalog: &mut Catalog, fetched: FetchedFeed) -> Result<Option<usize>> {
        let plan = merge::plan(catalog, fetched, &|id| self.dirty.is_pending(id), Utc::now());
        merge::persist(self.store.as_ref(), &plan)?;
        let changed = !plan.is_noop();
        let added = plan.added;
        merge::apply(catalog, plan);
        Ok(changed.then_some(added))
    }

    /// Make the local feed set match the remote subscription list.
    fn sync_subscriptions(
        &self,
        catalog: &mut Catalog,
        subscriptions: Vec<RemoteFeed>,
        report: &mut RefreshReport,
    ) -> Result<()> {
        let upstream: BTreeSet<&str> = subscriptions.iter().map(|s| s.url.as_str()).collect();
        let stale: Vec<String> = catalog
            .summaries
            .keys()
            .filter(|url| !upstream.contains(url.as_str()))
            .cloned()
            .collect();
        let mut tree_changed = !stale.is_empty();

        for url in stale {
            self.store.delete_feed(&url)?;
            catalog.remove_feed(&url);
            tracing::info!("Feed {} no longer subscribed upstream", url);
            report.removed_feeds.push(url);
        }

        for remote in subscriptions {
            if self.dirty.is_removal_pending(&remote.url) {
                continue;
            }

            let mut summary = catalog
                .summaries
                .get(&remote.url)
                .cloned()
                .unwrap_or_else(|| Summary::new(remote.url.clone()));
            let is_new = !catalog.summaries.contains_key(&remote.url);
            let before = summary.clone();

            if remote.title.is_some() {
                summary.title = remote.title;
            }
            if remote.link.is_some() {
                summary.link = remote.link;
            }
            if remote.remote_id.is_some() {
                summary.remote_id = remote.remote_id;
            }
            summary.folder = remote.folder;

            if is_new || summary != before {
                self.store.put_summary(&summary)?;
            }
            if is_new || summary.folder != before.folder || !catalog.tree.contains(&summary.url) {
                catalog.tree.insert(&summary.url, &summary.folder);
                tree_changed = true;
            }
            if is_new {
                report.added_feeds.push(summary.url.clone());
            }
            catalog.summaries.insert(summary.url.clone(), summary);
        }

        if tree_changed {
            self.store
                .put_meta(META_FEED_TREE, &serde_json::to_string(&catalog.tree)?)?;
        }
        Ok(())
    }

    // ---- retention ---------------------------------------------------------

    /// Delete read, unstarred articles of `url` older than `max_age`.
    ///
    /// Unread and favorite articles are kept regardless of age. Returns the
    /// number of articles removed.
    pub fn clean_old_articles(&self, url: &str, max_age: chrono::Duration) -> Result<usize> {
        let mut catalog = self.write();
        if !catalog.summaries.contains_key(url) {
            return Err(EstuaryError::NotFound(format!("feed {}", url)));
        }
        // an age reaching past the earliest representable time matches nothing
        let Some(cutoff) = Utc::now().checked_sub_signed(max_age) else {
            return Ok(0);
        };
        self.expire_feed(&mut catalog, url, cutoff)
    }

    pub fn clean_all_old_articles(&self, max_age: chrono::Duration) -> Result<usize> {
        let Some(cutoff) = Utc::now().checked_sub_signed(max_age) else {
            return Ok(0);
        };
        let mut catalog = self.write();
        let urls: Vec<String> = catalog.summaries.keys().cloned().collect();

        let mut removed = 0;
        for url in urls {
            removed += self.expire_feed(&mut catalog, &url, cutoff)?;
        }
        if removed > 0 {
            tracing::info!(
                "Removed {} old articles from account {}",
                removed,
                self.account.key
            );
        }
        Ok(removed)
    }

    fn expire_feed(
        &self,
        catalog: &mut Catalog,
        url: &str,
        cutoff: chrono::DateTime<Utc>,
    ) -> Result<usize> {
        let Some(summary) = catalog.summaries.get(url) else {
            return Ok(0);
        };

        let expired: BTreeSet<String> = catalog
            .articles_of(summary)
            .filter(|a| a.read && !a.favorite && a.effective_date() < cutoff)
            .filter(|a| !self.dirty.is_pending(&a.id))
            .map(|a| a.id.clone())
            .collect();
        if expired.is_empty() {
            return Ok(0);
        }

        let mut updated = summary.clone();
        updated.expire(&expired);

        let ids: Vec<String> = expired.into_iter().collect();
        self.store.delete_articles(&ids)?;
        self.store.put_summary(&updated)?;

        for id in &ids {
            catalog.abstracts.remove(id);
            catalog.favorites.remove(id);
        }
        catalog.summaries.insert(url.to_string(), updated);
        tracing::debug!("Expired {} articles of {}", ids.len(), url);
        Ok(ids.len())
    }

    /// Drop everything this account has cached.
    pub fn clean(&self) -> Result<()> {
        let mut catalog = self.write();
        self.store.clear()?;
        self.dirty.clear();
        *catalog = Catalog::default();
        tracing::info!("Cleared cache of account {}", self.account.key);
        Ok(())
    }

    /// Credentials the backend rotated, if any.
    pub fn updated_account(&self) -> Option<Account> {
        self.strategy.updated_backend().map(|backend| Account {
            backend,
            ..self.account.clone()
        })
    }
}
