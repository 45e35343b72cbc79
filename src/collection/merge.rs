//! Folding fetched feeds into the in-memory catalog.
//!
//! A merge is planned against a read-only view, persisted, and only then
//! applied, so a failed write leaves memory untouched.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};

use crate::app::Result;
use crate::domain::{Abstract, FeedTree, Summary};
use crate::fetcher::FetchedFeed;
use crate::store::ContentStore;

/// In-memory view of one account's cache.
#[derive(Debug, Default)]
pub(crate) struct Catalog {
    pub summaries: BTreeMap<String, Summary>,
    pub abstracts: HashMap<String, Abstract>,
    pub favorites: HashSet<String>,
    pub tree: FeedTree,
    pub cursor: Option<String>,
}

impl Catalog {
    /// Articles of one feed, in catalog order.
    pub fn articles_of<'a>(&'a self, summary: &'a Summary) -> impl Iterator<Item = &'a Abstract> {
        summary
            .catalog
            .iter()
            .filter_map(move |id| self.abstracts.get(id))
    }

    /// Drop a feed and everything hanging off it. Returns the removed summary.
    pub fn remove_feed(&mut self, url: &str) -> Option<Summary> {
        let summary = self.summaries.remove(url)?;
        for id in &summary.catalog {
            self.abstracts.remove(id);
            self.favorites.remove(id);
        }
        self.tree.remove(url);
        Some(summary)
    }

    /// Insert or replace one abstract, keeping the favorites index in step.
    pub fn put_abstract(&mut self, article: Abstract) {
        if article.favorite {
            self.favorites.insert(article.id.clone());
        } else {
            self.favorites.remove(&article.id);
        }
        self.abstracts.insert(article.id.clone(), article);
    }
}

#[derive(Debug)]
pub(crate) struct MergePlan {
    pub summary: Summary,
    pub summary_changed: bool,
    /// New or changed abstracts.
    pub abstracts: Vec<Abstract>,
    pub contents: Vec<(String, String)>,
    pub added: usize,
}

/// Work out what `fetched` changes, without touching the catalog.
///
/// `is_pending` reports ids with local changes not yet pushed upstream;
/// their read/favorite flags are not overwritten by upstream state.
pub(crate) fn plan(
    catalog: &Catalog,
    fetched: FetchedFeed,
    is_pending: &dyn Fn(&str) -> bool,
    now: DateTime<Utc>,
) -> MergePlan {
    let previous = catalog.summaries.get(&fetched.url);
    let mut summary = previous
        .cloned()
        .unwrap_or_else(|| Summary::new(fetched.url.clone()));

    if fetched.title.is_some() {
        summary.title = fetched.title;
    }
    if fetched.link.is_some() {
        summary.link = fetched.link;
    }
    if fetched.remote_id.is_some() {
        summary.remote_id = fetched.remote_id;
    }
    summary.validator = fetched.validator;

    let mut abstracts = Vec::new();
    let mut contents = Vec::new();
    let mut seen = HashSet::new();
    let mut added = 0;

    for item in fetched.articles {
        let id = item.article.id.clone();
        if !seen.insert(id.clone()) || summary.tombstones.contains(&id) {
            continue;
        }

        let merged = match catalog.abstracts.get(&id) {
            Some(existing) => {
                let mut updated = existing.clone();
                if item.article.title.is_some() {
                    updated.title = item.article.title;
                }
                if item.article.link.is_some() {
                    updated.link = item.article.link;
                }
                if updated.published_at.is_none() {
                    updated.published_at = item.article.published_at;
                }
                if let Some(upstream) = item.upstream {
                    if !is_pending(&id) {
                        updated.read = upstream.read;
                        updated.favorite = upstream.favorite;
                    }
                }
                (updated != *existing).then_some(updated)
            }
            None => {
                let mut article = item.article;
                let state = item.upstream.unwrap_or_default();
                article.read = state.read;
                article.favorite = state.favorite;
                article.fetched_at = now;
                summary.catalog.push(id.clone());
                added += 1;
                Some(article)
            }
        };

        if let Some(body) = item.content {
            contents.push((id, body));
        }
        if let Some(article) = merged {
            abstracts.push(article);
        }
    }

    // Incremental syncs carry the upstream state of everything already cached.
    if let Some(states) = &fetched.states {
        for id in &summary.catalog {
            if seen.contains(id) || is_pending(id) {
                continue;
            }
            let Some(existing) = catalog.abstracts.get(id) else {
                continue;
            };
            let state = states.state_of(id);
            if existing.state() != state {
                let mut updated = existing.clone();
                updated.read = state.read;
                updated.favorite = state.favorite;
                abstracts.push(updated);
            }
        }
    }

    // Whole document seen: tombstones for ids upstream no longer lists can go.
    if fetched.complete {
        summary.tombstones.retain(|id| seen.contains(id));
    }

    order_catalog(&mut summary, catalog, &abstracts);

    let summary_changed = match previous {
        Some(previous) => *previous != summary,
        None => true,
    };
    if summary_changed {
        summary.last_fetched_at = Some(now);
    }

    MergePlan {
        summary,
        summary_changed,
        abstracts,
        contents,
        added,
    }
}

/// Newest first; planned abstracts take precedence over cached ones.
fn order_catalog(summary: &mut Summary, catalog: &Catalog, planned: &[Abstract]) {
    let planned: HashMap<&str, &Abstract> = planned.iter().map(|a| (a.id.as_str(), a)).collect();
    let date_of = |id: &str| {
        planned
            .get(id)
            .copied()
            .or_else(|| catalog.abstracts.get(id))
            .map(Abstract::effective_date)
    };
    summary.catalog.sort_by(|a, b| {
        date_of(b.as_str())
            .cmp(&date_of(a.as_str()))
            .then_with(|| a.cmp(b))
    });
}

/// Write a plan out. Bodies and abstracts go first so a summary never
/// references rows that are not on disk.
pub(crate) fn persist(store: &dyn ContentStore, plan: &MergePlan) -> Result<()> {
    if !plan.contents.is_empty() {
        store.put_contents(&plan.contents)?;
    }
    store.put_abstracts(&plan.abstracts)?;
    if plan.summary_changed {
        store.put_summary(&plan.summary)?;
    }
    Ok(())
}

impl MergePlan {
    /// Nothing to write besides bodies already on disk.
    pub fn is_noop(&self) -> bool {
        !self.summary_changed && self.abstracts.is_empty()
    }
}

pub(crate) fn apply(catalog: &mut Catalog, plan: MergePlan) {
    for article in plan.abstracts {
        catalog.put_abstract(article);
    }
    catalog
        .summaries
        .insert(plan.summary.url.clone(), plan.summary);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    use std::sync::Arc;

    use crate::domain::ArticleState;
    use crate::fetcher::{FetchedArticle, UpstreamStates};

    const URL: &str = "https://example.com/feed.xml";

    fn item(id: &str, day: u32, upstream: Option<ArticleState>) -> FetchedArticle {
        let mut article = Abstract::new(id.into(), URL);
        article.title = Some(format!("Title {}", id));
        article.published_at = Some(Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap());
        FetchedArticle {
            article,
            content: Some(format!("<p>{}</p>", id)),
            upstream,
        }
    }

    fn feed(items: Vec<FetchedArticle>, complete: bool) -> FetchedFeed {
        let mut fetched = FetchedFeed::new(URL);
        fetched.title = Some("Feed".into());
        fetched.articles = items;
        fetched.complete = complete;
        fetched
    }

    fn merged(catalog: &mut Catalog, fetched: FetchedFeed, pending: &dyn Fn(&str) -> bool) -> MergePlan {
        let plan = plan(catalog, fetched, pending, Utc::now());
        apply(catalog, MergePlan {
            summary: plan.summary.clone(),
            summary_changed: plan.summary_changed,
            abstracts: plan.abstracts.clone(),
            contents: plan.contents.clone(),
            added: plan.added,
        });
        plan
    }

    #[test]
    fn test_new_articles_are_unread_and_ordered() {
        let mut catalog = Catalog::default();
        let plan = merged(&mut catalog, feed(vec![item("a", 1, None), item("b", 3, None)], true), &|_| false);

        assert_eq!(plan.added, 2);
        assert!(plan.summary_changed);
        assert_eq!(catalog.summaries[URL].catalog, vec!["b", "a"]);
        assert!(catalog.abstracts.values().all(|a| !a.read && !a.favorite));
    }

    #[test]
    fn test_unchanged_refetch_plans_no_writes() {
        let mut catalog = Catalog::default();
        merged(&mut catalog, feed(vec![item("a", 1, None)], true), &|_| false);

        let again = plan(&catalog, feed(vec![item("a", 1, None)], true), &|_| false, Utc::now());
        assert_eq!(again.added, 0);
        assert!(again.abstracts.is_empty());
        assert!(!again.summary_changed);
    }

    #[test]
    fn test_local_state_survives_upstream_without_state() {
        let mut catalog = Catalog::default();
        merged(&mut catalog, feed(vec![item("a", 1, None)], true), &|_| false);
        catalog.abstracts.get_mut("a").unwrap().read = true;

        let mut renamed = item("a", 1, None);
        renamed.article.title = Some("Renamed".into());
        merged(&mut catalog, feed(vec![renamed], true), &|_| false);

        let a = &catalog.abstracts["a"];
        assert!(a.read);
        assert_eq!(a.title.as_deref(), Some("Renamed"));
    }

    #[test]
    fn test_upstream_state_respects_pending_changes() {
        let mut catalog = Catalog::default();
        let unread = Some(ArticleState::default());
        merged(&mut catalog, feed(vec![item("a", 1, unread), item("b", 2, unread)], false), &|_| false);
        catalog.abstracts.get_mut("a").unwrap().read = true;

        let starred = Some(ArticleState { read: false, favorite: true });
        merged(
            &mut catalog,
            feed(vec![item("a", 1, starred), item("b", 2, starred)], false),
            &|id| id == "a",
        );

        assert!(catalog.abstracts["a"].read);
        assert!(!catalog.abstracts["a"].favorite);
        assert!(catalog.abstracts["b"].favorite);
        assert!(catalog.favorites.contains("b"));
        assert!(!catalog.favorites.contains("a"));
    }

    #[test]
    fn test_upstream_states_reach_cached_articles() {
        let mut catalog = Catalog::default();
        let unread = Some(ArticleState::default());
        merged(
            &mut catalog,
            feed(vec![item("a", 1, unread), item("b", 2, unread), item("c", 3, unread)], false),
            &|_| false,
        );

        // Nothing new upstream; "a" was read and "b" starred elsewhere.
        let mut delta = feed(vec![], false);
        delta.states = Some(Arc::new(UpstreamStates {
            unread: ["b", "c"].iter().map(|s| s.to_string()).collect(),
            starred: ["b", "c"].iter().map(|s| s.to_string()).collect(),
        }));
        let plan = merged(&mut catalog, delta, &|id| id == "c");

        assert_eq!(plan.added, 0);
        assert_eq!(plan.abstracts.len(), 2);
        assert!(catalog.abstracts["a"].read);
        assert!(!catalog.abstracts["b"].read);
        assert!(catalog.favorites.contains("b"));
        // pending local change wins
        assert!(!catalog.abstracts["c"].favorite);
    }

    #[test]
    fn test_matching_upstream_states_plan_nothing() {
        let mut catalog = Catalog::default();
        merged(&mut catalog, feed(vec![item("a", 1, Some(ArticleState::default()))], false), &|_| false);

        let mut delta = feed(vec![], false);
        delta.states = Some(Arc::new(UpstreamStates {
            unread: ["a".to_string()].into_iter().collect(),
            starred: Default::default(),
        }));
        assert!(plan(&catalog, delta, &|_| false, Utc::now()).is_noop());
    }

    #[test]
    fn test_tombstoned_ids_are_not_resurrected() {
        let mut catalog = Catalog::default();
        merged(&mut catalog, feed(vec![item("a", 1, None)], true), &|_| false);
        let mut summary = catalog.summaries[URL].clone();
        summary.expire(&["a".to_string()].into_iter().collect());
        catalog.summaries.insert(URL.into(), summary);
        catalog.abstracts.remove("a");

        let plan = merged(&mut catalog, feed(vec![item("a", 1, None)], true), &|_| false);
        assert_eq!(plan.added, 0);
        assert!(!catalog.abstracts.contains_key("a"));

        // Once upstream stops listing it the tombstone is dropped.
        merged(&mut catalog, feed(vec![item("b", 2, None)], true), &|_| false);
        assert!(catalog.summaries[URL].tombstones.is_empty());
    }

    #[test]
    fn test_remove_feed_purges_favorites() {
        let mut catalog = Catalog::default();
        let starred = Some(ArticleState { read: false, favorite: true });
        merged(&mut catalog, feed(vec![item("a", 1, starred)], false), &|_| false);
        catalog.tree.insert(URL, &[]);
        assert!(catalog.favorites.contains("a"));

        assert!(catalog.remove_feed(URL).is_some());
        assert!(catalog.favorites.is_empty());
        assert!(catalog.abstracts.is_empty());
        assert!(catalog.tree.is_empty());
    }
}
