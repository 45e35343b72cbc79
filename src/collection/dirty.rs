//! Staging area for changes that still have to reach the store and,
//! for remote backends, the upstream service.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use crate::fetcher::FeedSource;

/// Pending read/favorite change of one article; `None` fields are untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleMutation {
    pub id: String,
    pub feed_url: String,
    pub read: Option<bool>,
    pub favorite: Option<bool>,
}

impl ArticleMutation {
    pub fn new(id: &str, feed_url: &str) -> Self {
        Self {
            id: id.to_string(),
            feed_url: feed_url.to_string(),
            read: None,
            favorite: None,
        }
    }

    /// Fold a later change for the same article into this one.
    fn absorb(&mut self, newer: &ArticleMutation) {
        if newer.read.is_some() {
            self.read = newer.read;
        }
        if newer.favorite.is_some() {
            self.favorite = newer.favorite;
        }
        self.feed_url.clone_from(&newer.feed_url);
    }
}

/// Feed added or removed since the last commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructuralChange {
    Added(String),
    Removed(FeedSource),
}

impl StructuralChange {
    pub fn url(&self) -> &str {
        match self {
            StructuralChange::Added(url) => url,
            StructuralChange::Removed(source) => &source.url,
        }
    }
}

/// Everything a single commit takes responsibility for.
#[derive(Debug, Default)]
pub struct PendingSet {
    pub mutations: Vec<ArticleMutation>,
    pub structural: Vec<StructuralChange>,
}

impl PendingSet {
    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty() && self.structural.is_empty()
    }
}

#[derive(Default)]
struct Pending {
    mutations: HashMap<String, ArticleMutation>,
    structural: HashMap<String, StructuralChange>,
    /// Ids taken by a commit that has not settled yet.
    in_flight: HashSet<String>,
    /// Feed removals taken by a commit that has not settled yet.
    removing: HashSet<String>,
}

#[derive(Default)]
pub struct DirtyTracker {
    pending: Mutex<Pending>,
}

impl DirtyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Pending> {
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record a change; repeated calls for one id coalesce.
    pub fn mark_mutated(&self, mutation: ArticleMutation) {
        let mut pending = self.lock();
        match pending.mutations.get_mut(&mutation.id) {
            Some(existing) => existing.absorb(&mutation),
            None => {
                pending.mutations.insert(mutation.id.clone(), mutation);
            }
        }
    }

    /// Record a feed addition or removal; the latest change per URL wins.
    pub fn mark_structural(&self, change: StructuralChange) {
        self.lock()
            .structural
            .insert(change.url().to_string(), change);
    }

    /// Whether a local change to `id` has not yet been settled upstream.
    pub fn is_pending(&self, id: &str) -> bool {
        let pending = self.lock();
        pending.mutations.contains_key(id) || pending.in_flight.contains(id)
    }

    /// Whether `url` was unsubscribed locally and the remote may still list it.
    pub fn is_removal_pending(&self, url: &str) -> bool {
        let pending = self.lock();
        match pending.structural.get(url) {
            Some(StructuralChange::Removed(_)) => true,
            Some(StructuralChange::Added(_)) => false,
            None => pending.removing.contains(url),
        }
    }

    pub fn len(&self) -> usize {
        let pending = self.lock();
        pending.mutations.len() + pending.structural.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Take everything pending. Later marks land in a fresh set and are not
    /// affected by what happens to this snapshot.
    pub fn snapshot(&self) -> PendingSet {
        let mut pending = self.lock();
        let mutations: Vec<ArticleMutation> = pending.mutations.drain().map(|(_, m)| m).collect();
        let structural: Vec<StructuralChange> =
            pending.structural.drain().map(|(_, c)| c).collect();
        pending
            .in_flight
            .extend(mutations.iter().map(|m| m.id.clone()));
        pending.removing.extend(structural.iter().filter_map(|c| match c {
            StructuralChange::Removed(source) => Some(source.url.clone()),
            StructuralChange::Added(_) => None,
        }));
        PendingSet {
            mutations,
            structural,
        }
    }

    /// Put back items a commit could not settle. Marks made after the
    /// snapshot take precedence over the returned values.
    pub fn requeue(&self, mutations: Vec<ArticleMutation>, structural: Vec<StructuralChange>) {
        let mut pending = self.lock();
        for mut mutation in mutations {
            pending.in_flight.remove(&mutation.id);
            if let Some(newer) = pending.mutations.remove(&mutation.id) {
                mutation.absorb(&newer);
            }
            pending.mutations.insert(mutation.id.clone(), mutation);
        }
        for change in structural {
            pending.removing.remove(change.url());
            pending
                .structural
                .entry(change.url().to_string())
                .or_insert(change);
        }
    }

    /// Return an entire snapshot after a failed commit.
    pub fn restore(&self, snapshot: PendingSet) {
        self.requeue(snapshot.mutations, snapshot.structural);
    }

    /// The commit owning `snapshot` is done with it.
    pub fn settle(&self, snapshot: &PendingSet) {
        let mut pending = self.lock();
        for mutation in &snapshot.mutations {
            pending.in_flight.remove(&mutation.id);
        }
        for change in &snapshot.structural {
            pending.removing.remove(change.url());
        }
    }

    /// Forget everything, including in-flight ids.
    pub fn clear(&self) {
        let mut pending = self.lock();
        pending.mutations.clear();
        pending.structural.clear();
        pending.in_flight.clear();
        pending.removing.clear();
    }
}
