use serde::{Deserialize, Serialize};

use crate::app::{EstuaryError, Result};

/// A named folder inside a [`FeedTree`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    pub name: String,
    #[serde(default)]
    pub tree: FeedTree,
}

/// Hierarchical grouping of feed URLs.
///
/// Every URL appears at most once in the whole tree and folder names are
/// unique among siblings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedTree {
    #[serde(default)]
    pub folders: Vec<Folder>,
    #[serde(default)]
    pub feeds: Vec<String>,
}

impl FeedTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.folders.is_empty() && self.feeds.is_empty()
    }

    /// Place `url` under `path`, creating folders as needed.
    ///
    /// An existing placement of the same URL is removed first.
    pub fn insert(&mut self, url: &str, path: &[String]) {
        self.remove(url);
        self.folder_mut(path).feeds.push(url.to_string());
    }

    /// Remove a feed wherever it sits. Returns whether it was present.
    pub fn remove(&mut self, url: &str) -> bool {
        if let Some(pos) = self.feeds.iter().position(|f| f == url) {
            self.feeds.remove(pos);
            return true;
        }
        self.folders.iter_mut().any(|f| f.tree.remove(url))
    }

    pub fn contains(&self, url: &str) -> bool {
        self.feeds.iter().any(|f| f == url) || self.folders.iter().any(|f| f.tree.contains(url))
    }

    /// Folder path of a feed, if it is in the tree.
    pub fn path_of(&self, url: &str) -> Option<Vec<String>> {
        if self.feeds.iter().any(|f| f == url) {
            return Some(Vec::new());
        }
        self.folders.iter().find_map(|folder| {
            folder.tree.path_of(url).map(|mut rest| {
                rest.insert(0, folder.name.clone());
                rest
            })
        })
    }

    /// All feed URLs, depth first.
    pub fn urls(&self) -> Vec<String> {
        self.entries().into_iter().map(|(_, url)| url).collect()
    }

    /// `(folder path, url)` pairs, depth first, folders before loose feeds.
    pub fn entries(&self) -> Vec<(Vec<String>, String)> {
        let mut out = Vec::new();
        self.collect(&mut Vec::new(), &mut out);
        out
    }

    fn collect(&self, prefix: &mut Vec<String>, out: &mut Vec<(Vec<String>, String)>) {
        for folder in &self.folders {
            prefix.push(folder.name.clone());
            folder.tree.collect(prefix, out);
            prefix.pop();
        }
        for url in &self.feeds {
            out.push((prefix.clone(), url.clone()));
        }
    }

    /// Create an empty folder. Fails if a sibling with that name exists.
    pub fn add_folder(&mut self, parent: &[String], name: &str) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(EstuaryError::Other("Folder name must not be empty".into()));
        }
        let target = self.folder_mut(parent);
        if target.folders.iter().any(|f| f.name == name) {
            return Err(EstuaryError::Other(format!(
                "Folder already exists: {}",
                name
            )));
        }
        target.folders.push(Folder {
            name: name.to_string(),
            tree: FeedTree::default(),
        });
        Ok(())
    }

    /// Remove a folder; its feeds and subfolders move up into the parent.
    pub fn remove_folder(&mut self, path: &[String]) -> Result<()> {
        let (name, parent) = path
            .split_last()
            .ok_or_else(|| EstuaryError::Other("Cannot remove the root folder".into()))?;
        let parent_tree = self
            .find_mut(parent)
            .ok_or_else(|| EstuaryError::NotFound(format!("folder {}", parent.join("/"))))?;
        let pos = parent_tree
            .folders
            .iter()
            .position(|f| &f.name == name)
            .ok_or_else(|| EstuaryError::NotFound(format!("folder {}", path.join("/"))))?;
        let removed = parent_tree.folders.remove(pos);
        parent_tree.feeds.extend(removed.tree.feeds);
        for child in removed.tree.folders {
            match parent_tree.folders.iter_mut().find(|f| f.name == child.name) {
                Some(existing) => existing.tree.merge(child.tree),
                None => parent_tree.folders.push(child),
            }
        }
        Ok(())
    }

    /// Move a feed to another folder.
    pub fn move_feed(&mut self, url: &str, path: &[String]) -> Result<()> {
        if !self.remove(url) {
            return Err(EstuaryError::NotFound(url.to_string()));
        }
        self.folder_mut(path).feeds.push(url.to_string());
        Ok(())
    }

    /// Keep only feeds for which `keep` returns true.
    pub fn retain(&mut self, keep: &dyn Fn(&str) -> bool) {
        self.feeds.retain(|url| keep(url));
        for folder in &mut self.folders {
            folder.tree.retain(keep);
        }
    }

    fn merge(&mut self, other: FeedTree) {
        for url in other.feeds {
            if !self.contains(&url) {
                self.feeds.push(url);
            }
        }
        for child in other.folders {
            match self.folders.iter_mut().find(|f| f.name == child.name) {
                Some(existing) => existing.tree.merge(child.tree),
                None => self.folders.push(child),
            }
        }
    }

    fn find_mut(&mut self, path: &[String]) -> Option<&mut FeedTree> {
        let mut node = self;
        for name in path {
            node = &mut node.folders.iter_mut().find(|f| &f.name == name)?.tree;
        }
        Some(node)
    }

    fn folder_mut(&mut self, path: &[String]) -> &mut FeedTree {
        let mut node = self;
        for name in path {
            let pos = match node.folders.iter().position(|f| &f.name == name) {
                Some(pos) => pos,
                None => {
                    node.folders.push(Folder {
                        name: name.clone(),
                        tree: FeedTree::default(),
                    });
                    node.folders.len() - 1
                }
            };
            node = &mut node.folders[pos].tree;
        }
        node
    }
}
