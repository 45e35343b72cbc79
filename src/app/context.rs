use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::join_all;

use crate::app::error::{EstuaryError, Result};
use crate::collection::refresh::RefreshGuard;
use crate::collection::{Collection, RefreshReport};
use crate::config::Config;

/// Per-account outcome of [`AppContext::refresh_all`].
pub type AccountRefresh = (String, Result<Option<RefreshReport>>);

/// Every configured account, opened and ready.
pub struct AppContext {
    config: Mutex<Config>,
    config_path: PathBuf,
    collections: Vec<Arc<Collection>>,
    refreshing: RefreshGuard,
}

impl AppContext {
    /// Open and initialise one collection per configured account.
    pub async fn open(config: Config, config_path: PathBuf) -> Result<Self> {
        let root = config.storage_root()?;

        let mut collections = Vec::with_capacity(config.accounts.len());
        for account in &config.accounts {
            let collection = Collection::open(account.clone(), &root, &config.fetch)?;
            collection.init().await?;
            collections.push(Arc::new(collection));
        }

        Ok(Self::with_collections(config, config_path, collections))
    }

    pub fn with_collections(
        config: Config,
        config_path: PathBuf,
        collections: Vec<Arc<Collection>>,
    ) -> Self {
        Self {
            config: Mutex::new(config),
            config_path,
            collections,
            refreshing: RefreshGuard::new(),
        }
    }

    fn lock_config(&self) -> MutexGuard<'_, Config> {
        self.config.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn config(&self) -> Config {
        self.lock_config().clone()
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn collections(&self) -> &[Arc<Collection>] {
        &self.collections
    }

    pub fn collection(&self, key: &str) -> Result<&Arc<Collection>> {
        self.collections
            .iter()
            .find(|c| c.account().key == key)
            .ok_or_else(|| EstuaryError::NotFound(format!("account {}", key)))
    }

    /// Refresh all accounts concurrently.
    ///
    /// Returns `None` when an app-wide refresh is already running.
    pub async fn refresh_all(&self, force: bool) -> Result<Option<Vec<AccountRefresh>>> {
        let Some(_ticket) = self.refreshing.try_begin() else {
            tracing::info!("Refresh already running");
            return Ok(None);
        };

        let results = join_all(self.collections.iter().map(|collection| async move {
            let key = collection.account().key.clone();
            (key, collection.refresh(force).await)
        }))
        .await;

        let retention = self.lock_config().retention.clone();
        if retention.auto_clean {
            for collection in &self.collections {
                if let Err(e) = collection.clean_all_old_articles(retention.max_age()) {
                    tracing::warn!(
                        "Cleaning account {} failed: {}",
                        collection.account().key,
                        e
                    );
                }
            }
        }

        self.save_rotated_credentials()?;
        Ok(Some(results))
    }

    /// Write back credentials a backend renewed during this session.
    pub fn save_rotated_credentials(&self) -> Result<bool> {
        let mut config = self.lock_config();
        let mut changed = false;

        for collection in &self.collections {
            let Some(updated) = collection.updated_account() else {
                continue;
            };
            if let Some(account) = config.accounts.iter_mut().find(|a| a.key == updated.key) {
                if *account != updated {
                    *account = updated;
                    changed = true;
                }
            }
        }

        if changed {
            config.save(&self.config_path)?;
            tracing::info!("Saved renewed credentials to {}", self.config_path.display());
        }
        Ok(changed)
    }

    /// Drop an account: its cache, its directory and its config entry.
    pub fn remove_account(&mut self, key: &str) -> Result<()> {
        let collection = self.collection(key)?.clone();
        collection.clean()?;

        let mut config = self.lock_config();
        let dir = config.storage_root()?.join(key);
        if dir.exists() {
            std::fs::remove_dir_all(&dir)?;
        }
        config.accounts.retain(|a| a.key != key);
        config.save(&self.config_path)?;
        drop(config);

        self.collections.retain(|c| c.account().key != key);
        tracing::info!("Removed account {}", key);
        Ok(())
    }
}
