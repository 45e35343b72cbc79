use std::sync::Arc;

use async_trait::async_trait;
use url::Url;

use crate::app::{EstuaryError, Result};
use crate::collection::dirty::ArticleMutation;
use crate::domain::BackendKind;
use crate::fetcher::parallel::ParallelFetcher;
use crate::fetcher::{FeedFetch, FeedSource, FetchBatch, FetchStrategy, FetchedFeed, Fetcher, SyncRequest};

/// Polls feed URLs directly; all article state lives only in the local cache.
pub struct LocalFetch {
    parallel: ParallelFetcher,
}

impl LocalFetch {
    pub fn new(fetcher: Arc<dyn Fetcher + Send + Sync>, parallelism: usize) -> Self {
        Self {
            parallel: ParallelFetcher::with_workers(fetcher, parallelism),
        }
    }
}

#[async_trait]
impl FetchStrategy for LocalFetch {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    async fn fetch_one(&self, feed: &FeedSource, force: bool) -> Result<FeedFetch> {
        self.parallel.fetch_one(feed, force).await
    }

    async fn fetch_all(&self, request: SyncRequest) -> Result<FetchBatch> {
        let results = self.parallel.fetch_all(request.feeds, request.force).await;
        Ok(FetchBatch {
            results,
            subscriptions: None,
            cursor: None,
        })
    }

    async fn add_feed(&self, url: &str) -> Result<FetchedFeed> {
        let parsed = Url::parse(url).map_err(|e| EstuaryError::invalid_feed(url, e))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(EstuaryError::invalid_feed(url, "only http(s) feeds are supported"));
        }

        match self.parallel.fetch_one(&FeedSource::new(url), true).await {
            Ok(FeedFetch::Updated(fetched)) => Ok(fetched),
            Ok(FeedFetch::NotModified) => Err(EstuaryError::invalid_feed(
                url,
                "server answered 304 to an unconditional request",
            )),
            Err(e) => Err(EstuaryError::invalid_feed(url, e)),
        }
    }

    async fn del_feed(&self, _feed: &FeedSource) -> Result<()> {
        Ok(())
    }

    async fn push_mutation(&self, _mutation: &ArticleMutation) -> Result<()> {
        Ok(())
    }
}
