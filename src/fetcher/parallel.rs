use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::app::{EstuaryError, Result};
use crate::domain::Validator;
use crate::fetcher::{FeedFetch, FeedSource, FetchResult, Fetcher};
use crate::normalizer::Normalizer;

pub const DEFAULT_WORKERS: usize = 10;

/// Fetches many feed documents at once, at most `workers` in flight.
pub struct ParallelFetcher {
    fetcher: Arc<dyn Fetcher + Send + Sync>,
    normalizer: Normalizer,
    semaphore: Arc<Semaphore>,
}

impl ParallelFetcher {
    pub fn new(fetcher: Arc<dyn Fetcher + Send + Sync>) -> Self {
        Self::with_workers(fetcher, DEFAULT_WORKERS)
    }

    pub fn with_workers(fetcher: Arc<dyn Fetcher + Send + Sync>, workers: usize) -> Self {
        Self {
            fetcher,
            normalizer: Normalizer::new(),
            semaphore: Arc::new(Semaphore::new(workers.max(1))),
        }
    }

    pub async fn fetch_one(&self, feed: &FeedSource, force: bool) -> Result<FeedFetch> {
        fetch_single_feed(&self.fetcher, feed, force, &self.normalizer).await
    }

    /// Every feed gets exactly one entry in the result, in input order.
    pub async fn fetch_all(
        &self,
        feeds: Vec<FeedSource>,
        force: bool,
    ) -> Vec<(String, Result<FeedFetch>)> {
        let mut handles = Vec::new();

        for feed in feeds {
            let fetcher = self.fetcher.clone();
            let semaphore = self.semaphore.clone();
            let normalizer = self.normalizer.clone();
            let url = feed.url.clone();

            let handle = tokio::spawn(async move {
                let _permit = match semaphore.acquire().await {
                    Ok(permit) => permit,
                    Err(e) => return Err(EstuaryError::Other(e.to_string())),
                };

                fetch_single_feed(&fetcher, &feed, force, &normalizer).await
            });

            handles.push((url, handle));
        }

        let mut results = Vec::new();
        for (url, handle) in handles {
            match handle.await {
                Ok(result) => results.push((url, result)),
                Err(e) => {
                    tracing::error!("Task join error for {}: {}", url, e);
                    results.push((url, Err(EstuaryError::Other(e.to_string()))));
                }
            }
        }

        results
    }
}

async fn fetch_single_feed(
    fetcher: &Arc<dyn Fetcher + Send + Sync>,
    feed: &FeedSource,
    force: bool,
    normalizer: &Normalizer,
) -> Result<FeedFetch> {
    let (etag, last_modified) = if force {
        (None, None)
    } else {
        (feed.validator.etag(), feed.validator.last_modified())
    };

    let result = fetcher.fetch(&feed.url, etag, last_modified).await?;

    match result {
        FetchResult::NotModified => {
            tracing::debug!("Feed {} not modified", feed.url);
            Ok(FeedFetch::NotModified)
        }
        FetchResult::Content {
            body,
            etag,
            last_modified,
        } => {
            let mut fetched = normalizer.normalize(&feed.url, &body)?;
            fetched.validator = if etag.is_some() || last_modified.is_some() {
                Validator::Http {
                    etag,
                    last_modified,
                }
            } else {
                Validator::None
            };
            tracing::debug!(
                "Parsed {} entries from {}",
                fetched.articles.len(),
                feed.url
            );
            Ok(FeedFetch::Updated(fetched))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    const RSS: &str = r#"<?xml version="1.0"?><rss version="2.0"><channel><title>T</title>
<item><guid>1</guid><title>One</title></item></channel></rss>"#;

    /// Serves RSS for every URL, "<html>" for URLs containing "broken",
    /// and tracks peak concurrency.
    #[derive(Default)]
    struct CountingFetcher {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl Fetcher for CountingFetcher {
        async fn fetch(
            &self,
            url: &str,
            etag: Option<&str>,
            _last_modified: Option<&str>,
        ) -> Result<FetchResult> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if etag == Some("\"v1\"") {
                return Ok(FetchResult::NotModified);
            }
            let body = if url.contains("broken") { "<html>" } else { RSS };
            Ok(FetchResult::Content {
                body: body.as_bytes().to_vec(),
                etag: Some("\"v1\"".into()),
                last_modified: None,
            })
        }
    }

    fn sources(n: usize) -> Vec<FeedSource> {
        (0..n)
            .map(|i| FeedSource::new(&format!("https://example.com/{}.xml", i)))
            .collect()
    }

    #[tokio::test]
    async fn test_respects_worker_limit() {
        let fetcher = Arc::new(CountingFetcher::default());
        let parallel = ParallelFetcher::with_workers(fetcher.clone(), 2);

        let results = parallel.fetch_all(sources(6), false).await;

        assert_eq!(results.len(), 6);
        assert!(fetcher.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_failure_is_isolated() {
        let fetcher = Arc::new(CountingFetcher::default());
        let parallel = ParallelFetcher::with_workers(fetcher, 4);
        let mut feeds = sources(3);
        feeds.push(FeedSource::new("https://example.com/broken.xml"));

        let results = parallel.fetch_all(feeds, false).await;

        let failed: Vec<&String> = results
            .iter()
            .filter(|(_, r)| r.is_err())
            .map(|(url, _)| url)
            .collect();
        assert_eq!(failed, vec!["https://example.com/broken.xml"]);
        assert_eq!(results.iter().filter(|(_, r)| r.is_ok()).count(), 3);
    }

    #[tokio::test]
    async fn test_validator_round_trip_and_force() {
        let fetcher = Arc::new(CountingFetcher::default());
        let parallel = ParallelFetcher::new(fetcher);
        let mut feed = FeedSource::new("https://example.com/a.xml");

        let first = parallel.fetch_one(&feed, false).await.unwrap();
        let validator = match first {
            FeedFetch::Updated(f) => f.validator,
            FeedFetch::NotModified => panic!("expected content"),
        };
        assert_eq!(validator.etag(), Some("\"v1\""));

        feed.validator = validator;
        assert!(matches!(
            parallel.fetch_one(&feed, false).await.unwrap(),
            FeedFetch::NotModified
        ));
        assert!(matches!(
            parallel.fetch_one(&feed, true).await.unwrap(),
            FeedFetch::Updated(_)
        ));
    }
}
