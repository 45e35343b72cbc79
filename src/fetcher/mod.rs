pub mod http_fetcher;
pub mod inoreader;
pub mod local;
pub mod parallel;
pub mod session;
pub mod transport;
pub mod ttrss;

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;

use crate::app::Result;
use crate::collection::dirty::ArticleMutation;
use crate::config::FetchConfig;
use crate::domain::{Abstract, Account, ArticleState, Backend, BackendKind, Summary, Validator};

use self::http_fetcher::{build_client, HttpFetcher};
use self::inoreader::InoreaderFetch;
use self::local::LocalFetch;
use self::transport::HttpTransport;
use self::ttrss::TtrssFetch;

#[derive(Debug)]
pub enum FetchResult {
    /// New content fetched successfully
    Content {
        body: Vec<u8>,
        etag: Option<String>,
        last_modified: Option<String>,
    },
    /// Content not modified (HTTP 304)
    NotModified,
}

/// Conditional HTTP GET of a feed document.
#[async_trait]
pub trait Fetcher {
    async fn fetch(
        &self,
        url: &str,
        etag: Option<&str>,
        last_modified: Option<&str>,
    ) -> Result<FetchResult>;
}

/// What a strategy needs to know about a feed it already tracks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedSource {
    pub url: String,
    pub remote_id: Option<String>,
    pub validator: Validator,
}

impl FeedSource {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            remote_id: None,
            validator: Validator::None,
        }
    }
}

impl From<&Summary> for FeedSource {
    fn from(summary: &Summary) -> Self {
        Self {
            url: summary.url.clone(),
            remote_id: summary.remote_id.clone(),
            validator: summary.validator.clone(),
        }
    }
}

/// An article as reported by a backend.
#[derive(Debug, Clone)]
pub struct FetchedArticle {
    pub article: Abstract,
    pub content: Option<String>,
    /// Read/starred state held by the remote service, if it tracks one.
    pub upstream: Option<ArticleState>,
}

/// Upstream read/starred membership covering a whole feed or account.
///
/// Only built from complete listings: a cached id missing from `unread` is
/// read upstream, one missing from `starred` is not starred.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpstreamStates {
    pub unread: HashSet<String>,
    pub starred: HashSet<String>,
}

impl UpstreamStates {
    pub fn state_of(&self, id: &str) -> ArticleState {
        ArticleState {
            read: !self.unread.contains(id),
            favorite: self.starred.contains(id),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchedFeed {
    pub url: String,
    pub title: Option<String>,
    pub link: Option<String>,
    pub remote_id: Option<String>,
    pub validator: Validator,
    pub articles: Vec<FetchedArticle>,
    /// True when `articles` is the whole upstream document rather than a delta.
    pub complete: bool,
    /// Current upstream state of already cached articles, for incremental syncs.
    pub states: Option<Arc<UpstreamStates>>,
}

impl FetchedFeed {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            title: None,
            link: None,
            remote_id: None,
            validator: Validator::None,
            articles: Vec::new(),
            complete: false,
            states: None,
        }
    }
}

#[derive(Debug)]
pub enum FeedFetch {
    NotModified,
    Updated(FetchedFeed),
}

/// A subscription as listed by a remote service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFeed {
    pub url: String,
    pub title: Option<String>,
    pub link: Option<String>,
    pub remote_id: Option<String>,
    pub folder: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SyncRequest {
    pub feeds: Vec<FeedSource>,
    /// Account-wide cursor from the previous sync.
    pub cursor: Option<String>,
    pub force: bool,
}

/// Aggregate result of a whole-account fetch.
#[derive(Debug, Default)]
pub struct FetchBatch {
    /// One entry per attempted feed; failures never abort siblings.
    pub results: Vec<(String, Result<FeedFetch>)>,
    /// Authoritative subscription list, for backends that keep one.
    pub subscriptions: Option<Vec<RemoteFeed>>,
    pub cursor: Option<String>,
}

/// Backend-specific way of fetching feeds and mirroring state changes.
#[async_trait]
pub trait FetchStrategy: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Establish a session up front. Local feeds need none.
    async fn authenticate(&self) -> Result<()> {
        Ok(())
    }

    async fn fetch_one(&self, feed: &FeedSource, force: bool) -> Result<FeedFetch>;

    /// Errors here are account-level; per-feed failures go in the batch.
    async fn fetch_all(&self, request: SyncRequest) -> Result<FetchBatch>;

    /// Validate (and subscribe, for remote services) a new feed.
    async fn add_feed(&self, url: &str) -> Result<FetchedFeed>;

    async fn del_feed(&self, feed: &FeedSource) -> Result<()>;

    async fn push_mutation(&self, mutation: &ArticleMutation) -> Result<()>;

    /// Fetch a body that was not delivered with the listing.
    async fn fetch_content(&self, _article: &Abstract) -> Result<Option<String>> {
        Ok(None)
    }

    /// Credentials rotated during this session, to be written back to config.
    fn updated_backend(&self) -> Option<Backend> {
        None
    }
}

/// Pick the strategy matching an account's backend.
pub fn build_strategy(account: &Account, config: &FetchConfig) -> Result<Arc<dyn FetchStrategy>> {
    let client = build_client(config)?;

    let strategy: Arc<dyn FetchStrategy> = match &account.backend {
        Backend::Local => {
            let fetcher = Arc::new(HttpFetcher::with_client(client));
            Arc::new(LocalFetch::new(fetcher, config.parallelism))
        }
        Backend::Ttrss {
            server,
            username,
            password,
        } => Arc::new(TtrssFetch::new(
            server,
            username,
            password,
            Arc::new(HttpTransport::new(client)),
            config,
        )),
        Backend::Inoreader {
            server,
            app_id,
            app_key,
            refresh_token,
            access_token,
        } => Arc::new(InoreaderFetch::new(
            inoreader::InoreaderCredentials {
                server: server.clone(),
                app_id: app_id.clone(),
                app_key: app_key.clone(),
                refresh_token: refresh_token.clone(),
                access_token: access_token.clone(),
            },
            Arc::new(HttpTransport::new(client)),
            config,
        )),
    };

    Ok(strategy)
}
