//! Inoreader backend (Google Reader compatible API, OAuth2 bearer tokens).

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde::Deserialize;

use crate::app::{EstuaryError, Result};
use crate::collection::dirty::ArticleMutation;
use crate::config::FetchConfig;
use crate::domain::{Abstract, ArticleState, Backend, BackendKind, Validator};
use crate::fetcher::session::{Authenticator, Session};
use crate::fetcher::transport::{ApiRequest, ApiResponse, Transport};
use crate::fetcher::{
    FeedFetch, FeedSource, FetchBatch, FetchStrategy, FetchedArticle, FetchedFeed, RemoteFeed,
    SyncRequest, UpstreamStates,
};

const READING_LIST: &str = "user/-/state/com.google/reading-list";
const TAG_READ: &str = "user/-/state/com.google/read";
const TAG_STARRED: &str = "user/-/state/com.google/starred";

#[derive(Debug, Clone)]
pub struct InoreaderCredentials {
    pub server: String,
    pub app_id: String,
    pub app_key: String,
    pub refresh_token: String,
    pub access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SubscriptionList {
    subscriptions: Vec<Subscription>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Subscription {
    id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    html_url: Option<String>,
    #[serde(default)]
    categories: Vec<Label>,
}

#[derive(Debug, Deserialize)]
struct Label {
    #[serde(default)]
    label: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamContents {
    #[serde(default)]
    updated: Option<i64>,
    #[serde(default)]
    continuation: Option<String>,
    #[serde(default)]
    items: Vec<Item>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Item {
    id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    published: Option<i64>,
    #[serde(default)]
    canonical: Vec<Href>,
    #[serde(default)]
    alternate: Vec<Href>,
    #[serde(default)]
    summary: Option<ItemContent>,
    #[serde(default)]
    categories: Vec<String>,
    #[serde(default)]
    origin: Option<Origin>,
}

#[derive(Debug, Deserialize)]
struct Href {
    href: String,
}

#[derive(Debug, Deserialize)]
struct ItemContent {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Origin {
    stream_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ItemIds {
    #[serde(default)]
    item_refs: Vec<ItemRef>,
    #[serde(default)]
    continuation: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ItemRef {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuickAdd {
    #[serde(default)]
    num_results: i64,
    #[serde(default)]
    stream_id: Option<String>,
    #[serde(default)]
    stream_name: Option<String>,
}

fn feed_url_of(stream_id: &str) -> &str {
    stream_id.strip_prefix("feed/").unwrap_or(stream_id)
}

/// `stream/items/ids` answers with decimal ids; stream contents use the long form.
fn long_item_id(short: &str) -> Option<String> {
    short
        .parse::<i64>()
        .ok()
        .map(|n| format!("tag:google.com,2005:reader/item/{:016x}", n))
}

fn encode_segment(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

struct Tokens {
    refresh_token: String,
    access_token: Option<String>,
    rotated: bool,
}

/// Refresh-token grant against `/oauth2/token`.
struct OAuth {
    server: String,
    app_id: String,
    app_key: String,
    tokens: Mutex<Tokens>,
    transport: Arc<dyn Transport>,
}

impl OAuth {
    fn tokens(&self) -> std::sync::MutexGuard<'_, Tokens> {
        self.tokens.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Authenticator for OAuth {
    async fn authenticate(&self) -> Result<String> {
        let refresh_token = self.tokens().refresh_token.clone();
        tracing::info!("Requesting Inoreader access token from {}", self.server);

        let request = ApiRequest::post(format!("{}/oauth2/token", self.server))
            .form("client_id", &self.app_id)
            .form("client_secret", &self.app_key)
            .form("grant_type", "refresh_token")
            .form("refresh_token", &refresh_token);
        let token: TokenResponse = self.transport.execute(request).await?.check()?.json()?;

        let mut tokens = self.tokens();
        if let Some(rotated) = token.refresh_token {
            if rotated != tokens.refresh_token {
                tracing::debug!("Inoreader rotated the refresh token");
                tokens.refresh_token = rotated;
            }
        }
        tokens.access_token = Some(token.access_token.clone());
        tokens.rotated = true;
        Ok(token.access_token)
    }
}

pub struct InoreaderFetch {
    auth: OAuth,
    session: Session,
    page_size: usize,
    max_items: usize,
}

impl InoreaderFetch {
    pub fn new(
        credentials: InoreaderCredentials,
        transport: Arc<dyn Transport>,
        config: &FetchConfig,
    ) -> Self {
        let session = match &credentials.access_token {
            Some(token) => Session::with_token(token.clone()),
            None => Session::new(),
        };

        Self {
            auth: OAuth {
                server: credentials.server.trim_end_matches('/').to_string(),
                app_id: credentials.app_id,
                app_key: credentials.app_key,
                tokens: Mutex::new(Tokens {
                    refresh_token: credentials.refresh_token,
                    access_token: credentials.access_token,
                    rotated: false,
                }),
                transport,
            },
            session,
            page_size: config.page_size.max(1),
            max_items: config.max_items.max(1),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/reader/api/0/{}", self.auth.server, path)
    }

    /// Authenticated call; `build` is re-run if the token had to be renewed.
    async fn call<F>(&self, build: F) -> Result<ApiResponse>
    where
        F: Fn() -> ApiRequest,
    {
        self.session
            .call(&self.auth, |token| {
                let request = build()
                    .header("Authorization", format!("Bearer {}", token))
                    .header("AppId", &self.auth.app_id)
                    .header("AppKey", &self.auth.app_key);
                let transport = self.auth.transport.clone();
                async move { transport.execute(request).await?.check() }
            })
            .await
    }

    async fn list_subscriptions(&self) -> Result<Vec<RemoteFeed>> {
        let list: SubscriptionList = self
            .call(|| ApiRequest::get(self.endpoint("subscription/list")))
            .await?
            .json()?;

        Ok(list
            .subscriptions
            .into_iter()
            .map(|sub| RemoteFeed {
                url: sub
                    .url
                    .unwrap_or_else(|| feed_url_of(&sub.id).to_string()),
                title: sub.title,
                link: sub.html_url,
                folder: sub
                    .categories
                    .into_iter()
                    .find_map(|c| c.label)
                    .into_iter()
                    .collect(),
                remote_id: Some(sub.id),
            })
            .collect())
    }

    /// Follow continuations until exhausted or `max_items` is reached.
    /// Returns the items and the server's `updated` stamp.
    async fn read_stream(&self, stream_id: &str, since: Option<&str>) -> Result<(Vec<Item>, Option<i64>)> {
        let path = format!("stream/contents/{}", encode_segment(stream_id));
        let mut items: Vec<Item> = Vec::new();
        let mut updated = None;
        let mut continuation: Option<String> = None;

        loop {
            let page: StreamContents = self
                .call(|| {
                    let mut request = ApiRequest::get(self.endpoint(&path)).query("n", self.page_size);
                    if let Some(c) = &continuation {
                        request = request.query("c", c);
                    }
                    if let Some(ot) = since {
                        request = request.query("ot", ot);
                    }
                    request
                })
                .await?
                .json()?;

            if updated.is_none() {
                updated = page.updated;
            }
            items.extend(page.items);

            match page.continuation {
                Some(next) if !next.is_empty() && items.len() < self.max_items => {
                    continuation = Some(next);
                }
                _ => break,
            }
        }

        if items.len() > self.max_items {
            tracing::warn!(
                "Stream {} exceeded {} items, truncating",
                stream_id,
                self.max_items
            );
            items.truncate(self.max_items);
        }
        Ok((items, updated))
    }

    /// Every item id matching `params`, or `None` if the listing hit `max_items`.
    async fn item_ids(&self, params: &[(&str, &str)]) -> Result<Option<HashSet<String>>> {
        let mut ids = HashSet::new();
        let mut listed = 0;
        let mut continuation: Option<String> = None;

        loop {
            let page: ItemIds = self
                .call(|| {
                    let request = params.iter().fold(
                        ApiRequest::get(self.endpoint("stream/items/ids")).query("n", self.page_size),
                        |request, (key, value)| request.query(key, value),
                    );
                    match &continuation {
                        Some(c) => request.query("c", c),
                        None => request,
                    }
                })
                .await?
                .json()?;

            listed += page.item_refs.len();
            ids.extend(page.item_refs.iter().filter_map(|r| long_item_id(&r.id)));

            match page.continuation {
                Some(next) if !next.is_empty() => {
                    if listed >= self.max_items {
                        tracing::debug!(
                            "Over {} ids for {:?}, skipping state sync",
                            self.max_items,
                            params
                        );
                        return Ok(None);
                    }
                    continuation = Some(next);
                }
                _ => return Ok(Some(ids)),
            }
        }
    }

    /// Unread and starred membership of `stream_id`, the reading list meaning the whole account.
    async fn fetch_states(&self, stream_id: &str) -> Result<Option<UpstreamStates>> {
        let Some(unread) = self.item_ids(&[("s", stream_id), ("xt", TAG_READ)]).await? else {
            return Ok(None);
        };
        let starred_params = if stream_id == READING_LIST {
            vec![("s", TAG_STARRED)]
        } else {
            vec![("s", stream_id), ("it", TAG_STARRED)]
        };
        let Some(starred) = self.item_ids(&starred_params).await? else {
            return Ok(None);
        };
        Ok(Some(UpstreamStates { unread, starred }))
    }

    fn to_article(feed_url: &str, item: Item) -> FetchedArticle {
        let read = item.categories.iter().any(|c| c.ends_with("/state/com.google/read"));
        let favorite = item
            .categories
            .iter()
            .any(|c| c.ends_with("/state/com.google/starred"));

        let mut article = Abstract::new(item.id, feed_url);
        article.title = item.title;
        article.link = item
            .canonical
            .into_iter()
            .chain(item.alternate)
            .map(|h| h.href)
            .next();
        article.published_at = item.published.and_then(|ts| Utc.timestamp_opt(ts, 0).single());
        article.read = read;
        article.favorite = favorite;

        FetchedArticle {
            article,
            content: item.summary.and_then(|s| s.content),
            upstream: Some(ArticleState { read, favorite }),
        }
    }

    fn cursor_from(updated: Option<i64>) -> String {
        updated.unwrap_or_else(|| Utc::now().timestamp()).to_string()
    }
}

#[async_trait]
impl FetchStrategy for InoreaderFetch {
    fn kind(&self) -> BackendKind {
        BackendKind::Inoreader
    }

    async fn authenticate(&self) -> Result<()> {
        self.session.token(&self.auth).await.map(|_| ())
    }

    async fn fetch_one(&self, feed: &FeedSource, force: bool) -> Result<FeedFetch> {
        let stream_id = feed
            .remote_id
            .clone()
            .unwrap_or_else(|| format!("feed/{}", feed.url));
        let since = if force { None } else { feed.validator.cursor() };

        let (items, updated) = self.read_stream(&stream_id, since).await?;
        // `ot` hides older items whose read or starred state moved since.
        let states = match since {
            Some(_) => self.fetch_states(&stream_id).await?,
            None => None,
        };
        if items.is_empty() && states.is_none() {
            return Ok(FeedFetch::NotModified);
        }

        let mut fetched = FetchedFeed::new(&feed.url);
        fetched.remote_id = Some(stream_id);
        fetched.validator = if items.is_empty() {
            feed.validator.clone()
        } else {
            Validator::Cursor {
                value: Self::cursor_from(updated),
            }
        };
        fetched.articles = items
            .into_iter()
            .map(|item| Self::to_article(&feed.url, item))
            .collect();
        fetched.states = states.map(Arc::new);
        Ok(FeedFetch::Updated(fetched))
    }

    /// One pass over the reading list, split by originating feed.
    async fn fetch_all(&self, request: SyncRequest) -> Result<FetchBatch> {
        let subscriptions = self.list_subscriptions().await?;
        let since = if request.force {
            None
        } else {
            request.cursor.as_deref()
        };
        let (items, updated) = self.read_stream(READING_LIST, since).await?;
        let cursor = Self::cursor_from(updated);
        let states = match since {
            Some(_) => self.fetch_states(READING_LIST).await?.map(Arc::new),
            None => None,
        };
        let known: HashMap<&str, &Validator> = request
            .feeds
            .iter()
            .map(|f| (f.url.as_str(), &f.validator))
            .collect();

        let mut grouped: HashMap<String, Vec<FetchedArticle>> = HashMap::new();
        for item in items {
            let Some(origin) = item.origin.as_ref().map(|o| feed_url_of(&o.stream_id).to_string())
            else {
                tracing::debug!("Item {} has no origin stream, skipping", item.id);
                continue;
            };
            let article = Self::to_article(&origin, item);
            grouped.entry(origin).or_default().push(article);
        }

        let results = subscriptions
            .iter()
            .map(|sub| {
                let articles = grouped.remove(&sub.url);
                if articles.is_none() && states.is_none() {
                    return (sub.url.clone(), Ok(FeedFetch::NotModified));
                }

                let mut fetched = FetchedFeed::new(&sub.url);
                fetched.title = sub.title.clone();
                fetched.link = sub.link.clone();
                fetched.remote_id = sub.remote_id.clone();
                fetched.validator = match articles {
                    Some(_) => Validator::Cursor {
                        value: cursor.clone(),
                    },
                    None => known
                        .get(sub.url.as_str())
                        .map(|v| (*v).clone())
                        .unwrap_or(Validator::None),
                };
                fetched.articles = articles.unwrap_or_default();
                fetched.states = states.clone();
                (sub.url.clone(), Ok(FeedFetch::Updated(fetched)))
            })
            .collect();

        for url in grouped.keys() {
            tracing::debug!("Items for unsubscribed feed {} ignored", url);
        }

        Ok(FetchBatch {
            results,
            subscriptions: Some(subscriptions),
            cursor: Some(cursor),
        })
    }

    async fn add_feed(&self, url: &str) -> Result<FetchedFeed> {
        let added: QuickAdd = self
            .call(|| ApiRequest::post(self.endpoint("subscription/quickadd")).query("quickadd", url))
            .await?
            .json()?;

        let stream_id = match added.stream_id {
            Some(id) if added.num_results > 0 => id,
            _ => return Err(EstuaryError::invalid_feed(url, "no feed found at this address")),
        };
        let canonical = feed_url_of(&stream_id).to_string();
        let source = FeedSource {
            url: canonical.clone(),
            remote_id: Some(stream_id.clone()),
            validator: Validator::None,
        };

        let mut fetched = match self.fetch_one(&source, true).await? {
            FeedFetch::Updated(fetched) => fetched,
            FeedFetch::NotModified => {
                let mut empty = FetchedFeed::new(&canonical);
                empty.remote_id = Some(stream_id);
                empty
            }
        };
        fetched.title = added.stream_name;
        Ok(fetched)
    }

    async fn del_feed(&self, feed: &FeedSource) -> Result<()> {
        let stream_id = feed
            .remote_id
            .clone()
            .unwrap_or_else(|| format!("feed/{}", feed.url));
        self.call(|| {
            ApiRequest::post(self.endpoint("subscription/edit"))
                .form("ac", "unsubscribe")
                .form("s", &stream_id)
        })
        .await?;
        Ok(())
    }

    async fn push_mutation(&self, mutation: &ArticleMutation) -> Result<()> {
        let mut tags = Vec::new();
        if let Some(read) = mutation.read {
            tags.push((if read { "a" } else { "r" }, TAG_READ));
        }
        if let Some(favorite) = mutation.favorite {
            tags.push((if favorite { "a" } else { "r" }, TAG_STARRED));
        }
        if tags.is_empty() {
            return Ok(());
        }

        self.call(|| {
            tags.iter().fold(
                ApiRequest::post(self.endpoint("edit-tag")).form("i", &mutation.id),
                |request, (op, tag)| request.form(op, tag),
            )
        })
        .await?;
        Ok(())
    }

    fn updated_backend(&self) -> Option<Backend> {
        let tokens = self.auth.tokens();
        if !tokens.rotated {
            return None;
        }
        Some(Backend::Inoreader {
            server: self.auth.server.clone(),
            app_id: self.auth.app_id.clone(),
            app_key: self.auth.app_key.clone(),
            refresh_token: tokens.refresh_token.clone(),
            access_token: tokens.access_token.clone(),
        })
    }
}
