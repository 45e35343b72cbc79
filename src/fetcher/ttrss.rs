//! Tiny Tiny RSS backend (JSON API at `<server>/api/`).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::app::{EstuaryError, Result};
use crate::collection::dirty::ArticleMutation;
use crate::config::FetchConfig;
use crate::domain::{Abstract, ArticleState, BackendKind, Validator};
use crate::fetcher::session::{Authenticator, Session};
use crate::fetcher::transport::{ApiRequest, Transport};
use crate::fetcher::{
    FeedFetch, FeedSource, FetchBatch, FetchStrategy, FetchedArticle, FetchedFeed, RemoteFeed,
    SyncRequest, UpstreamStates,
};

// updateArticle field/mode codes
const FIELD_STARRED: i64 = 0;
const FIELD_UNREAD: i64 = 2;
// getFeeds pseudo-category: every real feed, no virtual ones
const CAT_ALL_FEEDS: i64 = -3;

#[derive(Debug, Deserialize)]
struct Envelope {
    status: i64,
    #[serde(default)]
    content: Value,
}

#[derive(Debug, Deserialize)]
struct Headline {
    id: Value,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    link: Option<String>,
    #[serde(default)]
    updated: Option<i64>,
    #[serde(default)]
    unread: bool,
    #[serde(default)]
    marked: bool,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TtrssFeed {
    id: Value,
    #[serde(default)]
    title: Option<String>,
    feed_url: String,
    #[serde(default)]
    cat_id: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct TtrssCategory {
    id: Value,
    title: String,
}

/// Older servers send numeric ids as strings.
fn json_id(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
}

fn api_url(server: &str) -> String {
    let base = server.trim_end_matches('/');
    if base.ends_with("/api") {
        format!("{}/", base)
    } else {
        format!("{}/api/", base)
    }
}

async fn post(transport: &dyn Transport, url: &str, body: Value) -> Result<Value> {
    let response = transport
        .execute(ApiRequest::post(url).json(body))
        .await?
        .check()?;
    let envelope: Envelope = response.json()?;

    if envelope.status != 0 {
        let error = envelope
            .content
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("UNKNOWN_ERROR");
        return Err(match error {
            "NOT_LOGGED_IN" | "LOGIN_ERROR" => EstuaryError::Auth(error.to_string()),
            _ => EstuaryError::Other(format!("TTRSS API error: {}", error)),
        });
    }

    Ok(envelope.content)
}

fn decode<T: serde::de::DeserializeOwned>(value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| EstuaryError::Parse(e.to_string()))
}

struct TtrssLogin {
    url: String,
    username: String,
    password: String,
    transport: Arc<dyn Transport>,
}

#[async_trait]
impl Authenticator for TtrssLogin {
    async fn authenticate(&self) -> Result<String> {
        tracing::info!("Logging in to {} as {}", self.url, self.username);
        let content = post(
            self.transport.as_ref(),
            &self.url,
            json!({"op": "login", "user": self.username, "password": self.password}),
        )
        .await?;

        content
            .get("session_id")
            .and_then(Value::as_str)
            .map(String::from)
            .ok_or_else(|| EstuaryError::Parse("login response without session_id".into()))
    }
}

pub struct TtrssFetch {
    login: TtrssLogin,
    session: Session,
    page_size: usize,
    max_items: usize,
    parallelism: usize,
}

impl TtrssFetch {
    pub fn new(
        server: &str,
        username: &str,
        password: &str,
        transport: Arc<dyn Transport>,
        config: &FetchConfig,
    ) -> Self {
        Self {
            login: TtrssLogin {
                url: api_url(server),
                username: username.to_string(),
                password: password.to_string(),
                transport,
            },
            session: Session::new(),
            page_size: config.page_size.max(1),
            max_items: config.max_items.max(1),
            parallelism: config.parallelism.max(1),
        }
    }

    /// Authenticated API call; `sid` and `op` are filled in here.
    async fn api(&self, op: &str, params: Value) -> Result<Value> {
        self.session
            .call(&self.login, |sid| {
                let mut body = params.clone();
                body["op"] = json!(op);
                body["sid"] = json!(sid);
                post(self.login.transport.as_ref(), &self.login.url, body)
            })
            .await
    }

    async fn list_feeds(&self) -> Result<Vec<RemoteFeed>> {
        let categories: Vec<TtrssCategory> = decode(
            self.api(
                "getCategories",
                json!({"unread_only": false, "enable_nested": false, "include_empty": true}),
            )
            .await?,
        )?;
        let names: HashMap<i64, String> = categories
            .into_iter()
            .filter_map(|c| json_id(&c.id).map(|id| (id, c.title)))
            .collect();

        let feeds: Vec<TtrssFeed> =
            decode(self.api("getFeeds", json!({"cat_id": CAT_ALL_FEEDS})).await?)?;

        Ok(feeds
            .into_iter()
            .filter_map(|feed| {
                let id = json_id(&feed.id)?;
                let folder = feed
                    .cat_id
                    .as_ref()
                    .and_then(json_id)
                    .filter(|cat| *cat > 0)
                    .and_then(|cat| names.get(&cat).cloned())
                    .into_iter()
                    .collect();
                Some(RemoteFeed {
                    url: feed.feed_url,
                    title: feed.title,
                    link: None,
                    remote_id: Some(id.to_string()),
                    folder,
                })
            })
            .collect())
    }

    async fn resolve_feed_id(&self, feed: &FeedSource) -> Result<i64> {
        if let Some(id) = feed.remote_id.as_deref().and_then(|s| s.parse().ok()) {
            return Ok(id);
        }
        self.list_feeds()
            .await?
            .into_iter()
            .find(|f| f.url == feed.url)
            .and_then(|f| f.remote_id)
            .and_then(|id| id.parse().ok())
            .ok_or_else(|| EstuaryError::NotFound(feed.url.clone()))
    }

    /// Page through headlines until a short page or the item ceiling.
    async fn fetch_headlines(&self, feed_id: i64, since_id: Option<i64>) -> Result<Vec<Headline>> {
        let mut headlines: Vec<Headline> = Vec::new();

        loop {
            let mut params = json!({
                "feed_id": feed_id,
                "limit": self.page_size,
                "skip": headlines.len(),
                "show_content": true,
                "view_mode": "all_articles",
            });
            if let Some(since_id) = since_id {
                params["since_id"] = json!(since_id);
            }

            let page: Vec<Headline> = decode(self.api("getHeadlines", params).await?)?;
            let count = page.len();
            headlines.extend(page);

            if count < self.page_size || headlines.len() >= self.max_items {
                break;
            }
        }

        if headlines.len() > self.max_items {
            tracing::warn!(
                "Feed {} exceeded {} items, truncating",
                feed_id,
                self.max_items
            );
            headlines.truncate(self.max_items);
        }
        Ok(headlines)
    }

    /// Ids listed under `view_mode`, or `None` if the listing hit `max_items`.
    async fn headline_ids(&self, feed_id: i64, view_mode: &str) -> Result<Option<HashSet<String>>> {
        let mut ids = HashSet::new();
        let mut skip = 0;

        loop {
            let params = json!({
                "feed_id": feed_id,
                "limit": self.page_size,
                "skip": skip,
                "show_content": false,
                "view_mode": view_mode,
            });
            let page: Vec<Headline> = decode(self.api("getHeadlines", params).await?)?;
            skip += page.len();
            ids.extend(page.iter().filter_map(|h| json_id(&h.id)).map(|id| id.to_string()));

            if page.len() < self.page_size {
                return Ok(Some(ids));
            }
            if skip >= self.max_items {
                tracing::debug!(
                    "Feed {} has over {} {} headlines, skipping state sync",
                    feed_id,
                    self.max_items,
                    view_mode
                );
                return Ok(None);
            }
        }
    }

    async fn fetch_states(&self, feed_id: i64) -> Result<Option<UpstreamStates>> {
        let Some(unread) = self.headline_ids(feed_id, "unread").await? else {
            return Ok(None);
        };
        let Some(starred) = self.headline_ids(feed_id, "marked").await? else {
            return Ok(None);
        };
        Ok(Some(UpstreamStates { unread, starred }))
    }

    fn to_article(feed_url: &str, headline: Headline) -> Option<FetchedArticle> {
        let id = json_id(&headline.id)?;
        let mut article = Abstract::new(id.to_string(), feed_url);
        article.title = headline.title;
        article.link = headline.link;
        article.published_at = headline
            .updated
            .and_then(|ts| Utc.timestamp_opt(ts, 0).single());
        article.read = !headline.unread;
        article.favorite = headline.marked;

        Some(FetchedArticle {
            upstream: Some(ArticleState {
                read: !headline.unread,
                favorite: headline.marked,
            }),
            article,
            content: headline.content,
        })
    }

    async fn update_article(&self, id: &str, field: i64, mode: i64) -> Result<()> {
        self.api(
            "updateArticle",
            json!({"article_ids": id, "field": field, "mode": mode}),
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl FetchStrategy for TtrssFetch {
    fn kind(&self) -> BackendKind {
        BackendKind::Ttrss
    }

    async fn authenticate(&self) -> Result<()> {
        self.session.token(&self.login).await.map(|_| ())
    }

    async fn fetch_one(&self, feed: &FeedSource, force: bool) -> Result<FeedFetch> {
        let feed_id = self.resolve_feed_id(feed).await?;
        let since_id = if force {
            None
        } else {
            feed.validator.cursor().and_then(|c| c.parse::<i64>().ok())
        };

        let headlines = self.fetch_headlines(feed_id, since_id).await?;
        // Headlines past the cursor say nothing about older ones read or starred since.
        let states = match since_id {
            Some(_) => self.fetch_states(feed_id).await?,
            None => None,
        };
        if headlines.is_empty() && states.is_none() {
            return Ok(FeedFetch::NotModified);
        }

        let articles: Vec<FetchedArticle> = headlines
            .into_iter()
            .filter_map(|h| Self::to_article(&feed.url, h))
            .collect();
        let newest = articles
            .iter()
            .filter_map(|a| a.article.id.parse::<i64>().ok())
            .chain(since_id)
            .max();

        let mut fetched = FetchedFeed::new(&feed.url);
        fetched.remote_id = Some(feed_id.to_string());
        fetched.validator = newest
            .map(|id| Validator::Cursor {
                value: id.to_string(),
            })
            .unwrap_or_else(|| feed.validator.clone());
        fetched.articles = articles;
        fetched.states = states.map(Arc::new);
        Ok(FeedFetch::Updated(fetched))
    }

    async fn fetch_all(&self, request: SyncRequest) -> Result<FetchBatch> {
        let subscriptions = self.list_feeds().await?;
        let mut known: HashMap<String, FeedSource> = request
            .feeds
            .into_iter()
            .map(|f| (f.url.clone(), f))
            .collect();
        let sources: Vec<FeedSource> = subscriptions
            .iter()
            .map(|remote| {
                let mut source = known
                    .remove(&remote.url)
                    .unwrap_or_else(|| FeedSource::new(&remote.url));
                source.remote_id = remote.remote_id.clone();
                source
            })
            .collect();
        let force = request.force;

        let results = stream::iter(sources)
            .map(|source| async move {
                let result = self.fetch_one(&source, force).await;
                (source.url, result)
            })
            .buffered(self.parallelism)
            .collect::<Vec<_>>()
            .await;

        Ok(FetchBatch {
            results,
            subscriptions: Some(subscriptions),
            cursor: None,
        })
    }

    async fn add_feed(&self, url: &str) -> Result<FetchedFeed> {
        let content = self
            .api("subscribeToFeed", json!({"feed_url": url, "category_id": 0}))
            .await?;
        let code = content
            .pointer("/status/code")
            .and_then(Value::as_i64)
            .unwrap_or(-1);
        // 0: already subscribed, 1: subscribed
        if code != 0 && code != 1 {
            let message = content
                .pointer("/status/message")
                .and_then(Value::as_str)
                .unwrap_or("subscription rejected")
                .to_string();
            return Err(EstuaryError::invalid_feed(
                url,
                format!("{} (code {})", message, code),
            ));
        }

        let remote = self
            .list_feeds()
            .await?
            .into_iter()
            .find(|f| f.url == url)
            .ok_or_else(|| EstuaryError::invalid_feed(url, "subscription not listed by server"))?;

        let source = FeedSource {
            url: url.to_string(),
            remote_id: remote.remote_id.clone(),
            validator: Validator::None,
        };
        let mut fetched = match self.fetch_one(&source, true).await? {
            FeedFetch::Updated(fetched) => fetched,
            FeedFetch::NotModified => {
                let mut empty = FetchedFeed::new(url);
                empty.remote_id = remote.remote_id.clone();
                empty
            }
        };
        fetched.title = remote.title;
        Ok(fetched)
    }

    async fn del_feed(&self, feed: &FeedSource) -> Result<()> {
        let feed_id = self.resolve_feed_id(feed).await?;
        self.api("unsubscribeFeed", json!({"feed_id": feed_id}))
            .await?;
        Ok(())
    }

    async fn push_mutation(&self, mutation: &ArticleMutation) -> Result<()> {
        if let Some(read) = mutation.read {
            self.update_article(&mutation.id, FIELD_UNREAD, if read { 0 } else { 1 })
                .await?;
        }
        if let Some(favorite) = mutation.favorite {
            self.update_article(&mutation.id, FIELD_STARRED, if favorite { 1 } else { 0 })
                .await?;
        }
        Ok(())
    }

    async fn fetch_content(&self, article: &Abstract) -> Result<Option<String>> {
        let content = self
            .api("getArticle", json!({"article_id": article.id}))
            .await?;
        Ok(content
            .get(0)
            .and_then(|a| a.get("content"))
            .and_then(Value::as_str)
            .map(String::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::transport::testing::ScriptedTransport;
    use crate::fetcher::transport::ApiResponse;

    const FEED_URL: &str = "https://blog.example.com/rss";

    fn ok(content: Value) -> ApiResponse {
        ApiResponse::ok(json!({"seq": 0, "status": 0, "content": content}).to_string())
    }

    fn not_logged_in() -> ApiResponse {
        ApiResponse::ok(
            json!({"seq": 0, "status": 1, "content": {"error": "NOT_LOGGED_IN"}}).to_string(),
        )
    }

    fn op(request: &crate::fetcher::transport::ApiRequest) -> String {
        request
            .json
            .as_ref()
            .and_then(|b| b.get("op"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    }

    fn headline(id: i64) -> Value {
        json!({"id": id, "title": format!("Post {}", id), "link": format!("https://blog.example.com/{}", id),
               "updated": 1_700_000_000 + id, "unread": id % 2 == 0, "marked": false, "feed_id": "7",
               "content": "<p>body</p>"})
    }

    fn config(page_size: usize, max_items: usize) -> FetchConfig {
        FetchConfig {
            page_size,
            max_items,
            ..FetchConfig::default()
        }
    }

    /// One page of headline ids `1..=total`, honouring `since_id` and `view_mode`.
    fn headlines_page(body: &Value, total: i64, is_unread: impl Fn(i64) -> bool) -> ApiResponse {
        let skip = body["skip"].as_i64().unwrap_or(0);
        let limit = body["limit"].as_i64().unwrap_or(0);
        let since = body["since_id"].as_i64().unwrap_or(0);
        let view_mode = body["view_mode"].as_str().unwrap_or("all_articles").to_string();
        let page: Vec<Value> = (1..=total)
            .filter(|id| *id > since)
            .filter(|id| match view_mode.as_str() {
                "unread" => is_unread(*id),
                "marked" => false,
                _ => true,
            })
            .skip(skip as usize)
            .take(limit as usize)
            .map(|id| {
                let mut h = headline(id);
                h["unread"] = json!(is_unread(id));
                h
            })
            .collect();
        ok(json!(page))
    }

    /// A healthy server with `total` headlines in feed 7; even ids are unread.
    fn server(total: i64) -> ScriptedTransport {
        ScriptedTransport::new(move |request| {
            let body = request.json.clone().unwrap_or_default();
            match op(request).as_str() {
                "login" => ok(json!({"session_id": "sid-1"})),
                "getCategories" => ok(json!([{"id": "3", "title": "Blogs"}])),
                "getFeeds" => ok(json!([{"id": 7, "title": "Blog", "feed_url": FEED_URL, "cat_id": 3}])),
                "getHeadlines" => headlines_page(&body, total, |id| id % 2 == 0),
                "updateArticle" => ok(json!({"status": "OK", "updated": 1})),
                "getArticle" => ok(json!([{"id": 1, "content": "<p>full</p>"}])),
                "subscribeToFeed" => {
                    if body["feed_url"] == FEED_URL {
                        ok(json!({"status": {"code": 1}}))
                    } else {
                        ok(json!({"status": {"code": 3, "message": "no feeds found"}}))
                    }
                }
                "unsubscribeFeed" => ok(json!({"status": "OK"})),
                other => panic!("unexpected op {}", other),
            }
        })
    }

    fn count_op(transport: &ScriptedTransport, name: &str) -> usize {
        transport.requests().iter().filter(|r| op(r) == name).count()
    }

    #[test]
    fn test_api_url() {
        assert_eq!(api_url("https://rss.example.com"), "https://rss.example.com/api/");
        assert_eq!(api_url("https://rss.example.com/tt-rss/"), "https://rss.example.com/tt-rss/api/");
        assert_eq!(api_url("https://rss.example.com/api"), "https://rss.example.com/api/");
    }

    #[tokio::test]
    async fn test_fetch_one_pages_through_headlines() {
        let transport = Arc::new(server(5));
        let ttrss = TtrssFetch::new("https://rss.example.com", "u", "p", transport.clone(), &config(2, 100));

        let mut source = FeedSource::new(FEED_URL);
        source.remote_id = Some("7".into());
        let fetched = match ttrss.fetch_one(&source, false).await.unwrap() {
            FeedFetch::Updated(f) => f,
            FeedFetch::NotModified => panic!("expected headlines"),
        };

        assert_eq!(fetched.articles.len(), 5);
        assert_eq!(count_op(&transport, "getHeadlines"), 3);
        assert_eq!(fetched.validator.cursor(), Some("5"));
        let second = fetched.articles.iter().find(|a| a.article.id == "2").unwrap();
        assert_eq!(second.upstream, Some(ArticleState { read: false, favorite: false }));
        assert_eq!(second.content.as_deref(), Some("<p>body</p>"));

        // Same cursor again: no new headlines, only the state of the cached ones.
        source.validator = fetched.validator;
        let again = match ttrss.fetch_one(&source, false).await.unwrap() {
            FeedFetch::Updated(f) => f,
            FeedFetch::NotModified => panic!("expected a state pass"),
        };
        assert!(again.articles.is_empty());
        assert_eq!(again.validator.cursor(), Some("5"));
        let states = again.states.unwrap();
        assert_eq!(states.unread, HashSet::from(["2".to_string(), "4".to_string()]));
        assert!(states.starred.is_empty());
    }

    #[tokio::test]
    async fn test_incremental_fetch_sees_upstream_read() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let read_upstream = Arc::new(AtomicBool::new(false));
        let flag = read_upstream.clone();
        let transport = Arc::new(ScriptedTransport::new(move |request| {
            let body = request.json.clone().unwrap_or_default();
            match op(request).as_str() {
                "login" => ok(json!({"session_id": "sid-1"})),
                "getHeadlines" => {
                    let read = flag.load(Ordering::SeqCst);
                    headlines_page(&body, 3, |id| !(id == 1 && read))
                }
                other => panic!("unexpected op {}", other),
            }
        }));
        let ttrss = TtrssFetch::new("https://rss.example.com", "u", "p", transport, &config(50, 100));

        let mut source = FeedSource::new(FEED_URL);
        source.remote_id = Some("7".into());
        source.validator = Validator::Cursor { value: "3".into() };

        let before = match ttrss.fetch_one(&source, false).await.unwrap() {
            FeedFetch::Updated(f) => f.states.unwrap(),
            FeedFetch::NotModified => panic!("expected a state pass"),
        };
        assert!(!before.state_of("1").read);

        read_upstream.store(true, Ordering::SeqCst);
        let after = match ttrss.fetch_one(&source, false).await.unwrap() {
            FeedFetch::Updated(f) => f.states.unwrap(),
            FeedFetch::NotModified => panic!("expected a state pass"),
        };
        assert!(after.state_of("1").read);
        assert!(!after.state_of("2").read);
    }

    #[tokio::test]
    async fn test_forced_fetch_skips_state_pass() {
        let transport = Arc::new(server(3));
        let ttrss = TtrssFetch::new("https://rss.example.com", "u", "p", transport.clone(), &config(50, 100));

        let mut source = FeedSource::new(FEED_URL);
        source.remote_id = Some("7".into());
        source.validator = Validator::Cursor { value: "3".into() };
        let fetched = match ttrss.fetch_one(&source, true).await.unwrap() {
            FeedFetch::Updated(f) => f,
            FeedFetch::NotModified => panic!("expected headlines"),
        };

        assert_eq!(fetched.articles.len(), 3);
        assert!(fetched.states.is_none());
        assert_eq!(count_op(&transport, "getHeadlines"), 1);
    }

    #[tokio::test]
    async fn test_truncated_state_listing_is_dropped() {
        let transport = Arc::new(server(40));
        let ttrss = TtrssFetch::new("https://rss.example.com", "u", "p", transport, &config(5, 10));

        let mut source = FeedSource::new(FEED_URL);
        source.remote_id = Some("7".into());
        source.validator = Validator::Cursor { value: "40".into() };
        assert!(matches!(
            ttrss.fetch_one(&source, false).await.unwrap(),
            FeedFetch::NotModified
        ));
    }

    #[tokio::test]
    async fn test_pagination_stops_at_max_items() {
        let transport = Arc::new(server(10_000));
        let ttrss = TtrssFetch::new("https://rss.example.com", "u", "p", transport.clone(), &config(10, 25));

        let mut source = FeedSource::new(FEED_URL);
        source.remote_id = Some("7".into());
        let fetched = match ttrss.fetch_one(&source, true).await.unwrap() {
            FeedFetch::Updated(f) => f,
            FeedFetch::NotModified => panic!("expected headlines"),
        };

        assert_eq!(fetched.articles.len(), 25);
        assert_eq!(count_op(&transport, "getHeadlines"), 3);
    }

    #[tokio::test]
    async fn test_fetch_all_reports_subscriptions_with_folders() {
        let transport = Arc::new(server(2));
        let ttrss = TtrssFetch::new("https://rss.example.com", "u", "p", transport, &config(50, 100));

        let batch = ttrss
            .fetch_all(SyncRequest {
                feeds: vec![],
                cursor: None,
                force: false,
            })
            .await
            .unwrap();

        let subs = batch.subscriptions.unwrap();
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].folder, vec!["Blogs".to_string()]);
        assert_eq!(subs[0].remote_id.as_deref(), Some("7"));
        assert_eq!(batch.results.len(), 1);
        assert!(batch.results[0].1.is_ok());
    }

    #[tokio::test]
    async fn test_push_mutation_maps_fields() {
        let transport = Arc::new(server(0));
        let ttrss = TtrssFetch::new("https://rss.example.com", "u", "p", transport.clone(), &config(50, 100));

        let mut mutation = ArticleMutation::new("42", FEED_URL);
        mutation.read = Some(true);
        mutation.favorite = Some(true);
        ttrss.push_mutation(&mutation).await.unwrap();

        let updates: Vec<Value> = transport
            .requests()
            .into_iter()
            .filter(|r| op(r) == "updateArticle")
            .filter_map(|r| r.json)
            .collect();
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0]["field"], json!(FIELD_UNREAD));
        assert_eq!(updates[0]["mode"], json!(0));
        assert_eq!(updates[1]["field"], json!(FIELD_STARRED));
        assert_eq!(updates[1]["mode"], json!(1));
        assert_eq!(updates[0]["sid"], json!("sid-1"));
    }

    #[tokio::test]
    async fn test_expired_session_reauthenticates_once() {
        let transport = Arc::new(ScriptedTransport::new(|request| match op(request).as_str() {
            "login" => ok(json!({"session_id": "sid"})),
            _ => not_logged_in(),
        }));
        let ttrss = TtrssFetch::new("https://rss.example.com", "u", "p", transport.clone(), &config(50, 100));
        ttrss.authenticate().await.unwrap();

        let mutation = ArticleMutation {
            read: Some(true),
            ..ArticleMutation::new("1", FEED_URL)
        };
        let result = ttrss.push_mutation(&mutation).await;

        assert!(matches!(result, Err(EstuaryError::Auth(_))));
        // initial login plus exactly one re-authentication
        assert_eq!(count_op(&transport, "login"), 2);
        assert_eq!(count_op(&transport, "updateArticle"), 2);
    }

    #[tokio::test]
    async fn test_add_feed_rejected() {
        let transport = Arc::new(server(0));
        let ttrss = TtrssFetch::new("https://rss.example.com", "u", "p", transport, &config(50, 100));

        let result = ttrss.add_feed("https://nothing.example.com/").await;
        assert!(matches!(result, Err(EstuaryError::InvalidFeed { .. })));
    }

    #[tokio::test]
    async fn test_add_feed_and_fetch_content() {
        let transport = Arc::new(server(3));
        let ttrss = TtrssFetch::new("https://rss.example.com", "u", "p", transport.clone(), &config(50, 100));

        let fetched = ttrss.add_feed(FEED_URL).await.unwrap();
        assert_eq!(fetched.title.as_deref(), Some("Blog"));
        assert_eq!(fetched.remote_id.as_deref(), Some("7"));
        assert_eq!(fetched.articles.len(), 3);

        let article = Abstract::new("1".into(), FEED_URL);
        assert_eq!(
            ttrss.fetch_content(&article).await.unwrap().as_deref(),
            Some("<p>full</p>")
        );

        ttrss.del_feed(&FeedSource::new(FEED_URL)).await.unwrap();
        assert_eq!(count_op(&transport, "unsubscribeFeed"), 1);
    }
}
