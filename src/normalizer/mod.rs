use chrono::Utc;
use feed_rs::parser;
use html_escape::decode_html_entities;

use crate::app::{EstuaryError, Result};
use crate::domain::Abstract;
use crate::fetcher::{FetchedArticle, FetchedFeed};

/// Turns RSS/Atom/JSON Feed documents into the local article model.
#[derive(Clone)]
pub struct Normalizer;

impl Default for Normalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Normalizer {
    pub fn new() -> Self {
        Self
    }

    pub fn normalize(&self, feed_url: &str, body: &[u8]) -> Result<FetchedFeed> {
        let feed = parser::parse(body).map_err(|e| EstuaryError::Parse(e.to_string()))?;

        let mut fetched = FetchedFeed::new(feed_url);
        fetched.complete = true;
        fetched.title = feed
            .title
            .map(|t| decode_html_entities(&t.content).to_string());
        fetched.link = feed
            .links
            .iter()
            .find(|l| l.rel.as_deref() != Some("self"))
            .map(|l| l.href.clone());

        fetched.articles = feed
            .entries
            .into_iter()
            .map(|entry| {
                let link = entry.links.first().map(|l| l.href.clone());
                let entry_id_for_hash = if entry.id.is_empty() {
                    link.clone().unwrap_or_default()
                } else {
                    entry.id.clone()
                };

                let mut article =
                    Abstract::new(Abstract::generate_id(feed_url, &entry_id_for_hash), feed_url);
                article.title = entry
                    .title
                    .map(|t| decode_html_entities(&t.content).to_string());
                article.link = link;
                article.published_at = entry
                    .published
                    .or(entry.updated)
                    .map(|dt| dt.with_timezone(&Utc));

                let content = entry
                    .content
                    .and_then(|c| c.body)
                    .or_else(|| entry.summary.map(|s| s.content))
                    .map(|b| decode_html_entities(&b).to_string());

                FetchedArticle {
                    article,
                    content,
                    upstream: None,
                }
            })
            .collect();

        Ok(fetched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS_SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Test Feed</title>
    <link>https://example.com/</link>
    <description>A test feed</description>
    <item>
      <title>Test Item 1</title>
      <link>https://example.com/item1</link>
      <guid>item-1</guid>
      <pubDate>Mon, 01 Jan 2024 00:00:00 GMT</pubDate>
      <description>This is item 1</description>
    </item>
    <item>
      <title>Fish &amp;amp; Chips</title>
      <link>https://example.com/item2</link>
      <guid>item-2</guid>
    </item>
  </channel>
</rss>"#;

    const ATOM_SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Atom Test Feed</title>
  <link rel="self" href="https://example.com/feed.atom"/>
  <link href="https://example.com/"/>
  <entry>
    <title>Atom Entry 1</title>
    <link href="https://example.com/atom1"/>
    <id>atom-entry-1</id>
    <updated>2024-01-01T00:00:00Z</updated>
    <content type="html">&lt;p&gt;Body&lt;/p&gt;</content>
  </entry>
</feed>"#;

    #[test]
    fn test_parse_rss() {
        let normalizer = Normalizer::new();
        let feed = normalizer
            .normalize("https://example.com/feed.xml", RSS_SAMPLE.as_bytes())
            .unwrap();

        assert_eq!(feed.title, Some("Test Feed".into()));
        assert!(feed.complete);
        assert_eq!(feed.articles.len(), 2);
        let first = &feed.articles[0];
        assert_eq!(first.article.title, Some("Test Item 1".into()));
        assert_eq!(first.article.link, Some("https://example.com/item1".into()));
        assert_eq!(first.content, Some("This is item 1".into()));
        assert!(first.article.published_at.is_some());
        assert!(!first.article.read);
        assert!(first.upstream.is_none());
        assert_eq!(feed.articles[1].content, None);
    }

    #[test]
    fn test_parse_atom_skips_self_link() {
        let normalizer = Normalizer::new();
        let feed = normalizer
            .normalize("https://example.com/feed.atom", ATOM_SAMPLE.as_bytes())
            .unwrap();

        assert_eq!(feed.title, Some("Atom Test Feed".into()));
        assert_eq!(feed.link, Some("https://example.com/".into()));
        assert_eq!(feed.articles.len(), 1);
        assert_eq!(feed.articles[0].content, Some("<p>Body</p>".into()));
    }

    #[test]
    fn test_item_id_determinism() {
        let normalizer = Normalizer::new();
        let a = normalizer
            .normalize("https://example.com/feed.xml", RSS_SAMPLE.as_bytes())
            .unwrap();
        let b = normalizer
            .normalize("https://example.com/feed.xml", RSS_SAMPLE.as_bytes())
            .unwrap();

        assert_eq!(a.articles[0].article.id, b.articles[0].article.id);
        assert_eq!(a.articles[1].article.id, b.articles[1].article.id);
    }

    #[test]
    fn test_malformed_is_parse_error() {
        let normalizer = Normalizer::new();
        let result = normalizer.normalize("https://example.com/feed.xml", b"<html>nope");
        assert!(matches!(result, Err(EstuaryError::Parse(_))));
    }
}
