//! # Estuary
//!
//! A multi-account feed reader core: one cached, offline-capable collection
//! per account, whether the feeds are polled directly or come from a Tiny
//! Tiny RSS or Inoreader server.
//!
//! ## Architecture
//!
//! ```text
//! FetchStrategy → Normalizer → merge → ContentStore
//!                                 ↑
//!          Collection (catalog, DirtyTracker, commit)
//! ```
//!
//! - [`fetcher`]: one strategy per backend, plus HTTP/session plumbing
//! - [`normalizer`]: Converts RSS/Atom feeds to articles
//! - [`store`]: SQLite persistence, one database per account
//! - [`collection`]: the per-account façade used by everything else
//!
//! ## Quick Start
//!
//! ```bash
//! # Add a feed to the default account
//! estuary add https://blog.rust-lang.org/feed.xml
//!
//! # Refresh every account
//! estuary update --all
//!
//! # List unread articles
//! estuary list --unread
//! ```

/// Application context and error handling.
///
/// The [`AppContext`](app::AppContext) struct opens one
/// [`Collection`](collection::Collection) per configured account.
pub mod app;

/// Configuration loaded from `~/.config/estuary/config.toml`:
/// storage root, fetch limits, retention, accounts.
pub mod config;

/// Scheduled refresh of every account (`estuary daemon --interval 1h`).
pub mod daemon;

/// Command-line interface using clap.
pub mod cli;

/// Per-account collections: cache, state changes and commits.
pub mod collection;

/// Core domain models.
///
/// - [`Account`](domain::Account): one configured backend
/// - [`Summary`](domain::Summary): per-feed metadata and article catalog
/// - [`Abstract`](domain::Abstract): per-article metadata with read/favorite flags
/// - [`FeedTree`](domain::FeedTree): folders of feeds
pub mod domain;

/// Fetch strategies and the network seams they are built on.
///
/// - [`Fetcher`](fetcher::Fetcher): conditional GET of feed documents
/// - [`ParallelFetcher`](fetcher::parallel::ParallelFetcher): bounded concurrent fetching
/// - [`Transport`](fetcher::transport::Transport): remote API calls
/// - [`FetchStrategy`](fetcher::FetchStrategy): local, TTRSS and Inoreader backends
pub mod fetcher;

/// Feed parsing and normalization.
///
/// Converts RSS 0.9x/1.0/2.0, Atom 0.3/1.0, and JSON Feed 1.0
/// into [`FetchedFeed`](fetcher::FetchedFeed)s.
pub mod normalizer;

/// SQLite persistence layer.
///
/// - [`ContentStore`](store::ContentStore): Trait defining storage operations
/// - [`SqliteStore`](store::SqliteStore): SQLite implementation
pub mod store;
