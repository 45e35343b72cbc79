pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "estuary")]
#[command(about = "Multi-account feed reader with a local cache", long_about = None)]
pub struct Cli {
    /// Config file (default: ~/.config/estuary/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Account to operate on (default: the first configured account)
    #[arg(short, long, global = true)]
    pub account: Option<String>,

    /// Number of parallel workers for fetching feeds (overrides config)
    #[arg(short, long, global = true)]
    pub workers: Option<usize>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List configured accounts
    Accounts,
    /// List feeds of the account
    Feeds,
    /// Add a new feed
    Add {
        /// URL of the feed to add
        url: String,
        /// Folder path, segments separated by '/'
        #[arg(short, long)]
        folder: Option<String>,
    },
    /// Remove a feed
    Remove {
        /// URL of the feed to remove
        url: String,
    },
    /// Refresh feeds
    Update {
        /// Ignore cache validators
        #[arg(short, long)]
        force: bool,
        /// Refresh only this feed
        #[arg(long)]
        feed: Option<String>,
        /// Refresh every account
        #[arg(long)]
        all: bool,
    },
    /// List articles
    List {
        /// Articles of one feed
        #[arg(long, conflicts_with_all = ["unread", "favorites"])]
        feed: Option<String>,
        /// Unread articles of every feed (default)
        #[arg(long)]
        unread: bool,
        /// Favorite articles
        #[arg(long, conflicts_with = "unread")]
        favorites: bool,
    },
    /// Print an article
    Show {
        id: String,
    },
    /// Mark articles read
    Read {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Mark articles unread
    Unread {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Add an article to favorites
    Star {
        id: String,
    },
    /// Remove an article from favorites
    Unstar {
        id: String,
    },
    /// Mark every article of a feed read (default: all unread)
    MarkAllRead {
        feed: Option<String>,
    },
    /// Delete old read articles
    Clean {
        /// Age threshold in days (default: retention.max_age_days)
        #[arg(long)]
        days: Option<u32>,
        /// Only this feed
        #[arg(long)]
        feed: Option<String>,
    },
    /// Refresh all accounts periodically
    Daemon {
        /// Update interval (e.g., "1h", "30m", "6h", "1d")
        #[arg(short, long, default_value = "1h")]
        interval: String,

        /// Skip initial update on start
        #[arg(long)]
        no_initial_update: bool,

        /// Ignore cache validators on every refresh
        #[arg(long)]
        force: bool,
    },
}

/// Split "a/b/c" into folder segments; empty for the root.
pub fn folder_path(folder: Option<&str>) -> Vec<String> {
    folder
        .map(|f| {
            f.split('/')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}
