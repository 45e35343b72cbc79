use std::sync::Arc;

use crate::app::{AppContext, EstuaryError, Result};
use crate::cli::folder_path;
use crate::collection::{Collection, CommitReport, RefreshReport, UNREAD_FEED};
use crate::daemon::{Daemon, DaemonConfig};
use crate::domain::{Abstract, StateChange};

/// Collection named by `--account`, or the first configured one.
pub fn select<'a>(ctx: &'a AppContext, account: Option<&str>) -> Result<&'a Arc<Collection>> {
    match account {
        Some(key) => ctx.collection(key),
        None => ctx
            .collections()
            .first()
            .ok_or_else(|| EstuaryError::Config("No accounts configured".into())),
    }
}

pub fn list_accounts(ctx: &AppContext) -> Result<()> {
    if ctx.collections().is_empty() {
        println!("No accounts");
        return Ok(());
    }

    for collection in ctx.collections() {
        let account = collection.account();
        println!(
            "{} ({}, {}) - {} feeds, {} unread",
            account.name,
            account.key,
            account.kind(),
            collection.summaries().len(),
            collection.unread_count(None)
        );
    }
    Ok(())
}

pub fn list_feeds(collection: &Collection) -> Result<()> {
    let feeds = collection.get_feed_list();
    if feeds.is_empty() {
        println!("No feeds");
        return Ok(());
    }

    for feed in feeds {
        let title = feed.title.as_deref().unwrap_or(&feed.url);
        let folder = if feed.folder.is_empty() {
            String::new()
        } else {
            format!("[{}] ", feed.folder.join("/"))
        };
        println!(
            "{}{} ({} unread)\n  {}",
            folder,
            title,
            collection.unread_count(Some(&feed.url)),
            feed.url
        );
    }
    Ok(())
}

pub async fn add_feed(collection: &Collection, url: &str, folder: Option<&str>) -> Result<()> {
    let summary = collection.add_feed_to(url, &folder_path(folder)).await?;

    println!("Added feed: {}", summary.url);
    if let Some(title) = &summary.title {
        println!("Feed title: {}", title);
    }
    println!("Fetched {} items", summary.catalog.len());
    Ok(())
}

pub async fn remove_feed(collection: &Collection, url: &str) -> Result<()> {
    let report = collection.del_feed(url).await?;
    println!("Removed feed: {}", url);
    print_commit_failures(&report);
    Ok(())
}

pub async fn update_feeds(collection: &Collection, force: bool) -> Result<()> {
    println!(
        "Updating {} feeds of {}...",
        collection.summaries().len(),
        collection.account().name
    );

    match collection.refresh(force).await? {
        Some(report) => print_refresh_report(&report),
        None => println!("An update is already running"),
    }
    Ok(())
}

pub async fn update_feed(collection: &Collection, url: &str, force: bool) -> Result<()> {
    let count = collection.refresh_feed(url, force).await?;
    println!("{} new items from {}", count, url);
    Ok(())
}

pub async fn update_all(ctx: &AppContext, force: bool) -> Result<()> {
    let Some(results) = ctx.refresh_all(force).await? else {
        println!("An update is already running");
        return Ok(());
    };

    for (key, result) in results {
        println!("{}:", key);
        match result {
            Ok(Some(report)) => print_refresh_report(&report),
            Ok(None) => println!("  already updating"),
            Err(e) => eprintln!("  Error: {}", e),
        }
    }
    Ok(())
}

fn print_refresh_report(report: &RefreshReport) {
    for url in &report.added_feeds {
        println!("  + {}", url);
    }
    for url in &report.removed_feeds {
        println!("  - {}", url);
    }
    for (url, e) in &report.failures {
        eprintln!("  Error updating {}: {}", url, e);
    }
    println!(
        "Update complete: {} new items, {} feeds updated, {} errors",
        report.new_articles,
        report.updated,
        report.failures.len()
    );
}

fn print_commit_failures(report: &CommitReport) {
    if report.is_partial() {
        eprintln!(
            "{} change(s) could not be sent upstream and will be retried:",
            report.failures.len()
        );
        for (what, e) in &report.failures {
            eprintln!("  {}: {}", what, e);
        }
    }
}

pub enum ArticleFilter<'a> {
    Feed(&'a str),
    Unread,
    Favorites,
}

pub fn list_articles(collection: &Collection, filter: ArticleFilter<'_>) -> Result<()> {
    let articles = match filter {
        ArticleFilter::Feed(url) => collection.get_articles(url)?,
        ArticleFilter::Unread => collection.get_articles(UNREAD_FEED)?,
        ArticleFilter::Favorites => collection.get_favorites(),
    };

    if articles.is_empty() {
        println!("No items");
        return Ok(());
    }

    for article in &articles {
        print_article_line(article);
    }
    Ok(())
}

fn print_article_line(article: &Abstract) {
    let read_marker = if article.read { " " } else { "●" };
    let star = if article.favorite { "★" } else { " " };
    let date = article
        .published_at
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "          ".to_string());

    println!(
        "{}{} {} {}  {}",
        read_marker,
        star,
        date,
        article.display_title(),
        article.id
    );
}

/// Print an article and mark it read.
pub async fn show_article(collection: &Collection, id: &str) -> Result<()> {
    let article = collection
        .get_abstract(id)
        .ok_or_else(|| EstuaryError::NotFound(format!("article {}", id)))?;

    println!("{}", article.display_title());
    if let Some(link) = &article.link {
        println!("{}", link);
    }
    if let Some(date) = article.published_at {
        println!("{}", date.format("%Y-%m-%d %H:%M"));
    }
    println!();

    match collection.get_content(id).await {
        Ok(body) => println!("{}", body),
        Err(EstuaryError::NotFound(_)) => println!("(no content available)"),
        Err(e) => return Err(e),
    }

    if !article.read {
        let report = collection
            .update_abstract(id, StateChange::read(true))?
            .commit()
            .await?;
        print_commit_failures(&report);
    }
    Ok(())
}

pub async fn set_read(collection: &Collection, ids: &[String], read: bool) -> Result<()> {
    for id in ids {
        collection.update_abstract(id, StateChange::read(read))?;
    }
    let report = collection.commit().await?;
    println!(
        "Marked {} article(s) {}",
        ids.len(),
        if read { "read" } else { "unread" }
    );
    print_commit_failures(&report);
    Ok(())
}

pub async fn set_favorite(collection: &Collection, id: &str, favorite: bool) -> Result<()> {
    let report = if favorite {
        collection.add_to_favorites(id).await?
    } else {
        collection.remove_from_favorites(id).await?
    };
    println!(
        "{} {}",
        if favorite { "Starred" } else { "Unstarred" },
        id
    );
    print_commit_failures(&report);
    Ok(())
}

pub async fn mark_all_read(collection: &Collection, feed: Option<&str>) -> Result<()> {
    let feed = feed.unwrap_or(UNREAD_FEED);
    let before = collection.unread_count(Some(feed));
    let report = collection.mark_all_read(feed).await?;
    println!("Marked {} article(s) read", before);
    print_commit_failures(&report);
    Ok(())
}

pub fn clean(collection: &Collection, max_age_days: u32, feed: Option<&str>) -> Result<()> {
    let max_age = chrono::Duration::days(i64::from(max_age_days));
    let removed = match feed {
        Some(url) => collection.clean_old_articles(url, max_age)?,
        None => collection.clean_all_old_articles(max_age)?,
    };
    println!(
        "Removed {} read article(s) older than {} days",
        removed, max_age_days
    );
    Ok(())
}

pub async fn run_daemon(
    ctx: Arc<AppContext>,
    interval: &str,
    update_on_start: bool,
    force: bool,
) -> Result<()> {
    let interval = DaemonConfig::parse_interval(interval).map_err(EstuaryError::Config)?;
    let daemon = Daemon::new(
        ctx,
        DaemonConfig {
            interval,
            update_on_start,
            force,
        },
    );
    daemon.run().await
}
