use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use estuary::app::AppContext;
use estuary::cli::{commands, Cli, Commands};
use estuary::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins; --verbose only changes the fallback.
    let fallback = if cli.verbose { "estuary=debug" } else { "estuary=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => Config::default_config_path()?,
    };
    let mut config = Config::load(Some(&config_path))?;
    if let Some(workers) = cli.workers {
        config.fetch.parallelism = workers.max(1);
    }

    let ctx = AppContext::open(config, config_path).await?;
    let account = cli.account.as_deref();

    match cli.command {
        Commands::Accounts => {
            commands::list_accounts(&ctx)?;
        }
        Commands::Feeds => {
            commands::list_feeds(commands::select(&ctx, account)?)?;
        }
        Commands::Add { url, folder } => {
            let collection = commands::select(&ctx, account)?;
            commands::add_feed(collection, &url, folder.as_deref()).await?;
        }
        Commands::Remove { url } => {
            commands::remove_feed(commands::select(&ctx, account)?, &url).await?;
        }
        Commands::Update { force, feed, all } => {
            if all {
                commands::update_all(&ctx, force).await?;
            } else {
                let collection = commands::select(&ctx, account)?;
                match feed {
                    Some(url) => commands::update_feed(collection, &url, force).await?,
                    None => commands::update_feeds(collection, force).await?,
                }
                ctx.save_rotated_credentials()?;
            }
        }
        Commands::List {
            feed,
            unread: _,
            favorites,
        } => {
            let filter = match (&feed, favorites) {
                (Some(url), _) => commands::ArticleFilter::Feed(url),
                (None, true) => commands::ArticleFilter::Favorites,
                (None, false) => commands::ArticleFilter::Unread,
            };
            commands::list_articles(commands::select(&ctx, account)?, filter)?;
        }
        Commands::Show { id } => {
            commands::show_article(commands::select(&ctx, account)?, &id).await?;
        }
        Commands::Read { ids } => {
            commands::set_read(commands::select(&ctx, account)?, &ids, true).await?;
        }
        Commands::Unread { ids } => {
            commands::set_read(commands::select(&ctx, account)?, &ids, false).await?;
        }
        Commands::Star { id } => {
            commands::set_favorite(commands::select(&ctx, account)?, &id, true).await?;
        }
        Commands::Unstar { id } => {
            commands::set_favorite(commands::select(&ctx, account)?, &id, false).await?;
        }
        Commands::MarkAllRead { feed } => {
            commands::mark_all_read(commands::select(&ctx, account)?, feed.as_deref()).await?;
        }
        Commands::Clean { days, feed } => {
            let days = days.unwrap_or(ctx.config().retention.max_age_days);
            commands::clean(commands::select(&ctx, account)?, days, feed.as_deref())?;
        }
        Commands::Daemon {
            interval,
            no_initial_update,
            force,
        } => {
            commands::run_daemon(Arc::new(ctx), &interval, !no_initial_update, force).await?;
        }
    }

    Ok(())
}
