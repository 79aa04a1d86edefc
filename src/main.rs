use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use gather::config::Config;
use gather::feed::Fetcher;
use gather::scheduler::Scheduler;
use gather::storage::{Database, StorageError};
use gather::util::validate_feed_url;

/// Get the config directory path (~/.config/gather/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    let config_dir = PathBuf::from(home).join(".config").join("gather");
    Ok(config_dir)
}

#[derive(Parser, Debug)]
#[command(
    name = "gather",
    about = "Continuous RSS/Atom collector that stores posts in SQLite"
)]
struct Args {
    /// Database file (overrides the config file)
    #[arg(long, value_name = "FILE")]
    db: Option<PathBuf>,

    /// Subscribe to a feed URL, then exit
    #[arg(long, value_name = "URL")]
    add_feed: Option<String>,

    /// Display name for --add-feed (defaults to the URL)
    #[arg(long, value_name = "NAME", requires = "add_feed")]
    name: Option<String>,

    /// List subscribed feeds, then exit
    #[arg(long)]
    list_feeds: bool,

    /// Show the most recently published posts, then exit
    #[arg(long, value_name = "N")]
    posts: Option<u32>,

    /// Run a single collection cycle instead of the daemon loop
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing for debug logging
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    // Set up config directory
    let config_dir = get_config_dir()?;
    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;
        println!("Created config directory: {}", config_dir.display());
    }

    // Keep the directory user-only on Unix: it holds the database
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        match std::fs::metadata(&config_dir) {
            Ok(metadata) => {
                let mut perms = metadata.permissions();
                perms.set_mode(0o700);
                if let Err(e) = std::fs::set_permissions(&config_dir, perms) {
                    tracing::warn!(
                        path = %config_dir.display(),
                        error = %e,
                        "Failed to set config directory permissions to 0700"
                    );
                }
            }
            Err(e) => {
                tracing::warn!(
                    path = %config_dir.display(),
                    error = %e,
                    "Failed to read config directory metadata"
                );
            }
        }
    }

    let config = Config::load(&config_dir.join("config.toml"))
        .context("Failed to load configuration")?;

    // CLI flag beats the config file beats the default location
    let db_path = match &args.db {
        Some(path) => path.clone(),
        None => match &config.database_path {
            Some(path) => PathBuf::from(path),
            None => config_dir.join("gather.db"),
        },
    };
    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;

    let db = match Database::open(db_path_str).await {
        Ok(db) => db,
        Err(StorageError::InstanceLocked) => {
            eprintln!(
                "Error: Another instance of gather appears to be running. Please close it and try again."
            );
            std::process::exit(1);
        }
        Err(e) => {
            return Err(anyhow::anyhow!("Failed to open database: {}", e));
        }
    };

    // Handle --add-feed flag
    if let Some(url) = &args.add_feed {
        validate_feed_url(url).context("Invalid feed URL")?;
        let name = args.name.clone().unwrap_or_else(|| url.clone());

        match db.create_feed(&name, url).await {
            Ok(feed) => {
                println!("Subscribed to {} ({})", feed.name, feed.url);
            }
            Err(StorageError::DuplicateUrl(_)) => {
                eprintln!("Already subscribed to {}", url);
                std::process::exit(1);
            }
            Err(e) => {
                return Err(anyhow::anyhow!("Failed to subscribe: {}", e));
            }
        }
        return Ok(());
    }

    // Handle --list-feeds flag
    if args.list_feeds {
        let feeds = db.list_feeds().await.context("Failed to list feeds")?;
        if feeds.is_empty() {
            println!("No feeds subscribed. Add one with: gather --add-feed <URL>");
        }
        for feed in feeds {
            let fetched = feed
                .last_fetched_at
                .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
                .unwrap_or_else(|| "never".to_string());
            println!("{}\n    {}\n    last fetched: {}", feed.name, feed.url, fetched);
        }
        return Ok(());
    }

    // Handle --posts flag
    if let Some(limit) = args.posts {
        let posts = db.recent_posts(limit).await.context("Failed to load posts")?;
        if posts.is_empty() {
            println!("No posts collected yet.");
        }
        for post in posts {
            println!(
                "{}  {}\n      {}",
                post.published_at.format("%Y-%m-%d %H:%M"),
                post.title,
                post.url
            );
        }
        return Ok(());
    }

    let fetcher = Fetcher::new(db.clone(), config.request_timeout())
        .context("Failed to build HTTP client")?;
    let scheduler = Scheduler::new(db, fetcher, config.concurrency, config.interval());

    // Handle --once flag
    if args.once {
        scheduler.tick().await;
        println!("Collection cycle complete.");
        return Ok(());
    }

    println!(
        "gather running (interval {}s, database {}). Press Ctrl-C to stop.",
        config.interval_secs,
        db_path.display()
    );

    let handle = scheduler.spawn();

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    println!("\nShutting down...");
    handle.shutdown().await;

    println!("Goodbye!");
    Ok(())
}
