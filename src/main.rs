use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use rssfeed::config::Config;
use rssfeed::feed::{self, Feed, FeedParser, FetchOptions};
use rssfeed::storage::{Database, StoredFeed};
use rssfeed::util::{display_line, fit_width, validate_feed_url};

/// Column budget for titles in listings
const TITLE_WIDTH: usize = 72;

#[derive(Parser, Debug)]
#[command(name = "rssfeed", about = "RSS 2.0 / Atom feed reader", version)]
struct Args {
    /// Config file (default: ~/.config/rssfeed/config.toml)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Subscribe to a feed after checking that it parses
    Add { url: String },
    /// Unsubscribe from a feed
    Remove { url: String },
    /// Mark a feed as favorite (or clear the mark with --off)
    Favorite {
        url: String,
        #[arg(long)]
        off: bool,
    },
    /// List subscriptions
    List,
    /// Fetch a feed and print its entries
    Show {
        url: String,
        /// Print at most N entries
        #[arg(long, value_name = "N")]
        limit: Option<usize>,
        /// Print the parsed feed as JSON
        #[arg(long)]
        json: bool,
        /// Remember the printed entries as seen
        #[arg(long)]
        mark_seen: bool,
    },
    /// Parse a local feed document without touching the network
    Parse {
        file: PathBuf,
        /// Source URL recorded in the result (defaults to the file path)
        #[arg(long)]
        url: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Re-fetch every subscription and store the updated headers
    Refresh,
}

/// Everything a command may need, built once from the config.
struct AppContext {
    config: Config,
    config_dir: PathBuf,
    parser: FeedParser,
    options: FetchOptions,
}

impl AppContext {
    fn load(config_path: Option<&Path>) -> Result<Self> {
        let (config_path, config_dir) = match config_path {
            Some(path) => {
                let dir = path
                    .parent()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| PathBuf::from("."));
                (path.to_path_buf(), dir)
            }
            None => {
                let dir = Config::default_dir().context("HOME environment variable not set")?;
                (dir.join("config.toml"), dir)
            }
        };

        let config = Config::load(&config_path)
            .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
        let parser = FeedParser::with_body_style(config.body_style());
        let options = config.fetch_options();
        Ok(Self {
            config,
            config_dir,
            parser,
            options,
        })
    }

    fn client(&self) -> Result<reqwest::Client> {
        feed::build_client(&self.options).context("Failed to build HTTP client")
    }

    async fn database(&self) -> Result<Database> {
        ensure_private_dir(&self.config_dir)?;
        let path = self.config.database_path(&self.config_dir);
        let path_str = path
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
        Database::open(path_str)
            .await
            .with_context(|| format!("Failed to open database at {}", path.display()))
    }
}

/// Create the config directory if needed and restrict it to the current user.
fn ensure_private_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory {}", dir.display()))?;
        tracing::info!(path = %dir.display(), "Created config directory");
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o700);
        if let Err(e) = std::fs::set_permissions(dir, perms) {
            tracing::warn!(
                path = %dir.display(),
                error = %e,
                "Failed to set config directory permissions to 0700"
            );
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let ctx = AppContext::load(args.config.as_deref())?;

    match args.command {
        Command::Add { url } => add(&ctx, &url).await,
        Command::Remove { url } => {
            let db = ctx.database().await?;
            db.delete_feed(&url).await?;
            println!("Removed {}", url);
            Ok(())
        }
        Command::Favorite { url, off } => {
            let db = ctx.database().await?;
            db.set_favorite(&url, !off).await?;
            println!("{} {}", if off { "Unmarked" } else { "Marked" }, url);
            Ok(())
        }
        Command::List => list(&ctx).await,
        Command::Show {
            url,
            limit,
            json,
            mark_seen,
        } => show(&ctx, &url, limit, json, mark_seen).await,
        Command::Parse { file, url, json } => parse_file(&ctx, &file, url, json),
        Command::Refresh => refresh(&ctx).await,
    }
}

async fn add(ctx: &AppContext, input: &str) -> Result<()> {
    let url = validate_feed_url(input).context("Refusing to subscribe")?;
    let feed = feed::load_feed(&ctx.client()?, &ctx.parser, url.as_str(), &ctx.options)
        .await
        .with_context(|| format!("Could not load feed from {}", url))?;

    let db = ctx.database().await?;
    if db.insert_feed(&StoredFeed::from(&feed)).await? {
        println!(
            "Subscribed to {} ({} entries)",
            title_of(&feed),
            feed.entries().len()
        );
    } else {
        println!("Already subscribed to {}", url);
    }
    Ok(())
}

async fn list(ctx: &AppContext) -> Result<()> {
    let db = ctx.database().await?;
    let feeds = db.get_feeds().await?;
    if feeds.is_empty() {
        println!("No subscriptions. Add one with: rssfeed add <URL>");
        return Ok(());
    }
    for stored in feeds {
        let marker = if stored.is_favorite { '*' } else { ' ' };
        let title = display_line(stored.title.as_deref().unwrap_or("(untitled)")).into_owned();
        println!("{} {}  {}", marker, fit_width(&title, TITLE_WIDTH), stored.url);
    }
    Ok(())
}

async fn show(
    ctx: &AppContext,
    input: &str,
    limit: Option<usize>,
    json: bool,
    mark_seen: bool,
) -> Result<()> {
    let url = validate_feed_url(input).context("Refusing to fetch")?;
    let db = ctx.database().await?;
    let stored = db.get_feed(url.as_str()).await?;

    let mut feed = feed::load_feed(&ctx.client()?, &ctx.parser, url.as_str(), &ctx.options)
        .await
        .with_context(|| format!("Could not load feed from {}", url))?;
    if let Some(stored) = &stored {
        feed.is_favorite = stored.is_favorite;
        let seen = db.seen_fingerprints(url.as_str()).await?;
        feed.apply_seen(&seen);
    }
    if let Some(limit) = limit {
        if let Some(entries) = feed.entries.as_mut() {
            entries.truncate(limit);
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&feed)?);
    } else {
        print_feed(&feed);
    }

    if mark_seen {
        if stored.is_none() {
            tracing::warn!(url = %url, "Feed is not subscribed; seen state not stored");
            return Ok(());
        }
        let fingerprints: Vec<String> = feed.entries().iter().map(|e| e.fingerprint()).collect();
        let marked = db.mark_entries_seen(url.as_str(), &fingerprints).await?;
        tracing::info!(url = %url, marked = marked, "Marked entries as seen");
    }
    Ok(())
}

fn parse_file(ctx: &AppContext, file: &Path, url: Option<String>, json: bool) -> Result<()> {
    let bytes =
        std::fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let source_url = url.unwrap_or_else(|| file.display().to_string());
    let feed = ctx
        .parser
        .parse(&source_url, &bytes)
        .with_context(|| format!("Could not parse {}", file.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&feed)?);
    } else {
        print_feed(&feed);
    }
    Ok(())
}

async fn refresh(ctx: &AppContext) -> Result<()> {
    let db = ctx.database().await?;
    let mut feeds: Vec<Feed> = db.get_feeds().await?.into_iter().map(Feed::from).collect();
    if feeds.is_empty() {
        println!("No subscriptions to refresh.");
        return Ok(());
    }

    let outcomes = feed::refresh_all(&ctx.client()?, &ctx.parser, &mut feeds, &ctx.options).await;

    let mut failures = 0;
    for (feed, outcome) in feeds.iter_mut().zip(outcomes) {
        match outcome.result {
            Ok(_) => {
                db.update_feed_header(feed).await?;
                let seen = db.seen_fingerprints(&feed.source_url).await?;
                feed.apply_seen(&seen);
                let title = display_line(title_of(feed)).into_owned();
                println!(
                    "  {}  {} new / {}",
                    fit_width(&title, TITLE_WIDTH),
                    feed.unseen_count(),
                    feed.entries().len()
                );
            }
            Err(e) => {
                failures += 1;
                println!("! {}  {}", outcome.source_url, e);
            }
        }
    }

    if failures > 0 {
        println!("{} of {} feeds failed to refresh", failures, feeds.len());
    }
    Ok(())
}

fn title_of(feed: &Feed) -> &str {
    feed.title.as_deref().unwrap_or(&feed.source_url)
}

fn print_feed(feed: &Feed) {
    let favorite = if feed.is_favorite { " *" } else { "" };
    println!("{}{}", display_line(title_of(feed)), favorite);
    if let Some(description) = feed.description.as_deref().filter(|d| !d.is_empty()) {
        println!("{}", display_line(description));
    }
    println!();

    for entry in feed.entries() {
        let marker = if entry.is_seen { ' ' } else { '+' };
        let title = display_line(entry.title.as_deref().unwrap_or("(untitled)")).into_owned();
        println!("{} {}", marker, fit_width(&title, TITLE_WIDTH));
        if let Some(date) = entry.publication_date.as_deref() {
            println!("    {}", display_line(date));
        }
        if let Some(link) = entry.link.as_deref() {
            println!("    {}", display_line(link));
        }
        if !entry.categories.is_empty() {
            let categories = entry.categories.join(", ");
            println!("    [{}]", fit_width(&display_line(&categories), TITLE_WIDTH));
        }
    }
}
