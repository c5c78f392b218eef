//! fan-post - Publish one post to every linked social account

use anyhow::{Context, Result};
use clap::Parser;
use std::io::{IsTerminal, Read};
use std::path::PathBuf;

use libfanpost::accounts::{resolve_accounts_path, AccountsFile};
use libfanpost::history::SqliteHistory;
use libfanpost::logging::LoggingConfig;
use libfanpost::media::{ImageCleanup, LocalImageCleanup, LocalImageSource, NoCleanup};
use libfanpost::{
    Config, ConnectedAccount, FanOutOrchestrator, FanpostError, Post, PublishReport, Publisher,
};

#[derive(Parser, Debug)]
#[command(name = "fan-post")]
#[command(version, about = "Publish one post to Bluesky, Mastodon, Lemmy and Pixelfed at once")]
#[command(long_about = r#"Publish one post to every linked account concurrently.

EXAMPLES:
    # Post to every account in the accounts file
    fan-post "Hello, everyone"

    # Read the message from stdin
    echo "Hello from a pipe" | fan-post

    # Attach images from the image directory
    fan-post "Sunset" --image sunset.jpg --image beach.png

    # Only some platforms, JSON output
    fan-post "Release notes" --platform mastodon,lemmy --title "v1.2" --format json

    # Show the last five recorded posts
    fan-post --recent 5

EXIT CODES:
    0 - Every destination succeeded
    1 - Every destination failed (or a setup error)
    2 - Some destinations succeeded, some failed
    3 - Invalid input
"#)]
struct Cli {
    /// Message to post (reads from stdin if not provided)
    message: Option<String>,

    /// Title, used by forum platforms
    #[arg(short, long)]
    title: Option<String>,

    /// Mark the post as sensitive
    #[arg(long)]
    nsfw: bool,

    /// Link URL, used by forum platforms
    #[arg(long, value_name = "URL")]
    link: Option<String>,

    /// Image to attach, relative to the image directory (repeatable)
    #[arg(short, long = "image", value_name = "NAME")]
    images: Vec<String>,

    /// Directory images are read from
    #[arg(long, value_name = "DIR")]
    image_dir: Option<PathBuf>,

    /// Accounts file to use instead of the default
    #[arg(long, value_name = "FILE")]
    accounts: Option<PathBuf>,

    /// Only post to these platforms (comma-separated)
    #[arg(short, long, value_delimiter = ',')]
    platform: Vec<String>,

    /// Output format
    #[arg(short, long, default_value = "text", value_parser = ["text", "json"])]
    format: String,

    /// Keep image files after posting
    #[arg(long)]
    keep_images: bool,

    /// Do not record this post in the history database
    #[arg(long)]
    no_history: bool,

    /// Show the N most recent posts from the history database and exit
    #[arg(long, value_name = "N", conflicts_with_all = ["message", "images"])]
    recent: Option<usize>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    LoggingConfig::from_env(cli.verbose).init();

    if let Some(limit) = cli.recent {
        if let Err(e) = show_recent(limit, &cli.format).await {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
        return;
    }

    match run(cli).await {
        Ok(report) => std::process::exit(report.exit_code()),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            let code = e
                .downcast_ref::<FanpostError>()
                .map(FanpostError::exit_code)
                .unwrap_or(1);
            std::process::exit(code);
        }
    }
}

async fn run(cli: Cli) -> Result<PublishReport> {
    let message = read_message(cli.message.as_deref())?;
    if message.trim().is_empty() && cli.images.is_empty() {
        return Err(FanpostError::InvalidInput("Message cannot be empty".to_string()).into());
    }

    let config = Config::load().context("Failed to load configuration")?;

    let accounts = load_accounts(cli.accounts.as_deref())?;
    let accounts = select_accounts(accounts, &cli.platform)?;

    let image_dir = match cli.image_dir {
        Some(dir) => dir,
        None => config.media.expand_image_dir()?,
    };
    let cleanup: Box<dyn ImageCleanup> = if cli.keep_images || !config.media.cleanup {
        Box::new(NoCleanup)
    } else {
        Box::new(LocalImageCleanup::new(image_dir.clone()))
    };

    let mut publisher = Publisher::new(
        FanOutOrchestrator::from_config(&config),
        Box::new(LocalImageSource::new(image_dir)),
    )
    .with_cleanup(cleanup);

    if config.history.enabled && !cli.no_history {
        let path = config.history.expand_path()?;
        match SqliteHistory::new(&path.to_string_lossy()).await {
            Ok(history) => publisher = publisher.with_history(Box::new(history)),
            Err(e) => tracing::warn!("History disabled: {}", e),
        }
    }

    let mut post = Post::new(message).nsfw(cli.nsfw);
    if let Some(title) = cli.title {
        post = post.with_title(title);
    }
    if let Some(link) = cli.link {
        post = post.with_link(link);
    }

    let report = publisher.publish(post, &cli.images, &accounts).await?;
    print_report(&report, &cli.format)?;
    Ok(report)
}

async fn show_recent(limit: usize, format: &str) -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;
    let path = config.history.expand_path()?;
    if !path.exists() {
        anyhow::bail!("History database not found at {}", path.display());
    }

    let history = SqliteHistory::new(&path.to_string_lossy())
        .await
        .context("Failed to open history database")?;
    let entries = history.recent(limit).await.context("Failed to query history")?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    for entry in entries {
        let timestamp = chrono::DateTime::from_timestamp(entry.published_at, 0)
            .unwrap_or_else(chrono::Utc::now)
            .format("%Y-%m-%d %H:%M:%S");
        let preview: String = entry.message.chars().take(60).collect();
        println!("{} | {} | {} | {}", timestamp, entry.post_id, entry.outcome, preview);

        for result in &entry.results {
            let target = result.handle.as_deref().or(result.instance.as_deref()).unwrap_or("-");
            let detail = result.post_url.as_deref().unwrap_or(&result.message);
            println!("  {} {} {}: {}", result.status, result.platform, target, detail);
        }
        println!();
    }
    Ok(())
}

/// Message from the argument, or from stdin when it is piped
fn read_message(arg: Option<&str>) -> Result<String> {
    if let Some(message) = arg {
        return Ok(message.to_string());
    }

    let stdin = std::io::stdin();
    if stdin.is_terminal() {
        return Err(FanpostError::InvalidInput(
            "No message provided. Pass it as an argument or pipe it via stdin".to_string(),
        )
        .into());
    }

    let mut buffer = String::new();
    stdin
        .lock()
        .read_to_string(&mut buffer)
        .context("Failed to read message from stdin")?;
    Ok(buffer.trim_end_matches('\n').to_string())
}

fn load_accounts(path: Option<&std::path::Path>) -> Result<Vec<ConnectedAccount>> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => resolve_accounts_path()?,
    };

    AccountsFile::load_from_path(&path)
        .with_context(|| format!("Failed to load accounts from {}", path.display()))
}

/// Keep only accounts on the requested platforms; no filter keeps all
fn select_accounts(
    accounts: Vec<ConnectedAccount>,
    platforms: &[String],
) -> Result<Vec<ConnectedAccount>> {
    let wanted: Vec<String> = platforms
        .iter()
        .map(|p| p.trim().to_lowercase())
        .filter(|p| !p.is_empty())
        .collect();

    let selected: Vec<ConnectedAccount> = accounts
        .into_iter()
        .filter(|a| wanted.is_empty() || wanted.contains(&a.platform.trim().to_lowercase()))
        .collect();

    if selected.is_empty() {
        return Err(FanpostError::InvalidInput("No accounts to post to".to_string()).into());
    }
    Ok(selected)
}

fn print_report(report: &PublishReport, format: &str) -> Result<()> {
    if format == "json" {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    for result in &report.results {
        let target = result
            .handle()
            .or(result.instance())
            .unwrap_or("-");
        let detail = match (result.is_success(), result.post_url()) {
            (true, Some(url)) => url,
            _ => result.message(),
        };
        println!("{}\t{}\t{}\t{}", result.platform(), target, result.status(), detail);
    }
    println!("{}", report.outcome);
    Ok(())
}
