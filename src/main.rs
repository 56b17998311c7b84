use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use feedloader::config::Config;
use feedloader::feed::{AggregateResult, FeedLoader, FeedSource};

#[derive(Parser, Debug)]
#[command(
    name = "feedloader",
    about = "Load RSS/Atom feeds from many sources concurrently"
)]
struct Args {
    /// Sources to load (domain, URL or feed URL). Defaults to `sources` in the config file
    sources: Vec<String>,

    /// Config file path (default: ~/.config/feedloader/config.toml)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Maximum items per source and overall (0 = unlimited)
    #[arg(long, value_name = "N")]
    max_items: Option<usize>,

    /// Keep arrival order instead of sorting newest first
    #[arg(long)]
    no_sort: bool,

    /// Wall-clock budget for the whole load, in seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Drop items older than N days (0 = keep everything)
    #[arg(long, value_name = "N")]
    max_age_days: Option<u32>,

    /// Print the full result as JSON
    #[arg(long)]
    json: bool,
}

impl Args {
    fn apply(&self, config: &mut Config) {
        if !self.sources.is_empty() {
            config.sources = self.sources.clone();
        }
        if let Some(max_items) = self.max_items {
            config.max_items = max_items;
        }
        if self.no_sort {
            config.sort = false;
        }
        if let Some(timeout) = self.timeout {
            config.timeout_secs = timeout;
        }
        if let Some(days) = self.max_age_days {
            config.max_age_days = days;
        }
    }
}

fn source_line(source: &FeedSource) -> String {
    let mut line = format!("{} ({})", source.display_name, source.domain);
    if let Some(rgb) = source.accent_rgb() {
        line.push_str(&format!(" #{:06x}", rgb));
    }
    line
}

fn print_items(result: &AggregateResult) {
    for item in &result.items {
        println!("{}", item.title);
        println!("  {}", item.link);
        if let Some(cover) = &item.cover_image_url {
            println!("  cover: {}", cover);
        }
        println!(
            "  {} | {}",
            item.published_at.format("%Y-%m-%d %H:%M UTC"),
            source_line(&item.source)
        );
        println!("  from {}", item.source.canonical_url);
        println!();
    }
}

fn report_failures(result: &AggregateResult) {
    for source in &result.errored_sources {
        eprintln!(
            "Failed: {} ({})",
            source.display_name, source.canonical_url
        );
    }
    for source in &result.timed_out {
        eprintln!(
            "Timed out: {} ({})",
            source.display_name, source.canonical_url
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing for debug logging
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = match args.config.clone().or_else(Config::default_path) {
        Some(path) => Config::load(&path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => {
            tracing::debug!("HOME not set, using default configuration");
            Config::default()
        }
    };
    args.apply(&mut config);

    if config.sources.is_empty() {
        eprintln!("Error: No sources given");
        eprintln!();
        eprintln!("Pass sources on the command line:");
        eprintln!("  feedloader blog.rust-lang.org https://this-week-in-rust.org");
        eprintln!();
        eprintln!("Or list them under `sources` in the config file.");
        std::process::exit(1);
    }

    let transport = config.transport().context("Failed to set up HTTP client")?;
    let loader = FeedLoader::new(Arc::new(transport), config.load_options(Utc::now()));

    tracing::info!(
        sources = config.sources.len(),
        options = ?loader.options(),
        "Starting load"
    );
    let result = loader.load(&config.sources).await;

    if args.json {
        let json = serde_json::to_string_pretty(&result).context("Failed to serialize result")?;
        println!("{}", json);
    } else {
        print_items(&result);
    }
    report_failures(&result);

    if !result.success {
        std::process::exit(1);
    }
    Ok(())
}
