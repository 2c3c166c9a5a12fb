//! huginn: command-line front end for the danmu engine.
//!
//! Every invocation builds a fresh engine from configuration. With an
//! external store configured, ids issued by one invocation are rehydrated by
//! the next, so `search` followed by `episodes`/`comments` works across runs.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use huginn::{CommentFormat, CommentKey, Config, Secrets};

/// Multi-source danmu aggregation.
#[derive(Parser)]
#[command(name = "huginn")]
#[command(version)]
#[command(about = "Search danmu sources and fetch normalized comments")]
struct Args {
    /// Path to configuration file.
    #[arg(short, long, env = "HUGINN_CONFIG")]
    config: Option<PathBuf>,

    /// Override the source priority list, e.g. "dandan,bilibili".
    #[arg(long)]
    sources: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Search every source for a title
    Search {
        keyword: String,
    },

    /// List the episodes of an anime id
    Episodes {
        anime_id: i64,
    },

    /// Remember an anime id as the preferred result for a keyword
    Select {
        keyword: String,
        anime_id: i64,
    },

    /// Fetch comments for an episode id or a video url
    Comments {
        /// Episode id or url
        key: String,
        /// Output format: "segments", "json" or "xml"
        #[arg(short, long, default_value = "segments")]
        format: String,
    },

    /// Fetch only the comment window containing a playback time
    At {
        /// Episode id or url
        key: String,
        /// Playback time in seconds
        time: f64,
    },

    /// Match a video file name to an episode
    Match {
        file_name: String,
    },

    /// Show registry, cache and sync state
    State,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = Config::load(args.config.as_deref())?;
    if let Some(order) = args.sources {
        config.sources.order = order;
    }
    let secrets = Secrets::load()?;

    // Initialise tracing (default from config; override with RUST_LOG).
    let buffer = huginn::LogBuffer::new(config.logging.buffer_capacity);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(
                    EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter)),
                ),
        )
        .with(buffer.layer())
        .init();

    let engine = config.builder(&secrets)?.log_buffer(buffer).build().await?;

    match args.command {
        Command::Search { keyword } => print_json(&engine.search(&keyword).await)?,

        Command::Episodes { anime_id } => print_json(&engine.episodes(anime_id)?)?,

        Command::Select { keyword, anime_id } => {
            engine.select(&keyword, anime_id).await?;
            println!("remembered {anime_id} for '{keyword}'");
        }

        Command::Comments { key, format } => {
            let key: CommentKey = key.parse()?;
            if format == "segments" {
                print_json(&engine.comments(&key).await?)?;
            } else {
                let format: CommentFormat = format.parse()?;
                println!("{}", engine.export_comments(&key, format).await?);
            }
        }

        Command::At { key, time } => {
            let key: CommentKey = key.parse()?;
            print_json(&engine.comments_at(&key, time).await?)?;
        }

        Command::Match { file_name } => match engine.auto_match(&file_name).await? {
            Some(found) => print_json(&found)?,
            None => {
                eprintln!("no match for '{file_name}'");
                std::process::exit(1);
            }
        },

        Command::State => print_json(&engine.state_report()?)?,
    }

    // Flush anything the command changed before exiting.
    let report = engine.sync().await;
    if !report.failed.is_empty() {
        eprintln!("warning: could not persist {:?}", report.failed);
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
