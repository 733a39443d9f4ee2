use anyhow::{bail, Context, Result};
use chrono::DateTime;
use clap::{Parser, Subcommand};
use listenlog::analytics::{
    correlate_artists, segment_sessions, session_playlist, session_stats, DEFAULT_SESSION_GAP,
};
use listenlog::catalog_store::{CatalogStore, EventFilter, SqliteCatalogStore};
use serde_json::json;
use std::path::PathBuf;
use std::time::Duration;

fn parse_path(s: &str) -> Result<PathBuf> {
    let original_path = PathBuf::from(s);
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

/// Accepts unix seconds or an RFC 3339 timestamp.
fn parse_timestamp(s: &str) -> Result<i64> {
    if let Ok(secs) = s.parse::<i64>() {
        return Ok(secs);
    }
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.timestamp())
        .with_context(|| format!("Invalid timestamp {:?}", s))
}

#[derive(Parser, Debug)]
#[command(about = "Listening history statistics, printed as JSON")]
struct CliArgs {
    /// Path to the catalog database file.
    #[clap(value_parser = parse_path)]
    pub db_path: PathBuf,

    /// Silence, in seconds, that closes a listening session.
    #[clap(long, default_value_t = DEFAULT_SESSION_GAP.as_secs())]
    pub gap_secs: u64,

    /// Only consider events at or after this time.
    #[clap(long, value_parser = parse_timestamp)]
    pub since: Option<i64>,

    /// Only consider events before this time.
    #[clap(long, value_parser = parse_timestamp)]
    pub until: Option<i64>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Session count, lengths and durations.
    Sessions,

    /// Artists most often heard back to back.
    Pairs {
        #[clap(long, default_value_t = 10)]
        limit: usize,
    },

    /// Tracks that shared sessions with the seed artist.
    Playlist {
        seed_artist: String,
        #[clap(long, default_value_t = 20)]
        limit: usize,
    },

    /// Sessions and top pairs together.
    Summary {
        #[clap(long, default_value_t = 10)]
        limit: usize,
    },
}

fn main() -> Result<()> {
    let cli_args = CliArgs::parse();
    if cli_args.gap_secs == 0 {
        bail!("--gap-secs must be positive");
    }
    if !cli_args.db_path.exists() {
        bail!("Catalog database does not exist: {:?}", cli_args.db_path);
    }

    let store = SqliteCatalogStore::new(&cli_args.db_path)?;
    let events = store.query_events(&EventFilter {
        since: cli_args.since,
        until: cli_args.until,
        ..Default::default()
    })?;
    let gap = Duration::from_secs(cli_args.gap_secs);

    let output = match cli_args.command.unwrap_or(Command::Summary { limit: 10 }) {
        Command::Sessions => {
            let sessions = segment_sessions(&events, gap);
            json!(session_stats(&sessions))
        }
        Command::Pairs { limit } => {
            let mut pairs = correlate_artists(&events, gap);
            pairs.truncate(limit);
            json!(pairs)
        }
        Command::Playlist { seed_artist, limit } => {
            let sessions = segment_sessions(&events, gap);
            json!(session_playlist(&sessions, &seed_artist, limit))
        }
        Command::Summary { limit } => {
            let sessions = segment_sessions(&events, gap);
            let mut pairs = correlate_artists(&events, gap);
            pairs.truncate(limit);
            json!({
                "events": events.len(),
                "sessions": session_stats(&sessions),
                "top_pairs": pairs,
            })
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
