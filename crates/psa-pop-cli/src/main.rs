//! `psa-pop`: operator CLI for the PSA population store.
//!
//! Reads `psa-pop.toml` (or the path given with `--config`) plus `PSA_POP_*`
//! environment variables, opens the SQLite store, and runs one subcommand.
//!
//! # Usage
//!
//! ```text
//! psa-pop init
//! psa-pop import weekly-pop.json
//! psa-pop show --set "Base Set" --number 4 --name Charizard
//! psa-pop history --set "Base Set" --name Charizard --from 2024-01-01
//! ```

mod commands;
mod settings;

use std::path::PathBuf;

use anyhow::Context as _;
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use psa_pop_core::{
  card::CardKey,
  store::{HistoryQuery, RowCounts},
};
use psa_pop_store_sqlite::SqliteStore;
use serde::Serialize;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::settings::CliConfig;

#[derive(Parser)]
#[command(author, version, about = "PSA population store")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "psa-pop.toml")]
  config: PathBuf,

  /// SQLite database path; overrides `database_path` from the config.
  #[arg(long)]
  database: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Apply the schema (safe to repeat) and print row counts.
  Init,

  /// Print row counts for both tables.
  Counts,

  /// Upsert a JSON array of population rows, then snapshot them.
  Import {
    /// JSON file containing an array of flat population rows.
    file: PathBuf,

    /// Skip writing history snapshots.
    #[arg(long)]
    no_history: bool,
  },

  /// Copy current rows scraped on DATE into history.
  Snapshot {
    /// Snapshot date (YYYY-MM-DD); defaults to today (UTC).
    #[arg(long)]
    date: Option<NaiveDate>,
  },

  /// Print the current population row for one card.
  Show {
    #[arg(long)]
    set:     String,
    #[arg(long)]
    number:  String,
    #[arg(long)]
    name:    String,
    #[arg(long, default_value = "")]
    variant: String,
  },

  /// Print history snapshots, oldest first.
  History {
    #[arg(long)]
    set:  String,
    #[arg(long)]
    name: Option<String>,
    /// Inclusive start date (YYYY-MM-DD).
    #[arg(long)]
    from: Option<NaiveDate>,
    /// Inclusive end date (YYYY-MM-DD).
    #[arg(long)]
    to:   Option<NaiveDate>,
  },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  // Load configuration; the flag wins over file and environment.
  let mut cfg = CliConfig::load(&cli.config)?;
  if let Some(db) = cli.database {
    cfg.database_path = settings::expand_tilde(&db);
  }

  let store = SqliteStore::open(&cfg.database_path)
    .await
    .with_context(|| format!("failed to open store at {:?}", cfg.database_path))?;

  match cli.command {
    Command::Init => {
      let counts = commands::init(&store).await?;
      print_counts(counts);
    }
    Command::Counts => {
      let counts = commands::counts(&store).await?;
      print_counts(counts);
    }
    Command::Import { file, no_history } => {
      let raw = std::fs::read_to_string(&file)
        .with_context(|| format!("reading import file {}", file.display()))?;
      let rows = commands::parse_rows(&raw)?;
      tracing::info!(rows = rows.len(), file = %file.display(), "loaded import file");
      let summary = commands::import(&store, rows, cfg.batch_size, !no_history).await?;
      println!(
        "upserted {} rows ({} skipped, {} failed); {} history snapshots",
        summary.upserted, summary.skipped, summary.failed, summary.snapshotted
      );
    }
    Command::Snapshot { date } => {
      let date = date.unwrap_or_else(|| Utc::now().date_naive());
      let n = commands::snapshot(&store, date).await?;
      println!("{n} snapshots recorded for {date}");
    }
    Command::Show { set, number, name, variant } => {
      let key = CardKey::new(set, number, name, variant);
      let record = commands::show(&store, &key).await?;
      print_json(&record)?;
    }
    Command::History { set, name, from, to } => {
      let query = HistoryQuery {
        set_name: Some(set),
        card_name: name,
        from,
        to,
        ..Default::default()
      };
      let snapshots = commands::history(&store, &query).await?;
      print_json(&snapshots)?;
    }
  }

  Ok(())
}

fn print_counts(counts: RowCounts) {
  println!("psa_population:  {}", counts.population);
  println!("psa_pop_history: {}", counts.history);
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}
