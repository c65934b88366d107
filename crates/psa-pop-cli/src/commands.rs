//! Subcommand implementations. Each returns its result; `main` prints it.

use std::collections::BTreeSet;

use anyhow::Context as _;
use chrono::NaiveDate;
use psa_pop_core::{
  card::{CardKey, NewPopulation, PopulationRecord},
  snapshot::{NewSnapshot, Snapshot},
  store::{HistoryQuery, PopulationStore, RowCounts},
};
use psa_pop_store_sqlite::{Error as StoreError, SqliteStore};
use tracing::{error, info, warn};

// ─── init / counts ───────────────────────────────────────────────────────────

/// Re-apply the schema and run the verification query.
pub async fn init(store: &SqliteStore) -> anyhow::Result<RowCounts> {
  store.apply_schema().await.context("failed to apply schema")?;
  let counts = store
    .row_counts()
    .await
    .context("verification query failed")?;
  info!(
    population = counts.population,
    history = counts.history,
    "schema applied"
  );
  Ok(counts)
}

pub async fn counts(store: &SqliteStore) -> anyhow::Result<RowCounts> {
  store.row_counts().await.context("failed to count rows")
}

// ─── import ──────────────────────────────────────────────────────────────────

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ImportSummary {
  pub upserted:    usize,
  pub skipped:     usize,
  pub failed:      usize,
  pub snapshotted: usize,
}

/// Parse a JSON array of flat population rows.
pub fn parse_rows(json: &str) -> anyhow::Result<Vec<NewPopulation>> {
  serde_json::from_str(json).context("expected a JSON array of population rows")
}

/// Upsert `rows` in transactions of `batch_size`, then snapshot the graded
/// rows this import wrote, each on its scraped date.
///
/// Rows with blank key fields are skipped. A failed batch is logged and the
/// import moves on to the next one.
pub async fn import(
  store: &SqliteStore,
  rows: Vec<NewPopulation>,
  batch_size: usize,
  with_history: bool,
) -> anyhow::Result<ImportSummary> {
  let mut summary = ImportSummary::default();
  let mut written = BTreeSet::new();

  let mut pending = Vec::with_capacity(rows.len());
  for row in rows {
    if let Err(e) = row.key.validate() {
      warn!(card = %row.key, "skipping row: {e}");
      summary.skipped += 1;
      continue;
    }
    pending.push(row);
  }

  let batch_size = batch_size.max(1);
  let total_batches = pending.len().div_ceil(batch_size);
  let mut batch_no = 0;
  while !pending.is_empty() {
    batch_no += 1;
    let rest = pending.split_off(batch_size.min(pending.len()));
    let batch = std::mem::replace(&mut pending, rest);
    let len = batch.len();
    let keys: Vec<CardKey> = batch.iter().map(|row| row.key.clone()).collect();
    match store.upsert_population_batch(batch).await {
      Ok(n) => {
        summary.upserted += n;
        written.extend(keys);
      }
      Err(e) => {
        error!(batch = batch_no, of = total_batches, "upsert batch failed: {e}");
        summary.failed += len;
      }
    }
  }

  if with_history {
    summary.snapshotted = record_history(store, &written, batch_size).await?;
  }

  info!(
    upserted = summary.upserted,
    skipped = summary.skipped,
    failed = summary.failed,
    snapshotted = summary.snapshotted,
    "import complete"
  );
  Ok(summary)
}

/// Append history for `keys` only. Cards already snapshotted for their date
/// are skipped.
async fn record_history(
  store: &SqliteStore,
  keys: &BTreeSet<CardKey>,
  batch_size: usize,
) -> anyhow::Result<usize> {
  let mut snapshots = Vec::with_capacity(keys.len());
  for key in keys {
    let Some(record) = store
      .get_population(key)
      .await
      .with_context(|| format!("failed to read back {key}"))?
    else {
      continue;
    };
    if record.population.total_graded > 0 {
      snapshots.push(NewSnapshot::from_record(&record, record.population.scraped_date));
    }
  }

  let mut recorded = 0;
  for chunk in snapshots.chunks(batch_size) {
    match store.insert_snapshots(chunk.to_vec()).await {
      Ok(n) => recorded += n,
      // The chunk was rolled back; retry row by row to keep the new cards.
      Err(StoreError::DuplicateSnapshot { .. }) => {
        for snap in chunk.iter().cloned() {
          match store.insert_snapshot(snap).await {
            Ok(_) => recorded += 1,
            Err(StoreError::DuplicateSnapshot { key, date }) => {
              warn!(%date, card = %key, "history already recorded for this date; skipping");
            }
            Err(e) => return Err(e).context("history insert failed"),
          }
        }
      }
      Err(e) => return Err(e).context("history insert failed"),
    }
  }
  Ok(recorded)
}

// ─── snapshot ────────────────────────────────────────────────────────────────

pub async fn snapshot(store: &SqliteStore, date: NaiveDate) -> anyhow::Result<usize> {
  let n = store
    .snapshot_current(date)
    .await
    .with_context(|| format!("failed to snapshot {date}"))?;
  Ok(n)
}

// ─── show / history ──────────────────────────────────────────────────────────

pub async fn show(store: &SqliteStore, key: &CardKey) -> anyhow::Result<PopulationRecord> {
  store
    .get_population(key)
    .await
    .context("lookup failed")?
    .with_context(|| format!("no population row for {key}"))
}

pub async fn history(store: &SqliteStore, query: &HistoryQuery) -> anyhow::Result<Vec<Snapshot>> {
  store.get_history(query).await.context("history query failed")
}
