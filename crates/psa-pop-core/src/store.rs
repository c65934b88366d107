//! The `PopulationStore` trait and supporting query types.
//!
//! The trait is implemented by storage backends (e.g. `psa-pop-store-sqlite`).
//! The CLI depends on this abstraction, not on any concrete backend.

use std::future::Future;

use chrono::NaiveDate;
use serde::Serialize;

use crate::{
  card::{CardKey, NewPopulation, PopulationRecord},
  snapshot::{NewSnapshot, Snapshot},
};

// ─── Query types ─────────────────────────────────────────────────────────────

/// Parameters for [`PopulationStore::find_population`]. Every filter is an
/// exact match on an indexed column; unset filters match everything.
#[derive(Debug, Clone, Default)]
pub struct PopulationQuery {
  pub set_name:     Option<String>,
  pub card_name:    Option<String>,
  pub full_name:    Option<String>,
  pub psa_spec_id:  Option<String>,
  pub release_year: Option<String>,
  pub limit:        Option<usize>,
  pub offset:       Option<usize>,
}

/// Parameters for [`PopulationStore::get_history`].
#[derive(Debug, Clone, Default)]
pub struct HistoryQuery {
  pub set_name:    Option<String>,
  pub card_name:   Option<String>,
  pub card_number: Option<String>,
  pub variant:     Option<String>,
  /// Inclusive lower bound on `snapshot_date`.
  pub from:        Option<NaiveDate>,
  /// Inclusive upper bound on `snapshot_date`.
  pub to:          Option<NaiveDate>,
}

impl HistoryQuery {
  /// Every snapshot of exactly one card variant.
  pub fn for_card(key: &CardKey) -> Self {
    Self {
      set_name:    Some(key.set_name.clone()),
      card_name:   Some(key.card_name.clone()),
      card_number: Some(key.card_number.clone()),
      variant:     Some(key.variant.clone()),
      from:        None,
      to:          None,
    }
  }
}

/// Result of the post-migration verification query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RowCounts {
  pub population: u64,
  pub history:    u64,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a population store backend.
///
/// The current table is upserted in place; the history table is append-only
/// and only ever shrinks through the explicit [`delete_snapshot`] correction
/// path.
///
/// All methods return `Send` futures so the trait can be used from a
/// multi-threaded tokio runtime.
///
/// [`delete_snapshot`]: PopulationStore::delete_snapshot
pub trait PopulationStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Current population ────────────────────────────────────────────────

  /// Insert the row, or overwrite every non-key column of the existing row
  /// with the same [`CardKey`]. `created_at` is preserved and `updated_at`
  /// advances.
  fn upsert_population(
    &self,
    input: NewPopulation,
  ) -> impl Future<Output = Result<PopulationRecord, Self::Error>> + Send + '_;

  /// Upsert every row in one transaction; nothing is written if any row
  /// fails. Returns the number of rows written.
  fn upsert_population_batch(
    &self,
    inputs: Vec<NewPopulation>,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  /// Point lookup by composite key. Returns `None` if not found.
  fn get_population<'a>(
    &'a self,
    key: &'a CardKey,
  ) -> impl Future<Output = Result<Option<PopulationRecord>, Self::Error>> + Send + 'a;

  /// Filtered scan over the current table.
  fn find_population<'a>(
    &'a self,
    query: &'a PopulationQuery,
  ) -> impl Future<Output = Result<Vec<PopulationRecord>, Self::Error>> + Send + 'a;

  // ── History — append-only ─────────────────────────────────────────────

  /// Insert one snapshot. A second snapshot for the same key and date is
  /// rejected and the existing row is left untouched.
  fn insert_snapshot(
    &self,
    input: NewSnapshot,
  ) -> impl Future<Output = Result<Snapshot, Self::Error>> + Send + '_;

  /// Insert many snapshots atomically. Returns the number inserted.
  fn insert_snapshots(
    &self,
    inputs: Vec<NewSnapshot>,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  /// Copy every current row scraped on `date` with a non-zero graded total
  /// into history, dated `date`, in a single transaction.
  fn snapshot_current(
    &self,
    date: NaiveDate,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  /// Remove the snapshot for `key` on `date` so it can be re-posted.
  /// Returns `false` if there was nothing to delete.
  fn delete_snapshot<'a>(
    &'a self,
    key: &'a CardKey,
    date: NaiveDate,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  /// Snapshots matching `query`, oldest first.
  fn get_history<'a>(
    &'a self,
    query: &'a HistoryQuery,
  ) -> impl Future<Output = Result<Vec<Snapshot>, Self::Error>> + Send + 'a;

  // ── Diagnostics ───────────────────────────────────────────────────────

  /// Row counts for both tables.
  fn row_counts(&self) -> impl Future<Output = Result<RowCounts, Self::Error>> + Send + '_;
}
