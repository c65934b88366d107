//! Dated population snapshots used for trend analysis.
//!
//! History rows are append-only: at most one snapshot exists per card key and
//! date, and a conflicting insert is rejected rather than merged.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  card::{CardKey, PopulationRecord},
  grade::GemRate,
};

/// Input to [`PopulationStore::insert_snapshot`](crate::store::PopulationStore::insert_snapshot).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSnapshot {
  #[serde(flatten)]
  pub key:           CardKey,
  pub psa_spec_id:   Option<String>,
  pub psa_8:         u32,
  pub psa_9:         u32,
  pub psa_10:        u32,
  pub total_graded:  u32,
  pub gem_rate:      GemRate,
  pub snapshot_date: NaiveDate,
}

impl NewSnapshot {
  /// Project the trend columns of a current row onto `snapshot_date`.
  pub fn from_record(record: &PopulationRecord, snapshot_date: NaiveDate) -> Self {
    let pop = &record.population;
    Self {
      key: pop.key.clone(),
      psa_spec_id: pop.psa_spec_id.clone(),
      psa_8: pop.grades.psa_8,
      psa_9: pop.grades.psa_9,
      psa_10: pop.grades.psa_10,
      total_graded: pop.total_graded,
      gem_rate: pop.gem_rate,
      snapshot_date,
    }
  }
}

/// A persisted history row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
  pub id:         i64,
  #[serde(flatten)]
  pub data:       NewSnapshot,
  pub created_at: DateTime<Utc>,
}

impl Snapshot {
  pub fn key(&self) -> &CardKey { &self.data.key }
}
