//! Encoding and decoding helpers between Rust domain types and the plain-text
//! and integer representations stored in SQLite columns.
//!
//! Timestamps are RFC 3339 strings, dates are `YYYY-MM-DD`, and the gem rate
//! is an integer count of hundredths of a percent.

use chrono::{DateTime, NaiveDate, Utc};
use psa_pop_core::{
  card::{CardKey, Population, PopulationRecord},
  grade::{GemRate, GradeCounts},
  snapshot::{NewSnapshot, Snapshot},
};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

// ─── NaiveDate ───────────────────────────────────────────────────────────────

pub fn encode_date(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d")
    .map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

// ─── GemRate ─────────────────────────────────────────────────────────────────

pub fn encode_gem_rate(r: GemRate) -> i64 { i64::from(r.hundredths()) }

pub fn decode_gem_rate(v: i64) -> Result<GemRate> {
  let hundredths = u16::try_from(v)
    .map_err(|_| Error::OutOfRange(format!("gem_rate {v}")))?;
  Ok(GemRate::from_hundredths(hundredths)?)
}

// ─── Column lists ────────────────────────────────────────────────────────────

/// Every `psa_population` column, in the order [`RawPopulation::from_row`]
/// reads them.
pub const POPULATION_COLUMNS: &str = "
  id, set_name, release_year, card_number, card_name, variant,
  full_name, psa_spec_id,
  auth, psa_1, psa_1_5, psa_2, psa_3, psa_4, psa_5, psa_6, psa_7,
  psa_8, psa_9, psa_10,
  total_graded, gem_rate, scraped_date, created_at, updated_at";

/// Every `psa_pop_history` column, in the order [`RawSnapshot::from_row`]
/// reads them.
pub const HISTORY_COLUMNS: &str = "
  id, set_name, card_number, card_name, variant, psa_spec_id,
  psa_8, psa_9, psa_10, total_graded, gem_rate, snapshot_date, created_at";

// ─── Write-side row types ────────────────────────────────────────────────────

/// Owned, SQL-ready values for one `psa_population` upsert. Built on the
/// async side and moved into the connection closure.
pub struct PopulationParams {
  pub set_name:     String,
  pub release_year: Option<String>,
  pub card_number:  String,
  pub card_name:    String,
  pub variant:      String,
  pub full_name:    String,
  pub psa_spec_id:  Option<String>,
  pub grades:       [u32; 12],
  pub total_graded: u32,
  pub gem_rate:     i64,
  pub scraped_date: String,
}

impl PopulationParams {
  pub fn new(pop: Population) -> Self {
    let grades = pop.grades.to_array();
    Self {
      set_name: pop.key.set_name,
      release_year: pop.release_year,
      card_number: pop.key.card_number,
      card_name: pop.key.card_name,
      variant: pop.key.variant,
      full_name: pop.full_name,
      psa_spec_id: pop.psa_spec_id,
      grades,
      total_graded: pop.total_graded,
      gem_rate: encode_gem_rate(pop.gem_rate),
      scraped_date: encode_date(pop.scraped_date),
    }
  }
}

/// Owned, SQL-ready values for one `psa_pop_history` insert.
pub struct SnapshotParams {
  pub set_name:      String,
  pub card_number:   String,
  pub card_name:     String,
  pub variant:       String,
  pub psa_spec_id:   Option<String>,
  pub psa_8:         u32,
  pub psa_9:         u32,
  pub psa_10:        u32,
  pub total_graded:  u32,
  pub gem_rate:      i64,
  pub snapshot_date: String,
}

impl SnapshotParams {
  pub fn new(s: NewSnapshot) -> Self {
    Self {
      set_name:      s.key.set_name,
      card_number:   s.key.card_number,
      card_name:     s.key.card_name,
      variant:       s.key.variant,
      psa_spec_id:   s.psa_spec_id,
      psa_8:         s.psa_8,
      psa_9:         s.psa_9,
      psa_10:        s.psa_10,
      total_graded:  s.total_graded,
      gem_rate:      encode_gem_rate(s.gem_rate),
      snapshot_date: encode_date(s.snapshot_date),
    }
  }
}

// ─── Read-side row types ─────────────────────────────────────────────────────

/// Raw values read directly from a `psa_population` row.
pub struct RawPopulation {
  pub id:           i64,
  pub set_name:     String,
  pub release_year: Option<String>,
  pub card_number:  String,
  pub card_name:    String,
  pub variant:      String,
  pub full_name:    Option<String>,
  pub psa_spec_id:  Option<String>,
  pub grades:       [u32; 12],
  pub total_graded: u32,
  pub gem_rate:     i64,
  pub scraped_date: String,
  pub created_at:   String,
  pub updated_at:   String,
}

impl RawPopulation {
  /// Map a row selected with [`POPULATION_COLUMNS`].
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    let mut grades = [0u32; 12];
    for (i, slot) in grades.iter_mut().enumerate() {
      *slot = row.get(8 + i)?;
    }
    Ok(Self {
      id:           row.get(0)?,
      set_name:     row.get(1)?,
      release_year: row.get(2)?,
      card_number:  row.get(3)?,
      card_name:    row.get(4)?,
      variant:      row.get(5)?,
      full_name:    row.get(6)?,
      psa_spec_id:  row.get(7)?,
      grades,
      total_graded: row.get(20)?,
      gem_rate:     row.get(21)?,
      scraped_date: row.get(22)?,
      created_at:   row.get(23)?,
      updated_at:   row.get(24)?,
    })
  }

  pub fn into_record(self) -> Result<PopulationRecord> {
    let key = CardKey {
      set_name:    self.set_name,
      card_number: self.card_number,
      card_name:   self.card_name,
      variant:     self.variant,
    };
    let [auth, psa_1, psa_1_5, psa_2, psa_3, psa_4, psa_5, psa_6, psa_7, psa_8, psa_9, psa_10] =
      self.grades;
    let full_name = self.full_name.unwrap_or_else(|| key.full_name());

    Ok(PopulationRecord {
      id:         self.id,
      population: Population {
        key,
        release_year: self.release_year,
        full_name,
        psa_spec_id: self.psa_spec_id,
        grades: GradeCounts {
          auth,
          psa_1,
          psa_1_5,
          psa_2,
          psa_3,
          psa_4,
          psa_5,
          psa_6,
          psa_7,
          psa_8,
          psa_9,
          psa_10,
        },
        total_graded: self.total_graded,
        gem_rate: decode_gem_rate(self.gem_rate)?,
        scraped_date: decode_date(&self.scraped_date)?,
      },
      created_at: decode_dt(&self.created_at)?,
      updated_at: decode_dt(&self.updated_at)?,
    })
  }
}

/// Raw values read directly from a `psa_pop_history` row.
pub struct RawSnapshot {
  pub id:            i64,
  pub set_name:      String,
  pub card_number:   String,
  pub card_name:     String,
  pub variant:       String,
  pub psa_spec_id:   Option<String>,
  pub psa_8:         u32,
  pub psa_9:         u32,
  pub psa_10:        u32,
  pub total_graded:  u32,
  pub gem_rate:      i64,
  pub snapshot_date: String,
  pub created_at:    String,
}

impl RawSnapshot {
  /// Map a row selected with [`HISTORY_COLUMNS`].
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:            row.get(0)?,
      set_name:      row.get(1)?,
      card_number:   row.get(2)?,
      card_name:     row.get(3)?,
      variant:       row.get(4)?,
      psa_spec_id:   row.get(5)?,
      psa_8:         row.get(6)?,
      psa_9:         row.get(7)?,
      psa_10:        row.get(8)?,
      total_graded:  row.get(9)?,
      gem_rate:      row.get(10)?,
      snapshot_date: row.get(11)?,
      created_at:    row.get(12)?,
    })
  }

  pub fn into_snapshot(self) -> Result<Snapshot> {
    Ok(Snapshot {
      id:         self.id,
      data:       NewSnapshot {
        key:           CardKey {
          set_name:    self.set_name,
          card_number: self.card_number,
          card_name:   self.card_name,
          variant:     self.variant,
        },
        psa_spec_id:   self.psa_spec_id,
        psa_8:         self.psa_8,
        psa_9:         self.psa_9,
        psa_10:        self.psa_10,
        total_graded:  self.total_graded,
        gem_rate:      decode_gem_rate(self.gem_rate)?,
        snapshot_date: decode_date(&self.snapshot_date)?,
      },
      created_at: decode_dt(&self.created_at)?,
    })
  }
}
