//! Grade levels, per-grade population counts, and the gem rate.
//!
//! PSA reports a count for authentic-only cards plus eleven numeric grades
//! (1 through 10, including the half grade 1.5). Counts are never negative,
//! so they are modelled as `u32`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

// ─── Grade ───────────────────────────────────────────────────────────────────

/// A single population column, in the order PSA lists them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Grade {
  Auth,
  Psa1,
  Psa1_5,
  Psa2,
  Psa3,
  Psa4,
  Psa5,
  Psa6,
  Psa7,
  Psa8,
  Psa9,
  Psa10,
}

impl Grade {
  pub const ALL: [Grade; 12] = [
    Grade::Auth,
    Grade::Psa1,
    Grade::Psa1_5,
    Grade::Psa2,
    Grade::Psa3,
    Grade::Psa4,
    Grade::Psa5,
    Grade::Psa6,
    Grade::Psa7,
    Grade::Psa8,
    Grade::Psa9,
    Grade::Psa10,
  ];

  /// The column this grade is stored in.
  pub fn column(self) -> &'static str {
    match self {
      Grade::Auth => "auth",
      Grade::Psa1 => "psa_1",
      Grade::Psa1_5 => "psa_1_5",
      Grade::Psa2 => "psa_2",
      Grade::Psa3 => "psa_3",
      Grade::Psa4 => "psa_4",
      Grade::Psa5 => "psa_5",
      Grade::Psa6 => "psa_6",
      Grade::Psa7 => "psa_7",
      Grade::Psa8 => "psa_8",
      Grade::Psa9 => "psa_9",
      Grade::Psa10 => "psa_10",
    }
  }
}

// ─── GradeCounts ─────────────────────────────────────────────────────────────

/// Population at every grade level. Omitted fields deserialize as zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GradeCounts {
  pub auth:    u32,
  pub psa_1:   u32,
  pub psa_1_5: u32,
  pub psa_2:   u32,
  pub psa_3:   u32,
  pub psa_4:   u32,
  pub psa_5:   u32,
  pub psa_6:   u32,
  pub psa_7:   u32,
  pub psa_8:   u32,
  pub psa_9:   u32,
  pub psa_10:  u32,
}

impl GradeCounts {
  pub fn get(&self, grade: Grade) -> u32 {
    match grade {
      Grade::Auth => self.auth,
      Grade::Psa1 => self.psa_1,
      Grade::Psa1_5 => self.psa_1_5,
      Grade::Psa2 => self.psa_2,
      Grade::Psa3 => self.psa_3,
      Grade::Psa4 => self.psa_4,
      Grade::Psa5 => self.psa_5,
      Grade::Psa6 => self.psa_6,
      Grade::Psa7 => self.psa_7,
      Grade::Psa8 => self.psa_8,
      Grade::Psa9 => self.psa_9,
      Grade::Psa10 => self.psa_10,
    }
  }

  /// Sum of every column, including authentic-only copies.
  pub fn total(&self) -> Result<u32> {
    Grade::ALL
      .iter()
      .try_fold(0u32, |acc, g| acc.checked_add(self.get(*g)))
      .ok_or(Error::GradeOverflow)
  }

  /// Counts in column order, matching [`Grade::ALL`].
  pub fn to_array(&self) -> [u32; 12] { Grade::ALL.map(|g| self.get(g)) }
}

// ─── GemRate ─────────────────────────────────────────────────────────────────

/// Share of graded copies that reached PSA 10, as a percentage with two
/// decimal places. Held as hundredths of a percent (`0..=10000`).
#[derive(
  Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "f64", into = "f64")]
pub struct GemRate(u16);

impl GemRate {
  pub const ZERO: GemRate = GemRate(0);
  pub const MAX_HUNDREDTHS: u16 = 10_000;

  pub fn from_hundredths(hundredths: u16) -> Result<Self> {
    if hundredths > Self::MAX_HUNDREDTHS {
      return Err(Error::InvalidGemRate(format!(
        "{hundredths} hundredths exceeds 100%"
      )));
    }
    Ok(Self(hundredths))
  }

  /// Compute `psa_10 / total * 100`, rounded half up to two decimals.
  /// A zero total yields 0.00.
  pub fn from_counts(psa_10: u32, total: u32) -> Result<Self> {
    if total == 0 {
      return Ok(Self::ZERO);
    }
    if psa_10 > total {
      return Err(Error::InvalidGemRate(format!(
        "psa_10 ({psa_10}) exceeds total graded ({total})"
      )));
    }
    let total = u64::from(total);
    let scaled = (u64::from(psa_10) * 10_000 + total / 2) / total;
    // psa_10 <= total bounds this to 10_000.
    Self::from_hundredths(scaled as u16)
  }

  pub fn hundredths(self) -> u16 { self.0 }

  pub fn as_percent(self) -> f64 { f64::from(self.0) / 100.0 }
}

impl TryFrom<f64> for GemRate {
  type Error = Error;

  fn try_from(percent: f64) -> Result<Self> {
    if !percent.is_finite() || !(0.0..=100.0).contains(&percent) {
      return Err(Error::InvalidGemRate(format!(
        "{percent} is not a percentage between 0 and 100"
      )));
    }
    Self::from_hundredths((percent * 100.0).round() as u16)
  }
}

impl From<GemRate> for f64 {
  fn from(rate: GemRate) -> f64 { rate.as_percent() }
}

impl fmt::Display for GemRate {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
  }
}
