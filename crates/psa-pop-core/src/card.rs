//! Card identity and the current-state population record.
//!
//! A physical card variant is identified by `(set_name, card_number,
//! card_name, variant)`. Exactly one current [`PopulationRecord`] exists per
//! key; every refresh overwrites it in place.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  grade::{GemRate, GradeCounts},
};

// ─── CardKey ─────────────────────────────────────────────────────────────────

/// The composite key shared by the current and history tables.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CardKey {
  pub set_name:    String,
  pub card_number: String,
  pub card_name:   String,
  /// Empty when the card has no variant. Never NULL, so that the uniqueness
  /// constraint covers variant-less cards too.
  #[serde(default)]
  pub variant:     String,
}

impl CardKey {
  pub fn new(
    set_name: impl Into<String>,
    card_number: impl Into<String>,
    card_name: impl Into<String>,
    variant: impl Into<String>,
  ) -> Self {
    Self {
      set_name:    set_name.into(),
      card_number: card_number.into(),
      card_name:   card_name.into(),
      variant:     variant.into(),
    }
  }

  /// Reject keys whose identifying fields are blank.
  pub fn validate(&self) -> Result<()> {
    if self.set_name.trim().is_empty() {
      return Err(Error::MissingKeyField("set_name"));
    }
    if self.card_number.trim().is_empty() {
      return Err(Error::MissingKeyField("card_number"));
    }
    if self.card_name.trim().is_empty() {
      return Err(Error::MissingKeyField("card_name"));
    }
    Ok(())
  }

  /// Display name: `"Charizard (Shadowless)"`, or the bare card name.
  pub fn full_name(&self) -> String {
    if self.variant.is_empty() {
      self.card_name.clone()
    } else {
      format!("{} ({})", self.card_name, self.variant)
    }
  }
}

impl fmt::Display for CardKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} #{} {}", self.set_name, self.card_number, self.full_name())
  }
}

// ─── Population ──────────────────────────────────────────────────────────────

/// Input to [`PopulationStore::upsert_population`](crate::store::PopulationStore::upsert_population).
///
/// Field layout matches the flat JSON rows the loader posts, so a payload
/// can be deserialized directly. Anything omitted is filled in by
/// [`NewPopulation::resolve`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPopulation {
  #[serde(flatten)]
  pub key:          CardKey,
  #[serde(default)]
  pub release_year: Option<String>,
  #[serde(default)]
  pub full_name:    Option<String>,
  #[serde(default)]
  pub psa_spec_id:  Option<String>,
  #[serde(flatten)]
  pub grades:       GradeCounts,
  /// Defaults to the sum of `grades`.
  #[serde(default)]
  pub total_graded: Option<u32>,
  /// Defaults to `psa_10 / total_graded`.
  #[serde(default)]
  pub gem_rate:     Option<GemRate>,
  /// Defaults to the date of the write.
  #[serde(default)]
  pub scraped_date: Option<NaiveDate>,
}

impl NewPopulation {
  pub fn new(key: CardKey, grades: GradeCounts) -> Self {
    Self {
      key,
      release_year: None,
      full_name: None,
      psa_spec_id: None,
      grades,
      total_graded: None,
      gem_rate: None,
      scraped_date: None,
    }
  }

  /// Validate the key and derive every omitted field. Blank optional
  /// strings are normalised to `None`.
  pub fn resolve(self, today: NaiveDate) -> Result<Population> {
    self.key.validate()?;

    let total_graded = match self.total_graded {
      Some(t) => t,
      None => self.grades.total()?,
    };
    let gem_rate = match self.gem_rate {
      Some(r) => r,
      None => GemRate::from_counts(self.grades.psa_10, total_graded)?,
    };
    let full_name = non_blank(self.full_name).unwrap_or_else(|| self.key.full_name());

    Ok(Population {
      key: self.key,
      release_year: non_blank(self.release_year),
      full_name,
      psa_spec_id: non_blank(self.psa_spec_id),
      grades: self.grades,
      total_graded,
      gem_rate,
      scraped_date: self.scraped_date.unwrap_or(today),
    })
  }
}

fn non_blank(s: Option<String>) -> Option<String> {
  s.filter(|s| !s.trim().is_empty())
}

/// A fully-resolved population row, minus the columns the store assigns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Population {
  #[serde(flatten)]
  pub key:          CardKey,
  pub release_year: Option<String>,
  pub full_name:    String,
  pub psa_spec_id:  Option<String>,
  #[serde(flatten)]
  pub grades:       GradeCounts,
  pub total_graded: u32,
  pub gem_rate:     GemRate,
  pub scraped_date: NaiveDate,
}

/// The persisted current-state row for one card variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PopulationRecord {
  pub id:         i64,
  #[serde(flatten)]
  pub population: Population,
  pub created_at: DateTime<Utc>,
  /// Advanced by the store on every update; callers cannot set it.
  pub updated_at: DateTime<Utc>,
}

impl PopulationRecord {
  pub fn key(&self) -> &CardKey { &self.population.key }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn today() -> NaiveDate { NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() }

  fn charizard() -> CardKey { CardKey::new("Base Set", "4", "Charizard", "") }

  #[test]
  fn full_name_includes_variant_when_present() {
    assert_eq!(charizard().full_name(), "Charizard");
    let shadowless = CardKey::new("Base Set", "4", "Charizard", "Shadowless");
    assert_eq!(shadowless.full_name(), "Charizard (Shadowless)");
    assert_eq!(shadowless.to_string(), "Base Set #4 Charizard (Shadowless)");
  }

  #[test]
  fn validate_rejects_blank_key_fields() {
    let err = CardKey::new("", "4", "Charizard", "").validate().unwrap_err();
    assert!(matches!(err, Error::MissingKeyField("set_name")));
    let err = CardKey::new("Base Set", " ", "Charizard", "").validate().unwrap_err();
    assert!(matches!(err, Error::MissingKeyField("card_number")));
    let err = CardKey::new("Base Set", "4", "", "").validate().unwrap_err();
    assert!(matches!(err, Error::MissingKeyField("card_name")));
  }

  #[test]
  fn resolve_derives_totals_and_gem_rate() {
    let grades = GradeCounts { psa_9: 500, psa_10: 120, ..Default::default() };
    let pop = NewPopulation::new(charizard(), grades).resolve(today()).unwrap();

    assert_eq!(pop.total_graded, 620);
    assert_eq!(pop.gem_rate.to_string(), "19.35");
    assert_eq!(pop.full_name, "Charizard");
    assert_eq!(pop.scraped_date, today());
    assert_eq!(pop.release_year, None);
  }

  #[test]
  fn resolve_keeps_caller_supplied_values() {
    let mut input = NewPopulation::new(charizard(), GradeCounts {
      psa_10: 10,
      ..Default::default()
    });
    input.total_graded = Some(40);
    input.gem_rate = Some(GemRate::from_hundredths(2_600).unwrap());
    input.full_name = Some("Charizard Holo".into());
    input.psa_spec_id = Some(String::new());

    let pop = input.resolve(today()).unwrap();
    assert_eq!(pop.total_graded, 40);
    assert_eq!(pop.gem_rate.to_string(), "26.00");
    assert_eq!(pop.full_name, "Charizard Holo");
    assert_eq!(pop.psa_spec_id, None);
  }

  #[test]
  fn deserializes_flat_loader_row() {
    let row = r#"{
      "set_name": "Base Set",
      "release_year": "1999",
      "card_number": "4",
      "card_name": "Charizard",
      "variant": "",
      "psa_spec_id": "544027",
      "psa_9": 500,
      "psa_10": 120,
      "total_graded": 620,
      "gem_rate": 19.35,
      "scraped_date": "2024-01-01"
    }"#;
    let input: NewPopulation = serde_json::from_str(row).unwrap();
    assert_eq!(input.key, charizard());
    assert_eq!(input.grades.psa_10, 120);
    assert_eq!(input.grades.psa_8, 0);
    assert_eq!(input.total_graded, Some(620));
    assert_eq!(input.gem_rate.map(GemRate::hundredths), Some(1935));
    assert_eq!(input.scraped_date, Some(today()));
  }
}
