//! Error type for `psa-pop-store-sqlite`.

use chrono::NaiveDate;
use psa_pop_core::card::CardKey;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] psa_pop_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A history row already exists for this card on this date.
  #[error("snapshot for {key} on {date} already exists")]
  DuplicateSnapshot { key: CardKey, date: NaiveDate },

  /// A NOT NULL or CHECK constraint rejected the statement.
  #[error("constraint violation: {0}")]
  ConstraintViolation(String),

  #[error("stored value out of range: {0}")]
  OutOfRange(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
