//! Error types for `psa-pop-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// One of the identifying columns was empty.
  #[error("card key field `{0}` must not be empty")]
  MissingKeyField(&'static str),

  #[error("invalid gem rate: {0}")]
  InvalidGemRate(String),

  #[error("grade count total overflowed")]
  GradeOverflow,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
