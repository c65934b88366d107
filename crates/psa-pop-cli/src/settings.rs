//! Layered CLI configuration: optional TOML file, then `PSA_POP_*`
//! environment variables, then command-line flags.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde::Deserialize;

/// Rows per upsert transaction when importing.
pub const DEFAULT_BATCH_SIZE: usize = 500;

#[derive(Debug, Clone, Deserialize)]
pub struct CliConfig {
  #[serde(default = "default_database_path")]
  pub database_path: PathBuf,
  #[serde(default = "default_batch_size")]
  pub batch_size:    usize,
}

fn default_database_path() -> PathBuf { PathBuf::from("psa_pop.sqlite3") }

fn default_batch_size() -> usize { DEFAULT_BATCH_SIZE }

impl CliConfig {
  /// Read `path` (if it exists) and the environment.
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    let settings = config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(config::Environment::with_prefix("PSA_POP"))
      .build()
      .with_context(|| format!("failed to read config file {}", path.display()))?;

    let mut cfg: CliConfig = settings
      .try_deserialize()
      .context("failed to deserialise CliConfig")?;
    cfg.database_path = expand_tilde(&cfg.database_path);
    if cfg.batch_size == 0 {
      anyhow::bail!("batch_size must be at least 1");
    }
    Ok(cfg)
  }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
