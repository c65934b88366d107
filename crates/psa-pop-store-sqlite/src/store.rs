//! The SQLite implementation of [`PopulationStore`].

use std::{os::raw::c_int, path::Path};

use chrono::{NaiveDate, Utc};
use rusqlite::{OptionalExtension as _, TransactionBehavior, ffi, types::Value};
use tracing::{debug, info};

use psa_pop_core::{
  card::{CardKey, NewPopulation, PopulationRecord},
  snapshot::{NewSnapshot, Snapshot},
  store::{HistoryQuery, PopulationQuery, PopulationStore, RowCounts},
};

use crate::{
  Error, Result,
  encode::{
    HISTORY_COLUMNS, POPULATION_COLUMNS, PopulationParams, RawPopulation, RawSnapshot,
    SnapshotParams, encode_date,
  },
  schema::{SCHEMA, VERIFY_COUNTS},
};

// ─── SQL ─────────────────────────────────────────────────────────────────────

const UPSERT_POPULATION: &str = "
  INSERT INTO psa_population (
    set_name, release_year, card_number, card_name, variant,
    full_name, psa_spec_id,
    auth, psa_1, psa_1_5, psa_2, psa_3, psa_4, psa_5, psa_6, psa_7,
    psa_8, psa_9, psa_10,
    total_graded, gem_rate, scraped_date
  ) VALUES (
    ?1, ?2, ?3, ?4, ?5, ?6, ?7,
    ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19,
    ?20, ?21, ?22
  )
  ON CONFLICT (set_name, card_number, card_name, variant) DO UPDATE SET
    release_year = excluded.release_year,
    full_name    = excluded.full_name,
    psa_spec_id  = excluded.psa_spec_id,
    auth         = excluded.auth,
    psa_1        = excluded.psa_1,
    psa_1_5      = excluded.psa_1_5,
    psa_2        = excluded.psa_2,
    psa_3        = excluded.psa_3,
    psa_4        = excluded.psa_4,
    psa_5        = excluded.psa_5,
    psa_6        = excluded.psa_6,
    psa_7        = excluded.psa_7,
    psa_8        = excluded.psa_8,
    psa_9        = excluded.psa_9,
    psa_10       = excluded.psa_10,
    total_graded = excluded.total_graded,
    gem_rate     = excluded.gem_rate,
    scraped_date = excluded.scraped_date";

const INSERT_SNAPSHOT: &str = "
  INSERT INTO psa_pop_history (
    set_name, card_number, card_name, variant, psa_spec_id,
    psa_8, psa_9, psa_10, total_graded, gem_rate, snapshot_date
  ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)";

/// Any current row that would collide with an existing snapshot on `?1`.
const FIRST_SNAPSHOT_CONFLICT: &str = "
  SELECT p.set_name, p.card_number, p.card_name, p.variant
  FROM psa_population p
  JOIN psa_pop_history h
    ON  h.set_name      = p.set_name
    AND h.card_number   = p.card_number
    AND h.card_name     = p.card_name
    AND h.variant       = p.variant
    AND h.snapshot_date = ?1
  WHERE p.scraped_date = ?1
    AND p.total_graded > 0
  LIMIT 1";

const SNAPSHOT_CURRENT: &str = "
  INSERT INTO psa_pop_history (
    set_name, card_number, card_name, variant, psa_spec_id,
    psa_8, psa_9, psa_10, total_graded, gem_rate, snapshot_date
  )
  SELECT set_name, card_number, card_name, variant, psa_spec_id,
         psa_8, psa_9, psa_10, total_graded, gem_rate, ?1
  FROM psa_population
  WHERE scraped_date = ?1
    AND total_graded > 0
  ORDER BY set_name, card_number, card_name, variant";

// ─── Connection-side helpers ─────────────────────────────────────────────────

fn upsert_row(conn: &rusqlite::Connection, p: &PopulationParams) -> rusqlite::Result<usize> {
  let g = &p.grades;
  conn.prepare_cached(UPSERT_POPULATION)?.execute(rusqlite::params![
    p.set_name,
    p.release_year,
    p.card_number,
    p.card_name,
    p.variant,
    p.full_name,
    p.psa_spec_id,
    g[0],
    g[1],
    g[2],
    g[3],
    g[4],
    g[5],
    g[6],
    g[7],
    g[8],
    g[9],
    g[10],
    g[11],
    p.total_graded,
    p.gem_rate,
    p.scraped_date,
  ])
}

fn select_population(
  conn: &rusqlite::Connection,
  set_name: &str,
  card_number: &str,
  card_name: &str,
  variant: &str,
) -> rusqlite::Result<RawPopulation> {
  conn.query_row(
    &format!(
      "SELECT {POPULATION_COLUMNS} FROM psa_population
       WHERE set_name = ?1 AND card_number = ?2 AND card_name = ?3 AND variant = ?4"
    ),
    rusqlite::params![set_name, card_number, card_name, variant],
    RawPopulation::from_row,
  )
}

/// Insert one history row and return its rowid.
fn insert_snapshot_row(conn: &rusqlite::Connection, p: &SnapshotParams) -> rusqlite::Result<i64> {
  conn.prepare_cached(INSERT_SNAPSHOT)?.execute(rusqlite::params![
    p.set_name,
    p.card_number,
    p.card_name,
    p.variant,
    p.psa_spec_id,
    p.psa_8,
    p.psa_9,
    p.psa_10,
    p.total_graded,
    p.gem_rate,
    p.snapshot_date,
  ])?;
  Ok(conn.last_insert_rowid())
}

fn extended_code(err: &rusqlite::Error) -> Option<c_int> {
  match err {
    rusqlite::Error::SqliteFailure(e, _) => Some(e.extended_code),
    _ => None,
  }
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
  extended_code(err) == Some(ffi::SQLITE_CONSTRAINT_UNIQUE)
}

/// Surface CHECK / NOT NULL failures as [`Error::ConstraintViolation`].
pub(crate) fn map_db_error(err: tokio_rusqlite::Error) -> Error {
  if let tokio_rusqlite::Error::Rusqlite(inner) = &err {
    let code = extended_code(inner);
    if code == Some(ffi::SQLITE_CONSTRAINT_CHECK) || code == Some(ffi::SQLITE_CONSTRAINT_NOTNULL) {
      return Error::ConstraintViolation(inner.to_string());
    }
  }
  Error::Database(err)
}

fn today() -> NaiveDate { Utc::now().date_naive() }

fn limit_value(limit: Option<usize>) -> i64 {
  // SQLite treats a negative LIMIT as "no limit".
  limit.and_then(|l| i64::try_from(l).ok()).unwrap_or(-1)
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A PSA population store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and apply the schema.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.apply_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, mainly for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.apply_schema().await?;
    Ok(store)
  }

  /// Apply the full schema. Safe to call against an initialised database.
  pub async fn apply_schema(&self) -> Result<()> {
    debug!("applying psa population schema");
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// The schema version recorded in `PRAGMA user_version`.
  pub async fn schema_version(&self) -> Result<i64> {
    let version = self
      .conn
      .call(|conn| Ok(conn.query_row("PRAGMA user_version", [], |r| r.get(0))?))
      .await?;
    Ok(version)
  }
}

// ─── PopulationStore impl ────────────────────────────────────────────────────

impl PopulationStore for SqliteStore {
  type Error = Error;

  // ── Current population ────────────────────────────────────────────────────

  async fn upsert_population(&self, input: NewPopulation) -> Result<PopulationRecord> {
    let params = PopulationParams::new(input.resolve(today())?);

    let raw = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        upsert_row(&tx, &params)?;
        // Re-read so the returned row carries the trigger's updated_at.
        let raw = select_population(
          &tx,
          &params.set_name,
          &params.card_number,
          &params.card_name,
          &params.variant,
        )?;
        tx.commit()?;
        Ok(raw)
      })
      .await
      .map_err(map_db_error)?;

    raw.into_record()
  }

  async fn upsert_population_batch(&self, inputs: Vec<NewPopulation>) -> Result<usize> {
    let today = today();
    let rows = inputs
      .into_iter()
      .map(|input| input.resolve(today).map(PopulationParams::new))
      .collect::<psa_pop_core::Result<Vec<_>>>()?;

    if rows.is_empty() {
      return Ok(0);
    }

    let written = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        for p in &rows {
          upsert_row(&tx, p)?;
        }
        tx.commit()?;
        Ok(rows.len())
      })
      .await
      .map_err(map_db_error)?;

    info!(rows = written, "upserted population batch");
    Ok(written)
  }

  async fn get_population(&self, key: &CardKey) -> Result<Option<PopulationRecord>> {
    let key = key.clone();

    let raw: Option<RawPopulation> = self
      .conn
      .call(move |conn| {
        Ok(
          select_population(
            conn,
            &key.set_name,
            &key.card_number,
            &key.card_name,
            &key.variant,
          )
          .optional()?,
        )
      })
      .await?;

    raw.map(RawPopulation::into_record).transpose()
  }

  async fn find_population(&self, query: &PopulationQuery) -> Result<Vec<PopulationRecord>> {
    // Build WHERE clause dynamically; values are bound positionally.
    let mut conds: Vec<&'static str> = vec![];
    let mut values: Vec<Value> = vec![];
    let filters = [
      ("set_name = ?", &query.set_name),
      ("card_name = ?", &query.card_name),
      ("full_name = ?", &query.full_name),
      ("psa_spec_id = ?", &query.psa_spec_id),
      ("release_year = ?", &query.release_year),
    ];
    for (cond, value) in filters {
      if let Some(v) = value {
        conds.push(cond);
        values.push(Value::Text(v.clone()));
      }
    }
    values.push(Value::Integer(limit_value(query.limit)));
    values.push(Value::Integer(query.offset.unwrap_or(0) as i64));

    let where_clause = if conds.is_empty() {
      String::new()
    } else {
      format!("WHERE {}", conds.join(" AND "))
    };
    let sql = format!(
      "SELECT {POPULATION_COLUMNS} FROM psa_population
       {where_clause}
       ORDER BY set_name, card_number, card_name, variant
       LIMIT ? OFFSET ?"
    );

    let raws: Vec<RawPopulation> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(values), RawPopulation::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawPopulation::into_record).collect()
  }

  // ── History — append-only ─────────────────────────────────────────────────

  async fn insert_snapshot(&self, input: NewSnapshot) -> Result<Snapshot> {
    input.key.validate()?;
    let key = input.key.clone();
    let date = input.snapshot_date;
    let params = SnapshotParams::new(input);

    let raw: Option<RawSnapshot> = self
      .conn
      .call(move |conn| match insert_snapshot_row(conn, &params) {
        Ok(id) => Ok(Some(conn.query_row(
          &format!("SELECT {HISTORY_COLUMNS} FROM psa_pop_history WHERE id = ?1"),
          rusqlite::params![id],
          RawSnapshot::from_row,
        )?)),
        Err(e) if is_unique_violation(&e) => Ok(None),
        Err(e) => Err(e.into()),
      })
      .await
      .map_err(map_db_error)?;

    match raw {
      Some(raw) => raw.into_snapshot(),
      None => Err(Error::DuplicateSnapshot { key, date }),
    }
  }

  async fn insert_snapshots(&self, inputs: Vec<NewSnapshot>) -> Result<usize> {
    let mut ids = Vec::with_capacity(inputs.len());
    let mut rows = Vec::with_capacity(inputs.len());
    for input in inputs {
      input.key.validate()?;
      ids.push((input.key.clone(), input.snapshot_date));
      rows.push(SnapshotParams::new(input));
    }

    if rows.is_empty() {
      return Ok(0);
    }

    // Ok(Err(i)): row `i` collided; the transaction is dropped uncommitted.
    let outcome: std::result::Result<usize, usize> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        for (i, p) in rows.iter().enumerate() {
          match insert_snapshot_row(&tx, p) {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => return Ok(Err(i)),
            Err(e) => return Err(e.into()),
          }
        }
        tx.commit()?;
        Ok(Ok(rows.len()))
      })
      .await
      .map_err(map_db_error)?;

    match outcome {
      Ok(n) => {
        info!(rows = n, "inserted history snapshots");
        Ok(n)
      }
      Err(i) => {
        let (key, date) = ids.swap_remove(i);
        Err(Error::DuplicateSnapshot { key, date })
      }
    }
  }

  async fn snapshot_current(&self, date: NaiveDate) -> Result<usize> {
    let date_str = encode_date(date);

    let outcome: std::result::Result<usize, CardKey> = self
      .conn
      .call(move |conn| {
        // IMMEDIATE so the conflict check and the copy see the same rows.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let conflict = tx
          .query_row(FIRST_SNAPSHOT_CONFLICT, rusqlite::params![date_str], |row| {
            Ok(CardKey {
              set_name:    row.get(0)?,
              card_number: row.get(1)?,
              card_name:   row.get(2)?,
              variant:     row.get(3)?,
            })
          })
          .optional()?;
        if let Some(key) = conflict {
          return Ok(Err(key));
        }
        let copied = tx.execute(SNAPSHOT_CURRENT, rusqlite::params![date_str])?;
        tx.commit()?;
        Ok(Ok(copied))
      })
      .await
      .map_err(map_db_error)?;

    match outcome {
      Ok(n) => {
        info!(rows = n, %date, "snapshotted current population");
        Ok(n)
      }
      Err(key) => Err(Error::DuplicateSnapshot { key, date }),
    }
  }

  async fn delete_snapshot(&self, key: &CardKey, date: NaiveDate) -> Result<bool> {
    let key = key.clone();
    let date_str = encode_date(date);

    let deleted = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM psa_pop_history
           WHERE set_name = ?1 AND card_number = ?2 AND card_name = ?3
             AND variant = ?4 AND snapshot_date = ?5",
          rusqlite::params![
            key.set_name,
            key.card_number,
            key.card_name,
            key.variant,
            date_str
          ],
        )?)
      })
      .await?;

    Ok(deleted > 0)
  }

  async fn get_history(&self, query: &HistoryQuery) -> Result<Vec<Snapshot>> {
    let mut conds: Vec<&'static str> = vec![];
    let mut values: Vec<Value> = vec![];
    let filters = [
      ("set_name = ?", query.set_name.clone()),
      ("card_name = ?", query.card_name.clone()),
      ("card_number = ?", query.card_number.clone()),
      ("variant = ?", query.variant.clone()),
      ("snapshot_date >= ?", query.from.map(encode_date)),
      ("snapshot_date <= ?", query.to.map(encode_date)),
    ];
    for (cond, value) in filters {
      if let Some(v) = value {
        conds.push(cond);
        values.push(Value::Text(v));
      }
    }

    let where_clause = if conds.is_empty() {
      String::new()
    } else {
      format!("WHERE {}", conds.join(" AND "))
    };
    let sql = format!(
      "SELECT {HISTORY_COLUMNS} FROM psa_pop_history
       {where_clause}
       ORDER BY snapshot_date, set_name, card_number, card_name, variant"
    );

    let raws: Vec<RawSnapshot> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(values), RawSnapshot::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawSnapshot::into_snapshot).collect()
  }

  // ── Diagnostics ───────────────────────────────────────────────────────────

  async fn row_counts(&self) -> Result<RowCounts> {
    let counts = self
      .conn
      .call(|conn| {
        Ok(conn.query_row(VERIFY_COUNTS, [], |row| {
          Ok(RowCounts {
            population: row.get(0)?,
            history:    row.get(1)?,
          })
        })?)
      })
      .await?;
    Ok(counts)
  }
}
