//! Integration tests for `SqliteStore` against an in-memory database.

use chrono::NaiveDate;
use psa_pop_core::{
  card::{CardKey, NewPopulation},
  grade::{GemRate, GradeCounts},
  snapshot::NewSnapshot,
  store::{HistoryQuery, PopulationQuery, PopulationStore, RowCounts},
};

use crate::{Error, SqliteStore, store::map_db_error};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate { NaiveDate::from_ymd_opt(y, m, d).unwrap() }

fn charizard() -> CardKey { CardKey::new("Base Set", "4", "Charizard", "") }

fn pop(key: CardKey, psa_9: u32, psa_10: u32) -> NewPopulation {
  NewPopulation::new(key, GradeCounts { psa_9, psa_10, ..Default::default() })
}

fn scraped(key: CardKey, psa_10: u32, total: u32, on: NaiveDate) -> NewPopulation {
  let mut input = NewPopulation::new(key, GradeCounts { psa_10, ..Default::default() });
  input.total_graded = Some(total);
  input.scraped_date = Some(on);
  input
}

fn snapshot(key: CardKey, psa_10: u32, on: NaiveDate) -> NewSnapshot {
  NewSnapshot {
    key,
    psa_spec_id: None,
    psa_8: 0,
    psa_9: 0,
    psa_10,
    total_graded: psa_10,
    gem_rate: GemRate::from_counts(psa_10, psa_10).unwrap(),
    snapshot_date: on,
  }
}

/// Names of schema objects of `kind` ("table", "index", "trigger"), excluding
/// SQLite's internal ones.
async fn schema_objects(s: &SqliteStore, kind: &'static str) -> Vec<String> {
  s.conn
    .call(move |conn| {
      let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master
         WHERE type = ?1 AND name NOT LIKE 'sqlite_%'
         ORDER BY name",
      )?;
      let names = stmt
        .query_map([kind], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
      Ok(names)
    })
    .await
    .unwrap()
}

// ─── Schema ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn fresh_schema_is_empty_and_versioned() {
  let s = store().await;
  assert_eq!(s.row_counts().await.unwrap(), RowCounts::default());
  assert_eq!(s.schema_version().await.unwrap(), crate::SCHEMA_VERSION);

  assert_eq!(schema_objects(&s, "trigger").await, ["psa_population_touch_updated_at"]);
  assert_eq!(schema_objects(&s, "index").await, [
    "idx_psa_pop_card_name",
    "idx_psa_pop_full_name",
    "idx_psa_pop_hist_card",
    "idx_psa_pop_hist_date",
    "idx_psa_pop_set_name",
    "idx_psa_pop_spec_id",
    "idx_psa_pop_year",
  ]);
}

#[tokio::test]
async fn reapplying_schema_is_idempotent() {
  let s = store().await;
  s.upsert_population(pop(charizard(), 500, 120)).await.unwrap();

  let tables = schema_objects(&s, "table").await;
  let indexes = schema_objects(&s, "index").await;
  let triggers = schema_objects(&s, "trigger").await;

  s.apply_schema().await.unwrap();
  s.apply_schema().await.unwrap();

  assert_eq!(schema_objects(&s, "table").await, tables);
  assert_eq!(schema_objects(&s, "index").await, indexes);
  assert_eq!(schema_objects(&s, "trigger").await, triggers);
  assert_eq!(s.row_counts().await.unwrap().population, 1);
}

#[tokio::test]
async fn omitted_grade_columns_default_to_zero() {
  let s = store().await;
  s.conn
    .call(|conn| {
      conn.execute(
        "INSERT INTO psa_population (set_name, card_number, card_name)
         VALUES ('Jungle', '1', 'Clefable')",
        [],
      )?;
      Ok(())
    })
    .await
    .unwrap();

  let record = s
    .get_population(&CardKey::new("Jungle", "1", "Clefable", ""))
    .await
    .unwrap()
    .expect("row inserted with defaults");
  assert_eq!(record.population.grades, GradeCounts::default());
  assert_eq!(record.population.total_graded, 0);
  assert_eq!(record.population.gem_rate, GemRate::ZERO);
  assert_eq!(record.population.full_name, "Clefable");
}

#[tokio::test]
async fn negative_grade_counts_are_rejected() {
  let s = store().await;
  let err = s
    .conn
    .call(|conn| {
      conn.execute(
        "INSERT INTO psa_population (set_name, card_number, card_name, psa_9)
         VALUES ('Jungle', '1', 'Clefable', -1)",
        [],
      )?;
      Ok(())
    })
    .await
    .unwrap_err();
  assert!(
    matches!(
      &err,
      tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(e, _))
        if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_CHECK
    ),
    "{err}"
  );
  assert_eq!(s.row_counts().await.unwrap().population, 0);
}

#[tokio::test]
async fn missing_key_column_is_rejected() {
  let s = store().await;
  let result = s
    .conn
    .call(|conn| {
      conn.execute(
        "INSERT INTO psa_pop_history (set_name, card_number, snapshot_date)
         VALUES ('Jungle', '1', '2024-01-01')",
        [],
      )?;
      Ok(())
    })
    .await;
  assert!(result.is_err());
  assert_eq!(s.row_counts().await.unwrap().history, 0);
}

#[tokio::test]
async fn check_and_not_null_failures_map_to_constraint_violation() {
  let s = store().await;
  s.upsert_population(pop(charizard(), 500, 120)).await.unwrap();

  let err = s
    .conn
    .call(|conn| {
      conn.execute("UPDATE psa_population SET gem_rate = 10001", [])?;
      Ok(())
    })
    .await
    .map_err(map_db_error)
    .unwrap_err();
  assert!(matches!(err, Error::ConstraintViolation(_)), "{err}");

  let err = s
    .conn
    .call(|conn| {
      conn.execute("UPDATE psa_population SET card_name = NULL", [])?;
      Ok(())
    })
    .await
    .map_err(map_db_error)
    .unwrap_err();
  assert!(matches!(err, Error::ConstraintViolation(_)), "{err}");

  // Uniqueness failures stay database errors for the caller to classify.
  let err = s
    .conn
    .call(|conn| {
      conn.execute(
        "INSERT INTO psa_population (set_name, card_number, card_name)
         VALUES ('Base Set', '4', 'Charizard')",
        [],
      )?;
      Ok(())
    })
    .await
    .map_err(map_db_error)
    .unwrap_err();
  assert!(matches!(err, Error::Database(_)), "{err}");

  let record = s.get_population(&charizard()).await.unwrap().unwrap();
  assert_eq!(record.population.gem_rate.to_string(), "19.35");
  assert_eq!(record.key().card_name, "Charizard");
}

// ─── Current population ──────────────────────────────────────────────────────

#[tokio::test]
async fn upsert_updates_in_place() {
  let s = store().await;

  let first = s.upsert_population(pop(charizard(), 500, 120)).await.unwrap();
  assert_eq!(first.population.grades.psa_10, 120);
  assert_eq!(first.population.total_graded, 620);

  let second = s.upsert_population(pop(charizard(), 500, 125)).await.unwrap();

  assert_eq!(s.row_counts().await.unwrap().population, 1);
  assert_eq!(second.id, first.id);
  assert_eq!(second.population.grades.psa_10, 125);
  assert_eq!(second.population.total_graded, 625);
  assert_eq!(second.created_at, first.created_at);
  assert!(
    second.updated_at > first.updated_at,
    "{} should be after {}",
    second.updated_at,
    first.updated_at
  );

  let fetched = s.get_population(&charizard()).await.unwrap().unwrap();
  assert_eq!(fetched.population.grades.psa_10, 125);
  assert_eq!(fetched.updated_at, second.updated_at);
}

#[tokio::test]
async fn upsert_overwrites_every_non_key_column() {
  let s = store().await;

  let mut input = pop(charizard(), 500, 120);
  input.release_year = Some("1999".into());
  input.psa_spec_id = Some("544027".into());
  s.upsert_population(input).await.unwrap();

  let mut input = pop(charizard(), 10, 0);
  input.release_year = Some("2000".into());
  input.full_name = Some("Charizard Holo".into());
  input.scraped_date = Some(date(2024, 1, 8));
  let record = s.upsert_population(input).await.unwrap();

  let p = &record.population;
  assert_eq!(p.release_year.as_deref(), Some("2000"));
  assert_eq!(p.full_name, "Charizard Holo");
  assert_eq!(p.psa_spec_id, None);
  assert_eq!(p.grades.psa_9, 10);
  assert_eq!(p.total_graded, 10);
  assert_eq!(p.gem_rate, GemRate::ZERO);
  assert_eq!(p.scraped_date, date(2024, 1, 8));
}

#[tokio::test]
async fn variants_are_distinct_rows() {
  let s = store().await;
  s.upsert_population(pop(charizard(), 500, 120)).await.unwrap();
  s.upsert_population(pop(CardKey::new("Base Set", "4", "Charizard", "Shadowless"), 90, 30))
    .await
    .unwrap();

  assert_eq!(s.row_counts().await.unwrap().population, 2);
  let shadowless = s
    .get_population(&CardKey::new("Base Set", "4", "Charizard", "Shadowless"))
    .await
    .unwrap()
    .unwrap();
  assert_eq!(shadowless.population.full_name, "Charizard (Shadowless)");
}

#[tokio::test]
async fn trigger_ignores_caller_supplied_updated_at() {
  let s = store().await;
  let before = s.upsert_population(pop(charizard(), 500, 120)).await.unwrap();

  s.conn
    .call(|conn| {
      conn.execute(
        "UPDATE psa_population SET updated_at = '1970-01-01T00:00:00.000Z', psa_8 = 3",
        [],
      )?;
      Ok(())
    })
    .await
    .unwrap();

  let after = s.get_population(&charizard()).await.unwrap().unwrap();
  assert_eq!(after.population.grades.psa_8, 3);
  assert!(after.updated_at > before.updated_at);
  assert_eq!(after.created_at, before.created_at);
}

#[tokio::test]
async fn get_population_missing_returns_none() {
  let s = store().await;
  let result = s.get_population(&charizard()).await.unwrap();
  assert!(result.is_none());
}

#[tokio::test]
async fn upsert_rejects_blank_key() {
  let s = store().await;
  let err = s
    .upsert_population(pop(CardKey::new("Base Set", "", "Charizard", ""), 1, 1))
    .await
    .unwrap_err();
  assert!(matches!(
    err,
    Error::Core(psa_pop_core::Error::MissingKeyField("card_number"))
  ));
}

#[tokio::test]
async fn batch_upsert_is_all_or_nothing() {
  let s = store().await;

  let written = s
    .upsert_population_batch(vec![
      pop(charizard(), 500, 120),
      pop(CardKey::new("Base Set", "2", "Blastoise", ""), 300, 80),
    ])
    .await
    .unwrap();
  assert_eq!(written, 2);

  let err = s
    .upsert_population_batch(vec![
      pop(CardKey::new("Base Set", "15", "Venusaur", ""), 200, 40),
      pop(CardKey::new("", "16", "Zapdos", ""), 1, 1),
    ])
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Core(_)));
  assert_eq!(s.row_counts().await.unwrap().population, 2);

  assert_eq!(s.upsert_population_batch(vec![]).await.unwrap(), 0);
}

#[tokio::test]
async fn find_population_filters_on_indexed_columns() {
  let s = store().await;
  let mut base = pop(charizard(), 500, 120);
  base.release_year = Some("1999".into());
  base.psa_spec_id = Some("544027".into());
  let mut jungle = pop(CardKey::new("Jungle", "1", "Clefable", ""), 50, 5);
  jungle.release_year = Some("1999".into());
  let mut fossil = pop(CardKey::new("Fossil", "4", "Charizard", "1st Edition"), 10, 1);
  fossil.release_year = Some("1999".into());
  s.upsert_population_batch(vec![base, jungle, fossil])
    .await
    .unwrap();

  let by_name = s
    .find_population(&PopulationQuery {
      card_name: Some("Charizard".into()),
      ..Default::default()
    })
    .await
    .unwrap();
  assert_eq!(by_name.len(), 2);
  // Ordered by set name.
  assert_eq!(by_name[0].key().set_name, "Base Set");
  assert_eq!(by_name[1].key().set_name, "Fossil");

  let by_spec_id = s
    .find_population(&PopulationQuery {
      psa_spec_id: Some("544027".into()),
      ..Default::default()
    })
    .await
    .unwrap();
  assert_eq!(by_spec_id.len(), 1);
  assert_eq!(by_spec_id[0].key(), &charizard());

  let by_full_name = s
    .find_population(&PopulationQuery {
      full_name: Some("Charizard (1st Edition)".into()),
      ..Default::default()
    })
    .await
    .unwrap();
  assert_eq!(by_full_name.len(), 1);

  let page = s
    .find_population(&PopulationQuery {
      release_year: Some("1999".into()),
      limit: Some(2),
      offset: Some(1),
      ..Default::default()
    })
    .await
    .unwrap();
  assert_eq!(page.len(), 2);
  assert_eq!(page[0].key().set_name, "Fossil");
  assert_eq!(page[1].key().set_name, "Jungle");
}

// ─── History ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn duplicate_snapshot_is_rejected() {
  let s = store().await;
  let day = date(2024, 1, 1);

  let first = s.insert_snapshot(snapshot(charizard(), 120, day)).await.unwrap();
  assert_eq!(first.data.snapshot_date, day);

  let err = s
    .insert_snapshot(snapshot(charizard(), 125, day))
    .await
    .unwrap_err();
  assert!(
    matches!(&err, Error::DuplicateSnapshot { key, date } if key == &charizard() && *date == day),
    "{err}"
  );

  let history = s.get_history(&HistoryQuery::for_card(&charizard())).await.unwrap();
  assert_eq!(history.len(), 1);
  assert_eq!(history[0].id, first.id);
  assert_eq!(history[0].data.psa_10, 120);
}

#[tokio::test]
async fn same_card_on_different_dates_is_allowed() {
  let s = store().await;
  s.insert_snapshot(snapshot(charizard(), 120, date(2024, 1, 1)))
    .await
    .unwrap();
  s.insert_snapshot(snapshot(charizard(), 125, date(2024, 1, 8)))
    .await
    .unwrap();
  assert_eq!(s.row_counts().await.unwrap().history, 2);
}

#[tokio::test]
async fn delete_then_reinsert_corrects_a_snapshot() {
  let s = store().await;
  let day = date(2024, 1, 1);
  s.insert_snapshot(snapshot(charizard(), 120, day)).await.unwrap();

  assert!(s.delete_snapshot(&charizard(), day).await.unwrap());
  assert!(!s.delete_snapshot(&charizard(), day).await.unwrap());

  let corrected = s.insert_snapshot(snapshot(charizard(), 121, day)).await.unwrap();
  assert_eq!(corrected.data.psa_10, 121);
  assert_eq!(s.row_counts().await.unwrap().history, 1);
}

#[tokio::test]
async fn batch_snapshot_insert_rolls_back_on_duplicate() {
  let s = store().await;
  let day = date(2024, 1, 1);
  let blastoise = CardKey::new("Base Set", "2", "Blastoise", "");

  let err = s
    .insert_snapshots(vec![
      snapshot(blastoise.clone(), 80, day),
      snapshot(charizard(), 120, day),
      snapshot(charizard(), 125, day),
    ])
    .await
    .unwrap_err();
  assert!(matches!(&err, Error::DuplicateSnapshot { key, .. } if key == &charizard()));
  assert_eq!(s.row_counts().await.unwrap().history, 0);

  let n = s
    .insert_snapshots(vec![snapshot(blastoise, 80, day), snapshot(charizard(), 120, day)])
    .await
    .unwrap();
  assert_eq!(n, 2);
}

#[tokio::test]
async fn snapshot_current_copies_graded_rows_scraped_that_day() {
  let s = store().await;
  let day = date(2024, 1, 1);

  s.upsert_population_batch(vec![
    scraped(charizard(), 120, 620, day),
    scraped(CardKey::new("Base Set", "2", "Blastoise", ""), 0, 0, day),
    scraped(CardKey::new("Jungle", "1", "Clefable", ""), 5, 50, date(2023, 12, 25)),
  ])
  .await
  .unwrap();

  let copied = s.snapshot_current(day).await.unwrap();
  assert_eq!(copied, 1);

  let history = s
    .get_history(&HistoryQuery {
      from: Some(day),
      to: Some(day),
      ..Default::default()
    })
    .await
    .unwrap();
  assert_eq!(history.len(), 1);
  let snap = &history[0].data;
  assert_eq!(snap.key, charizard());
  assert_eq!(snap.psa_10, 120);
  assert_eq!(snap.total_graded, 620);
  assert_eq!(snap.gem_rate.to_string(), "19.35");
  assert_eq!(snap.snapshot_date, day);
}

#[tokio::test]
async fn snapshot_current_is_all_or_nothing_on_conflict() {
  let s = store().await;
  let day = date(2024, 1, 1);
  let blastoise = CardKey::new("Base Set", "2", "Blastoise", "");

  s.upsert_population_batch(vec![
    scraped(charizard(), 120, 620, day),
    scraped(blastoise.clone(), 80, 380, day),
  ])
  .await
  .unwrap();
  s.insert_snapshot(snapshot(blastoise.clone(), 79, day)).await.unwrap();

  let err = s.snapshot_current(day).await.unwrap_err();
  assert!(matches!(&err, Error::DuplicateSnapshot { key, .. } if key == &blastoise));
  assert_eq!(s.row_counts().await.unwrap().history, 1);

  // Re-posting after an explicit delete succeeds.
  s.delete_snapshot(&blastoise, day).await.unwrap();
  assert_eq!(s.snapshot_current(day).await.unwrap(), 2);
}

#[tokio::test]
async fn history_is_ordered_and_range_filtered() {
  let s = store().await;
  let blastoise = CardKey::new("Base Set", "2", "Blastoise", "");
  s.insert_snapshots(vec![
    snapshot(charizard(), 130, date(2024, 1, 15)),
    snapshot(charizard(), 120, date(2024, 1, 1)),
    snapshot(charizard(), 125, date(2024, 1, 8)),
    snapshot(blastoise, 80, date(2024, 1, 8)),
  ])
  .await
  .unwrap();

  let trend = s.get_history(&HistoryQuery::for_card(&charizard())).await.unwrap();
  let gems: Vec<u32> = trend.iter().map(|h| h.data.psa_10).collect();
  assert_eq!(gems, [120, 125, 130]);

  let mid_month = s
    .get_history(&HistoryQuery {
      set_name: Some("Base Set".into()),
      from: Some(date(2024, 1, 2)),
      to: Some(date(2024, 1, 10)),
      ..Default::default()
    })
    .await
    .unwrap();
  assert_eq!(mid_month.len(), 2);
  assert!(mid_month.iter().all(|h| h.data.snapshot_date == date(2024, 1, 8)));
  assert_eq!(mid_month[0].key().card_name, "Blastoise");
}
