//! SQL schema for the PSA population store.
//!
//! Executed at connection startup and safe to re-run: every table, index and
//! trigger is created with `IF NOT EXISTS`, and both uniqueness constraints
//! live inside their `CREATE TABLE`, so re-application never duplicates an
//! object. The version is recorded in `PRAGMA user_version`.

pub const SCHEMA_VERSION: i64 = 1;

/// Full schema DDL.
///
/// Timestamps are RFC 3339 UTC with millisecond precision, produced by
/// `strftime('%Y-%m-%dT%H:%M:%fZ', ...)`; that fixed-width form sorts
/// lexically in time order. `gem_rate` is stored in hundredths of a percent.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA recursive_triggers = OFF;

-- Current state: one row per physical card variant, upserted on refresh.
CREATE TABLE IF NOT EXISTS psa_population (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    set_name      TEXT    NOT NULL,
    release_year  TEXT,
    card_number   TEXT    NOT NULL,
    card_name     TEXT    NOT NULL,
    variant       TEXT    NOT NULL DEFAULT '',
    full_name     TEXT,
    psa_spec_id   TEXT,
    auth          INTEGER NOT NULL DEFAULT 0 CHECK (auth >= 0),
    psa_1         INTEGER NOT NULL DEFAULT 0 CHECK (psa_1 >= 0),
    psa_1_5       INTEGER NOT NULL DEFAULT 0 CHECK (psa_1_5 >= 0),
    psa_2         INTEGER NOT NULL DEFAULT 0 CHECK (psa_2 >= 0),
    psa_3         INTEGER NOT NULL DEFAULT 0 CHECK (psa_3 >= 0),
    psa_4         INTEGER NOT NULL DEFAULT 0 CHECK (psa_4 >= 0),
    psa_5         INTEGER NOT NULL DEFAULT 0 CHECK (psa_5 >= 0),
    psa_6         INTEGER NOT NULL DEFAULT 0 CHECK (psa_6 >= 0),
    psa_7         INTEGER NOT NULL DEFAULT 0 CHECK (psa_7 >= 0),
    psa_8         INTEGER NOT NULL DEFAULT 0 CHECK (psa_8 >= 0),
    psa_9         INTEGER NOT NULL DEFAULT 0 CHECK (psa_9 >= 0),
    psa_10        INTEGER NOT NULL DEFAULT 0 CHECK (psa_10 >= 0),
    total_graded  INTEGER NOT NULL DEFAULT 0 CHECK (total_graded >= 0),
    gem_rate      INTEGER NOT NULL DEFAULT 0 CHECK (gem_rate BETWEEN 0 AND 10000),
    scraped_date  TEXT    NOT NULL DEFAULT (date('now')),
    created_at    TEXT    NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    updated_at    TEXT    NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    CONSTRAINT psa_population_card_key
        UNIQUE (set_name, card_number, card_name, variant)
);

CREATE INDEX IF NOT EXISTS idx_psa_pop_set_name  ON psa_population(set_name);
CREATE INDEX IF NOT EXISTS idx_psa_pop_card_name ON psa_population(card_name);
CREATE INDEX IF NOT EXISTS idx_psa_pop_full_name ON psa_population(full_name);
CREATE INDEX IF NOT EXISTS idx_psa_pop_spec_id   ON psa_population(psa_spec_id);
CREATE INDEX IF NOT EXISTS idx_psa_pop_year      ON psa_population(release_year);

-- Every update strictly advances updated_at, whatever the statement set it
-- to. recursive_triggers is off, so the inner UPDATE does not re-fire this.
CREATE TRIGGER IF NOT EXISTS psa_population_touch_updated_at
AFTER UPDATE ON psa_population
FOR EACH ROW
BEGIN
    UPDATE psa_population
       SET updated_at = MAX(
             strftime('%Y-%m-%dT%H:%M:%fZ', 'now'),
             COALESCE(
               strftime('%Y-%m-%dT%H:%M:%fZ', OLD.updated_at, '+0.001 seconds'),
               ''
             )
           )
     WHERE id = NEW.id;
END;

-- Weekly snapshots. Append-only: no UPDATE is ever issued against this table.
CREATE TABLE IF NOT EXISTS psa_pop_history (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    set_name       TEXT    NOT NULL,
    card_number    TEXT    NOT NULL,
    card_name      TEXT    NOT NULL,
    variant        TEXT    NOT NULL DEFAULT '',
    psa_spec_id    TEXT,
    psa_8          INTEGER NOT NULL DEFAULT 0 CHECK (psa_8 >= 0),
    psa_9          INTEGER NOT NULL DEFAULT 0 CHECK (psa_9 >= 0),
    psa_10         INTEGER NOT NULL DEFAULT 0 CHECK (psa_10 >= 0),
    total_graded   INTEGER NOT NULL DEFAULT 0 CHECK (total_graded >= 0),
    gem_rate       INTEGER NOT NULL DEFAULT 0 CHECK (gem_rate BETWEEN 0 AND 10000),
    snapshot_date  TEXT    NOT NULL,
    created_at     TEXT    NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    CONSTRAINT psa_pop_history_card_date
        UNIQUE (set_name, card_number, card_name, variant, snapshot_date)
);

CREATE INDEX IF NOT EXISTS idx_psa_pop_hist_date ON psa_pop_history(snapshot_date);
CREATE INDEX IF NOT EXISTS idx_psa_pop_hist_card ON psa_pop_history(set_name, card_name);

PRAGMA user_version = 1;
";

/// Smoke test run after applying [`SCHEMA`].
pub const VERIFY_COUNTS: &str = "
SELECT
    (SELECT COUNT(*) FROM psa_population),
    (SELECT COUNT(*) FROM psa_pop_history)
";
