//! Search index schema.
//!
//! The layout is the one documentation browsers expect inside a docset:
//! a single `searchIndex` table plus a uniqueness index over
//! `(name, type, path)`. The schema version lives in `PRAGMA user_version`
//! so the file carries no bookkeeping tables of its own.

/// Schema version written to `PRAGMA user_version`.
pub(crate) const SCHEMA_VERSION: i64 = 1;

/// Statements creating an empty index.
pub(crate) const CREATE_SQL: &str = r#"
CREATE TABLE searchIndex(
    id   INTEGER PRIMARY KEY,
    name TEXT,
    type TEXT,
    path TEXT
);

CREATE UNIQUE INDEX anchor ON searchIndex (name, type, path);
"#;

/// Insert one entry; ids are assigned by SQLite in insertion order.
pub(crate) const INSERT_SQL: &str =
    "INSERT INTO searchIndex (name, type, path) VALUES (?1, ?2, ?3)";

pub(crate) const EXACT_SQL: &str =
    "SELECT name, type, path FROM searchIndex WHERE name = ?1 AND type = ?2 ORDER BY id LIMIT 1";

pub(crate) const PREFIX_SQL: &str = "SELECT name, type, path FROM searchIndex \
     WHERE substr(name, 1, length(?1)) = ?1 ORDER BY name, id";

pub(crate) const PREFIX_KIND_SQL: &str = "SELECT name, type, path FROM searchIndex \
     WHERE substr(name, 1, length(?1)) = ?1 AND type = ?2 ORDER BY name, id";

pub(crate) const ALL_SQL: &str = "SELECT name, type, path FROM searchIndex ORDER BY id";

pub(crate) const COUNT_SQL: &str = "SELECT COUNT(*) FROM searchIndex";
