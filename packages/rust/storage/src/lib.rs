//! libSQL search index for docsets (offline mode).
//!
//! The [`SearchIndex`] struct wraps the `docSet.dsidx` database that
//! documentation browsers query.
//!
//! **Access rules:**
//! - Bundle assembly: read-write via [`write_index`], which builds the file
//!   beside its destination and renames it into place
//! - Lookups (`docsetgen query`, tests): read-only via [`SearchIndex::open_readonly`]

mod schema;

use std::path::{Path, PathBuf};

use docsetgen_shared::{DocsetError, Entry, EntryKind, Result};
use libsql::{Connection, Database, params};

/// Search index handle wrapping a libSQL database.
pub struct SearchIndex {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

impl SearchIndex {
    /// Create a fresh, empty index at `path`.
    ///
    /// Fails if a file already exists there.
    pub async fn create(path: &Path) -> Result<Self> {
        if path.exists() {
            return Err(DocsetError::write(path, "index file already exists"));
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DocsetError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DocsetError::Storage(e.to_string()))?;
        let conn = db
            .connect()
            .map_err(|e| DocsetError::Storage(e.to_string()))?;

        let index = Self {
            db,
            conn,
            readonly: false,
        };
        index.apply_schema().await?;
        Ok(index)
    }

    /// Open an existing index at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(DocsetError::Storage(format!(
                "no search index at {}",
                path.display()
            )));
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DocsetError::Storage(e.to_string()))?;
        let conn = db
            .connect()
            .map_err(|e| DocsetError::Storage(e.to_string()))?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    async fn apply_schema(&self) -> Result<()> {
        tracing::debug!(version = schema::SCHEMA_VERSION, "creating search index schema");
        // Rollback journal keeps the finished file self-contained.
        self.conn
            .query("PRAGMA journal_mode = DELETE", params![])
            .await
            .map_err(|e| DocsetError::Storage(e.to_string()))?;
        self.conn
            .execute_batch(schema::CREATE_SQL)
            .await
            .map_err(|e| DocsetError::Storage(format!("schema creation failed: {e}")))?;
        self.conn
            .execute_batch(&format!("PRAGMA user_version = {};", schema::SCHEMA_VERSION))
            .await
            .map_err(|e| DocsetError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Schema version recorded in the file (0 for a foreign SQLite file).
    pub async fn schema_version(&self) -> Result<i64> {
        let mut rows = self
            .conn
            .query("PRAGMA user_version", params![])
            .await
            .map_err(|e| DocsetError::Storage(e.to_string()))?;
        match rows.next().await {
            Ok(Some(row)) => row
                .get::<i64>(0)
                .map_err(|e| DocsetError::Storage(e.to_string())),
            Ok(None) => Ok(0),
            Err(e) => Err(DocsetError::Storage(e.to_string())),
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(DocsetError::Storage(
                "search index is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Insert entries in order within a single transaction.
    ///
    /// Row ids follow the slice order, so an index built from the same
    /// sequence always assigns the same ids.
    pub async fn insert_entries(&self, entries: &[Entry]) -> Result<()> {
        self.check_writable()?;

        let tx = self
            .conn
            .transaction()
            .await
            .map_err(|e| DocsetError::Storage(e.to_string()))?;

        for entry in entries {
            tx.execute(
                schema::INSERT_SQL,
                params![entry.name.as_str(), entry.kind.as_str(), entry.path.as_str()],
            )
            .await
            .map_err(|e| {
                DocsetError::Storage(format!("insert of {:?} failed: {e}", entry.path))
            })?;
        }

        tx.commit()
            .await
            .map_err(|e| DocsetError::Storage(e.to_string()))?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Lookups
    // -----------------------------------------------------------------------

    /// Exact lookup by name and kind.
    pub async fn exact(&self, name: &str, kind: EntryKind) -> Result<Option<Entry>> {
        let mut rows = self
            .conn
            .query(schema::EXACT_SQL, params![name, kind.as_str()])
            .await
            .map_err(|e| DocsetError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_entry(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DocsetError::Storage(e.to_string())),
        }
    }

    /// Entries whose name starts with `term` (case-sensitive), ordered by name.
    pub async fn prefix(&self, term: &str, kind: Option<EntryKind>) -> Result<Vec<Entry>> {
        let rows = match kind {
            Some(kind) => {
                self.conn
                    .query(schema::PREFIX_KIND_SQL, params![term, kind.as_str()])
                    .await
            }
            None => self.conn.query(schema::PREFIX_SQL, params![term]).await,
        }
        .map_err(|e| DocsetError::Storage(e.to_string()))?;

        collect_entries(rows).await
    }

    /// Every entry, in insertion order.
    pub async fn all(&self) -> Result<Vec<Entry>> {
        let rows = self
            .conn
            .query(schema::ALL_SQL, params![])
            .await
            .map_err(|e| DocsetError::Storage(e.to_string()))?;
        collect_entries(rows).await
    }

    /// Number of entries.
    pub async fn count(&self) -> Result<usize> {
        let mut rows = self
            .conn
            .query(schema::COUNT_SQL, params![])
            .await
            .map_err(|e| DocsetError::Storage(e.to_string()))?;
        match rows.next().await {
            Ok(Some(row)) => {
                let n = row
                    .get::<i64>(0)
                    .map_err(|e| DocsetError::Storage(e.to_string()))?;
                Ok(n as usize)
            }
            Ok(None) => Ok(0),
            Err(e) => Err(DocsetError::Storage(e.to_string())),
        }
    }
}

async fn collect_entries(mut rows: libsql::Rows) -> Result<Vec<Entry>> {
    let mut entries = Vec::new();
    while let Some(row) = rows
        .next()
        .await
        .map_err(|e| DocsetError::Storage(e.to_string()))?
    {
        entries.push(row_to_entry(&row)?);
    }
    Ok(entries)
}

fn row_to_entry(row: &libsql::Row) -> Result<Entry> {
    let kind: String = row
        .get(1)
        .map_err(|e| DocsetError::Storage(e.to_string()))?;
    Ok(Entry {
        name: row
            .get(0)
            .map_err(|e| DocsetError::Storage(e.to_string()))?,
        kind: kind.parse().map_err(DocsetError::Storage)?,
        path: row
            .get(2)
            .map_err(|e| DocsetError::Storage(e.to_string()))?,
    })
}

// ---------------------------------------------------------------------------
// Atomic build
// ---------------------------------------------------------------------------

/// Build the search index for `entries` at `dest`.
///
/// The database is written to `<dest>.tmp` and renamed over `dest` only once
/// it is complete, so readers never observe a partial index. Returns the
/// number of rows written.
pub async fn write_index(entries: &[Entry], dest: &Path) -> Result<usize> {
    let tmp = tmp_path(dest);
    remove_stale(&tmp)?;

    if let Err(e) = build_at(entries, &tmp).await {
        let _ = remove_stale(&tmp);
        return Err(match e {
            DocsetError::Storage(message) => {
                DocsetError::write(dest, format!("cannot build search index: {message}"))
            }
            other => other,
        });
    }

    std::fs::rename(&tmp, dest).map_err(|e| DocsetError::write(dest, e.to_string()))?;
    tracing::debug!(path = %dest.display(), entries = entries.len(), "search index written");
    Ok(entries.len())
}

async fn build_at(entries: &[Entry], path: &Path) -> Result<()> {
    // Connection and database close at the end of this scope.
    let index = SearchIndex::create(path).await?;
    index.insert_entries(entries).await?;
    Ok(())
}

fn tmp_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Remove a leftover temp file and its rollback journal.
fn remove_stale(tmp: &Path) -> Result<()> {
    let mut journal = tmp.as_os_str().to_owned();
    journal.push("-journal");
    for path in [tmp.to_path_buf(), PathBuf::from(journal)] {
        match std::fs::remove_file(&path) {
            Ok(()) => tracing::debug!(path = %path.display(), "removed stale index file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(DocsetError::io(path, e)),
        }
    }
    Ok(())
}
