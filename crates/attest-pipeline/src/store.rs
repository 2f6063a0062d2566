//! Verification Outcome Sink.
//!
//! The persisted identity state behind an explicit commit/clear interface.
//! The driver is the only writer, at transition time; nothing else in the
//! pipeline persists anything implicitly.

use attest_core::IdentityRecord;
use rusqlite::Connection;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("identity store error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Where the terminal verification outcome lands.
pub trait OutcomeSink: Send {
    fn commit(&mut self, record: &IdentityRecord) -> Result<(), StoreError>;
    fn clear(&mut self) -> Result<(), StoreError>;
    fn load(&self) -> Result<IdentityRecord, StoreError>;
}

/// In-memory sink for tests and ephemeral runs.
pub struct MemorySink {
    record: IdentityRecord,
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySink {
    pub fn new() -> Self {
        Self {
            record: IdentityRecord::unverified(),
        }
    }
}

impl OutcomeSink for MemorySink {
    fn commit(&mut self, record: &IdentityRecord) -> Result<(), StoreError> {
        self.record = record.clone();
        Ok(())
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        self.record = IdentityRecord::unverified();
        Ok(())
    }

    fn load(&self) -> Result<IdentityRecord, StoreError> {
        Ok(self.record.clone())
    }
}

/// SQLite-backed sink: a single-row table holding the identity record.
pub struct SqliteIdentityStore {
    conn: Connection,
}

impl SqliteIdentityStore {
    pub fn open(path: &std::path::Path) -> Result<Self, StoreError> {
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS identity (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                verified INTEGER NOT NULL,
                display_name TEXT NOT NULL
            );",
        )?;
        Ok(Self { conn })
    }
}

impl OutcomeSink for SqliteIdentityStore {
    fn commit(&mut self, record: &IdentityRecord) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO identity (id, verified, display_name) VALUES (1, ?1, ?2)
             ON CONFLICT(id) DO UPDATE SET
                verified = excluded.verified,
                display_name = excluded.display_name",
            rusqlite::params![record.verified, record.display_name],
        )?;
        Ok(())
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        self.commit(&IdentityRecord::unverified())
    }

    fn load(&self) -> Result<IdentityRecord, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT verified, display_name FROM identity WHERE id = 1")?;
        let mut rows = stmt.query([])?;
        match rows.next()? {
            Some(row) => Ok(IdentityRecord {
                verified: row.get(0)?,
                display_name: row.get(1)?,
            }),
            None => Ok(IdentityRecord::unverified()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_round_trip() {
        let mut sink = MemorySink::new();
        assert_eq!(sink.load().unwrap(), IdentityRecord::unverified());

        let record = IdentityRecord {
            verified: true,
            display_name: "Jane Doe".to_string(),
        };
        sink.commit(&record).unwrap();
        assert_eq!(sink.load().unwrap(), record);

        sink.clear().unwrap();
        assert_eq!(sink.load().unwrap(), IdentityRecord::unverified());
    }

    #[test]
    fn test_sqlite_empty_store_is_unverified() {
        let store = SqliteIdentityStore::open_in_memory().unwrap();
        assert_eq!(store.load().unwrap(), IdentityRecord::unverified());
    }

    #[test]
    fn test_sqlite_commit_overwrites() {
        let mut store = SqliteIdentityStore::open_in_memory().unwrap();

        store
            .commit(&IdentityRecord {
                verified: true,
                display_name: "Jane Doe".to_string(),
            })
            .unwrap();
        assert_eq!(store.load().unwrap().display_name, "Jane Doe");

        store
            .commit(&IdentityRecord {
                verified: true,
                display_name: "John Roe".to_string(),
            })
            .unwrap();
        let loaded = store.load().unwrap();
        assert!(loaded.verified);
        assert_eq!(loaded.display_name, "John Roe");
    }

    #[test]
    fn test_sqlite_clear_resets_record() {
        let mut store = SqliteIdentityStore::open_in_memory().unwrap();
        store
            .commit(&IdentityRecord {
                verified: true,
                display_name: "Jane Doe".to_string(),
            })
            .unwrap();

        store.clear().unwrap();
        let loaded = store.load().unwrap();
        assert!(!loaded.verified);
        assert_eq!(loaded.display_name, "");
    }
}
