use chrono::Utc;
use rusqlite::OptionalExtension;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::database::Database;
use crate::error::StoreError;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KvEntry {
    pub key: String,
    pub value: String,
    pub updated_at: String,
}

/// Last-writer-wins string store keyed by name.
#[derive(Clone)]
pub struct KvRepo {
    db: Database,
}

impl KvRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert or replace the value under `key`.
    #[instrument(skip(self, value), fields(key, len = value.len()))]
    pub fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let now = Utc::now().to_rfc3339();
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO kv_entries (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                rusqlite::params![key, value, now],
            )?;
            Ok(())
        })
    }

    #[instrument(skip(self))]
    pub fn get(&self, key: &str) -> Result<Option<KvEntry>, StoreError> {
        self.db.with_conn(|conn| {
            let entry = conn
                .query_row(
                    "SELECT key, value, updated_at FROM kv_entries WHERE key = ?1",
                    [key],
                    |row| {
                        Ok(KvEntry {
                            key: row.get(0)?,
                            value: row.get(1)?,
                            updated_at: row.get(2)?,
                        })
                    },
                )
                .optional()?;
            Ok(entry)
        })
    }

    /// Returns whether a row was removed.
    #[instrument(skip(self))]
    pub fn delete(&self, key: &str) -> Result<bool, StoreError> {
        self.db.with_conn(|conn| {
            let n = conn.execute("DELETE FROM kv_entries WHERE key = ?1", [key])?;
            Ok(n > 0)
        })
    }
}
