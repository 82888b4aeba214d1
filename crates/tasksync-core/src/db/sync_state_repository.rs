//! Sync state repository implementation

use crate::error::Result;
use crate::models::{SyncState, Watermark};
use rusqlite::{params, Connection, OptionalExtension};

const WATERMARK_KEY: &str = "watermark";

/// Trait for persisted sync state
pub trait SyncStateRepository {
    /// Load sync state from the database
    fn load(&self) -> Result<SyncState>;

    /// Save sync state to the database
    fn save(&self, state: &SyncState) -> Result<()>;
}

/// `SQLite` implementation of `SyncStateRepository`
pub struct SqliteSyncStateRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteSyncStateRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn get_value(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM sync_state WHERE key = ?",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set_value(&self, key: &str, value: Option<&str>) -> Result<()> {
        match value {
            Some(value) => {
                self.conn.execute(
                    "INSERT OR REPLACE INTO sync_state (key, value) VALUES (?, ?)",
                    params![key, value],
                )?;
            }
            None => {
                self.conn
                    .execute("DELETE FROM sync_state WHERE key = ?", params![key])?;
            }
        }
        Ok(())
    }
}

impl SyncStateRepository for SqliteSyncStateRepository<'_> {
    fn load(&self) -> Result<SyncState> {
        let watermark = self.get_value(WATERMARK_KEY)?.map(Watermark::new);
        Ok(SyncState { watermark })
    }

    fn save(&self, state: &SyncState) -> Result<()> {
        self.set_value(WATERMARK_KEY, state.watermark.as_ref().map(Watermark::as_str))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_load_default_state() {
        let db = Database::open_in_memory().unwrap();
        let repo = SqliteSyncStateRepository::new(db.connection());

        assert_eq!(repo.load().unwrap(), SyncState::default());
    }

    #[test]
    fn test_save_and_load_state() {
        let db = Database::open_in_memory().unwrap();
        let repo = SqliteSyncStateRepository::new(db.connection());

        let state = SyncState {
            watermark: Some(Watermark::new("42")),
        };
        repo.save(&state).unwrap();
        assert_eq!(repo.load().unwrap(), state);

        repo.save(&SyncState::default()).unwrap();
        assert_eq!(repo.load().unwrap(), SyncState::default());
    }

    #[test]
    fn test_state_survives_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("tasks.db");

        {
            let db = Database::open(&path).unwrap();
            SqliteSyncStateRepository::new(db.connection())
                .save(&SyncState {
                    watermark: Some(Watermark::new("cursor-9")),
                })
                .unwrap();
        }

        let db = Database::open(&path).unwrap();
        let loaded = SqliteSyncStateRepository::new(db.connection())
            .load()
            .unwrap();
        assert_eq!(loaded.watermark, Some(Watermark::new("cursor-9")));
    }
}
