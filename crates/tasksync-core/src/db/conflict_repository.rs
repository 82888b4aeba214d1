//! Conflict log repository

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT

use crate::error::Result;
use crate::models::{Origin, SyncConflict, TaskId};
use rusqlite::{params, Connection};

/// Strategy name stored with every resolution
pub const LAST_WRITER_WINS: &str = "last_writer_wins";

/// Conflict log over a connection or open transaction
pub struct ConflictLog<'a> {
    conn: &'a Connection,
}

impl<'a> ConflictLog<'a> {
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Record a resolved conflict
    pub fn record(
        &self,
        task_id: &TaskId,
        local_updated_at: i64,
        remote_updated_at: i64,
        winner: Origin,
        resolved_at: i64,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT INTO sync_conflicts
                (task_id, local_updated_at, remote_updated_at, winner, resolved_at, strategy)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                task_id.as_str(),
                local_updated_at,
                remote_updated_at,
                winner.as_str(),
                resolved_at,
                LAST_WRITER_WINS
            ],
        )?;
        Ok(())
    }

    /// Most recent conflicts first
    pub fn recent(&self, limit: usize) -> Result<Vec<SyncConflict>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, task_id, local_updated_at, remote_updated_at, winner, resolved_at, strategy
             FROM sync_conflicts
             ORDER BY resolved_at DESC, id DESC
             LIMIT ?",
        )?;

        let conflicts = stmt
            .query_map(params![limit as i64], |row| {
                let task_id: String = row.get(1)?;
                let winner: String = row.get(4)?;
                Ok(SyncConflict {
                    id: row.get(0)?,
                    task_id: task_id.parse().map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(
                            1,
                            rusqlite::types::Type::Text,
                            Box::new(e),
                        )
                    })?,
                    local_updated_at: row.get(2)?,
                    remote_updated_at: row.get(3)?,
                    winner: winner.parse().map_err(|e: String| {
                        rusqlite::Error::FromSqlConversionFailure(
                            4,
                            rusqlite::types::Type::Text,
                            e.into(),
                        )
                    })?,
                    resolved_at: row.get(5)?,
                    strategy: row.get(6)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(conflicts)
    }
}
