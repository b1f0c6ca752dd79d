use anyhow::Result;

use crate::queries::OptionalExt;
use crate::Database;

/// Server-side session rows. The payload is opaque to this crate; the API
/// layer serializes its session slots into `data`.
impl Database {
    pub fn load_session(&self, id: &str) -> Result<Option<String>> {
        self.with_conn(|conn| {
            conn.query_row("SELECT data FROM session WHERE id = ?1", [id], |row| row.get(0))
                .optional()
        })
    }

    pub fn save_session(&self, id: &str, data: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO session (id, data) VALUES (?1, ?2)
                 ON CONFLICT(id) DO UPDATE SET data = excluded.data, updated_at = datetime('now')",
                (id, data),
            )?;
            Ok(())
        })
    }

    pub fn delete_session(&self, id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM session WHERE id = ?1", [id])?;
            Ok(())
        })
    }

    /// Drops sessions idle for longer than `max_age_hours`. Returns how many.
    pub fn delete_stale_sessions(&self, max_age_hours: u64) -> Result<usize> {
        self.with_conn(|conn| {
            let deleted = conn.execute(
                "DELETE FROM session WHERE updated_at < datetime('now', '-' || ?1 || ' hours')",
                [max_age_hours as i64],
            )?;
            Ok(deleted)
        })
    }
}
