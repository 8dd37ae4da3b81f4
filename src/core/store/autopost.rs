use anyhow::Result;
use rusqlite::params;

use super::Store;
use super::types::AutopostFlagRecord;

impl Store {
    /// Get-or-create, defaulting to enabled on first read.
    pub async fn autopost_enabled(&self, name: &str) -> Result<bool> {
        let db = self.db.lock().await;
        db.execute(
            "INSERT OR IGNORE INTO autopost_flags (name, enabled) VALUES (?1, 1)",
            params![name],
        )?;
        let enabled: i32 = db.query_row(
            "SELECT enabled FROM autopost_flags WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )?;
        Ok(enabled != 0)
    }

    pub async fn set_autopost_enabled(&self, name: &str, enabled: bool) -> Result<()> {
        let db = self.db.lock().await;
        db.execute(
            "INSERT OR REPLACE INTO autopost_flags (name, enabled) VALUES (?1, ?2)",
            params![name, enabled as i32],
        )?;
        Ok(())
    }

    pub async fn all_autopost_flags(&self) -> Result<Vec<AutopostFlagRecord>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare("SELECT name, enabled FROM autopost_flags ORDER BY name")?;

        let rows = stmt.query_map([], |row| {
            Ok(AutopostFlagRecord {
                name: row.get(0)?,
                enabled: row.get::<_, i32>(1)? != 0,
            })
        })?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }
}
