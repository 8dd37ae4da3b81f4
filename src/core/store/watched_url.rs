use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::params;

use super::Store;
use super::types::WatchedUrlRecord;

fn read_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<WatchedUrlRecord> {
    Ok(WatchedUrlRecord {
        name: row.get(0)?,
        source_url: row.get(1)?,
        redirect_target: row.get(2)?,
        last_checked: row.get(3)?,
        last_modified: row.get(4)?,
        watcher_armed: row.get::<_, i32>(5)? != 0,
    })
}

impl Store {
    pub async fn get_watched_url(&self, name: &str) -> Result<Option<WatchedUrlRecord>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(
            "SELECT name, source_url, redirect_target, last_checked, last_modified, watcher_armed
             FROM watched_urls WHERE name = ?1",
        )?;

        let mut rows = stmt.query_map(params![name], read_record)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    pub async fn all_watched_urls(&self) -> Result<Vec<WatchedUrlRecord>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(
            "SELECT name, source_url, redirect_target, last_checked, last_modified, watcher_armed
             FROM watched_urls ORDER BY name",
        )?;

        let rows = stmt.query_map([], read_record)?;
        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    /// Create the row on first access, leaving the resolved fields unset
    /// until something actually resolves the url.
    pub async fn ensure_watched_url(
        &self,
        name: &str,
        source_url: &str,
    ) -> Result<WatchedUrlRecord> {
        {
            let db = self.db.lock().await;
            db.execute(
                "INSERT OR IGNORE INTO watched_urls (name, source_url) VALUES (?1, ?2)",
                params![name, source_url],
            )?;
        }
        self.get_watched_url(name)
            .await?
            .ok_or_else(|| anyhow::anyhow!("watched url '{}' missing after insert", name))
    }

    /// Point an existing row at a new source url. Resolved state is cleared
    /// so the next access re-initialises against the new url.
    pub async fn set_source_url(&self, name: &str, source_url: &str) -> Result<bool> {
        let db = self.db.lock().await;
        let rows_updated = db.execute(
            "UPDATE watched_urls SET source_url = ?1, redirect_target = NULL,
             last_checked = NULL, last_modified = NULL WHERE name = ?2",
            params![source_url, name],
        )?;
        Ok(rows_updated > 0)
    }

    /// Refresh outside a watch loop: always bumps `last_checked`, moves
    /// `last_modified` only when the target differs (or was never set).
    pub async fn record_resolution(
        &self,
        name: &str,
        target: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let db = self.db.lock().await;
        db.execute(
            "UPDATE watched_urls SET
                last_modified = CASE
                    WHEN redirect_target IS NOT ?1 OR last_modified IS NULL THEN ?2
                    ELSE last_modified
                END,
                redirect_target = ?1,
                last_checked = ?2
             WHERE name = ?3",
            params![target, now, name],
        )?;
        Ok(())
    }

    /// The watch loop's terminal write: new target, both timestamps and the
    /// armed flag, all in one statement.
    pub async fn record_change(
        &self,
        name: &str,
        new_target: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let db = self.db.lock().await;
        let rows_updated = db.execute(
            "UPDATE watched_urls SET redirect_target = ?1, last_modified = ?2,
             last_checked = ?2, watcher_armed = 0 WHERE name = ?3",
            params![new_target, now, name],
        )?;
        Ok(rows_updated > 0)
    }

    /// Claim the watch loop for this row. False means another loop already
    /// holds it.
    pub async fn try_arm_watcher(&self, name: &str) -> Result<bool> {
        let db = self.db.lock().await;
        let rows_updated = db.execute(
            "UPDATE watched_urls SET watcher_armed = 1 WHERE name = ?1 AND watcher_armed = 0",
            params![name],
        )?;
        Ok(rows_updated > 0)
    }

    pub async fn disarm_watcher(&self, name: &str) -> Result<bool> {
        let db = self.db.lock().await;
        let rows_updated = db.execute(
            "UPDATE watched_urls SET watcher_armed = 0 WHERE name = ?1 AND watcher_armed = 1",
            params![name],
        )?;
        Ok(rows_updated > 0)
    }

    /// Startup reconciliation: clear armed flags left behind by a process
    /// that died mid-watch.
    pub async fn reset_stale_watchers(&self) -> Result<usize> {
        let db = self.db.lock().await;
        let rows_updated = db.execute(
            "UPDATE watched_urls SET watcher_armed = 0 WHERE watcher_armed = 1",
            [],
        )?;
        Ok(rows_updated)
    }
}
