mod autopost;
mod types;
mod watched_url;

pub use types::{AutopostFlagRecord, WatchedUrlRecord};

use anyhow::Result;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Mutex;

/// SQLite-backed persistence for the watcher and trigger. All reads and
/// writes go through to storage; nothing is cached in memory beyond the
/// lifetime of a single call.
pub struct Store {
    db: Arc<Mutex<Connection>>,
}

impl Store {
    pub async fn new<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        if !data_dir.exists() {
            fs::create_dir_all(&data_dir).await?;
        }

        let db_path = data_dir.join("polarity.db");
        let db = Connection::open(&db_path)?;

        db.execute(
            "CREATE TABLE IF NOT EXISTS watched_urls (
                name TEXT PRIMARY KEY,
                source_url TEXT NOT NULL,
                redirect_target TEXT,
                last_checked DATETIME,
                last_modified DATETIME,
                watcher_armed INTEGER NOT NULL DEFAULT 0
            )",
            [],
        )?;

        db.execute(
            "CREATE TABLE IF NOT EXISTS autopost_flags (
                name TEXT PRIMARY KEY,
                enabled INTEGER NOT NULL DEFAULT 1
            )",
            [],
        )?;

        Ok(Self {
            db: Arc::new(Mutex::new(db)),
        })
    }
}
