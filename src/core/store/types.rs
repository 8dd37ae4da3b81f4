use chrono::{DateTime, Utc};
use serde::Serialize;

/// One externally-hosted asset tracked for redirect changes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WatchedUrlRecord {
    pub name: String,
    /// The stable shortlink being polled.
    pub source_url: String,
    /// Last known resolved target; unset until the first resolution.
    pub redirect_target: Option<String>,
    pub last_checked: Option<DateTime<Utc>>,
    /// Moves only when `redirect_target` changes.
    pub last_modified: Option<DateTime<Utc>>,
    /// True while a watch loop holds this row.
    pub watcher_armed: bool,
}

/// Named on/off switch for one announce target's autoposts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AutopostFlagRecord {
    pub name: String,
    pub enabled: bool,
}
