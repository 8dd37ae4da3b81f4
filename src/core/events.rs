use serde::Deserialize;
use tokio::sync::broadcast;

/// Which Destiny 2 reset tripped. The scheduler fires these over the loopback
/// relay; one parametrized type covers all three cadences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResetKind {
    Daily,
    Weekly,
    Weekend,
}

impl ResetKind {
    pub const ALL: [ResetKind; 3] = [ResetKind::Daily, ResetKind::Weekly, ResetKind::Weekend];

    pub fn qualifier(&self) -> &'static str {
        match self {
            ResetKind::Daily => "daily",
            ResetKind::Weekly => "weekly",
            ResetKind::Weekend => "weekend",
        }
    }

    pub fn from_qualifier(qualifier: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.qualifier() == qualifier)
    }

    /// Route the relay listens on for this signal.
    pub fn signal_path(&self) -> String {
        format!("/{}-reset-signal", self.qualifier())
    }
}

impl std::fmt::Display for ResetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.qualifier())
    }
}

/// In-process form of a relayed scheduler trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetSignal {
    pub kind: ResetKind,
}

/// Fired once a watched infographic has a fresh redirect target and the
/// announcement for `target` can go out. Carries only the content type's
/// name; announcers read everything else from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnounceReady {
    pub target: String,
}

/// Typed publish/subscribe fabric between the relay, the trigger and any
/// announcer. Publishing enqueues for every live subscriber and never waits
/// on them.
#[derive(Clone)]
pub struct EventBus {
    reset_tx: broadcast::Sender<ResetSignal>,
    announce_tx: broadcast::Sender<AnnounceReady>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (reset_tx, _) = broadcast::channel(capacity);
        let (announce_tx, _) = broadcast::channel(capacity);
        Self {
            reset_tx,
            announce_tx,
        }
    }

    /// Returns how many subscribers will see the event. Zero subscribers is
    /// not an error.
    pub fn publish_reset(&self, signal: ResetSignal) -> usize {
        self.reset_tx.send(signal).unwrap_or(0)
    }

    pub fn subscribe_resets(&self) -> broadcast::Receiver<ResetSignal> {
        self.reset_tx.subscribe()
    }

    pub fn publish_announce(&self, ready: AnnounceReady) -> usize {
        self.announce_tx.send(ready).unwrap_or(0)
    }

    pub fn subscribe_announces(&self) -> broadcast::Receiver<AnnounceReady> {
        self.announce_tx.subscribe()
    }
}
