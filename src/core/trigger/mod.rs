use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::core::config::{DebugConfig, TargetConfig};
use crate::core::events::{AnnounceReady, EventBus, ResetSignal};
use crate::core::lifecycle::LifecycleComponent;
use crate::core::store::Store;
use crate::core::watcher::{UrlWatcher, WatchOutcome};

/// Listens for relayed reset signals and decides, per announce target,
/// whether to do nothing, wait for fresh content and then announce, or (in
/// test environments) announce straight away.
pub struct AutopostTrigger {
    inner: Arc<TriggerInner>,
    cancel: CancellationToken,
}

struct TriggerInner {
    store: Arc<Store>,
    watcher: Arc<UrlWatcher>,
    bus: EventBus,
    targets: Vec<TargetConfig>,
    debug: DebugConfig,
    watch_timeout: Option<Duration>,
}

impl AutopostTrigger {
    pub fn new(
        store: Arc<Store>,
        watcher: Arc<UrlWatcher>,
        bus: EventBus,
        targets: Vec<TargetConfig>,
        debug: DebugConfig,
        watch_timeout: Option<Duration>,
    ) -> Self {
        Self {
            inner: Arc::new(TriggerInner {
                store,
                watcher,
                bus,
                targets,
                debug,
                watch_timeout,
            }),
            cancel: CancellationToken::new(),
        }
    }
}

impl TriggerInner {
    /// Every signal occurrence gets independent flow tasks; overlap on the
    /// same row is resolved by the watcher's arming guard.
    fn spawn_flows(inner: &Arc<Self>, signal: ResetSignal, cancel: &CancellationToken) {
        for target in inner.targets.iter().filter(|t| t.trigger == signal.kind) {
            let inner = inner.clone();
            let target = target.clone();
            let cancel = cancel.child_token();
            tokio::spawn(async move {
                if let Err(e) = inner.run_flow(&target, &cancel).await {
                    error!("Autopost flow for '{}' failed: {}", target.name, e);
                }
            });
        }
    }

    async fn run_flow(&self, target: &TargetConfig, cancel: &CancellationToken) -> Result<()> {
        let name = &target.name;

        if !self.store.autopost_enabled(name).await? {
            info!("Autoposts disabled for '{}', ignoring reset signal", name);
            return Ok(());
        }

        if self.debug.test_env && self.debug.trigger_without_url_update {
            debug!("Announcing '{}' without waiting for the infographic", name);
            self.bus.publish_announce(AnnounceReady {
                target: name.clone(),
            });
            return Ok(());
        }

        self.store.ensure_watched_url(name, &target.gfx_url).await?;

        match self
            .watcher
            .wait_for_change(name, self.watch_timeout, cancel)
            .await?
        {
            WatchOutcome::Changed(new_target) => {
                info!("New '{}' infographic at {}, announcing", name, new_target);
                let listeners = self.bus.publish_announce(AnnounceReady {
                    target: name.clone(),
                });
                debug!("Announce-ready for '{}' reached {} listener(s)", name, listeners);
            }
            WatchOutcome::AlreadyArmed => {
                warn!("A watch loop is already armed for '{}', skipping this signal", name);
            }
            WatchOutcome::TimedOut => {
                warn!("Gave up waiting for a new '{}' infographic", name);
            }
            WatchOutcome::Cancelled => {
                info!("Watch for '{}' cancelled during shutdown", name);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl LifecycleComponent for AutopostTrigger {
    async fn on_start(&mut self) -> Result<()> {
        let inner = self.inner.clone();
        let cancel = self.cancel.clone();
        let mut rx = inner.bus.subscribe_resets();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    received = rx.recv() => match received {
                        Ok(signal) => {
                            info!("{} reset signal received, running autopost checks", signal.kind);
                            TriggerInner::spawn_flows(&inner, signal, &cancel);
                        }
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            warn!("Reset listener lagged, {} signal(s) dropped", missed);
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        });
        Ok(())
    }

    async fn on_shutdown(&mut self) -> Result<()> {
        self.cancel.cancel();
        Ok(())
    }
}
