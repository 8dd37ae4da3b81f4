use anyhow::Result;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::CliFlags;
use crate::core::config::Config;
use crate::core::events::{EventBus, ResetKind};
use crate::core::lifecycle::LifecycleManager;
use crate::core::store::Store;
use crate::core::trigger::AutopostTrigger;
use crate::core::watcher::{RedirectResolver, UrlWatcher};
use crate::interfaces::http::SignalServer;

const EVENT_BUS_CAPACITY: usize = 64;

/// Assemble and run the bot-side daemon until ctrl-c.
pub(crate) async fn run(flags: CliFlags) -> Result<()> {
    let data_dir = super::resolve_data_dir(&flags);
    let config = Config::load(&data_dir).await?;
    let api_host = flags
        .api_host
        .unwrap_or_else(|| config.relay.api_host.clone());
    let api_port = flags.api_port.unwrap_or(config.relay.api_port);

    let store = Arc::new(Store::new(&data_dir).await?);
    let cleared = store.reset_stale_watchers().await?;
    if cleared > 0 {
        warn!(
            "Cleared {} armed watcher(s) left behind by a previous run",
            cleared
        );
    }

    let bus = EventBus::new(EVENT_BUS_CAPACITY);
    let resolver = RedirectResolver::new(config.watcher.retry_policy())?;
    let watcher = Arc::new(UrlWatcher::new(
        store.clone(),
        resolver,
        config.watcher.poll_interval(),
    ));

    let mut server = SignalServer::new(
        bus.clone(),
        store.clone(),
        watcher.clone(),
        api_host,
        api_port,
    );
    for kind in ResetKind::ALL {
        server.arm(kind)?;
    }

    let trigger = AutopostTrigger::new(
        store.clone(),
        watcher.clone(),
        bus.clone(),
        config.targets.clone(),
        config.debug.clone(),
        config.watcher.watch_timeout(),
    );

    let mut lifecycle = LifecycleManager::new().await?;
    lifecycle.attach(Arc::new(Mutex::new(server)));
    lifecycle.attach(Arc::new(Mutex::new(trigger)));
    lifecycle.start().await?;

    info!("polarity running, press ctrl-c to stop");
    tokio::signal::ctrl_c().await?;
    lifecycle.shutdown().await
}
