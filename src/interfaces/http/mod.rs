pub(crate) mod handlers;
mod router;

use anyhow::Result;
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

use crate::core::events::{EventBus, ResetKind};
use crate::core::lifecycle::LifecycleComponent;
use crate::core::store::Store;
use crate::core::watcher::UrlWatcher;

/// Loopback HTTP server bridging the external scheduler into in-process
/// events, plus a small admin surface over the store. Built explicitly and
/// attached to the lifecycle; nothing here is process-global.
pub struct SignalServer {
    armed: Vec<ResetKind>,
    bus: EventBus,
    store: Arc<Store>,
    watcher: Arc<UrlWatcher>,
    api_host: String,
    api_port: u16,
}

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) armed: Arc<Vec<ResetKind>>,
    pub(crate) bus: EventBus,
    pub(crate) store: Arc<Store>,
    pub(crate) watcher: Arc<UrlWatcher>,
}

impl SignalServer {
    pub fn new(
        bus: EventBus,
        store: Arc<Store>,
        watcher: Arc<UrlWatcher>,
        api_host: String,
        api_port: u16,
    ) -> Self {
        Self {
            armed: Vec::new(),
            bus,
            store,
            watcher,
            api_host,
            api_port,
        }
    }

    /// Register a reset qualifier with the relay. Arming the same qualifier
    /// twice is a configuration error and is rejected.
    pub fn arm(&mut self, kind: ResetKind) -> Result<()> {
        anyhow::ensure!(
            !self.armed.contains(&kind),
            "{} reset signal is already armed",
            kind
        );
        self.armed.push(kind);
        Ok(())
    }

    pub(crate) fn app_state(&self) -> AppState {
        AppState {
            armed: Arc::new(self.armed.clone()),
            bus: self.bus.clone(),
            store: self.store.clone(),
            watcher: self.watcher.clone(),
        }
    }
}

#[async_trait]
impl LifecycleComponent for SignalServer {
    async fn on_init(&mut self) -> Result<()> {
        info!("Signal relay initializing ({} armed signal(s))", self.armed.len());
        Ok(())
    }

    async fn on_start(&mut self) -> Result<()> {
        let state = self.app_state();
        let addr = format!("{}:{}", self.api_host, self.api_port);

        tokio::spawn(async move {
            let app = router::build_router(state);
            match tokio::net::TcpListener::bind(&addr).await {
                Ok(listener) => {
                    info!("Signal relay listening at http://{addr}");
                    if let Err(e) = axum::serve(
                        listener,
                        app.into_make_service_with_connect_info::<SocketAddr>(),
                    )
                    .await
                    {
                        tracing::error!("Signal relay crashed: {}", e);
                    }
                }
                Err(e) => tracing::error!("Signal relay could not bind {}: {}", addr, e),
            }
        });
        Ok(())
    }

    async fn on_shutdown(&mut self) -> Result<()> {
        info!("Signal relay shutting down...");
        Ok(())
    }
}
