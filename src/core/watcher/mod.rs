use anyhow::{Context, Result};
use chrono::Utc;
use reqwest::header::LOCATION;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::core::retry::RetryPolicy;
use crate::core::store::Store;

/// How a single watch over one row ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchOutcome {
    /// The redirect target moved; carries the new target.
    Changed(String),
    /// Another loop already holds this row; nothing was touched.
    AlreadyArmed,
    TimedOut,
    Cancelled,
}

/// Single-step redirect resolution with a bounded retry for flaky upstreams.
pub struct RedirectResolver {
    client: reqwest::Client,
    policy: RetryPolicy,
}

impl RedirectResolver {
    pub fn new(policy: RetryPolicy) -> Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .context("failed to build redirect resolver client")?;
        Ok(Self { client, policy })
    }

    /// GET with redirects disabled and return the Location header. A
    /// Location-less error response is retried per the policy; exhaustion
    /// falls back to the original url so callers read it as "no change"
    /// rather than an error. Transport errors propagate.
    pub async fn resolve(&self, url: &str) -> Result<String> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let resp = self.client.get(url).send().await?;
            if let Some(location) = resp.headers().get(LOCATION) {
                return Ok(location.to_str()?.to_string());
            }

            let status = resp.status();
            if status.as_u16() < 400 {
                // Not redirecting and not failing; nothing to follow.
                return Ok(url.to_string());
            }
            if self.policy.exhausted(attempt) {
                error!(
                    "No redirect for {} after {} attempts (status {}), treating as unchanged",
                    url, attempt, status
                );
                return Ok(url.to_string());
            }
            warn!("No redirect for {} (status {}), retrying", url, status);
            tokio::time::sleep(self.policy.delay_for(attempt)).await;
        }
    }
}

/// Polls a watched url until its redirect target moves, signalling that new
/// content has been published upstream.
pub struct UrlWatcher {
    store: Arc<Store>,
    resolver: RedirectResolver,
    poll_interval: Duration,
}

impl UrlWatcher {
    pub fn new(store: Arc<Store>, resolver: RedirectResolver, poll_interval: Duration) -> Self {
        Self {
            store,
            resolver,
            poll_interval,
        }
    }

    pub fn resolver(&self) -> &RedirectResolver {
        &self.resolver
    }

    /// Resolve the row's source url once and persist the result, used to
    /// initialise or refresh a row outside a watch loop.
    pub async fn refresh(&self, name: &str) -> Result<String> {
        let record = self
            .store
            .get_watched_url(name)
            .await?
            .ok_or_else(|| anyhow::anyhow!("no watched url named '{}'", name))?;
        let target = self.resolver.resolve(&record.source_url).await?;
        self.store
            .record_resolution(name, &target, Utc::now())
            .await?;
        Ok(target)
    }

    /// Poll until the redirect target differs from the stored one. Suspends
    /// the calling task only; `timeout = None` polls until the change
    /// arrives or the token fires. Every exit path other than `Changed`
    /// releases the row's armed flag.
    pub async fn wait_for_change(
        &self,
        name: &str,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<WatchOutcome> {
        let record = self
            .store
            .get_watched_url(name)
            .await?
            .ok_or_else(|| anyhow::anyhow!("no watched url named '{}'", name))?;

        if !self.store.try_arm_watcher(name).await? {
            return Ok(WatchOutcome::AlreadyArmed);
        }

        let deadline = timeout.map(|t| tokio::time::Instant::now() + t);
        let result = self
            .poll_until_changed(name, &record.source_url, record.redirect_target, deadline, cancel)
            .await;

        if !matches!(&result, Ok(WatchOutcome::Changed(_))) {
            // record_change disarms on success; every other exit leaves the
            // row armed and must release it here.
            if let Err(e) = self.store.disarm_watcher(name).await {
                warn!("Failed to disarm watcher for '{}': {}", name, e);
            }
        }
        result
    }

    async fn poll_until_changed(
        &self,
        name: &str,
        source_url: &str,
        known_target: Option<String>,
        deadline: Option<tokio::time::Instant>,
        cancel: &CancellationToken,
    ) -> Result<WatchOutcome> {
        loop {
            if cancel.is_cancelled() {
                return Ok(WatchOutcome::Cancelled);
            }

            let current = self.resolver.resolve(source_url).await?;
            if known_target.as_deref() != Some(current.as_str()) {
                self.store.record_change(name, &current, Utc::now()).await?;
                info!("Redirect target for '{}' moved to {}", name, current);
                return Ok(WatchOutcome::Changed(current));
            }

            let sleep = tokio::time::sleep(self.poll_interval);
            tokio::pin!(sleep);
            tokio::select! {
                _ = cancel.cancelled() => return Ok(WatchOutcome::Cancelled),
                _ = &mut sleep => {}
                _ = wait_until(deadline) => return Ok(WatchOutcome::TimedOut),
            }
        }
    }
}

async fn wait_until(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::http::StatusCode;
    use axum::response::Response;
    use axum::routing::get;
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex;

    /// Upstream stand-in: 302 to whatever `target` currently holds, counting
    /// every request.
    async fn spawn_redirect_host(
        target: Arc<Mutex<Option<String>>>,
        hits: Arc<AtomicUsize>,
    ) -> SocketAddr {
        let app = Router::new().route(
            "/gfx",
            get(move || {
                let target = target.clone();
                let hits = hits.clone();
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    match target.lock().await.clone() {
                        Some(location) => Response::builder()
                            .status(StatusCode::FOUND)
                            .header("location", location)
                            .body(axum::body::Body::empty())
                            .unwrap(),
                        None => Response::builder()
                            .status(StatusCode::NOT_FOUND)
                            .body(axum::body::Body::empty())
                            .unwrap(),
                    }
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test upstream");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve test upstream");
        });
        addr
    }

    struct Fixture {
        store: Arc<Store>,
        watcher: Arc<UrlWatcher>,
        target: Arc<Mutex<Option<String>>>,
        hits: Arc<AtomicUsize>,
        gfx_url: String,
        _dir: tempfile::TempDir,
    }

    async fn fixture(retry: RetryPolicy, poll_interval: Duration) -> Fixture {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = Arc::new(Store::new(dir.path()).await.expect("store"));
        let target = Arc::new(Mutex::new(Some("https://cdn.example/old.png".to_string())));
        let hits = Arc::new(AtomicUsize::new(0));
        let addr = spawn_redirect_host(target.clone(), hits.clone()).await;
        let gfx_url = format!("http://{addr}/gfx");
        let resolver = RedirectResolver::new(retry).expect("resolver");
        let watcher = Arc::new(UrlWatcher::new(store.clone(), resolver, poll_interval));
        Fixture {
            store,
            watcher,
            target,
            hits,
            gfx_url,
            _dir: dir,
        }
    }

    #[tokio::test]
    async fn resolve_returns_the_location_header() {
        let fx = fixture(RetryPolicy::fixed(3, Duration::from_millis(10)), Duration::from_millis(20)).await;
        let resolved = fx.watcher.resolver().resolve(&fx.gfx_url).await.expect("resolve");
        assert_eq!(resolved, "https://cdn.example/old.png");
        assert_eq!(fx.hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn resolve_retries_then_falls_back_to_the_original_url() {
        let fx = fixture(RetryPolicy::fixed(3, Duration::from_millis(10)), Duration::from_millis(20)).await;
        *fx.target.lock().await = None; // upstream now 404s with no Location

        let resolved = fx.watcher.resolver().resolve(&fx.gfx_url).await.expect("resolve");
        assert_eq!(resolved, fx.gfx_url);
        // Exactly the retry bound, no more.
        assert_eq!(fx.hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn wait_for_change_returns_when_the_target_moves() {
        let fx = fixture(RetryPolicy::fixed(3, Duration::from_millis(10)), Duration::from_millis(30)).await;
        fx.store
            .ensure_watched_url("xur", &fx.gfx_url)
            .await
            .expect("ensure");
        fx.store
            .record_resolution("xur", "https://cdn.example/old.png", Utc::now())
            .await
            .expect("seed");

        let watcher = fx.watcher.clone();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(async move {
            watcher.wait_for_change("xur", None, &cancel).await
        });

        // Let it observe the unchanged target at least once, then move it.
        tokio::time::sleep(Duration::from_millis(80)).await;
        *fx.target.lock().await = Some("https://cdn.example/new.png".to_string());

        let outcome = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("watch should finish")
            .expect("task should not panic")
            .expect("watch should not error");
        assert_eq!(
            outcome,
            WatchOutcome::Changed("https://cdn.example/new.png".to_string())
        );
        assert!(fx.hits.load(Ordering::SeqCst) >= 2);

        let record = fx.store.get_watched_url("xur").await.unwrap().unwrap();
        assert_eq!(
            record.redirect_target.as_deref(),
            Some("https://cdn.example/new.png")
        );
        assert!(record.last_checked.is_some());
        assert!(record.last_modified.is_some());
        assert!(!record.watcher_armed);
    }

    #[tokio::test]
    async fn wait_for_change_fires_immediately_for_an_uninitialised_row() {
        let fx = fixture(RetryPolicy::fixed(3, Duration::from_millis(10)), Duration::from_millis(30)).await;
        fx.store
            .ensure_watched_url("xur", &fx.gfx_url)
            .await
            .expect("ensure");

        let cancel = CancellationToken::new();
        let outcome = fx
            .watcher
            .wait_for_change("xur", None, &cancel)
            .await
            .expect("watch");
        assert_eq!(
            outcome,
            WatchOutcome::Changed("https://cdn.example/old.png".to_string())
        );
    }

    #[tokio::test]
    async fn wait_for_change_keeps_polling_while_nothing_moves() {
        let poll = Duration::from_millis(30);
        let fx = fixture(RetryPolicy::fixed(3, Duration::from_millis(10)), poll).await;
        fx.store
            .ensure_watched_url("xur", &fx.gfx_url)
            .await
            .expect("ensure");
        fx.store
            .record_resolution("xur", "https://cdn.example/old.png", Utc::now())
            .await
            .expect("seed");

        let cancel = CancellationToken::new();
        // Three and a half poll intervals without a change: still watching.
        let waited = tokio::time::timeout(
            poll * 7 / 2,
            fx.watcher.wait_for_change("xur", None, &cancel),
        )
        .await;
        assert!(waited.is_err());
        assert!(fx.hits.load(Ordering::SeqCst) >= 3);
    }

    #[tokio::test]
    async fn wait_for_change_honours_its_timeout_and_disarms() {
        let fx = fixture(RetryPolicy::fixed(3, Duration::from_millis(10)), Duration::from_millis(30)).await;
        fx.store
            .ensure_watched_url("xur", &fx.gfx_url)
            .await
            .expect("ensure");
        fx.store
            .record_resolution("xur", "https://cdn.example/old.png", Utc::now())
            .await
            .expect("seed");

        let cancel = CancellationToken::new();
        let outcome = fx
            .watcher
            .wait_for_change("xur", Some(Duration::from_millis(100)), &cancel)
            .await
            .expect("watch");
        assert_eq!(outcome, WatchOutcome::TimedOut);

        let record = fx.store.get_watched_url("xur").await.unwrap().unwrap();
        assert!(!record.watcher_armed);
    }

    #[tokio::test]
    async fn cancellation_releases_the_armed_flag() {
        let fx = fixture(RetryPolicy::fixed(3, Duration::from_millis(10)), Duration::from_millis(30)).await;
        fx.store
            .ensure_watched_url("xur", &fx.gfx_url)
            .await
            .expect("ensure");
        fx.store
            .record_resolution("xur", "https://cdn.example/old.png", Utc::now())
            .await
            .expect("seed");

        let cancel = CancellationToken::new();
        let watcher = fx.watcher.clone();
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            watcher.wait_for_change("xur", None, &token).await
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        let outcome = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("watch should finish")
            .expect("task should not panic")
            .expect("watch should not error");
        assert_eq!(outcome, WatchOutcome::Cancelled);

        let record = fx.store.get_watched_url("xur").await.unwrap().unwrap();
        assert!(!record.watcher_armed);
    }

    #[tokio::test]
    async fn a_second_watch_on_an_armed_row_is_refused() {
        let fx = fixture(RetryPolicy::fixed(3, Duration::from_millis(10)), Duration::from_millis(30)).await;
        fx.store
            .ensure_watched_url("xur", &fx.gfx_url)
            .await
            .expect("ensure");
        fx.store
            .record_resolution("xur", "https://cdn.example/old.png", Utc::now())
            .await
            .expect("seed");
        assert!(fx.store.try_arm_watcher("xur").await.expect("arm"));

        let cancel = CancellationToken::new();
        let outcome = fx
            .watcher
            .wait_for_change("xur", None, &cancel)
            .await
            .expect("watch");
        assert_eq!(outcome, WatchOutcome::AlreadyArmed);

        // The refused call must not have disarmed the holder.
        let record = fx.store.get_watched_url("xur").await.unwrap().unwrap();
        assert!(record.watcher_armed);
    }
}
