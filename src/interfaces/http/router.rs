use axum::{
    Json, Router,
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use std::net::SocketAddr;

use super::{AppState, handlers};
use crate::core::events::{ResetKind, ResetSignal};

pub(crate) fn build_router(state: AppState) -> Router {
    let mut signal_routes = Router::new();
    for kind in state.armed.iter().copied() {
        signal_routes = signal_routes.route(
            &kind.signal_path(),
            post(
                move |connect: ConnectInfo<SocketAddr>, state: State<AppState>| {
                    signal_endpoint(kind, connect, state)
                },
            ),
        );
    }

    let admin_routes = Router::new()
        .route("/api/autoposts", get(handlers::get_autoposts_endpoint))
        .route("/api/autoposts/{name}", post(handlers::set_autopost_endpoint))
        .route("/api/watched-urls", get(handlers::get_watched_urls_endpoint))
        .route(
            "/api/watched-urls/{name}",
            post(handlers::set_watched_url_endpoint),
        )
        .route(
            "/api/announce/{name}",
            post(handlers::manual_announce_endpoint),
        )
        .layer(middleware::from_fn(require_local));

    signal_routes.merge(admin_routes).with_state(state)
}

/// The scheduler-to-process bridge: accept only loopback-origin POSTs,
/// convert the call into a typed in-process event, and answer without
/// waiting for any listener.
async fn signal_endpoint(
    kind: ResetKind,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> Response {
    if !addr.ip().is_loopback() {
        tracing::warn!(
            "{} reset signal received from non-local source {}, ignoring",
            kind,
            addr.ip()
        );
        return (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({
                "success": false,
                "error": "Signals are accepted from the local scheduler only"
            })),
        )
            .into_response();
    }

    let listeners = state.bus.publish_reset(ResetSignal { kind });
    tracing::info!(
        "{} reset signal received and passed on to {} listener(s)",
        kind,
        listeners
    );
    Json(serde_json::json!({ "success": true })).into_response()
}

/// Admin surface guard: same origin-IP trust model as the signal endpoints.
async fn require_local(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if addr.ip().is_loopback() {
        return next.run(req).await;
    }
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({ "error": "Admin API is loopback-only" })),
    )
        .into_response()
}
