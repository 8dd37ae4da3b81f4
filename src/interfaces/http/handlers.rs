use axum::{
    Json,
    extract::{Path, State},
};
use tracing::info;

use super::AppState;
use crate::core::events::AnnounceReady;

pub(crate) async fn get_autoposts_endpoint(State(state): State<AppState>) -> Json<serde_json::Value> {
    match state.store.all_autopost_flags().await {
        Ok(flags) => Json(serde_json::json!({ "success": true, "autoposts": flags })),
        Err(e) => Json(serde_json::json!({
            "success": false,
            "error": format!("Database error: {}", e)
        })),
    }
}

#[derive(serde::Deserialize)]
pub(crate) struct SetAutopostRequest {
    enabled: bool,
}

pub(crate) async fn set_autopost_endpoint(
    Path(name): Path<String>,
    State(state): State<AppState>,
    Json(payload): Json<SetAutopostRequest>,
) -> Json<serde_json::Value> {
    let name = name.trim().to_string();
    if name.is_empty() {
        return Json(serde_json::json!({
            "success": false,
            "error": "autopost name is required"
        }));
    }

    match state.store.set_autopost_enabled(&name, payload.enabled).await {
        Ok(()) => {
            info!(
                "Autoposts for '{}' {}",
                name,
                if payload.enabled { "enabled" } else { "disabled" }
            );
            Json(serde_json::json!({
                "success": true,
                "name": name,
                "enabled": payload.enabled
            }))
        }
        Err(e) => Json(serde_json::json!({
            "success": false,
            "error": format!("Database error: {}", e)
        })),
    }
}

pub(crate) async fn get_watched_urls_endpoint(
    State(state): State<AppState>,
) -> Json<serde_json::Value> {
    match state.store.all_watched_urls().await {
        Ok(records) => Json(serde_json::json!({ "success": true, "watched_urls": records })),
        Err(e) => Json(serde_json::json!({
            "success": false,
            "error": format!("Database error: {}", e)
        })),
    }
}

#[derive(serde::Deserialize)]
pub(crate) struct SetWatchedUrlRequest {
    gfx_url: String,
}

/// Point a watched url at a new source, then resolve once so the redirect
/// fields are initialised against it.
pub(crate) async fn set_watched_url_endpoint(
    Path(name): Path<String>,
    State(state): State<AppState>,
    Json(payload): Json<SetWatchedUrlRequest>,
) -> Json<serde_json::Value> {
    let name = name.trim().to_string();
    let gfx_url = payload.gfx_url.trim().to_string();
    if name.is_empty() {
        return Json(serde_json::json!({
            "success": false,
            "error": "watched url name is required"
        }));
    }
    if url::Url::parse(&gfx_url).is_err() {
        return Json(serde_json::json!({
            "success": false,
            "error": "gfx_url must be a valid absolute url"
        }));
    }

    let result = async {
        if !state.store.set_source_url(&name, &gfx_url).await? {
            state.store.ensure_watched_url(&name, &gfx_url).await?;
        }
        let target = state.watcher.refresh(&name).await?;
        anyhow::Ok(target)
    }
    .await;

    match result {
        Ok(target) => {
            info!("Watched url '{}' now follows <{}>", name, gfx_url);
            Json(serde_json::json!({
                "success": true,
                "name": name,
                "gfx_url": gfx_url,
                "redirect_target": target
            }))
        }
        Err(e) => Json(serde_json::json!({ "success": false, "error": e.to_string() })),
    }
}

/// Manually fire the announce-ready event for a target, bypassing the watch.
pub(crate) async fn manual_announce_endpoint(
    Path(name): Path<String>,
    State(state): State<AppState>,
) -> Json<serde_json::Value> {
    let name = name.trim().to_string();
    if name.is_empty() {
        return Json(serde_json::json!({
            "success": false,
            "error": "announce target name is required"
        }));
    }

    let listeners = state.bus.publish_announce(AnnounceReady {
        target: name.clone(),
    });
    info!(
        "Manual announce for '{}' dispatched to {} listener(s)",
        name, listeners
    );
    Json(serde_json::json!({ "success": true, "name": name, "listeners": listeners }))
}
