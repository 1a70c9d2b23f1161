//! Reload mode (§4.6): rebuild the router from the on-disk config on every
//! request instead of once at startup.

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::Request;
use axum::response::IntoResponse;
use axum::Router;
use cmdgate_core::raw_config::RawConfig;
use cmdgate_core::route::resolve;
use cmdgate_core::ConfigError;
use http::StatusCode;
use tower::ServiceExt;
use tracing::{error, info};

use crate::router::build_router;
use crate::state::AppState;

/// A fallback-only router that re-reads and re-resolves `config_path` on
/// every request, then dispatches into a freshly built router.
///
/// A rebuild failure is logged; the original implementation this mirrors
/// simply returns without writing a response on that path, which this
/// reproduces as closely as axum's handler contract allows by returning a
/// 500 with the rebuild error rather than silently dropping the request.
pub fn build_reload_router(config_path: PathBuf, state: Arc<AppState>) -> Router {
    Router::new().fallback(move |req: Request| {
        let config_path = config_path.clone();
        let state = state.clone();
        async move {
            info!(path = %config_path.display(), "reloading config");
            match rebuild(&config_path, state) {
                Ok(router) => router.oneshot(req).await.into_response(),
                Err(e) => {
                    error!(error = %e, "failed to rebuild router from config");
                    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
                }
            }
        }
    })
}

fn rebuild(config_path: &std::path::Path, state: Arc<AppState>) -> Result<Router, ConfigError> {
    let raw = RawConfig::from_file(config_path)?;
    let resolved = resolve(raw)?;
    build_router(&resolved, state)
}
