//! Constructs the listening HTTP server and hands off to the built router.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use cmdgate_core::raw_config::RawConfig;
use cmdgate_core::route::resolve;
use tracing::info;

use crate::reload::build_reload_router;
use crate::router::build_router;
use crate::state::AppState;

/// Build the application router for a fixed config, or a reload-mode
/// router that re-reads `config_path` on every request.
pub fn build_app(config_path: &std::path::Path, reload: bool) -> Result<Router> {
    info!(path = %config_path.display(), "reading config");
    let raw = RawConfig::from_file(config_path).context("failed to read config")?;
    let resolved = resolve(raw).context("failed to resolve routes")?;

    let state = Arc::new(AppState::new());

    if reload {
        info!(path = %config_path.display(), "reload mode enabled");
        Ok(build_reload_router(config_path.to_path_buf(), state))
    } else {
        Ok(build_router(&resolved, state).context("failed to build routes")?)
    }
}

/// Bind a listener on `port` and serve `app` until the process is killed.
pub async fn serve(port: u16, app: Router) -> Result<()> {
    let addr = format!("0.0.0.0:{port}");
    info!(%addr, "listening");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app).await.context("server error")
}

/// Convenience wrapper used by the `serve` CLI subcommand.
pub async fn run(config_path: PathBuf, port: u16, reload: bool) -> Result<()> {
    let app = build_app(&config_path, reload)?;
    serve(port, app).await
}
