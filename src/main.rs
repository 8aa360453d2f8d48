//! Prompt Orchestration Service — Binary Entrypoint
//! Boots the Axum HTTP server, wiring the timestamp store, routes, and middleware.
//!
//! See `README.md` for quickstart and `DESIGN.md` for architecture notes.

use std::sync::Arc;

use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use prompt_orchestrator::api::{create_router, AppState};
use prompt_orchestrator::metrics::Metrics;
use prompt_orchestrator::storage::FileStore;
use prompt_orchestrator::timestamps::WEEK_IN_MILLIS;

const DEFAULT_STATE_PATH: &str = "state/frequency_caps.json";

/// Enable compact tracing logs in development only.
/// Activation requires BOTH:
///   - dev environment (debug build OR SHUTTLE_ENV in {local, development, dev})
///   - ORCHESTRATOR_DEV_LOG=1
fn enable_dev_tracing() {
    let dev_flag = std::env::var("ORCHESTRATOR_DEV_LOG")
        .ok()
        .is_some_and(|v| v == "1");

    let is_dev_env = cfg!(debug_assertions)
        || matches!(
            std::env::var("SHUTTLE_ENV")
                .unwrap_or_default()
                .to_ascii_lowercase()
                .as_str(),
            "local" | "development" | "dev"
        );

    if !(dev_flag && is_dev_env) {
        return;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("diagnostics=debug,info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    // This enables CLIENT_CONFIG_PATH / PUBLICATION_ID / STORAGE_STATE_PATH
    // overrides from .env.
    let _ = dotenvy::dotenv();

    // Initialize dev tracing early (no-op in production).
    enable_dev_tracing();

    let metrics = Metrics::init(WEEK_IN_MILLIS);

    let state_path =
        std::env::var("STORAGE_STATE_PATH").unwrap_or_else(|_| DEFAULT_STATE_PATH.to_string());
    let publication_id = std::env::var("PUBLICATION_ID").ok();

    let state = AppState::new(Arc::new(FileStore::new(state_path)), publication_id);
    let router = create_router(state).merge(metrics.router());

    Ok(router.into())
}
