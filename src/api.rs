//! api.rs — HTTP surface for the decision engine.
//!
//! One POST per page view to `/decide` with the fetched payloads, analytics
//! events posted back to `/event`, plus debug endpoints over the persisted
//! history. Rendering stays with the caller; the response only says what to
//! show.

use std::sync::Arc;

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use crate::article::{Article, Entitlements};
use crate::client_config::ClientConfig;
use crate::eligibility::StaticCapabilities;
use crate::events::{
    new_shared_session, AnalyticsEvent, DiagnosticSink, EventRouter, SharedSession, TracingSink,
};
use crate::history::{DecisionHistory, DecisionRecord};
use crate::intervention::{AutoPromptType, ContentType};
use crate::manager::{
    PromptOrchestrationManager, PromptPresenter, PromptSelection, ShowPromptParams,
    StaticConfigSource, StaticEntitlementsSource, TracingPresenter,
};
use crate::storage::{KeyValueStore, MemoryStore, PromptStorage};
use crate::timestamps::{ActionsTimestamps, TimestampStore};

#[derive(Clone)]
pub struct AppState {
    store: Arc<TimestampStore>,
    session: SharedSession,
    events: Arc<EventRouter>,
    history: Arc<DecisionHistory>,
    sink: Arc<dyn DiagnosticSink>,
    presenter: Arc<dyn PromptPresenter>,
    default_config: Arc<ClientConfig>,
}

impl AppState {
    pub fn new(backend: Arc<dyn KeyValueStore>, publication_id: Option<String>) -> Self {
        let sink: Arc<dyn DiagnosticSink> = Arc::new(TracingSink);
        let store = Arc::new(
            TimestampStore::new(PromptStorage::new(backend, publication_id), sink.clone()),
        );
        let session = new_shared_session();
        Self {
            events: Arc::new(EventRouter::new(store.clone(), session.clone())),
            history: Arc::new(DecisionHistory::with_capacity(2000)),
            presenter: Arc::new(TracingPresenter),
            default_config: Arc::new(ClientConfig::load_default()),
            store,
            session,
            sink,
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()), None)
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/decide", post(decide))
        .route("/event", post(event))
        .route("/debug/timestamps", get(debug_timestamps))
        .route("/debug/history", get(debug_history))
        .route("/debug/last-decision", get(debug_last_decision))
        .route("/admin/clear-timestamps", post(admin_clear_timestamps))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

/// Router over an in-memory store; the binary entrypoint wires a file-backed
/// one instead.
pub fn app() -> Router {
    create_router(AppState::in_memory())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DecideRequest {
    #[serde(default)]
    client_config: Option<ClientConfig>,
    #[serde(default)]
    entitlements: Entitlements,
    #[serde(default)]
    article: Option<Article>,
    content_type: ContentType,
    #[serde(default)]
    auto_prompt_type: Option<AutoPromptType>,
    #[serde(default)]
    always_show: bool,
    /// The embed's own probe of page integrations; everything absent by
    /// default.
    #[serde(default)]
    capabilities: StaticCapabilities,
}

#[derive(Serialize)]
struct DecideResponse {
    prompt: Option<PromptSelection>,
}

async fn decide(
    State(state): State<AppState>,
    Json(body): Json<DecideRequest>,
) -> Json<DecideResponse> {
    let client_config = body
        .client_config
        .unwrap_or_else(|| state.default_config.as_ref().clone());

    let manager = PromptOrchestrationManager::new(
        Arc::new(StaticConfigSource(client_config)),
        Arc::new(StaticEntitlementsSource {
            entitlements: body.entitlements,
            article: body.article,
        }),
        state.store.clone(),
        state.session.clone(),
        Arc::new(body.capabilities),
        state.sink.clone(),
        state.presenter.clone(),
        state.history.clone(),
    );

    let params = ShowPromptParams {
        auto_prompt_type: body.auto_prompt_type,
        always_show: body.always_show,
        content_type: body.content_type,
    };

    let prompt = match manager.show_auto_prompt(params).await {
        Ok(display) => display.map(|d| d.selection),
        Err(e) => {
            tracing::warn!("decide failed: {e:#}");
            None
        }
    };
    Json(DecideResponse { prompt })
}

#[derive(Deserialize)]
struct EventRequest {
    event: AnalyticsEvent,
}

async fn event(State(state): State<AppState>, Json(body): Json<EventRequest>) -> &'static str {
    state.events.handle(body.event);
    "ok"
}

async fn debug_timestamps(State(state): State<AppState>) -> Json<ActionsTimestamps> {
    Json(state.store.timestamps(None))
}

async fn debug_history(State(state): State<AppState>) -> Json<Vec<DecisionRecord>> {
    Json(state.history.snapshot_last_n(10))
}

async fn debug_last_decision(State(state): State<AppState>) -> Json<Option<DecisionRecord>> {
    Json(state.history.snapshot_last_n(1).pop())
}

async fn admin_clear_timestamps(State(state): State<AppState>) -> &'static str {
    state.store.clear();
    "cleared"
}
