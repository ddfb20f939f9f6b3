//! Optional HTTP surface over the Public Surface operations (design
//! §4.6.1).
//!
//! Grounded on the teacher's `api/mod.rs` (an `axum::Router` built from a
//! shared `AppState`, route handlers returning `Json<T>` or a typed error
//! response). Routes are scoped under `/teams/:team_id` so one process can
//! host several teams, each lazily constructed on first use via
//! [`crate::team::Team::new`].

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, RwLock};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::OrchestratorConfig;
use crate::error::OrchestratorError;
use crate::log_stream::select_all;
use crate::models::{AgentDefinition, CleanedState, Task};
use crate::team::Team;
use crate::tools::ToolRegistry;
use crate::workflow::WorkflowController;

struct AppState {
    config: OrchestratorConfig,
    teams: RwLock<HashMap<String, Arc<WorkflowController>>>,
}

impl AppState {
    async fn get_or_create(&self, team_id: &str) -> Arc<WorkflowController> {
        if let Some(existing) = self.teams.read().await.get(team_id) {
            return existing.clone();
        }
        let mut teams = self.teams.write().await;
        teams
            .entry(team_id.to_string())
            .or_insert_with(|| {
                Arc::new(Team::new(
                    team_id.to_string(),
                    &self.config,
                    ToolRegistry::new(),
                    HashMap::new(),
                ))
            })
            .clone()
    }
}

/// Thin wrapper so [`OrchestratorError`] can be returned directly from a
/// handler and rendered as a JSON error body with an appropriate status.
struct ApiError(OrchestratorError);

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self.0 {
            OrchestratorError::UnknownTask(_) | OrchestratorError::UnknownAgent(_) => {
                axum::http::StatusCode::NOT_FOUND
            }
            OrchestratorError::Configuration(_) | OrchestratorError::InvalidTransition(_) => {
                axum::http::StatusCode::BAD_REQUEST
            }
            _ => axum::http::StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(ErrorResponse { error: self.0.to_string() })).into_response()
    }
}

impl From<OrchestratorError> for ApiError {
    fn from(err: OrchestratorError) -> Self {
        ApiError(err)
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Deserialize)]
struct StartRequest {
    agents: Vec<AgentDefinition>,
    tasks: Vec<Task>,
    #[serde(default)]
    inputs: HashMap<String, String>,
}

#[derive(Deserialize)]
struct SetEnvRequest {
    updates: HashMap<String, String>,
}

#[derive(Serialize)]
struct AckResponse {
    ok: bool,
}

async fn health() -> Json<AckResponse> {
    Json(AckResponse { ok: true })
}

async fn start_team(
    State(state): State<Arc<AppState>>,
    Path(team_id): Path<String>,
    Json(req): Json<StartRequest>,
) -> Result<Json<AckResponse>, ApiError> {
    let controller = state.get_or_create(&team_id).await;
    controller.start(req.agents, req.tasks, req.inputs).await?;
    Ok(Json(AckResponse { ok: true }))
}

async fn pause_team(
    State(state): State<Arc<AppState>>,
    Path(team_id): Path<String>,
) -> Result<Json<AckResponse>, ApiError> {
    let controller = state.get_or_create(&team_id).await;
    controller.pause().await?;
    Ok(Json(AckResponse { ok: true }))
}

async fn resume_team(
    State(state): State<Arc<AppState>>,
    Path(team_id): Path<String>,
) -> Result<Json<AckResponse>, ApiError> {
    let controller = state.get_or_create(&team_id).await;
    controller.resume().await?;
    Ok(Json(AckResponse { ok: true }))
}

async fn stop_team(
    State(state): State<Arc<AppState>>,
    Path(team_id): Path<String>,
) -> Result<Json<AckResponse>, ApiError> {
    let controller = state.get_or_create(&team_id).await;
    controller.stop().await?;
    Ok(Json(AckResponse { ok: true }))
}

async fn set_env(
    State(state): State<Arc<AppState>>,
    Path(team_id): Path<String>,
    Json(req): Json<SetEnvRequest>,
) -> Result<Json<AckResponse>, ApiError> {
    let controller = state.get_or_create(&team_id).await;
    controller.set_env(req.updates).await;
    Ok(Json(AckResponse { ok: true }))
}

async fn get_state(
    State(state): State<Arc<AppState>>,
    Path(team_id): Path<String>,
) -> Json<CleanedState> {
    let controller = state.get_or_create(&team_id).await;
    Json(controller.get_cleaned_state().await)
}

async fn logs_stream(
    State(state): State<Arc<AppState>>,
    Path(team_id): Path<String>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let controller = state.get_or_create(&team_id).await;
    let mut subscription = controller.subscribe(select_all());
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Some(entry) = subscription.next().await {
            let event = match Event::default().json_data(&entry) {
                Ok(event) => event,
                Err(_) => continue,
            };
            if tx.send(Ok(event)).is_err() {
                break;
            }
        }
    });

    Sse::new(UnboundedReceiverStream::new(rx)).keep_alive(KeepAlive::default())
}

/// Builds the router. `config` seeds any team lazily constructed by a
/// first request to a previously unseen `team_id`.
pub fn router(config: OrchestratorConfig) -> Router {
    let state = Arc::new(AppState {
        config,
        teams: RwLock::new(HashMap::new()),
    });

    Router::new()
        .route("/health", get(health))
        .route("/teams/{team_id}/start", post(start_team))
        .route("/teams/{team_id}/pause", post(pause_team))
        .route("/teams/{team_id}/resume", post(resume_team))
        .route("/teams/{team_id}/stop", post(stop_team))
        .route("/teams/{team_id}/env", post(set_env))
        .route("/teams/{team_id}/state", get(get_state))
        .route("/teams/{team_id}/logs/stream", get(logs_stream))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
