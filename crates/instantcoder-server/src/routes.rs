//! HTTP routes
//!
//! JSON API over the session manager plus an SSE feed of generation events
//! and the project download.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::Stream;
use instantcoder_engine::{Conversation, GenerationSession, Mode, Status, Submission};
use instantcoder_inference::ModelOption;
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::{ApiError, ApiResult};
use crate::export::{ProjectExporter, ARCHIVE_NAME};
use crate::sessions::SessionManager;

/// Shared state for Axum handlers
pub struct AppState {
    pub sessions: Arc<SessionManager>,
    pub config: AppConfig,
    pub exporter: ProjectExporter,
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/models", get(list_models))
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/:id", get(get_session).delete(delete_session))
        .route("/api/sessions/:id/generate", post(generate))
        .route("/api/sessions/:id/events", get(session_events))
        .route("/api/download", get(download_project))
        .layer(cors)
        .with_state(state)
}

// --- Axum Handlers ---

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    backend: &'static str,
    sessions: usize,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        backend: state.sessions.backend().name(),
        sessions: state.sessions.session_count().await,
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ModelsResponse {
    models: Vec<ModelOption>,
    default_model: Option<String>,
}

async fn list_models(State(state): State<Arc<AppState>>) -> Json<ModelsResponse> {
    Json(ModelsResponse {
        models: state.config.models.clone(),
        default_model: state.config.default_model().map(str::to_string),
    })
}

#[derive(Debug, Serialize)]
struct CreatedSession {
    id: Uuid,
}

async fn create_session(State(state): State<Arc<AppState>>) -> (StatusCode, Json<CreatedSession>) {
    let id = state.sessions.create_session().await;
    (StatusCode::CREATED, Json(CreatedSession { id }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionView {
    id: Uuid,
    status: Status,
    session: GenerationSession,
    model_id: Option<String>,
    conversation: Conversation,
}

async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<SessionView>> {
    let controller = state
        .sessions
        .controller(id)
        .await
        .ok_or_else(|| ApiError::session_not_found(id))?;

    let session = controller.session();
    Ok(Json(SessionView {
        id,
        status: session.status,
        session,
        model_id: controller.model_id(),
        conversation: controller.conversation(),
    }))
}

async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    if state.sessions.remove_session(id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::session_not_found(id))
    }
}

#[derive(Debug, Deserialize)]
struct GenerateRequest {
    intent: String,
    #[serde(default = "default_mode")]
    mode: Mode,
    #[serde(default)]
    model: Option<String>,
}

fn default_mode() -> Mode {
    Mode::Create
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateAccepted {
    cycle_id: Uuid,
    status: Status,
}

async fn generate(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<GenerateRequest>,
) -> ApiResult<(StatusCode, Json<GenerateAccepted>)> {
    let model = req.model.filter(|m| !m.trim().is_empty());
    if let (Mode::Create, Some(model)) = (req.mode, model.as_deref()) {
        if !state.config.is_model_enabled(model) {
            return Err(ApiError::Validation(format!("Model '{}' is not available", model)));
        }
    }

    let submission = Submission {
        intent: req.intent,
        mode: req.mode,
        model_id: model,
    };
    let session = state.sessions.start_generation(id, submission).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(GenerateAccepted {
            cycle_id: session.id,
            status: session.status,
        }),
    ))
}

async fn session_events(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let rx = state
        .sessions
        .subscribe(id)
        .await
        .ok_or_else(|| ApiError::session_not_found(id))?;

    let stream = BroadcastStream::new(rx).filter_map(move |item| match item {
        Ok(event) => match serde_json::to_string(&event) {
            Ok(json) => Some(Ok(Event::default().event("message").data(json))),
            Err(e) => {
                log::warn!("[api] Failed to encode event for session {}: {}", id, e);
                None
            }
        },
        Err(BroadcastStreamRecvError::Lagged(skipped)) => {
            log::warn!("[api] SSE subscriber of session {} lagged by {} events", id, skipped);
            None
        }
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

async fn download_project(State(state): State<Arc<AppState>>) -> ApiResult<Response> {
    let exporter = state.exporter.clone();
    let bytes = tokio::task::spawn_blocking(move || exporter.archive_bytes())
        .await
        .map_err(|e| ApiError::Internal(format!("Export task failed: {}", e)))??;

    let headers = [
        (header::CONTENT_TYPE, "application/zip".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", ARCHIVE_NAME),
        ),
    ];
    Ok((headers, bytes).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sessions::tests::manager;
    use std::time::Duration;

    fn app_state(export_root: &std::path::Path) -> Arc<AppState> {
        Arc::new(AppState {
            sessions: Arc::new(manager(Duration::from_secs(60))),
            config: AppConfig::default(),
            exporter: ProjectExporter::new(export_root),
        })
    }

    fn request(intent: &str, mode: Mode, model: Option<&str>) -> Json<GenerateRequest> {
        Json(GenerateRequest {
            intent: intent.to_string(),
            mode,
            model: model.map(str::to_string),
        })
    }

    #[tokio::test]
    async fn test_generate_accepts_and_completes() {
        let dir = tempfile::tempdir().unwrap();
        let state = app_state(dir.path());
        let (_, Json(created)) = create_session(State(state.clone())).await;
        let mut rx = state.sessions.subscribe(created.id).await.unwrap();

        let (status, Json(accepted)) = generate(
            State(state.clone()),
            Path(created.id),
            request("Build me a calculator app", Mode::Create, None),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(accepted.status, Status::Creating);

        while !rx.recv().await.unwrap().is_terminal() {}

        let Json(view) = get_session(State(state.clone()), Path(created.id)).await.unwrap();
        assert_eq!(view.status, Status::Created);
        assert_eq!(view.conversation.len(), 2);
        assert_eq!(view.model_id.as_deref(), Some("gemini-2.0-flash-exp"));
    }

    #[tokio::test]
    async fn test_generate_validation_statuses() {
        let dir = tempfile::tempdir().unwrap();
        let state = app_state(dir.path());
        let (_, Json(created)) = create_session(State(state.clone())).await;

        let empty = generate(State(state.clone()), Path(created.id), request("  ", Mode::Create, None))
            .await
            .unwrap_err();
        assert_eq!(empty.status_code(), StatusCode::UNPROCESSABLE_ENTITY);

        let disabled = generate(
            State(state.clone()),
            Path(created.id),
            request("a clock", Mode::Create, Some("deepseek-r1")),
        )
        .await
        .unwrap_err();
        assert_eq!(disabled.status_code(), StatusCode::UNPROCESSABLE_ENTITY);

        let missing = generate(State(state.clone()), Path(Uuid::new_v4()), request("a clock", Mode::Create, None))
            .await
            .unwrap_err();
        assert_eq!(missing.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_delete_session() {
        let dir = tempfile::tempdir().unwrap();
        let state = app_state(dir.path());
        let (_, Json(created)) = create_session(State(state.clone())).await;

        let status = delete_session(State(state.clone()), Path(created.id)).await.unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(delete_session(State(state.clone()), Path(created.id)).await.is_err());
        assert!(get_session(State(state), Path(created.id)).await.is_err());
    }

    #[tokio::test]
    async fn test_download_headers() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("package.json"), "{}").unwrap();
        let state = app_state(dir.path());

        let response = download_project(State(state)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/zip");
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"instantcoder-project.zip\""
        );
    }

    #[tokio::test]
    async fn test_models_and_health() {
        let dir = tempfile::tempdir().unwrap();
        let state = app_state(dir.path());

        let Json(models) = list_models(State(state.clone())).await;
        assert_eq!(models.default_model.as_deref(), Some("gemini-2.0-flash-exp"));
        assert_eq!(models.models.len(), 3);

        let Json(health) = health(State(state)).await;
        assert_eq!(health.status, "ok");
        assert_eq!(health.backend, "Echo");
    }
}
