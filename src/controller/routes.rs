//! HTTP surface of the controller.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use super::Controller;
use crate::error::HalError;

#[derive(Debug, Clone, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    /// Conversation to continue; the default conversation when absent.
    #[serde(default)]
    pub conversation_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub response: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub detail: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub sessions: usize,
    pub tools: usize,
}

/// Create the controller router.
pub fn router(controller: Arc<Controller>) -> Router {
    Router::new()
        .route("/query", post(query))
        .route("/conversations/:id", delete(end_conversation))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(controller)
}

async fn query(
    State(controller): State<Arc<Controller>>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, AppError> {
    if request.query.trim().is_empty() {
        return Err(AppError::BadRequest("query must not be empty".into()));
    }

    let response = controller
        .handle_query(request.conversation_id.as_deref(), &request.query)
        .await?;
    Ok(Json(QueryResponse { response }))
}

async fn end_conversation(
    State(controller): State<Arc<Controller>>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    if controller.end_conversation(&id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("conversation '{id}' not found")))
    }
}

async fn health(State(controller): State<Arc<Controller>>) -> Json<HealthResponse> {
    let tools = match controller.registry().snapshot().await {
        Ok(catalogue) => catalogue.len(),
        Err(error) => {
            tracing::warn!(error = %error, "Tool discovery failed during health check");
            0
        }
    };

    Json(HealthResponse {
        status: "ok".into(),
        sessions: controller.registry().session_count(),
        tools,
    })
}

// ============================================================
// Error Handling
// ============================================================

enum AppError {
    BadRequest(String),
    NotFound(String),
    ServiceUnavailable(String),
    Internal(String),
}

impl From<HalError> for AppError {
    fn from(error: HalError) -> Self {
        match error {
            HalError::NoSessions => AppError::ServiceUnavailable(error.to_string()),
            HalError::InvalidArgument(message) => AppError::BadRequest(message),
            other => {
                tracing::error!(category = ?other.category(), error = %other, "Query failed");
                AppError::Internal(other.to_string())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        (status, Json(ErrorResponse { detail })).into_response()
    }
}
