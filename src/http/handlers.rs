use super::state::AppState;
use crate::call::{CallController, CallError, CallHandlers, CallState, Role, Session};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct StartCallRequest {
    pub role: Role,
    /// Customer id or agent id, depending on role
    pub party_id: String,
}

#[derive(Debug, Serialize)]
pub struct StartCallResponse {
    pub call_id: String,
    pub state: CallState,
}

#[derive(Debug, Deserialize, Default)]
pub struct DisconnectRequest {
    /// Keep the media session alive when false (screen navigation)
    pub disconnect_media: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct ProfanityResponse {
    pub call_id: String,
    pub profanity_count: u32,
    pub state: CallState,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn call_error_status(error: &CallError) -> StatusCode {
    match error {
        CallError::EmptyPartyId | CallError::RoleMismatch | CallError::NoMatchData => {
            StatusCode::BAD_REQUEST
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /calls
/// Create a controller for one party and start waiting/listening
pub async fn start_call(
    State(state): State<AppState>,
    Json(req): Json<StartCallRequest>,
) -> impl IntoResponse {
    info!("Starting call session for {:?} {}", req.role, req.party_id);

    let controller = CallController::new(
        req.role,
        state.matching_url.clone(),
        Arc::clone(&state.transport),
        Arc::clone(&state.tokens),
        CallHandlers::default(),
    );

    let result = match req.role {
        Role::Customer => controller.start_waiting(&req.party_id).await,
        Role::Agent => controller.start_listening(&req.party_id).await,
    };

    if let Err(e) = result {
        error!("Failed to start call session: {}", e);
        return (
            call_error_status(&e),
            Json(ErrorResponse {
                error: format!("Failed to start call session: {}", e),
            }),
        )
            .into_response();
    }

    let call_id = controller.session().session_id;
    state
        .calls
        .write()
        .await
        .insert(call_id.clone(), controller.clone());

    (
        StatusCode::OK,
        Json(StartCallResponse {
            call_id,
            state: controller.state(),
        }),
    )
        .into_response()
}

/// GET /calls/:call_id
/// Current session snapshot
pub async fn get_call(
    State(state): State<AppState>,
    Path(call_id): Path<String>,
) -> impl IntoResponse {
    let calls = state.calls.read().await;

    match calls.get(&call_id) {
        Some(controller) => {
            let session: Session = controller.session();
            (StatusCode::OK, Json(session)).into_response()
        }
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("Call {} not found", call_id),
            }),
        )
            .into_response(),
    }
}

/// POST /calls/:call_id/connect
/// Manual media join after operator confirmation (agent side)
pub async fn connect_call(
    State(state): State<AppState>,
    Path(call_id): Path<String>,
) -> impl IntoResponse {
    let controller = {
        let calls = state.calls.read().await;
        calls.get(&call_id).cloned()
    };

    match controller {
        Some(controller) => match controller.connect_to_call().await {
            Ok(()) => (StatusCode::OK, Json(controller.session())).into_response(),
            Err(e) => {
                error!("Failed to connect call {}: {}", call_id, e);
                (
                    call_error_status(&e),
                    Json(ErrorResponse {
                        error: format!("Failed to connect call: {}", e),
                    }),
                )
                    .into_response()
            }
        },
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("Call {} not found", call_id),
            }),
        )
            .into_response(),
    }
}

/// POST /calls/:call_id/disconnect
/// End the wait/call; the controller is dropped from the registry
pub async fn disconnect_call(
    State(state): State<AppState>,
    Path(call_id): Path<String>,
    Json(req): Json<DisconnectRequest>,
) -> impl IntoResponse {
    let controller = {
        let mut calls = state.calls.write().await;
        calls.remove(&call_id)
    };

    match controller {
        Some(controller) => {
            controller
                .disconnect(req.disconnect_media.unwrap_or(true))
                .await;
            info!("Call {} disconnected", call_id);
            (StatusCode::OK, Json(controller.session())).into_response()
        }
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("Call {} not found", call_id),
            }),
        )
            .into_response(),
    }
}

/// POST /calls/:call_id/profanity
/// Record an abusive-speech incident; terminates at the threshold
pub async fn record_profanity(
    State(state): State<AppState>,
    Path(call_id): Path<String>,
) -> impl IntoResponse {
    let controller = {
        let calls = state.calls.read().await;
        calls.get(&call_id).cloned()
    };

    match controller {
        Some(controller) => {
            let profanity_count = controller.record_profanity().await;
            (
                StatusCode::OK,
                Json(ProfanityResponse {
                    call_id,
                    profanity_count,
                    state: controller.state(),
                }),
            )
                .into_response()
        }
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("Call {} not found", call_id),
            }),
        )
            .into_response(),
    }
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
