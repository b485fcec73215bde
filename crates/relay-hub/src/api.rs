//! # HTTP Facade
//!
//! Thin read/write endpoints over the same engine mutation path the
//! WebSocket protocol uses.
//!
//! - `GET /api/state` returns the current canonical document.
//! - `POST /api/toggle {switchId, value}` is a subset of TOGGLE_SWITCH
//!   without the hardware-liveness gate. The physical interlock still
//!   applies: a violation answers 403 with a reason, malformed input 400.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::Response, Json};
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::router;
use crate::state::SharedState;
use relay_core::{StateDocument, SwitchId};

/// Body of `POST /api/toggle`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleRequest {
    pub switch_id: SwitchId,
    pub value: bool,
}

/// Successful toggle answer.
#[derive(Debug, Serialize)]
pub struct ToggleResponse {
    pub success: bool,
    pub state: StateDocument,
}

/// Rejection answer (400/403).
#[derive(Debug, Serialize)]
pub struct RejectionResponse {
    pub success: bool,
    pub reason: String,
}

/// `GET /api/state`
pub async fn get_state(State(state): State<Arc<SharedState>>) -> Json<StateDocument> {
    Json(state.snapshot().await)
}

/// `POST /api/toggle`
pub async fn post_toggle(
    State(state): State<Arc<SharedState>>,
    Json(body): Json<serde_json::Value>,
) -> Response {
    let request: ToggleRequest = match serde_json::from_value(body) {
        Ok(request) => request,
        Err(e) => {
            debug!(?e, "Rejecting malformed toggle request");
            return (
                StatusCode::BAD_REQUEST,
                Json(RejectionResponse {
                    success: false,
                    reason: e.to_string(),
                }),
            )
                .into_response();
        }
    };

    match router::facade_toggle(&state, request.switch_id, request.value).await {
        Ok(doc) => (
            StatusCode::OK,
            Json(ToggleResponse {
                success: true,
                state: doc,
            }),
        )
            .into_response(),
        Err(rejection) => (
            StatusCode::FORBIDDEN,
            Json(RejectionResponse {
                success: false,
                reason: rejection.to_string(),
            }),
        )
            .into_response(),
    }
}
