//! # Hub Server Module
//!
//! Implements the WebSocket server the hardware controller and apps connect
//! to, plus the thin HTTP facade.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Hub Server Architecture                          │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                      Axum Router                                │   │
//! │  │                                                                 │   │
//! │  │  /ws         ──▶ WebSocket upgrade                             │   │
//! │  │  /health     ──▶ liveness probe for supervisors                │   │
//! │  │  /api/state  ──▶ read facade                                   │   │
//! │  │  /api/toggle ──▶ write facade (no liveness gate)               │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  Per-connection tasks:                                                 │
//! │  ─────────────────────                                                 │
//! │  receive loop ──▶ decode ──▶ router        (this function)             │
//! │  outgoing task ──▶ drains the registry's bounded mpsc channel and      │
//! │                    owns the socket sink (per-connection FIFO)          │
//! │                                                                         │
//! │  Connection Flow:                                                      │
//! │  ────────────────                                                      │
//! │  1. Client connects, registry assigns an id (role: app, alive)         │
//! │  2. Hub sends a FULL_STATE snapshot                                    │
//! │  3. Frames decode into ClientMessages and hit the router               │
//! │  4. Pongs mark the connection alive for the liveness monitor           │
//! │  5. Close/error unregisters; losing hardware is broadcast              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::api;
use crate::protocol::ClientMessage;
use crate::registry::{ConnectionId, Frame, OUTBOUND_BUFFER};
use crate::router;
use crate::state::SharedState;

/// Maximum inbound frame size. State documents are small; anything bigger
/// than this is garbage.
const MAX_MESSAGE_SIZE: usize = 64 * 1024;

// =============================================================================
// Router Assembly
// =============================================================================

/// Builds the hub's axum router.
pub fn app_router(state: Arc<SharedState>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .route("/api/state", get(api::get_state))
        .route("/api/toggle", post(api::post_toggle))
        .with_state(state)
}

/// Health check endpoint.
async fn health_handler() -> impl IntoResponse {
    "OK"
}

/// WebSocket upgrade handler.
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<SharedState>>,
) -> impl IntoResponse {
    ws.max_message_size(MAX_MESSAGE_SIZE)
        .on_upgrade(move |socket| handle_socket(socket, state))
}

// =============================================================================
// Per-Connection Handling
// =============================================================================

/// Handles one WebSocket connection for its whole lifetime.
async fn handle_socket(socket: WebSocket, state: Arc<SharedState>) {
    let (mut sender, mut receiver) = socket.split();

    let (outgoing_tx, mut outgoing_rx) = mpsc::channel::<Frame>(OUTBOUND_BUFFER);
    let conn_id = state.registry.register(outgoing_tx).await;
    info!(conn_id = %conn_id, "New WebSocket connection");

    // Outgoing task: sole owner of the sink, drains the registry's channel
    // in order. Frame::Close performs the server-side close.
    let outgoing_handle = tokio::spawn(async move {
        while let Some(frame) = outgoing_rx.recv().await {
            let result = match frame {
                Frame::Text(text) => sender.send(Message::Text(text.into())).await,
                Frame::Ping => sender.send(Message::Ping(Default::default())).await,
                Frame::Pong(payload) => sender.send(Message::Pong(payload.into())).await,
                Frame::Close => {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            };
            if result.is_err() {
                break;
            }
        }
    });

    // Every connection starts from a full snapshot.
    router::handle_connect(&state, conn_id).await;

    // Main receive loop.
    while let Some(result) = receiver.next().await {
        match result {
            Ok(Message::Text(text)) => {
                dispatch(&state, conn_id, text.as_str()).await;
            }
            Ok(Message::Binary(data)) => match std::str::from_utf8(&data) {
                Ok(text) => dispatch(&state, conn_id, text).await,
                Err(_) => debug!(conn_id = %conn_id, "Dropping non-UTF8 binary frame"),
            },
            Ok(Message::Pong(_)) => {
                state.registry.mark_alive(conn_id).await;
            }
            Ok(Message::Ping(payload)) => {
                state.registry.send_pong(conn_id, payload.to_vec()).await;
            }
            Ok(Message::Close(_)) => {
                info!(conn_id = %conn_id, "Client requested close");
                break;
            }
            Err(e) => {
                warn!(conn_id = %conn_id, ?e, "WebSocket error");
                break;
            }
        }
    }

    // Cleanup. The router handles the hardware-offline transition if this
    // connection held the hardware role.
    outgoing_handle.abort();
    router::handle_disconnect(&state, conn_id).await;
}

/// Decodes one frame and routes it. Malformed input is logged and dropped;
/// the connection stays open.
async fn dispatch(state: &SharedState, conn_id: ConnectionId, text: &str) {
    match ClientMessage::decode(text) {
        Ok(msg) => router::handle_message(state, conn_id, msg).await,
        Err(e) => {
            debug!(conn_id = %conn_id, ?e, "Dropping undecodable message");
        }
    }
}
