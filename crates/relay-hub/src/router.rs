//! # Message Router
//!
//! Dispatches decoded inbound messages, applies the interlock and
//! hardware-liveness rules, mutates the canonical document, and triggers
//! the fan-out.
//!
//! ## Routing Rules
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Message Router                                  │
//! │                                                                         │
//! │  IDENTIFY(hardware)  promote conn, merge report, liveness → true,      │
//! │                      broadcast FULL_STATE to everyone                  │
//! │  UPDATE_STATUS       merge partial report, STATE_CHANGED to others     │
//! │  TOGGLE_SWITCH       liveness gate → interlock gate → apply + COMMAND  │
//! │                      + STATE_CHANGED to everyone                       │
//! │  SET_SCHEDULE        replace slot, STATE_CHANGED + SYNC_SCHED, persist │
//! │  SET_TIMER           endAt = now + duration, STATE_CHANGED +           │
//! │                      SYNC_TIMER, persist                               │
//! │  DELETE_TASK         clear slot, SYNC_* + STATE_CHANGED, persist       │
//! │  RENAME              replace label, persist, STATE_CHANGED             │
//! │  SYSTEM_UPDATE       liveness gate → merge, COMMAND(SYSTEM) +          │
//! │                      STATE_CHANGED, persist                            │
//! │                                                                         │
//! │  REJECTION PATHS (never broadcast, never fatal)                        │
//! │  ──────────────────────────────────────────────                        │
//! │  hardware offline  → ERROR + FULL_STATE to the sender only             │
//! │  interlock open    → FULL_STATE to the sender only                     │
//! │                                                                         │
//! │  Rejections resynchronize only the requesting connection's view:       │
//! │  no authoritative state changed, so nobody else needs to hear it.      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Broadcasts are enqueued while the document write guard is still held, so
//! every connection observes mutations in the order they were applied.

use tracing::{debug, info, warn};

use crate::protocol::{
    ClientMessage, CommandPayload, DeclaredRole, DeleteTaskPayload, RenamePayload, SchedulePayload,
    ServerMessage, StatusReport, TaskType, TimerPayload, TogglePayload,
};
use crate::registry::{ConnectionId, ConnectionRole};
use crate::state::SharedState;
use relay_core::rules::{check_app_toggle, check_interlock, parse_hhmm, ToggleRejection};
use relay_core::{Schedule, StateDocument, SwitchId, SystemPatch, Timer};

/// Error code sent when an app command arrives while no hardware is attached.
pub const CODE_HARDWARE_OFFLINE: &str = "HARDWARE_OFFLINE";

// =============================================================================
// Connection Lifecycle
// =============================================================================

/// Sends the full-state snapshot a freshly registered connection starts from.
pub async fn handle_connect(state: &SharedState, conn_id: ConnectionId) {
    let doc = state.snapshot().await;
    send_to(state, conn_id, &ServerMessage::FullState(doc)).await;
}

/// Tears down a closed connection.
///
/// Losing the hardware connection flips liveness off and is announced to
/// everyone; losing an app changes nothing.
pub async fn handle_disconnect(state: &SharedState, conn_id: ConnectionId) {
    match state.registry.unregister(conn_id).await {
        Some(ConnectionRole::Hardware) => {
            info!(conn_id = %conn_id, "Hardware connection lost");
            hardware_lost(state).await;
        }
        Some(ConnectionRole::App) => {
            debug!(conn_id = %conn_id, "App connection closed");
        }
        None => {
            // Already evicted by the liveness sweep
        }
    }
}

/// Flips hardware liveness off and announces the new state.
///
/// Called on hardware disconnect and by the liveness monitor when it evicts
/// the hardware connection.
pub async fn hardware_lost(state: &SharedState) {
    let mut doc = state.write().await;
    doc.hardware_online = false;
    broadcast(state, &ServerMessage::FullState(doc.clone()), None).await;
}

// =============================================================================
// Message Dispatch
// =============================================================================

/// Routes one decoded message from a connection.
pub async fn handle_message(state: &SharedState, conn_id: ConnectionId, msg: ClientMessage) {
    debug!(conn_id = %conn_id, kind = msg.type_name(), "Routing message");

    match msg {
        ClientMessage::Identify { role, report } => handle_identify(state, conn_id, role, report).await,
        ClientMessage::UpdateStatus(report) => handle_update_status(state, conn_id, report).await,
        ClientMessage::ToggleSwitch(payload) => handle_toggle(state, conn_id, payload).await,
        ClientMessage::SetSchedule(payload) => handle_set_schedule(state, payload).await,
        ClientMessage::SetTimer(payload) => handle_set_timer(state, payload).await,
        ClientMessage::DeleteTask(payload) => handle_delete_task(state, payload).await,
        ClientMessage::Rename(payload) => handle_rename(state, payload).await,
        ClientMessage::SystemUpdate(patch) => handle_system_update(state, conn_id, patch).await,
    }
}

async fn handle_identify(
    state: &SharedState,
    conn_id: ConnectionId,
    role: DeclaredRole,
    report: StatusReport,
) {
    if role != DeclaredRole::Hardware {
        debug!(conn_id = %conn_id, "App identified");
        return;
    }

    let mut doc = state.write().await;
    merge_report(&mut doc, &report);
    let was_offline = !doc.hardware_online;
    doc.hardware_online = true;
    state.registry.promote_to_hardware(conn_id).await;

    let hardware = state.registry.ids_by_role(ConnectionRole::Hardware).await;
    if hardware.len() > 1 {
        // Stale hardware connections linger until the liveness sweep gets
        // them; the newest one is the authoritative reporter either way.
        warn!(count = hardware.len(), "Multiple connections hold the hardware role");
    }

    info!(conn_id = %conn_id, was_offline, "Hardware controller online");
    broadcast(state, &ServerMessage::FullState(doc.clone()), None).await;
    state.persist_from(&doc);
}

async fn handle_update_status(state: &SharedState, conn_id: ConnectionId, report: StatusReport) {
    let mut doc = state.write().await;
    merge_report(&mut doc, &report);
    broadcast(state, &ServerMessage::StateChanged(doc.clone()), Some(conn_id)).await;
    state.persist_from(&doc);
}

async fn handle_toggle(state: &SharedState, conn_id: ConnectionId, payload: TogglePayload) {
    let mut doc = state.write().await;

    match check_app_toggle(&doc, payload.switch_id, payload.value) {
        Err(ToggleRejection::HardwareOffline) => {
            warn!(conn_id = %conn_id, switch = %payload.switch_id, "Toggle rejected: hardware offline");
            send_to(
                state,
                conn_id,
                &ServerMessage::error(CODE_HARDWARE_OFFLINE, "hardware is offline"),
            )
            .await;
            send_to(state, conn_id, &ServerMessage::FullState(doc.clone())).await;
        }
        Err(ToggleRejection::InterlockOpen(switch)) => {
            // No authoritative state changed: resynchronize only the sender.
            warn!(conn_id = %conn_id, switch = %switch, "Toggle rejected: physical interlock open");
            send_to(state, conn_id, &ServerMessage::FullState(doc.clone())).await;
        }
        Ok(()) => {
            apply_toggle(state, &mut doc, payload.switch_id, payload.value).await;
        }
    }
}

/// Applies an accepted toggle and fans it out: COMMAND first (the hardware
/// acts on it), then the resulting state.
///
/// Shared between the WebSocket path and the HTTP facade; the caller has
/// already run whichever gates apply to its path.
pub(crate) async fn apply_toggle(
    state: &SharedState,
    doc: &mut StateDocument,
    switch: SwitchId,
    value: bool,
) {
    doc.switches.insert(switch, value);
    info!(switch = %switch, value, "Switch toggled");

    broadcast(
        state,
        &ServerMessage::Command(CommandPayload::Toggle {
            switch_id: switch,
            value,
        }),
        None,
    )
    .await;
    broadcast(state, &ServerMessage::StateChanged(doc.clone()), None).await;
    state.persist_from(doc);
}

async fn handle_set_schedule(state: &SharedState, payload: SchedulePayload) {
    if parse_hhmm(&payload.time).is_err() {
        warn!(time = %payload.time, "Ignoring schedule with invalid clock value");
        return;
    }

    let mut doc = state.write().await;
    doc.schedules.insert(
        payload.switch_id,
        Schedule {
            active: payload.active,
            time: Some(payload.time),
            action: Some(payload.action),
        },
    );

    broadcast(state, &ServerMessage::StateChanged(doc.clone()), None).await;
    broadcast(
        state,
        &ServerMessage::Command(CommandPayload::SyncSched {
            schedules: doc.schedules.clone(),
        }),
        None,
    )
    .await;
    state.persist_from(&doc);
}

async fn handle_set_timer(state: &SharedState, payload: TimerPayload) {
    if payload.duration_minutes <= 0 {
        warn!(
            minutes = payload.duration_minutes,
            "Ignoring timer with non-positive duration"
        );
        return;
    }

    let end_at = chrono::Utc::now() + chrono::Duration::minutes(payload.duration_minutes);
    let mut doc = state.write().await;
    doc.timers.insert(
        payload.switch_id,
        Timer {
            active: payload.active,
            end_at: Some(end_at),
            action: Some(payload.action),
        },
    );

    broadcast(state, &ServerMessage::StateChanged(doc.clone()), None).await;
    broadcast(
        state,
        &ServerMessage::Command(CommandPayload::SyncTimer {
            timers: doc.timers.clone(),
        }),
        None,
    )
    .await;
    state.persist_from(&doc);
}

async fn handle_delete_task(state: &SharedState, payload: DeleteTaskPayload) {
    let mut doc = state.write().await;

    let command = match payload.task_type {
        TaskType::Schedule => {
            if let Some(schedule) = doc.schedules.get_mut(&payload.switch_id) {
                schedule.clear();
            }
            CommandPayload::SyncSched {
                schedules: doc.schedules.clone(),
            }
        }
        TaskType::Timer => {
            if let Some(timer) = doc.timers.get_mut(&payload.switch_id) {
                timer.clear();
            }
            CommandPayload::SyncTimer {
                timers: doc.timers.clone(),
            }
        }
    };

    broadcast(state, &ServerMessage::Command(command), None).await;
    broadcast(state, &ServerMessage::StateChanged(doc.clone()), None).await;
    state.persist_from(&doc);
}

async fn handle_rename(state: &SharedState, payload: RenamePayload) {
    let mut doc = state.write().await;
    doc.names.insert(payload.id, payload.new_name);

    state.persist_from(&doc);
    broadcast(state, &ServerMessage::StateChanged(doc.clone()), None).await;
}

async fn handle_system_update(state: &SharedState, conn_id: ConnectionId, patch: SystemPatch) {
    let mut doc = state.write().await;

    if !doc.hardware_online {
        warn!(conn_id = %conn_id, "System update rejected: hardware offline");
        send_to(
            state,
            conn_id,
            &ServerMessage::error(CODE_HARDWARE_OFFLINE, "hardware is offline"),
        )
        .await;
        send_to(state, conn_id, &ServerMessage::FullState(doc.clone())).await;
        return;
    }

    if patch.is_empty() {
        debug!(conn_id = %conn_id, "Empty system update - nothing to merge");
        return;
    }

    doc.system.apply(&patch);
    broadcast(
        state,
        &ServerMessage::Command(CommandPayload::System {
            system: doc.system.clone(),
        }),
        None,
    )
    .await;
    broadcast(state, &ServerMessage::StateChanged(doc.clone()), None).await;
    state.persist_from(&doc);
}

// =============================================================================
// HTTP Facade Path
// =============================================================================

/// Toggle entry point for the HTTP facade.
///
/// Shares the engine mutation path but skips the hardware-liveness gate;
/// only the physical interlock applies.
pub async fn facade_toggle(
    state: &SharedState,
    switch: SwitchId,
    value: bool,
) -> Result<StateDocument, ToggleRejection> {
    let mut doc = state.write().await;
    check_interlock(&doc, switch, value)?;
    apply_toggle(state, &mut doc, switch, value).await;
    Ok(doc.clone())
}

// =============================================================================
// Helpers
// =============================================================================

/// Merges a partial hardware report into the document.
fn merge_report(doc: &mut StateDocument, report: &StatusReport) {
    if let Some(ref switches) = report.switches {
        for (id, value) in switches {
            doc.switches.insert(*id, *value);
        }
    }
    if let Some(ref physical) = report.physical {
        for (id, value) in physical {
            doc.physical.insert(*id, *value);
        }
    }
    if let Some(ref system) = report.system {
        doc.system.apply(system);
    }
}

/// Serializes once and fans out to everyone except `exclude`.
pub(crate) async fn broadcast(
    state: &SharedState,
    msg: &ServerMessage,
    exclude: Option<ConnectionId>,
) {
    match msg.to_json() {
        Ok(json) => state.registry.broadcast(&json, exclude).await,
        Err(e) => warn!(?e, kind = msg.type_name(), "Failed to serialize broadcast"),
    }
}

/// Sends one message to one connection.
async fn send_to(state: &SharedState, conn_id: ConnectionId, msg: &ServerMessage) {
    match msg.to_json() {
        Ok(json) => {
            if !state.registry.send_to(conn_id, &json).await {
                debug!(conn_id = %conn_id, "Connection gone before targeted send");
            }
        }
        Err(e) => warn!(?e, kind = msg.type_name(), "Failed to serialize targeted message"),
    }
}
