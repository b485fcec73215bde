//! # Wire Protocol Messages
//!
//! Message types for hub communication with the hardware controller and apps.
//!
//! ## Protocol Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Hub Protocol Messages                            │
//! │                                                                         │
//! │  HANDSHAKE FLOW                                                        │
//! │  ──────────────                                                        │
//! │  client    ───► connects                                               │
//! │  hub       ───► FULL_STATE { ...canonical document... }                │
//! │  hardware  ───► IDENTIFY { role: "hardware", data: status report }     │
//! │  hub       ───► FULL_STATE broadcast (hardware now online)             │
//! │                                                                         │
//! │  INTENTS (app or hardware → hub)                                       │
//! │  ───────────────────────────────                                       │
//! │  TOGGLE_SWITCH { switchId, value }                                     │
//! │  SET_SCHEDULE  { switchId, active, time, action }                      │
//! │  SET_TIMER     { switchId, active, durationMinutes, action }           │
//! │  DELETE_TASK   { switchId, taskType }                                  │
//! │  RENAME        { id, newName }                                         │
//! │  SYSTEM_UPDATE { ambientMode?, signalStrength?, reboot? }              │
//! │  UPDATE_STATUS { switches?, physical?, system? }   (hardware report)   │
//! │                                                                         │
//! │  FAN-OUT (hub → clients)                                               │
//! │  ───────────────────────                                               │
//! │  FULL_STATE / STATE_CHANGED { ...canonical document... }               │
//! │  COMMAND { action: TOGGLE | SYSTEM | SYNC_SCHED | SYNC_TIMER, ... }    │
//! │  ERROR { code, message }                                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Wire Format
//! Messages are JSON envelopes:
//! ```json
//! { "type": "TOGGLE_SWITCH", "data": { "switchId": "switch2", "value": true } }
//! ```
//! IDENTIFY additionally carries an envelope-level `role` field, which is why
//! inbound decoding goes through a small [`Envelope`] struct instead of a
//! plain tagged enum. Unknown `type` tags fail decode there and never reach
//! the router.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{HubError, HubResult};
use relay_core::{
    LabelId, Schedule, StateDocument, SwitchAction, SwitchId, SystemPatch, SystemSettings, Timer,
};

// =============================================================================
// Connection Role
// =============================================================================

/// Role a connection declares in IDENTIFY.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeclaredRole {
    /// The single physical controller, authoritative for physical positions.
    Hardware,

    /// A remote control surface.
    App,
}

// =============================================================================
// Inbound Payloads
// =============================================================================

/// Partial state report from the hardware controller.
///
/// Absent sections are left untouched on merge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub switches: Option<BTreeMap<SwitchId, bool>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub physical: Option<BTreeMap<SwitchId, bool>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<SystemPatch>,
}

/// Toggle intent for one switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TogglePayload {
    pub switch_id: SwitchId,
    pub value: bool,
}

/// Replaces the schedule slot of one switch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulePayload {
    pub switch_id: SwitchId,
    pub active: bool,
    /// Local fire time as "HH:MM".
    pub time: String,
    pub action: SwitchAction,
}

/// Replaces the timer slot of one switch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerPayload {
    pub switch_id: SwitchId,
    pub active: bool,
    /// Minutes from now until the timer fires.
    pub duration_minutes: i64,
    pub action: SwitchAction,
}

/// Which per-switch task slot DELETE_TASK clears.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Schedule,
    Timer,
}

/// Clears one task slot of one switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteTaskPayload {
    pub switch_id: SwitchId,
    pub task_type: TaskType,
}

/// Replaces one display label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenamePayload {
    pub id: LabelId,
    pub new_name: String,
}

// =============================================================================
// Inbound Messages
// =============================================================================

/// All decoded inbound messages.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    /// Connection identifies itself; hardware carries an initial report.
    Identify {
        role: DeclaredRole,
        report: StatusReport,
    },

    /// Partial state report (merged without a role check).
    UpdateStatus(StatusReport),

    /// Toggle intent, subject to liveness and interlock gates.
    ToggleSwitch(TogglePayload),

    /// Replace a schedule slot.
    SetSchedule(SchedulePayload),

    /// Replace a timer slot.
    SetTimer(TimerPayload),

    /// Clear a schedule or timer slot.
    DeleteTask(DeleteTaskPayload),

    /// Replace a display label.
    Rename(RenamePayload),

    /// Merge auxiliary system fields, subject to the liveness gate.
    SystemUpdate(SystemPatch),
}

/// Closed set of inbound message tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum ClientKind {
    Identify,
    UpdateStatus,
    ToggleSwitch,
    SetSchedule,
    SetTimer,
    DeleteTask,
    Rename,
    SystemUpdate,
}

/// Raw inbound envelope: `{ "type": KIND, "data": payload, "role"? }`.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: ClientKind,

    #[serde(default)]
    data: serde_json::Value,

    /// Only meaningful on IDENTIFY.
    #[serde(default)]
    role: Option<DeclaredRole>,
}

/// Decodes a required payload out of the envelope's `data` field.
fn payload<T: serde::de::DeserializeOwned>(data: serde_json::Value) -> HubResult<T> {
    serde_json::from_value(data).map_err(|e| HubError::DecodeFailed(e.to_string()))
}

impl ClientMessage {
    /// Decodes an inbound frame.
    ///
    /// Unknown `type` tags, unknown identifiers, and malformed payloads all
    /// fail here; the caller logs and drops them without touching state or
    /// the connection.
    pub fn decode(text: &str) -> HubResult<Self> {
        let envelope: Envelope =
            serde_json::from_str(text).map_err(|e| HubError::DecodeFailed(e.to_string()))?;

        let msg = match envelope.kind {
            ClientKind::Identify => {
                // Apps identify with no payload at all; hardware sends an
                // initial status report alongside its role.
                let report = if envelope.data.is_null() {
                    StatusReport::default()
                } else {
                    payload(envelope.data)?
                };
                ClientMessage::Identify {
                    role: envelope.role.unwrap_or(DeclaredRole::App),
                    report,
                }
            }
            ClientKind::UpdateStatus => ClientMessage::UpdateStatus(payload(envelope.data)?),
            ClientKind::ToggleSwitch => ClientMessage::ToggleSwitch(payload(envelope.data)?),
            ClientKind::SetSchedule => ClientMessage::SetSchedule(payload(envelope.data)?),
            ClientKind::SetTimer => ClientMessage::SetTimer(payload(envelope.data)?),
            ClientKind::DeleteTask => ClientMessage::DeleteTask(payload(envelope.data)?),
            ClientKind::Rename => ClientMessage::Rename(payload(envelope.data)?),
            ClientKind::SystemUpdate => ClientMessage::SystemUpdate(payload(envelope.data)?),
        };

        Ok(msg)
    }

    /// Returns the message type name as a string (for logging).
    pub fn type_name(&self) -> &'static str {
        match self {
            ClientMessage::Identify { .. } => "IDENTIFY",
            ClientMessage::UpdateStatus(_) => "UPDATE_STATUS",
            ClientMessage::ToggleSwitch(_) => "TOGGLE_SWITCH",
            ClientMessage::SetSchedule(_) => "SET_SCHEDULE",
            ClientMessage::SetTimer(_) => "SET_TIMER",
            ClientMessage::DeleteTask(_) => "DELETE_TASK",
            ClientMessage::Rename(_) => "RENAME",
            ClientMessage::SystemUpdate(_) => "SYSTEM_UPDATE",
        }
    }
}

// =============================================================================
// Outbound Messages
// =============================================================================

/// Command relayed to the hardware (and mirrored to apps).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandPayload {
    /// Drive one switch to a position.
    #[serde(rename_all = "camelCase")]
    Toggle { switch_id: SwitchId, value: bool },

    /// Apply the current auxiliary settings.
    System { system: SystemSettings },

    /// Re-sync the full schedule table.
    SyncSched {
        schedules: BTreeMap<SwitchId, Schedule>,
    },

    /// Re-sync the full timer table.
    SyncTimer { timers: BTreeMap<SwitchId, Timer> },
}

/// All outbound messages.
///
/// Uses serde's adjacently tagged enum for clean JSON serialization:
/// `{ "type": "FULL_STATE", "data": { ... } }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerMessage {
    /// Complete canonical document, sent on connect and on role changes.
    FullState(StateDocument),

    /// Complete canonical document after an applied mutation.
    StateChanged(StateDocument),

    /// Command fan-out.
    Command(CommandPayload),

    /// Policy rejection or protocol error, sent to one connection only.
    Error { code: String, message: String },
}

impl ServerMessage {
    /// Returns the message type name as a string (for logging).
    pub fn type_name(&self) -> &'static str {
        match self {
            ServerMessage::FullState(_) => "FULL_STATE",
            ServerMessage::StateChanged(_) => "STATE_CHANGED",
            ServerMessage::Command(_) => "COMMAND",
            ServerMessage::Error { .. } => "ERROR",
        }
    }

    /// Creates an Error message.
    pub fn error(code: &str, message: &str) -> Self {
        ServerMessage::Error {
            code: code.to_string(),
            message: message.to_string(),
        }
    }

    /// Serializes to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserializes from JSON string.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_toggle() {
        let msg = ClientMessage::decode(
            r#"{"type":"TOGGLE_SWITCH","data":{"switchId":"switch2","value":true}}"#,
        )
        .unwrap();
        assert_eq!(
            msg,
            ClientMessage::ToggleSwitch(TogglePayload {
                switch_id: SwitchId::Switch2,
                value: true,
            })
        );
    }

    #[test]
    fn test_decode_identify_hardware() {
        let msg = ClientMessage::decode(
            r#"{
                "type": "IDENTIFY",
                "role": "hardware",
                "data": {
                    "switches": { "switch1": true },
                    "physical": { "switch3": true },
                    "system": { "signalStrength": -61 }
                }
            }"#,
        )
        .unwrap();

        match msg {
            ClientMessage::Identify { role, report } => {
                assert_eq!(role, DeclaredRole::Hardware);
                assert_eq!(report.switches.unwrap()[&SwitchId::Switch1], true);
                assert_eq!(report.physical.unwrap()[&SwitchId::Switch3], true);
                assert_eq!(report.system.unwrap().signal_strength, Some(-61));
            }
            other => panic!("expected Identify, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_identify_app_without_payload() {
        let msg = ClientMessage::decode(r#"{"type":"IDENTIFY"}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::Identify {
                role: DeclaredRole::App,
                report: StatusReport::default(),
            }
        );
    }

    #[test]
    fn test_decode_rejects_unknown_tag() {
        assert!(ClientMessage::decode(r#"{"type":"SELF_DESTRUCT","data":{}}"#).is_err());
    }

    #[test]
    fn test_decode_rejects_unknown_switch() {
        // switch9 is outside the closed set
        let result = ClientMessage::decode(
            r#"{"type":"TOGGLE_SWITCH","data":{"switchId":"switch9","value":true}}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_decode_rejects_malformed_payload() {
        assert!(ClientMessage::decode(r#"{"type":"TOGGLE_SWITCH","data":{"value":1}}"#).is_err());
        assert!(ClientMessage::decode("not json at all").is_err());
    }

    #[test]
    fn test_decode_delete_task() {
        let msg = ClientMessage::decode(
            r#"{"type":"DELETE_TASK","data":{"switchId":"switch1","taskType":"timer"}}"#,
        )
        .unwrap();
        assert_eq!(
            msg,
            ClientMessage::DeleteTask(DeleteTaskPayload {
                switch_id: SwitchId::Switch1,
                task_type: TaskType::Timer,
            })
        );
    }

    #[test]
    fn test_server_message_envelope_shape() {
        let msg = ServerMessage::FullState(StateDocument::default());
        let json = msg.to_json().unwrap();
        assert!(json.contains("\"type\":\"FULL_STATE\""));
        assert!(json.contains("\"data\""));
        assert!(json.contains("\"isHardwareOnline\":false"));

        let parsed = ServerMessage::from_json(&json).unwrap();
        assert_eq!(parsed.type_name(), "FULL_STATE");
    }

    #[test]
    fn test_command_serialization() {
        let cmd = ServerMessage::Command(CommandPayload::Toggle {
            switch_id: SwitchId::Switch4,
            value: false,
        });
        let json = cmd.to_json().unwrap();
        assert!(json.contains("\"type\":\"COMMAND\""));
        assert!(json.contains("\"action\":\"TOGGLE\""));
        assert!(json.contains("\"switchId\":\"switch4\""));
    }

    #[test]
    fn test_error_message() {
        let err = ServerMessage::error("HARDWARE_OFFLINE", "hardware is offline");
        let json = err.to_json().unwrap();
        assert!(json.contains("HARDWARE_OFFLINE"));
    }
}
