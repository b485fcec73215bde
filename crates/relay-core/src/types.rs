//! # Domain Types
//!
//! The canonical state document and its building blocks.
//!
//! ## Document Shape
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        StateDocument                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    switches     │   │    physical     │   │     names       │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  switch1: bool  │   │  switch3: bool  │   │  name1: String  │       │
//! │  │  ...            │   │  switch4: bool  │   │  ...            │       │
//! │  │  switch4: bool  │   │  (hw reported)  │   │  name4: String  │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │   schedules     │   │     timers      │   │     system      │       │
//! │  │  daily HH:MM    │   │  one-shot       │   │  ambient mode   │       │
//! │  │  per switch     │   │  absolute endAt │   │  rssi, reboot   │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  hardware_online: bool   (derived, never persisted)                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Closed Identifier Sets
//! `SwitchId` and `LabelId` are enums, not strings. An unknown identifier
//! fails serde deserialization, so nothing past the decode boundary can
//! create keys outside `switch1..switch4` / `name1..name4`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Switch Identifiers
// =============================================================================

/// One of the four switchable outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwitchId {
    Switch1,
    Switch2,
    Switch3,
    Switch4,
}

impl SwitchId {
    /// All switch identifiers in canonical order.
    pub const ALL: [SwitchId; 4] = [
        SwitchId::Switch1,
        SwitchId::Switch2,
        SwitchId::Switch3,
        SwitchId::Switch4,
    ];

    /// The display-label key paired with this switch.
    pub fn label(self) -> LabelId {
        match self {
            SwitchId::Switch1 => LabelId::Name1,
            SwitchId::Switch2 => LabelId::Name2,
            SwitchId::Switch3 => LabelId::Name3,
            SwitchId::Switch4 => LabelId::Name4,
        }
    }

    /// Wire representation ("switch1".."switch4").
    pub fn as_str(self) -> &'static str {
        match self {
            SwitchId::Switch1 => "switch1",
            SwitchId::Switch2 => "switch2",
            SwitchId::Switch3 => "switch3",
            SwitchId::Switch4 => "switch4",
        }
    }
}

impl std::fmt::Display for SwitchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One of the four display-label slots in the name registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelId {
    Name1,
    Name2,
    Name3,
    Name4,
}

impl LabelId {
    /// All label identifiers in canonical order.
    pub const ALL: [LabelId; 4] = [
        LabelId::Name1,
        LabelId::Name2,
        LabelId::Name3,
        LabelId::Name4,
    ];

    /// Wire representation ("name1".."name4").
    pub fn as_str(self) -> &'static str {
        match self {
            LabelId::Name1 => "name1",
            LabelId::Name2 => "name2",
            LabelId::Name3 => "name3",
            LabelId::Name4 => "name4",
        }
    }
}

impl std::fmt::Display for LabelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Switch Action
// =============================================================================

/// Target position a schedule, timer, or command drives a switch to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SwitchAction {
    On,
    Off,
}

impl SwitchAction {
    /// The boolean switch value this action produces.
    #[inline]
    pub fn as_bool(self) -> bool {
        matches!(self, SwitchAction::On)
    }
}

impl From<bool> for SwitchAction {
    fn from(value: bool) -> Self {
        if value {
            SwitchAction::On
        } else {
            SwitchAction::Off
        }
    }
}

// =============================================================================
// Schedules and Timers
// =============================================================================

/// Daily trigger for one switch.
///
/// At most one schedule exists per switch; setting a schedule replaces the
/// prior value entirely. A cleared schedule keeps its slot with
/// `active = false` and nulled fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    /// Whether this schedule fires at all.
    pub active: bool,

    /// Local fire time as "HH:MM" (24-hour).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,

    /// Position to drive the switch to when the schedule fires.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<SwitchAction>,
}

impl Schedule {
    /// Clears the schedule in place (active=false, fields nulled).
    pub fn clear(&mut self) {
        *self = Schedule::default();
    }
}

/// One-shot trigger for one switch.
///
/// Durable at creation time only: once fired it is deactivated in memory and
/// the cleared state rides along with the next persistence cycle. A process
/// restart in that narrow window re-arms the timer - accepted best-effort
/// behavior, not exactly-once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timer {
    /// Whether this timer is armed.
    pub active: bool,

    /// Absolute instant the timer fires at.
    #[serde(rename = "endAt", skip_serializing_if = "Option::is_none")]
    pub end_at: Option<DateTime<Utc>>,

    /// Position to drive the switch to when the timer fires.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<SwitchAction>,
}

impl Timer {
    /// Clears the timer in place (active=false, fields nulled).
    pub fn clear(&mut self) {
        *self = Timer::default();
    }
}

// =============================================================================
// System Settings
// =============================================================================

/// Auxiliary mode and status fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemSettings {
    /// Ambient-lighting mode (0 = off).
    pub ambient_mode: u8,

    /// Slot the night protocol uses to remember the suppressed ambient mode
    /// so the morning restore can bring it back.
    pub saved_ambient_mode: u8,

    /// Last signal strength (RSSI, dBm) reported by the hardware.
    pub signal_strength: i32,

    /// Request flag asking the hardware to reboot on its next sync.
    pub reboot: bool,
}

impl Default for SystemSettings {
    fn default() -> Self {
        SystemSettings {
            ambient_mode: 0,
            saved_ambient_mode: 0,
            signal_strength: 0,
            reboot: false,
        }
    }
}

/// Partial system-settings update; absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ambient_mode: Option<u8>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal_strength: Option<i32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reboot: Option<bool>,
}

impl SystemPatch {
    /// True when the patch carries no fields at all.
    pub fn is_empty(&self) -> bool {
        self.ambient_mode.is_none() && self.signal_strength.is_none() && self.reboot.is_none()
    }
}

impl SystemSettings {
    /// Merges a partial update into these settings.
    pub fn apply(&mut self, patch: &SystemPatch) {
        if let Some(mode) = patch.ambient_mode {
            self.ambient_mode = mode;
        }
        if let Some(rssi) = patch.signal_strength {
            self.signal_strength = rssi;
        }
        if let Some(reboot) = patch.reboot {
            self.reboot = reboot;
        }
    }
}

// =============================================================================
// State Document
// =============================================================================

/// The single canonical state document.
///
/// Exactly one instance exists per process, behind the engine's
/// synchronization boundary. Every map is keyed by a closed identifier enum,
/// so the key sets are fixed for the document's whole lifetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateDocument {
    /// Logical switch positions.
    pub switches: BTreeMap<SwitchId, bool>,

    /// Mechanical switch positions, reported only by hardware.
    /// Read-only to apps; gates interlocked toggle intents.
    pub physical: BTreeMap<SwitchId, bool>,

    /// Human-readable display labels.
    pub names: BTreeMap<LabelId, String>,

    /// Daily triggers, one slot per switch.
    pub schedules: BTreeMap<SwitchId, Schedule>,

    /// One-shot triggers, one slot per switch.
    pub timers: BTreeMap<SwitchId, Timer>,

    /// Auxiliary mode and status fields.
    pub system: SystemSettings,

    /// True while a connection holding the hardware role is open.
    /// Never persisted; always reinitializes to false at process start.
    #[serde(rename = "isHardwareOnline")]
    pub hardware_online: bool,
}

impl Default for StateDocument {
    fn default() -> Self {
        let mut switches = BTreeMap::new();
        let mut physical = BTreeMap::new();
        let mut schedules = BTreeMap::new();
        let mut timers = BTreeMap::new();
        for id in SwitchId::ALL {
            switches.insert(id, false);
            physical.insert(id, false);
            schedules.insert(id, Schedule::default());
            timers.insert(id, Timer::default());
        }

        let mut names = BTreeMap::new();
        names.insert(LabelId::Name1, "Switch 1".to_string());
        names.insert(LabelId::Name2, "Switch 2".to_string());
        names.insert(LabelId::Name3, "Switch 3".to_string());
        names.insert(LabelId::Name4, "Switch 4".to_string());

        StateDocument {
            switches,
            physical,
            names,
            schedules,
            timers,
            system: SystemSettings::default(),
            hardware_online: false,
        }
    }
}

impl StateDocument {
    /// Rebuilds the document from its durable subset.
    ///
    /// `physical` and `hardware_online` are NOT durable: they reset to their
    /// defaults and are only filled in again once hardware identifies itself.
    pub fn restore(persisted: PersistedState) -> Self {
        let mut doc = StateDocument::default();
        doc.apply_persisted(persisted);
        doc
    }

    fn apply_persisted(&mut self, persisted: PersistedState) {
        for (id, value) in persisted.switches {
            self.switches.insert(id, value);
        }
        for (id, name) in persisted.names {
            self.names.insert(id, name);
        }
        for (id, schedule) in persisted.schedules {
            self.schedules.insert(id, schedule);
        }
        for (id, timer) in persisted.timers {
            self.timers.insert(id, timer);
        }
        self.system = persisted.system;
    }
}

// =============================================================================
// Persisted Subset
// =============================================================================

/// The durable subset of the state document.
///
/// `physical` and `hardware_online` are deliberately absent: both describe
/// the live hardware link and would be stale the moment the process restarts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedState {
    pub names: BTreeMap<LabelId, String>,
    pub switches: BTreeMap<SwitchId, bool>,
    pub schedules: BTreeMap<SwitchId, Schedule>,
    pub timers: BTreeMap<SwitchId, Timer>,
    pub system: SystemSettings,
}

impl From<&StateDocument> for PersistedState {
    fn from(doc: &StateDocument) -> Self {
        PersistedState {
            names: doc.names.clone(),
            switches: doc.switches.clone(),
            schedules: doc.schedules.clone(),
            timers: doc.timers.clone(),
            system: doc.system.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_switch_id_wire_names() {
        let json = serde_json::to_string(&SwitchId::Switch3).unwrap();
        assert_eq!(json, "\"switch3\"");

        let parsed: SwitchId = serde_json::from_str("\"switch1\"").unwrap();
        assert_eq!(parsed, SwitchId::Switch1);
    }

    #[test]
    fn test_unknown_switch_id_rejected() {
        assert!(serde_json::from_str::<SwitchId>("\"switch5\"").is_err());
        assert!(serde_json::from_str::<LabelId>("\"name0\"").is_err());
    }

    #[test]
    fn test_default_document_shape() {
        let doc = StateDocument::default();
        assert_eq!(doc.switches.len(), 4);
        assert_eq!(doc.physical.len(), 4);
        assert_eq!(doc.names.len(), 4);
        assert!(!doc.hardware_online);
        assert!(doc.switches.values().all(|v| !v));
    }

    #[test]
    fn test_restore_resets_volatile_fields() {
        let mut doc = StateDocument::default();
        doc.switches.insert(SwitchId::Switch2, true);
        doc.physical.insert(SwitchId::Switch3, true);
        doc.hardware_online = true;
        doc.system.ambient_mode = 3;

        let restored = StateDocument::restore(PersistedState::from(&doc));

        // Durable fields survive
        assert_eq!(restored.switches[&SwitchId::Switch2], true);
        assert_eq!(restored.system.ambient_mode, 3);

        // Volatile fields reset
        assert!(!restored.hardware_online);
        assert!(restored.physical.values().all(|v| !v));
    }

    #[test]
    fn test_persisted_round_trip_via_json() {
        let mut doc = StateDocument::default();
        doc.names.insert(LabelId::Name2, "Garden pump".to_string());
        doc.schedules.insert(
            SwitchId::Switch1,
            Schedule {
                active: true,
                time: Some("06:30".to_string()),
                action: Some(SwitchAction::On),
            },
        );

        let persisted = PersistedState::from(&doc);
        let json = serde_json::to_string(&persisted).unwrap();
        let reloaded: PersistedState = serde_json::from_str(&json).unwrap();
        assert_eq!(persisted, reloaded);

        let restored = StateDocument::restore(reloaded);
        assert_eq!(restored.names[&LabelId::Name2], "Garden pump");
        assert_eq!(
            restored.schedules[&SwitchId::Switch1].time.as_deref(),
            Some("06:30")
        );
    }

    #[test]
    fn test_system_patch_merge() {
        let mut system = SystemSettings::default();
        system.apply(&SystemPatch {
            ambient_mode: Some(2),
            signal_strength: None,
            reboot: None,
        });
        assert_eq!(system.ambient_mode, 2);
        // Untouched fields keep their values
        assert_eq!(system.signal_strength, 0);
        assert!(!system.reboot);

        assert!(SystemPatch::default().is_empty());
    }

    #[test]
    fn test_switch_label_pairing() {
        assert_eq!(SwitchId::Switch1.label(), LabelId::Name1);
        assert_eq!(SwitchId::Switch4.label(), LabelId::Name4);
    }

    #[test]
    fn test_switch_action_serde() {
        assert_eq!(
            serde_json::to_string(&SwitchAction::On).unwrap(),
            "\"ON\""
        );
        let parsed: SwitchAction = serde_json::from_str("\"OFF\"").unwrap();
        assert_eq!(parsed, SwitchAction::Off);

        assert_eq!(SwitchAction::from(true), SwitchAction::On);
        assert!(SwitchAction::On.as_bool());
    }
}
