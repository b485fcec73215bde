//! # Domain Rules
//!
//! Interlock and time-window rules as pure functions.
//!
//! ## Rule Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Rules                                    │
//! │                                                                         │
//! │  INTERLOCK                                                             │
//! │  ─────────                                                             │
//! │  An app may only drive an interlocked switch ON while its mechanical   │
//! │  toggle is reported ON. The rule protects loads a human has physically │
//! │  disconnected from being energized remotely.                           │
//! │                                                                         │
//! │  LIVENESS GATE                                                         │
//! │  ─────────────                                                         │
//! │  App-originated commands are rejected while no hardware connection is  │
//! │  open. Commands issued into the void would be silently lost; rejecting │
//! │  them surfaces the problem immediately.                                │
//! │                                                                         │
//! │  TIME WINDOWS                                                          │
//! │  ────────────                                                          │
//! │  • schedule_due:  "HH:MM" == current local minute                      │
//! │  • timer_due:     |endAt - now| <= tolerance (default 30s)             │
//! │  • in_window:     half-open [start, end), wraps across midnight        │
//! │  • at_minute_mark: whole-N-minute marks for the keepalive ping         │
//! │                                                                         │
//! │  The tolerance windows are double protection against clock drift and   │
//! │  skipped ticks; keep them configurable, keep the semantics.            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Duration, NaiveTime, Timelike, Utc};

use crate::error::CoreError;
use crate::types::{StateDocument, SwitchId, Timer};

// =============================================================================
// Interlock
// =============================================================================

/// Switches wired through a mechanical interlock.
///
/// These model relays that must never be driven ON by remote command while
/// their physical toggle is OFF. A single constant to edit if the wiring
/// differs.
pub const INTERLOCKED_SWITCHES: [SwitchId; 2] = [SwitchId::Switch3, SwitchId::Switch4];

/// Returns true if the switch is bound to a physical interlock.
pub fn is_interlocked(switch: SwitchId) -> bool {
    INTERLOCKED_SWITCHES.contains(&switch)
}

/// Why a toggle intent was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleRejection {
    /// No hardware connection is open; the command would be lost.
    HardwareOffline,

    /// The switch's mechanical toggle is OFF, so remote ON is forbidden.
    InterlockOpen(SwitchId),
}

impl std::fmt::Display for ToggleRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToggleRejection::HardwareOffline => write!(f, "hardware is offline"),
            ToggleRejection::InterlockOpen(switch) => {
                write!(f, "physical interlock for {} is open", switch)
            }
        }
    }
}

/// Checks the physical interlock for a toggle intent.
///
/// Only toggle-to-ON of an interlocked switch is gated; OFF is always
/// allowed, as is anything on a non-interlocked switch.
pub fn check_interlock(
    doc: &StateDocument,
    switch: SwitchId,
    value: bool,
) -> Result<(), ToggleRejection> {
    if value && is_interlocked(switch) && !doc.physical.get(&switch).copied().unwrap_or(false) {
        return Err(ToggleRejection::InterlockOpen(switch));
    }
    Ok(())
}

/// Full gate for an app-originated toggle: hardware liveness, then interlock.
pub fn check_app_toggle(
    doc: &StateDocument,
    switch: SwitchId,
    value: bool,
) -> Result<(), ToggleRejection> {
    if !doc.hardware_online {
        return Err(ToggleRejection::HardwareOffline);
    }
    check_interlock(doc, switch, value)
}

// =============================================================================
// Time Windows
// =============================================================================

/// Parses a schedule clock value ("HH:MM", 24-hour).
pub fn parse_hhmm(value: &str) -> Result<NaiveTime, CoreError> {
    NaiveTime::parse_from_str(value, "%H:%M").map_err(|_| CoreError::InvalidClockValue {
        value: value.to_string(),
    })
}

/// True when `now` falls inside the half-open window `[start, end)`.
///
/// A window whose start is after its end wraps across midnight
/// (e.g. 22:30 .. 05:00).
pub fn in_window(now: NaiveTime, start: NaiveTime, end: NaiveTime) -> bool {
    if start <= end {
        now >= start && now < end
    } else {
        now >= start || now < end
    }
}

/// True when `now` lands on the exact minute `at`.
pub fn at_exact_minute(now: NaiveTime, at: NaiveTime) -> bool {
    now.hour() == at.hour() && now.minute() == at.minute()
}

/// True when an active schedule's "HH:MM" matches the current local minute.
///
/// Inactive, empty, or unparseable schedules are never due.
pub fn schedule_due(schedule: &crate::types::Schedule, now: NaiveTime) -> bool {
    if !schedule.active {
        return false;
    }
    match schedule.time.as_deref().map(parse_hhmm) {
        Some(Ok(at)) => at_exact_minute(now, at),
        _ => false,
    }
}

/// True when an active timer's end instant is within `tolerance` of `now`.
///
/// The symmetric window tolerates both clock drift and a tick landing just
/// before or just after the nominal instant.
pub fn timer_due(timer: &Timer, now: DateTime<Utc>, tolerance: Duration) -> bool {
    if !timer.active {
        return false;
    }
    match timer.end_at {
        Some(end_at) => (end_at - now).abs() <= tolerance,
        None => false,
    }
}

/// True when `now` sits on a whole-`mark`-minute boundary (e.g. :00, :10,
/// :20 for a mark of 10).
pub fn at_minute_mark(now: NaiveTime, mark: u32) -> bool {
    mark != 0 && now.minute() % mark == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Schedule, SwitchAction};
    use chrono::TimeZone;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_interlock_blocks_on_while_physical_off() {
        let doc = StateDocument::default();
        // physical defaults to OFF everywhere
        assert_eq!(
            check_interlock(&doc, SwitchId::Switch3, true),
            Err(ToggleRejection::InterlockOpen(SwitchId::Switch3))
        );
        // OFF is always allowed
        assert_eq!(check_interlock(&doc, SwitchId::Switch3, false), Ok(()));
        // Non-interlocked switches are never gated
        assert_eq!(check_interlock(&doc, SwitchId::Switch1, true), Ok(()));
    }

    #[test]
    fn test_interlock_allows_on_while_physical_on() {
        let mut doc = StateDocument::default();
        doc.physical.insert(SwitchId::Switch4, true);
        assert_eq!(check_interlock(&doc, SwitchId::Switch4, true), Ok(()));
    }

    #[test]
    fn test_app_toggle_gated_by_liveness_first() {
        let doc = StateDocument::default();
        assert_eq!(
            check_app_toggle(&doc, SwitchId::Switch1, true),
            Err(ToggleRejection::HardwareOffline)
        );

        let mut online = StateDocument::default();
        online.hardware_online = true;
        assert_eq!(check_app_toggle(&online, SwitchId::Switch1, true), Ok(()));
        assert_eq!(
            check_app_toggle(&online, SwitchId::Switch3, true),
            Err(ToggleRejection::InterlockOpen(SwitchId::Switch3))
        );
    }

    #[test]
    fn test_parse_hhmm() {
        assert_eq!(parse_hhmm("06:30").unwrap(), t(6, 30));
        assert_eq!(parse_hhmm("23:59").unwrap(), t(23, 59));
        assert!(parse_hhmm("24:00").is_err());
        assert!(parse_hhmm("6:3").is_ok()); // chrono accepts unpadded
        assert!(parse_hhmm("banana").is_err());
    }

    #[test]
    fn test_wrapping_window() {
        let start = t(22, 30);
        let end = t(5, 0);
        assert!(in_window(t(23, 0), start, end));
        assert!(in_window(t(2, 15), start, end));
        assert!(in_window(t(22, 30), start, end));
        // end is exclusive
        assert!(!in_window(t(5, 0), start, end));
        assert!(!in_window(t(12, 0), start, end));
    }

    #[test]
    fn test_non_wrapping_window() {
        let start = t(2, 30);
        let end = t(3, 30);
        assert!(in_window(t(3, 0), start, end));
        assert!(!in_window(t(3, 30), start, end));
        assert!(!in_window(t(1, 0), start, end));
    }

    #[test]
    fn test_schedule_due() {
        let schedule = Schedule {
            active: true,
            time: Some("18:45".to_string()),
            action: Some(SwitchAction::On),
        };
        assert!(schedule_due(&schedule, t(18, 45)));
        assert!(!schedule_due(&schedule, t(18, 46)));

        let inactive = Schedule {
            active: false,
            ..schedule.clone()
        };
        assert!(!schedule_due(&inactive, t(18, 45)));

        let empty = Schedule::default();
        assert!(!schedule_due(&empty, t(18, 45)));
    }

    #[test]
    fn test_timer_due_window() {
        let end_at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let timer = Timer {
            active: true,
            end_at: Some(end_at),
            action: Some(SwitchAction::Off),
        };
        let tol = Duration::seconds(30);

        assert!(timer_due(&timer, end_at, tol));
        assert!(timer_due(&timer, end_at - Duration::seconds(30), tol));
        assert!(timer_due(&timer, end_at + Duration::seconds(30), tol));
        assert!(!timer_due(&timer, end_at - Duration::seconds(31), tol));
        assert!(!timer_due(&timer, end_at + Duration::seconds(31), tol));

        let disarmed = Timer {
            active: false,
            ..timer
        };
        assert!(!timer_due(&disarmed, end_at, tol));
    }

    #[test]
    fn test_minute_marks() {
        assert!(at_minute_mark(t(14, 0), 10));
        assert!(at_minute_mark(t(14, 50), 10));
        assert!(!at_minute_mark(t(14, 55), 10));
        assert!(!at_minute_mark(t(14, 0), 0));
    }
}
