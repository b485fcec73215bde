//! # Automation Engine
//!
//! The fixed-interval tick that evaluates time-of-day rules, schedule and
//! timer due-checks, and the anti-idle keepalive.
//!
//! ## Tick Order
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                  Automation Tick (default 60s)                          │
//! │                                                                         │
//! │  The hub wall clock is a fixed UTC offset (default +5:30), regardless  │
//! │  of host timezone.                                                     │
//! │                                                                         │
//! │  1. NIGHT PROTOCOL                                                     │
//! │     in [22:30, 05:00) AND switch1 OFF AND ambient mode != 0            │
//! │     → remember the mode, force it to 0, persist + broadcast            │
//! │                                                                         │
//! │  2. MORNING RESTORE                                                    │
//! │     exactly 05:00 AND ambient mode == 0                                │
//! │     → bring the remembered mode back, persist + broadcast              │
//! │                                                                         │
//! │  3. SCHEDULE DUE-CHECK                                                 │
//! │     active schedule whose HH:MM equals the current minute              │
//! │     → re-issue a TOGGLE command (no direct state mutation; the         │
//! │       hardware/app round-trip confirms it)                             │
//! │                                                                         │
//! │  4. TIMER DUE-CHECK                                                    │
//! │     active timer with |endAt - now| <= 30s                             │
//! │     → issue a TOGGLE command, deactivate, persist + broadcast.         │
//! │       At most once per timer; a tick skipped through the whole         │
//! │       window means the timer never fires (accepted best-effort).       │
//! │                                                                         │
//! │  5. KEEPALIVE                                                          │
//! │     on whole-10-minute marks outside [02:30, 03:30)                    │
//! │     → HTTP GET the configured URL; failures ignored                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use chrono::{DateTime, Duration, FixedOffset, NaiveTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info};

use crate::config::AutomationSettings;
use crate::error::{HubError, HubResult};
use crate::protocol::{CommandPayload, ServerMessage};
use crate::router;
use crate::state::SharedState;
use relay_core::rules::{
    at_exact_minute, at_minute_mark, in_window, parse_hhmm, schedule_due, timer_due,
};
use relay_core::{SwitchAction, SwitchId};

// =============================================================================
// Resolved Tick Schedule
// =============================================================================

/// Automation settings resolved into concrete clock values.
///
/// Resolution happens once at engine start so the tick never re-parses
/// configuration strings.
#[derive(Debug, Clone)]
pub struct TickSchedule {
    /// Interval between ticks.
    pub tick_interval: std::time::Duration,

    /// The hub wall clock.
    pub offset: FixedOffset,

    /// Night window, half-open, may wrap midnight.
    pub night_start: NaiveTime,
    pub night_end: NaiveTime,

    /// Minute the morning restore fires at.
    pub morning_restore: NaiveTime,

    /// Symmetric timer due window.
    pub timer_tolerance: Duration,

    /// Keepalive target; None disables the keepalive.
    pub keepalive_url: Option<String>,

    /// Keepalive quiet window, half-open.
    pub quiet_start: NaiveTime,
    pub quiet_end: NaiveTime,

    /// Keepalive fires on whole-N-minute marks.
    pub keepalive_mark_minutes: u32,
}

impl TickSchedule {
    /// Resolves validated automation settings.
    pub fn from_settings(settings: &AutomationSettings) -> HubResult<Self> {
        let offset = FixedOffset::east_opt(settings.utc_offset_minutes * 60).ok_or_else(|| {
            HubError::InvalidConfig(format!(
                "utc_offset_minutes out of range: {}",
                settings.utc_offset_minutes
            ))
        })?;

        let clock = |value: &str| {
            parse_hhmm(value)
                .map_err(|_| HubError::InvalidConfig(format!("not a HH:MM value: '{}'", value)))
        };

        Ok(TickSchedule {
            tick_interval: std::time::Duration::from_secs(settings.tick_interval_secs),
            offset,
            night_start: clock(&settings.night_start)?,
            night_end: clock(&settings.night_end)?,
            morning_restore: clock(&settings.morning_restore)?,
            timer_tolerance: Duration::seconds(settings.timer_tolerance_secs as i64),
            keepalive_url: settings.keepalive_url.clone(),
            quiet_start: clock(&settings.keepalive_quiet_start)?,
            quiet_end: clock(&settings.keepalive_quiet_end)?,
            keepalive_mark_minutes: settings.keepalive_mark_minutes,
        })
    }
}

// =============================================================================
// Automation Engine
// =============================================================================

/// The periodic automation loop.
pub struct AutomationEngine {
    state: Arc<SharedState>,
    schedule: TickSchedule,
    http: reqwest::Client,
}

impl AutomationEngine {
    /// Creates a new automation engine.
    pub fn new(state: Arc<SharedState>, schedule: TickSchedule) -> Self {
        AutomationEngine {
            state,
            schedule,
            http: reqwest::Client::new(),
        }
    }

    /// Spawns the repeating tick.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                interval_secs = self.schedule.tick_interval.as_secs(),
                offset = %self.schedule.offset,
                "Automation engine started"
            );
            let mut ticker = interval(self.schedule.tick_interval);
            loop {
                ticker.tick().await;
                self.run_tick(Utc::now()).await;
            }
        })
    }

    /// Runs one tick against an explicit instant.
    ///
    /// The instant is injected so tests can replay exact wall-clock moments.
    pub async fn run_tick(&self, now: DateTime<Utc>) {
        let local_time = now.with_timezone(&self.schedule.offset).time();

        self.night_protocol(local_time).await;
        self.morning_restore(local_time).await;
        self.check_schedules(local_time).await;
        self.check_timers(now).await;
        self.keepalive(local_time);
    }

    /// Night protocol: suppress the ambient mode while the room is dark.
    async fn night_protocol(&self, local_time: NaiveTime) {
        let mut doc = self.state.write().await;
        let switch1_on = doc
            .switches
            .get(&SwitchId::Switch1)
            .copied()
            .unwrap_or(false);

        if in_window(local_time, self.schedule.night_start, self.schedule.night_end)
            && !switch1_on
            && doc.system.ambient_mode != 0
        {
            doc.system.saved_ambient_mode = doc.system.ambient_mode;
            doc.system.ambient_mode = 0;
            info!(
                saved_mode = doc.system.saved_ambient_mode,
                "Night protocol suppressed ambient mode"
            );

            router::broadcast(
                &self.state,
                &ServerMessage::Command(CommandPayload::System {
                    system: doc.system.clone(),
                }),
                None,
            )
            .await;
            router::broadcast(&self.state, &ServerMessage::StateChanged(doc.clone()), None).await;
            self.state.persist_from(&doc);
        }
    }

    /// Morning restore: bring the remembered ambient mode back.
    async fn morning_restore(&self, local_time: NaiveTime) {
        let mut doc = self.state.write().await;

        if at_exact_minute(local_time, self.schedule.morning_restore)
            && doc.system.ambient_mode == 0
            && doc.system.saved_ambient_mode != 0
        {
            doc.system.ambient_mode = doc.system.saved_ambient_mode;
            info!(mode = doc.system.ambient_mode, "Morning restore of ambient mode");

            router::broadcast(
                &self.state,
                &ServerMessage::Command(CommandPayload::System {
                    system: doc.system.clone(),
                }),
                None,
            )
            .await;
            router::broadcast(&self.state, &ServerMessage::StateChanged(doc.clone()), None).await;
            self.state.persist_from(&doc);
        }
    }

    /// Re-issues toggle commands for schedules due this minute.
    ///
    /// Does not mutate SwitchState directly: the command round-trips through
    /// the hardware, whose status report confirms the new position.
    async fn check_schedules(&self, local_time: NaiveTime) {
        let doc = self.state.snapshot().await;

        for (switch, schedule) in &doc.schedules {
            if !schedule_due(schedule, local_time) {
                continue;
            }
            let Some(action) = schedule.action else {
                continue;
            };
            info!(switch = %switch, ?action, "Schedule due - issuing toggle command");
            router::broadcast(
                &self.state,
                &ServerMessage::Command(CommandPayload::Toggle {
                    switch_id: *switch,
                    value: action.as_bool(),
                }),
                None,
            )
            .await;
        }
    }

    /// Fires timers whose end instant falls inside the tolerance window,
    /// consuming each at most once.
    async fn check_timers(&self, now: DateTime<Utc>) {
        let mut doc = self.state.write().await;

        let due: Vec<(SwitchId, SwitchAction)> = doc
            .timers
            .iter()
            .filter(|(_, timer)| timer_due(timer, now, self.schedule.timer_tolerance))
            .filter_map(|(switch, timer)| timer.action.map(|action| (*switch, action)))
            .collect();

        if due.is_empty() {
            return;
        }

        for (switch, action) in &due {
            info!(switch = %switch, ?action, "Timer due - issuing toggle command");
            router::broadcast(
                &self.state,
                &ServerMessage::Command(CommandPayload::Toggle {
                    switch_id: *switch,
                    value: action.as_bool(),
                }),
                None,
            )
            .await;
            if let Some(timer) = doc.timers.get_mut(switch) {
                timer.clear();
            }
        }

        router::broadcast(&self.state, &ServerMessage::StateChanged(doc.clone()), None).await;
        self.state.persist_from(&doc);
    }

    /// Anti-idle keepalive: GET the configured URL on whole-minute marks,
    /// outside the quiet window. Failures are ignored.
    fn keepalive(&self, local_time: NaiveTime) {
        let Some(ref url) = self.schedule.keepalive_url else {
            return;
        };
        if in_window(local_time, self.schedule.quiet_start, self.schedule.quiet_end) {
            return;
        }
        if !at_minute_mark(local_time, self.schedule.keepalive_mark_minutes) {
            return;
        }

        let client = self.http.clone();
        let url = url.clone();
        tokio::spawn(async move {
            match client.get(&url).send().await {
                Ok(response) => debug!(status = %response.status(), "Keepalive ping"),
                Err(e) => debug!(?e, "Keepalive ping failed"),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::PersistHandle;
    use crate::registry::Frame;
    use chrono::TimeZone;
    use relay_core::{PersistedState, Schedule, StateDocument, Timer};
    use tokio::sync::mpsc;

    struct Harness {
        engine: AutomationEngine,
        state: Arc<SharedState>,
        conn_rx: mpsc::Receiver<Frame>,
        persist_rx: mpsc::Receiver<PersistedState>,
    }

    async fn harness(doc: StateDocument) -> Harness {
        let (persist, persist_rx) = PersistHandle::paired(16);
        let state = SharedState::new(doc, persist);
        let (tx, conn_rx) = mpsc::channel(64);
        state.registry.register(tx).await;

        let schedule = TickSchedule::from_settings(&AutomationSettings::default()).unwrap();
        Harness {
            engine: AutomationEngine::new(state.clone(), schedule),
            state,
            conn_rx,
            persist_rx,
        }
    }

    /// An instant on the hub wall clock (UTC+5:30), expressed in UTC.
    fn hub_clock(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        let offset = FixedOffset::east_opt(330 * 60).unwrap();
        offset
            .with_ymd_and_hms(2024, 5, 1, h, m, s)
            .unwrap()
            .with_timezone(&Utc)
    }

    fn drain(rx: &mut mpsc::Receiver<Frame>) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            if let Frame::Text(text) = frame {
                out.push(ServerMessage::from_json(&text).unwrap());
            }
        }
        out
    }

    #[tokio::test]
    async fn test_night_protocol_suppresses_ambient_mode() {
        let mut doc = StateDocument::default();
        doc.system.ambient_mode = 2;
        let mut h = harness(doc).await;

        h.engine.run_tick(hub_clock(23, 0, 0)).await;

        let doc = h.state.snapshot().await;
        assert_eq!(doc.system.ambient_mode, 0);
        assert_eq!(doc.system.saved_ambient_mode, 2);

        let msgs = drain(&mut h.conn_rx);
        assert_eq!(msgs.len(), 2);
        assert!(matches!(
            msgs[0],
            ServerMessage::Command(CommandPayload::System { .. })
        ));
        assert!(matches!(msgs[1], ServerMessage::StateChanged(_)));
        assert!(h.persist_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_night_protocol_skipped_while_switch1_on() {
        let mut doc = StateDocument::default();
        doc.system.ambient_mode = 2;
        doc.switches.insert(SwitchId::Switch1, true);
        let mut h = harness(doc).await;

        h.engine.run_tick(hub_clock(23, 0, 0)).await;

        assert_eq!(h.state.snapshot().await.system.ambient_mode, 2);
        assert!(drain(&mut h.conn_rx).is_empty());
    }

    #[tokio::test]
    async fn test_night_protocol_skipped_outside_window() {
        let mut doc = StateDocument::default();
        doc.system.ambient_mode = 2;
        let mut h = harness(doc).await;

        h.engine.run_tick(hub_clock(12, 0, 0)).await;

        assert_eq!(h.state.snapshot().await.system.ambient_mode, 2);
        assert!(drain(&mut h.conn_rx).is_empty());
    }

    #[tokio::test]
    async fn test_morning_restore_at_exactly_five() {
        let mut doc = StateDocument::default();
        doc.system.ambient_mode = 0;
        doc.system.saved_ambient_mode = 2;
        let mut h = harness(doc).await;

        // 04:59 - nothing yet
        h.engine.run_tick(hub_clock(4, 59, 0)).await;
        assert_eq!(h.state.snapshot().await.system.ambient_mode, 0);

        // 05:00 - the remembered mode comes back
        h.engine.run_tick(hub_clock(5, 0, 30)).await;
        assert_eq!(h.state.snapshot().await.system.ambient_mode, 2);

        let msgs = drain(&mut h.conn_rx);
        assert!(msgs
            .iter()
            .any(|m| matches!(m, ServerMessage::Command(CommandPayload::System { .. }))));
    }

    #[tokio::test]
    async fn test_night_then_morning_round_trip() {
        let mut doc = StateDocument::default();
        doc.system.ambient_mode = 2;
        let mut h = harness(doc).await;

        h.engine.run_tick(hub_clock(23, 0, 0)).await;
        assert_eq!(h.state.snapshot().await.system.ambient_mode, 0);

        h.engine.run_tick(hub_clock(5, 0, 0)).await;
        assert_eq!(h.state.snapshot().await.system.ambient_mode, 2);
        drain(&mut h.conn_rx);
    }

    #[tokio::test]
    async fn test_schedule_due_reissues_toggle_without_mutation() {
        let mut doc = StateDocument::default();
        doc.schedules.insert(
            SwitchId::Switch2,
            Schedule {
                active: true,
                time: Some("18:45".to_string()),
                action: Some(SwitchAction::On),
            },
        );
        let mut h = harness(doc).await;

        h.engine.run_tick(hub_clock(18, 45, 10)).await;

        // Command issued, but SwitchState untouched (hardware confirms it)
        let msgs = drain(&mut h.conn_rx);
        assert_eq!(msgs.len(), 1);
        assert_eq!(
            msgs[0],
            ServerMessage::Command(CommandPayload::Toggle {
                switch_id: SwitchId::Switch2,
                value: true,
            })
        );
        assert_eq!(h.state.snapshot().await.switches[&SwitchId::Switch2], false);
        assert!(h.persist_rx.try_recv().is_err());

        // A minute later the schedule is no longer due
        h.engine.run_tick(hub_clock(18, 46, 10)).await;
        assert!(drain(&mut h.conn_rx).is_empty());
    }

    #[tokio::test]
    async fn test_timer_fires_exactly_once() {
        let fire_at = hub_clock(10, 0, 0);
        let mut doc = StateDocument::default();
        doc.timers.insert(
            SwitchId::Switch2,
            Timer {
                active: true,
                end_at: Some(fire_at),
                action: Some(SwitchAction::On),
            },
        );
        let mut h = harness(doc).await;

        // Inside the tolerance window: fires and deactivates
        h.engine.run_tick(fire_at - Duration::seconds(10)).await;

        let msgs = drain(&mut h.conn_rx);
        assert_eq!(msgs.len(), 2);
        assert_eq!(
            msgs[0],
            ServerMessage::Command(CommandPayload::Toggle {
                switch_id: SwitchId::Switch2,
                value: true,
            })
        );
        assert!(matches!(msgs[1], ServerMessage::StateChanged(_)));
        assert!(!h.state.snapshot().await.timers[&SwitchId::Switch2].active);
        assert!(h.persist_rx.try_recv().is_ok());

        // Next tick inside the same window: consumed, must not recur
        h.engine.run_tick(fire_at + Duration::seconds(10)).await;
        assert!(drain(&mut h.conn_rx).is_empty());
    }

    #[tokio::test]
    async fn test_timer_outside_window_does_not_fire() {
        let fire_at = hub_clock(10, 0, 0);
        let mut doc = StateDocument::default();
        doc.timers.insert(
            SwitchId::Switch2,
            Timer {
                active: true,
                end_at: Some(fire_at),
                action: Some(SwitchAction::Off),
            },
        );
        let mut h = harness(doc).await;

        h.engine.run_tick(fire_at - Duration::seconds(45)).await;

        assert!(drain(&mut h.conn_rx).is_empty());
        assert!(h.state.snapshot().await.timers[&SwitchId::Switch2].active);
    }

    #[tokio::test]
    async fn test_from_settings_resolves_defaults() {
        let schedule = TickSchedule::from_settings(&AutomationSettings::default()).unwrap();
        assert_eq!(schedule.tick_interval.as_secs(), 60);
        assert_eq!(schedule.offset.local_minus_utc(), 330 * 60);
        assert_eq!(schedule.timer_tolerance, Duration::seconds(30));
        assert!(schedule.keepalive_url.is_none());
    }

    #[tokio::test]
    async fn test_from_settings_rejects_bad_clock() {
        let mut settings = AutomationSettings::default();
        settings.night_start = "not a clock".to_string();
        assert!(TickSchedule::from_settings(&settings).is_err());
    }
}
