//! Session phase state machine.
//!
//! Every operation is a pure function of the current value and a UTC
//! "now": nothing here reads the clock or touches the disk. The resident
//! holds the current [`PomodoroState`] and replaces it with whatever these
//! functions return.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Longest phase a session may hold: one day.
pub const MAX_PHASE_MINUTES: u32 = 24 * 60;
pub const MAX_PHASE_SECONDS: i64 = MAX_PHASE_MINUTES as i64 * 60;
pub const MAX_CYCLES: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Work,
    Break,
    LongBreak,
}

impl Phase {
    /// Friendly name for interfaces.
    pub fn label(self) -> &'static str {
        match self {
            Phase::Work => "Focus",
            Phase::Break => "Short Break",
            Phase::LongBreak => "Long Break",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Work => write!(f, "Work"),
            Phase::Break => write!(f, "Break"),
            Phase::LongBreak => write!(f, "LongBreak"),
        }
    }
}

/// Durations and flags a session is started with, already resolved to
/// seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    pub work_seconds: i64,
    pub break_seconds: i64,
    pub long_break_seconds: i64,
    pub cycles: u32,
    pub auto_advance: bool,
    pub popup: bool,
    pub sound: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PomodoroState {
    pub session_id: Uuid,
    pub phase: Phase,
    /// 1-based, never above `cycles`.
    pub cycle_index: u32,
    pub cycles: u32,
    pub work_seconds: i64,
    pub break_seconds: i64,
    pub long_break_seconds: i64,
    pub auto_advance: bool,
    pub popup: bool,
    pub sound: bool,
    pub phase_started_at_utc: DateTime<Utc>,
    pub phase_duration_seconds: i64,
    pub is_paused: bool,
    /// Present iff `is_paused`.
    pub paused_at_utc: Option<DateTime<Utc>>,
    /// Present iff `is_paused`.
    pub paused_remaining_seconds: Option<i64>,
}

/// Outcome of catching a state up to the present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvanceResult {
    /// `None` once the whole session has finished.
    pub state: Option<PomodoroState>,
    pub phases_advanced: u32,
    pub completed: bool,
}

impl PomodoroState {
    pub fn new(options: &SessionOptions, now: DateTime<Utc>) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            phase: Phase::Work,
            cycle_index: 1,
            cycles: options.cycles,
            work_seconds: options.work_seconds,
            break_seconds: options.break_seconds,
            long_break_seconds: options.long_break_seconds,
            auto_advance: options.auto_advance,
            popup: options.popup,
            sound: options.sound,
            phase_started_at_utc: now,
            phase_duration_seconds: options.work_seconds,
            is_paused: false,
            paused_at_utc: None,
            paused_remaining_seconds: None,
        }
    }

    /// Seconds left in the current phase. Negative once the deadline has
    /// passed; clamp before displaying.
    pub fn remaining_seconds(&self, now: DateTime<Utc>) -> i64 {
        if self.is_paused {
            if let Some(frozen) = self.paused_remaining_seconds {
                return frozen;
            }
        }
        self.phase_duration_seconds
            .saturating_sub(elapsed_seconds(self.phase_started_at_utc, now))
    }

    pub fn ends_at(&self) -> DateTime<Utc> {
        let duration = Duration::seconds(self.phase_duration_seconds.clamp(0, MAX_PHASE_SECONDS));
        self.phase_started_at_utc
            .checked_add_signed(duration)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Fraction of the current phase still ahead, in `[0, 1]`.
    pub fn remaining_fraction(&self, now: DateTime<Utc>) -> f64 {
        let total = self.phase_duration_seconds.max(1) as f64;
        (self.remaining_seconds(now).max(0) as f64 / total).clamp(0.0, 1.0)
    }

    pub fn pause(&self, now: DateTime<Utc>) -> Self {
        if self.is_paused {
            return self.clone();
        }
        let remaining = self.remaining_seconds(now).max(0);
        Self {
            is_paused: true,
            paused_at_utc: Some(now),
            paused_remaining_seconds: Some(remaining),
            ..self.clone()
        }
    }

    /// Restart the clock at `now` with exactly the time that was left.
    pub fn resume(&self, now: DateTime<Utc>) -> Self {
        if !self.is_paused {
            return self.clone();
        }
        let remaining = self
            .paused_remaining_seconds
            .unwrap_or_else(|| self.running_remaining(now));
        Self {
            is_paused: false,
            paused_at_utc: None,
            paused_remaining_seconds: None,
            phase_started_at_utc: now,
            phase_duration_seconds: remaining,
            ..self.clone()
        }
    }

    /// The phase that follows this one, starting at `next_start`, or `None`
    /// after the long break.
    pub fn next_phase(&self, next_start: DateTime<Utc>) -> Option<Self> {
        let (phase, cycle_index, duration) = match self.phase {
            Phase::Work if self.cycle_index >= self.cycles => {
                (Phase::LongBreak, self.cycle_index, self.long_break_seconds)
            }
            Phase::Work => (Phase::Break, self.cycle_index, self.break_seconds),
            Phase::Break => (Phase::Work, self.cycle_index + 1, self.work_seconds),
            Phase::LongBreak => return None,
        };
        Some(Self {
            phase,
            cycle_index,
            phase_started_at_utc: next_start,
            phase_duration_seconds: duration,
            is_paused: false,
            paused_at_utc: None,
            paused_remaining_seconds: None,
            ..self.clone()
        })
    }

    /// Step through every phase whose deadline is already behind `now`.
    ///
    /// Each following phase is anchored at the previous phase's nominal end,
    /// so a process that slept through several phases lands where a
    /// never-interrupted timer would be. A paused state never advances.
    pub fn advance_to(&self, now: DateTime<Utc>) -> AdvanceResult {
        if self.is_paused {
            return AdvanceResult {
                state: Some(self.clone()),
                phases_advanced: 0,
                completed: false,
            };
        }

        let mut current = self.clone();
        let mut advanced = 0;
        while current.remaining_seconds(now) <= 0 {
            let ended_at = current.ends_at();
            advanced += 1;
            match current.next_phase(ended_at) {
                Some(next) => current = next,
                None => {
                    return AdvanceResult {
                        state: None,
                        phases_advanced: advanced,
                        completed: true,
                    }
                }
            }
        }

        AdvanceResult {
            state: Some(current),
            phases_advanced: advanced,
            completed: false,
        }
    }

    /// The current phase, unpaused and ending exactly at `now`. Used to skip
    /// ahead through the ordinary phase-end path.
    pub fn forced_to_end(&self, now: DateTime<Utc>) -> Self {
        Self {
            is_paused: false,
            paused_at_utc: None,
            paused_remaining_seconds: None,
            phase_started_at_utc: now,
            phase_duration_seconds: 0,
            ..self.clone()
        }
    }

    /// Structural and range checks applied to anything read back from disk.
    pub fn is_well_formed(&self) -> bool {
        let phase_length = 1..=MAX_PHASE_SECONDS;
        let remaining = 0..=MAX_PHASE_SECONDS;
        (1..=MAX_CYCLES).contains(&self.cycles)
            && (1..=self.cycles).contains(&self.cycle_index)
            && phase_length.contains(&self.work_seconds)
            && phase_length.contains(&self.break_seconds)
            && phase_length.contains(&self.long_break_seconds)
            && remaining.contains(&self.phase_duration_seconds)
            && self.paused_remaining_seconds.map_or(true, |r| remaining.contains(&r))
            && self.is_paused == self.paused_at_utc.is_some()
            && self.is_paused == self.paused_remaining_seconds.is_some()
    }

    /// One-line human status, e.g. `Work 2/4 - 13:05 left`.
    pub fn status_line(&self, now: DateTime<Utc>) -> String {
        if self.is_paused {
            format!("{} {}/{} (paused)", self.phase, self.cycle_index, self.cycles)
        } else {
            format!(
                "{} {}/{} - {} left",
                self.phase,
                self.cycle_index,
                self.cycles,
                format_clock(self.remaining_seconds(now))
            )
        }
    }

    fn running_remaining(&self, now: DateTime<Utc>) -> i64 {
        self.phase_duration_seconds
            .saturating_sub(elapsed_seconds(self.phase_started_at_utc, now))
            .max(0)
    }
}

/// Whole seconds from `start` to `now`, floored.
fn elapsed_seconds(start: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - start).num_milliseconds().div_euclid(1000)
}

/// `MM:SS` with total minutes, clamped at zero.
pub fn format_clock(seconds: i64) -> String {
    let seconds = seconds.max(0);
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

/// Tag of an audit log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    SessionStarted,
    Paused,
    Resumed,
    Stopped,
    Skipped,
    PhaseEnded,
    PhaseStarted,
    SessionCompleted,
}

/// One line of `log.jsonl`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LogEvent {
    #[serde(rename = "Type")]
    pub kind: EventKind,
    pub at_utc: DateTime<Utc>,
    pub state: PomodoroState,
}

impl LogEvent {
    pub fn new(kind: EventKind, at_utc: DateTime<Utc>, state: &PomodoroState) -> Self {
        Self {
            kind,
            at_utc,
            state: state.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    fn secs(n: i64) -> Duration {
        Duration::seconds(n)
    }

    fn options(work: i64, brk: i64, long: i64, cycles: u32) -> SessionOptions {
        SessionOptions {
            work_seconds: work,
            break_seconds: brk,
            long_break_seconds: long,
            cycles,
            auto_advance: true,
            popup: false,
            sound: false,
        }
    }

    #[test]
    fn new_state_starts_in_first_work_phase() {
        let opts = options(1500, 300, 900, 4);
        let state = PomodoroState::new(&opts, t0());
        assert_eq!(state.phase, Phase::Work);
        assert_eq!(state.cycle_index, 1);
        assert_eq!(state.remaining_seconds(t0()), 1500);
        assert!(!state.is_paused);
        assert!(state.is_well_formed());
    }

    #[test]
    fn remaining_floors_partial_seconds_and_goes_negative() {
        let state = PomodoroState::new(&options(10, 5, 5, 1), t0());
        assert_eq!(state.remaining_seconds(t0() + Duration::milliseconds(999)), 10);
        assert_eq!(state.remaining_seconds(t0() + Duration::milliseconds(1500)), 9);
        assert_eq!(state.remaining_seconds(t0() + secs(13)), -3);
        assert_eq!(state.ends_at(), t0() + secs(10));
    }

    #[test]
    fn pause_then_resume_preserves_remaining_time() {
        let state = PomodoroState::new(&options(1500, 300, 900, 4), t0());
        let paused = state.pause(t0() + secs(100));
        assert_eq!(paused.paused_remaining_seconds, Some(1400));
        assert_eq!(paused.paused_at_utc, Some(t0() + secs(100)));
        assert!(paused.is_well_formed());

        // Frozen no matter how long the pause lasts.
        assert_eq!(paused.remaining_seconds(t0() + secs(90_000)), 1400);

        let resume_at = t0() + secs(7_200);
        let resumed = paused.resume(resume_at);
        assert!(!resumed.is_paused);
        assert_eq!(resumed.paused_at_utc, None);
        assert_eq!(resumed.paused_remaining_seconds, None);
        assert_eq!(resumed.remaining_seconds(resume_at), 1400);
    }

    #[test]
    fn pause_and_resume_are_noops_when_already_in_that_state() {
        let state = PomodoroState::new(&options(60, 60, 60, 2), t0());
        assert_eq!(state.resume(t0() + secs(5)), state);

        let paused = state.pause(t0() + secs(10));
        assert_eq!(paused.pause(t0() + secs(20)), paused);
    }

    #[test]
    fn pause_after_deadline_freezes_zero() {
        let state = PomodoroState::new(&options(60, 60, 60, 2), t0());
        let paused = state.pause(t0() + secs(500));
        assert_eq!(paused.paused_remaining_seconds, Some(0));
    }

    #[test]
    fn next_phase_follows_the_transition_table() {
        let opts = options(100, 20, 50, 2);
        let work1 = PomodoroState::new(&opts, t0());

        let break1 = work1.next_phase(t0() + secs(100)).unwrap();
        assert_eq!((break1.phase, break1.cycle_index), (Phase::Break, 1));
        assert_eq!(break1.phase_duration_seconds, 20);
        assert_eq!(break1.phase_started_at_utc, t0() + secs(100));

        let work2 = break1.next_phase(t0() + secs(120)).unwrap();
        assert_eq!((work2.phase, work2.cycle_index), (Phase::Work, 2));
        assert_eq!(work2.phase_duration_seconds, 100);

        let long = work2.next_phase(t0() + secs(220)).unwrap();
        assert_eq!((long.phase, long.cycle_index), (Phase::LongBreak, 2));
        assert_eq!(long.phase_duration_seconds, 50);

        assert!(long.next_phase(t0() + secs(270)).is_none());
    }

    #[test]
    fn next_phase_clears_pause() {
        let state = PomodoroState::new(&options(100, 20, 50, 2), t0()).pause(t0() + secs(3));
        let next = state.next_phase(t0() + secs(10)).unwrap();
        assert!(!next.is_paused);
        assert!(next.paused_at_utc.is_none());
        assert!(next.paused_remaining_seconds.is_none());
    }

    #[test]
    fn natural_phase_order_for_four_cycles() {
        let opts = options(60, 10, 30, 4);
        let mut state = PomodoroState::new(&opts, t0());
        let mut seen = vec![(state.phase, state.cycle_index)];
        while let Some(next) = state.next_phase(state.ends_at()) {
            seen.push((next.phase, next.cycle_index));
            state = next;
        }
        assert_eq!(
            seen,
            vec![
                (Phase::Work, 1),
                (Phase::Break, 1),
                (Phase::Work, 2),
                (Phase::Break, 2),
                (Phase::Work, 3),
                (Phase::Break, 3),
                (Phase::Work, 4),
                (Phase::LongBreak, 4),
            ]
        );
    }

    #[test]
    fn advance_to_completes_a_whole_session_in_one_call() {
        let opts = options(60, 10, 30, 4);
        let state = PomodoroState::new(&opts, t0());
        // 4 * 60 + 3 * 10 + 30 = 300 seconds in total.
        let result = state.advance_to(t0() + secs(300));
        assert!(result.completed);
        assert!(result.state.is_none());
        assert_eq!(result.phases_advanced, 8);
    }

    #[test]
    fn advance_to_anchors_chained_phases_at_nominal_ends() {
        let opts = options(60, 10, 30, 4);
        let state = PomodoroState::new(&opts, t0());
        // Work(1) ends at 60, Break(1) at 70, Work(2) runs 70..130.
        let result = state.advance_to(t0() + secs(95));
        assert_eq!(result.phases_advanced, 2);
        assert!(!result.completed);
        let current = result.state.unwrap();
        assert_eq!((current.phase, current.cycle_index), (Phase::Work, 2));
        assert_eq!(current.phase_started_at_utc, t0() + secs(70));
        assert_eq!(current.remaining_seconds(t0() + secs(95)), 35);
    }

    #[test]
    fn advance_to_is_idempotent_at_a_fixed_instant() {
        let opts = options(60, 10, 30, 4);
        let now = t0() + secs(145);
        let first = PomodoroState::new(&opts, t0()).advance_to(now);
        let caught_up = first.state.clone().unwrap();

        let second = caught_up.advance_to(now);
        assert_eq!(second.phases_advanced, 0);
        assert!(!second.completed);
        assert_eq!(second.state, Some(caught_up));
    }

    #[test]
    fn advance_to_never_moves_a_paused_state() {
        let opts = options(60, 10, 30, 4);
        let paused = PomodoroState::new(&opts, t0()).pause(t0() + secs(59));
        let result = paused.advance_to(t0() + secs(10_000));
        assert_eq!(result.phases_advanced, 0);
        assert!(!result.completed);
        assert_eq!(result.state, Some(paused));
    }

    #[test]
    fn forced_end_advances_exactly_one_phase_even_when_paused() {
        let opts = options(60, 10, 30, 4);
        let now = t0() + secs(20);
        let paused = PomodoroState::new(&opts, t0()).pause(t0() + secs(5));

        let forced = paused.forced_to_end(now);
        assert_eq!(forced.remaining_seconds(now), 0);

        let result = forced.advance_to(now);
        assert_eq!(result.phases_advanced, 1);
        let next = result.state.unwrap();
        assert_eq!(next.phase, Phase::Break);
        assert_eq!(next.phase_started_at_utc, now);
        assert_eq!(next.remaining_seconds(now), 10);
    }

    #[test]
    fn well_formed_rejects_broken_invariants() {
        let mut state = PomodoroState::new(&options(60, 10, 30, 2), t0());
        state.cycle_index = 3;
        assert!(!state.is_well_formed());

        let mut state = PomodoroState::new(&options(60, 10, 30, 2), t0());
        state.is_paused = true;
        assert!(!state.is_well_formed());
    }

    #[test]
    fn well_formed_rejects_out_of_range_durations() {
        let valid = PomodoroState::new(&options(60, 10, 30, 2), t0()).pause(t0() + secs(5));
        assert!(valid.is_well_formed());

        let mut state = valid.clone();
        state.paused_remaining_seconds = Some(i64::MIN);
        assert!(!state.is_well_formed());

        let mut state = valid.clone();
        state.paused_remaining_seconds = Some(MAX_PHASE_SECONDS + 1);
        assert!(!state.is_well_formed());

        let mut state = valid.clone();
        state.break_seconds = 0;
        assert!(!state.is_well_formed());

        let mut state = valid.clone();
        state.long_break_seconds = i64::MAX;
        assert!(!state.is_well_formed());

        let mut state = valid.clone();
        state.phase_duration_seconds = -1;
        assert!(!state.is_well_formed());

        let mut state = valid;
        state.cycles = MAX_CYCLES + 1;
        assert!(!state.is_well_formed());
    }

    #[test]
    fn extreme_durations_do_not_overflow() {
        let mut state = PomodoroState::new(&options(60, 10, 30, 2), t0());
        state.phase_duration_seconds = i64::MIN;
        assert_eq!(state.remaining_seconds(t0() + secs(10)), i64::MIN);
        assert_eq!(state.ends_at(), t0());

        state.phase_duration_seconds = i64::MAX;
        assert_eq!(state.ends_at(), t0() + secs(MAX_PHASE_SECONDS));
    }

    #[test]
    fn status_line_and_clock_formatting() {
        let state = PomodoroState::new(&options(1500, 300, 900, 4), t0());
        assert_eq!(state.status_line(t0() + secs(65)), "Work 1/4 - 23:55 left");
        assert_eq!(
            state.pause(t0()).status_line(t0()),
            "Work 1/4 (paused)"
        );
        assert_eq!(format_clock(-5), "00:00");
        assert_eq!(format_clock(3_725), "62:05");
    }

    #[test]
    fn log_event_wire_shape() {
        let state = PomodoroState::new(&options(60, 10, 30, 1), t0());
        let event = LogEvent::new(EventKind::PhaseEnded, t0(), &state);
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["Type"], "phase_ended");
        assert_eq!(value["AtUtc"], "2024-03-01T09:00:00Z");
        assert_eq!(value["State"]["Phase"], "Work");
        assert_eq!(value["State"]["CycleIndex"], 1);
        assert!(value["State"]["PausedAtUtc"].is_null());
    }
}
