use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::{Duration, Instant};
use uuid::Uuid;

use crate::error::TimerError;

pub const MIN_MINUTES: u32 = 1;
pub const MAX_MINUTES: u32 = 60;
pub const DEFAULT_MINUTES: u32 = 25;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum TimerStatus {
    #[default]
    Idle,
    Running,
    Paused,
    Completed,
}

/// Result of recomputing the remaining time on a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing is running; the tick was ignored.
    Inactive,
    Ticked { remaining_secs: u64 },
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerState {
    pub status: TimerStatus,
    pub session_id: Option<String>,
    pub configured_secs: u64,
    pub started_at: Option<DateTime<Utc>>,
    /// Remaining time while not running. Keeps sub-second precision so a
    /// pause in the middle of a second does not hand that second back.
    #[serde(skip)]
    baseline: Duration,
    /// Absolute end of the session; only set while running.
    #[serde(skip)]
    deadline: Option<Instant>,
    /// Bumped on every transition. Tickers carry the epoch they were spawned
    /// for and stop touching state once it moves on.
    #[serde(skip)]
    epoch: u64,
}

impl Default for TimerState {
    fn default() -> Self {
        Self::with_minutes(DEFAULT_MINUTES)
    }
}

impl TimerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idle state with the given duration; out-of-range values are clamped.
    pub fn with_minutes(minutes: u32) -> Self {
        let configured_secs = u64::from(minutes.clamp(MIN_MINUTES, MAX_MINUTES)) * 60;
        Self {
            status: TimerStatus::Idle,
            session_id: None,
            configured_secs,
            started_at: None,
            baseline: Duration::from_secs(configured_secs),
            deadline: None,
            epoch: 0,
        }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn remaining(&self, now: Instant) -> Duration {
        match (self.status, self.deadline) {
            (TimerStatus::Running, Some(deadline)) => deadline.saturating_duration_since(now),
            _ => self.baseline,
        }
    }

    /// Whole seconds left, rounded up so the display only reaches zero at the deadline.
    pub fn remaining_secs(&self, now: Instant) -> u64 {
        ceil_secs(self.remaining(now))
    }

    /// The instant the whole-second value next changes, or `None` when not running.
    pub fn next_tick_at(&self, now: Instant) -> Option<Instant> {
        let deadline = self.deadline.filter(|_| self.status == TimerStatus::Running)?;
        let remaining_secs = self.remaining_secs(now);
        if remaining_secs == 0 {
            return Some(now);
        }
        Some(deadline - Duration::from_secs(remaining_secs - 1))
    }

    pub fn set_duration(&mut self, minutes: u32) -> Result<(), TimerError> {
        if self.status != TimerStatus::Idle {
            return Err(TimerError::InvalidState {
                op: "set duration",
                status: self.status,
            });
        }
        if !(MIN_MINUTES..=MAX_MINUTES).contains(&minutes) {
            return Err(TimerError::InvalidDuration(minutes));
        }

        self.configured_secs = u64::from(minutes) * 60;
        self.baseline = Duration::from_secs(self.configured_secs);
        self.epoch += 1;
        Ok(())
    }

    /// Begins a fresh session from `Idle` or `Completed`.
    pub fn start(&mut self, now: Instant, started_at: DateTime<Utc>) -> Result<(), TimerError> {
        match self.status {
            TimerStatus::Idle | TimerStatus::Completed => {}
            status => return Err(TimerError::InvalidState { op: "start", status }),
        }

        let full = Duration::from_secs(self.configured_secs);
        self.status = TimerStatus::Running;
        self.session_id = Some(Uuid::new_v4().to_string());
        self.started_at = Some(started_at);
        self.baseline = full;
        self.deadline = Some(now + full);
        self.epoch += 1;
        Ok(())
    }

    pub fn pause(&mut self, now: Instant) -> Result<(), TimerError> {
        if self.status != TimerStatus::Running {
            return Err(TimerError::InvalidState {
                op: "pause",
                status: self.status,
            });
        }
        self.freeze(now);
        Ok(())
    }

    pub fn resume(&mut self, now: Instant) -> Result<(), TimerError> {
        if self.status != TimerStatus::Paused {
            return Err(TimerError::InvalidState {
                op: "resume",
                status: self.status,
            });
        }

        self.status = TimerStatus::Running;
        self.deadline = Some(now + self.baseline);
        self.epoch += 1;
        Ok(())
    }

    /// Play/pause button semantics.
    pub fn toggle(&mut self, now: Instant, started_at: DateTime<Utc>) -> Result<(), TimerError> {
        match self.status {
            TimerStatus::Idle | TimerStatus::Completed => self.start(now, started_at),
            TimerStatus::Running => self.pause(now),
            TimerStatus::Paused => self.resume(now),
        }
    }

    pub fn reset(&mut self) {
        self.status = TimerStatus::Idle;
        self.session_id = None;
        self.started_at = None;
        self.baseline = Duration::from_secs(self.configured_secs);
        self.deadline = None;
        self.epoch += 1;
    }

    /// The ticker died while running: park the session as paused with
    /// whatever time was left at `now`.
    pub fn fault(&mut self, now: Instant) -> bool {
        if self.status != TimerStatus::Running {
            return false;
        }
        self.freeze(now);
        true
    }

    /// Recomputes the remaining time from the deadline. Reaching zero
    /// completes the session in the same step.
    pub fn tick(&mut self, now: Instant) -> TickOutcome {
        if self.status != TimerStatus::Running {
            return TickOutcome::Inactive;
        }

        let remaining_secs = self.remaining_secs(now);
        if remaining_secs > 0 {
            return TickOutcome::Ticked { remaining_secs };
        }

        self.status = TimerStatus::Completed;
        self.baseline = Duration::ZERO;
        self.deadline = None;
        self.epoch += 1;
        TickOutcome::Completed
    }

    fn freeze(&mut self, now: Instant) {
        self.baseline = self.remaining(now);
        self.deadline = None;
        self.status = if self.baseline.is_zero() {
            TimerStatus::Completed
        } else {
            TimerStatus::Paused
        };
        self.epoch += 1;
    }
}

fn ceil_secs(duration: Duration) -> u64 {
    duration.as_secs() + u64::from(duration.subsec_nanos() > 0)
}

/// `MM:SS`, the way the focus clock is shown.
pub fn format_clock(secs: u64) -> String {
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ONE_SECOND: Duration = Duration::from_secs(1);

    fn running(minutes: u32, now: Instant) -> TimerState {
        let mut state = TimerState::with_minutes(minutes);
        state.start(now, Utc::now()).unwrap();
        state
    }

    #[test]
    fn idle_state_holds_full_duration() {
        let state = TimerState::new();
        let now = Instant::now();
        assert_eq!(state.status, TimerStatus::Idle);
        assert_eq!(state.configured_secs, 25 * 60);
        assert_eq!(state.remaining_secs(now), state.configured_secs);
        assert!(state.next_tick_at(now).is_none());
    }

    #[test]
    fn full_run_produces_one_tick_per_second() {
        for minutes in [1, 7, 25, 60] {
            let start = Instant::now();
            let mut state = running(minutes, start);
            let mut now = start;
            let mut ticks = 0u64;
            let mut completions = 0;

            while let Some(at) = state.next_tick_at(now) {
                assert_eq!(at - now, ONE_SECOND);
                now = at;
                ticks += 1;
                match state.tick(now) {
                    TickOutcome::Ticked { remaining_secs } => {
                        assert_eq!(remaining_secs, state.configured_secs - ticks);
                    }
                    TickOutcome::Completed => completions += 1,
                    TickOutcome::Inactive => unreachable!(),
                }
            }

            assert_eq!(ticks, u64::from(minutes) * 60);
            assert_eq!(completions, 1);
            assert_eq!(now - start, Duration::from_secs(u64::from(minutes) * 60));
            assert_eq!(state.status, TimerStatus::Completed);
            assert_eq!(state.remaining_secs(now), 0);
        }
    }

    #[test]
    fn tick_reaching_zero_completes_atomically() {
        let start = Instant::now();
        let mut state = running(1, start);

        assert_eq!(
            state.tick(start + Duration::from_secs(59)),
            TickOutcome::Ticked { remaining_secs: 1 }
        );
        assert_eq!(state.tick(start + Duration::from_secs(60)), TickOutcome::Completed);
        assert_eq!(state.status, TimerStatus::Completed);
        assert_eq!(state.remaining_secs(start + Duration::from_secs(61)), 0);
        assert_eq!(state.tick(start + Duration::from_secs(61)), TickOutcome::Inactive);
    }

    #[test]
    fn late_tick_never_goes_negative() {
        let start = Instant::now();
        let mut state = running(1, start);
        assert_eq!(state.tick(start + Duration::from_secs(500)), TickOutcome::Completed);
        assert_eq!(state.remaining_secs(start + Duration::from_secs(500)), 0);
    }

    #[test]
    fn ticks_follow_the_deadline_not_the_tick_count() {
        let start = Instant::now();
        let mut state = running(25, start);
        // a tick delivered 3.4s late reads the deadline, not "previous minus one"
        assert_eq!(
            state.tick(start + Duration::from_millis(4_400)),
            TickOutcome::Ticked {
                remaining_secs: 1496
            }
        );
        assert_eq!(
            state.next_tick_at(start + Duration::from_millis(4_400)),
            Some(start + Duration::from_secs(5))
        );
    }

    #[test]
    fn pause_then_immediate_resume_keeps_remaining() {
        let start = Instant::now();
        let mut state = running(25, start);
        let at = start + Duration::from_millis(12_300);
        let before = state.remaining_secs(at);

        state.pause(at).unwrap();
        state.resume(at).unwrap();

        assert_eq!(state.status, TimerStatus::Running);
        assert_eq!(state.remaining_secs(at), before);
    }

    #[test]
    fn pause_length_does_not_consume_time() {
        for (minutes, expected) in [(25, 1490), (15, 890)] {
            let start = Instant::now();
            let mut state = running(minutes, start);
            let paused_at = start + Duration::from_secs(10);
            state.pause(paused_at).unwrap();

            let resumed_at = paused_at + Duration::from_secs(7_200);
            assert_eq!(state.remaining_secs(resumed_at), expected);
            state.resume(resumed_at).unwrap();
            assert_eq!(state.remaining_secs(resumed_at), expected);
            assert_eq!(
                state.deadline(),
                Some(resumed_at + Duration::from_secs(expected))
            );
        }
    }

    #[test]
    fn mid_second_pause_keeps_fraction() {
        let start = Instant::now();
        let mut state = running(1, start);
        state.pause(start + Duration::from_millis(500)).unwrap();
        assert_eq!(state.remaining(start), Duration::from_millis(59_500));
        assert_eq!(state.remaining_secs(start), 60);
    }

    #[test]
    fn reset_is_idempotent_from_every_state() {
        let start = Instant::now();
        let later = start + Duration::from_secs(30);

        let mut idle = TimerState::with_minutes(5);
        let mut run = running(5, start);
        let mut paused = running(5, start);
        paused.pause(later).unwrap();
        let mut done = running(1, start);
        done.tick(start + Duration::from_secs(60));

        for state in [&mut idle, &mut run, &mut paused, &mut done] {
            state.reset();
            let once = (state.status, state.remaining_secs(later));
            state.reset();
            assert_eq!((state.status, state.remaining_secs(later)), once);
            assert_eq!(state.status, TimerStatus::Idle);
            assert_eq!(state.remaining_secs(later), state.configured_secs);
            assert!(state.session_id.is_none());
        }
        assert_eq!(done.configured_secs, 60);
    }

    #[test]
    fn set_duration_only_applies_when_idle() {
        let start = Instant::now();
        let mut state = TimerState::with_minutes(25);
        state.set_duration(10).unwrap();
        assert_eq!(state.configured_secs, 600);
        assert_eq!(state.remaining_secs(start), 600);

        state.start(start, Utc::now()).unwrap();
        let err = state.set_duration(30).unwrap_err();
        assert_eq!(
            err,
            TimerError::InvalidState {
                op: "set duration",
                status: TimerStatus::Running
            }
        );
        assert_eq!(state.configured_secs, 600);

        state.pause(start + Duration::from_secs(1)).unwrap();
        assert!(state.set_duration(30).is_err());
        assert_eq!(state.remaining_secs(start), 599);
    }

    #[test]
    fn set_duration_rejects_out_of_range_minutes() {
        let mut state = TimerState::new();
        assert_eq!(state.set_duration(0), Err(TimerError::InvalidDuration(0)));
        assert_eq!(state.set_duration(61), Err(TimerError::InvalidDuration(61)));
        assert_eq!(state.configured_secs, 1500);
        state.set_duration(60).unwrap();
        state.set_duration(1).unwrap();
        assert_eq!(state.configured_secs, 60);
    }

    #[test]
    fn toggle_walks_the_play_pause_cycle() {
        let start = Instant::now();
        let mut state = TimerState::with_minutes(1);

        state.toggle(start, Utc::now()).unwrap();
        assert_eq!(state.status, TimerStatus::Running);
        state.toggle(start + Duration::from_secs(5), Utc::now()).unwrap();
        assert_eq!(state.status, TimerStatus::Paused);
        state.toggle(start + Duration::from_secs(9), Utc::now()).unwrap();
        assert_eq!(state.status, TimerStatus::Running);
        assert_eq!(state.remaining_secs(start + Duration::from_secs(9)), 55);
    }

    #[test]
    fn start_after_completion_runs_a_fresh_session() {
        let start = Instant::now();
        let mut state = running(1, start);
        let first_session = state.session_id.clone();
        state.tick(start + Duration::from_secs(60));

        let again = start + Duration::from_secs(90);
        state.toggle(again, Utc::now()).unwrap();
        assert_eq!(state.status, TimerStatus::Running);
        assert_eq!(state.remaining_secs(again), 60);
        assert_ne!(state.session_id, first_session);
    }

    #[test]
    fn illegal_transitions_are_rejected_without_mutation() {
        let start = Instant::now();
        let mut state = TimerState::new();
        assert!(state.pause(start).is_err());
        assert!(state.resume(start).is_err());

        state.start(start, Utc::now()).unwrap();
        let epoch = state.epoch();
        assert!(state.start(start, Utc::now()).is_err());
        assert!(state.resume(start).is_err());
        assert_eq!(state.epoch(), epoch);
        assert_eq!(state.status, TimerStatus::Running);
    }

    #[test]
    fn fault_parks_a_running_session() {
        let start = Instant::now();
        let mut state = running(2, start);
        assert!(state.fault(start + Duration::from_secs(20)));
        assert_eq!(state.status, TimerStatus::Paused);
        assert_eq!(state.remaining_secs(start + Duration::from_secs(500)), 100);
        assert!(!state.fault(start + Duration::from_secs(21)));
    }

    #[test]
    fn clock_format() {
        assert_eq!(format_clock(1500), "25:00");
        assert_eq!(format_clock(890), "14:50");
        assert_eq!(format_clock(59), "00:59");
        assert_eq!(format_clock(3600), "60:00");
    }
}
