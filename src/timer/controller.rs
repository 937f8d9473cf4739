use std::{panic::AssertUnwindSafe, sync::Arc};

use chrono::{DateTime, Utc};
use futures::FutureExt;
use log::{debug, error, info};
use serde::Serialize;
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
    time::{self, Instant},
};
use tokio_util::sync::CancellationToken;

use crate::error::TimerError;

use super::{format_clock, TickOutcome, TimerState, TimerStatus};

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TimerSnapshot {
    pub status: TimerStatus,
    pub configured_secs: u64,
    pub remaining_secs: u64,
    pub session_id: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_id: String,
    pub duration_secs: u64,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum TimerEvent {
    /// Any transition: start, pause, resume, reset, duration change.
    StateChanged(TimerSnapshot),
    /// The whole-second remaining value changed while running.
    Tick(TimerSnapshot),
    Completed(SessionSummary),
    /// The ticker died; the session was parked as paused.
    Fault(TimerSnapshot),
}

struct Ticker {
    epoch: u64,
    handle: JoinHandle<()>,
    cancel: CancellationToken,
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.handle.abort();
    }
}

/// Countdown engine. Clones share one session; dropping the last clone
/// cancels any pending tick.
#[derive(Clone)]
pub struct TimerController {
    state: Arc<Mutex<TimerState>>,
    ticker: Arc<Mutex<Option<Ticker>>>,
    events: broadcast::Sender<TimerEvent>,
    heartbeat_every_ticks: u32,
}

impl TimerController {
    pub fn new(default_minutes: u32) -> Self {
        let debug_mode = std::env::var("LETSFOCUS_DEBUG")
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            state: Arc::new(Mutex::new(TimerState::with_minutes(default_minutes))),
            ticker: Arc::new(Mutex::new(None)),
            events,
            heartbeat_every_ticks: if debug_mode { 1 } else { 60 },
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TimerEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> TimerSnapshot {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        let mut ticker = self.ticker.lock().await;
        self.settle(&mut state, &mut ticker, now);
        snapshot_of(&state, now)
    }

    pub async fn status(&self) -> TimerStatus {
        self.snapshot().await.status
    }

    pub async fn remaining_secs(&self) -> u64 {
        self.snapshot().await.remaining_secs
    }

    pub async fn start(&self) -> Result<TimerSnapshot, TimerError> {
        self.transition(|state, now| state.start(now, Utc::now()))
            .await
    }

    pub async fn pause(&self) -> Result<TimerSnapshot, TimerError> {
        self.transition(|state, now| state.pause(now)).await
    }

    pub async fn resume(&self) -> Result<TimerSnapshot, TimerError> {
        self.transition(|state, now| state.resume(now)).await
    }

    pub async fn toggle(&self) -> Result<TimerSnapshot, TimerError> {
        self.transition(|state, now| state.toggle(now, Utc::now()))
            .await
    }

    pub async fn reset(&self) -> Result<TimerSnapshot, TimerError> {
        self.transition(|state, _| {
            state.reset();
            Ok(())
        })
        .await
    }

    pub async fn set_duration(&self, minutes: u32) -> Result<TimerSnapshot, TimerError> {
        self.transition(|state, _| state.set_duration(minutes))
            .await
    }

    /// Cancels the ticker and discards the current session.
    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        let mut ticker = self.ticker.lock().await;
        ticker.take();
        if state.status != TimerStatus::Idle {
            info!("discarding {:?} focus session on shutdown", state.status);
            state.reset();
        }
    }

    async fn transition<F>(&self, op: F) -> Result<TimerSnapshot, TimerError>
    where
        F: FnOnce(&mut TimerState, Instant) -> Result<(), TimerError>,
    {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        let mut ticker = self.ticker.lock().await;
        self.settle(&mut state, &mut ticker, now);

        let before = state.status;
        op(&mut *state, now)?;

        ticker.take();
        if state.status == TimerStatus::Running {
            *ticker = Some(self.spawn_ticker(state.epoch()));
        }

        let snapshot = snapshot_of(&state, now);
        debug!(
            "timer {:?} -> {:?} ({} left)",
            before,
            snapshot.status,
            format_clock(snapshot.remaining_secs)
        );

        if before == TimerStatus::Running && state.status == TimerStatus::Completed {
            publish_completion(&self.events, snapshot.clone(), summary_of(&state));
        } else {
            let _ = self.events.send(TimerEvent::StateChanged(snapshot.clone()));
        }
        Ok(snapshot)
    }

    /// Brings the session up to date before anyone observes it: a deadline
    /// that already passed completes the session, and a running session
    /// whose ticker is gone gets parked.
    fn settle(&self, state: &mut TimerState, ticker: &mut Option<Ticker>, now: Instant) {
        if state.status != TimerStatus::Running {
            return;
        }

        if state.tick(now) == TickOutcome::Completed {
            ticker.take();
            info!("focus session complete");
            publish_completion(&self.events, snapshot_of(state, now), summary_of(state));
            return;
        }

        let alive = ticker
            .as_ref()
            .is_some_and(|t| t.epoch == state.epoch() && !t.handle.is_finished());
        if !alive {
            ticker.take();
            state.fault(now);
            let snapshot = snapshot_of(state, now);
            error!(
                "timer ticker stopped while running; session paused with {} left",
                format_clock(snapshot.remaining_secs)
            );
            let _ = self.events.send(TimerEvent::Fault(snapshot.clone()));
            let _ = self.events.send(TimerEvent::StateChanged(snapshot));
        }
    }

    fn spawn_ticker(&self, epoch: u64) -> Ticker {
        let cancel = CancellationToken::new();
        let state = self.state.clone();
        let events = self.events.clone();
        let heartbeat_every = self.heartbeat_every_ticks.max(1);
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            let run = tick_loop(state.clone(), events.clone(), epoch, heartbeat_every, token);
            if AssertUnwindSafe(run).catch_unwind().await.is_err() {
                fault_session(&state, &events, epoch).await;
            }
        });

        Ticker {
            epoch,
            handle,
            cancel,
        }
    }
}

async fn tick_loop(
    state: Arc<Mutex<TimerState>>,
    events: broadcast::Sender<TimerEvent>,
    epoch: u64,
    heartbeat_every: u32,
    cancel: CancellationToken,
) {
    let mut ticks: u32 = 0;
    let mut last_reported: Option<u64> = None;

    loop {
        let next = {
            let guard = state.lock().await;
            if guard.epoch() != epoch {
                break;
            }
            match guard.next_tick_at(Instant::now()) {
                Some(at) => at,
                None => break,
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = time::sleep_until(next) => {}
        }

        let now = Instant::now();
        let (outcome, snapshot, summary) = {
            let mut guard = state.lock().await;
            if guard.epoch() != epoch || cancel.is_cancelled() {
                break;
            }
            let outcome = guard.tick(now);
            let summary = (outcome == TickOutcome::Completed).then(|| summary_of(&guard));
            (outcome, snapshot_of(&guard, now), summary)
        };

        match outcome {
            TickOutcome::Inactive => break,
            TickOutcome::Ticked { remaining_secs } => {
                if last_reported == Some(remaining_secs) {
                    continue;
                }
                last_reported = Some(remaining_secs);
                ticks = ticks.wrapping_add(1);
                if ticks % heartbeat_every == 0 {
                    info!("focus session: {} left", format_clock(remaining_secs));
                }
                let _ = events.send(TimerEvent::Tick(snapshot));
            }
            TickOutcome::Completed => {
                info!("focus session complete");
                if let Some(summary) = summary {
                    publish_completion(&events, snapshot, summary);
                }
                break;
            }
        }
    }
}

async fn fault_session(
    state: &Mutex<TimerState>,
    events: &broadcast::Sender<TimerEvent>,
    epoch: u64,
) {
    let now = Instant::now();
    let snapshot = {
        let mut guard = state.lock().await;
        if guard.epoch() != epoch {
            return;
        }
        match guard.tick(now) {
            TickOutcome::Inactive => return,
            TickOutcome::Completed => {
                let (snapshot, summary) = (snapshot_of(&guard, now), summary_of(&guard));
                drop(guard);
                info!("focus session complete");
                publish_completion(events, snapshot, summary);
                return;
            }
            TickOutcome::Ticked { .. } => {}
        }
        if !guard.fault(now) {
            return;
        }
        snapshot_of(&guard, now)
    };

    error!(
        "timer ticker panicked; session paused with {} left",
        format_clock(snapshot.remaining_secs)
    );
    let _ = events.send(TimerEvent::Fault(snapshot.clone()));
    let _ = events.send(TimerEvent::StateChanged(snapshot));
}

fn publish_completion(
    events: &broadcast::Sender<TimerEvent>,
    snapshot: TimerSnapshot,
    summary: SessionSummary,
) {
    let _ = events.send(TimerEvent::Tick(snapshot.clone()));
    let _ = events.send(TimerEvent::StateChanged(snapshot));
    let _ = events.send(TimerEvent::Completed(summary));
}

fn snapshot_of(state: &TimerState, now: Instant) -> TimerSnapshot {
    TimerSnapshot {
        status: state.status,
        configured_secs: state.configured_secs,
        remaining_secs: state.remaining_secs(now),
        session_id: state.session_id.clone(),
        started_at: state.started_at,
    }
}

fn summary_of(state: &TimerState) -> SessionSummary {
    let completed_at = Utc::now();
    SessionSummary {
        session_id: state.session_id.clone().unwrap_or_default(),
        duration_secs: state.configured_secs,
        started_at: state.started_at.unwrap_or(completed_at),
        completed_at,
    }
}
