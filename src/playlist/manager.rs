use std::sync::{Arc, Mutex as StdMutex};

use tokio::{
    sync::{broadcast, mpsc, Mutex},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use crate::{
    audio::{AudioOutput, OutputEvent},
    error::AudioError,
};

use super::{PlaylistSnapshot, PlaylistState, Track};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

const EVENT_CAPACITY: usize = 32;

#[derive(Debug, Clone, PartialEq)]
pub enum PlaylistEvent {
    StateChanged(PlaylistSnapshot),
    TrackChanged {
        index: usize,
        name: String,
        /// True when the previous track ran out on its own.
        auto: bool,
    },
    /// Forced off with the position rewound, e.g. on session completion.
    Stopped,
    /// Diagnostic only; the user's intent is left as it was.
    PlaybackFailed { op: &'static str, reason: String },
}

#[derive(Clone)]
struct Shared {
    state: Arc<Mutex<PlaylistState>>,
    output: Arc<dyn AudioOutput>,
    events: broadcast::Sender<PlaylistEvent>,
}

struct Lifecycle {
    cancel: CancellationToken,
    watcher: StdMutex<Option<JoinHandle<()>>>,
}

impl Drop for Lifecycle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Background playlist. Sole owner of the audio output handle.
#[derive(Clone)]
pub struct PlaylistManager {
    shared: Shared,
    lifecycle: Arc<Lifecycle>,
}

impl PlaylistManager {
    /// Builds the manager from a settled discovery result and starts
    /// listening for end-of-track notices. Must be called inside a tokio runtime.
    pub fn new(
        tracks: Vec<Track>,
        volume: f32,
        output: Arc<dyn AudioOutput>,
        output_events: mpsc::UnboundedReceiver<OutputEvent>,
    ) -> Self {
        let state = PlaylistState::new(tracks, volume);
        if state.has_playlist() {
            if let Err(err) = output.set_volume(state.volume()) {
                log_warn!("set initial volume: {err}");
            }
        }
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let shared = Shared {
            state: Arc::new(Mutex::new(state)),
            output,
            events,
        };

        let cancel = CancellationToken::new();
        let watcher = tokio::spawn(watch_output(shared.clone(), output_events, cancel.clone()));

        Self {
            shared,
            lifecycle: Arc::new(Lifecycle {
                cancel,
                watcher: StdMutex::new(Some(watcher)),
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlaylistEvent> {
        self.shared.events.subscribe()
    }

    pub async fn snapshot(&self) -> PlaylistSnapshot {
        self.shared.state.lock().await.snapshot()
    }

    pub async fn has_playlist(&self) -> bool {
        self.shared.state.lock().await.has_playlist()
    }

    pub async fn enabled(&self) -> bool {
        self.shared.state.lock().await.enabled()
    }

    pub async fn current_index(&self) -> usize {
        self.shared.state.lock().await.current_index()
    }

    pub async fn track_count(&self) -> usize {
        self.shared.state.lock().await.track_count()
    }

    /// Turns music on. A no-op without tracks.
    pub async fn enable(&self) -> PlaylistSnapshot {
        let mut state = self.shared.state.lock().await;
        if !state.set_enabled(true) {
            log_debug!("no background tracks; music stays off");
            return state.snapshot();
        }
        self.shared.play_current(&mut state, "enable");
        self.shared.changed(&state)
    }

    /// Turns music off, keeping the position in the current track.
    pub async fn disable(&self) -> PlaylistSnapshot {
        let mut state = self.shared.state.lock().await;
        state.set_enabled(false);
        if state.loaded().is_some() {
            self.shared.report("disable", self.shared.output.pause());
        }
        self.shared.changed(&state)
    }

    pub async fn toggle(&self) -> PlaylistSnapshot {
        if self.enabled().await {
            self.disable().await
        } else {
            self.enable().await
        }
    }

    /// Forces music off and rewinds the current track.
    pub async fn stop(&self) -> PlaylistSnapshot {
        let mut state = self.shared.state.lock().await;
        self.shared.halt(&mut state, "stop");
        let _ = self.shared.events.send(PlaylistEvent::Stopped);
        self.shared.changed(&state)
    }

    /// Moves to the next track, playing it right away when music is on.
    /// Ignored with fewer than two tracks.
    pub async fn skip_next(&self) -> PlaylistSnapshot {
        let mut state = self.shared.state.lock().await;
        if state.skip_next().is_none() {
            return state.snapshot();
        }
        self.shared.track_changed(&mut state, false);
        self.shared.changed(&state)
    }

    pub async fn set_volume(&self, volume: f32) -> PlaylistSnapshot {
        let mut state = self.shared.state.lock().await;
        let applied = state.set_volume(volume);
        self.shared
            .report("set volume", self.shared.output.set_volume(applied));
        self.shared.changed(&state)
    }

    /// Stops playback, releases the output and waits for the listener to exit.
    pub async fn shutdown(&self) {
        self.lifecycle.cancel.cancel();
        let watcher = self
            .lifecycle
            .watcher
            .lock()
            .ok()
            .and_then(|mut guard| guard.take());
        if let Some(watcher) = watcher {
            if let Err(err) = watcher.await {
                log_error!("playlist listener ended abnormally: {err}");
            }
        }
    }
}

impl Shared {
    fn play_current(&self, state: &mut PlaylistState, op: &'static str) {
        if state.needs_load() {
            if let Some((location, load_id)) = state.begin_load() {
                if let Err(err) = self.output.load(&location, load_id) {
                    // nothing is loaded; the next play attempt starts over
                    state.clear_loaded();
                    self.failed(op, err.to_string());
                    return;
                }
            }
        }
        self.report(op, self.output.play());
    }

    fn halt(&self, state: &mut PlaylistState, op: &'static str) {
        state.set_enabled(false);
        if state.loaded().is_some() {
            state.clear_loaded();
            self.report(op, self.output.stop());
        }
    }

    fn track_changed(&self, state: &mut PlaylistState, auto: bool) {
        if state.enabled() {
            self.play_current(state, if auto { "auto-advance" } else { "skip" });
        }
        if let Some(track) = state.current() {
            log_info!("now on track {} ({})", state.current_index() + 1, track.name);
            let _ = self.events.send(PlaylistEvent::TrackChanged {
                index: state.current_index(),
                name: track.name.clone(),
                auto,
            });
        }
    }

    fn changed(&self, state: &PlaylistState) -> PlaylistSnapshot {
        let snapshot = state.snapshot();
        let _ = self.events.send(PlaylistEvent::StateChanged(snapshot.clone()));
        snapshot
    }

    fn report(&self, op: &'static str, result: Result<(), AudioError>) {
        if let Err(err) = result {
            self.failed(op, err.to_string());
        }
    }

    fn failed(&self, op: &'static str, reason: String) {
        log_warn!("{op}: {reason}");
        let _ = self
            .events
            .send(PlaylistEvent::PlaybackFailed { op, reason });
    }

    async fn on_output_event(&self, event: OutputEvent) {
        let mut state = self.state.lock().await;
        match event {
            OutputEvent::Finished { load_id } => {
                if !state.is_current_load(load_id) {
                    log_debug!("ignoring end of stale load {load_id}");
                    return;
                }
                state.advance();
                self.track_changed(&mut state, true);
                self.changed(&state);
            }
            OutputEvent::Failed { load_id, reason } => {
                if let Some(load_id) = load_id {
                    if !state.is_current_load(load_id) {
                        log_debug!("ignoring failure of stale load {load_id}: {reason}");
                        return;
                    }
                }
                // untagged: the output holds no track at all
                state.clear_loaded();
                self.failed("playback", reason);
            }
        }
    }

    async fn teardown(&self) {
        let mut state = self.state.lock().await;
        self.halt(&mut state, "shutdown");
        self.report("shutdown", self.output.release());
        log_debug!("playlist released its audio output");
    }
}

async fn watch_output(
    shared: Shared,
    mut output_events: mpsc::UnboundedReceiver<OutputEvent>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            event = output_events.recv() => match event {
                Some(event) => shared.on_output_event(event).await,
                None => {
                    cancel.cancelled().await;
                    break;
                }
            },
        }
    }
    shared.teardown().await;
}
