//! Wires the countdown and the playlist together behind one intent entry point.

use std::sync::Mutex as StdMutex;

use log::{error, info, warn};
use serde::Serialize;
use tokio::{
    sync::broadcast::{self, error::RecvError},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use crate::{
    error::TimerError,
    playlist::{PlaylistManager, PlaylistSnapshot},
    timer::{TimerController, TimerEvent, TimerSnapshot, TimerStatus},
};

/// What the shell can ask for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Intent {
    /// Start, pause or resume depending on the current state. Bound to space.
    PlayPause,
    Reset,
    SetMinutes(u32),
    ToggleMusic,
    SkipTrack,
    SetVolume(f32),
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppSnapshot {
    pub timer: TimerSnapshot,
    pub music: PlaylistSnapshot,
}

pub struct FocusApp {
    timer: TimerController,
    playlist: PlaylistManager,
    cancel: CancellationToken,
    bridge: StdMutex<Option<JoinHandle<()>>>,
}

impl FocusApp {
    /// Takes ownership of both components and starts stopping the music
    /// whenever a session completes. Must be called inside a tokio runtime.
    pub fn new(timer: TimerController, playlist: PlaylistManager) -> Self {
        let cancel = CancellationToken::new();
        let bridge = tokio::spawn(stop_music_on_completion(
            timer.subscribe(),
            timer.clone(),
            playlist.clone(),
            cancel.clone(),
        ));

        Self {
            timer,
            playlist,
            cancel,
            bridge: StdMutex::new(Some(bridge)),
        }
    }

    pub fn timer(&self) -> &TimerController {
        &self.timer
    }

    pub fn playlist(&self) -> &PlaylistManager {
        &self.playlist
    }

    pub async fn dispatch(&self, intent: Intent) -> Result<AppSnapshot, TimerError> {
        match intent {
            Intent::PlayPause => {
                self.timer.toggle().await?;
            }
            Intent::Reset => {
                self.timer.reset().await?;
            }
            Intent::SetMinutes(minutes) => {
                self.timer.set_duration(minutes).await?;
            }
            Intent::ToggleMusic => {
                self.playlist.toggle().await;
            }
            Intent::SkipTrack => {
                self.playlist.skip_next().await;
            }
            Intent::SetVolume(volume) => {
                self.playlist.set_volume(volume).await;
            }
        }
        Ok(self.snapshot().await)
    }

    pub async fn snapshot(&self) -> AppSnapshot {
        AppSnapshot {
            timer: self.timer.snapshot().await,
            music: self.playlist.snapshot().await,
        }
    }

    /// Discards the session, stops the music and releases the audio output.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let bridge = self.bridge.lock().ok().and_then(|mut guard| guard.take());
        if let Some(bridge) = bridge {
            if let Err(err) = bridge.await {
                error!("completion bridge ended abnormally: {err}");
            }
        }
        self.timer.shutdown().await;
        self.playlist.shutdown().await;
    }
}

impl Drop for FocusApp {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn stop_music_on_completion(
    mut events: broadcast::Receiver<TimerEvent>,
    timer: TimerController,
    playlist: PlaylistManager,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            event = events.recv() => event,
        };

        match event {
            Ok(TimerEvent::Completed(summary)) => {
                info!(
                    "session {} completed after {}s; stopping music",
                    summary.session_id, summary.duration_secs
                );
                playlist.stop().await;
            }
            Ok(_) => {}
            Err(RecvError::Lagged(missed)) => {
                warn!("completion bridge missed {missed} timer events");
                // the completion may have been among them
                if timer.status().await == TimerStatus::Completed && playlist.enabled().await {
                    playlist.stop().await;
                }
            }
            Err(RecvError::Closed) => break,
        }
    }
}
