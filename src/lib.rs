pub mod app;
pub mod audio;
pub mod error;
pub mod playlist;
pub mod settings;
pub mod timer;
pub mod utils;

use std::{path::PathBuf, sync::Arc};

use anyhow::{bail, Context, Result};
use log::{info, warn};
use tokio::{signal, sync::broadcast::error::RecvError};
use tokio_util::sync::CancellationToken;

use app::{FocusApp, Intent};
use audio::RodioOutput;
use error::DiscoveryError;
use playlist::{discover, DirectoryProber, PlaylistManager};
use settings::SettingsStore;
use timer::{format_clock, TimerController, TimerEvent, TimerStatus, MAX_MINUTES, MIN_MINUTES};

/// One headless session. Unset fields fall back to the settings file.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub minutes: Option<u32>,
    pub music: bool,
    pub music_dir: Option<PathBuf>,
    pub volume: Option<f32>,
    pub settings_path: PathBuf,
    pub verbose: bool,
}

pub fn run(options: RunOptions) -> Result<()> {
    utils::logging::init(options.verbose);

    info!("LetsFocus starting up...");

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build the tokio runtime")?;
    runtime.block_on(run_session(options))
}

async fn run_session(options: RunOptions) -> Result<()> {
    let store = SettingsStore::new(options.settings_path.clone())?;
    let settings = store.get()?;

    let minutes = options.minutes.unwrap_or(settings.default_minutes);
    if !(MIN_MINUTES..=MAX_MINUTES).contains(&minutes) {
        bail!("session length must be {MIN_MINUTES}-{MAX_MINUTES} minutes, got {minutes}");
    }
    let music_dir = options.music_dir.unwrap_or(settings.music.directory);
    let volume = options.volume.unwrap_or(settings.music.volume);
    let music_on = options.music || settings.music.enabled_on_start;

    // Ctrl-C during discovery abandons the probes.
    let cancel = CancellationToken::new();
    let interrupt = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        }
    });
    let prober = DirectoryProber::new(&music_dir);
    let discovered = discover(&prober, &settings.music.discovery, &cancel).await;
    interrupt.abort();
    let tracks = match discovered {
        Ok(tracks) => tracks,
        Err(DiscoveryError::Cancelled) => {
            info!("interrupted before the session started");
            return Ok(());
        }
    };

    let (output, output_events) = RodioOutput::new();
    let playlist = PlaylistManager::new(tracks, volume, Arc::new(output), output_events);
    let app = FocusApp::new(TimerController::new(minutes), playlist);
    let mut timer_events = app.timer().subscribe();

    if music_on {
        let snapshot = app.dispatch(Intent::ToggleMusic).await?;
        if !snapshot.music.has_playlist {
            warn!("no background tracks found in {}", music_dir.display());
        }
    }
    let started = app.dispatch(Intent::PlayPause).await?;
    info!(
        "focus session started: {}",
        format_clock(started.timer.remaining_secs)
    );

    let result = wait_for_session(&app, &mut timer_events).await;
    app.shutdown().await;
    result
}

async fn wait_for_session(
    app: &FocusApp,
    events: &mut tokio::sync::broadcast::Receiver<TimerEvent>,
) -> Result<()> {
    loop {
        tokio::select! {
            event = events.recv() => {
                if session_over(app, event).await? {
                    return Ok(());
                }
            }
            _ = signal::ctrl_c() => {
                let snapshot = app.dispatch(Intent::Reset).await?;
                info!(
                    "interrupted; session reset to {}",
                    format_clock(snapshot.timer.remaining_secs)
                );
                return Ok(());
            }
        }
    }
}

/// Reacts to one timer event; true once the session has ended.
async fn session_over(app: &FocusApp, event: Result<TimerEvent, RecvError>) -> Result<bool> {
    match event {
        Ok(TimerEvent::Completed(summary)) => {
            info!(
                "focus session {} finished ({})",
                summary.session_id,
                format_clock(summary.duration_secs)
            );
            Ok(true)
        }
        Ok(TimerEvent::Fault(snapshot)) => {
            warn!(
                "timer fault with {} left; resuming",
                format_clock(snapshot.remaining_secs)
            );
            app.timer().resume().await?;
            Ok(false)
        }
        Ok(_) => Ok(false),
        Err(RecvError::Lagged(missed)) => {
            warn!("missed {missed} timer events");
            // the completion may have been among them
            let finished = app.timer().status().await == TimerStatus::Completed;
            if finished {
                info!("focus session finished");
            }
            Ok(finished)
        }
        Err(RecvError::Closed) => Ok(true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::{audio::testing::FakeOutput, playlist::state::numbered_tracks};

    fn app(minutes: u32) -> FocusApp {
        let output = Arc::new(FakeOutput::default());
        let (_notices, rx) = FakeOutput::channel();
        let playlist = PlaylistManager::new(numbered_tracks(2), 0.3, output, rx);
        FocusApp::new(TimerController::new(minutes), playlist)
    }

    #[tokio::test(start_paused = true)]
    async fn lag_after_completion_ends_the_session() {
        let app = app(1);
        app.dispatch(Intent::PlayPause).await.unwrap();

        assert!(!session_over(&app, Err(RecvError::Lagged(3))).await.unwrap());

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(session_over(&app, Err(RecvError::Lagged(70))).await.unwrap());
        app.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn fault_resumes_a_parked_session() {
        let app = app(1);
        app.dispatch(Intent::PlayPause).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10_500)).await;
        let parked = app.dispatch(Intent::PlayPause).await.unwrap().timer;
        assert_eq!(parked.status, TimerStatus::Paused);

        assert!(!session_over(&app, Ok(TimerEvent::Fault(parked))).await.unwrap());
        assert_eq!(app.timer().status().await, TimerStatus::Running);
        app.shutdown().await;
    }
}
