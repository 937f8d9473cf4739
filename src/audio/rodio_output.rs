use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{self as std_mpsc, RecvTimeoutError, Sender},
        Mutex,
    },
    thread,
    time::Duration,
};

use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink};
use tokio::sync::mpsc;

use super::{AudioOutput, OutputEvent};
use crate::error::AudioError;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

/// How often the output thread checks whether the playing track ran out.
const END_POLL_INTERVAL: Duration = Duration::from_millis(250);

enum AudioCommand {
    Load { path: PathBuf, load_id: u64 },
    Play,
    Pause,
    Stop,
    SetVolume(f32),
    Release,
}

/// rodio-backed output. The stream and sink are not `Send`, so they live on
/// a dedicated thread that is started on first use and driven by commands.
pub struct RodioOutput {
    tx: Mutex<Option<Sender<AudioCommand>>>,
    events: mpsc::UnboundedSender<OutputEvent>,
    released: AtomicBool,
}

impl RodioOutput {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<OutputEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let output = Self {
            tx: Mutex::new(None),
            events,
            released: AtomicBool::new(false),
        };
        (output, rx)
    }

    fn ensure_thread(&self) -> Result<Sender<AudioCommand>, AudioError> {
        if self.released.load(Ordering::SeqCst) {
            return Err(AudioError::Disconnected("output already released".into()));
        }

        let mut guard = self
            .tx
            .lock()
            .map_err(|e| AudioError::Disconnected(e.to_string()))?;
        if let Some(tx) = guard.as_ref() {
            return Ok(tx.clone());
        }

        let (tx, rx) = std_mpsc::channel::<AudioCommand>();
        let events = self.events.clone();

        thread::Builder::new()
            .name("audio-output".to_string())
            .spawn(move || OutputThread::new(events).run(rx))
            .map_err(|e| AudioError::Output(format!("failed to spawn audio thread: {e}")))?;

        *guard = Some(tx.clone());
        Ok(tx)
    }

    fn send(&self, command: AudioCommand) -> Result<(), AudioError> {
        let tx = self.ensure_thread()?;
        if let Err(err) = tx.send(command) {
            // thread is gone; forget it so the next call starts a fresh one
            if let Ok(mut guard) = self.tx.lock() {
                guard.take();
            }
            return Err(AudioError::Disconnected(err.to_string()));
        }
        Ok(())
    }
}

impl AudioOutput for RodioOutput {
    fn load(&self, location: &Path, load_id: u64) -> Result<(), AudioError> {
        self.send(AudioCommand::Load {
            path: location.to_path_buf(),
            load_id,
        })
    }

    fn play(&self) -> Result<(), AudioError> {
        self.send(AudioCommand::Play)
    }

    fn pause(&self) -> Result<(), AudioError> {
        self.send(AudioCommand::Pause)
    }

    fn stop(&self) -> Result<(), AudioError> {
        self.send(AudioCommand::Stop)
    }

    fn set_volume(&self, volume: f32) -> Result<(), AudioError> {
        self.send(AudioCommand::SetVolume(volume))
    }

    fn release(&self) -> Result<(), AudioError> {
        if self.released.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let tx = self
            .tx
            .lock()
            .map_err(|e| AudioError::Disconnected(e.to_string()))?
            .take();
        if let Some(tx) = tx {
            let _ = tx.send(AudioCommand::Release);
        }
        Ok(())
    }
}

struct Playback {
    sink: Sink,
    load_id: u64,
}

struct OutputThread {
    events: mpsc::UnboundedSender<OutputEvent>,
    device: Option<(OutputStream, OutputStreamHandle)>,
    current: Option<Playback>,
    volume: f32,
    playing: bool,
}

impl OutputThread {
    fn new(events: mpsc::UnboundedSender<OutputEvent>) -> Self {
        Self {
            events,
            device: None,
            current: None,
            volume: 1.0,
            playing: false,
        }
    }

    fn run(mut self, rx: std_mpsc::Receiver<AudioCommand>) {
        loop {
            match rx.recv_timeout(END_POLL_INTERVAL) {
                Ok(AudioCommand::Release) | Err(RecvTimeoutError::Disconnected) => break,
                Ok(command) => self.handle(command),
                Err(RecvTimeoutError::Timeout) => {}
            }
            self.check_finished();
        }

        self.unload();
        self.device = None;
        log_info!("audio output released");
    }

    fn handle(&mut self, command: AudioCommand) {
        match command {
            AudioCommand::Load { path, load_id } => self.load(&path, load_id),
            AudioCommand::Play => match self.current.as_ref() {
                Some(playback) => {
                    playback.sink.play();
                    self.playing = true;
                }
                None => self.report(None, "no track loaded".into()),
            },
            AudioCommand::Pause => {
                if let Some(playback) = self.current.as_ref() {
                    playback.sink.pause();
                }
                self.playing = false;
            }
            AudioCommand::Stop => self.unload(),
            AudioCommand::SetVolume(volume) => {
                self.volume = volume.clamp(0.0, 1.0);
                if let Some(playback) = self.current.as_ref() {
                    playback.sink.set_volume(self.volume);
                }
            }
            AudioCommand::Release => {}
        }
    }

    fn load(&mut self, path: &Path, load_id: u64) {
        self.unload();
        match self.open(path) {
            Ok(sink) => {
                log_debug!("loaded {} (load {load_id})", path.display());
                self.current = Some(Playback { sink, load_id });
            }
            Err(err) => self.report(Some(load_id), err.to_string()),
        }
    }

    fn open(&mut self, path: &Path) -> Result<Sink, AudioError> {
        let decode_error = |reason: String| AudioError::Decode {
            path: path.display().to_string(),
            reason,
        };
        let file = File::open(path).map_err(|e| decode_error(e.to_string()))?;
        let source = Decoder::new(BufReader::new(file)).map_err(|e| decode_error(e.to_string()))?;

        let handle = match self.device.as_ref() {
            Some((_, handle)) => handle.clone(),
            None => {
                let (stream, handle) = OutputStream::try_default()
                    .map_err(|e| AudioError::Output(format!("failed to open audio device: {e}")))?;
                self.device = Some((stream, handle.clone()));
                handle
            }
        };

        let sink = match Sink::try_new(&handle) {
            Ok(sink) => sink,
            Err(err) => {
                // the device may have gone away; reopen it on the next attempt
                self.device = None;
                return Err(AudioError::Output(format!("failed to create audio sink: {err}")));
            }
        };
        sink.pause();
        sink.set_volume(self.volume);
        sink.append(source);
        Ok(sink)
    }

    fn unload(&mut self) {
        if let Some(playback) = self.current.take() {
            playback.sink.stop();
        }
        self.playing = false;
    }

    fn check_finished(&mut self) {
        if !self.playing {
            return;
        }
        let finished = self
            .current
            .as_ref()
            .filter(|playback| playback.sink.empty())
            .map(|playback| playback.load_id);

        if let Some(load_id) = finished {
            self.current = None;
            self.playing = false;
            let _ = self.events.send(OutputEvent::Finished { load_id });
        }
    }

    fn report(&self, load_id: Option<u64>, reason: String) {
        log_warn!("audio output: {reason}");
        let _ = self.events.send(OutputEvent::Failed { load_id, reason });
    }
}
