pub mod rodio_output;

use std::path::Path;

use crate::error::AudioError;

pub use rodio_output::RodioOutput;

/// Notices coming back from the output, tagged with the load they belong to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputEvent {
    /// The loaded track played through to its natural end.
    Finished { load_id: u64 },
    /// Playback could not begin or stopped abnormally.
    Failed { load_id: Option<u64>, reason: String },
}

/// The single audio output handle. Every call is fire-and-forget: an `Ok`
/// only means the command was accepted, outcomes arrive as `OutputEvent`s.
pub trait AudioOutput: Send + Sync {
    /// Replaces the current source with `location`, paused at its start.
    fn load(&self, location: &Path, load_id: u64) -> Result<(), AudioError>;
    fn play(&self) -> Result<(), AudioError>;
    /// Pauses, keeping the position.
    fn pause(&self) -> Result<(), AudioError>;
    /// Drops the current source; the next load starts from the beginning.
    fn stop(&self) -> Result<(), AudioError>;
    fn set_volume(&self, volume: f32) -> Result<(), AudioError>;
    /// Stops playback and closes the device. No further calls succeed.
    fn release(&self) -> Result<(), AudioError>;
}
