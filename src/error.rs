//! Error types for the countdown engine, the playlist and the audio output.

use thiserror::Error;

use crate::timer::{TimerStatus, MAX_MINUTES, MIN_MINUTES};

/// Rejected timer operations. None of these mutate the session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimerError {
    #[error("cannot {op} while the timer is {status:?}")]
    InvalidState {
        op: &'static str,
        status: TimerStatus,
    },

    #[error("duration must be between {MIN_MINUTES} and {MAX_MINUTES} minutes, got {0}")]
    InvalidDuration(u32),
}

/// Failures talking to the audio output. Never fatal to a session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AudioError {
    #[error("audio thread unavailable: {0}")]
    Disconnected(String),

    #[error("audio output error: {0}")]
    Output(String),

    #[error("failed to decode {path}: {reason}")]
    Decode { path: String, reason: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryError {
    #[error("track discovery was cancelled before it settled")]
    Cancelled,
}
