pub mod controller;
pub mod state;

pub use controller::{SessionSummary, TimerController, TimerEvent, TimerSnapshot};
pub use state::{
    format_clock, TickOutcome, TimerState, TimerStatus, DEFAULT_MINUTES, MAX_MINUTES, MIN_MINUTES,
};
