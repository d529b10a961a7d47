//! Event tracking adapters.

mod logging_tracker;

pub use logging_tracker::{LoggingEventTracker, RecordingEventTracker, TrackedEvent};
