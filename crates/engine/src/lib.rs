pub mod controller;
pub mod error;
pub mod listener;
pub mod threshold;
pub mod timer;

pub use controller::{Controller, ControllerOptions, ControllerStatus};
pub use error::ControllerError;
pub use listener::{ControllerListener, LogListener};
pub use threshold::{replay_target, scrobble_threshold};
pub use timer::{IntervalTimer, TimerState};
