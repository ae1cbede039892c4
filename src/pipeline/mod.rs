//! Pipeline module - requests and the staged, suspendable state machine.
//!
//! Provides:
//! - [`Request`] - one unit of work, its reply and its saved position
//! - [`Outcome`] - the closed set of stage results
//! - [`Pipeline`] - drives a request through receive, sub-type and send stages

mod outcome;
mod process;
mod request;

pub use outcome::{Action, Control, Final, Outcome, Signal};
pub use process::Pipeline;
pub use request::{Request, State, Suspension};
