//! Stage outcomes, pipeline actions and final dispositions.

use std::fmt;

/// Result code a stage reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// Nothing was done.
    Noop,
    Ok,
    /// Attributes were changed.
    Updated,
    /// The stage produced the answer itself.
    Handled,
    /// Suspend; re-enter this stage later.
    Yield,
    Fail,
    /// The request is malformed.
    Invalid,
    NotFound,
    Reject,
    /// The subject is locked out.
    Locked,
}

/// What the pipeline does after a stage outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Continue,
    Suspend,
    Abort,
}

impl Outcome {
    /// Map the outcome onto pipeline control flow.
    pub fn control(self) -> Control {
        match self {
            Outcome::Noop | Outcome::Ok | Outcome::Updated | Outcome::Handled => Control::Continue,
            Outcome::Yield => Control::Suspend,
            Outcome::Fail
            | Outcome::Invalid
            | Outcome::NotFound
            | Outcome::Reject
            | Outcome::Locked => Control::Abort,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Noop => "noop",
            Outcome::Ok => "ok",
            Outcome::Updated => "updated",
            Outcome::Handled => "handled",
            Outcome::Yield => "yield",
            Outcome::Fail => "fail",
            Outcome::Invalid => "invalid",
            Outcome::NotFound => "notfound",
            Outcome::Reject => "reject",
            Outcome::Locked => "locked",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Signal forwarded to a suspended stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Cancel,
    Timeout,
    /// A retransmission of the same request arrived.
    Duplicate,
}

/// Why the pipeline is being invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Start or resume processing.
    Run,
    /// Deliver a signal and stop.
    Signal(Signal),
}

/// What one `process` invocation ended with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Final {
    /// The reply is ready to be encoded and written.
    Reply,
    /// Finished without a reply (do-not-respond, stop, or signal).
    Done,
    /// A stage suspended; invoke again with `Action::Run` to resume.
    Yield,
    /// Processing aborted; no reply.
    Fail,
}
