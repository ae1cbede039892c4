//! Requests: one unit of work moving through the pipeline.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use crate::dict::DO_NOT_RESPOND_CODE;
use crate::dispatch::Stage;
use crate::protocol::{Frame, Packet};

/// Externally observed request state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Created, nothing has run.
    Init,
    /// The receive stage is running.
    Received,
    /// The sub-type stage is running.
    Processing,
    /// The send stage is running.
    Sending,
    Done,
    Failed,
}

impl State {
    /// `Done` or `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, State::Done | State::Failed)
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            State::Init => "init",
            State::Received => "received",
            State::Processing => "processing",
            State::Sending => "sending",
            State::Done => "done",
            State::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Saved continuation of a suspended stage.
#[derive(Debug, Clone)]
pub struct Suspension {
    stage: Arc<Stage>,
    since: Instant,
}

impl Suspension {
    pub(crate) fn new(stage: Arc<Stage>) -> Self {
        Self {
            stage,
            since: Instant::now(),
        }
    }

    /// The stage that yielded.
    pub fn stage(&self) -> &Arc<Stage> {
        &self.stage
    }

    /// When the stage yielded.
    pub fn since(&self) -> Instant {
        self.since
    }
}

/// One request.
///
/// Owns the inbound frame and packet, the reply being built, and the
/// pipeline's saved position. `process` takes `&mut Request`, so one request
/// can never be advanced twice at the same time.
#[derive(Debug)]
pub struct Request {
    number: u64,
    frame: Option<Frame>,
    received: Instant,
    packet: Packet,
    reply: Packet,
    pub(crate) state: State,
    /// Stage belonging to the current state.
    pub(crate) stage: Option<Arc<Stage>>,
    pub(crate) suspension: Option<Suspension>,
    stop: bool,
}

impl Request {
    /// Create a request from a decoded packet.
    ///
    /// The reply starts out as "do not respond" with the packet's id.
    pub fn new(number: u64, packet: Packet) -> Self {
        let reply = Packet::new(DO_NOT_RESPOND_CODE, packet.id);
        Self {
            number,
            frame: None,
            received: Instant::now(),
            packet,
            reply,
            state: State::Init,
            stage: None,
            suspension: None,
            stop: false,
        }
    }

    /// Create a request owning the frame it was decoded from.
    pub fn from_frame(number: u64, frame: Frame, packet: Packet) -> Self {
        let received = frame.received();
        let mut request = Self::new(number, packet);
        request.received = received;
        request.frame = Some(frame);
        request
    }

    /// Listener-local sequence number.
    #[inline]
    pub fn number(&self) -> u64 {
        self.number
    }

    /// Protocol correlation id.
    #[inline]
    pub fn id(&self) -> u32 {
        self.packet.id
    }

    #[inline]
    pub fn state(&self) -> State {
        self.state
    }

    /// Receive timestamp (of the frame, when there is one).
    #[inline]
    pub fn received(&self) -> Instant {
        self.received
    }

    pub fn frame(&self) -> Option<&Frame> {
        self.frame.as_ref()
    }

    /// Inbound packet.
    pub fn packet(&self) -> &Packet {
        &self.packet
    }

    /// Reply being built.
    pub fn reply(&self) -> &Packet {
        &self.reply
    }

    pub fn reply_mut(&mut self) -> &mut Packet {
        &mut self.reply
    }

    /// Stage the current state is running, if any.
    pub fn current_stage(&self) -> Option<&Stage> {
        self.stage.as_deref()
    }

    /// Suspension token, present only while a stage has yielded.
    pub fn suspension(&self) -> Option<&Suspension> {
        self.suspension.as_ref()
    }

    #[inline]
    pub fn is_suspended(&self) -> bool {
        self.suspension.is_some()
    }

    /// Stop processing: the next time control returns to the pipeline the
    /// request ends as done, without a reply.
    pub fn stop_processing(&mut self) {
        self.stop = true;
    }

    #[inline]
    pub fn is_stopped(&self) -> bool {
        self.stop
    }

    pub(crate) fn enter(&mut self, state: State, stage: Arc<Stage>) {
        self.state = state;
        self.stage = Some(stage);
        self.suspension = None;
    }

    pub(crate) fn terminate(&mut self, state: State) {
        self.state = state;
        self.stage = None;
        self.suspension = None;
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    #[test]
    fn test_new_request_defaults() {
        let request = Request::new(7, Packet::new(4, 99));

        assert_eq!(request.number(), 7);
        assert_eq!(request.id(), 99);
        assert_eq!(request.state(), State::Init);
        assert_eq!(request.reply().code, DO_NOT_RESPOND_CODE);
        assert_eq!(request.reply().id, 99);
        assert!(!request.is_suspended());
        assert!(!request.is_stopped());
        assert!(request.frame().is_none());
        assert!(request.current_stage().is_none());
    }

    #[test]
    fn test_from_frame_keeps_receive_time() {
        let frame = Frame::new(Bytes::from_static(&[0u8; 28]));
        let received = frame.received();
        let request = Request::from_frame(1, frame, Packet::new(1, 0));

        assert_eq!(request.received(), received);
        assert_eq!(request.frame().unwrap().len(), 28);
    }

    #[test]
    fn test_enter_clears_suspension() {
        let mut request = Request::new(1, Packet::new(4, 0));
        let stage = Arc::new(Stage::new(1, "recv", "Accounting-Request"));
        request.suspension = Some(Suspension::new(stage.clone()));

        request.enter(State::Processing, stage);
        assert!(!request.is_suspended());
        assert_eq!(request.state(), State::Processing);

        request.terminate(State::Done);
        assert!(request.state().is_terminal());
        assert!(request.current_stage().is_none());
    }
}
