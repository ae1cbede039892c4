//! The staged request state machine.
//!
//! ```text
//! INIT ──run──▶ RECEIVED ──recv ok──▶ PROCESSING ──sub-type ok──▶ SENDING ──▶ DONE
//!                  │                      │                          │
//!                  └──── fail ────────────┴──────────▶ FAILED        └─ fail: do-not-respond
//! ```
//!
//! One call to [`Pipeline::process`] advances as far as it can. A stage that
//! yields leaves the request at its current state with a suspension token;
//! the next call resumes exactly that stage and nothing before it.

use std::sync::Arc;
use std::time::SystemTime;

use super::outcome::{Action, Control, Final, Outcome, Signal};
use super::request::{Request, State, Suspension};
use crate::dict::{Dictionary, Value};
use crate::dispatch::{DispatchTable, Interpreter, Profile, StageLookup};
use crate::error::Result;
use crate::protocol::Packet;

/// Result of running or resuming the current stage.
enum Step {
    Continue,
    Yield,
    Stop,
    Abort(Outcome),
}

/// Request pipeline for one profile on one virtual server.
///
/// Cheap to share: the table and interpreter are behind `Arc`s and nothing
/// here is mutated after construction.
pub struct Pipeline {
    table: Arc<DispatchTable>,
    interpreter: Arc<dyn Interpreter>,
}

impl Pipeline {
    /// Create a pipeline from a compiled table.
    pub fn new(table: Arc<DispatchTable>, interpreter: Arc<dyn Interpreter>) -> Self {
        Self { table, interpreter }
    }

    /// Compile `profile` against `server` and use `server` as the interpreter.
    ///
    /// Fails if the dictionary lacks something the profile needs or the
    /// mandatory receive stage is not configured.
    pub fn compile<S>(server: Arc<S>, profile: &Profile, dict: Arc<Dictionary>) -> Result<Self>
    where
        S: StageLookup + Interpreter + 'static,
    {
        let table = DispatchTable::compile(server.as_ref(), profile, dict)?;
        Ok(Self::new(Arc::new(table), server))
    }

    pub fn table(&self) -> &Arc<DispatchTable> {
        &self.table
    }

    /// Whether this pipeline processes packets with this code.
    pub fn accepts(&self, packet: &Packet) -> bool {
        packet.code == self.table.profile().request_code
    }

    /// Advance `request` as far as possible.
    pub fn process(&self, request: &mut Request, action: Action) -> Final {
        if let Action::Signal(signal) = action {
            self.deliver(request, signal);
            return Final::Done;
        }

        loop {
            match request.state {
                State::Init => {
                    tracing::debug!(
                        "({}) Received {} ID {}",
                        request.number(),
                        self.code_name(request.packet().code),
                        request.id()
                    );
                    let stage = self.table.receive().clone();
                    tracing::debug!("({}) Running '{}'", request.number(), stage);
                    request.enter(State::Received, stage);
                }

                State::Received => {
                    match self.execute(request) {
                        Step::Continue => {}
                        Step::Yield => return Final::Yield,
                        Step::Stop => return self.stopped(request),
                        Step::Abort(outcome) => return self.fail(request, outcome),
                    }

                    request.reply_mut().code = self.table.profile().reply_code;

                    match self.table.subtype_stage(&request.packet().pairs) {
                        Some(stage) => {
                            tracing::debug!("({}) Running '{}'", request.number(), stage);
                            request.enter(State::Processing, stage);
                        }
                        None => {
                            if let Some(done) = self.setup_send(request) {
                                return done;
                            }
                        }
                    }
                }

                State::Processing => {
                    match self.execute(request) {
                        Step::Continue => {}
                        Step::Yield => return Final::Yield,
                        Step::Stop => return self.stopped(request),
                        Step::Abort(outcome) => return self.fail(request, outcome),
                    }

                    if let Some(done) = self.setup_send(request) {
                        return done;
                    }
                }

                State::Sending => {
                    match self.execute(request) {
                        Step::Continue => {}
                        Step::Yield => return Final::Yield,
                        Step::Stop => return self.stopped(request),
                        Step::Abort(outcome) => {
                            tracing::debug!(
                                "({}) Send stage returned {}, not responding",
                                request.number(),
                                outcome
                            );
                            request.reply_mut().code = self.table.profile().do_not_respond;
                        }
                    }

                    return self.finish(request);
                }

                State::Done | State::Failed => {
                    tracing::warn!(
                        "({}) Request is already {}, refusing to process it again",
                        request.number(),
                        request.state
                    );
                    return Final::Fail;
                }
            }
        }
    }

    /// Run or resume the current stage and map its outcome.
    fn execute(&self, request: &mut Request) -> Step {
        let Some(stage) = request.stage.clone() else {
            return Step::Abort(Outcome::Fail);
        };

        let outcome = match request.suspension.take() {
            Some(token) => {
                tracing::trace!(
                    "({}) Resuming '{}' after {:?}",
                    request.number(),
                    token.stage(),
                    token.since().elapsed()
                );
                self.interpreter.resume(token.stage(), request)
            }
            None => self.interpreter.run(&stage, request),
        };

        // Stop wins over whatever the stage said.
        if request.is_stopped() {
            return Step::Stop;
        }

        match outcome.control() {
            Control::Continue => Step::Continue,
            Control::Suspend => {
                tracing::trace!("({}) '{}' yielded", request.number(), stage);
                request.suspension = Some(Suspension::new(stage));
                Step::Yield
            }
            Control::Abort => Step::Abort(outcome),
        }
    }

    /// Apply any reply code override and pick the send stage.
    ///
    /// Returns the final disposition when there is no send stage to run.
    fn setup_send(&self, request: &mut Request) -> Option<Final> {
        let packet_type = self.table.profile().packet_type;
        if let Some(code) = request.reply().pairs.find(packet_type).and_then(Value::as_u32) {
            request.reply_mut().code = code;
        }

        match self.table.send_stage(request.reply().code) {
            Some(stage) => {
                tracing::debug!("({}) Running '{}'", request.number(), stage);
                request.enter(State::Sending, stage);
                None
            }
            None => Some(self.finish(request)),
        }
    }

    fn finish(&self, request: &mut Request) -> Final {
        request.reply_mut().timestamp = Some(SystemTime::now());
        request.terminate(State::Done);

        if request.reply().code == self.table.profile().do_not_respond {
            tracing::debug!("({}) Not sending reply to client.", request.number());
            return Final::Done;
        }

        tracing::debug!(
            "({}) Sending {} ID {}",
            request.number(),
            self.code_name(request.reply().code),
            request.reply().id
        );
        Final::Reply
    }

    fn fail(&self, request: &mut Request, outcome: Outcome) -> Final {
        tracing::debug!(
            "({}) '{}' returned {}, aborting",
            request.number(),
            request
                .current_stage()
                .map(|s| s.to_string())
                .unwrap_or_default(),
            outcome
        );
        request.terminate(State::Failed);
        Final::Fail
    }

    fn stopped(&self, request: &mut Request) -> Final {
        tracing::debug!("({}) Stopped processing", request.number());
        request.terminate(State::Done);
        Final::Done
    }

    fn deliver(&self, request: &mut Request, signal: Signal) {
        match request.suspension.take() {
            Some(token) => {
                tracing::debug!(
                    "({}) Signalling {:?} to '{}'",
                    request.number(),
                    signal,
                    token.stage()
                );
                self.interpreter.signal(token.stage(), request, signal);
            }
            None => {
                tracing::trace!(
                    "({}) {:?} with no suspended stage",
                    request.number(),
                    signal
                );
            }
        }
        request.terminate(State::Done);
    }

    fn code_name(&self, code: u32) -> String {
        self.table
            .code_name(code)
            .map(str::to_string)
            .unwrap_or_else(|| code.to_string())
    }
}
