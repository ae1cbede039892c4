//! # wirestage
//!
//! Front end for fixed-frame, capture-driven protocols.
//!
//! Frames are pulled from a capture transport, parsed into packets using a
//! protocol dictionary and driven through a staged, suspendable request
//! pipeline: a receive stage, an optional sub-type stage chosen by an
//! attribute value and an optional send stage chosen by the reply code. Any
//! stage may yield; the request is then parked and later resumed exactly
//! where it stopped.
//!
//! ## Architecture
//!
//! - **Transport** ([`transport`]): non-blocking frame source plus reply sink
//! - **Codec** ([`protocol`]): fixed-size frames, link-layer offsets, ARP
//! - **Dispatch** ([`dispatch`]): virtual servers, stage lookup, profiles
//! - **Pipeline** ([`pipeline`]): the request state machine
//! - **Listener** ([`listener`]): the tokio task tying them together
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use wirestage::{
//!     Action, Dictionary, Final, Outcome, Packet, Pipeline, Profile, Request, VirtualServer,
//! };
//!
//! let mut server = VirtualServer::new("default");
//! server.register("recv", "Accounting-Request", |_request| Outcome::Ok);
//!
//! let dict = Arc::new(Dictionary::radius());
//! let pipeline =
//!     Pipeline::compile(Arc::new(server), &Profile::radius_accounting(), dict).unwrap();
//!
//! let mut request = Request::new(1, Packet::new(4, 7));
//! assert_eq!(pipeline.process(&mut request, Action::Run), Final::Reply);
//! assert_eq!(request.reply().code, 5);
//! ```

pub mod config;
pub mod dict;
pub mod dispatch;
pub mod error;
pub mod listener;
pub mod pipeline;
pub mod protocol;
pub mod transport;

pub use config::ListenerConfig;
pub use dict::{AttrId, Dictionary, Pair, PairList, Value, ValueType};
pub use dispatch::{
    DispatchTable, Interpreter, Profile, Stage, StageHandler, StageLookup, StageName,
    VirtualServer,
};
pub use error::{Error, Result};
pub use listener::{Listener, ListenerHandle, RunningListener, StatsSnapshot};
pub use pipeline::{Action, Final, Outcome, Pipeline, Request, Signal, State};
pub use protocol::{ArpCodec, Frame, FrameCodec, Packet};
pub use transport::{FrameSink, FrameSource, MemoryTransport, PcapTransport, Transport};
