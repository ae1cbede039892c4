//! Dispatch module - stage lookup, stage execution and the dispatch table.
//!
//! Provides:
//! - [`StageLookup`] / [`Interpreter`] - the seams to the rule interpreter
//! - [`VirtualServer`] - a stage scope with closure or object handlers
//! - [`Profile`] - which request, reply and sub-type a listener handles
//! - [`DispatchTable`] - stages compiled for one profile at bootstrap

mod profile;
mod server;
mod stage;
mod table;

pub use profile::{Profile, ResolvedProfile};
pub use server::{section_default, FnHandler, StageHandler, VirtualServer};
pub use stage::{Interpreter, Stage, StageLookup, StageName, ANY};
pub use table::{DispatchTable, RECV, SEND};
