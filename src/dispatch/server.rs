//! Virtual server: a named scope of stages and their handlers.
//!
//! The server maps `(category, name)` pairs to stages and stage IDs to
//! handlers. IDs are assigned sequentially starting from 1.
//!
//! # Example
//!
//! ```
//! use wirestage::dispatch::{StageLookup, StageName, VirtualServer};
//! use wirestage::pipeline::Outcome;
//!
//! let mut server = VirtualServer::new("default");
//!
//! server.register("recv", "Accounting-Request", |_request| Outcome::Ok);
//! server.register("Acct-Status-Type", "Stop", |_request| Outcome::Updated);
//!
//! let stage = server.find_stage("recv", StageName::Named("Accounting-Request"));
//! assert_eq!(stage.unwrap().id(), 1);
//! ```

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use super::stage::{Interpreter, Stage, StageLookup, StageName, ANY};
use super::table::{RECV, SEND};
use crate::pipeline::{Outcome, Request, Signal};

/// Business logic behind one stage.
///
/// Only `run` is required. A handler that returns [`Outcome::Yield`] is
/// re-entered through `resume` once the listener is told to resume the
/// request; the default `resume` simply runs the stage again.
pub trait StageHandler: Send + Sync + 'static {
    /// Execute the stage.
    fn run(&self, request: &mut Request) -> Outcome;

    /// Continue after a yield.
    fn resume(&self, request: &mut Request) -> Outcome {
        self.run(request)
    }

    /// A cancel/timeout/duplicate signal arrived while suspended.
    fn signal(&self, _request: &mut Request, _signal: Signal) {}
}

/// Wrapper turning a closure into a [`StageHandler`].
pub struct FnHandler<F>
where
    F: Fn(&mut Request) -> Outcome + Send + Sync + 'static,
{
    handler: F,
    _phantom: PhantomData<fn(&mut Request) -> Outcome>,
}

impl<F> FnHandler<F>
where
    F: Fn(&mut Request) -> Outcome + Send + Sync + 'static,
{
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _phantom: PhantomData,
        }
    }
}

impl<F> StageHandler for FnHandler<F>
where
    F: Fn(&mut Request) -> Outcome + Send + Sync + 'static,
{
    fn run(&self, request: &mut Request) -> Outcome {
        (self.handler)(request)
    }
}

/// Entry for a registered stage.
struct StageEntry {
    stage: Arc<Stage>,
    /// `None` for a declared but empty section.
    handler: Option<Box<dyn StageHandler>>,
    /// What an empty section returns.
    default: Outcome,
}

/// Outcome of an empty section in `category`.
///
/// Receive and send sections fall through with `Noop`. Anything else is a
/// sub-type section, where an empty body means the sub-type was not handled.
pub fn section_default(category: &str) -> Outcome {
    match category {
        RECV | SEND => Outcome::Noop,
        _ => Outcome::NotFound,
    }
}

/// A virtual server: stage scope plus interpreter for its stages.
pub struct VirtualServer {
    name: String,
    /// Entries by `(category, name)`.
    stages: HashMap<(String, String), StageEntry>,
    /// Stage ID to key mapping (for execution).
    id_to_key: HashMap<u32, (String, String)>,
    next_stage_id: u32,
}

impl VirtualServer {
    /// Create an empty server.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            stages: HashMap::new(),
            id_to_key: HashMap::new(),
            next_stage_id: 1,
        }
    }

    /// Register a closure as the stage `category name`.
    ///
    /// Use [`ANY`] as the name for the category's wildcard stage.
    /// Registering the same pair again replaces the previous stage.
    pub fn register<F>(&mut self, category: &str, name: &str, handler: F) -> Arc<Stage>
    where
        F: Fn(&mut Request) -> Outcome + Send + Sync + 'static,
    {
        self.insert(
            category,
            name,
            Some(Box::new(FnHandler::new(handler))),
            section_default(category),
        )
    }

    /// Register a handler object as the stage `category name`.
    pub fn register_handler<H: StageHandler>(
        &mut self,
        category: &str,
        name: &str,
        handler: H,
    ) -> Arc<Stage> {
        self.insert(category, name, Some(Box::new(handler)), section_default(category))
    }

    /// Declare an empty stage. Running it returns the
    /// [`section_default`] of its category.
    pub fn declare(&mut self, category: &str, name: &str) -> Arc<Stage> {
        self.insert(category, name, None, section_default(category))
    }

    /// Declare an empty stage returning `default` when run.
    pub fn declare_with_default(
        &mut self,
        category: &str,
        name: &str,
        default: Outcome,
    ) -> Arc<Stage> {
        self.insert(category, name, None, default)
    }

    /// Number of configured stages.
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    fn insert(
        &mut self,
        category: &str,
        name: &str,
        handler: Option<Box<dyn StageHandler>>,
        default: Outcome,
    ) -> Arc<Stage> {
        let id = self.next_stage_id;
        self.next_stage_id += 1;

        let key = (category.to_string(), name.to_string());
        let stage = Arc::new(Stage::new(id, category, name));

        if let Some(old) = self.stages.insert(
            key.clone(),
            StageEntry {
                stage: stage.clone(),
                handler,
                default,
            },
        ) {
            self.id_to_key.remove(&old.stage.id());
        }
        self.id_to_key.insert(id, key);
        stage
    }

    fn entry(&self, stage: &Stage) -> Option<&StageEntry> {
        self.id_to_key
            .get(&stage.id())
            .and_then(|key| self.stages.get(key))
    }
}

impl StageLookup for VirtualServer {
    fn scope(&self) -> &str {
        &self.name
    }

    fn find_stage(&self, category: &str, name: StageName<'_>) -> Option<Arc<Stage>> {
        let name = match name {
            StageName::Named(name) => name,
            StageName::Any => ANY,
        };
        self.stages
            .get(&(category.to_string(), name.to_string()))
            .map(|e| e.stage.clone())
    }
}

impl Interpreter for VirtualServer {
    fn run(&self, stage: &Stage, request: &mut Request) -> Outcome {
        match self.entry(stage) {
            Some(StageEntry {
                handler: Some(handler),
                ..
            }) => handler.run(request),
            Some(entry) => entry.default,
            None => {
                tracing::warn!("Stage '{}' is not part of server {}", stage, self.name);
                Outcome::Fail
            }
        }
    }

    fn resume(&self, stage: &Stage, request: &mut Request) -> Outcome {
        match self.entry(stage) {
            Some(StageEntry {
                handler: Some(handler),
                ..
            }) => handler.resume(request),
            Some(entry) => entry.default,
            None => {
                tracing::warn!("Stage '{}' is not part of server {}", stage, self.name);
                Outcome::Fail
            }
        }
    }

    fn signal(&self, stage: &Stage, request: &mut Request, signal: Signal) {
        if let Some(StageEntry {
            handler: Some(handler),
            ..
        }) = self.entry(stage)
        {
            handler.signal(request, signal);
        }
    }
}
