//! Stages and the two seams to the rule interpreter.
//!
//! The front end never executes business logic itself. It finds stages
//! through a [`StageLookup`] (the compiled virtual server) and sequences
//! calls into an [`Interpreter`].

use std::fmt;

use crate::pipeline::{Outcome, Request, Signal};

/// Name used to register a wildcard stage.
pub const ANY: &str = "*";

/// A named, externally executed unit of business logic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    id: u32,
    category: String,
    name: String,
}

impl Stage {
    /// Create a stage handle.
    pub fn new(id: u32, category: &str, name: &str) -> Self {
        Self {
            id,
            category: category.to_string(),
            name: name.to_string(),
        }
    }

    /// Identifier assigned by the owning scope.
    #[inline]
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Category, e.g. `recv`, `send` or a sub-type attribute name.
    #[inline]
    pub fn category(&self) -> &str {
        &self.category
    }

    /// Name inside the category, e.g. `Accounting-Request` or `Stop`.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this stage was registered as the category wildcard.
    #[inline]
    pub fn is_wildcard(&self) -> bool {
        self.name == ANY
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.category, self.name)
    }
}

/// Stage name in a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageName<'a> {
    /// Literal stage name.
    Named(&'a str),
    /// The category's wildcard stage.
    Any,
}

/// Stage lookup on one virtual server scope.
pub trait StageLookup: Send + Sync {
    /// Name of the scope, for logs.
    fn scope(&self) -> &str;

    /// Find the stage configured for `category` and `name`.
    fn find_stage(&self, category: &str, name: StageName<'_>) -> Option<std::sync::Arc<Stage>>;
}

/// Stage execution.
///
/// `run` starts a stage, `resume` re-enters a stage that returned
/// [`Outcome::Yield`], `signal` forwards cancellation to a suspended stage.
pub trait Interpreter: Send + Sync {
    fn run(&self, stage: &Stage, request: &mut Request) -> Outcome;

    fn resume(&self, stage: &Stage, request: &mut Request) -> Outcome;

    fn signal(&self, stage: &Stage, request: &mut Request, signal: Signal);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_accessors() {
        let stage = Stage::new(3, "recv", "Accounting-Request");

        assert_eq!(stage.id(), 3);
        assert_eq!(stage.category(), "recv");
        assert_eq!(stage.name(), "Accounting-Request");
        assert_eq!(stage.to_string(), "recv Accounting-Request");
        assert!(!stage.is_wildcard());
        assert!(Stage::new(4, "Acct-Status-Type", ANY).is_wildcard());
    }
}
