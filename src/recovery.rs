//! Error recovery policy.
//!
//! Every fallible call site inside the lexer, parser, xref resolver, filter
//! pipeline and semantic lift consults a `RecoveryPolicy` before giving up.
//! The policy sees what went wrong and where, and answers with an action:
//! fail the operation, skip the entity, patch it in place, or warn and
//! substitute an `Unknown`/empty value.
//!
//! Each component has exactly one canonical consultation site; the sites
//! are listed in DESIGN.md.

use std::sync::Mutex;

use crate::error::Error;
use crate::object::ObjectRef;

/// What a policy tells the caller to do about a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Abort the operation with the reported error
    Fail,
    /// Drop the faulty entity and continue without it
    Skip,
    /// Apply a recoverable in-place patch (e.g. a recomputed /Length)
    Fix,
    /// Record the fault, substitute Unknown/empty, and continue
    Warn,
}

/// Where a fault happened.
#[derive(Debug, Clone)]
pub struct FaultSite {
    /// Byte offset in the source, when known
    pub offset: Option<usize>,
    /// Object being processed, when known
    pub object: Option<ObjectRef>,
    /// Component reporting the fault ("lexer", "xref", "lift", ...)
    pub component: &'static str,
}

impl FaultSite {
    /// A site identified only by component.
    pub fn component(component: &'static str) -> Self {
        Self {
            offset: None,
            object: None,
            component,
        }
    }

    /// Attach a byte offset.
    pub fn at_offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Attach the object being processed.
    pub fn in_object(mut self, object: ObjectRef) -> Self {
        self.object = Some(object);
        self
    }
}

/// Strategy consulted at fallible call sites.
///
/// Implementations must be `Send + Sync`: the streaming emitter runs the
/// parse on a producer thread.
pub trait RecoveryPolicy: Send + Sync {
    /// Decide what to do about `error` raised at `site`.
    fn on_error(&self, error: &Error, site: &FaultSite) -> Action;

    /// Errors accumulated so far by a recording policy. Strict policies
    /// return an empty list.
    fn warnings(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Always fails. Use for validating compliance or parsing trusted files.
#[derive(Debug, Default)]
pub struct StrictPolicy;

impl RecoveryPolicy for StrictPolicy {
    fn on_error(&self, _error: &Error, _site: &FaultSite) -> Action {
        Action::Fail
    }
}

/// Warns and continues, recording every fault for the caller to inspect.
///
/// Use for parsing potentially malformed files from untrusted sources.
#[derive(Debug, Default)]
pub struct LenientPolicy {
    recorded: Mutex<Vec<String>>,
}

impl LenientPolicy {
    /// Create a lenient policy with an empty warning list.
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecoveryPolicy for LenientPolicy {
    fn on_error(&self, error: &Error, site: &FaultSite) -> Action {
        let message = match (site.offset, site.object) {
            (Some(off), Some(obj)) => {
                format!("[{}] at byte {} in {} {} R: {}", site.component, off, obj.id, obj.gen, error)
            },
            (Some(off), None) => format!("[{}] at byte {}: {}", site.component, off, error),
            (None, Some(obj)) => {
                format!("[{}] in {} {} R: {}", site.component, obj.id, obj.gen, error)
            },
            (None, None) => format!("[{}] {}", site.component, error),
        };
        log::warn!("{}", message);
        self.recorded.lock().unwrap().push(message);
        Action::Warn
    }

    fn warnings(&self) -> Vec<String> {
        self.recorded.lock().unwrap().clone()
    }
}
