//! Target runtime abstraction
//!
//! An [`Engine`] hands out disposable [`ExecutionContext`]s. A context runs
//! exactly one fixture and is dropped right after; nothing it did may be
//! visible to the next context. Engines decide how that isolation is
//! achieved: [`ProcessEngine`] starts a fresh host process per context.

pub mod process;

pub use process::ProcessEngine;

use crate::error::Result;
use crate::fixture::TestDescriptor;
use crate::harness::{Completion, HarnessApi, Signal};
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Everything a context needs to run one fixture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptUnit {
    pub id: String,
    /// Root-relative fixture path, for host diagnostics
    pub source_name: PathBuf,
    /// Expression evaluated before the body; falsy skips the body
    pub precondition: Option<String>,
    pub body: String,
    pub strict: bool,
}

impl From<&TestDescriptor> for ScriptUnit {
    fn from(descriptor: &TestDescriptor) -> Self {
        Self {
            id: descriptor.id.clone(),
            source_name: descriptor.path.clone(),
            precondition: descriptor.precondition().map(str::to_string),
            body: descriptor.body().to_string(),
            strict: descriptor.is_strict(),
        }
    }
}

/// Forcibly stops a running context from another thread.
///
/// Firing is idempotent. The executor fires the handle on timeout and on
/// run cancellation.
#[derive(Clone)]
pub struct InterruptHandle {
    fired: Arc<AtomicBool>,
    on_interrupt: Arc<dyn Fn() + Send + Sync>,
}

impl InterruptHandle {
    /// A handle that only raises a flag the context polls
    pub fn flag() -> Self {
        Self::new(|| {})
    }

    /// A handle that also runs `on_interrupt` (e.g. killing a child process)
    pub fn new(on_interrupt: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            fired: Arc::new(AtomicBool::new(false)),
            on_interrupt: Arc::new(on_interrupt),
        }
    }

    pub fn interrupt(&self) {
        if !self.fired.swap(true, Ordering::SeqCst) {
            (self.on_interrupt)();
        }
    }

    pub fn is_interrupted(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for InterruptHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterruptHandle")
            .field("fired", &self.is_interrupted())
            .finish()
    }
}

/// A fresh, isolated sandbox for one fixture
pub trait ExecutionContext: Send {
    /// Handle the executor may fire from another thread
    fn interrupt_handle(&self) -> InterruptHandle;

    /// Evaluate the precondition (if any), then the body.
    ///
    /// The outer `Result` reports harness-level failures (for example the
    /// host could not be started); the inner one carries the fixture's own
    /// non-local exit.
    fn execute(&mut self, unit: &ScriptUnit) -> Result<std::result::Result<Completion, Signal>>;
}

/// The target runtime under test
pub trait Engine: Send + Sync {
    /// Short name used in logs and reports
    fn name(&self) -> &str;

    /// Create a fresh context with the harness capabilities installed.
    ///
    /// Failing here is fatal to the whole run.
    fn create_context(&self, api: &HarnessApi) -> Result<Box<dyn ExecutionContext>>;
}
