//! Isolated executor
//!
//! Runs one descriptor in a fresh context and turns whatever happened into
//! an [`Outcome`]. The context lives on its own thread so that a body that
//! never returns can be abandoned: the executor fires the context's
//! interrupt handle, gives it a grace period to tear down, and moves on.

pub mod outcome;

pub use outcome::{ErrorOrigin, Failure, FailureClass, Outcome, OutcomeKind};

use crate::engine::{Engine, InterruptHandle, ScriptUnit};
use crate::error::{Error, Result};
use crate::fixture::{NegativeExpectation, TestDescriptor};
use crate::harness::{Completion, HarnessApi, Signal};
use crossbeam::channel::{self, Receiver, RecvTimeoutError};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Longest stretch the executor waits without checking for cancellation
const WAIT_SLICE: Duration = Duration::from_millis(10);

type ContextResult = thread::Result<Result<std::result::Result<Completion, Signal>>>;

/// Per-test limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorConfig {
    /// How long a body may run before it is recorded as `Timeout`
    pub timeout: Duration,
    /// How long an interrupted context gets to tear down before it is abandoned
    pub grace_period: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            grace_period: Duration::from_secs(2),
        }
    }
}

/// Run-level abort flag shared by the runner and every executor
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Classify a finished script against the descriptor's polarity.
///
/// Assertion signals fail in both polarities. An uncaught exception passes a
/// negative fixture when it matches the declared error type.
pub fn classify(
    negative: Option<&NegativeExpectation>,
    result: std::result::Result<Completion, Signal>,
) -> Outcome {
    match (result, negative) {
        (Ok(Completion::PreconditionFailed(precondition)), _) => Outcome::Skipped(precondition),
        (Err(Signal::Assertion(assertion)), _) => Outcome::Fail(Failure::Assertion(assertion)),
        (Ok(Completion::Ran), None) => Outcome::Pass,
        (Ok(Completion::Ran), Some(expected)) => Outcome::Fail(Failure::DidNotThrow {
            expected: expected.error_type.clone(),
        }),
        (Err(Signal::Uncaught(exception)), None) => Outcome::uncaught(exception),
        (Err(Signal::Uncaught(exception)), Some(expected)) => {
            if expected.matches(&exception) {
                Outcome::Pass
            } else {
                Outcome::Fail(Failure::WrongException {
                    expected: expected.error_type.clone().unwrap_or_default(),
                    actual: exception,
                })
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Executes descriptors one at a time, each in a fresh context
#[derive(Clone)]
pub struct Executor {
    engine: Arc<dyn Engine>,
    api: HarnessApi,
    config: ExecutorConfig,
}

impl Executor {
    pub fn new(engine: Arc<dyn Engine>, api: HarnessApi, config: ExecutorConfig) -> Self {
        Self { engine, api, config }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn engine_name(&self) -> &str {
        self.engine.name()
    }

    /// Run one descriptor to completion
    pub fn execute(&self, descriptor: &TestDescriptor) -> Result<Outcome> {
        self.execute_with_cancel(descriptor, &CancellationToken::new())
    }

    /// Run one descriptor, giving up with [`Error::Cancelled`] if `cancel` fires.
    ///
    /// Fatal errors (the engine cannot create a context) are returned as `Err`;
    /// everything that goes wrong inside the test becomes an [`Outcome`].
    pub fn execute_with_cancel(&self, descriptor: &TestDescriptor, cancel: &CancellationToken) -> Result<Outcome> {
        let span = tracing::debug_span!("test", id = %descriptor.id);
        let _enter = span.enter();

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let mut context = self.engine.create_context(&self.api).map_err(|e| {
            if e.is_fatal() {
                e
            } else {
                Error::context_creation(e.to_string())
            }
        })?;
        let interrupt = context.interrupt_handle();
        let unit = ScriptUnit::from(descriptor);

        let (tx, rx) = channel::bounded::<ContextResult>(1);
        let worker = thread::Builder::new()
            .name(format!("context-{}", descriptor.index))
            .spawn(move || {
                let result = panic::catch_unwind(AssertUnwindSafe(|| context.execute(&unit)));
                // Teardown happens before the result is published.
                drop(context);
                let _ = tx.send(result);
            })?;

        let deadline = Instant::now() + self.config.timeout;
        loop {
            let now = Instant::now();
            let slice = deadline.saturating_duration_since(now).min(WAIT_SLICE);
            match rx.recv_timeout(slice) {
                Ok(result) => {
                    let _ = worker.join();
                    let outcome = self.finish(descriptor, result)?;
                    tracing::debug!(outcome = %outcome.kind(), "test finished");
                    return Ok(outcome);
                }
                Err(RecvTimeoutError::Disconnected) => {
                    let _ = worker.join();
                    return Ok(Outcome::harness_error("context thread exited without a result"));
                }
                Err(RecvTimeoutError::Timeout) => {
                    if cancel.is_cancelled() {
                        tracing::debug!("cancelled while running");
                        self.tear_down(&interrupt, &rx, worker);
                        return Err(Error::Cancelled);
                    }
                    if Instant::now() >= deadline {
                        tracing::warn!(timeout = ?self.config.timeout, "test timed out");
                        self.tear_down(&interrupt, &rx, worker);
                        return Ok(Outcome::Timeout(self.config.timeout));
                    }
                }
            }
        }
    }

    /// Interrupt a running context and wait at most the grace period for it
    fn tear_down(&self, interrupt: &InterruptHandle, rx: &Receiver<ContextResult>, worker: thread::JoinHandle<()>) {
        interrupt.interrupt();
        match rx.recv_timeout(self.config.grace_period) {
            Ok(_) | Err(RecvTimeoutError::Disconnected) => {
                let _ = worker.join();
            }
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(
                    grace_period = ?self.config.grace_period,
                    "context ignored interrupt, abandoning it"
                );
            }
        }
    }

    fn finish(&self, descriptor: &TestDescriptor, result: ContextResult) -> Result<Outcome> {
        match result {
            Err(payload) => Ok(Outcome::harness_error(format!(
                "engine panicked: {}",
                panic_message(payload.as_ref())
            ))),
            Ok(Err(err)) if err.is_fatal() || matches!(err, Error::Cancelled) => Err(err),
            Ok(Err(err)) => Ok(Outcome::harness_error(err.to_string())),
            Ok(Ok(result)) => Ok(classify(descriptor.negative(), result)),
        }
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("engine", &self.engine.name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
