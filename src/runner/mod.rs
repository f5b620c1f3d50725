//! Parallel conformance runner
//!
//! Discovers the suite, fans descriptors out to `parallelism` worker
//! threads and collects their outcomes. Workers share nothing but the job
//! channel, the aggregator and the cancellation token; each test gets its
//! own execution context from the executor.

pub mod config;

pub use config::{EngineConfig, RunnerConfig};

use crate::aggregator::{Aggregator, Report, RunStatus, TestRecord};
use crate::engine::Engine;
use crate::error::{Error, MalformedFixture, Result};
use crate::executor::{CancellationToken, Executor, Outcome};
use crate::fixture::TestDescriptor;
use crate::harness::HarnessApi;
use crossbeam::channel::{self, Receiver};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

type Job = std::result::Result<TestDescriptor, MalformedFixture>;

const WATCHDOG_INTERVAL: Duration = Duration::from_millis(10);

/// State shared by the workers of one run
struct RunState<'a> {
    executor: &'a Executor,
    aggregator: &'a Aggregator,
    cancel: &'a CancellationToken,
    max_failures: usize,
    failures: AtomicUsize,
    /// First reason the run was cut short
    stop_reason: Mutex<Option<String>>,
    /// First fatal error; it replaces the report
    fatal: Mutex<Option<Error>>,
}

impl RunState<'_> {
    fn stop(&self, reason: impl Into<String>) {
        let mut slot = self.stop_reason.lock();
        if slot.is_none() {
            *slot = Some(reason.into());
        }
        self.cancel.cancel();
    }

    fn abort(&self, err: Error) {
        tracing::error!(error = %err, "fatal error, aborting run");
        {
            let mut slot = self.fatal.lock();
            if slot.is_none() {
                *slot = Some(err);
            }
        }
        self.stop("fatal error");
    }

    fn record(&self, record: TestRecord) {
        let failed = record.is_failure();
        if let Err(err) = self.aggregator.record(record) {
            self.abort(err);
            return;
        }
        if failed {
            let failures = self.failures.fetch_add(1, Ordering::SeqCst) + 1;
            if self.max_failures > 0 && failures >= self.max_failures {
                tracing::warn!(failures, "failure limit reached");
                self.stop(format!("stopped after {} failures", failures));
            }
        }
    }

    fn work(&self, jobs: &Receiver<Job>) {
        while !self.cancel.is_cancelled() {
            let Ok(job) = jobs.recv() else {
                break;
            };
            let descriptor = match job {
                Ok(descriptor) => descriptor,
                Err(malformed) => {
                    tracing::debug!(id = %malformed.id, reason = %malformed.reason, "malformed fixture");
                    self.record(TestRecord::malformed(&malformed));
                    continue;
                }
            };

            tracing::debug!(id = %descriptor.id, index = descriptor.index, "dispatch");
            let started = Instant::now();
            match self.executor.execute_with_cancel(&descriptor, self.cancel) {
                Ok(outcome) => self.record(TestRecord::new(&descriptor, &outcome, started.elapsed())),
                Err(Error::Cancelled) => break,
                Err(err) if err.is_fatal() => {
                    self.abort(err);
                    break;
                }
                Err(err) => {
                    let outcome = Outcome::harness_error(err.to_string());
                    self.record(TestRecord::new(&descriptor, &outcome, started.elapsed()));
                }
            }
        }
    }
}

/// Runs a whole suite against one engine
pub struct Runner {
    config: RunnerConfig,
    engine: Arc<dyn Engine>,
    api: HarnessApi,
    cancel: CancellationToken,
}

impl Runner {
    pub fn new(config: RunnerConfig, engine: Arc<dyn Engine>) -> Self {
        let api = HarnessApi::new().with_helpers(config.harness_helpers);
        Self {
            config,
            engine,
            api,
            cancel: CancellationToken::new(),
        }
    }

    /// Replace the capability set handed to every context
    pub fn with_api(mut self, api: HarnessApi) -> Self {
        self.api = api;
        self
    }

    /// Share an external abort flag (e.g. wired to Ctrl-C).
    ///
    /// Each run watches the flag; the runner itself never fires it.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Discover, execute and aggregate the suite.
    ///
    /// Returns `Err` for invalid configuration and for fatal errors; every
    /// per-test problem is an outcome inside the report.
    pub fn run(&self) -> Result<Report> {
        self.config.validate()?;
        if !self.config.root.is_dir() {
            return Err(Error::config(format!(
                "suite root '{}' is not a directory",
                self.config.root.display()
            )));
        }

        let mut jobs: Vec<Job> = self.config.loader().iter().collect();
        if self.config.max_tests > 0 {
            jobs.truncate(self.config.max_tests);
        }
        let discovered: Vec<String> = jobs
            .iter()
            .map(|job| match job {
                Ok(descriptor) => descriptor.id.clone(),
                Err(malformed) => malformed.id.clone(),
            })
            .collect();
        if let Some(seed) = self.config.shuffle_seed {
            jobs.shuffle(&mut StdRng::seed_from_u64(seed));
        }

        let workers = self.config.parallelism.min(jobs.len()).max(1);
        tracing::info!(
            tests = jobs.len(),
            engine = self.engine.name(),
            workers,
            seed = ?self.config.shuffle_seed,
            "starting run"
        );

        let (tx, rx) = channel::unbounded();
        for job in jobs {
            // The receiver outlives this loop.
            let _ = tx.send(job);
        }
        drop(tx);

        // Bail-out and fatal errors cancel this run only; the external token
        // is watched but never fired from here.
        let cancel = CancellationToken::new();
        if self.cancel.is_cancelled() {
            cancel.cancel();
        }

        let executor = Executor::new(Arc::clone(&self.engine), self.api.clone(), self.config.executor_config());
        let aggregator = Aggregator::new(self.engine.name());
        let state = RunState {
            executor: &executor,
            aggregator: &aggregator,
            cancel: &cancel,
            max_failures: self.config.max_failures,
            failures: AtomicUsize::new(0),
            stop_reason: Mutex::new(None),
            fatal: Mutex::new(None),
        };
        let finished = AtomicBool::new(false);
        let started = Instant::now();

        thread::scope(|scope| {
            {
                let state = &state;
                let finished = &finished;
                let external = &self.cancel;
                let limit = self.config.max_duration;
                scope.spawn(move || {
                    while !finished.load(Ordering::SeqCst) && !state.cancel.is_cancelled() {
                        if external.is_cancelled() {
                            tracing::debug!("external cancellation");
                            state.stop("cancelled");
                            break;
                        }
                        if let Some(limit) = limit.filter(|limit| started.elapsed() >= *limit) {
                            tracing::warn!(limit = ?limit, "run time budget exhausted");
                            state.stop(format!("run exceeded {:?}", limit));
                            break;
                        }
                        thread::sleep(WATCHDOG_INTERVAL);
                    }
                });
            }

            let handles: Vec<_> = (0..workers)
                .map(|_| {
                    let state = &state;
                    let rx = rx.clone();
                    scope.spawn(move || state.work(&rx))
                })
                .collect();
            for handle in handles {
                if handle.join().is_err() {
                    state.abort(Error::context_creation("worker thread panicked"));
                }
            }
            finished.store(true, Ordering::SeqCst);
        });

        if let Some(err) = state.fatal.into_inner() {
            return Err(err);
        }

        let not_run: Vec<String> = discovered
            .into_iter()
            .filter(|id| !aggregator.contains(id))
            .collect();
        let status = if not_run.is_empty() {
            RunStatus::Complete
        } else {
            let reason = state
                .stop_reason
                .into_inner()
                .unwrap_or_else(|| "cancelled".to_string());
            RunStatus::Partial { reason, not_run }
        };

        let report = aggregator.finalize(status);
        let counts = report.counts();
        tracing::info!(
            total = counts.total,
            passed = counts.passed,
            failed = counts.failed,
            errors = counts.errors,
            skipped = counts.skipped,
            timeouts = counts.timeouts,
            elapsed = ?report.elapsed(),
            "run finished"
        );
        Ok(report)
    }
}

impl std::fmt::Debug for Runner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner")
            .field("config", &self.config)
            .field("engine", &self.engine.name())
            .finish_non_exhaustive()
    }
}
