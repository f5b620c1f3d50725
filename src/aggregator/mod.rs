//! Result aggregation
//!
//! Workers submit one record per descriptor; the [`Aggregator`] keeps them in
//! arrival order and refuses a second record for the same id. It is shared
//! by reference between worker threads.

pub mod report;

pub use report::{Counts, Report, ReportDocument, RunStatus, TestRecord};

use crate::error::{Error, Result};
use parking_lot::Mutex;
use rustc_hash::FxHashMap as HashMap;
use std::time::Instant;

#[derive(Default)]
struct State {
    entries: Vec<TestRecord>,
    by_id: HashMap<String, usize>,
    counts: Counts,
}

/// Thread-safe collector of per-test records
pub struct Aggregator {
    engine: String,
    started: Instant,
    state: Mutex<State>,
}

impl Aggregator {
    pub fn new(engine: impl Into<String>) -> Self {
        Self {
            engine: engine.into(),
            started: Instant::now(),
            state: Mutex::new(State::default()),
        }
    }

    /// Add one record. A second record for an id is a fatal consistency error.
    pub fn record(&self, record: TestRecord) -> Result<()> {
        let mut state = self.state.lock();
        if state.by_id.contains_key(&record.id) {
            tracing::error!(id = %record.id, "duplicate outcome");
            return Err(Error::DuplicateOutcome(record.id));
        }
        tracing::trace!(id = %record.id, outcome = %record.outcome, "recorded");
        let position = state.entries.len();
        state.counts.add(record.outcome);
        state.by_id.insert(record.id.clone(), position);
        state.entries.push(record);
        Ok(())
    }

    /// Snapshot of the running totals
    pub fn counts(&self) -> Counts {
        self.state.lock().counts
    }

    pub fn contains(&self, id: &str) -> bool {
        self.state.lock().by_id.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Freeze the collected records into a report
    pub fn finalize(self, status: RunStatus) -> Report {
        let elapsed = self.started.elapsed();
        let State { entries, by_id, counts } = self.state.into_inner();
        if let RunStatus::Partial { reason, not_run } = &status {
            tracing::warn!(reason = %reason, not_run = not_run.len(), "partial run");
        }
        Report::new(self.engine, entries, by_id, counts, status, elapsed)
    }
}
