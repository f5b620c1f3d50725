//! Finalized run report and its serialized form

use crate::duration_serde;
use crate::error::{MalformedFixture, Result};
use crate::executor::{FailureClass, Outcome, OutcomeKind};
use crate::fixture::TestDescriptor;
use rustc_hash::FxHashMap as HashMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Version of the serialized report layout
pub const DOCUMENT_VERSION: u32 = 1;

/// One test's entry in a report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestRecord {
    pub id: String,
    /// Discovery position
    pub index: usize,
    /// Fixture path relative to the suite root
    pub path: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub section: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub outcome: OutcomeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<FailureClass>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(with = "crate::duration_serde", rename = "duration_ms")]
    pub duration: Duration,
}

fn display_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

impl TestRecord {
    pub fn new(descriptor: &TestDescriptor, outcome: &Outcome, duration: Duration) -> Self {
        Self {
            id: descriptor.id.clone(),
            index: descriptor.index,
            path: display_path(&descriptor.path),
            section: descriptor.section().to_string(),
            description: descriptor.description().to_string(),
            outcome: outcome.kind(),
            class: outcome.class(),
            message: outcome.message(),
            duration: duration_serde::truncate(duration),
        }
    }

    /// Record for a fixture the loader could not turn into a descriptor
    pub fn malformed(fixture: &MalformedFixture) -> Self {
        let outcome = Outcome::malformed(fixture.reason.clone());
        Self {
            id: fixture.id.clone(),
            index: fixture.index,
            path: display_path(&fixture.path),
            section: String::new(),
            description: String::new(),
            outcome: outcome.kind(),
            class: outcome.class(),
            message: outcome.message(),
            duration: Duration::ZERO,
        }
    }

    /// Counts against the run (conformance failure, error or timeout)
    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, OutcomeKind::Fail | OutcomeKind::Error | OutcomeKind::Timeout)
    }
}

/// Running totals per outcome kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counts {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub errors: usize,
    pub skipped: usize,
    pub timeouts: usize,
}

impl Counts {
    pub fn add(&mut self, kind: OutcomeKind) {
        self.total += 1;
        match kind {
            OutcomeKind::Pass => self.passed += 1,
            OutcomeKind::Fail => self.failed += 1,
            OutcomeKind::Error => self.errors += 1,
            OutcomeKind::Skipped => self.skipped += 1,
            OutcomeKind::Timeout => self.timeouts += 1,
        }
    }

    pub fn get(&self, kind: OutcomeKind) -> usize {
        match kind {
            OutcomeKind::Pass => self.passed,
            OutcomeKind::Fail => self.failed,
            OutcomeKind::Error => self.errors,
            OutcomeKind::Skipped => self.skipped,
            OutcomeKind::Timeout => self.timeouts,
        }
    }

    /// Tests that actually ran (skips excluded)
    pub fn runnable(&self) -> usize {
        self.total - self.skipped
    }

    /// Failures, errors and timeouts together
    pub fn unsuccessful(&self) -> usize {
        self.failed + self.errors + self.timeouts
    }

    /// Pass rate as a percentage of runnable tests
    pub fn pass_rate(&self) -> f64 {
        let runnable = self.runnable();
        if runnable == 0 {
            0.0
        } else {
            self.passed as f64 / runnable as f64 * 100.0
        }
    }
}

/// Whether every discovered test got to run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunStatus {
    Complete,
    /// The run was cut short; `not_run` lists ids in discovery order
    Partial { reason: String, not_run: Vec<String> },
}

/// Immutable result of a run
#[derive(Debug, Clone)]
pub struct Report {
    engine: String,
    /// Completion order
    entries: Vec<TestRecord>,
    by_id: HashMap<String, usize>,
    counts: Counts,
    status: RunStatus,
    elapsed: Duration,
}

impl Report {
    pub(crate) fn new(
        engine: String,
        entries: Vec<TestRecord>,
        by_id: HashMap<String, usize>,
        counts: Counts,
        status: RunStatus,
        elapsed: Duration,
    ) -> Self {
        Self {
            engine,
            entries,
            by_id,
            counts,
            status,
            elapsed,
        }
    }

    pub fn engine(&self) -> &str {
        &self.engine
    }

    /// Entries in the order they completed
    pub fn entries(&self) -> &[TestRecord] {
        &self.entries
    }

    /// Entries in discovery order, stable across runs
    pub fn in_discovery_order(&self) -> Vec<&TestRecord> {
        let mut ordered: Vec<&TestRecord> = self.entries.iter().collect();
        ordered.sort_by_key(|r| r.index);
        ordered
    }

    pub fn get(&self, id: &str) -> Option<&TestRecord> {
        self.by_id.get(id).map(|&i| &self.entries[i])
    }

    pub fn counts(&self) -> &Counts {
        &self.counts
    }

    pub fn status(&self) -> &RunStatus {
        &self.status
    }

    pub fn is_partial(&self) -> bool {
        matches!(self.status, RunStatus::Partial { .. })
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Complete run with no failures, errors or timeouts
    pub fn is_success(&self) -> bool {
        !self.is_partial() && self.counts.unsuccessful() == 0
    }

    /// Conformance failures in discovery order
    pub fn failures(&self) -> Vec<&TestRecord> {
        self.filtered(OutcomeKind::Fail)
    }

    /// Harness-side and uncaught errors in discovery order
    pub fn harness_errors(&self) -> Vec<&TestRecord> {
        self.filtered(OutcomeKind::Error)
    }

    pub fn timeouts(&self) -> Vec<&TestRecord> {
        self.filtered(OutcomeKind::Timeout)
    }

    fn filtered(&self, kind: OutcomeKind) -> Vec<&TestRecord> {
        self.in_discovery_order()
            .into_iter()
            .filter(|r| r.outcome == kind)
            .collect()
    }

    pub fn to_document(&self) -> ReportDocument {
        ReportDocument {
            version: DOCUMENT_VERSION,
            engine: self.engine.clone(),
            status: self.status.clone(),
            summary: self.counts,
            pass_rate: self.counts.pass_rate(),
            elapsed: duration_serde::truncate(self.elapsed),
            tests: self.in_discovery_order().into_iter().cloned().collect(),
        }
    }
}

/// Serialized report, tests in discovery order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportDocument {
    pub version: u32,
    pub engine: String,
    pub status: RunStatus,
    pub summary: Counts,
    pub pass_rate: f64,
    #[serde(with = "crate::duration_serde", rename = "elapsed_ms")]
    pub elapsed: Duration,
    pub tests: Vec<TestRecord>,
}

impl ReportDocument {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn get(&self, id: &str) -> Option<&TestRecord> {
        self.tests.iter().find(|t| t.id == id)
    }
}
