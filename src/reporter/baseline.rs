//! Run-to-run comparison of serialized reports

use crate::aggregator::{ReportDocument, TestRecord};
use crate::executor::OutcomeKind;
use rustc_hash::FxHashMap as HashMap;
use serde::Serialize;

/// One test whose outcome kind differs between two runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Change {
    pub id: String,
    pub before: OutcomeKind,
    pub after: OutcomeKind,
    /// Message recorded by the current run
    pub message: Option<String>,
}

/// Differences between a baseline run and a current run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Comparison {
    /// Passed before, fails, errors or times out now
    pub regressions: Vec<Change>,
    /// Failed, errored or timed out before, passes now
    pub progressions: Vec<Change>,
    /// Any other change of outcome kind
    pub changes: Vec<Change>,
    /// Only in the current run
    pub added: Vec<String>,
    /// Only in the baseline
    pub removed: Vec<String>,
}

impl Comparison {
    pub fn has_regressions(&self) -> bool {
        !self.regressions.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.regressions.is_empty()
            && self.progressions.is_empty()
            && self.changes.is_empty()
            && self.added.is_empty()
            && self.removed.is_empty()
    }

    pub fn render(&self) -> String {
        let mut s = format!(
            "Regressions: {} | Progressions: {} | Other changes: {} | Added: {} | Removed: {}\n",
            self.regressions.len(),
            self.progressions.len(),
            self.changes.len(),
            self.added.len(),
            self.removed.len()
        );
        for (title, changes) in [
            ("Regressions", &self.regressions),
            ("Progressions", &self.progressions),
            ("Other changes", &self.changes),
        ] {
            if changes.is_empty() {
                continue;
            }
            s.push_str(&format!("\n{}:\n", title));
            for change in changes {
                s.push_str(&format!("  {} {} -> {}", change.id, change.before, change.after));
                if let Some(message) = &change.message {
                    s.push_str(&format!(": {}", message));
                }
                s.push('\n');
            }
        }
        for (title, ids) in [("Added", &self.added), ("Removed", &self.removed)] {
            if !ids.is_empty() {
                s.push_str(&format!("\n{}:\n", title));
                for id in ids {
                    s.push_str(&format!("  {}\n", id));
                }
            }
        }
        s
    }
}

fn is_bad(kind: OutcomeKind) -> bool {
    matches!(kind, OutcomeKind::Fail | OutcomeKind::Error | OutcomeKind::Timeout)
}

/// Compare two runs; results follow the current run's discovery order
pub fn compare(baseline: &ReportDocument, current: &ReportDocument) -> Comparison {
    let before: HashMap<&str, &TestRecord> = baseline.tests.iter().map(|t| (t.id.as_str(), t)).collect();
    let after: HashMap<&str, &TestRecord> = current.tests.iter().map(|t| (t.id.as_str(), t)).collect();
    let mut comparison = Comparison::default();

    for record in &current.tests {
        let Some(previous) = before.get(record.id.as_str()) else {
            comparison.added.push(record.id.clone());
            continue;
        };
        if previous.outcome == record.outcome {
            continue;
        }
        let change = Change {
            id: record.id.clone(),
            before: previous.outcome,
            after: record.outcome,
            message: record.message.clone(),
        };
        if previous.outcome == OutcomeKind::Pass && is_bad(record.outcome) {
            comparison.regressions.push(change);
        } else if is_bad(previous.outcome) && record.outcome == OutcomeKind::Pass {
            comparison.progressions.push(change);
        } else {
            comparison.changes.push(change);
        }
    }

    comparison.removed = baseline
        .tests
        .iter()
        .filter(|t| !after.contains_key(t.id.as_str()))
        .map(|t| t.id.clone())
        .collect();
    comparison
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::{Counts, RunStatus};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn document(tests: &[(&str, OutcomeKind)]) -> ReportDocument {
        let mut summary = Counts::default();
        let tests: Vec<TestRecord> = tests
            .iter()
            .enumerate()
            .map(|(index, (id, outcome))| {
                summary.add(*outcome);
                TestRecord {
                    id: id.to_string(),
                    index,
                    path: format!("{}.js", id),
                    section: String::new(),
                    description: String::new(),
                    outcome: *outcome,
                    class: None,
                    message: None,
                    duration: Duration::ZERO,
                }
            })
            .collect();
        ReportDocument {
            version: 1,
            engine: "node".into(),
            status: RunStatus::Complete,
            summary,
            pass_rate: summary.pass_rate(),
            elapsed: Duration::ZERO,
            tests,
        }
    }

    #[test]
    fn test_classifies_changes() {
        let baseline = document(&[
            ("a", OutcomeKind::Pass),
            ("b", OutcomeKind::Fail),
            ("c", OutcomeKind::Pass),
            ("d", OutcomeKind::Fail),
            ("gone", OutcomeKind::Pass),
        ]);
        let current = document(&[
            ("a", OutcomeKind::Timeout),
            ("b", OutcomeKind::Pass),
            ("c", OutcomeKind::Pass),
            ("d", OutcomeKind::Error),
            ("new", OutcomeKind::Skipped),
        ]);
        let comparison = compare(&baseline, &current);

        let ids = |changes: &[Change]| changes.iter().map(|c| c.id.clone()).collect::<Vec<_>>();
        assert_eq!(ids(&comparison.regressions), vec!["a"]);
        assert_eq!(ids(&comparison.progressions), vec!["b"]);
        assert_eq!(ids(&comparison.changes), vec!["d"]);
        assert_eq!(comparison.added, vec!["new"]);
        assert_eq!(comparison.removed, vec!["gone"]);
        assert!(comparison.has_regressions());

        let text = comparison.render();
        assert!(text.starts_with("Regressions: 1 | Progressions: 1"));
        assert!(text.contains("a PASS -> TIMEOUT"));
    }

    #[test]
    fn test_identical_runs_have_no_changes() {
        let run = document(&[("a", OutcomeKind::Pass), ("b", OutcomeKind::Skipped)]);
        let comparison = compare(&run, &run.clone());
        assert!(comparison.is_empty());
        assert!(!comparison.has_regressions());
    }
}
