//! Report sinks
//!
//! A [`Reporter`] renders a finalized [`Report`]. The runner never depends on
//! a particular sink; the binary picks one from [`OutputFormat`].

pub mod baseline;

use crate::aggregator::{Report, RunStatus, TestRecord};
use crate::error::{Error, Result};
use crate::executor::OutcomeKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::str::FromStr;

/// Output format for run reports
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Counts plus failure details
    #[default]
    Summary,
    /// Summary preceded by one line per test
    Verbose,
    /// Machine-readable report document
    Json,
    /// Test Anything Protocol
    Tap,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OutputFormat::Summary => "summary",
            OutputFormat::Verbose => "verbose",
            OutputFormat::Json => "json",
            OutputFormat::Tap => "tap",
        };
        f.write_str(name)
    }
}

impl FromStr for OutputFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "summary" => Ok(OutputFormat::Summary),
            "verbose" => Ok(OutputFormat::Verbose),
            "json" => Ok(OutputFormat::Json),
            "tap" => Ok(OutputFormat::Tap),
            other => Err(Error::config(format!(
                "unknown output format '{}' (expected summary, verbose, json or tap)",
                other
            ))),
        }
    }
}

/// A pluggable sink for finalized reports
pub trait Reporter {
    fn render(&self, report: &Report) -> Result<String>;

    fn write(&self, report: &Report, out: &mut dyn Write) -> Result<()> {
        out.write_all(self.render(report)?.as_bytes())?;
        out.flush()?;
        Ok(())
    }
}

/// Pick the reporter for a format
pub fn reporter_for(format: OutputFormat) -> Box<dyn Reporter> {
    match format {
        OutputFormat::Summary => Box::new(SummaryReporter::new()),
        OutputFormat::Verbose => Box::new(SummaryReporter::verbose()),
        OutputFormat::Json => Box::new(JsonReporter),
        OutputFormat::Tap => Box::new(TapReporter),
    }
}

/// Chapter of a record: leading number of its section, else its top directory
fn chapter(record: &TestRecord) -> String {
    let section = record.section.split(',').next().unwrap_or("").trim();
    if let Some(head) = section.split('.').next().filter(|h| !h.is_empty()) {
        return head.to_string();
    }
    match record.path.split_once('/') {
        Some((dir, _)) => dir.to_string(),
        None => "unknown".to_string(),
    }
}

#[derive(Default)]
struct ChapterTotals {
    total: usize,
    passed: usize,
    failed: usize,
    skipped: usize,
}

impl ChapterTotals {
    fn pass_rate(&self) -> f64 {
        let runnable = self.total - self.skipped;
        if runnable == 0 {
            0.0
        } else {
            self.passed as f64 / runnable as f64 * 100.0
        }
    }
}

/// Human-readable console report
#[derive(Debug, Clone, Copy, Default)]
pub struct SummaryReporter {
    verbose: bool,
}

impl SummaryReporter {
    pub fn new() -> Self {
        Self { verbose: false }
    }

    /// Also list every test with its outcome
    pub fn verbose() -> Self {
        Self { verbose: true }
    }

    fn push_section(s: &mut String, title: &str, records: &[&TestRecord]) {
        if records.is_empty() {
            return;
        }
        s.push_str(&format!("\n{} ({}):\n", title, records.len()));
        for record in records {
            match &record.message {
                Some(message) => s.push_str(&format!("  {} [{}]\n      {}\n", record.id, record.path, message)),
                None => s.push_str(&format!("  {} [{}]\n", record.id, record.path)),
            }
        }
    }
}

impl Reporter for SummaryReporter {
    fn render(&self, report: &Report) -> Result<String> {
        let counts = report.counts();
        let mut s = String::new();

        if self.verbose {
            for record in report.in_discovery_order() {
                match &record.message {
                    Some(message) => s.push_str(&format!("{:<7} {} - {}\n", record.outcome, record.id, message)),
                    None => s.push_str(&format!("{:<7} {}\n", record.outcome, record.id)),
                }
            }
        }

        s.push_str(&format!("\n=== Conformance Report ({}) ===\n\n", report.engine()));
        s.push_str(&format!(
            "Total: {} | Pass: {} | Fail: {} | Error: {} | Skip: {} | Timeout: {}\n",
            counts.total, counts.passed, counts.failed, counts.errors, counts.skipped, counts.timeouts
        ));
        s.push_str(&format!(
            "Pass Rate: {:.1}% ({}/{})\n",
            counts.pass_rate(),
            counts.passed,
            counts.runnable()
        ));
        s.push_str(&format!("Time: {:?}\n", report.elapsed()));
        if let RunStatus::Partial { reason, not_run } = report.status() {
            s.push_str(&format!("PARTIAL RUN: {} ({} tests not run)\n", reason, not_run.len()));
        }

        let mut chapters: BTreeMap<String, ChapterTotals> = BTreeMap::new();
        for record in report.entries() {
            let totals = chapters.entry(chapter(record)).or_default();
            totals.total += 1;
            match record.outcome {
                OutcomeKind::Pass => totals.passed += 1,
                OutcomeKind::Skipped => totals.skipped += 1,
                _ => totals.failed += 1,
            }
        }
        if chapters.len() > 1 {
            s.push_str(&format!(
                "\n{:<20} {:>6} {:>6} {:>6} {:>7}\n",
                "Chapter", "Total", "Pass", "Fail", "Rate"
            ));
            s.push_str(&"-".repeat(49));
            s.push('\n');
            for (name, totals) in &chapters {
                s.push_str(&format!(
                    "{:<20} {:>6} {:>6} {:>6} {:>6.1}%\n",
                    name,
                    totals.total,
                    totals.passed,
                    totals.failed,
                    totals.pass_rate()
                ));
            }
        }

        Self::push_section(&mut s, "Conformance failures", &report.failures());
        Self::push_section(&mut s, "Errors", &report.harness_errors());
        Self::push_section(&mut s, "Timeouts", &report.timeouts());
        Ok(s)
    }
}

/// Pretty-printed [`ReportDocument`](crate::aggregator::ReportDocument)
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonReporter;

impl Reporter for JsonReporter {
    fn render(&self, report: &Report) -> Result<String> {
        let mut json = report.to_document().to_json()?;
        json.push('\n');
        Ok(json)
    }
}

/// TAP version 13, tests in discovery order
#[derive(Debug, Clone, Copy, Default)]
pub struct TapReporter;

impl Reporter for TapReporter {
    fn render(&self, report: &Report) -> Result<String> {
        let records = report.in_discovery_order();
        let mut s = format!("TAP version 13\n1..{}\n", records.len());
        for (i, record) in records.iter().enumerate() {
            let n = i + 1;
            match record.outcome {
                OutcomeKind::Pass => s.push_str(&format!("ok {} - {}\n", n, record.id)),
                OutcomeKind::Skipped => s.push_str(&format!(
                    "ok {} - {} # SKIP {}\n",
                    n,
                    record.id,
                    record.message.as_deref().unwrap_or("")
                )),
                _ => {
                    s.push_str(&format!("not ok {} - {}\n", n, record.id));
                    s.push_str(&format!("  ---\n  outcome: {}\n", record.outcome));
                    if let Some(message) = &record.message {
                        s.push_str(&format!("  message: {}\n", serde_json::Value::from(message.as_str())));
                    }
                    s.push_str("  ...\n");
                }
            }
        }
        if let RunStatus::Partial { reason, .. } = report.status() {
            s.push_str(&format!("Bail out! {}\n", reason));
        }
        Ok(s)
    }
}
