//! Run configuration
//!
//! Values are layered: [`RunnerConfig::default`], then an optional JSON file,
//! then command line flags applied by the binary. Durations are written as
//! milliseconds in the file format.

use crate::engine::ProcessEngine;
use crate::error::{Error, Result};
use crate::executor::ExecutorConfig;
use crate::fixture::{FixtureFilter, FixtureLoader};
use crate::reporter::OutputFormat;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Script host used to run fixtures
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Host executable (`node`, `d8`, `qjs`, or a path)
    pub command: String,
    /// Extra host arguments, placed before the script path
    pub args: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            command: "node".to_string(),
            args: Vec::new(),
        }
    }
}

impl EngineConfig {
    pub fn build(&self) -> Result<ProcessEngine> {
        let mut engine = ProcessEngine::from_command_line(&self.command)?;
        if !self.args.is_empty() {
            let args: Vec<String> = engine.args().iter().chain(&self.args).cloned().collect();
            engine = engine.with_args(args);
        }
        Ok(engine)
    }
}

/// Configuration for a conformance run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Suite root directory
    pub root: PathBuf,
    pub engine: EngineConfig,
    /// Fixture file extension
    pub extension: String,
    /// Maximum time per test
    #[serde(with = "crate::duration_serde", rename = "timeout_ms")]
    pub timeout: Duration,
    /// Teardown allowance for interrupted contexts
    #[serde(with = "crate::duration_serde", rename = "grace_period_ms")]
    pub grace_period: Duration,
    /// Number of worker threads
    pub parallelism: usize,
    pub id_prefixes: Vec<String>,
    pub sections: Vec<String>,
    /// Maximum number of tests to run (0 = unlimited)
    pub max_tests: usize,
    /// Stop dispatching after this many unsuccessful tests (0 = never)
    pub max_failures: usize,
    /// Stop dispatching once the run has taken this long
    #[serde(with = "crate::duration_serde::option", rename = "max_duration_ms")]
    pub max_duration: Option<Duration>,
    /// Execute in a seeded random order instead of discovery order
    pub shuffle_seed: Option<u64>,
    /// Install `fnExists`, `compareArray` and the other ES5 helpers
    pub harness_helpers: bool,
    pub format: OutputFormat,
    /// Report destination; stdout when unset
    pub output: Option<PathBuf>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            engine: EngineConfig::default(),
            extension: "js".to_string(),
            timeout: Duration::from_secs(10),
            grace_period: Duration::from_secs(2),
            parallelism: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            id_prefixes: Vec::new(),
            sections: Vec::new(),
            max_tests: 0,
            max_failures: 0,
            max_duration: None,
            shuffle_seed: None,
            harness_helpers: true,
            format: OutputFormat::Summary,
            output: None,
        }
    }
}

impl RunnerConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a JSON config file; absent keys keep their defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| Error::config_file(path, e))?;
        serde_json::from_str(&json).map_err(|e| Error::config_file(path, e))
    }

    pub fn validate(&self) -> Result<()> {
        if self.timeout.is_zero() {
            return Err(Error::config("timeout must be greater than zero"));
        }
        if self.parallelism == 0 {
            return Err(Error::config("parallelism must be at least 1"));
        }
        if self.engine.command.trim().is_empty() {
            return Err(Error::config("engine command is empty"));
        }
        if self.extension.is_empty() {
            return Err(Error::config("fixture extension is empty"));
        }
        Ok(())
    }

    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            timeout: self.timeout,
            grace_period: self.grace_period,
        }
    }

    pub fn filter(&self) -> FixtureFilter {
        FixtureFilter {
            id_prefixes: self.id_prefixes.clone(),
            sections: self.sections.clone(),
        }
    }

    pub fn loader(&self) -> FixtureLoader {
        FixtureLoader::new(&self.root)
            .with_extension(self.extension.clone())
            .with_filter(self.filter())
    }
}
