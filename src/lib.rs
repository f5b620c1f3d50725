//! Conformance harness for ECMAScript test suites
//!
//! Runs thousands of standalone Sputnik/ES5-style fixture scripts against a
//! target runtime, each in its own fresh execution context, and reports how
//! the runtime's behavior deviates from what the fixtures encode.
//!
//! # Quick Start
//!
//! ```no_run
//! use conformance_harness::{ProcessEngine, Runner, RunnerConfig};
//! use std::sync::Arc;
//!
//! fn main() -> conformance_harness::Result<()> {
//!     let config = RunnerConfig::new("tests/suite");
//!     let engine = Arc::new(ProcessEngine::new("node"));
//!     let report = Runner::new(config, engine).run()?;
//!     println!("{} of {} passed", report.counts().passed, report.counts().total);
//!     Ok(())
//! }
//! ```
//!
//! # Module Overview
//!
//! Data flows: [`fixture`] → [`executor`] (one [`engine`] context per test) → [`aggregator`] → [`reporter`]
//!
//! | Category | Modules |
//! |----------|---------|
//! | **Input** | [`fixture`], [`fixture::loader`] |
//! | **Execution** | [`harness`], [`engine`], [`executor`] |
//! | **Results** | [`aggregator`], [`reporter`], [`reporter::baseline`] |
//! | **Orchestration** | [`runner`], [`error`](Error) |

pub mod aggregator;
mod duration_serde;
pub mod engine;
pub mod error;
pub mod executor;
pub mod fixture;
pub mod harness;
pub mod reporter;
pub mod runner;

pub use aggregator::{Aggregator, Counts, Report, ReportDocument, RunStatus, TestRecord};
pub use engine::{Engine, ExecutionContext, InterruptHandle, ProcessEngine, ScriptUnit};
pub use error::{Error, MalformedFixture, Result};
pub use executor::{
    CancellationToken, ErrorOrigin, Executor, ExecutorConfig, Failure, FailureClass, Outcome, OutcomeKind,
};
pub use fixture::{FixtureFilter, FixtureLoader, FixtureMetadata, NegativeExpectation, TestDescriptor};
pub use harness::{Completion, HarnessApi, Signal};
pub use reporter::{OutputFormat, Reporter};
pub use runner::{EngineConfig, Runner, RunnerConfig};

/// Version of the harness
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
