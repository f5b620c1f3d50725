//! Classified result of running one descriptor

use crate::harness::{AssertionFailure, ExceptionInfo};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Exception name used for fixtures the loader rejected
pub const MALFORMED_FIXTURE: &str = "MalformedFixture";

/// Exception name used when the harness itself failed on one test
pub const HARNESS_ERROR: &str = "HarnessError";

/// Why a conformance check failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    /// `$ERROR`, `$FAIL`, `assertTrue` or a falsy registered test
    Assertion(AssertionFailure),
    /// A negative fixture completed without throwing
    DidNotThrow { expected: Option<String> },
    /// A negative fixture threw something other than what it declared
    WrongException { expected: String, actual: ExceptionInfo },
}

impl Failure {
    pub fn message(&self) -> String {
        match self {
            Failure::Assertion(assertion) => assertion.message.clone(),
            Failure::DidNotThrow { expected: Some(expected) } => {
                format!("expected {} to be thrown, but the test completed", expected)
            }
            Failure::DidNotThrow { expected: None } => {
                "expected an exception, but the test completed".to_string()
            }
            Failure::WrongException { expected, actual } => {
                format!("expected {}, got {}", expected, actual)
            }
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::Assertion(assertion) => assertion.fmt(f),
            other => f.write_str(&other.message()),
        }
    }
}

/// Who raised an error outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorOrigin {
    /// Thrown by the fixture and never caught
    Uncaught,
    /// The loader rejected the fixture
    Malformed,
    /// The harness failed on this test
    Harness,
}

/// Result of one descriptor; produced exactly once per run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Pass,
    Fail(Failure),
    Error { exception: ExceptionInfo, origin: ErrorOrigin },
    /// The precondition that evaluated falsy
    Skipped(String),
    /// The configured limit that was exceeded
    Timeout(Duration),
}

/// Outcome without its payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeKind {
    Pass,
    Fail,
    Error,
    Skipped,
    Timeout,
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            OutcomeKind::Pass => "PASS",
            OutcomeKind::Fail => "FAIL",
            OutcomeKind::Error => "ERROR",
            OutcomeKind::Skipped => "SKIP",
            OutcomeKind::Timeout => "TIMEOUT",
        })
    }
}

/// Error taxonomy an outcome belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    AssertionFailure,
    UncaughtException,
    Timeout,
    PreconditionNotMet,
    MalformedFixture,
    /// The harness could not run the test (engine panic, I/O error, ...)
    HarnessError,
}

impl Outcome {
    /// Error outcome for a fixture the loader rejected
    pub fn malformed(reason: impl Into<String>) -> Self {
        Outcome::Error {
            exception: ExceptionInfo::new(Some(MALFORMED_FIXTURE), reason),
            origin: ErrorOrigin::Malformed,
        }
    }

    /// Error outcome for a harness-side failure on one test
    pub fn harness_error(message: impl Into<String>) -> Self {
        Outcome::Error {
            exception: ExceptionInfo::new(Some(HARNESS_ERROR), message),
            origin: ErrorOrigin::Harness,
        }
    }

    /// Error outcome for an exception the fixture let escape
    pub fn uncaught(exception: ExceptionInfo) -> Self {
        Outcome::Error {
            exception,
            origin: ErrorOrigin::Uncaught,
        }
    }

    pub fn kind(&self) -> OutcomeKind {
        match self {
            Outcome::Pass => OutcomeKind::Pass,
            Outcome::Fail(_) => OutcomeKind::Fail,
            Outcome::Error { .. } => OutcomeKind::Error,
            Outcome::Skipped(_) => OutcomeKind::Skipped,
            Outcome::Timeout(_) => OutcomeKind::Timeout,
        }
    }

    /// Taxonomy class, `None` for a pass
    pub fn class(&self) -> Option<FailureClass> {
        match self {
            Outcome::Pass => None,
            Outcome::Fail(_) => Some(FailureClass::AssertionFailure),
            Outcome::Error { origin, .. } => Some(match origin {
                ErrorOrigin::Uncaught => FailureClass::UncaughtException,
                ErrorOrigin::Malformed => FailureClass::MalformedFixture,
                ErrorOrigin::Harness => FailureClass::HarnessError,
            }),
            Outcome::Skipped(_) => Some(FailureClass::PreconditionNotMet),
            Outcome::Timeout(_) => Some(FailureClass::Timeout),
        }
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, Outcome::Pass)
    }

    /// Passes and skips do not fail a run
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Pass | Outcome::Skipped(_))
    }

    /// Triage message recorded with the outcome
    pub fn message(&self) -> Option<String> {
        match self {
            Outcome::Pass => None,
            Outcome::Fail(failure) => Some(failure.message()),
            Outcome::Error { exception, .. } => Some(exception.description()),
            Outcome::Skipped(precondition) => Some(format!("precondition not met: {}", precondition)),
            Outcome::Timeout(limit) => Some(format!("timed out after {:?}", limit)),
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.message() {
            Some(message) => write!(f, "{} ({})", self.kind(), message),
            None => write!(f, "{}", self.kind()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::AssertionSource;

    #[test]
    fn test_classes() {
        let assertion = Outcome::Fail(Failure::Assertion(AssertionFailure {
            source: AssertionSource::Error,
            message: "#1".into(),
        }));
        assert_eq!(assertion.class(), Some(FailureClass::AssertionFailure));
        assert_eq!(Outcome::Pass.class(), None);
        assert_eq!(
            Outcome::uncaught(ExceptionInfo::new(Some("TypeError"), "x")).class(),
            Some(FailureClass::UncaughtException)
        );
        assert_eq!(Outcome::malformed("bad").class(), Some(FailureClass::MalformedFixture));
        assert_eq!(Outcome::harness_error("panic").class(), Some(FailureClass::HarnessError));
        assert_eq!(Outcome::Skipped("p".into()).class(), Some(FailureClass::PreconditionNotMet));
        assert_eq!(
            Outcome::Timeout(Duration::from_secs(1)).class(),
            Some(FailureClass::Timeout)
        );
    }

    #[test]
    fn test_thrown_harness_names_stay_uncaught() {
        let thrown = Outcome::uncaught(ExceptionInfo::new(Some(HARNESS_ERROR), "thrown by the fixture"));
        assert_eq!(thrown.class(), Some(FailureClass::UncaughtException));
        let thrown = Outcome::uncaught(ExceptionInfo::new(Some(MALFORMED_FIXTURE), "also thrown"));
        assert_eq!(thrown.class(), Some(FailureClass::UncaughtException));
        assert_ne!(thrown, Outcome::malformed("also thrown"));
    }

    #[test]
    fn test_messages() {
        assert_eq!(Outcome::Pass.message(), None);
        assert_eq!(Outcome::Pass.to_string(), "PASS");
        let wrong = Outcome::Fail(Failure::WrongException {
            expected: "TypeError".into(),
            actual: ExceptionInfo::new(Some("RangeError"), "len"),
        });
        assert_eq!(wrong.message().unwrap(), "expected TypeError, got RangeError: len");
        let silent = Failure::DidNotThrow { expected: None };
        assert!(silent.message().contains("expected an exception"));
        assert_eq!(
            Outcome::Skipped("fnExists(f)".into()).to_string(),
            "SKIP (precondition not met: fnExists(f))"
        );
    }

    #[test]
    fn test_success_excludes_failures() {
        assert!(Outcome::Pass.is_success());
        assert!(Outcome::Skipped("p".into()).is_success());
        assert!(!Outcome::Timeout(Duration::ZERO).is_success());
        assert!(!Outcome::harness_error("x").is_success());
    }
}
