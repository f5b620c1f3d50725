//! Harness capabilities injected into every execution context
//!
//! Fixtures talk to the harness through a handful of globals: `$ERROR`,
//! `$FAIL`, `assertTrue` and the `ES5Harness.registerTest` hook. Instead of
//! ambient globals, the runner builds one [`HarnessApi`] value and hands it to
//! each freshly created context. In-process engines call its methods
//! directly; script hosts receive the same contract rendered as source by
//! [`HarnessApi::prelude`].
//!
//! A failing assertion does not unwind through the host. It becomes a typed
//! [`Signal`] that travels back to the executor's single catch boundary.

pub mod prelude;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which harness entry point reported an assertion failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssertionSource {
    /// `$ERROR(message)`
    Error,
    /// `$FAIL(message)`, the legacy spelling of `$ERROR`
    Fail,
    /// `assertTrue(condition)` with a falsy condition
    AssertTrue,
    /// A registered test function returned a falsy value
    Registration,
}

impl fmt::Display for AssertionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssertionSource::Error => write!(f, "$ERROR"),
            AssertionSource::Fail => write!(f, "$FAIL"),
            AssertionSource::AssertTrue => write!(f, "assertTrue"),
            AssertionSource::Registration => write!(f, "registerTest"),
        }
    }
}

/// An explicit assertion failure raised by a fixture
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionFailure {
    pub source: AssertionSource,
    pub message: String,
}

impl fmt::Display for AssertionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.source, self.message)
    }
}

/// Description of an exception the harness did not raise itself
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionInfo {
    /// Constructor name of the thrown value (`TypeError`, ...), when known
    pub name: Option<String>,
    pub message: String,
}

impl ExceptionInfo {
    pub fn new(name: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            name: name.map(str::to_string),
            message: message.into(),
        }
    }

    /// `Name: message`, or just the message for anonymous throws
    pub fn description(&self) -> String {
        match &self.name {
            Some(name) if !self.message.is_empty() => format!("{}: {}", name, self.message),
            Some(name) => name.clone(),
            None => self.message.clone(),
        }
    }
}

impl fmt::Display for ExceptionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description())
    }
}

/// Non-local exit out of a fixture body
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    /// `$ERROR`, `$FAIL`, `assertTrue` or a falsy registered test
    Assertion(AssertionFailure),
    /// Anything else that escaped the body
    Uncaught(ExceptionInfo),
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Assertion(failure) => failure.fmt(f),
            Signal::Uncaught(exception) => write!(f, "uncaught {}", exception),
        }
    }
}

/// How a script finished when no signal escaped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// The body ran to completion
    Ran,
    /// A precondition evaluated falsy; the body never ran
    PreconditionFailed(String),
}

/// Value returned by a registered `test` function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestReturn {
    /// The function returned nothing (`undefined`)
    Undefined,
    Truthy,
    Falsy,
}

/// The object handed to the registration hook
pub struct Registration<'a> {
    pub id: String,
    pub path: Option<String>,
    pub description: Option<String>,
    /// Evaluated before `test`; a falsy result skips the test
    pub precondition: Option<Box<dyn FnOnce() -> Result<bool, Signal> + 'a>>,
    pub test: Box<dyn FnOnce() -> Result<TestReturn, Signal> + 'a>,
}

impl<'a> Registration<'a> {
    pub fn new(id: impl Into<String>, test: impl FnOnce() -> Result<TestReturn, Signal> + 'a) -> Self {
        Self {
            id: id.into(),
            path: None,
            description: None,
            precondition: None,
            test: Box::new(test),
        }
    }

    pub fn with_precondition(mut self, precondition: impl FnOnce() -> Result<bool, Signal> + 'a) -> Self {
        self.precondition = Some(Box::new(precondition));
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl fmt::Debug for Registration<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("description", &self.description)
            .field("precondition", &self.precondition.is_some())
            .finish_non_exhaustive()
    }
}

/// Global names under which the capabilities are exposed to fixtures
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessNames {
    pub error: String,
    pub fail: String,
    pub assert_true: String,
    /// Dotted path of the registration hook
    pub register: String,
}

impl Default for HarnessNames {
    fn default() -> Self {
        Self {
            error: "$ERROR".to_string(),
            fail: "$FAIL".to_string(),
            assert_true: "assertTrue".to_string(),
            register: "ES5Harness.registerTest".to_string(),
        }
    }
}

/// The capability set handed to each execution context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessApi {
    names: HarnessNames,
    helpers: bool,
}

impl Default for HarnessApi {
    fn default() -> Self {
        Self::new()
    }
}

impl HarnessApi {
    /// Standard names with the ES5 helper functions installed
    pub fn new() -> Self {
        Self {
            names: HarnessNames::default(),
            helpers: true,
        }
    }

    pub fn with_names(mut self, names: HarnessNames) -> Self {
        self.names = names;
        self
    }

    /// Toggle `fnExists`, `compareArray` and friends
    pub fn with_helpers(mut self, helpers: bool) -> Self {
        self.helpers = helpers;
        self
    }

    pub fn names(&self) -> &HarnessNames {
        &self.names
    }

    pub fn helpers(&self) -> bool {
        self.helpers
    }

    /// `$ERROR(message)`: the caller propagates the returned signal with `?` or `Err`
    pub fn error(&self, message: impl Into<String>) -> Signal {
        Signal::Assertion(AssertionFailure {
            source: AssertionSource::Error,
            message: message.into(),
        })
    }

    /// `$FAIL(message)`: same semantics as `$ERROR`
    pub fn fail(&self, message: impl Into<String>) -> Signal {
        Signal::Assertion(AssertionFailure {
            source: AssertionSource::Fail,
            message: message.into(),
        })
    }

    /// `assertTrue(condition)`
    pub fn assert_true(&self, condition: bool) -> Result<(), Signal> {
        if condition {
            Ok(())
        } else {
            Err(Signal::Assertion(AssertionFailure {
                source: AssertionSource::AssertTrue,
                message: "assertTrue: expected a truthy value".to_string(),
            }))
        }
    }

    /// The registration hook: runs the precondition, then invokes `test` immediately.
    ///
    /// `undefined` and truthy returns pass; any other falsy return fails.
    pub fn register_test(&self, registration: Registration<'_>) -> Result<Completion, Signal> {
        let Registration {
            id,
            precondition,
            test,
            ..
        } = registration;

        if let Some(precondition) = precondition {
            if !precondition()? {
                return Ok(Completion::PreconditionFailed(format!("precondition of '{}'", id)));
            }
        }

        match test()? {
            TestReturn::Undefined | TestReturn::Truthy => Ok(Completion::Ran),
            TestReturn::Falsy => Err(Signal::Assertion(AssertionFailure {
                source: AssertionSource::Registration,
                message: format!("test '{}' returned a falsy value", id),
            })),
        }
    }

    /// Script rendering of this capability set for script hosts
    pub fn prelude(&self) -> String {
        prelude::render(self)
    }
}
