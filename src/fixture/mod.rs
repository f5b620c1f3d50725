//! Conformance fixtures
//!
//! A fixture is a standalone script plus an optional metadata block in its
//! leading comment:
//!
//! ```text
//! // Copyright 2009 the Sputnik authors.  All rights reserved.
//! /**
//!  * @id: S15.9.5.38_A3_T3;
//!  * @section: 15.9.5.38;
//!  * @description: Checking DontEnum attribute;
//!  */
//! ```
//!
//! Every field is optional. A fixture without `@id` (or the Sputnik `@name`
//! alias) is identified by its path relative to the suite root.

pub mod loader;

pub use loader::{FixtureFilter, FixtureLoader, Fixtures};

use crate::harness::ExceptionInfo;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

static METADATA_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^@([A-Za-z_$][\w$-]*)(?:\s*:\s*(.*?)|\s+(.*?))?\s*;?\s*$")
        .expect("metadata line pattern is valid")
});

/// Expectation attached to a negative fixture: the body must throw.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NegativeExpectation {
    /// Error constructor name the thrown value must match, if any
    pub error_type: Option<String>,
}

impl NegativeExpectation {
    /// Does a thrown exception satisfy this expectation?
    pub fn matches(&self, exception: &ExceptionInfo) -> bool {
        match &self.error_type {
            None => true,
            Some(expected) => match exception.name.as_deref() {
                Some(name) => name == expected,
                // Anonymous throws only match a message equal to the expected name.
                None => exception.message == *expected,
            },
        }
    }
}

/// Metadata parsed from a fixture's leading comment block
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FixtureMetadata {
    /// Declared test id (`@id`, or `@name` for Sputnik fixtures)
    pub id: String,
    /// ECMAScript section reference(s), comma separated
    pub section: String,
    /// Original path of the test case in its source suite
    pub path: String,
    /// Human-readable description
    pub description: String,
    /// Sputnik assertion text
    pub assertion: String,
    /// Expression that must evaluate truthy before the body runs
    pub precondition: Option<String>,
    /// Set when the body is expected to throw
    pub negative: Option<NegativeExpectation>,
    /// Run the body as strict mode code
    pub strict_only: bool,
    /// Free-form prose lines from the comment block
    pub info: Vec<String>,
    /// Keys the harness does not interpret
    pub extra: BTreeMap<String, String>,
}

impl FixtureMetadata {
    /// Parse the metadata block of a fixture. Missing blocks and fields yield defaults.
    pub fn parse(source: &str) -> Self {
        let mut metadata = Self::default();
        let Some(block) = leading_comment_block(source) else {
            return metadata;
        };

        let mut declared_id = false;
        for raw in block.lines() {
            let line = raw.trim().trim_start_matches('*').trim();
            if line.is_empty() {
                continue;
            }
            let Some(caps) = METADATA_LINE.captures(line) else {
                metadata.info.push(line.to_string());
                continue;
            };

            let key = &caps[1];
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .map(|m| m.as_str().trim().to_string())
                .unwrap_or_default();

            match key {
                "id" => {
                    metadata.id = value;
                    declared_id = true;
                }
                "name" if !declared_id => metadata.id = value,
                "section" => metadata.section = value,
                "path" => metadata.path = value,
                "description" => metadata.description = value,
                "assertion" => metadata.assertion = value,
                "precondition" => {
                    metadata.precondition = if value.is_empty() { None } else { Some(value) };
                }
                "negative" => {
                    metadata.negative = Some(NegativeExpectation {
                        error_type: if value.is_empty() { None } else { Some(value) },
                    });
                }
                "onlyStrict" | "strict_only" | "strict_mode" => metadata.strict_only = true,
                other => {
                    metadata.extra.insert(other.to_string(), value);
                }
            }
        }

        metadata
    }
}

/// The first `/* ... */` block, preceded only by whitespace and `//` comments.
fn leading_comment_block(source: &str) -> Option<&str> {
    let mut rest = source.trim_start_matches('\u{feff}');
    loop {
        let trimmed = rest.trim_start();
        if let Some(after) = trimmed.strip_prefix("/*") {
            let end = after.find("*/")?;
            return Some(&after[..end]);
        }
        let after = trimmed.strip_prefix("//")?;
        rest = match after.find('\n') {
            Some(newline) => &after[newline + 1..],
            None => "",
        };
    }
}

/// Root-relative path rendered with `/` separators, used as a fallback id.
pub fn path_id(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// In-memory representation of one fixture, ready for execution.
///
/// Descriptors are immutable once loaded; the runner shares them read-only
/// between workers.
#[derive(Debug, Clone, PartialEq)]
pub struct TestDescriptor {
    /// Unique identity within a run
    pub id: String,
    /// Position in discovery order
    pub index: usize,
    /// Path relative to the suite root
    pub path: PathBuf,
    /// Parsed metadata block
    pub metadata: FixtureMetadata,
    /// Raw script text (metadata comment included)
    pub source: String,
}

impl TestDescriptor {
    /// Build a descriptor from fixture text
    pub fn from_source(index: usize, path: impl Into<PathBuf>, source: impl Into<String>) -> Self {
        let path = path.into();
        let source = source.into();
        let metadata = FixtureMetadata::parse(&source);
        let id = if metadata.id.is_empty() {
            path_id(&path)
        } else {
            metadata.id.clone()
        };
        Self {
            id,
            index,
            path,
            metadata,
            source,
        }
    }

    /// Raw section reference
    pub fn section(&self) -> &str {
        &self.metadata.section
    }

    /// Individual section references
    pub fn sections(&self) -> impl Iterator<Item = &str> {
        self.metadata
            .section
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Description, falling back to the Sputnik assertion text
    pub fn description(&self) -> &str {
        if self.metadata.description.is_empty() {
            &self.metadata.assertion
        } else {
            &self.metadata.description
        }
    }

    pub fn precondition(&self) -> Option<&str> {
        self.metadata.precondition.as_deref()
    }

    pub fn negative(&self) -> Option<&NegativeExpectation> {
        self.metadata.negative.as_ref()
    }

    /// Does this fixture count a thrown exception as success?
    pub fn expects_exception(&self) -> bool {
        self.metadata.negative.is_some()
    }

    pub fn is_strict(&self) -> bool {
        self.metadata.strict_only
    }

    /// The script body handed to the engine
    pub fn body(&self) -> &str {
        &self.source
    }
}
