//! Shared test helpers for integration tests
//!
//! [`ScriptedEngine`] is an in-process engine whose "scripts" are a tiny line
//! language, one statement per line. Lines of the leading metadata comment
//! (`/*`, `*`, `//`) and blank lines are ignored.
//!
//! ```text
//! $ERROR message        assertion failure through the injected capability
//! $FAIL message         same, legacy spelling
//! assertTrue false      assertion on a literal
//! throw TypeError: msg  uncaught exception (`throw msg` has no name)
//! mark name             record a side effect visible to the test
//! set key value         mutate the context's global state
//! delete key
//! expect key value      $ERROR unless the global has that value
//! register id RET       registration hook, RET is true / false / undefined
//! register-gated id     registration whose precondition is falsy
//! sleep ms
//! loop                  spin until interrupted
//! hang ms               sleep, ignoring interrupts
//! panic message
//! ```
//!
//! Preconditions: `true`, `false`, `defined key`.

#![allow(dead_code)]

use conformance_harness::engine::{Engine, ExecutionContext, InterruptHandle, ScriptUnit};
use conformance_harness::harness::{Completion, ExceptionInfo, HarnessApi, Registration, Signal, TestReturn};
use conformance_harness::{Error, Executor, ExecutorConfig, Result, RunnerConfig, TestDescriptor};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

type Globals = HashMap<String, String>;

fn pristine_globals() -> Globals {
    [
        ("Array.prototype.filter", "native"),
        ("Date.prototype.setMonth.length", "1"),
        ("RegExp.prototype.toString", "native"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

/// Lifecycle counters shared between an engine and its contexts
#[derive(Debug, Default)]
pub struct Lifecycle {
    pub created: AtomicUsize,
    pub dropped: AtomicUsize,
    pub executed: AtomicUsize,
}

/// In-process engine driven by the line language above
pub struct ScriptedEngine {
    /// Shared realm for every context; simulates a harness that leaks state
    shared: Option<Arc<Mutex<Globals>>>,
    /// Contexts that may be created before creation starts failing
    fail_after: Option<usize>,
    marks: Arc<Mutex<Vec<String>>>,
    lifecycle: Arc<Lifecycle>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self {
            shared: None,
            fail_after: None,
            marks: Arc::new(Mutex::new(Vec::new())),
            lifecycle: Arc::new(Lifecycle::default()),
        }
    }

    /// Every context sees the same global state
    pub fn leaky() -> Self {
        Self {
            shared: Some(Arc::new(Mutex::new(pristine_globals()))),
            ..Self::new()
        }
    }

    /// Context creation fails once `n` contexts have been created
    pub fn failing_after(n: usize) -> Self {
        Self {
            fail_after: Some(n),
            ..Self::new()
        }
    }

    pub fn marks(&self) -> Vec<String> {
        self.marks.lock().clone()
    }

    pub fn created(&self) -> usize {
        self.lifecycle.created.load(Ordering::SeqCst)
    }

    pub fn dropped(&self) -> usize {
        self.lifecycle.dropped.load(Ordering::SeqCst)
    }

    pub fn executed(&self) -> usize {
        self.lifecycle.executed.load(Ordering::SeqCst)
    }
}

impl Engine for ScriptedEngine {
    fn name(&self) -> &str {
        "scripted"
    }

    fn create_context(&self, api: &HarnessApi) -> Result<Box<dyn ExecutionContext>> {
        let created = self.lifecycle.created.load(Ordering::SeqCst);
        if self.fail_after.is_some_and(|limit| created >= limit) {
            return Err(Error::context_creation("scripted engine refused a new context"));
        }
        self.lifecycle.created.fetch_add(1, Ordering::SeqCst);

        let globals = match &self.shared {
            Some(shared) => Arc::clone(shared),
            None => Arc::new(Mutex::new(pristine_globals())),
        };
        Ok(Box::new(ScriptedContext {
            api: api.clone(),
            globals,
            interrupt: InterruptHandle::flag(),
            marks: Arc::clone(&self.marks),
            lifecycle: Arc::clone(&self.lifecycle),
        }))
    }
}

struct ScriptedContext {
    api: HarnessApi,
    globals: Arc<Mutex<Globals>>,
    interrupt: InterruptHandle,
    marks: Arc<Mutex<Vec<String>>>,
    lifecycle: Arc<Lifecycle>,
}

impl Drop for ScriptedContext {
    fn drop(&mut self) {
        self.lifecycle.dropped.fetch_add(1, Ordering::SeqCst);
    }
}

fn statements(body: &str) -> impl Iterator<Item = &str> {
    body.lines().map(str::trim).filter(|line| {
        !(line.is_empty()
            || line.starts_with("/*")
            || line.starts_with('*')
            || line.starts_with("//"))
    })
}

fn test_return(word: &str) -> TestReturn {
    match word {
        "true" => TestReturn::Truthy,
        "undefined" => TestReturn::Undefined,
        _ => TestReturn::Falsy,
    }
}

impl ScriptedContext {
    fn precondition_holds(&self, precondition: &str) -> bool {
        match precondition.trim() {
            "true" => true,
            "false" => false,
            other => match other.strip_prefix("defined ") {
                Some(key) => self.globals.lock().contains_key(key.trim()),
                None => false,
            },
        }
    }

    fn statement(&self, line: &str) -> std::result::Result<Option<Completion>, Signal> {
        let (op, rest) = line.split_once(' ').unwrap_or((line, ""));
        match op {
            "$ERROR" => return Err(self.api.error(rest)),
            "$FAIL" => return Err(self.api.fail(rest)),
            "assertTrue" => self.api.assert_true(rest == "true")?,
            "throw" => {
                let exception = match rest.split_once(": ") {
                    Some((name, message)) => ExceptionInfo::new(Some(name), message),
                    None => ExceptionInfo::new(None, rest),
                };
                return Err(Signal::Uncaught(exception));
            }
            "mark" => self.marks.lock().push(rest.to_string()),
            "set" => {
                let (key, value) = rest.split_once(' ').unwrap_or((rest, ""));
                self.globals.lock().insert(key.to_string(), value.to_string());
            }
            "delete" => {
                self.globals.lock().remove(rest);
            }
            "expect" => {
                let (key, expected) = rest.split_once(' ').unwrap_or((rest, ""));
                let actual = self.globals.lock().get(key).cloned();
                if actual.as_deref() != Some(expected) {
                    return Err(self.api.error(format!("expected {} = {}, got {:?}", key, expected, actual)));
                }
            }
            "register" => {
                let (id, ret) = rest.split_once(' ').unwrap_or((rest, "undefined"));
                let ret = test_return(ret);
                let completion = self.api.register_test(Registration::new(id, move || Ok(ret)))?;
                if completion != Completion::Ran {
                    return Ok(Some(completion));
                }
            }
            "register-gated" => {
                let marks = Arc::clone(&self.marks);
                let completion = self.api.register_test(
                    Registration::new(rest, move || {
                        marks.lock().push("gated test body".to_string());
                        Ok(TestReturn::Truthy)
                    })
                    .with_precondition(|| Ok(false)),
                )?;
                return Ok(Some(completion));
            }
            "sleep" => thread::sleep(Duration::from_millis(rest.parse().unwrap_or(0))),
            "loop" => {
                while !self.interrupt.is_interrupted() {
                    thread::sleep(Duration::from_millis(1));
                }
                return Err(Signal::Uncaught(ExceptionInfo::new(None, "interrupted")));
            }
            "hang" => thread::sleep(Duration::from_millis(rest.parse().unwrap_or(60_000))),
            "panic" => panic!("{}", rest),
            "pass" => {}
            other => {
                return Err(Signal::Uncaught(ExceptionInfo::new(
                    Some("ReferenceError"),
                    format!("{} is not defined", other),
                )))
            }
        }
        Ok(None)
    }
}

impl ExecutionContext for ScriptedContext {
    fn interrupt_handle(&self) -> InterruptHandle {
        self.interrupt.clone()
    }

    fn execute(&mut self, unit: &ScriptUnit) -> Result<std::result::Result<Completion, Signal>> {
        self.lifecycle.executed.fetch_add(1, Ordering::SeqCst);
        if let Some(precondition) = &unit.precondition {
            if !self.precondition_holds(precondition) {
                return Ok(Ok(Completion::PreconditionFailed(precondition.clone())));
            }
        }
        for line in statements(&unit.body) {
            match self.statement(line) {
                Ok(None) => {}
                Ok(Some(completion)) => return Ok(Ok(completion)),
                Err(signal) => return Ok(Err(signal)),
            }
        }
        Ok(Ok(Completion::Ran))
    }
}

/// Fixture source with a metadata block
pub fn fixture(id: &str, extra_metadata: &[&str], body: &str) -> String {
    let mut source = format!("/**\n * @id: {};\n", id);
    for line in extra_metadata {
        source.push_str(&format!(" * {}\n", line));
    }
    source.push_str(" */\n");
    source.push_str(body);
    source.push('\n');
    source
}

/// Descriptor built straight from source, bypassing the loader
pub fn descriptor(index: usize, id: &str, extra_metadata: &[&str], body: &str) -> TestDescriptor {
    TestDescriptor::from_source(index, format!("{}.js", id), fixture(id, extra_metadata, body))
}

/// Write `files` (relative path, contents) under a fresh temporary root
pub fn suite(files: &[(&str, String)]) -> tempfile::TempDir {
    let dir = tempfile::tempdir().expect("tempdir");
    for (relative, contents) in files {
        write_file(dir.path(), relative, contents.as_bytes());
    }
    dir
}

pub fn write_file(root: &Path, relative: &str, contents: &[u8]) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create fixture dir");
    }
    std::fs::write(path, contents).expect("write fixture");
}

pub fn executor(engine: Arc<dyn Engine>, timeout: Duration) -> Executor {
    Executor::new(
        engine,
        HarnessApi::new(),
        ExecutorConfig {
            timeout,
            grace_period: Duration::from_millis(200),
        },
    )
}

/// Runner config with short limits suited to tests
pub fn config(root: &Path, parallelism: usize) -> RunnerConfig {
    let mut config = RunnerConfig::new(root);
    config.parallelism = parallelism;
    config.timeout = Duration::from_secs(5);
    config.grace_period = Duration::from_millis(200);
    config
}
