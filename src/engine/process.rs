//! Out-of-process script host
//!
//! Every context is a brand new host process (`node`, `d8`, `qjs`, ...), so
//! nothing a fixture does to the global object can reach the next fixture.
//! The host is given one script file holding the rendered prelude and the
//! driver call, and reports back through `##harness` lines on stdout.

use super::{Engine, ExecutionContext, InterruptHandle, ScriptUnit};
use crate::error::{Error, Result};
use crate::harness::prelude::{self, RECORD_PREFIX};
use crate::harness::{AssertionFailure, AssertionSource, Completion, ExceptionInfo, HarnessApi, Signal};
use parking_lot::Mutex;
use serde::Deserialize;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Stderr is truncated to this many bytes in outcome messages
const MAX_STDERR: usize = 2048;

/// Terminal record written by the driver
#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum HostRecord {
    Done,
    Skip {
        precondition: String,
    },
    Assertion {
        source: AssertionSource,
        message: String,
    },
    Uncaught {
        #[serde(default)]
        name: Option<String>,
        message: String,
    },
}

impl HostRecord {
    fn into_result(self) -> std::result::Result<Completion, Signal> {
        match self {
            HostRecord::Done => Ok(Completion::Ran),
            HostRecord::Skip { precondition } => Ok(Completion::PreconditionFailed(precondition)),
            HostRecord::Assertion { source, message } => {
                Err(Signal::Assertion(AssertionFailure { source, message }))
            }
            HostRecord::Uncaught { name, message } => Err(Signal::Uncaught(ExceptionInfo { name, message })),
        }
    }
}

/// Find the terminal record among the host's stdout lines.
///
/// Fixture output is interleaved with protocol lines; the driver writes its
/// record last, so the last well-formed one wins.
fn terminal_record(stdout: &[String]) -> Option<HostRecord> {
    stdout
        .iter()
        .rev()
        .filter_map(|line| line.strip_prefix(RECORD_PREFIX))
        .find_map(|json| serde_json::from_str(json.trim_end()).ok())
}

/// Engine backed by an external script host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEngine {
    name: String,
    program: String,
    args: Vec<String>,
}

impl ProcessEngine {
    pub fn new(program: impl Into<String>) -> Self {
        let program = program.into();
        let name = Path::new(&program)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| program.clone());
        Self {
            name,
            program,
            args: Vec::new(),
        }
    }

    /// Arguments placed before the script path
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Parse a whitespace separated command line such as `node --stack-size=2000`
    pub fn from_command_line(command: &str) -> Result<Self> {
        let mut parts = command.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| Error::config("engine command is empty"))?;
        Ok(Self::new(program).with_args(parts))
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

impl Engine for ProcessEngine {
    fn name(&self) -> &str {
        &self.name
    }

    fn create_context(&self, api: &HarnessApi) -> Result<Box<dyn ExecutionContext>> {
        let child: Arc<Mutex<Option<Child>>> = Arc::new(Mutex::new(None));
        let victim = Arc::clone(&child);
        let interrupt = InterruptHandle::new(move || {
            if let Some(child) = victim.lock().as_mut() {
                let _ = child.kill();
            }
        });

        Ok(Box::new(ProcessContext {
            program: self.program.clone(),
            args: self.args.clone(),
            prelude: api.prelude(),
            child,
            interrupt,
        }))
    }
}

struct ProcessContext {
    program: String,
    args: Vec<String>,
    prelude: String,
    child: Arc<Mutex<Option<Child>>>,
    interrupt: InterruptHandle,
}

impl ProcessContext {
    fn write_script(&self, unit: &ScriptUnit) -> Result<tempfile::NamedTempFile> {
        let mut script = tempfile::Builder::new()
            .prefix("conformance-")
            .suffix(".js")
            .tempfile()?;
        script.write_all(self.prelude.as_bytes())?;
        script.write_all(prelude::driver(unit.precondition.as_deref(), &unit.body, unit.strict).as_bytes())?;
        script.flush()?;
        Ok(script)
    }

    /// Poll until the child exits; the lock is only held between polls so
    /// the interrupt handle can kill it.
    fn wait(&self) -> Result<ExitStatus> {
        loop {
            {
                let mut guard = self.child.lock();
                let Some(child) = guard.as_mut() else {
                    return Err(Error::context_creation("host process vanished"));
                };
                if let Some(status) = child.try_wait()? {
                    *guard = None;
                    return Ok(status);
                }
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

fn spawn_reader<R: Read + Send + 'static>(stream: Option<R>) -> thread::JoinHandle<Vec<String>> {
    thread::spawn(move || stream.map(read_lines).unwrap_or_default())
}

/// Split host output into lines, replacing invalid UTF-8 instead of stopping at it
fn read_lines<R: Read>(stream: R) -> Vec<String> {
    let mut reader = BufReader::new(stream);
    let mut lines = Vec::new();
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                lines.push(line.trim_end_matches(['\n', '\r']).to_string());
            }
        }
    }
    lines
}

fn truncate(text: &str) -> &str {
    if text.len() <= MAX_STDERR {
        return text;
    }
    let mut end = MAX_STDERR;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

impl ExecutionContext for ProcessContext {
    fn interrupt_handle(&self) -> InterruptHandle {
        self.interrupt.clone()
    }

    fn execute(&mut self, unit: &ScriptUnit) -> Result<std::result::Result<Completion, Signal>> {
        let script = self.write_script(unit)?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(script.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::context_creation(format!("failed to start '{}': {}", self.program, e)))?;

        tracing::trace!(pid = child.id(), test = %unit.id, source = %unit.source_name.display(), "host started");
        let stdout = spawn_reader(child.stdout.take());
        let stderr = spawn_reader(child.stderr.take());
        *self.child.lock() = Some(child);

        // An interrupt that fired before the child existed had nothing to kill.
        if self.interrupt.is_interrupted() {
            if let Some(child) = self.child.lock().as_mut() {
                let _ = child.kill();
            }
        }

        let status = self.wait()?;
        if self.interrupt.is_interrupted() {
            return Ok(Err(Signal::Uncaught(ExceptionInfo::new(None, "host interrupted"))));
        }

        let stdout = stdout.join().unwrap_or_default();
        let stderr = stderr.join().unwrap_or_default().join("\n");

        if let Some(record) = terminal_record(&stdout) {
            return Ok(record.into_result());
        }

        let message = if status.success() {
            "host exited without a completion record".to_string()
        } else if stderr.trim().is_empty() {
            format!("host exited with {}", status)
        } else {
            format!("host exited with {}: {}", status, truncate(stderr.trim()))
        };
        Ok(Err(Signal::Uncaught(ExceptionInfo::new(None, message))))
    }
}

impl Drop for ProcessContext {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.lock().take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}
