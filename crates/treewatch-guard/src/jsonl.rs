#![forbid(unsafe_code)]

//! JSONL diagnostic sink (`jsonl` feature).
//!
//! A line-oriented sink for capture and offline analysis: one JSON object
//! per diagnostic, written to stdout or appended to a file. Ordering is
//! deterministic with respect to emission order because writes are
//! serialized behind a mutex, and flush behavior is explicit and
//! configurable.
//!
//! Emission never raises: serialization or I/O problems degrade to a
//! `tracing` warning, keeping the guard's no-raise promise intact even
//! when the evidence channel itself is broken.

use std::fs::OpenOptions;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use treewatch_core::NodeId;

use crate::diagnostic::{Diagnostic, DiagnosticSink};

/// Destination for diagnostic JSONL output.
#[derive(Debug, Clone)]
pub enum JsonlDestination {
    /// Write to stdout.
    Stdout,
    /// Append to a file at the given path.
    File(PathBuf),
}

impl JsonlDestination {
    /// Convenience helper for file destinations.
    #[must_use]
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File(path.into())
    }
}

/// Configuration for the JSONL sink.
#[derive(Debug, Clone)]
pub struct JsonlConfig {
    /// Output destination for JSONL lines.
    pub destination: JsonlDestination,
    /// Flush after every line (recommended for tests and capture).
    pub flush_on_write: bool,
}

impl Default for JsonlConfig {
    fn default() -> Self {
        Self {
            destination: JsonlDestination::Stdout,
            flush_on_write: true,
        }
    }
}

impl JsonlConfig {
    /// Append to a file with flush-on-write.
    #[must_use]
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            destination: JsonlDestination::file(path),
            flush_on_write: true,
        }
    }

    /// Set flush-on-write behavior.
    #[must_use]
    pub fn with_flush_on_write(mut self, enabled: bool) -> Self {
        self.flush_on_write = enabled;
        self
    }
}

/// Wire shape of one diagnostic line.
#[derive(Serialize)]
struct DiagnosticLine {
    level: String,
    op: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    node: Option<NodeId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    fault: Option<String>,
}

impl DiagnosticLine {
    fn from_diagnostic(diagnostic: &Diagnostic) -> Self {
        let node = match diagnostic {
            Diagnostic::InvalidTarget { target } => Some(target.id()),
            Diagnostic::UnderlyingFault {
                target: Some(target),
                ..
            } => Some(target.id()),
            _ => None,
        };
        let fault = match diagnostic {
            Diagnostic::UnderlyingFault { fault, .. } => Some(fault.to_string()),
            _ => None,
        };
        Self {
            level: diagnostic.level().to_string(),
            op: diagnostic.op().to_string(),
            message: diagnostic.to_string(),
            node,
            fault,
        }
    }
}

struct JsonlSinkInner {
    writer: BufWriter<Box<dyn Write + Send>>,
    flush_on_write: bool,
}

/// Shared, line-oriented JSONL sink for guard diagnostics.
#[derive(Clone)]
pub struct JsonlSink {
    inner: Arc<Mutex<JsonlSinkInner>>,
}

impl std::fmt::Debug for JsonlSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonlSink").finish_non_exhaustive()
    }
}

impl JsonlSink {
    /// Build a sink from config. Fails only when the file destination
    /// cannot be opened.
    pub fn from_config(config: &JsonlConfig) -> io::Result<Self> {
        let writer: Box<dyn Write + Send> = match &config.destination {
            JsonlDestination::Stdout => Box::new(io::stdout()),
            JsonlDestination::File(path) => {
                let file = OpenOptions::new().create(true).append(true).open(path)?;
                Box::new(file)
            }
        };
        Ok(Self::from_writer(writer, config.flush_on_write))
    }

    /// Sink writing to stdout with flush-on-write.
    #[must_use]
    pub fn stdout() -> Self {
        Self::from_writer(Box::new(io::stdout()), true)
    }

    fn from_writer(writer: Box<dyn Write + Send>, flush_on_write: bool) -> Self {
        Self {
            inner: Arc::new(Mutex::new(JsonlSinkInner {
                writer: BufWriter::new(writer),
                flush_on_write,
            })),
        }
    }

    /// Write a single line with newline and optional flush.
    pub fn write_line(&self, line: &str) -> io::Result<()> {
        let mut inner = self.inner.lock().expect("jsonl sink lock poisoned");
        inner.writer.write_all(line.as_bytes())?;
        inner.writer.write_all(b"\n")?;
        if inner.flush_on_write {
            inner.writer.flush()?;
        }
        Ok(())
    }

    /// Flush any buffered output.
    pub fn flush(&self) -> io::Result<()> {
        let mut inner = self.inner.lock().expect("jsonl sink lock poisoned");
        inner.writer.flush()
    }
}

impl DiagnosticSink for JsonlSink {
    fn emit(&self, diagnostic: &Diagnostic) {
        let line = match serde_json::to_string(&DiagnosticLine::from_diagnostic(diagnostic)) {
            Ok(line) => line,
            Err(err) => {
                tracing::warn!(%err, "diagnostic serialization failed");
                return;
            }
        };
        if let Err(err) = self.write_line(&line) {
            tracing::warn!(%err, "jsonl diagnostic write failed");
        }
    }
}
