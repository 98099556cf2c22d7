#![forbid(unsafe_code)]

//! Diagnostics emitted when the guard refuses or contains an operation.
//!
//! Every refused call and every contained fault becomes one [`Diagnostic`]
//! handed to a [`DiagnosticSink`]. The sink is injected, so hosts decide
//! where the evidence goes: [`TracingSink`] forwards to `tracing` at the
//! diagnostic's level, [`MemorySink`] retains events for assertions, and
//! the `jsonl` feature adds a line-oriented file sink.
//!
//! Levels follow the severity of what happened, not of what the caller did:
//! a rejected call is a caller mistake (`Warn`), a fault inside the wrapped
//! subsystem is unexpected (`Error`), and a thread without the capability
//! is an environment condition (`Info`).

use std::cell::RefCell;

use treewatch_core::{NodeRef, ObserveError, ObserveOptions};

/// Severity of a guard diagnostic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum DiagLevel {
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for DiagLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        })
    }
}

/// The guarded operation a diagnostic refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GuardedOp {
    Observe,
    Disconnect,
    TakeRecords,
}

impl std::fmt::Display for GuardedOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Observe => "observe",
            Self::Disconnect => "disconnect",
            Self::TakeRecords => "take_records",
        })
    }
}

/// One refused call or contained fault.
#[derive(Clone, Debug, PartialEq)]
pub enum Diagnostic {
    /// `observe` was called without a target.
    MissingTarget,
    /// `observe` was called with a handle that no longer resolves.
    InvalidTarget {
        /// The stale handle, for context.
        target: NodeRef,
    },
    /// `observe` was called without options.
    MissingOptions,
    /// The wrapped subsystem reported a fault; it was contained here.
    UnderlyingFault {
        op: GuardedOp,
        fault: ObserveError,
        /// Target of the call, when the operation had one.
        target: Option<NodeRef>,
        /// Options of the call, when the operation had some.
        options: Option<ObserveOptions>,
    },
    /// No observation capability is registered on this thread.
    PlatformUnavailable,
}

impl Diagnostic {
    /// Severity this diagnostic is reported at.
    #[must_use]
    pub fn level(&self) -> DiagLevel {
        match self {
            Self::MissingTarget | Self::InvalidTarget { .. } | Self::MissingOptions => {
                DiagLevel::Warn
            }
            Self::UnderlyingFault { .. } => DiagLevel::Error,
            Self::PlatformUnavailable => DiagLevel::Info,
        }
    }

    /// The operation the diagnostic refers to.
    #[must_use]
    pub fn op(&self) -> GuardedOp {
        match self {
            Self::MissingTarget
            | Self::InvalidTarget { .. }
            | Self::MissingOptions
            | Self::PlatformUnavailable => GuardedOp::Observe,
            Self::UnderlyingFault { op, .. } => *op,
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingTarget => f.write_str("observe skipped: no target provided"),
            Self::InvalidTarget { target } => {
                write!(f, "observe skipped: {target:?} is not a live node")
            }
            Self::MissingOptions => f.write_str("observe skipped: no options provided"),
            Self::UnderlyingFault { op, fault, target, .. } => {
                write!(f, "{op} failed: {fault}")?;
                if let Some(target) = target {
                    write!(f, " (target {target:?})")?;
                }
                Ok(())
            }
            Self::PlatformUnavailable => {
                f.write_str("observation unavailable: no capability registered on this thread")
            }
        }
    }
}

/// Where guard diagnostics go.
pub trait DiagnosticSink {
    fn emit(&self, diagnostic: &Diagnostic);
}

/// Forwards each diagnostic to `tracing` at its level.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn emit(&self, diagnostic: &Diagnostic) {
        match diagnostic.level() {
            DiagLevel::Info => tracing::info!(%diagnostic, "guard diagnostic"),
            DiagLevel::Warn => tracing::warn!(%diagnostic, "guard diagnostic"),
            DiagLevel::Error => tracing::error!(%diagnostic, "guard diagnostic"),
        }
    }
}

/// Retains every diagnostic in emission order. For assertions.
#[derive(Debug, Default)]
pub struct MemorySink {
    seen: RefCell<Vec<Diagnostic>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything emitted so far.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Diagnostic> {
        self.seen.borrow().clone()
    }

    /// Drain everything emitted so far.
    pub fn take(&self) -> Vec<Diagnostic> {
        std::mem::take(&mut *self.seen.borrow_mut())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.borrow().is_empty()
    }
}

impl DiagnosticSink for MemorySink {
    fn emit(&self, diagnostic: &Diagnostic) {
        self.seen.borrow_mut().push(diagnostic.clone());
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use treewatch_core::Document;

    use super::*;

    #[test]
    fn levels_match_severity() {
        assert_eq!(Diagnostic::MissingTarget.level(), DiagLevel::Warn);
        assert_eq!(Diagnostic::MissingOptions.level(), DiagLevel::Warn);
        assert_eq!(Diagnostic::PlatformUnavailable.level(), DiagLevel::Info);
        let fault = Diagnostic::UnderlyingFault {
            op: GuardedOp::TakeRecords,
            fault: ObserveError::Failure("boom".into()),
            target: None,
            options: None,
        };
        assert_eq!(fault.level(), DiagLevel::Error);
    }

    #[test]
    fn display_names_the_operation_and_fault() {
        let fault = Diagnostic::UnderlyingFault {
            op: GuardedOp::Disconnect,
            fault: ObserveError::Failure("boom".into()),
            target: None,
            options: None,
        };
        assert_eq!(fault.to_string(), "disconnect failed: observer failure: boom");
    }

    #[test]
    fn display_includes_the_stale_target() {
        let doc = Document::new();
        let node = doc.root().append_child("panel").unwrap();
        assert!(node.remove());
        let text = Diagnostic::InvalidTarget { target: node }.to_string();
        assert!(text.starts_with("observe skipped:"), "{text}");
        assert!(text.contains("stale"), "{text}");
    }

    #[test]
    fn memory_sink_retains_in_order() {
        let sink = MemorySink::new();
        assert!(sink.is_empty());
        sink.emit(&Diagnostic::MissingTarget);
        sink.emit(&Diagnostic::MissingOptions);
        assert_eq!(sink.len(), 2);
        assert_eq!(
            sink.take(),
            vec![Diagnostic::MissingTarget, Diagnostic::MissingOptions]
        );
        assert!(sink.is_empty());
    }
}
