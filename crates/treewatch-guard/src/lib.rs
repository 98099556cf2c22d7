#![forbid(unsafe_code)]

//! Guard: defensive wrapper around the treewatch observation capability.
//!
//! # Role in treewatch
//! `treewatch-guard` stands between application code and the
//! change-notification subsystem in `treewatch-core`. Application code in
//! long-lived hosts must keep running when observation misbehaves; this
//! crate converts caller mistakes and subsystem faults alike into
//! diagnostics instead of raised errors.
//!
//! # Primary responsibilities
//! - **GuardedObserver**: validate-then-forward wrapper whose operations
//!   never raise; rejected calls never reach the subsystem.
//! - **Diagnostics**: every refusal and contained fault becomes one
//!   [`Diagnostic`] on an injected [`DiagnosticSink`] (`tracing`, memory,
//!   or JSONL behind the `jsonl` feature).
//! - **install**: explicit opt-in wiring of the guard over the thread's
//!   platform capability, memoized per thread, never mutating the
//!   registry.
//!
//! # How it fits in the system
//! Hosts call [`treewatch_core::platform::provide`] once, then [`install`]
//! (or [`install_with_sink`]) to obtain a [`GuardedFactory`]. Everything
//! the factory produces upholds the no-raise promise; everything it
//! refuses or contains is visible on the sink.

pub mod diagnostic;
pub mod guard;
pub mod install;

#[cfg(feature = "jsonl")]
pub mod jsonl;

pub use diagnostic::{DiagLevel, Diagnostic, DiagnosticSink, GuardedOp, MemorySink, TracingSink};
pub use guard::GuardedObserver;
pub use install::{GuardedFactory, install, install_with_sink};

#[cfg(feature = "jsonl")]
pub use jsonl::{JsonlConfig, JsonlDestination, JsonlSink};
