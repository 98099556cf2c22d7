#![forbid(unsafe_code)]

//! Core: document tree, observation options, mutation records, and the
//! change-notification subsystem.
//!
//! # Role in treewatch
//! `treewatch-core` is the substrate layer. It owns the arena-backed
//! [`Document`] tree, the [`Observer`] capability contract, and the real
//! in-process subsystem ([`TreeObserver`]) that queues [`MutationRecord`]s
//! as the tree changes.
//!
//! # Primary responsibilities
//! - **Document / NodeRef**: generation-tagged tree with stale-handle
//!   detection and synchronous record queuing on mutation.
//! - **ObserveOptions**: watch descriptions with platform defaulting and
//!   contradiction checks ([`ObserveOptions::normalize`]).
//! - **Observer**: the three-operation contract (observe, disconnect,
//!   take_records) shared by the subsystem, wrappers, and test doubles.
//! - **platform**: thread-local opt-in registry of the observation
//!   capability, with an RAII override seam for tests.
//!
//! # How it fits in the system
//! The guard layer (`treewatch-guard`) wraps a boxed [`Observer`] obtained
//! through [`platform`] and converts every fault this crate reports into a
//! logged no-op. Everything here is single-threaded; handles are
//! `Rc`-shared and none of the types are `Send`.

pub mod document;
pub mod observer;
pub mod options;
pub mod platform;
pub mod record;

pub use document::{Document, NodeId, NodeRef};
pub use observer::{MutationCallback, ObserveError, Observer, TreeObserver, tree_observer};
pub use options::{ObserveOptions, ResolvedOptions};
pub use record::{MutationKind, MutationRecord};
