#![forbid(unsafe_code)]

//! The change-notification subsystem: the [`Observer`] contract and its
//! in-process implementation, [`TreeObserver`].
//!
//! # Design
//!
//! [`Observer`] is the three-operation capability surface shared by the real
//! subsystem, guarded wrappers in front of it, and test doubles:
//! register-to-watch (`observe`), stop-watching (`disconnect`), and
//! drain-pending-records (`take_records`). Faults travel as
//! [`ObserveError`] values; the raw subsystem returns them to the caller,
//! wrappers are free to contain them.
//!
//! A [`TreeObserver`] binds one callback for its whole lifetime. Mutations
//! on observed nodes queue [`MutationRecord`]s synchronously; the callback
//! runs later, when the host pumps [`Document::deliver_pending`], with the
//! whole batch. `take_records` hands the pending batch to the caller
//! instead, leaving the queue empty.
//!
//! The callback receives only the record slice. The platform this models
//! also passes the observer itself as a second argument; in Rust the closure
//! can capture a clone of the handle, so the extra parameter would be
//! redundant.
//!
//! # Failure Modes
//!
//! - **Callback capture cycle**: a callback that captures its own
//!   [`TreeObserver`] clone keeps the observer alive forever (`Rc` cycle
//!   through the stored callback). Capture an outer handle or data instead.
//! - **Raw misuse**: `observe` with a missing or dead target, or options
//!   that watch nothing, returns `Err`. Callers who want those converted to
//!   logged no-ops should go through a guarded wrapper.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::document::{DocInner, Document, NodeId, NodeRef};
use crate::options::ObserveOptions;
use crate::record::MutationRecord;

/// Callback invoked with each delivered batch of records.
pub type MutationCallback = Box<dyn Fn(&[MutationRecord])>;

/// Faults raised by a change-notification subsystem.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ObserveError {
    /// No target was supplied.
    MissingTarget,
    /// No options were supplied.
    MissingOptions,
    /// The target does not resolve to a live node in its document.
    DeadNode {
        /// The handle that failed to resolve.
        id: NodeId,
    },
    /// The options watch no change kind at all.
    NoWatchKinds,
    /// `attribute_old_value` set while `attributes` is explicitly `false`.
    OldValueWithoutAttributes,
    /// `attribute_filter` set while `attributes` is explicitly `false`.
    AttributeFilterWithoutAttributes,
    /// `character_data_old_value` set while `character_data` is explicitly
    /// `false`.
    OldValueWithoutCharacterData,
    /// Implementation-defined failure (test doubles, exotic platforms).
    Failure(String),
}

impl std::fmt::Display for ObserveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingTarget => f.write_str("target is missing"),
            Self::MissingOptions => f.write_str("options are missing"),
            Self::DeadNode { id } => {
                write!(f, "target {id} is not a live node in its document")
            }
            Self::NoWatchKinds => f.write_str(
                "options watch nothing: enable child_list, attributes, or character_data",
            ),
            Self::OldValueWithoutAttributes => {
                f.write_str("attribute_old_value requires attributes")
            }
            Self::AttributeFilterWithoutAttributes => {
                f.write_str("attribute_filter requires attributes")
            }
            Self::OldValueWithoutCharacterData => {
                f.write_str("character_data_old_value requires character_data")
            }
            Self::Failure(msg) => write!(f, "observer failure: {msg}"),
        }
    }
}

impl std::error::Error for ObserveError {}

/// The three-operation observation contract.
///
/// Implemented by the real subsystem ([`TreeObserver`]), by guarded wrappers
/// in front of it, and by test doubles. Code written against this trait
/// works unmodified through a wrapper.
pub trait Observer {
    /// Register to watch `target` for the changes described by `options`.
    ///
    /// Re-observing a target already watched by this observer replaces the
    /// stored options. Both arguments are optional at the signature level
    /// because the platform surface this mirrors admits absent arguments;
    /// the raw subsystem faults on `None`.
    fn observe(
        &self,
        target: Option<&NodeRef>,
        options: Option<&ObserveOptions>,
    ) -> Result<(), ObserveError>;

    /// Stop watching everywhere and drop any pending records.
    ///
    /// Idempotent: disconnecting an observer that never registered, or
    /// disconnecting twice, is not a fault.
    fn disconnect(&self) -> Result<(), ObserveError>;

    /// Drain and return the pending records without invoking the callback.
    fn take_records(&self) -> Result<Vec<MutationRecord>, ObserveError>;
}

/// Shared interior of a [`TreeObserver`].
///
/// Documents hold these weakly, so a dropped observer's registrations can
/// be pruned lazily. The queue and the registration bookkeeping live behind
/// their own `RefCell`s so record queuing never contends with a document
/// borrow.
pub(crate) struct ObserverCore {
    callback: MutationCallback,
    queue: RefCell<Vec<MutationRecord>>,
    /// Where this observer registered, for disconnect. Pruned lazily.
    registrations: RefCell<Vec<(Weak<RefCell<DocInner>>, NodeId)>>,
}

impl ObserverCore {
    fn new(callback: MutationCallback) -> Self {
        Self {
            callback,
            queue: RefCell::new(Vec::new()),
            registrations: RefCell::new(Vec::new()),
        }
    }

    pub(crate) fn enqueue(&self, record: MutationRecord) {
        self.queue.borrow_mut().push(record);
    }

    pub(crate) fn pending_len(&self) -> usize {
        self.queue.borrow().len()
    }

    /// Drain the queue without invoking the callback.
    pub(crate) fn take(&self) -> Vec<MutationRecord> {
        std::mem::take(&mut *self.queue.borrow_mut())
    }

    /// Drain the queue and invoke the callback with the batch.
    ///
    /// The queue is emptied *before* the callback runs, so `take_records`
    /// from inside the callback sees an empty queue, and records queued by
    /// re-entrant mutations stay pending for the next delivery.
    pub(crate) fn deliver(&self) -> usize {
        let records = self.take();
        if records.is_empty() {
            return 0;
        }
        (self.callback)(&records);
        records.len()
    }

    pub(crate) fn note_registration(&self, document: Weak<RefCell<DocInner>>, id: NodeId) {
        let mut registrations = self.registrations.borrow_mut();
        registrations.retain(|(doc, _)| doc.strong_count() > 0);
        let known = registrations
            .iter()
            .any(|(doc, node)| *node == id && doc.ptr_eq(&document));
        if !known {
            registrations.push((document, id));
        }
    }
}

/// The in-process change-notification subsystem instance.
///
/// Cloning shares the same interior: both handles drain the same queue and
/// disconnect the same registrations.
pub struct TreeObserver {
    core: Rc<ObserverCore>,
}

impl Clone for TreeObserver {
    fn clone(&self) -> Self {
        Self {
            core: Rc::clone(&self.core),
        }
    }
}

impl std::fmt::Debug for TreeObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeObserver")
            .field("pending", &self.core.pending_len())
            .finish_non_exhaustive()
    }
}

impl TreeObserver {
    /// Bind `callback` to a new observer. The callback is invoked with each
    /// delivered batch for the observer's whole lifetime.
    #[must_use]
    pub fn new(callback: impl Fn(&[MutationRecord]) + 'static) -> Self {
        Self {
            core: Rc::new(ObserverCore::new(Box::new(callback))),
        }
    }

    /// Number of records queued and not yet delivered or drained.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.core.pending_len()
    }
}

/// Construct a boxed [`TreeObserver`].
///
/// This free function has the platform-constructor shape
/// ([`crate::platform::ObserverCtor`]), so hosts can register the real
/// subsystem with `platform::provide(tree_observer)`.
#[must_use]
pub fn tree_observer(callback: MutationCallback) -> Box<dyn Observer> {
    Box::new(TreeObserver {
        core: Rc::new(ObserverCore::new(callback)),
    })
}

impl Observer for TreeObserver {
    fn observe(
        &self,
        target: Option<&NodeRef>,
        options: Option<&ObserveOptions>,
    ) -> Result<(), ObserveError> {
        let target = target.ok_or(ObserveError::MissingTarget)?;
        let options = options.ok_or(ObserveError::MissingOptions)?;
        let resolved = options.normalize()?;
        target.document().register(&self.core, target.id(), resolved)
    }

    fn disconnect(&self) -> Result<(), ObserveError> {
        let documents: Vec<Rc<RefCell<DocInner>>> = {
            let mut registrations = self.core.registrations.borrow_mut();
            let docs = registrations
                .iter()
                .filter_map(|(doc, _)| doc.upgrade())
                .collect();
            registrations.clear();
            docs
        };
        // The same document appears once per registered node; sweep each
        // document once.
        let mut seen: Vec<Rc<RefCell<DocInner>>> = Vec::new();
        for doc in documents {
            if !seen.iter().any(|d| Rc::ptr_eq(d, &doc)) {
                seen.push(doc);
            }
        }
        for doc in seen {
            Document::from_inner(doc).deregister(&self.core);
        }
        self.core.queue.borrow_mut().clear();
        Ok(())
    }

    fn take_records(&self) -> Result<Vec<MutationRecord>, ObserveError> {
        Ok(self.core.take())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::document::Document;
    use crate::platform::ObserverCtor;

    #[test]
    fn observe_without_target_faults() {
        let observer = TreeObserver::new(|_| {});
        let options = ObserveOptions::new().child_list(true);
        assert_eq!(
            observer.observe(None, Some(&options)),
            Err(ObserveError::MissingTarget)
        );
    }

    #[test]
    fn observe_without_options_faults() {
        let doc = Document::new();
        let observer = TreeObserver::new(|_| {});
        assert_eq!(
            observer.observe(Some(&doc.root()), None),
            Err(ObserveError::MissingOptions)
        );
    }

    #[test]
    fn observe_with_empty_options_faults() {
        let doc = Document::new();
        let observer = TreeObserver::new(|_| {});
        let options = ObserveOptions::new();
        assert_eq!(
            observer.observe(Some(&doc.root()), Some(&options)),
            Err(ObserveError::NoWatchKinds)
        );
    }

    #[test]
    fn observe_dead_node_faults() {
        let doc = Document::new();
        let child = doc.root().append_child("panel").unwrap();
        assert!(child.remove());

        let observer = TreeObserver::new(|_| {});
        let options = ObserveOptions::new().child_list(true);
        assert_eq!(
            observer.observe(Some(&child), Some(&options)),
            Err(ObserveError::DeadNode { id: child.id() })
        );
    }

    #[test]
    fn disconnect_is_idempotent_even_unregistered() {
        let observer = TreeObserver::new(|_| {});
        assert_eq!(observer.disconnect(), Ok(()));
        assert_eq!(observer.disconnect(), Ok(()));
    }

    #[test]
    fn take_records_on_fresh_observer_is_empty() {
        let observer = TreeObserver::new(|_| {});
        assert_eq!(observer.take_records(), Ok(Vec::new()));
    }

    #[test]
    fn clone_shares_the_queue() {
        let doc = Document::new();
        let observer = TreeObserver::new(|_| {});
        let options = ObserveOptions::new().child_list(true);
        observer
            .observe(Some(&doc.root()), Some(&options))
            .unwrap();

        doc.root().append_child("panel").unwrap();
        let twin = observer.clone();
        assert_eq!(twin.pending_len(), 1);
        assert_eq!(twin.take_records().unwrap().len(), 1);
        assert_eq!(observer.pending_len(), 0);
    }

    #[test]
    fn callback_can_capture_a_counter() {
        let doc = Document::new();
        let seen = Rc::new(Cell::new(0usize));
        let seen_in_callback = Rc::clone(&seen);
        let observer = TreeObserver::new(move |records| {
            seen_in_callback.set(seen_in_callback.get() + records.len());
        });
        let options = ObserveOptions::new().child_list(true);
        observer
            .observe(Some(&doc.root()), Some(&options))
            .unwrap();

        doc.root().append_child("a").unwrap();
        doc.root().append_child("b").unwrap();
        assert_eq!(seen.get(), 0); // queued, not yet delivered
        assert_eq!(doc.deliver_pending(), 2);
        assert_eq!(seen.get(), 2);
    }

    #[test]
    fn tree_observer_fits_the_platform_constructor_shape() {
        let ctor: ObserverCtor = tree_observer;
        let doc = Document::new();
        let boxed = ctor(Box::new(|_| {}));
        let options = ObserveOptions::new().child_list(true);
        assert_eq!(boxed.observe(Some(&doc.root()), Some(&options)), Ok(()));
    }
}
