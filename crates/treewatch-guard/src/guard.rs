#![forbid(unsafe_code)]

//! The guarded wrapper: validate, forward, contain.
//!
//! [`GuardedObserver`] stands between callers and a wrapped [`Observer`]
//! and upholds one promise: no call through the guard ever raises. Each
//! operation runs in two phases:
//!
//! 1. **Vet.** Arguments are checked before the subsystem is touched. A
//!    rejected call emits one warn-level [`Diagnostic`] and stops; the
//!    wrapped observer never sees it.
//! 2. **Forward and contain.** A vetted call is forwarded. If the wrapped
//!    subsystem faults anyway, the fault is converted into one error-level
//!    diagnostic carrying the operation, the fault, and the call's
//!    arguments, and execution continues.
//!
//! Failure returns are asymmetric: `observe` and `disconnect` return
//! nothing either way, while `take_records` always hands back a `Vec`,
//! empty on containment, so downstream iteration code never needs a null
//! check.
//!
//! # Invariants
//!
//! - A rejected call never reaches the wrapped observer.
//! - Exactly one diagnostic per rejected or contained call, none for a
//!   clean one.
//! - The guard holds no state beyond the wrapped observer and the sink;
//!   dropping it drops the wrapped observer.

use std::rc::Rc;

use treewatch_core::{MutationRecord, NodeRef, ObserveError, ObserveOptions, Observer};

use crate::diagnostic::{Diagnostic, DiagnosticSink, GuardedOp, TracingSink};

/// Defensive wrapper around any [`Observer`].
///
/// The inherent methods are the primary surface and never raise. The
/// [`Observer`] impl lets a guard slot into code written against the trait;
/// through it every operation reports `Ok`, because containment already
/// happened.
pub struct GuardedObserver {
    inner: Box<dyn Observer>,
    sink: Rc<dyn DiagnosticSink>,
}

impl std::fmt::Debug for GuardedObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardedObserver").finish_non_exhaustive()
    }
}

impl GuardedObserver {
    /// Wrap `inner`, reporting diagnostics through `tracing`.
    #[must_use]
    pub fn new(inner: Box<dyn Observer>) -> Self {
        Self::with_sink(inner, Rc::new(TracingSink))
    }

    /// Wrap `inner`, reporting diagnostics to `sink`.
    #[must_use]
    pub fn with_sink(inner: Box<dyn Observer>, sink: Rc<dyn DiagnosticSink>) -> Self {
        Self { inner, sink }
    }

    /// Register to watch `target`. Refused calls and subsystem faults
    /// become diagnostics; nothing is raised either way.
    pub fn observe(&self, target: Option<&NodeRef>, options: Option<&ObserveOptions>) {
        self.run_observe(target, options);
    }

    /// Stop watching everywhere. Subsystem faults become diagnostics.
    pub fn disconnect(&self) {
        self.run_disconnect();
    }

    /// Drain pending records. On a subsystem fault the fault becomes a
    /// diagnostic and the result is an empty `Vec`.
    #[must_use]
    pub fn take_records(&self) -> Vec<MutationRecord> {
        self.run_take_records()
    }

    /// Argument checks, in the order callers tend to get them wrong:
    /// target present, target live, options present.
    fn vet_observe(
        &self,
        target: Option<&NodeRef>,
        options: Option<&ObserveOptions>,
    ) -> Result<(), Diagnostic> {
        let Some(target) = target else {
            return Err(Diagnostic::MissingTarget);
        };
        if !target.is_valid() {
            return Err(Diagnostic::InvalidTarget {
                target: target.clone(),
            });
        }
        if options.is_none() {
            return Err(Diagnostic::MissingOptions);
        }
        Ok(())
    }

    fn run_observe(&self, target: Option<&NodeRef>, options: Option<&ObserveOptions>) {
        if let Err(diagnostic) = self.vet_observe(target, options) {
            self.sink.emit(&diagnostic);
            return;
        }
        if let Err(fault) = self.inner.observe(target, options) {
            self.sink.emit(&Diagnostic::UnderlyingFault {
                op: GuardedOp::Observe,
                fault,
                target: target.cloned(),
                options: options.cloned(),
            });
        }
    }

    fn run_disconnect(&self) {
        if let Err(fault) = self.inner.disconnect() {
            self.sink.emit(&Diagnostic::UnderlyingFault {
                op: GuardedOp::Disconnect,
                fault,
                target: None,
                options: None,
            });
        }
    }

    fn run_take_records(&self) -> Vec<MutationRecord> {
        match self.inner.take_records() {
            Ok(records) => records,
            Err(fault) => {
                self.sink.emit(&Diagnostic::UnderlyingFault {
                    op: GuardedOp::TakeRecords,
                    fault,
                    target: None,
                    options: None,
                });
                Vec::new()
            }
        }
    }
}

impl Observer for GuardedObserver {
    fn observe(
        &self,
        target: Option<&NodeRef>,
        options: Option<&ObserveOptions>,
    ) -> Result<(), ObserveError> {
        self.run_observe(target, options);
        Ok(())
    }

    fn disconnect(&self) -> Result<(), ObserveError> {
        self.run_disconnect();
        Ok(())
    }

    fn take_records(&self) -> Result<Vec<MutationRecord>, ObserveError> {
        Ok(self.run_take_records())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use pretty_assertions::assert_eq;
    use treewatch_core::Document;

    use super::*;
    use crate::diagnostic::MemorySink;

    #[derive(Debug, Default)]
    struct CallLog {
        observes: Cell<usize>,
        disconnects: Cell<usize>,
        takes: Cell<usize>,
    }

    /// Records how often each operation reached it; always succeeds.
    struct CountingObserver {
        log: Rc<CallLog>,
    }

    impl Observer for CountingObserver {
        fn observe(
            &self,
            _target: Option<&NodeRef>,
            _options: Option<&ObserveOptions>,
        ) -> Result<(), ObserveError> {
            self.log.observes.set(self.log.observes.get() + 1);
            Ok(())
        }

        fn disconnect(&self) -> Result<(), ObserveError> {
            self.log.disconnects.set(self.log.disconnects.get() + 1);
            Ok(())
        }

        fn take_records(&self) -> Result<Vec<MutationRecord>, ObserveError> {
            self.log.takes.set(self.log.takes.get() + 1);
            Ok(Vec::new())
        }
    }

    /// Faults on every operation.
    struct FailingObserver;

    impl Observer for FailingObserver {
        fn observe(
            &self,
            _target: Option<&NodeRef>,
            _options: Option<&ObserveOptions>,
        ) -> Result<(), ObserveError> {
            Err(ObserveError::Failure("synthetic".into()))
        }

        fn disconnect(&self) -> Result<(), ObserveError> {
            Err(ObserveError::Failure("synthetic".into()))
        }

        fn take_records(&self) -> Result<Vec<MutationRecord>, ObserveError> {
            Err(ObserveError::Failure("synthetic".into()))
        }
    }

    fn counting_guard(sink: &Rc<MemorySink>) -> (GuardedObserver, Rc<CallLog>) {
        let log = Rc::new(CallLog::default());
        let guard = GuardedObserver::with_sink(
            Box::new(CountingObserver {
                log: Rc::clone(&log),
            }),
            Rc::clone(sink) as Rc<dyn DiagnosticSink>,
        );
        (guard, log)
    }

    fn failing_guard(sink: &Rc<MemorySink>) -> GuardedObserver {
        GuardedObserver::with_sink(
            Box::new(FailingObserver),
            Rc::clone(sink) as Rc<dyn DiagnosticSink>,
        )
    }

    #[test]
    fn missing_target_is_rejected_before_the_subsystem() {
        let sink = Rc::new(MemorySink::new());
        let (guard, log) = counting_guard(&sink);
        let options = ObserveOptions::new().child_list(true);

        guard.observe(None, Some(&options));

        assert_eq!(log.observes.get(), 0);
        assert_eq!(sink.take(), vec![Diagnostic::MissingTarget]);
    }

    #[test]
    fn stale_target_is_rejected_before_the_subsystem() {
        let sink = Rc::new(MemorySink::new());
        let (guard, log) = counting_guard(&sink);
        let doc = Document::new();
        let node = doc.root().append_child("panel").unwrap();
        assert!(node.remove());
        let options = ObserveOptions::new().child_list(true);

        guard.observe(Some(&node), Some(&options));

        assert_eq!(log.observes.get(), 0);
        assert_eq!(
            sink.take(),
            vec![Diagnostic::InvalidTarget { target: node }]
        );
    }

    #[test]
    fn missing_options_is_rejected_before_the_subsystem() {
        let sink = Rc::new(MemorySink::new());
        let (guard, log) = counting_guard(&sink);
        let doc = Document::new();

        guard.observe(Some(&doc.root()), None);

        assert_eq!(log.observes.get(), 0);
        assert_eq!(sink.take(), vec![Diagnostic::MissingOptions]);
    }

    #[test]
    fn target_presence_is_checked_before_options() {
        let sink = Rc::new(MemorySink::new());
        let (guard, _log) = counting_guard(&sink);

        guard.observe(None, None);

        assert_eq!(sink.take(), vec![Diagnostic::MissingTarget]);
    }

    #[test]
    fn vetted_calls_are_forwarded_silently() {
        let sink = Rc::new(MemorySink::new());
        let (guard, log) = counting_guard(&sink);
        let doc = Document::new();
        let options = ObserveOptions::new().child_list(true);

        guard.observe(Some(&doc.root()), Some(&options));
        guard.disconnect();
        let records = guard.take_records();

        assert_eq!(log.observes.get(), 1);
        assert_eq!(log.disconnects.get(), 1);
        assert_eq!(log.takes.get(), 1);
        assert!(records.is_empty());
        assert!(sink.is_empty());
    }

    #[test]
    fn observe_faults_are_contained_with_context() {
        let sink = Rc::new(MemorySink::new());
        let guard = failing_guard(&sink);
        let doc = Document::new();
        let options = ObserveOptions::new().child_list(true);

        guard.observe(Some(&doc.root()), Some(&options));

        let diagnostics = sink.take();
        assert_eq!(diagnostics.len(), 1);
        match &diagnostics[0] {
            Diagnostic::UnderlyingFault {
                op,
                fault,
                target,
                options: logged,
            } => {
                assert_eq!(*op, GuardedOp::Observe);
                assert_eq!(*fault, ObserveError::Failure("synthetic".into()));
                assert_eq!(target.as_ref(), Some(&doc.root()));
                assert_eq!(logged.as_ref(), Some(&options));
            }
            other => panic!("unexpected diagnostic {other:?}"),
        }
    }

    #[test]
    fn disconnect_faults_are_contained() {
        let sink = Rc::new(MemorySink::new());
        let guard = failing_guard(&sink);

        guard.disconnect();

        let diagnostics = sink.take();
        assert_eq!(diagnostics.len(), 1);
        assert!(matches!(
            &diagnostics[0],
            Diagnostic::UnderlyingFault {
                op: GuardedOp::Disconnect,
                ..
            }
        ));
    }

    #[test]
    fn take_records_faults_yield_an_empty_vec() {
        let sink = Rc::new(MemorySink::new());
        let guard = failing_guard(&sink);

        let records = guard.take_records();

        assert!(records.is_empty());
        assert!(matches!(
            &sink.take()[..],
            [Diagnostic::UnderlyingFault {
                op: GuardedOp::TakeRecords,
                ..
            }]
        ));
    }

    #[test]
    fn trait_surface_reports_ok_even_on_rejection() {
        let sink = Rc::new(MemorySink::new());
        let (guard, _log) = counting_guard(&sink);
        let boxed: Box<dyn Observer> = Box::new(guard);

        assert_eq!(boxed.observe(None, None), Ok(()));
        assert_eq!(boxed.disconnect(), Ok(()));
        assert_eq!(boxed.take_records(), Ok(Vec::new()));
        assert_eq!(sink.len(), 1); // only the rejected observe
    }

    #[test]
    fn each_failed_call_emits_exactly_one_diagnostic() {
        let sink = Rc::new(MemorySink::new());
        let guard = failing_guard(&sink);
        let doc = Document::new();
        let options = ObserveOptions::new().child_list(true);

        guard.observe(Some(&doc.root()), Some(&options));
        guard.disconnect();
        let _ = guard.take_records();

        assert_eq!(sink.len(), 3);
    }
}
