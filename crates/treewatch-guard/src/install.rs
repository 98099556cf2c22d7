#![forbid(unsafe_code)]

//! Opt-in installation of the guarded capability.
//!
//! Installation hands the caller a [`GuardedFactory`] instead of swapping
//! anything behind the platform registry's back. Code that wants guarded
//! observers asks the factory; code that wants the raw capability keeps
//! using [`platform::constructor`] and is unaffected. The registry is never
//! mutated here.
//!
//! The first successful install per thread is memoized. Later calls get
//! the same factory back, sink argument ignored, so every guarded observer
//! on a thread reports through one sink no matter which module asked last.
//! An install on a thread with no capability emits one info diagnostic and
//! is *not* memoized; providing the capability later and installing again
//! succeeds.

use std::cell::RefCell;
use std::rc::Rc;

use treewatch_core::MutationRecord;
use treewatch_core::platform::{self, ObserverCtor};

use crate::diagnostic::{Diagnostic, DiagnosticSink, TracingSink};
use crate::guard::GuardedObserver;

/// Produces guarded observers bound to one diagnostic sink.
///
/// Cloning is cheap and clones share the sink.
pub struct GuardedFactory {
    ctor: ObserverCtor,
    sink: Rc<dyn DiagnosticSink>,
}

impl Clone for GuardedFactory {
    fn clone(&self) -> Self {
        Self {
            ctor: self.ctor,
            sink: Rc::clone(&self.sink),
        }
    }
}

impl std::fmt::Debug for GuardedFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardedFactory").finish_non_exhaustive()
    }
}

impl GuardedFactory {
    /// A guarded observer delivering batches to `callback`.
    #[must_use]
    pub fn observer(&self, callback: impl Fn(&[MutationRecord]) + 'static) -> GuardedObserver {
        GuardedObserver::with_sink((self.ctor)(Box::new(callback)), Rc::clone(&self.sink))
    }
}

thread_local! {
    static INSTALLED: RefCell<Option<GuardedFactory>> = const { RefCell::new(None) };
}

/// Guarded factory over this thread's observation capability, reporting
/// diagnostics to `sink`.
///
/// Returns `None` (after an info diagnostic to `sink`) when the thread has
/// no capability registered. The diagnostic is emitted with no internal
/// state borrowed, so a sink's `emit` may call back into this function.
/// See the module docs for the memoization rules.
pub fn install_with_sink(sink: Rc<dyn DiagnosticSink>) -> Option<GuardedFactory> {
    if let Some(factory) = INSTALLED.with(|slot| slot.borrow().clone()) {
        return Some(factory);
    }
    let Some(ctor) = platform::constructor() else {
        // No slot borrow is held here; the sink may re-enter install.
        sink.emit(&Diagnostic::PlatformUnavailable);
        return None;
    };
    let factory = GuardedFactory { ctor, sink };
    INSTALLED.with(|slot| *slot.borrow_mut() = Some(factory.clone()));
    tracing::debug!("guarded observer factory installed");
    Some(factory)
}

/// [`install_with_sink`] reporting through `tracing`.
pub fn install() -> Option<GuardedFactory> {
    install_with_sink(Rc::new(TracingSink))
}
