#![forbid(unsafe_code)]

//! Thread-local registry of the observation capability.
//!
//! Hosts opt in explicitly: nothing registers the real subsystem behind the
//! caller's back. A host that wants observation available calls
//! [`provide`] once per thread, typically with
//! [`tree_observer`](crate::observer::tree_observer); consumers then reach
//! the capability through [`constructor`] or check for it with
//! [`is_supported`]. A thread that never provides stays unsupported, which
//! is a state consumers are expected to handle.
//!
//! # Invariants
//!
//! - [`provide`] is first-write-wins; a registered constructor is never
//!   silently replaced.
//! - [`override_constructor`] is the only way to swap or clear the
//!   registration, and it restores the previous state when its guard drops,
//!   LIFO under nesting.
//! - The registry is per-thread, so the test harness's thread-per-test
//!   model isolates tests without any reset fixture.

use std::cell::Cell;

use crate::observer::{MutationCallback, Observer};

/// Constructor shape for the platform's observation capability.
pub type ObserverCtor = fn(MutationCallback) -> Box<dyn Observer>;

thread_local! {
    static CONSTRUCTOR: Cell<Option<ObserverCtor>> = const { Cell::new(None) };
}

/// Register `ctor` as this thread's observation capability.
///
/// First write wins: when a constructor is already registered this changes
/// nothing and returns `false`.
pub fn provide(ctor: ObserverCtor) -> bool {
    CONSTRUCTOR.with(|slot| {
        if slot.get().is_some() {
            tracing::debug!("observation capability already provided, keeping the first");
            return false;
        }
        slot.set(Some(ctor));
        true
    })
}

/// This thread's registered constructor, if any.
#[must_use]
pub fn constructor() -> Option<ObserverCtor> {
    CONSTRUCTOR.with(Cell::get)
}

/// Whether this thread has an observation capability registered.
#[must_use]
pub fn is_supported() -> bool {
    constructor().is_some()
}

/// Restores the previously registered constructor when dropped.
#[must_use = "dropping the guard restores the previous constructor"]
pub struct PlatformOverrideGuard {
    previous: Option<ObserverCtor>,
}

impl std::fmt::Debug for PlatformOverrideGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformOverrideGuard")
            .field("had_previous", &self.previous.is_some())
            .finish()
    }
}

/// Swap the registration to `ctor` (or clear it with `None`) until the
/// returned guard drops.
///
/// Bypasses the first-write-wins rule: this is the seam tests and embedders
/// use to model unsupported or faulty platforms.
pub fn override_constructor(ctor: Option<ObserverCtor>) -> PlatformOverrideGuard {
    let previous = CONSTRUCTOR.with(|slot| slot.replace(ctor));
    PlatformOverrideGuard { previous }
}

impl Drop for PlatformOverrideGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CONSTRUCTOR.with(|slot| slot.set(previous));
    }
}

/// Run `f` with the registration swapped to `ctor`, restoring afterwards.
pub fn with_constructor<T>(ctor: Option<ObserverCtor>, f: impl FnOnce() -> T) -> T {
    let _guard = override_constructor(ctor);
    f()
}
