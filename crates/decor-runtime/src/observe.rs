//! Uniform `observe()` entry point.
//!
//! Targets with their own observation capability ([`Stateful`]) handle the
//! registration themselves; plain property bags ([`Pojo`]) get a property
//! watcher feeding a [`Notifier`]. Either way the caller gets an
//! [`ObserveHandle`] and a callback receiving [`OldValues`].

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use decor_core::CallbackOutcome;

use crate::notifier::{Notifier, OldValues, PropertyCallback, property_callback};
use crate::pojo::Pojo;
use crate::stateful::Stateful;

/// Anything that can report batched property changes.
pub trait Observe {
    fn observe_boxed(&self, callback: PropertyCallback) -> ObserveHandle;
}

impl Observe for Stateful {
    fn observe_boxed(&self, callback: PropertyCallback) -> ObserveHandle {
        self.observe_with(callback)
    }
}

impl Observe for Pojo {
    fn observe_boxed(&self, callback: PropertyCallback) -> ObserveHandle {
        self.observe_with(callback)
    }
}

impl<T: Observe + ?Sized> Observe for &T {
    fn observe_boxed(&self, callback: PropertyCallback) -> ObserveHandle {
        (**self).observe_boxed(callback)
    }
}

/// Observe `target`, receiving the changed properties' old values once per
/// checkpoint.
pub fn observe<T, F, R>(target: &T, callback: F) -> ObserveHandle
where
    T: Observe + ?Sized,
    F: Fn(&OldValues) -> R + 'static,
    R: CallbackOutcome,
{
    target.observe_boxed(property_callback(callback))
}

type Detach = Box<dyn FnOnce()>;

struct HandleInner {
    notifier: Notifier,
    detach: RefCell<Option<Detach>>,
}

/// Registration handle returned by [`observe`].
///
/// Dropping the handle does **not** stop observation; call
/// [`remove`](Self::remove).
#[derive(Clone)]
pub struct ObserveHandle {
    inner: Rc<HandleInner>,
}

impl fmt::Debug for ObserveHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserveHandle")
            .field("notifier", &self.inner.notifier)
            .field("removed", &self.is_removed())
            .finish()
    }
}

impl ObserveHandle {
    pub(crate) fn new(notifier: Notifier, detach: impl FnOnce() + 'static) -> Self {
        Self {
            inner: Rc::new(HandleInner {
                notifier,
                detach: RefCell::new(Some(Box::new(detach))),
            }),
        }
    }

    /// Deliver this registration's pending changes synchronously.
    pub fn deliver(&self) {
        self.inner.notifier.deliver();
    }

    /// Drop this registration's pending changes.
    pub fn discard_changes(&self) {
        self.inner.notifier.discard_changes();
    }

    /// Stop observing. Pending changes are discarded. Idempotent.
    pub fn remove(&self) {
        let detach = self.inner.detach.borrow_mut().take();
        if let Some(detach) = detach {
            self.inner.notifier.discard_changes();
            detach();
        }
    }

    #[must_use]
    pub fn is_removed(&self) -> bool {
        self.inner.detach.borrow().is_none()
    }

    #[must_use]
    pub fn notifier(&self) -> &Notifier {
        &self.inner.notifier
    }
}
