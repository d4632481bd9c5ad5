//! Ownership of disposable handles.
//!
//! A [`Lifecycle`] owns handles (observer registrations, scheduled tasks,
//! pending operations) and releases all of them once, in registration order,
//! when it is destroyed. Each handle's release capability is resolved when it
//! is registered, not when it is released.
//!
//! # Failure Modes
//!
//! - **No release capability**: [`Disposable::resolve`] and
//!   [`Lifecycle::own_capabilities`] return [`DecorError::NotDisposable`].
//! - **Double release**: destroying twice, or releasing a handle that was
//!   already released manually, is a silent no-op.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};

use decor_core::{CallbackOutcome, DecorError, Result, ScheduleHandle, schedule};

use crate::observe::ObserveHandle;
use crate::pojo::WatchHandle;

/// A pending operation that can be abandoned until it settles.
pub trait Settle {
    fn is_settled(&self) -> bool;
    fn cancel(&self);
}

type Release = Box<dyn FnOnce()>;

/// A handle's resolved release capability.
pub enum Disposable {
    Destroy(Release),
    Remove(Release),
    Cancel(Release),
    /// Released by cancelling, unless it already settled.
    Awaitable(Rc<dyn Settle>),
}

impl fmt::Debug for Disposable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Self::Destroy(_) => "Destroy",
            Self::Remove(_) => "Remove",
            Self::Cancel(_) => "Cancel",
            Self::Awaitable(_) => "Awaitable",
        };
        f.debug_tuple("Disposable").field(&kind).finish()
    }
}

/// The release methods a handle exposes. Used when the capability is only
/// known at run time.
#[derive(Default)]
pub struct Capabilities {
    pub destroy: Option<Release>,
    pub remove: Option<Release>,
    pub cancel: Option<Release>,
    pub awaitable: Option<Rc<dyn Settle>>,
}

impl Disposable {
    pub fn destroy(f: impl FnOnce() + 'static) -> Self {
        Self::Destroy(Box::new(f))
    }

    pub fn remove(f: impl FnOnce() + 'static) -> Self {
        Self::Remove(Box::new(f))
    }

    pub fn cancel(f: impl FnOnce() + 'static) -> Self {
        Self::Cancel(Box::new(f))
    }

    /// Pick the release capability: `destroy`, then `remove`, then `cancel`,
    /// then awaitable.
    pub fn resolve(capabilities: Capabilities) -> Result<Self> {
        let Capabilities {
            destroy,
            remove,
            cancel,
            awaitable,
        } = capabilities;
        if let Some(f) = destroy {
            Ok(Self::Destroy(f))
        } else if let Some(f) = remove {
            Ok(Self::Remove(f))
        } else if let Some(f) = cancel {
            Ok(Self::Cancel(f))
        } else if let Some(a) = awaitable {
            Ok(Self::Awaitable(a))
        } else {
            Err(DecorError::NotDisposable)
        }
    }

    fn release(self) {
        match self {
            Self::Destroy(f) | Self::Remove(f) | Self::Cancel(f) => f(),
            Self::Awaitable(a) => {
                if !a.is_settled() {
                    a.cancel();
                }
            }
        }
    }
}

/// Conversion into a [`Disposable`].
pub trait IntoDisposable {
    fn into_disposable(self) -> Disposable;
}

impl IntoDisposable for Disposable {
    fn into_disposable(self) -> Disposable {
        self
    }
}

impl IntoDisposable for ObserveHandle {
    fn into_disposable(self) -> Disposable {
        Disposable::remove(move || self.remove())
    }
}

impl IntoDisposable for WatchHandle {
    fn into_disposable(self) -> Disposable {
        Disposable::remove(move || self.remove())
    }
}

impl IntoDisposable for ScheduleHandle {
    fn into_disposable(self) -> Disposable {
        Disposable::remove(move || {
            self.remove();
        })
    }
}

impl IntoDisposable for DeferHandle {
    fn into_disposable(self) -> Disposable {
        Disposable::remove(move || self.remove())
    }
}

impl IntoDisposable for Lifecycle {
    fn into_disposable(self) -> Disposable {
        Disposable::destroy(move || self.destroy())
    }
}

#[derive(Default)]
struct LifecycleInner {
    handles: RefCell<BTreeMap<u64, Disposable>>,
    next_id: Cell<u64>,
    being_destroyed: Cell<bool>,
    destroyed: Cell<bool>,
}

/// Owner of disposable handles.
///
/// Cloning a `Lifecycle` creates a new handle to the **same** owner.
#[derive(Clone, Default)]
pub struct Lifecycle {
    inner: Rc<LifecycleInner>,
}

impl fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lifecycle")
            .field("owned", &self.owned_count())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

impl Lifecycle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of `handle`; it is released when this lifecycle is
    /// destroyed. Handles owned after destruction are released immediately.
    pub fn own(&self, handle: impl IntoDisposable) -> OwnedHandle {
        let disposable = handle.into_disposable();
        let id = self.inner.next_id.get();
        self.inner.next_id.set(id + 1);
        if self.inner.being_destroyed.get() {
            tracing::debug!(handle = id, "own() after destroy; releasing immediately");
            disposable.release();
        } else {
            self.inner.handles.borrow_mut().insert(id, disposable);
        }
        OwnedHandle {
            id,
            owner: Rc::downgrade(&self.inner),
        }
    }

    /// Own a handle whose capabilities are only known at run time.
    pub fn own_capabilities(&self, capabilities: Capabilities) -> Result<OwnedHandle> {
        Ok(self.own(Disposable::resolve(capabilities)?))
    }

    /// Release every owned handle, in registration order. Idempotent.
    pub fn destroy(&self) {
        if self.inner.being_destroyed.replace(true) {
            return;
        }
        loop {
            let next = self.inner.handles.borrow_mut().pop_first();
            let Some((_, disposable)) = next else {
                break;
            };
            disposable.release();
        }
        self.inner.destroyed.set(true);
    }

    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.get()
    }

    #[must_use]
    pub fn is_being_destroyed(&self) -> bool {
        self.inner.being_destroyed.get()
    }

    #[must_use]
    pub fn owned_count(&self) -> usize {
        self.inner.handles.borrow().len()
    }

    /// Run `callback` at the next checkpoint unless this lifecycle has been
    /// destroyed by then.
    pub fn defer<F, R>(&self, callback: F) -> DeferHandle
    where
        F: FnOnce() -> R + 'static,
        R: CallbackOutcome,
    {
        let owner = Rc::downgrade(&self.inner);
        let handle = schedule(move || {
            let alive = owner
                .upgrade()
                .is_some_and(|inner| !inner.being_destroyed.get());
            if alive {
                callback().into_outcome()
            } else {
                Ok(())
            }
        });
        DeferHandle { handle }
    }
}

/// Handle returned by [`Lifecycle::own`].
#[derive(Debug, Clone)]
pub struct OwnedHandle {
    id: u64,
    owner: Weak<LifecycleInner>,
}

impl OwnedHandle {
    /// Release the handle now and stop tracking it. Idempotent.
    pub fn release(&self) {
        if let Some(disposable) = self.take() {
            disposable.release();
        }
    }

    /// Stop tracking the handle without releasing it.
    pub fn disown(&self) {
        drop(self.take());
    }

    #[must_use]
    pub fn is_owned(&self) -> bool {
        self.owner
            .upgrade()
            .is_some_and(|inner| inner.handles.borrow().contains_key(&self.id))
    }

    fn take(&self) -> Option<Disposable> {
        let inner = self.owner.upgrade()?;
        let taken = inner.handles.borrow_mut().remove(&self.id);
        taken
    }
}

/// Handle returned by [`Lifecycle::defer`].
#[derive(Debug, Clone)]
pub struct DeferHandle {
    handle: ScheduleHandle,
}

impl DeferHandle {
    /// Cancel the deferred callback. Idempotent.
    pub fn remove(&self) {
        self.handle.remove();
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.handle.is_pending()
    }
}
