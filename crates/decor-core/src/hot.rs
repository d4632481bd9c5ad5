//! Pending-delivery sets ("hot sets").
//!
//! A [`HotSet`] holds the collectors that have undelivered changes, keyed by
//! their registration sequence number. The first `mark` after an idle period
//! schedules a single drain on the current [`Scheduler`]; the drain delivers
//! in ascending sequence order and repeats until a pass finds the set empty,
//! so collectors that become hot during delivery are served in the same
//! checkpoint.
//!
//! # Invariants
//!
//! 1. At most one drain is scheduled per set at any time.
//! 2. An entry is delivered at most once per mark; `unmark` before the drain
//!    reaches it prevents delivery.
//! 3. Delivery order within a pass is ascending `seq`, independent of the
//!    order in which entries were marked.
//! 4. The scheduled drain lives on the thread's current scheduler. A mark
//!    after [`Scheduler::install`] cancels a drain queued on the previous
//!    scheduler and arms one on the new scheduler, carrying every pending
//!    entry with it.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::schedule::{ScheduleHandle, Scheduler};

/// Something that can flush its own pending changes.
pub trait Deliver {
    fn deliver(&self);
}

struct HotState<T> {
    entries: BTreeMap<u64, T>,
    armed: bool,
    draining: bool,
    pending: Option<ScheduleHandle>,
}

/// Shared handle to a set of collectors awaiting delivery.
pub struct HotSet<T> {
    inner: Rc<RefCell<HotState<T>>>,
}

impl<T> Clone for HotSet<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for HotSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let st = self.inner.borrow();
        f.debug_struct("HotSet")
            .field("entries", &st.entries.keys().collect::<Vec<_>>())
            .field("armed", &st.armed)
            .finish()
    }
}

impl<T: Deliver + 'static> Default for HotSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Deliver + 'static> HotSet<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(HotState {
                entries: BTreeMap::new(),
                armed: false,
                draining: false,
                pending: None,
            })),
        }
    }

    /// Record that `item` has pending changes, arming a drain if needed.
    pub fn mark(&self, seq: u64, item: T) {
        let scheduler = Scheduler::current();
        let (replaced, arm, stale) = {
            let mut st = self.inner.borrow_mut();
            let replaced = st.entries.insert(seq, item);
            let queued =
                st.draining || st.pending.as_ref().is_some_and(|h| h.is_queued_on(&scheduler));
            let stale = if queued { None } else { st.pending.take() };
            st.armed |= !queued;
            (replaced, !queued, stale)
        };
        drop(replaced);
        if !arm {
            return;
        }
        if let Some(stale) = stale {
            stale.remove();
        }

        tracing::trace!(seq, "hot set armed");
        let set = self.clone();
        let handle = scheduler.schedule(move || set.drain());
        let mut st = self.inner.borrow_mut();
        if st.armed && !st.draining {
            st.pending = Some(handle);
        }
    }

    /// Forget `seq` without delivering it. Returns whether it was present.
    pub fn unmark(&self, seq: u64) -> bool {
        let removed = self.inner.borrow_mut().entries.remove(&seq);
        removed.is_some()
    }

    #[must_use]
    pub fn contains(&self, seq: u64) -> bool {
        self.inner.borrow().entries.contains_key(&seq)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.borrow().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.borrow().entries.is_empty()
    }

    /// Whether a drain is scheduled.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.inner.borrow().armed
    }

    /// Deliver every hot entry, in `seq` order, until none remain.
    pub fn drain(&self) {
        self.inner.borrow_mut().draining = true;
        let _guard = Disarm { set: self };
        loop {
            let batch = std::mem::take(&mut self.inner.borrow_mut().entries);
            if batch.is_empty() {
                break;
            }
            tracing::trace!(batch = batch.len(), "hot set sweep");
            for item in batch.into_values() {
                item.deliver();
            }
        }
    }

    /// Drop all entries and cancel the scheduled drain.
    pub fn reset(&self) {
        let (entries, pending) = {
            let mut st = self.inner.borrow_mut();
            st.armed = false;
            (std::mem::take(&mut st.entries), st.pending.take())
        };
        if let Some(pending) = pending {
            pending.remove();
        }
        drop(entries);
    }
}

struct Disarm<'a, T> {
    set: &'a HotSet<T>,
}

impl<T> Drop for Disarm<'_, T> {
    fn drop(&mut self) {
        let mut st = self.set.inner.borrow_mut();
        st.armed = false;
        st.draining = false;
        st.pending = None;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
