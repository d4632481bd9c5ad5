//! Property-map change collectors.
//!
//! A [`Notifier`] is created per `observe()` registration. It records
//! `property -> old value` for the current tick, keeping only the first old
//! value seen per property, and delivers the whole map to its callback once.
//!
//! Hot notifiers are drained at the next scheduler checkpoint in ascending
//! registration order, regardless of which object was mutated first.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::collections::btree_map;
use std::fmt;
use std::rc::Rc;

use decor_core::{
    CallbackError, CallbackOutcome, Deliver, HotSet, Scheduler, Value, invoke_isolated,
    report_failure,
};

thread_local! {
    static NEXT_SEQ: Cell<u64> = const { Cell::new(0) };
    static HOT: HotSet<Notifier> = HotSet::new();
}

fn next_seq() -> u64 {
    NEXT_SEQ.with(|seq| {
        let n = seq.get();
        seq.set(n + 1);
        n
    })
}

/// Snapshot of the properties that changed since the last delivery, each
/// mapped to its value before the first change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OldValues(BTreeMap<String, Value>);

impl OldValues {
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, Value> {
        self.0.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Insert `old` unless `name` already has a baseline. Returns whether it
    /// was inserted.
    fn record(&mut self, name: &str, old: Value) -> bool {
        if self.0.contains_key(name) {
            return false;
        }
        self.0.insert(name.to_owned(), old);
        true
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for OldValues {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl<'a> IntoIterator for &'a OldValues {
    type Item = (&'a String, &'a Value);
    type IntoIter = btree_map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Callback invoked with the collected old values.
pub type PropertyCallback = Rc<dyn Fn(&OldValues) -> Result<(), CallbackError>>;

/// Wrap any `Fn(&OldValues) -> impl CallbackOutcome` as a [`PropertyCallback`].
pub fn property_callback<F, R>(callback: F) -> PropertyCallback
where
    F: Fn(&OldValues) -> R + 'static,
    R: CallbackOutcome,
{
    Rc::new(move |old: &OldValues| callback(old).into_outcome())
}

struct NotifierInner {
    seq: u64,
    pending: RefCell<Option<OldValues>>,
    callback: PropertyCallback,
}

/// Per-registration change collector.
///
/// Cloning a `Notifier` creates a new handle to the **same** collector.
#[derive(Clone)]
pub struct Notifier {
    inner: Rc<NotifierInner>,
}

impl fmt::Debug for Notifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notifier")
            .field("seq", &self.inner.seq)
            .field("pending", &self.inner.pending.borrow())
            .finish()
    }
}

impl Notifier {
    pub fn new<F, R>(callback: F) -> Self
    where
        F: Fn(&OldValues) -> R + 'static,
        R: CallbackOutcome,
    {
        Self::from_callback(property_callback(callback))
    }

    #[must_use]
    pub fn from_callback(callback: PropertyCallback) -> Self {
        Self {
            inner: Rc::new(NotifierInner {
                seq: next_seq(),
                pending: RefCell::new(None),
                callback,
            }),
        }
    }

    /// Registration sequence number; lower numbers are delivered first.
    #[must_use]
    pub fn seq(&self) -> u64 {
        self.inner.seq
    }

    /// Record that `name` changed from `old`. Later calls for the same
    /// property before delivery keep the first baseline.
    pub fn notify(&self, name: &str, old: Value) {
        let recorded = self
            .inner
            .pending
            .borrow_mut()
            .get_or_insert_with(OldValues::default)
            .record(name, old);
        if recorded {
            HOT.with(|hot| hot.mark(self.inner.seq, self.clone()));
        }
    }

    /// Whether changes are waiting for delivery.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.inner
            .pending
            .borrow()
            .as_ref()
            .is_some_and(|old| !old.is_empty())
    }

    /// Invoke the callback now with everything collected so far. No-op when
    /// nothing is pending.
    pub fn deliver(&self) {
        let Some(old) = self.inner.pending.borrow_mut().take() else {
            return;
        };
        HOT.with(|hot| hot.unmark(self.inner.seq));
        let callback = Rc::clone(&self.inner.callback);
        let catch_panics = Scheduler::current().config().catch_panics;
        if let Err(err) = invoke_isolated(catch_panics, || callback(&old)) {
            report_failure("notifier", self.inner.seq, &err);
        }
    }

    /// Drop pending changes without invoking the callback.
    pub fn discard_changes(&self) {
        let discarded = self.inner.pending.borrow_mut().take();
        if discarded.is_some() {
            HOT.with(|hot| hot.unmark(self.inner.seq));
        }
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Deliver for Notifier {
    fn deliver(&self) {
        Notifier::deliver(self);
    }
}

/// Number of notifiers of this thread currently waiting for delivery.
#[must_use]
pub fn hot_notifiers() -> usize {
    HOT.with(HotSet::len)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
