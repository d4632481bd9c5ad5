//! Per-object notifiers and change callbacks.
//!
//! Every observable target owns a [`Notifier`]. Observers register a
//! [`ChangeCallback`] together with an [`AcceptList`]; each record the
//! notifier emits is queued on every callback that accepts its type. Queued
//! callbacks are drained at the next scheduler checkpoint, in ascending
//! callback sequence order, each receiving its whole queue at once.
//!
//! A callback's sequence number is assigned on first registration and
//! released once it has no registrations and nothing queued. Registering it
//! again afterwards assigns a fresh one.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::fmt;
use std::rc::{Rc, Weak};

use decor_core::{
    CallbackError, CallbackOutcome, Deliver, HotSet, Scheduler, invoke_isolated, report_failure,
};

use crate::change::{AcceptList, Change, ChangeRecord, ChangeType, ObjectId};

thread_local! {
    static NEXT_CALLBACK_SEQ: Cell<u64> = const { Cell::new(0) };
    static NEXT_OBJECT_ID: Cell<u64> = const { Cell::new(0) };
    static HOT: HotSet<ChangeCallback> = HotSet::new();
}

fn bump(counter: &'static std::thread::LocalKey<Cell<u64>>) -> u64 {
    counter.with(|c| {
        let n = c.get();
        c.set(n + 1);
        n
    })
}

// ---------------------------------------------------------------------------
// ChangeCallback
// ---------------------------------------------------------------------------

type RecordsFn = dyn Fn(&[ChangeRecord]) -> Result<(), CallbackError>;

struct CallbackInner {
    seq: Cell<Option<u64>>,
    records: RefCell<Vec<ChangeRecord>>,
    registrations: Cell<usize>,
    func: Rc<RecordsFn>,
}

/// An observer function plus its pending record queue.
///
/// The same callback may observe many targets; records from all of them
/// arrive in one batch, in emission order.
#[derive(Clone)]
pub struct ChangeCallback {
    inner: Rc<CallbackInner>,
}

impl fmt::Debug for ChangeCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeCallback")
            .field("seq", &self.inner.seq.get())
            .field("pending", &self.inner.records.borrow().len())
            .field("registrations", &self.inner.registrations.get())
            .finish()
    }
}

impl ChangeCallback {
    pub fn new<F, R>(callback: F) -> Self
    where
        F: Fn(&[ChangeRecord]) -> R + 'static,
        R: CallbackOutcome,
    {
        Self::from_fn(move |records: &[ChangeRecord]| callback(records).into_outcome())
    }

    pub(crate) fn from_fn<F>(func: F) -> Self
    where
        F: Fn(&[ChangeRecord]) -> Result<(), CallbackError> + 'static,
    {
        Self {
            inner: Rc::new(CallbackInner {
                seq: Cell::new(None),
                records: RefCell::new(Vec::new()),
                registrations: Cell::new(0),
                func: Rc::new(func),
            }),
        }
    }

    /// Current sequence number, if the callback is registered or has records
    /// queued.
    #[must_use]
    pub fn seq(&self) -> Option<u64> {
        self.inner.seq.get()
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.records.borrow().len()
    }

    /// Number of targets this callback currently observes.
    #[must_use]
    pub fn registrations(&self) -> usize {
        self.inner.registrations.get()
    }

    /// Deliver queued records now. See [`deliver_change_records`].
    pub fn deliver(&self) {
        deliver_change_records(self);
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    fn ensure_seq(&self) -> u64 {
        if let Some(seq) = self.inner.seq.get() {
            return seq;
        }
        let seq = bump(&NEXT_CALLBACK_SEQ);
        self.inner.seq.set(Some(seq));
        seq
    }

    fn enqueue(&self, record: ChangeRecord) {
        let seq = self.ensure_seq();
        self.inner.records.borrow_mut().push(record);
        HOT.with(|hot| hot.mark(seq, self.clone()));
    }

    fn collect_garbage(&self) {
        if self.inner.registrations.get() == 0 && self.inner.records.borrow().is_empty() {
            if let Some(seq) = self.inner.seq.take() {
                tracing::trace!(seq, "change callback released");
            }
        }
    }
}

impl Deliver for ChangeCallback {
    fn deliver(&self) {
        deliver_change_records(self);
    }
}

/// Synchronously invoke `callback` with everything queued for it, then
/// release its sequence number if it no longer observes anything.
///
/// Does not invoke the callback when the queue is empty.
pub fn deliver_change_records(callback: &ChangeCallback) {
    let records = std::mem::take(&mut *callback.inner.records.borrow_mut());
    let seq = callback.inner.seq.get();
    if let Some(seq) = seq {
        HOT.with(|hot| hot.unmark(seq));
    }
    if !records.is_empty() {
        let func = Rc::clone(&callback.inner.func);
        let catch_panics = Scheduler::current().config().catch_panics;
        if let Err(err) = invoke_isolated(catch_panics, || func(&records)) {
            report_failure("observer", seq.unwrap_or(u64::MAX), &err);
        }
    }
    callback.collect_garbage();
}

/// Number of change callbacks of this thread waiting for delivery.
#[must_use]
pub fn hot_callbacks() -> usize {
    HOT.with(HotSet::len)
}

// ---------------------------------------------------------------------------
// Notifier
// ---------------------------------------------------------------------------

struct Registration {
    accept: AcceptList,
    callback: ChangeCallback,
}

struct NotifierInner {
    id: ObjectId,
    observers: RefCell<BTreeMap<u64, Registration>>,
    /// Change types of the `perform_change` transactions in progress.
    active: RefCell<Vec<ChangeType>>,
}

/// Emits change records for one target.
///
/// Cloning a `Notifier` creates a new handle to the **same** notifier.
#[derive(Clone)]
pub struct Notifier {
    inner: Rc<NotifierInner>,
}

impl fmt::Debug for Notifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notifier")
            .field("id", &self.inner.id)
            .field("observers", &self.inner.observers.borrow().len())
            .field("active", &self.inner.active.borrow())
            .finish()
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(NotifierInner {
                id: ObjectId(bump(&NEXT_OBJECT_ID)),
                observers: RefCell::new(BTreeMap::new()),
                active: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Identity stamped on every record this notifier emits.
    #[must_use]
    pub fn id(&self) -> ObjectId {
        self.inner.id
    }

    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.inner.observers.borrow().len()
    }

    /// Whether a `perform_change` transaction of `change_type` is running.
    #[must_use]
    pub fn is_active(&self, change_type: ChangeType) -> bool {
        self.inner.active.borrow().contains(&change_type)
    }

    /// Queue `change` for every observer that should see it.
    ///
    /// An observer sees a record when the record's type is in its accept
    /// list and none of its accepted types has a transaction in progress.
    pub fn notify(&self, change: Change) {
        let record = ChangeRecord {
            object: self.inner.id,
            change,
        };
        let change_type = record.change_type();
        let targets: Vec<ChangeCallback> = {
            let active = self.inner.active.borrow();
            self.inner
                .observers
                .borrow()
                .values()
                .filter(|reg| {
                    reg.accept.contains(change_type)
                        && !reg.accept.iter().any(|t| active.contains(&t))
                })
                .map(|reg| reg.callback.clone())
                .collect()
        };
        for callback in targets {
            callback.enqueue(record.clone());
        }
    }

    /// Run `f` as a transaction of `change_type`.
    ///
    /// While `f` runs, observers accepting `change_type` receive none of the
    /// records emitted on this notifier. If `f` returns a change, it is
    /// emitted afterwards as a single record of `change_type`.
    pub fn perform_change<F>(&self, change_type: ChangeType, f: F)
    where
        F: FnOnce() -> Option<Change>,
    {
        let change = {
            let _tx = Transaction::enter(&self.inner, change_type);
            f()
        };
        if let Some(change) = change {
            self.notify(change.retyped(change_type));
        }
    }

    /// Register `callback` with `accept`. Registering a callback that already
    /// observes this target only replaces its accept list.
    pub fn observe(&self, callback: &ChangeCallback, accept: AcceptList) -> ObservationHandle {
        let seq = callback.ensure_seq();
        match self.inner.observers.borrow_mut().entry(seq) {
            Entry::Occupied(mut entry) => entry.get_mut().accept = accept,
            Entry::Vacant(entry) => {
                entry.insert(Registration {
                    accept,
                    callback: callback.clone(),
                });
                let regs = &callback.inner.registrations;
                regs.set(regs.get() + 1);
            }
        }
        ObservationHandle {
            seq,
            notifier: Rc::downgrade(&self.inner),
            callback: callback.clone(),
        }
    }

    /// Remove `callback` if it observes this notifier.
    pub fn unobserve(&self, callback: &ChangeCallback) -> bool {
        match callback.seq() {
            Some(seq) => self.remove_registration(seq, callback),
            None => false,
        }
    }

    fn remove_registration(&self, seq: u64, callback: &ChangeCallback) -> bool {
        let removed = self.inner.observers.borrow_mut().remove(&seq);
        if removed.is_none() {
            return false;
        }
        let regs = &callback.inner.registrations;
        regs.set(regs.get().saturating_sub(1));
        callback.collect_garbage();
        true
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Marks a `perform_change` transaction active until dropped.
struct Transaction<'a> {
    notifier: &'a NotifierInner,
    change_type: ChangeType,
}

impl<'a> Transaction<'a> {
    fn enter(notifier: &'a NotifierInner, change_type: ChangeType) -> Self {
        notifier.active.borrow_mut().push(change_type);
        Self {
            notifier,
            change_type,
        }
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        let mut active = self.notifier.active.borrow_mut();
        if let Some(pos) = active.iter().rposition(|t| *t == self.change_type) {
            active.remove(pos);
        }
    }
}

// ---------------------------------------------------------------------------
// Observation handle
// ---------------------------------------------------------------------------

/// One `(target, callback)` registration.
#[derive(Clone)]
pub struct ObservationHandle {
    seq: u64,
    notifier: Weak<NotifierInner>,
    callback: ChangeCallback,
}

impl fmt::Debug for ObservationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservationHandle")
            .field("seq", &self.seq)
            .field("active", &self.is_active())
            .finish()
    }
}

impl ObservationHandle {
    /// Unregister. Idempotent; records already queued are still delivered.
    pub fn remove(&self) -> bool {
        match self.notifier.upgrade() {
            Some(inner) => Notifier { inner }.remove_registration(self.seq, &self.callback),
            None => false,
        }
    }

    /// Deliver the callback's queued records now.
    pub fn deliver(&self) {
        deliver_change_records(&self.callback);
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.notifier
            .upgrade()
            .is_some_and(|inner| inner.observers.borrow().contains_key(&self.seq))
    }

    #[must_use]
    pub fn callback(&self) -> &ChangeCallback {
        &self.callback
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use decor_core::Value;

    fn recording() -> (Rc<RefCell<Vec<Vec<ChangeRecord>>>>, ChangeCallback) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let l = Rc::clone(&log);
        let callback = ChangeCallback::new(move |records: &[ChangeRecord]| {
            l.borrow_mut().push(records.to_vec());
        });
        (log, callback)
    }

    fn update(name: &str, old: i64) -> Change {
        Change::Update {
            name: name.into(),
            old_value: Value::from(old),
        }
    }

    #[test]
    fn records_are_batched_per_callback() {
        let notifier = Notifier::new();
        let (log, callback) = recording();
        notifier.observe(&callback, AcceptList::default());
        notifier.notify(update("a", 1));
        notifier.notify(update("b", 2));
        assert_eq!(callback.pending(), 2);
        callback.deliver();
        let log = log.borrow();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].len(), 2);
        assert_eq!(log[0][0].object, notifier.id());
    }

    #[test]
    fn accept_list_filters() {
        let notifier = Notifier::new();
        let (log, callback) = recording();
        notifier.observe(&callback, AcceptList::from([ChangeType::Delete]));
        notifier.notify(update("a", 1));
        callback.deliver();
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn reobserving_replaces_accept_list() {
        let notifier = Notifier::new();
        let (log, callback) = recording();
        notifier.observe(&callback, AcceptList::from([ChangeType::Delete]));
        notifier.observe(&callback, AcceptList::default());
        assert_eq!(notifier.observer_count(), 1);
        assert_eq!(callback.registrations(), 1);
        notifier.notify(update("a", 1));
        callback.deliver();
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn transaction_suppresses_accepting_observers() {
        const BUMP: ChangeType = ChangeType::Custom("bump");
        let notifier = Notifier::new();
        let (raw_log, raw) = recording();
        let (bump_log, bumps) = recording();
        notifier.observe(&raw, AcceptList::default());
        notifier.observe(&bumps, AcceptList::from([BUMP, ChangeType::Update]));

        notifier.perform_change(BUMP, || {
            assert!(notifier.is_active(BUMP));
            notifier.notify(update("n", 0));
            Some(Change::synthetic(BUMP, [("by", 1)]))
        });
        assert!(!notifier.is_active(BUMP));
        raw.deliver();
        bumps.deliver();

        assert_eq!(raw_log.borrow()[0].len(), 1);
        let bump_log = bump_log.borrow();
        assert_eq!(bump_log[0].len(), 1);
        assert_eq!(bump_log[0][0].change_type(), BUMP);
    }

    #[test]
    fn transaction_without_result_emits_nothing() {
        let notifier = Notifier::new();
        let (log, callback) = recording();
        notifier.observe(&callback, AcceptList::from([ChangeType::Custom("noop")]));
        notifier.perform_change(ChangeType::Custom("noop"), || None);
        callback.deliver();
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn removal_is_idempotent_and_keeps_queued_records() {
        let notifier = Notifier::new();
        let (log, callback) = recording();
        let handle = notifier.observe(&callback, AcceptList::default());
        notifier.notify(update("a", 1));
        assert!(handle.remove());
        assert!(!handle.remove());
        assert!(!handle.is_active());
        notifier.notify(update("a", 2));
        handle.deliver();
        assert_eq!(log.borrow().len(), 1);
        assert_eq!(log.borrow()[0].len(), 1);
    }

    #[test]
    fn released_callback_gets_fresh_seq() {
        let notifier = Notifier::new();
        let (_, callback) = recording();
        let handle = notifier.observe(&callback, AcceptList::default());
        let first = callback.seq();
        assert!(first.is_some());
        handle.remove();
        assert_eq!(callback.seq(), None);
        notifier.observe(&callback, AcceptList::default());
        assert!(callback.seq() > first);
    }

    #[test]
    fn hot_set_tracks_queued_callbacks() {
        let notifier = Notifier::new();
        let (_, callback) = recording();
        notifier.observe(&callback, AcceptList::default());
        let before = hot_callbacks();
        notifier.notify(update("a", 1));
        notifier.notify(update("a", 2));
        assert_eq!(hot_callbacks(), before + 1);
        callback.deliver();
        assert_eq!(hot_callbacks(), before);
    }
}
