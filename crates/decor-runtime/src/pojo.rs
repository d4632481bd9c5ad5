//! Plain property bags with synchronous watchers.
//!
//! A [`Pojo`] starts out unobserved. The first [`watch`](Pojo::watch)
//! instruments the keys present at that moment; writes to those keys call
//! every watcher synchronously with `(name, old, new)` before the new value
//! is stored. Keys added afterwards are stored but never reported.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::rc::{Rc, Weak};

use decor_core::{CallbackOutcome, Value};

use crate::notifier::{Notifier, OldValues, PropertyCallback, property_callback};
use crate::observe::ObserveHandle;

/// Synchronous watcher: `(name, old, new)`.
pub type Watcher = Rc<dyn Fn(&str, &Value, &Value)>;

#[derive(Default)]
struct PojoInner {
    values: RefCell<BTreeMap<String, Value>>,
    instrumented: RefCell<Option<BTreeSet<String>>>,
    watchers: RefCell<Vec<(u64, Watcher)>>,
    next_watcher: Cell<u64>,
}

/// A dynamic property bag.
///
/// Cloning a `Pojo` creates a new handle to the **same** bag.
#[derive(Clone, Default)]
pub struct Pojo {
    inner: Rc<PojoInner>,
}

impl fmt::Debug for Pojo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pojo")
            .field("values", &self.inner.values.borrow())
            .field("watchers", &self.inner.watchers.borrow().len())
            .finish()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Pojo {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let pojo = Self::new();
        pojo.inner.values.borrow_mut().extend(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into())),
        );
        pojo
    }
}

impl Pojo {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Value> {
        self.inner.values.borrow().get(name).cloned()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.inner.values.borrow().contains_key(name)
    }

    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.inner.values.borrow().keys().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.values.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.values.borrow().is_empty()
    }

    /// Whether `name` is reported to watchers.
    #[must_use]
    pub fn is_watched(&self, name: &str) -> bool {
        self.inner
            .instrumented
            .borrow()
            .as_ref()
            .is_some_and(|keys| keys.contains(name))
    }

    /// Write a property. Instrumented keys skip same-value writes and call
    /// the watchers before storing.
    pub fn set(&self, name: &str, value: impl Into<Value>) {
        let value = value.into();
        if self.is_watched(name) {
            let old = self.get(name).unwrap_or_default();
            if old.same_value(&value) {
                return;
            }
            let watchers: Vec<Watcher> = self
                .inner
                .watchers
                .borrow()
                .iter()
                .map(|(_, w)| Rc::clone(w))
                .collect();
            for watcher in &watchers {
                watcher(name, &old, &value);
            }
        }
        self.inner
            .values
            .borrow_mut()
            .insert(name.to_owned(), value);
    }

    /// Call `watcher(name, old, new)` synchronously on every change of an
    /// instrumented key.
    pub fn watch(&self, watcher: impl Fn(&str, &Value, &Value) + 'static) -> WatchHandle {
        {
            let mut instrumented = self.inner.instrumented.borrow_mut();
            if instrumented.is_none() {
                let keys = self.inner.values.borrow().keys().cloned().collect();
                *instrumented = Some(keys);
            }
        }
        let id = self.inner.next_watcher.get();
        self.inner.next_watcher.set(id + 1);
        self.inner
            .watchers
            .borrow_mut()
            .push((id, Rc::new(watcher)));
        WatchHandle {
            id,
            pojo: Rc::downgrade(&self.inner),
        }
    }

    pub fn observe<F, R>(&self, callback: F) -> ObserveHandle
    where
        F: Fn(&OldValues) -> R + 'static,
        R: CallbackOutcome,
    {
        self.observe_with(property_callback(callback))
    }

    pub(crate) fn observe_with(&self, callback: PropertyCallback) -> ObserveHandle {
        let notifier = Notifier::from_callback(callback);
        let collector = notifier.clone();
        let watch = self.watch(move |name, old, _new| collector.notify(name, old.clone()));
        ObserveHandle::new(notifier, move || watch.remove())
    }
}

/// Handle returned by [`Pojo::watch`].
#[derive(Debug, Clone)]
pub struct WatchHandle {
    id: u64,
    pojo: Weak<PojoInner>,
}

impl WatchHandle {
    /// Detach the watcher. Idempotent.
    pub fn remove(&self) {
        if let Some(inner) = self.pojo.upgrade() {
            inner.watchers.borrow_mut().retain(|(id, _)| *id != self.id);
        }
    }
}
