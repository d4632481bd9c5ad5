//! Observable targets and the record-level `observe` entry points.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use decor_core::Value;

use crate::change::{AcceptList, Change, PropertyKey};
use crate::notifier::{ChangeCallback, Notifier, ObservationHandle};

/// Anything that owns a [`Notifier`].
pub trait Observable {
    fn notifier(&self) -> &Notifier;
}

impl Observable for Notifier {
    fn notifier(&self) -> &Notifier {
        self
    }
}

/// The notifier of `target`.
pub fn get_notifier<T: Observable + ?Sized>(target: &T) -> Notifier {
    target.notifier().clone()
}

/// Register `callback` on `target`. `None` accepts
/// [`ChangeType::DEFAULT_ACCEPT`](crate::ChangeType::DEFAULT_ACCEPT).
pub fn observe<T: Observable + ?Sized>(
    target: &T,
    callback: &ChangeCallback,
    accept: Option<AcceptList>,
) -> ObservationHandle {
    target
        .notifier()
        .observe(callback, accept.unwrap_or_default())
}

/// Remove `callback` from `target`. Returns whether it was registered.
pub fn unobserve<T: Observable + ?Sized>(target: &T, callback: &ChangeCallback) -> bool {
    target.notifier().unobserve(callback)
}

/// Custom property setter. Runs instead of the plain store and suppresses the
/// automatic record.
pub type Setter = Rc<dyn Fn(&ObservableObject, Value)>;

struct ObjectInner {
    notifier: Notifier,
    values: RefCell<BTreeMap<String, Value>>,
    setters: RefCell<BTreeMap<String, Setter>>,
}

/// A property bag that emits `add`, `update` and `delete` records.
///
/// Cloning an `ObservableObject` creates a new handle to the **same** object.
#[derive(Clone)]
pub struct ObservableObject {
    inner: Rc<ObjectInner>,
}

impl fmt::Debug for ObservableObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservableObject")
            .field("id", &self.inner.notifier.id())
            .field("values", &self.inner.values.borrow())
            .finish()
    }
}

impl Default for ObservableObject {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for ObservableObject {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let object = Self::new();
        object.assign(iter);
        object
    }
}

impl Observable for ObservableObject {
    fn notifier(&self) -> &Notifier {
        &self.inner.notifier
    }
}

impl ObservableObject {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(ObjectInner {
                notifier: Notifier::new(),
                values: RefCell::new(BTreeMap::new()),
                setters: RefCell::new(BTreeMap::new()),
            }),
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Value> {
        self.inner.values.borrow().get(name).cloned()
    }

    /// Whether `name` holds a value or has a setter.
    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.inner.values.borrow().contains_key(name)
            || self.inner.setters.borrow().contains_key(name)
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

    /// Store `value` under `name`, emitting `add` for a new property and
    /// `update` for a changed one. A property with a setter delegates to it
    /// and emits nothing on its own.
    pub fn set(&self, name: &str, value: impl Into<Value>) {
        let value = value.into();
        let setter = self.inner.setters.borrow().get(name).cloned();
        if let Some(setter) = setter {
            setter(self, value);
            return;
        }
        let previous = self.inner.values.borrow_mut().insert(name.to_owned(), value.clone());
        match previous {
            None => self.inner.notifier.notify(Change::Add {
                name: PropertyKey::from(name),
            }),
            Some(old) if !old.same_value(&value) => self.inner.notifier.notify(Change::Update {
                name: PropertyKey::from(name),
                old_value: old,
            }),
            Some(_) => {}
        }
    }

    /// Store without emitting any record.
    pub fn commit(&self, name: &str, value: impl Into<Value>) {
        self.inner
            .values
            .borrow_mut()
            .insert(name.to_owned(), value.into());
    }

    /// Remove `name`, emitting `delete` if it existed.
    pub fn delete(&self, name: &str) -> Option<Value> {
        let old = self.inner.values.borrow_mut().remove(name)?;
        self.inner.notifier.notify(Change::Delete {
            name: PropertyKey::from(name),
            old_value: old.clone(),
        });
        Some(old)
    }

    /// [`set`](Self::set) each pair in order.
    pub fn assign<K, V>(&self, pairs: impl IntoIterator<Item = (K, V)>)
    where
        K: Into<String>,
        V: Into<Value>,
    {
        for (name, value) in pairs {
            self.set(&name.into(), value);
        }
    }

    /// Route writes of `name` through `setter`.
    pub fn define_setter<F>(&self, name: &str, setter: F)
    where
        F: Fn(&ObservableObject, Value) + 'static,
    {
        self.inner
            .setters
            .borrow_mut()
            .insert(name.to_owned(), Rc::new(setter));
    }

    /// Register `callback`; see [`observe`].
    pub fn observe(&self, callback: &ChangeCallback, accept: Option<AcceptList>) -> ObservationHandle {
        observe(self, callback, accept)
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
