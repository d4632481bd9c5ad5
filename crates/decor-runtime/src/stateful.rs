//! Instrumented objects with named, observable properties.
//!
//! # Design
//!
//! A [`Class`] declares properties (name plus default value) and, optionally,
//! custom accessors for some of them. The first time a class is instantiated
//! its [`ClassDescriptor`] is computed: the parent's descriptor (itself
//! computed once and shared) overlaid with this class's own declarations.
//! Instances never change shape after construction.
//!
//! Every write goes through [`Stateful::set`]:
//!
//! 1. read the current value (through the custom getter, if any),
//! 2. run the custom setter, or [`Stateful::commit`] the value into the
//!    shadow store,
//! 3. read the value again and, if it is not the same value, notify every
//!    observer with the old value.
//!
//! A custom setter stores with [`commit`](Stateful::commit) and may commit
//! other properties too; only the property being set is compared and
//! notified.
//!
//! # Invariants
//!
//! 1. A class descriptor is computed at most once per class.
//! 2. Writes of a same-value (`NaN` over `NaN`, `1` over `1`) never notify;
//!    `-0` over `+0` does.
//! 3. Observer callbacks never run synchronously inside `set`.
//!
//! # Failure Modes
//!
//! - **Unknown property**: `get`/`set` of an undeclared name returns
//!   [`DecorError::UnknownProperty`] and leaves the object untouched.
//! - **Reference cycles**: a callback that captures a strong `Stateful`
//!   keeps the object alive; capture [`Stateful::downgrade`] instead.

use std::cell::{Cell, OnceCell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};

use decor_core::{CallbackOutcome, DecorError, Result, Value};

use crate::notifier::{Notifier, OldValues, PropertyCallback, property_callback};
use crate::observe::ObserveHandle;

thread_local! {
    static NEXT_CLASS_ID: Cell<u64> = const { Cell::new(0) };
}

/// Custom getter: computes the visible value, usually from
/// [`Stateful::shadow`].
pub type Getter = Rc<dyn Fn(&Stateful) -> Value>;

/// Custom setter: stores the value, usually with [`Stateful::commit`].
pub type Setter = Rc<dyn Fn(&Stateful, Value)>;

/// Optional custom accessor pair for one property.
#[derive(Clone, Default)]
pub struct Accessor {
    get: Option<Getter>,
    set: Option<Setter>,
}

impl fmt::Debug for Accessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Accessor")
            .field("get", &self.get.is_some())
            .field("set", &self.set.is_some())
            .finish()
    }
}

impl Accessor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_get(mut self, get: impl Fn(&Stateful) -> Value + 'static) -> Self {
        self.get = Some(Rc::new(get));
        self
    }

    #[must_use]
    pub fn with_set(mut self, set: impl Fn(&Stateful, Value) + 'static) -> Self {
        self.set = Some(Rc::new(set));
        self
    }

    /// Layer `self` over an inherited accessor: halves defined here win.
    fn overlay(&self, inherited: &Accessor) -> Accessor {
        Accessor {
            get: self.get.clone().or_else(|| inherited.get.clone()),
            set: self.set.clone().or_else(|| inherited.set.clone()),
        }
    }
}

/// How a property's reads and writes are routed.
#[derive(Debug, Clone)]
pub enum AccessorStrategy {
    /// Plain shadow-store read and write.
    Shadow,
    /// Class-supplied accessor; missing halves fall back to the shadow store.
    Custom(Accessor),
}

#[derive(Debug, Clone)]
pub struct PropertyDescriptor {
    pub default: Value,
    pub strategy: AccessorStrategy,
}

/// Immutable, per-class table of instrumented properties.
#[derive(Debug, Default)]
pub struct ClassDescriptor {
    properties: BTreeMap<String, PropertyDescriptor>,
}

impl ClassDescriptor {
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.properties.get(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.properties.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.properties.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.properties.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}

/// Builder for a [`Class`].
#[derive(Debug, Default)]
pub struct ClassBuilder {
    name: String,
    parent: Option<Class>,
    properties: Vec<(String, Value)>,
    accessors: BTreeMap<String, Accessor>,
}

impl ClassBuilder {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Inherit the parent's properties and accessors.
    #[must_use]
    pub fn extends(mut self, parent: &Class) -> Self {
        self.parent = Some(parent.clone());
        self
    }

    /// Declare (or redeclare with a new default) a property.
    #[must_use]
    pub fn property(mut self, name: impl Into<String>, default: impl Into<Value>) -> Self {
        self.properties.push((name.into(), default.into()));
        self
    }

    /// Attach a custom accessor. The property may be declared here or by an
    /// ancestor.
    #[must_use]
    pub fn accessor(mut self, name: impl Into<String>, accessor: Accessor) -> Self {
        self.accessors.insert(name.into(), accessor);
        self
    }

    #[must_use]
    pub fn build(self) -> Class {
        let id = NEXT_CLASS_ID.with(|next| {
            let id = next.get();
            next.set(id + 1);
            id
        });
        Class {
            inner: Rc::new(ClassInner {
                id,
                name: self.name,
                parent: self.parent,
                properties: self.properties,
                accessors: self.accessors,
                descriptor: OnceCell::new(),
            }),
        }
    }
}

#[derive(Debug)]
struct ClassInner {
    id: u64,
    name: String,
    parent: Option<Class>,
    properties: Vec<(String, Value)>,
    accessors: BTreeMap<String, Accessor>,
    descriptor: OnceCell<Rc<ClassDescriptor>>,
}

/// A declared class of [`Stateful`] objects. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Class {
    inner: Rc<ClassInner>,
}

impl PartialEq for Class {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Class {}

impl Class {
    #[must_use]
    pub fn builder(name: impl Into<String>) -> ClassBuilder {
        ClassBuilder::new(name)
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    #[must_use]
    pub fn parent(&self) -> Option<&Class> {
        self.inner.parent.as_ref()
    }

    /// Whether the descriptor has been computed (first instantiation done).
    #[must_use]
    pub fn is_instrumented(&self) -> bool {
        self.inner.descriptor.get().is_some()
    }

    /// The class descriptor, computing it on first use.
    pub fn descriptor(&self) -> Rc<ClassDescriptor> {
        Rc::clone(self.inner.descriptor.get_or_init(|| self.instrument()))
    }

    fn instrument(&self) -> Rc<ClassDescriptor> {
        let mut properties = match &self.inner.parent {
            Some(parent) => parent.descriptor().properties.clone(),
            None => BTreeMap::new(),
        };
        for (name, default) in &self.inner.properties {
            let strategy = properties
                .get(name)
                .map_or(AccessorStrategy::Shadow, |inherited| inherited.strategy.clone());
            properties.insert(
                name.clone(),
                PropertyDescriptor {
                    default: default.clone(),
                    strategy,
                },
            );
        }
        for (name, accessor) in &self.inner.accessors {
            let entry = properties
                .entry(name.clone())
                .or_insert_with(|| PropertyDescriptor {
                    default: Value::Undefined,
                    strategy: AccessorStrategy::Shadow,
                });
            entry.strategy = match &entry.strategy {
                AccessorStrategy::Custom(inherited) => {
                    AccessorStrategy::Custom(accessor.overlay(inherited))
                }
                AccessorStrategy::Shadow => AccessorStrategy::Custom(accessor.clone()),
            };
        }
        tracing::trace!(
            class = %self.inner.name,
            properties = properties.len(),
            "instrumented class"
        );
        Rc::new(ClassDescriptor { properties })
    }
}

struct StatefulInner {
    class: Class,
    descriptor: Rc<ClassDescriptor>,
    shadow: RefCell<BTreeMap<String, Value>>,
    observers: RefCell<Vec<Notifier>>,
}

/// An instance of a [`Class`].
///
/// Cloning a `Stateful` creates a new handle to the **same** object.
#[derive(Clone)]
pub struct Stateful {
    inner: Rc<StatefulInner>,
}

impl fmt::Debug for Stateful {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stateful")
            .field("class", &self.inner.class.name())
            .field("shadow", &self.inner.shadow.borrow())
            .field("observers", &self.inner.observers.borrow().len())
            .finish()
    }
}

impl PartialEq for Stateful {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Stateful {}

impl Stateful {
    /// Instantiate `class`, instrumenting it on first use.
    #[must_use]
    pub fn new(class: &Class) -> Self {
        Self {
            inner: Rc::new(StatefulInner {
                class: class.clone(),
                descriptor: class.descriptor(),
                shadow: RefCell::new(BTreeMap::new()),
                observers: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Instantiate `class` and [`mix`](Self::mix) the constructor parameters
    /// through the regular setters.
    pub fn with_params<K, V>(class: &Class, params: impl IntoIterator<Item = (K, V)>) -> Result<Self>
    where
        K: AsRef<str>,
        V: Into<Value>,
    {
        let object = Self::new(class);
        object.mix(params)?;
        Ok(object)
    }

    #[must_use]
    pub fn class(&self) -> &Class {
        &self.inner.class
    }

    #[must_use]
    pub fn descriptor(&self) -> &ClassDescriptor {
        &self.inner.descriptor
    }

    fn property(&self, name: &str) -> Result<&PropertyDescriptor> {
        self.inner
            .descriptor
            .get(name)
            .ok_or_else(|| DecorError::unknown_property(name))
    }

    fn read(&self, name: &str, property: &PropertyDescriptor) -> Value {
        match &property.strategy {
            AccessorStrategy::Custom(Accessor { get: Some(get), .. }) => get(self),
            _ => self.shadow(name),
        }
    }

    /// Read a property through its getter.
    pub fn get(&self, name: &str) -> Result<Value> {
        let property = self.property(name)?;
        Ok(self.read(name, property))
    }

    /// Write a property through its setter, notifying observers when the
    /// visible value changes.
    pub fn set(&self, name: &str, value: impl Into<Value>) -> Result<()> {
        let property = self.property(name)?;
        let value = value.into();
        let old = self.read(name, property);
        match &property.strategy {
            AccessorStrategy::Custom(Accessor { set: Some(set), .. }) => set(self, value),
            _ => self.commit(name, value),
        }
        let new = self.read(name, property);
        if !old.same_value(&new) {
            self.notify(name, old);
        }
        Ok(())
    }

    /// Store `value` in the shadow slot without comparing or notifying.
    /// Custom setters use this to commit.
    pub fn commit(&self, name: &str, value: impl Into<Value>) {
        self.inner
            .shadow
            .borrow_mut()
            .insert(name.to_owned(), value.into());
    }

    /// The raw shadow value: the committed value, else the class default.
    #[must_use]
    pub fn shadow(&self, name: &str) -> Value {
        if let Some(value) = self.inner.shadow.borrow().get(name) {
            return value.clone();
        }
        self.inner
            .descriptor
            .get(name)
            .map_or(Value::Undefined, |property| property.default.clone())
    }

    /// Whether this instance has its own committed value for `name`.
    #[must_use]
    pub fn has_committed(&self, name: &str) -> bool {
        self.inner.shadow.borrow().contains_key(name)
    }

    /// Assign each `(name, value)` pair through the regular setters. Stops at
    /// the first unknown property.
    pub fn mix<K, V>(&self, hash: impl IntoIterator<Item = (K, V)>) -> Result<()>
    where
        K: AsRef<str>,
        V: Into<Value>,
    {
        for (name, value) in hash {
            self.set(name.as_ref(), value)?;
        }
        Ok(())
    }

    /// Report each named property as changed from its current value.
    pub fn notify_current_value<I, S>(&self, names: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for name in names {
            let name = name.as_ref();
            let current = self.get(name)?;
            self.notify(name, current);
        }
        Ok(())
    }

    fn notify(&self, name: &str, old: Value) {
        let observers = self.inner.observers.borrow().clone();
        for observer in &observers {
            observer.notify(name, old.clone());
        }
    }

    /// Start collecting changes. `callback` receives the old values once per
    /// checkpoint (or on [`ObserveHandle::deliver`]).
    pub fn observe<F, R>(&self, callback: F) -> ObserveHandle
    where
        F: Fn(&OldValues) -> R + 'static,
        R: CallbackOutcome,
    {
        self.observe_with(property_callback(callback))
    }

    pub(crate) fn observe_with(&self, callback: PropertyCallback) -> ObserveHandle {
        let notifier = Notifier::from_callback(callback);
        self.inner.observers.borrow_mut().push(notifier.clone());
        let weak = Rc::downgrade(&self.inner);
        let seq = notifier.seq();
        ObserveHandle::new(notifier, move || {
            if let Some(inner) = weak.upgrade() {
                inner
                    .observers
                    .borrow_mut()
                    .retain(|observer| observer.seq() != seq);
            }
        })
    }

    /// Number of live observers.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.inner.observers.borrow().len()
    }

    /// Deliver pending changes of every observer now, in registration order.
    pub fn deliver(&self) {
        let observers = self.inner.observers.borrow().clone();
        for observer in &observers {
            observer.deliver();
        }
    }

    /// Discard pending changes of every observer.
    pub fn discard_changes(&self) {
        let observers = self.inner.observers.borrow().clone();
        for observer in &observers {
            observer.discard_changes();
        }
    }

    #[must_use]
    pub fn downgrade(&self) -> WeakStateful {
        WeakStateful {
            inner: Rc::downgrade(&self.inner),
        }
    }
}

/// Non-owning handle to a [`Stateful`], for use inside its own callbacks.
#[derive(Clone)]
pub struct WeakStateful {
    inner: Weak<StatefulInner>,
}

impl fmt::Debug for WeakStateful {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakStateful")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

impl WeakStateful {
    #[must_use]
    pub fn upgrade(&self) -> Option<Stateful> {
        self.inner.upgrade().map(|inner| Stateful { inner })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
