#![forbid(unsafe_code)]

//! Stateful objects and property-map change notification.
//!
//! # Architecture
//!
//! - [`stateful`]: classes with declared properties, optional custom
//!   accessors, and per-instance shadow stores.
//! - [`notifier`]: per-registration collectors of `property -> old value`,
//!   drained at scheduler checkpoints in registration order.
//! - [`pojo`]: plain property bags with synchronous watchers.
//! - [`observe`]: one entry point over both.
//! - [`lifecycle`]: ownership and bulk release of disposable handles.
//!
//! # Example
//!
//! ```
//! use decor_core::{Scheduler, Value};
//! use decor_runtime::{Class, OldValues, Stateful, observe};
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! let scheduler = Scheduler::current();
//! let class = Class::builder("Point").property("x", 0).property("y", 0).build();
//! let point = Stateful::new(&class);
//!
//! let seen = Rc::new(RefCell::new(Vec::new()));
//! let s = Rc::clone(&seen);
//! let handle = observe(&point, move |old: &OldValues| s.borrow_mut().push(old.clone()));
//!
//! point.set("x", 1).unwrap();
//! point.set("x", 2).unwrap();
//! scheduler.flush();
//!
//! assert_eq!(seen.borrow().len(), 1);
//! assert_eq!(seen.borrow()[0].get("x"), Some(&Value::from(0)));
//! handle.remove();
//! ```

pub mod lifecycle;
pub mod notifier;
pub mod observe;
pub mod pojo;
pub mod stateful;

pub use lifecycle::{
    Capabilities, DeferHandle, Disposable, IntoDisposable, Lifecycle, OwnedHandle, Settle,
};
pub use notifier::{Notifier, OldValues, PropertyCallback, hot_notifiers, property_callback};
pub use observe::{Observe, ObserveHandle, observe};
pub use pojo::{Pojo, WatchHandle, Watcher};
pub use stateful::{
    Accessor, AccessorStrategy, Class, ClassBuilder, ClassDescriptor, PropertyDescriptor,
    Stateful, WeakStateful,
};
