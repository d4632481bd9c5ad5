#![forbid(unsafe_code)]

//! Change-record observation.
//!
//! Targets own a [`Notifier`] that emits typed [`ChangeRecord`]s. Observers
//! register a [`ChangeCallback`] with an [`AcceptList`] and receive every
//! accepted record of a tick in one batch at the next scheduler checkpoint.
//!
//! # Architecture
//!
//! - [`change`]: record types, property keys, accept lists.
//! - [`notifier`]: per-object notifiers, `perform_change` transactions and
//!   per-callback queues.
//! - [`observable`]: the [`Observable`] trait and [`ObservableObject`].
//! - [`array`]: [`ObservableArray`] and merged splice observation.
//! - [`splice`]: the splice merger.
//!
//! # Example
//!
//! ```
//! use decor_core::Scheduler;
//! use decor_observable::{ObservableArray, Splice};
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! let scheduler = Scheduler::current();
//! let array: ObservableArray = ["a", "b", "c"].into_iter().collect();
//!
//! let seen = Rc::new(RefCell::new(Vec::new()));
//! let s = Rc::clone(&seen);
//! let handle = array.observe_splices(move |splices: &[Splice]| {
//!     s.borrow_mut().extend_from_slice(splices);
//! });
//!
//! array.push(["d"]);
//! array.push(["e"]);
//! scheduler.flush();
//!
//! assert_eq!(*seen.borrow(), vec![Splice::new(3, Vec::new(), 2)]);
//! handle.remove();
//! ```

pub mod array;
pub mod change;
pub mod notifier;
pub mod observable;
pub mod splice;

pub use array::{ObservableArray, SPLICE_ACCEPT, observe_splices};
pub use change::{AcceptList, Change, ChangeRecord, ChangeType, ObjectId, PropertyKey};
pub use notifier::{
    ChangeCallback, Notifier, ObservationHandle, deliver_change_records, hot_callbacks,
};
pub use observable::{Observable, ObservableObject, Setter, get_notifier, observe, unobserve};
pub use splice::{Splice, apply_splices, intersect, merge_splice, merge_splices};
