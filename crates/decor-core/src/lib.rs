#![forbid(unsafe_code)]

//! Core: end-of-microtask scheduling, the dynamic value model, and the
//! delivery queues shared by both change-notification engines.
//!
//! # Architecture
//!
//! Everything here is single-threaded. The [`Scheduler`] and every
//! [`HotSet`] live in thread-local storage and are shared through cheap
//! `Rc` handles. "End of microtask" is an explicit checkpoint: the host
//! calls [`flush`] (or [`Scheduler::flush`]) once its current synchronous
//! turn finishes, and may register a [`DrainRequest`] hook to learn when a
//! checkpoint is needed.
//!
//! # Invariants
//!
//! 1. At most one delivery pass per [`HotSet`] is armed at a time.
//! 2. Callbacks scheduled between two checkpoints run in one checkpoint, in
//!    the order they were scheduled, including ones scheduled while the
//!    checkpoint is running.
//! 3. A failing callback is logged and counted; it never prevents the next
//!    callback from running.

pub mod callback;
pub mod config;
pub mod error;
pub mod hot;
pub mod schedule;
pub mod value;

pub use callback::{CallbackOutcome, callback_failures_total, invoke_isolated, report_failure};
pub use config::SchedulerConfig;
pub use error::{CallbackError, DecorError, Result};
pub use hot::{Deliver, HotSet};
pub use schedule::{DrainReport, DrainRequest, ScheduleHandle, Scheduler, flush, schedule};
pub use value::Value;
