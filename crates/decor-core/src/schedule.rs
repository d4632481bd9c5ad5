//! Run-once-at-end-of-microtask scheduling.
//!
//! # Design
//!
//! A [`Scheduler`] queues one-shot callbacks keyed by a monotonically
//! increasing id and runs them at the next checkpoint ([`Scheduler::flush`]),
//! in the order they were scheduled. A callback scheduled while a checkpoint
//! is running joins the same checkpoint, so a checkpoint drains to a fixed
//! point.
//!
//! The host decides when a checkpoint happens. The scheduler tells it when
//! one is needed through an optional [`DrainRequest`] hook, invoked exactly
//! when the scheduler goes from idle to armed. No second request is issued
//! while a checkpoint is outstanding or running.
//!
//! # Invariants
//!
//! 1. `is_armed()` is true from the first `schedule()` after an idle period
//!    until a checkpoint leaves the queue empty.
//! 2. Tasks run in ascending id order; ids are never reused.
//! 3. `ScheduleHandle::remove()` is idempotent and has no effect once the
//!    task has started.
//! 4. A task failure (returned error or caught panic) is logged and counted;
//!    the remaining tasks still run.
//! 5. `flush()` called from inside a running task is a no-op.
//!
//! # Example
//!
//! ```
//! use decor_core::Scheduler;
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! let scheduler = Scheduler::new();
//! let log = Rc::new(RefCell::new(Vec::new()));
//!
//! let l = Rc::clone(&log);
//! scheduler.schedule(move || l.borrow_mut().push("a"));
//! let l = Rc::clone(&log);
//! let cancelled = scheduler.schedule(move || l.borrow_mut().push("b"));
//! cancelled.remove();
//!
//! assert!(scheduler.is_armed());
//! scheduler.flush();
//! assert_eq!(*log.borrow(), vec!["a"]);
//! assert!(!scheduler.is_armed());
//! ```

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::callback::{CallbackOutcome, invoke_isolated, report_failure};
use crate::config::SchedulerConfig;
use crate::error::CallbackError;

type Task = Box<dyn FnOnce() -> Result<(), CallbackError>>;

thread_local! {
    static CURRENT: RefCell<Scheduler> = RefCell::new(Scheduler::new());
}

/// Hook through which the host learns that a checkpoint is needed.
///
/// Implementations should queue a call to [`Scheduler::flush`] after the
/// current synchronous turn; flushing synchronously from inside the hook
/// defeats batching.
pub trait DrainRequest {
    fn request_drain(&self);
}

impl<F: Fn()> DrainRequest for F {
    fn request_drain(&self) {
        self();
    }
}

/// Outcome of one checkpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Tasks executed.
    pub tasks_run: usize,
    /// Tasks that returned an error or panicked.
    pub tasks_failed: usize,
    /// Tasks left queued because the drain limit was reached.
    pub remaining: usize,
}

struct SchedulerState {
    next_id: u64,
    tasks: BTreeMap<u64, Task>,
    in_flight: bool,
    draining: bool,
    config: SchedulerConfig,
    drain_request: Option<Rc<dyn DrainRequest>>,
}

/// Handle to a thread's end-of-microtask queue.
///
/// Cloning a `Scheduler` creates a new handle to the **same** queue.
#[derive(Clone)]
pub struct Scheduler {
    inner: Rc<RefCell<SchedulerState>>,
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let st = self.inner.borrow();
        f.debug_struct("Scheduler")
            .field("pending", &st.tasks.len())
            .field("in_flight", &st.in_flight)
            .field("draining", &st.draining)
            .field("config", &st.config)
            .finish()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(SchedulerConfig::default())
    }

    #[must_use]
    pub fn with_config(config: SchedulerConfig) -> Self {
        Self {
            inner: Rc::new(RefCell::new(SchedulerState {
                next_id: 0,
                tasks: BTreeMap::new(),
                in_flight: false,
                draining: false,
                config,
                drain_request: None,
            })),
        }
    }

    /// The scheduler of the current thread.
    #[must_use]
    pub fn current() -> Self {
        CURRENT.with(|current| current.borrow().clone())
    }

    /// Replace the current thread's scheduler, returning the previous one.
    ///
    /// Tasks already queued stay on the previous scheduler. Hot sets move
    /// their pending deliveries to the new scheduler at their next mark.
    pub fn install(scheduler: Scheduler) -> Scheduler {
        CURRENT.with(|current| current.replace(scheduler))
    }

    #[must_use]
    pub fn config(&self) -> SchedulerConfig {
        self.inner.borrow().config
    }

    pub fn set_config(&self, config: SchedulerConfig) {
        self.inner.borrow_mut().config = config;
    }

    /// Register the hook invoked whenever the scheduler becomes armed.
    pub fn set_drain_request(&self, hook: impl DrainRequest + 'static) {
        self.inner.borrow_mut().drain_request = Some(Rc::new(hook));
    }

    /// Queue `callback` for the next checkpoint.
    pub fn schedule<F, R>(&self, callback: F) -> ScheduleHandle
    where
        F: FnOnce() -> R + 'static,
        R: CallbackOutcome,
    {
        let (id, request) = {
            let mut st = self.inner.borrow_mut();
            let id = st.next_id;
            st.next_id += 1;
            st.tasks
                .insert(id, Box::new(move || callback().into_outcome()));
            if st.in_flight {
                (id, None)
            } else {
                st.in_flight = true;
                (id, st.drain_request.clone())
            }
        };
        if let Some(request) = request {
            tracing::trace!(task = id, "decor scheduler armed");
            request.request_drain();
        }
        ScheduleHandle {
            id,
            scheduler: Rc::downgrade(&self.inner),
        }
    }

    /// Whether a checkpoint has been requested but has not yet emptied the
    /// queue.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.inner.borrow().in_flight
    }

    /// Number of queued tasks.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.borrow().tasks.len()
    }

    /// Run the checkpoint: execute queued tasks until none remain (or the
    /// drain limit is hit).
    pub fn flush(&self) -> DrainReport {
        let (config, request) = {
            let mut st = self.inner.borrow_mut();
            if st.draining {
                return DrainReport::default();
            }
            st.draining = true;
            (st.config, st.drain_request.clone())
        };

        let span = tracing::debug_span!(
            "decor.drain",
            tasks_run = tracing::field::Empty,
            tasks_failed = tracing::field::Empty
        );
        let _enter = span.enter();

        let mut report = DrainReport::default();
        {
            let _guard = DrainGuard { state: &self.inner };
            loop {
                if config.drain_limit.is_some_and(|limit| report.tasks_run >= limit) {
                    break;
                }
                let next = self.inner.borrow_mut().tasks.pop_first();
                let Some((id, task)) = next else {
                    break;
                };
                report.tasks_run += 1;
                if let Err(err) = invoke_isolated(config.catch_panics, task) {
                    report.tasks_failed += 1;
                    report_failure("schedule", id, &err);
                }
            }
        }

        report.remaining = self.pending();
        span.record("tasks_run", report.tasks_run);
        span.record("tasks_failed", report.tasks_failed);
        if report.remaining > 0 {
            tracing::warn!(
                remaining = report.remaining,
                "decor drain limit reached; work deferred to next checkpoint"
            );
            if let Some(request) = request {
                request.request_drain();
            }
        }
        report
    }
}

/// Clears the draining flag (and disarms when idle) even if a task panics
/// with panic isolation disabled.
struct DrainGuard<'a> {
    state: &'a RefCell<SchedulerState>,
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        let mut st = self.state.borrow_mut();
        st.draining = false;
        if st.tasks.is_empty() {
            st.in_flight = false;
        }
    }
}

/// Handle returned by [`Scheduler::schedule`].
#[derive(Debug, Clone)]
pub struct ScheduleHandle {
    id: u64,
    scheduler: Weak<RefCell<SchedulerState>>,
}

impl ScheduleHandle {
    /// Deregister the task before it runs. Returns `true` if this call
    /// removed it; later calls (or calls after it ran) return `false`.
    pub fn remove(&self) -> bool {
        let Some(state) = self.scheduler.upgrade() else {
            return false;
        };
        let removed = state.borrow_mut().tasks.remove(&self.id);
        removed.is_some()
    }

    /// Whether the task is still queued.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.scheduler
            .upgrade()
            .is_some_and(|state| state.borrow().tasks.contains_key(&self.id))
    }

    /// Whether the task is still queued on `scheduler`.
    #[must_use]
    pub fn is_queued_on(&self, scheduler: &Scheduler) -> bool {
        std::ptr::eq(self.scheduler.as_ptr(), Rc::as_ptr(&scheduler.inner)) && self.is_pending()
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Queue `callback` on the current thread's scheduler.
pub fn schedule<F, R>(callback: F) -> ScheduleHandle
where
    F: FnOnce() -> R + 'static,
    R: CallbackOutcome,
{
    Scheduler::current().schedule(callback)
}

/// Run a checkpoint on the current thread's scheduler.
pub fn flush() -> DrainReport {
    Scheduler::current().flush()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn recorder() -> (Rc<RefCell<Vec<u32>>>, impl Fn(u32) -> Box<dyn FnOnce()>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let l = Rc::clone(&log);
        let make = move |n: u32| -> Box<dyn FnOnce()> {
            let l = Rc::clone(&l);
            Box::new(move || l.borrow_mut().push(n))
        };
        (log, make)
    }

    #[test]
    fn runs_in_schedule_order() {
        let scheduler = Scheduler::new();
        let (log, make) = recorder();
        for n in 0..5 {
            scheduler.schedule(make(n));
        }
        let report = scheduler.flush();
        assert_eq!(*log.borrow(), vec![0, 1, 2, 3, 4]);
        assert_eq!(report.tasks_run, 5);
        assert_eq!(report.remaining, 0);
    }

    #[test]
    fn nothing_runs_before_flush() {
        let scheduler = Scheduler::new();
        let (log, make) = recorder();
        scheduler.schedule(make(1));
        assert!(log.borrow().is_empty());
        assert_eq!(scheduler.pending(), 1);
    }

    #[test]
    fn remove_is_idempotent() {
        let scheduler = Scheduler::new();
        let (log, make) = recorder();
        let handle = scheduler.schedule(make(1));
        scheduler.schedule(make(2));
        assert!(handle.is_pending());
        assert!(handle.remove());
        assert!(!handle.remove());
        scheduler.flush();
        assert_eq!(*log.borrow(), vec![2]);
        assert!(!handle.remove());
    }

    #[test]
    fn remove_after_run_is_noop() {
        let scheduler = Scheduler::new();
        let (log, make) = recorder();
        let handle = scheduler.schedule(make(1));
        scheduler.flush();
        assert!(!handle.is_pending());
        assert!(!handle.remove());
        assert_eq!(*log.borrow(), vec![1]);
    }

    #[test]
    fn reentrant_schedule_joins_current_checkpoint() {
        let scheduler = Scheduler::new();
        let (log, make) = recorder();
        let s = scheduler.clone();
        let inner = make(2);
        let outer = make(1);
        scheduler.schedule(move || {
            outer();
            s.schedule(inner);
        });
        let report = scheduler.flush();
        assert_eq!(*log.borrow(), vec![1, 2]);
        assert_eq!(report.tasks_run, 2);
        assert!(!scheduler.is_armed());
    }

    #[test]
    fn task_can_remove_a_later_task() {
        let scheduler = Scheduler::new();
        let (log, make) = recorder();
        let victim: Rc<RefCell<Option<ScheduleHandle>>> = Rc::new(RefCell::new(None));
        let v = Rc::clone(&victim);
        scheduler.schedule(move || {
            if let Some(h) = v.borrow().as_ref() {
                h.remove();
            }
        });
        *victim.borrow_mut() = Some(scheduler.schedule(make(9)));
        scheduler.flush();
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn drain_request_fires_once_per_armed_period() {
        let scheduler = Scheduler::new();
        let requests = Rc::new(Cell::new(0));
        let r = Rc::clone(&requests);
        scheduler.set_drain_request(move || r.set(r.get() + 1));

        scheduler.schedule(|| ());
        scheduler.schedule(|| ());
        scheduler.schedule(|| ());
        assert_eq!(requests.get(), 1);

        scheduler.flush();
        assert!(!scheduler.is_armed());

        scheduler.schedule(|| ());
        assert_eq!(requests.get(), 2);
    }

    #[test]
    fn schedule_during_drain_does_not_rearm() {
        let scheduler = Scheduler::new();
        let requests = Rc::new(Cell::new(0));
        let r = Rc::clone(&requests);
        scheduler.set_drain_request(move || r.set(r.get() + 1));
        let s = scheduler.clone();
        scheduler.schedule(move || {
            s.schedule(|| ());
        });
        scheduler.flush();
        assert_eq!(requests.get(), 1);
    }

    fn explode() {
        panic!("task exploded");
    }

    #[test]
    fn failing_task_does_not_stop_the_rest() {
        let scheduler = Scheduler::new();
        let (log, make) = recorder();
        scheduler.schedule(|| -> Result<(), String> { Err("nope".into()) });
        scheduler.schedule(explode);
        scheduler.schedule(make(3));
        let report = scheduler.flush();
        assert_eq!(report.tasks_run, 3);
        assert_eq!(report.tasks_failed, 2);
        assert_eq!(*log.borrow(), vec![3]);
        assert!(!scheduler.is_armed());
    }

    #[test]
    fn nested_flush_is_noop() {
        let scheduler = Scheduler::new();
        let nested = Rc::new(Cell::new(None));
        let s = scheduler.clone();
        let n = Rc::clone(&nested);
        scheduler.schedule(move || {
            n.set(Some(s.flush()));
        });
        scheduler.flush();
        assert_eq!(nested.get(), Some(DrainReport::default()));
    }

    #[test]
    fn drain_limit_defers_remaining_work() {
        let scheduler = Scheduler::with_config(SchedulerConfig::default().with_drain_limit(2));
        let (log, make) = recorder();
        for n in 0..5 {
            scheduler.schedule(make(n));
        }
        let report = scheduler.flush();
        assert_eq!(report.tasks_run, 2);
        assert_eq!(report.remaining, 3);
        assert!(scheduler.is_armed());
        scheduler.flush();
        scheduler.flush();
        assert_eq!(*log.borrow(), vec![0, 1, 2, 3, 4]);
        assert!(!scheduler.is_armed());
    }

    #[test]
    fn install_swaps_thread_scheduler() {
        let fresh = Scheduler::new();
        let previous = Scheduler::install(fresh.clone());
        let (log, make) = recorder();
        schedule(make(1));
        assert_eq!(fresh.pending(), 1);
        assert_eq!(flush().tasks_run, 1);
        assert_eq!(*log.borrow(), vec![1]);
        Scheduler::install(previous);
    }

    #[test]
    fn handle_outlives_scheduler() {
        let handle = Scheduler::new().schedule(|| ());
        assert!(!handle.is_pending());
        assert!(!handle.remove());
    }
}
