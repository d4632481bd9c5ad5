//! Callback isolation.
//!
//! Observer and scheduled callbacks may return `()` or any
//! `Result<(), E: Display>`. Both the returned error and, when enabled, a
//! caught panic become a [`CallbackError`] that is logged and counted by
//! [`report_failure`] instead of being propagated.

use std::any::Any;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::CallbackError;

/// Total number of callback failures observed (for diagnostics/telemetry).
static CALLBACK_FAILURES_TOTAL: AtomicU64 = AtomicU64::new(0);

/// Read the total callback failure count.
#[must_use]
pub fn callback_failures_total() -> u64 {
    CALLBACK_FAILURES_TOTAL.load(Ordering::Relaxed)
}

/// Return types accepted from callbacks.
pub trait CallbackOutcome {
    fn into_outcome(self) -> Result<(), CallbackError>;
}

impl CallbackOutcome for () {
    fn into_outcome(self) -> Result<(), CallbackError> {
        Ok(())
    }
}

impl<E: fmt::Display> CallbackOutcome for Result<(), E> {
    fn into_outcome(self) -> Result<(), CallbackError> {
        self.map_err(|err| CallbackError::Failed(err.to_string()))
    }
}

/// Run `f`, converting a panic into [`CallbackError::Panicked`] when
/// `catch_panics` is set.
pub fn invoke_isolated<F>(catch_panics: bool, f: F) -> Result<(), CallbackError>
where
    F: FnOnce() -> Result<(), CallbackError>,
{
    if !catch_panics {
        return f();
    }
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(outcome) => outcome,
        Err(payload) => Err(CallbackError::Panicked(panic_message(payload.as_ref()))),
    }
}

/// Log and count a contained callback failure.
pub fn report_failure(site: &'static str, seq: u64, err: &CallbackError) {
    CALLBACK_FAILURES_TOTAL.fetch_add(1, Ordering::Relaxed);
    tracing::error!(site, seq, error = %err, "decor callback failed");
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_is_success() {
        assert_eq!(().into_outcome(), Ok(()));
    }

    #[test]
    fn result_error_is_stringified() {
        let outcome: Result<(), String> = Err("bad input".into());
        assert_eq!(
            outcome.into_outcome(),
            Err(CallbackError::failed("bad input"))
        );
    }

    #[test]
    fn panics_are_caught_when_enabled() {
        let err = invoke_isolated(true, || panic!("boom")).unwrap_err();
        assert_eq!(err, CallbackError::Panicked("boom".into()));
    }

    #[test]
    fn formatted_panic_message_is_kept() {
        let n = 7;
        let err = invoke_isolated(true, || panic!("bad {n}")).unwrap_err();
        assert_eq!(err, CallbackError::Panicked("bad 7".into()));
    }

    #[test]
    fn report_increments_counter() {
        let before = callback_failures_total();
        report_failure("test", 0, &CallbackError::failed("x"));
        assert!(callback_failures_total() > before);
    }
}
