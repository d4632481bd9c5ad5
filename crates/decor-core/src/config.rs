//! Scheduler configuration.

/// Configuration for a [`Scheduler`](crate::Scheduler).
///
/// # Example
///
/// ```
/// use decor_core::SchedulerConfig;
///
/// let config = SchedulerConfig::default()
///     .with_drain_limit(10_000)
///     .with_catch_panics(false);
/// assert_eq!(config.drain_limit, Some(10_000));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SchedulerConfig {
    /// Maximum number of tasks run by one checkpoint. Tasks left over stay
    /// queued (and the scheduler stays armed) until the next checkpoint.
    /// `None` drains to a fixed point.
    pub drain_limit: Option<usize>,
    /// Catch panics raised by callbacks so the remaining callbacks still run.
    /// Has no effect when the binary is built with `panic = "abort"`.
    pub catch_panics: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            drain_limit: None,
            catch_panics: true,
        }
    }
}

impl SchedulerConfig {
    /// Cap the number of tasks one checkpoint may run.
    #[must_use]
    pub fn with_drain_limit(mut self, limit: usize) -> Self {
        self.drain_limit = Some(limit);
        self
    }

    /// Drain to a fixed point regardless of how much work appears.
    #[must_use]
    pub fn unbounded(mut self) -> Self {
        self.drain_limit = None;
        self
    }

    /// Enable or disable panic isolation.
    #[must_use]
    pub fn with_catch_panics(mut self, catch: bool) -> Self {
        self.catch_panics = catch;
        self
    }
}
