#![forbid(unsafe_code)]

//! decor public facade crate.
//!
//! Two notification engines share one scheduler:
//!
//! - `runtime`: stateful objects whose observers receive a
//!   `property -> old value` map per checkpoint.
//! - `observable`: targets emitting typed change records, including merged
//!   array splices.
//!
//! Nothing is delivered until the host reaches a checkpoint with
//! [`flush`].

pub use decor_core::{
    CallbackError, DecorError, Result, Scheduler, SchedulerConfig, Value, flush, schedule,
};

pub mod prelude {
    pub use decor_core as core;
    #[cfg(feature = "observable")]
    pub use decor_observable as observable;
    #[cfg(feature = "runtime")]
    pub use decor_runtime as runtime;

    pub use decor_core::{Scheduler, SchedulerConfig, Value, flush, schedule};
    #[cfg(feature = "observable")]
    pub use decor_observable::{
        AcceptList, Change, ChangeCallback, ChangeRecord, ChangeType, Observable,
        ObservableArray, ObservableObject, Splice,
    };
    #[cfg(feature = "runtime")]
    pub use decor_runtime::{Class, Disposable, Lifecycle, OldValues, Pojo, Stateful, observe};
}
