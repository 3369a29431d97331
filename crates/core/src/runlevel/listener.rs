use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::errors::CoreError;

/// Observer of run-level progress
///
/// Callbacks run on the thread performing the transition. A panicking
/// listener is logged and skipped.
pub trait RunLevelListener: Send + Sync {
    /// The controller settled on `level`
    fn on_progress(&self, _level: i32) {}

    /// A transition was cancelled; the controller stopped at `level`
    fn on_cancelled(&self, _level: i32) {}

    /// Activating `level` failed
    fn on_error(&self, _level: i32, _error: &CoreError) {}
}

pub(crate) fn each(listeners: &[Arc<dyn RunLevelListener>], deliver: impl Fn(&dyn RunLevelListener)) {
    for listener in listeners {
        if catch_unwind(AssertUnwindSafe(|| deliver(listener.as_ref()))).is_err() {
            tracing::warn!("Run level listener panicked");
        }
    }
}
