use std::sync::{Mutex, MutexGuard};

use tracing::warn;

/// Lock `mutex`, recovering the guard if a listener panicked while holding it.
pub(crate) fn acquire<'a, T>(mutex: &'a Mutex<T>, op: &'static str) -> MutexGuard<'a, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        warn!(
            op,
            result = "poisoned_recovered",
            hint = "state may be stale after a panic on another task",
            "Recovered from poisoned client lock"
        );
        poisoned.into_inner()
    })
}
