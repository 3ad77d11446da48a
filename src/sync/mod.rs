pub use fanin::FanIn;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod fanin;

/// Locks a mutex, ignoring poisoning: every critical section in this crate
/// leaves the guarded data consistent even when a panic unwinds through it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
