//! Poison-tolerant mutex access.
//!
//! A panic on a service thread must not take the session down with it, so
//! every lock in the crate recovers the guard from a poisoned mutex.

use std::sync::{Mutex, MutexGuard, TryLockError};

/// Locks `mutex`, recovering the guard if a holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poison| poison.into_inner())
}

/// Locks `mutex` only if it is free right now.
pub(crate) fn try_lock<T>(mutex: &Mutex<T>) -> Option<MutexGuard<'_, T>> {
    match mutex.try_lock() {
        Ok(guard) => Some(guard),
        Err(TryLockError::Poisoned(poison)) => Some(poison.into_inner()),
        Err(TryLockError::WouldBlock) => None,
    }
}
