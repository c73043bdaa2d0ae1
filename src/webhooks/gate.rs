//! Per-instance request serialization.
//!
//! Each webhook instance evaluates one request at a time. The lock covers
//! decode, evaluation and serialization; the guard is released on every
//! return path, including unwinding out of a panicking closure.

use std::sync::{Mutex, PoisonError, TryLockError};

/// Exclusive gate around request handling
#[derive(Debug, Default)]
pub struct RequestGate {
    lock: Mutex<()>,
}

impl RequestGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding the gate.
    ///
    /// Handling never awaits, so a blocking mutex is held only for the
    /// duration of a synchronous computation. A poisoned lock is recovered:
    /// the guarded state is `()` and cannot be left inconsistent.
    pub fn admit<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        f()
    }

    /// Check whether a request currently holds the gate
    pub fn is_busy(&self) -> bool {
        matches!(self.lock.try_lock(), Err(TryLockError::WouldBlock))
    }
}
