//! Counting semaphore bounding in-flight parse jobs.
//!
//! Uses `Mutex + Condvar` from std. Poisoning is ignored: the count itself is
//! always consistent, a panicking holder still releases through `Drop`.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// A counting semaphore that limits concurrent access to a shared resource.
#[derive(Debug)]
pub struct Semaphore {
    permits: Mutex<usize>,
    cond: Condvar,
}

/// RAII guard that releases one permit on drop.
#[derive(Debug)]
pub struct SemaphoreGuard<'a>(&'a Semaphore);

impl Semaphore {
    /// Create a semaphore with `permits` initial permits.
    pub fn new(permits: usize) -> Self {
        Self {
            permits: Mutex::new(permits),
            cond: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, usize> {
        self.permits.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block until a permit is available, then acquire it.
    pub fn acquire(&self) -> SemaphoreGuard<'_> {
        let mut count = self.lock();
        while *count == 0 {
            count = self
                .cond
                .wait(count)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *count -= 1;
        SemaphoreGuard(self)
    }

    /// Permits currently free
    pub fn available(&self) -> usize {
        *self.lock()
    }
}

impl Drop for SemaphoreGuard<'_> {
    fn drop(&mut self) {
        *self.0.lock() += 1;
        self.0.cond.notify_one();
    }
}
