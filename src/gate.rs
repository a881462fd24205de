// src/gate.rs
//! One-shot completion gate bridging a blocked thread to asynchronous work.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Condvar, Mutex};

/// Holds exactly one terminal value. The first `release` wins; later calls are
/// ignored. `wait` blocks until a value is present and takes it.
#[derive(Debug)]
pub struct CompletionGate<T> {
    released: AtomicBool,
    slot: Mutex<Option<T>>,
    cv: Condvar,
}

impl<T> Default for CompletionGate<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> CompletionGate<T> {
    pub fn new() -> Self {
        Self {
            released: AtomicBool::new(false),
            slot: Mutex::new(None),
            cv: Condvar::new(),
        }
    }

    /// Store `value` and wake the waiter. Returns `false` if the gate was
    /// already released, in which case `value` is dropped.
    pub fn release(&self, value: T) -> bool {
        if self
            .released
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        let mut slot = self.slot.lock();
        *slot = Some(value);
        self.cv.notify_all();
        true
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Block the current thread until a value is released, then return it.
    /// Must be called at most once per gate.
    pub fn wait(&self) -> T {
        let mut slot = self.slot.lock();
        loop {
            if let Some(v) = slot.take() {
                return v;
            }
            self.cv.wait(&mut slot);
        }
    }
}
