// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Critical sections for state shared with interrupt context.
//!
//! On bare metal this is "disable interrupts, mutate, restore". On hosted
//! targets an interrupt handler is just another thread, so a plain mutex
//! gives the same exclusion. The protected data is always left consistent
//! by the closures, so a poisoned lock is recovered rather than reported.

use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
pub struct Critical<T> {
    inner: Mutex<T>,
}

impl<T> Critical<T> {
    pub const fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(value),
        }
    }

    /// Run `f` with interrupts masked.
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.enter();
        f(&mut guard)
    }

    pub(crate) fn enter(&self) -> MutexGuard<'_, T> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
