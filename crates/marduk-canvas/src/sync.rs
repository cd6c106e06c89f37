//! Lock helpers.
//!
//! A panic while holding one of our locks never leaves protocol state half
//! written in a way later readers could misinterpret, so poisoning is ignored.

use std::sync::{Mutex, MutexGuard, PoisonError};

#[inline]
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
