//! Auto-reset binary signal.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// A flag one thread sets and exactly one other thread waits on.
///
/// [`Event::wait`] blocks until the flag is set and clears it again before
/// returning, so every `set` releases at most one `wait`.
#[derive(Debug, Default)]
pub(crate) struct Event {
    flag: Mutex<bool>,
    cond: Condvar,
}

impl Event {
    pub(crate) fn set(&self) {
        *self.lock() = true;
        self.cond.notify_one();
    }

    pub(crate) fn reset(&self) {
        *self.lock() = false;
    }

    pub(crate) fn wait(&self) {
        let mut flag = self.lock();
        while !*flag {
            flag = self.cond.wait(flag).unwrap_or_else(PoisonError::into_inner);
        }
        *flag = false;
    }

    fn lock(&self) -> MutexGuard<'_, bool> {
        self.flag.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
