//! Re-entrant import lock.
//!
//! A module's init may import further modules through the same hook, so the
//! thread holding the lock can take it again. Other threads wait on a
//! condition variable until the owner's outermost guard is dropped.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

#[derive(Debug, Default)]
struct Owner {
    thread: Option<ThreadId>,
    depth: usize,
}

#[derive(Debug, Default)]
pub(crate) struct ImportLock {
    owner: Mutex<Owner>,
    released: Condvar,
}

impl ImportLock {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    // Owner is only touched under the mutex and updated in single steps, so a
    // poisoned lock still holds consistent state.
    fn state(&self) -> MutexGuard<'_, Owner> {
        self.owner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn acquire(&self) -> ImportLockGuard<'_> {
        let me = thread::current().id();
        let mut owner = self.state();
        loop {
            match owner.thread {
                None => {
                    owner.thread = Some(me);
                    owner.depth = 1;
                    break;
                }
                Some(id) if id == me => {
                    owner.depth += 1;
                    break;
                }
                Some(_) => {
                    owner = self
                        .released
                        .wait(owner)
                        .unwrap_or_else(PoisonError::into_inner);
                }
            }
        }
        tracing::trace!(depth = owner.depth, "import lock acquired");
        ImportLockGuard { lock: self }
    }

    #[cfg(test)]
    fn depth(&self) -> usize {
        self.state().depth
    }
}

pub(crate) struct ImportLockGuard<'a> {
    lock: &'a ImportLock,
}

impl Drop for ImportLockGuard<'_> {
    fn drop(&mut self) {
        let mut owner = self.lock.state();
        owner.depth = owner.depth.saturating_sub(1);
        if owner.depth == 0 {
            owner.thread = None;
            drop(owner);
            self.lock.released.notify_one();
        }
    }
}
