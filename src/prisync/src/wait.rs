//! Priority-ordered wait queues
use alloc::vec::Vec;
use core::fmt;

use crate::{
    klock::{CpuLockCell, CpuLockGuard},
    order, KernelTraits, ThreadId,
};

/// A queue of blocked threads, served in the order of their effective
/// priorities.
///
/// Threads are inserted at their priority position, but their priorities may
/// change while they wait (because of priority donation), so the queue is
/// re-sorted every time a thread is taken out of it.
pub(crate) struct WaitQueue<Traits> {
    waits: CpuLockCell<Traits, Vec<ThreadId>>,
}

impl<Traits> WaitQueue<Traits> {
    pub(crate) const fn new() -> Self {
        Self {
            waits: CpuLockCell::new(Vec::new()),
        }
    }
}

/// Get the current effective priority of `thread`.
#[inline]
pub(crate) fn priority_of<Traits: KernelTraits>(thread: ThreadId) -> usize {
    Traits::thread_cb(thread).effective_priority()
}

impl<Traits: KernelTraits> WaitQueue<Traits> {
    /// Insert `thread` after all waiters of an equal or higher priority.
    pub(crate) fn push(&self, lock: &mut CpuLockGuard<Traits>, thread: ThreadId) {
        let mut waits = self.waits.write(lock);
        debug_assert!(!waits.contains(&thread), "{thread} is already waiting");
        order::insert_by_priority(&mut *waits, thread, |&t| priority_of::<Traits>(t));
    }

    /// Remove and return the waiter with the highest current priority. Ties
    /// are broken by queue position.
    pub(crate) fn pop_highest(&self, lock: &mut CpuLockGuard<Traits>) -> Option<ThreadId> {
        let mut waits = self.waits.write(lock);
        let thread = order::pop_highest(&mut *waits, |&t| priority_of::<Traits>(t));
        debug_assert!(order::is_sorted_by_priority(&waits[..], |&t| {
            priority_of::<Traits>(t)
        }));
        thread
    }

    pub(crate) fn is_empty(&self, lock: &CpuLockGuard<Traits>) -> bool {
        self.waits.read(lock).is_empty()
    }

    /// Get a snapshot of the waiting threads.
    pub(crate) fn threads(&self, lock: &CpuLockGuard<Traits>) -> Vec<ThreadId> {
        self.waits.read(lock).clone()
    }
}

impl<Traits: KernelTraits> fmt::Debug for WaitQueue<Traits> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("WaitQueue").field(&self.waits).finish()
    }
}
