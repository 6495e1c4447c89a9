//! Semaphores
use alloc::vec::Vec;
use core::fmt;

use crate::{
    error::{DownError, PollError},
    klock::{self, CpuLockCell, CpuLockGuard},
    state, thread,
    utils::panicking::ResultExt,
    wait::WaitQueue,
    KernelTraits, ThreadId,
};

/// A counting semaphore whose waiters are woken in priority order.
///
/// A semaphore holds a non-negative counter and supports two atomic
/// operations: [`down`] waits for the counter to become positive and then
/// decrements it, and [`up`] increments it and wakes up the highest-priority
/// waiter, if any.
///
/// [`down`]: Self::down
/// [`up`]: Self::up
pub struct Semaphore<Traits> {
    value: CpuLockCell<Traits, usize>,
    wait_queue: WaitQueue<Traits>,
}

impl<Traits> Semaphore<Traits> {
    /// Construct a `Semaphore` with the specified initial value and no
    /// waiters.
    pub const fn new(value: usize) -> Self {
        Self {
            value: CpuLockCell::new(value),
            wait_queue: WaitQueue::new(),
        }
    }
}

impl<Traits: KernelTraits> Semaphore<Traits> {
    /// Wait until the value becomes positive and then decrement it.
    ///
    /// # Panics
    ///
    /// Panics if called from an interrupt handler or in a CPU Lock state.
    pub fn down(&self) {
        self.down_checked().or_violation("Semaphore::down")
    }

    fn down_checked(&self) -> Result<(), DownError> {
        state::expect_waitable_context::<Traits>()?;
        let mut lock = klock::lock_cpu::<Traits>()?;
        self.down_core(&mut lock);
        Ok(())
    }

    /// Decrement the value if it's positive. Returns `true` on success. Never
    /// blocks, so this may be called from an interrupt handler.
    pub fn try_down(&self) -> bool {
        self.try_down_checked().or_violation("Semaphore::try_down")
    }

    fn try_down_checked(&self) -> Result<bool, PollError> {
        let mut lock = klock::lock_cpu::<Traits>()?;
        Ok(self.poll_core(&mut lock))
    }

    /// Increment the value and wake up the waiter with the highest current
    /// priority. May be called from an interrupt handler.
    ///
    /// If the woken thread has a higher priority than the current thread, the
    /// current thread yields the processor immediately (or, in an interrupt
    /// handler, when the handler returns).
    pub fn up(&self) {
        self.up_checked().or_violation("Semaphore::up")
    }

    fn up_checked(&self) -> Result<(), PollError> {
        let mut lock = klock::lock_cpu::<Traits>()?;
        self.up_core(&mut lock);
        Ok(())
    }

    /// Get the current value.
    pub fn value(&self) -> usize {
        self.value_checked().or_violation("Semaphore::value")
    }

    fn value_checked(&self) -> Result<usize, PollError> {
        let lock = klock::lock_cpu::<Traits>()?;
        Ok(self.value.get(&lock))
    }

    /// Return `true` if any thread is blocked on this semaphore.
    pub fn has_waiters(&self) -> bool {
        self.has_waiters_checked()
            .or_violation("Semaphore::has_waiters")
    }

    fn has_waiters_checked(&self) -> Result<bool, PollError> {
        let lock = klock::lock_cpu::<Traits>()?;
        Ok(!self.wait_queue.is_empty(&lock))
    }

    /// Check if the current value satisfies the wait condition.
    ///
    /// If it does, this method decrements the value and returns `true`.
    /// Otherwise, it returns `false`.
    #[inline]
    pub(crate) fn poll_core(&self, lock: &mut CpuLockGuard<Traits>) -> bool {
        let mut value = self.value.write(lock);
        if *value > 0 {
            *value -= 1;
            true
        } else {
            false
        }
    }

    /// Enqueue the current thread and block until an `up` wakes it up. The
    /// caller must re-check the value afterwards.
    pub(crate) fn wait_core(&self, lock: &mut CpuLockGuard<Traits>) {
        let thread = Traits::current_thread();
        self.wait_queue.push(lock, thread);
        log::trace!("{thread} blocks on semaphore {:p}", self);
        thread::block_current(lock);
    }

    /// The body of `down`. Each iteration of the loop blocks; it repeats only
    /// if another thread consumed the value between the wake-up and the
    /// resumption of this thread.
    pub(crate) fn down_core(&self, lock: &mut CpuLockGuard<Traits>) {
        while !self.poll_core(lock) {
            self.wait_core(lock);
        }
    }

    pub(crate) fn up_core(&self, lock: &mut CpuLockGuard<Traits>) {
        if let Some(thread) = self.wait_queue.pop_highest(lock) {
            log::trace!("semaphore {:p} wakes up {thread}", self);
            thread::unblock(lock, thread);
        }

        *self.value.write(lock) += 1;

        thread::yield_if_needed(lock);
    }

    /// Get a snapshot of the waiting threads.
    pub(crate) fn waiters(&self, lock: &CpuLockGuard<Traits>) -> Vec<ThreadId> {
        self.wait_queue.threads(lock)
    }
}

impl<Traits: KernelTraits> fmt::Debug for Semaphore<Traits> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Semaphore")
            .field("self", &(self as *const _))
            .field("value", &self.value)
            .field("wait_queue", &self.wait_queue)
            .finish()
    }
}
