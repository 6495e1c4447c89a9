//! Condition variables
use alloc::{sync::Arc, vec::Vec};
use core::fmt;

use crate::{
    error::{PollError, SignalError, WaitError},
    klock::{self, CpuLockCell, CpuLockGuard},
    lock::Lock,
    order,
    semaphore::Semaphore,
    state,
    utils::panicking::ResultExt,
    wait::priority_of,
    KernelTraits, ThreadId,
};

/// A Mesa-style condition variable.
///
/// A condition variable allows one piece of code to signal a condition and
/// cooperating code to receive the signal and act upon it. Each condition
/// variable is used with a [`Lock`] that protects the condition.
///
/// Signaling is not atomic with the waiter's re-acquisition of the lock, so a
/// woken waiter must re-check its condition (see [`wait_while`]).
///
/// [`wait_while`]: Self::wait_while
pub struct Condvar<Traits> {
    waiters: CpuLockCell<Traits, Vec<Arc<Waiter<Traits>>>>,
}

/// A thread waiting on a [`Condvar`]. Each waiter has a private semaphore, so
/// `signal` can wake up a specific thread.
struct Waiter<Traits> {
    thread: ThreadId,
    semaphore: Semaphore<Traits>,
}

impl<Traits> Condvar<Traits> {
    /// Construct a `Condvar` with no waiters.
    pub const fn new() -> Self {
        Self {
            waiters: CpuLockCell::new(Vec::new()),
        }
    }
}

impl<Traits> Default for Condvar<Traits> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Traits: KernelTraits> Condvar<Traits> {
    /// Atomically release `mutex` and wait for this condition variable to be
    /// signaled. `mutex` is re-acquired before returning.
    ///
    /// # Panics
    ///
    /// Panics if the current thread does not hold `mutex`, if called from an
    /// interrupt handler, or in a CPU Lock state.
    pub fn wait(&self, mutex: &Lock<Traits>) {
        self.wait_checked(mutex).or_violation("Condvar::wait")
    }

    fn wait_checked(&self, mutex: &Lock<Traits>) -> Result<(), WaitError> {
        state::expect_waitable_context::<Traits>()?;
        let mut lock = klock::lock_cpu::<Traits>()?;
        mutex.expect_held_by_current(&lock)?;

        let waiter = Arc::new(Waiter {
            thread: Traits::current_thread(),
            semaphore: Semaphore::new(0),
        });

        {
            let mut waiters = self.waiters.write(&mut lock);
            order::insert_by_priority(&mut *waiters, Arc::clone(&waiter), |w| {
                priority_of::<Traits>(w.thread)
            });
        }

        mutex.release_core(&mut lock);
        waiter.semaphore.down_core(&mut lock);
        mutex.acquire_core(&mut lock);

        Ok(())
    }

    /// Wait on this condition variable as long as `condition` returns `true`.
    /// `condition` is evaluated with `mutex` held.
    ///
    /// # Panics
    ///
    /// See [`wait`](Self::wait).
    pub fn wait_while(&self, mutex: &Lock<Traits>, mut condition: impl FnMut() -> bool) {
        while condition() {
            self.wait(mutex);
        }
    }

    /// Wake up the waiter with the highest current priority, if any.
    ///
    /// # Panics
    ///
    /// Panics if the current thread does not hold `mutex`, if called from an
    /// interrupt handler, or in a CPU Lock state.
    pub fn signal(&self, mutex: &Lock<Traits>) {
        self.signal_checked(mutex, false)
            .or_violation("Condvar::signal")
    }

    /// Wake up all waiters.
    ///
    /// # Panics
    ///
    /// See [`signal`](Self::signal).
    pub fn broadcast(&self, mutex: &Lock<Traits>) {
        self.signal_checked(mutex, true)
            .or_violation("Condvar::broadcast")
    }

    fn signal_checked(&self, mutex: &Lock<Traits>, all: bool) -> Result<(), SignalError> {
        state::expect_waitable_context::<Traits>()?;
        let mut lock = klock::lock_cpu::<Traits>()?;
        mutex.expect_held_by_current(&lock)?;

        if all {
            while self.signal_core(&mut lock) {}
        } else {
            self.signal_core(&mut lock);
        }

        Ok(())
    }

    /// Wake up one waiter. Returns `false` if there were no waiters.
    fn signal_core(&self, lock: &mut CpuLockGuard<Traits>) -> bool {
        let waiter = {
            let mut waiters = self.waiters.write(lock);
            order::pop_highest(&mut *waiters, |w| priority_of::<Traits>(w.thread))
        };

        match waiter {
            Some(waiter) => {
                log::trace!("condvar {:p} signals {}", self, waiter.thread);
                waiter.semaphore.up_core(lock);
                true
            }
            None => false,
        }
    }

    /// Return `true` if any thread is waiting on this condition variable.
    pub fn has_waiters(&self) -> bool {
        self.has_waiters_checked()
            .or_violation("Condvar::has_waiters")
    }

    fn has_waiters_checked(&self) -> Result<bool, PollError> {
        let lock = klock::lock_cpu::<Traits>()?;
        let has_waiters = !self.waiters.read(&lock).is_empty();
        Ok(has_waiters)
    }
}

impl<Traits: KernelTraits> fmt::Debug for Condvar<Traits> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let waiters: Option<Vec<ThreadId>> = match klock::lock_cpu::<Traits>() {
            Ok(lock) => {
                let waiters = self.waiters.read(&lock);
                Some(waiters.iter().map(|w| w.thread).collect())
            }
            Err(_) => None,
        };

        f.debug_struct("Condvar")
            .field("self", &(self as *const _))
            .field("waiters", &waiters)
            .finish()
    }
}
