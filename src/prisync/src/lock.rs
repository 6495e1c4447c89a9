//! Locks
use core::{fmt, ptr::NonNull};

use crate::{
    donation,
    error::{
        AcquireError, NotOwnerError, PollError, ReleaseError, TryAcquireError, WouldDeadlockError,
    },
    klock::{self, CpuLockCell, CpuLockGuard},
    semaphore::Semaphore,
    state,
    utils::panicking::ResultExt,
    KernelTraits, ThreadId,
};

/// A non-recursive lock with priority donation.
///
/// A lock is a binary semaphore with an owner. Only the thread that acquired
/// it may release it.
///
/// When priority donation is enabled (see
/// [`KernelCfg::is_priority_donation_enabled`]), a thread blocking in
/// [`acquire`] lends its priority to the holder (and to the holder's own
/// blockers, up to [`KernelCfg::DONATION_DEPTH_LIMIT`] levels), and the holder
/// gives it back in [`release`].
///
/// [`KernelCfg::is_priority_donation_enabled`]: crate::KernelCfg::is_priority_donation_enabled
/// [`KernelCfg::DONATION_DEPTH_LIMIT`]: crate::KernelCfg::DONATION_DEPTH_LIMIT
/// [`acquire`]: Self::acquire
/// [`release`]: Self::release
pub struct Lock<Traits> {
    semaphore: Semaphore<Traits>,
    holder: CpuLockCell<Traits, Option<ThreadId>>,
}

/// A reference to the [`Lock`] a thread is blocked on, stored in
/// [`ThreadCb`](crate::ThreadCb).
pub(crate) struct LockRef<Traits>(NonNull<Lock<Traits>>);

// Safety: `LockRef` is only dereferenced in a CPU Lock state, and `Lock` is
// `Sync`
unsafe impl<Traits> Send for LockRef<Traits> {}
unsafe impl<Traits> Sync for LockRef<Traits> {}

impl<Traits> Clone for LockRef<Traits> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<Traits> Copy for LockRef<Traits> {}

impl<Traits> LockRef<Traits> {
    #[inline]
    fn new(lock: &Lock<Traits>) -> Self {
        Self(NonNull::from(lock))
    }

    /// Return `true` if `self` refers to `lock`.
    #[inline]
    pub(crate) fn points_to(self, lock: &Lock<Traits>) -> bool {
        self.0 == NonNull::from(lock)
    }

    /// Get a reference to the lock.
    ///
    /// # Safety
    ///
    /// The lock must be alive for `'a`. This holds while the thread that
    /// stores this `LockRef` as its `waiting_lock` is inside `Lock::acquire`.
    #[inline]
    pub(crate) unsafe fn as_ref<'a>(self) -> &'a Lock<Traits> {
        // Safety: Upheld by the caller
        unsafe { &*self.0.as_ptr() }
    }
}

impl<Traits> fmt::Debug for LockRef<Traits> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("LockRef").field(&self.0).finish()
    }
}

impl<Traits> Lock<Traits> {
    /// Construct a `Lock` in the released state.
    pub const fn new() -> Self {
        Self {
            semaphore: Semaphore::new(1),
            holder: CpuLockCell::new(None),
        }
    }
}

impl<Traits> Default for Lock<Traits> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Traits: KernelTraits> Lock<Traits> {
    /// Acquire the lock, waiting until it becomes available if necessary.
    ///
    /// # Panics
    ///
    /// Panics if the current thread already holds the lock, if called from an
    /// interrupt handler, or in a CPU Lock state.
    pub fn acquire(&self) {
        self.acquire_checked().or_violation("Lock::acquire")
    }

    fn acquire_checked(&self) -> Result<(), AcquireError> {
        state::expect_waitable_context::<Traits>()?;
        let mut lock = klock::lock_cpu::<Traits>()?;
        self.expect_not_held_by_current(&lock)?;
        self.acquire_core(&mut lock);
        Ok(())
    }

    /// Acquire the lock if it's available. Returns `true` on success. Never
    /// blocks and never donates priority.
    ///
    /// # Panics
    ///
    /// Panics if the current thread already holds the lock or in a CPU Lock
    /// state.
    pub fn try_acquire(&self) -> bool {
        self.try_acquire_checked()
            .or_violation("Lock::try_acquire")
    }

    fn try_acquire_checked(&self) -> Result<bool, TryAcquireError> {
        let mut lock = klock::lock_cpu::<Traits>()?;
        self.expect_not_held_by_current(&lock)?;

        if !self.semaphore.poll_core(&mut lock) {
            return Ok(false);
        }

        self.take_ownership(&mut lock, Traits::current_thread());
        Ok(true)
    }

    /// Release the lock.
    ///
    /// In donation mode, this revokes the donations the current thread
    /// received through this lock and recalculates its priority before waking
    /// up the highest-priority waiter. This may yield the processor.
    ///
    /// # Panics
    ///
    /// Panics if the current thread does not hold the lock, if called from an
    /// interrupt handler, or in a CPU Lock state.
    pub fn release(&self) {
        self.release_checked().or_violation("Lock::release")
    }

    fn release_checked(&self) -> Result<(), ReleaseError> {
        state::expect_waitable_context::<Traits>()?;
        let mut lock = klock::lock_cpu::<Traits>()?;
        self.expect_held_by_current(&lock)?;
        self.release_core(&mut lock);
        Ok(())
    }

    /// Return `true` if the current thread holds the lock.
    ///
    /// Testing whether *another* thread holds the lock is not supported; the
    /// answer could change before the caller acted on it.
    pub fn held_by_current_thread(&self) -> bool {
        self.held_by_current_thread_checked()
            .or_violation("Lock::held_by_current_thread")
    }

    fn held_by_current_thread_checked(&self) -> Result<bool, PollError> {
        let lock = klock::lock_cpu::<Traits>()?;
        Ok(self.holder(&lock) == Some(Traits::current_thread()))
    }

    #[inline]
    pub(crate) fn holder(&self, lock: &CpuLockGuard<Traits>) -> Option<ThreadId> {
        self.holder.get(lock)
    }

    pub(crate) fn expect_held_by_current(
        &self,
        lock: &CpuLockGuard<Traits>,
    ) -> Result<(), NotOwnerError> {
        if self.holder(lock) == Some(Traits::current_thread()) {
            Ok(())
        } else {
            Err(NotOwnerError::NotOwner)
        }
    }

    fn expect_not_held_by_current(
        &self,
        lock: &CpuLockGuard<Traits>,
    ) -> Result<(), WouldDeadlockError> {
        if self.holder(lock) == Some(Traits::current_thread()) {
            Err(WouldDeadlockError::WouldDeadlock)
        } else {
            Ok(())
        }
    }

    /// The body of `acquire`. The caller must check that the current thread
    /// does not hold the lock.
    pub(crate) fn acquire_core(&self, lock: &mut CpuLockGuard<Traits>) {
        let current = Traits::current_thread();
        let donation = Traits::is_priority_donation_enabled();

        while !self.semaphore.poll_core(lock) {
            if donation {
                if let Some(holder) = self.holder(lock) {
                    Traits::thread_cb(current)
                        .waiting_lock
                        .replace(lock, Some(LockRef::new(self)));
                    donation::add_donor::<Traits>(lock, holder, current);
                    donation::donate::<Traits>(lock, current);
                }
            }

            self.semaphore.wait_core(lock);
        }

        if donation {
            Traits::thread_cb(current).waiting_lock.replace(lock, None);
        }

        self.take_ownership(lock, current);
    }

    fn take_ownership(&self, lock: &mut CpuLockGuard<Traits>, thread: ThreadId) {
        debug_assert_eq!(self.holder(lock), None);
        self.holder.replace(lock, Some(thread));

        if Traits::is_priority_donation_enabled() {
            let waiters = self.semaphore.waiters(lock);
            donation::inherit::<Traits>(lock, thread, &waiters);
        }

        log::trace!("{thread} acquires lock {:p}", self);
    }

    /// The body of `release`. The caller must check that the current thread
    /// holds the lock.
    pub(crate) fn release_core(&self, lock: &mut CpuLockGuard<Traits>) {
        let current = Traits::current_thread();
        self.holder.replace(lock, None);

        if Traits::is_priority_donation_enabled() {
            donation::revoke::<Traits>(lock, current, self);
            let priority = donation::refresh_priority::<Traits>(lock, current);
            log::trace!("{current} releases lock {:p}, priority = {priority}", self);
        } else {
            log::trace!("{current} releases lock {:p}", self);
        }

        self.semaphore.up_core(lock);
    }
}

impl<Traits: KernelTraits> fmt::Debug for Lock<Traits> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lock")
            .field("self", &(self as *const _))
            .field("holder", &self.holder)
            .field("semaphore", &self.semaphore)
            .finish()
    }
}
