//! Threads
//!
//! The port owns threads. This module defines the per-thread state this crate
//! attaches to each of them ([`ThreadCb`]) and the priority operations that
//! interact with priority donation.
use alloc::vec::Vec;
use core::{
    fmt,
    sync::atomic::{AtomicUsize, Ordering},
};

use crate::{
    cfg,
    donation,
    error::{PollError, SetPriorityError},
    klock::{self, CpuLockCell, CpuLockGuard},
    lock::LockRef,
    utils::panicking::ResultExt,
    KernelTraits, PortThreading, ThreadId,
};

/// *Thread control block* - the state data of a thread, as far as this crate
/// is concerned.
///
/// A port allocates one for each thread and returns it from
/// [`KernelCfg::thread_cb`](crate::KernelCfg::thread_cb).
pub struct ThreadCb<Traits> {
    /// The priority assigned to the thread, excluding donations.
    base_priority: AtomicUsize,

    /// The priority the thread is scheduled by. This is the maximum of
    /// `base_priority` and the priorities donated to the thread.
    ///
    /// Written only in a CPU Lock state. Ports may read it at any time.
    effective_priority: AtomicUsize,

    /// The lock the thread is currently blocked acquiring (in donation mode).
    pub(crate) waiting_lock: CpuLockCell<Traits, Option<LockRef<Traits>>>,

    /// The threads donating their priorities to this thread, in descending
    /// priority order as of the last update.
    pub(crate) donated_by: CpuLockCell<Traits, Vec<ThreadId>>,
}

impl<Traits> ThreadCb<Traits> {
    /// Construct a `ThreadCb` for a thread with the specified initial
    /// priority.
    ///
    /// # Panics
    ///
    /// Panics if `priority` is not in `PRI_MIN..=PRI_MAX`.
    pub const fn new(priority: usize) -> Self {
        assert!(cfg::is_valid_priority(priority), "priority out of range");
        Self {
            base_priority: AtomicUsize::new(priority),
            effective_priority: AtomicUsize::new(priority),
            waiting_lock: CpuLockCell::new(None),
            donated_by: CpuLockCell::new(Vec::new()),
        }
    }

    /// Get the thread's base priority.
    #[inline]
    pub fn base_priority(&self) -> usize {
        self.base_priority.load(Ordering::Relaxed)
    }

    /// Get the thread's effective priority.
    #[inline]
    pub fn effective_priority(&self) -> usize {
        self.effective_priority.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn set_effective_priority(&self, _lock: &CpuLockGuard<Traits>, priority: usize)
    where
        Traits: PortThreading,
    {
        self.effective_priority.store(priority, Ordering::Relaxed);
    }

    #[inline]
    fn set_base_priority(&self, _lock: &CpuLockGuard<Traits>, priority: usize)
    where
        Traits: PortThreading,
    {
        self.base_priority.store(priority, Ordering::Relaxed);
    }
}

impl<Traits: KernelTraits> ThreadCb<Traits> {
    /// Get a snapshot of the threads currently donating their priorities to
    /// this thread, highest first as of the last update.
    pub fn donors(&self) -> Vec<ThreadId> {
        self.donors_checked().or_violation("ThreadCb::donors")
    }

    fn donors_checked(&self) -> Result<Vec<ThreadId>, PollError> {
        let lock = klock::lock_cpu::<Traits>()?;
        let donors = self.donated_by.read(&lock).clone();
        Ok(donors)
    }

    /// Return `true` if the thread is blocked acquiring a lock held by another
    /// thread.
    pub fn is_waiting_on_lock(&self) -> bool {
        self.is_waiting_on_lock_checked()
            .or_violation("ThreadCb::is_waiting_on_lock")
    }

    fn is_waiting_on_lock_checked(&self) -> Result<bool, PollError> {
        let lock = klock::lock_cpu::<Traits>()?;
        Ok(self.waiting_lock.get(&lock).is_some())
    }
}

impl<Traits> fmt::Debug for ThreadCb<Traits> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadCb")
            .field("self", &(self as *const _))
            .field("base_priority", &self.base_priority)
            .field("effective_priority", &self.effective_priority)
            .finish_non_exhaustive()
    }
}

/// Get the control block of the current thread.
#[inline]
pub fn current<Traits: KernelTraits>() -> &'static ThreadCb<Traits> {
    Traits::thread_cb(Traits::current_thread())
}

/// Get the current thread's effective priority.
#[inline]
pub fn current_priority<Traits: KernelTraits>() -> usize {
    current::<Traits>().effective_priority()
}

/// Set the current thread's base priority.
///
/// In donation mode, the effective priority becomes the maximum of the new
/// base priority and the priorities still donated to the thread, so a donee
/// that lowers its priority keeps the donated one until the donation is
/// revoked. If a ready thread now has a higher priority than the current
/// thread, the current thread yields the processor.
///
/// # Panics
///
/// Panics if `priority` is out of range or CPU Lock is active.
pub fn set_current_priority<Traits: KernelTraits>(priority: usize) {
    set_current_priority_checked::<Traits>(priority).or_violation("thread::set_current_priority")
}

fn set_current_priority_checked<Traits: KernelTraits>(
    priority: usize,
) -> Result<(), SetPriorityError> {
    if !cfg::is_valid_priority(priority) {
        return Err(SetPriorityError::BadParam);
    }

    let mut lock = klock::lock_cpu::<Traits>()?;
    let thread = Traits::current_thread();
    let thread_cb = Traits::thread_cb(thread);

    thread_cb.set_base_priority(&lock, priority);
    if Traits::is_priority_donation_enabled() {
        donation::refresh_priority::<Traits>(&mut lock, thread);
    } else {
        thread_cb.set_effective_priority(&lock, priority);
    }

    log::trace!(
        "{thread}: base priority = {priority}, effective priority = {}",
        thread_cb.effective_priority()
    );

    yield_if_needed(&mut lock);
    Ok(())
}

/// Block the current thread until [`unblock`] is called for it.
///
/// Taking `&mut CpuLockGuard` ensures that no `CpuLockCell` borrows survive
/// across the context switch.
#[inline]
pub(crate) fn block_current<Traits: KernelTraits>(_lock: &mut CpuLockGuard<Traits>) {
    // Safety: CPU Lock active. The callers check the context.
    unsafe { Traits::block_current_thread() };
}

/// Make a blocked thread Ready. Does not preempt the current thread.
#[inline]
pub(crate) fn unblock<Traits: KernelTraits>(_lock: &mut CpuLockGuard<Traits>, thread: ThreadId) {
    // Safety: CPU Lock active. `thread` was taken out of a wait queue, so it's
    // blocked.
    unsafe { Traits::unblock_thread(thread) };
}

/// Yield the processor if a higher-priority thread is ready.
#[inline]
pub(crate) fn yield_if_needed<Traits: KernelTraits>(_lock: &mut CpuLockGuard<Traits>) {
    // Safety: CPU Lock active
    unsafe { Traits::yield_if_needed() };
}
