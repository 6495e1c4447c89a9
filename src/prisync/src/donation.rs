//! Priority donation
//!
//! When a thread blocks on a lock held by a lower-priority thread, it donates
//! its priority to the holder, and transitively to whatever the holder is
//! waiting for, so that the holder can run and release the lock. Donations
//! are tracked per donee in [`ThreadCb::donated_by`] and revoked lock by lock
//! on release.
//!
//! ```text
//!   H ──waiting_lock──▶ L2 ──holder──▶ M ──waiting_lock──▶ L1 ──holder──▶ Lo
//!   (donates to M, and through M to Lo, up to DONATION_DEPTH_LIMIT edges)
//! ```
//!
//! [`ThreadCb::donated_by`]: crate::ThreadCb
use crate::{
    klock::CpuLockGuard, lock::Lock, order, wait::priority_of, KernelTraits, ThreadId,
};

/// Record `donor` as a donor of `donee`.
pub(crate) fn add_donor<Traits: KernelTraits>(
    lock: &mut CpuLockGuard<Traits>,
    donee: ThreadId,
    donor: ThreadId,
) {
    let mut donated_by = Traits::thread_cb(donee).donated_by.write(lock);
    if !donated_by.contains(&donor) {
        order::insert_by_priority(&mut *donated_by, donor, |&t| priority_of::<Traits>(t));
    }
}

/// Propagate `donor`'s effective priority along the chain of lock holders
/// starting at the lock `donor` is waiting for.
///
/// The walk stops at the first holder whose priority is already at least as
/// high, at a holder that is not waiting for a lock, or after
/// `Traits::DONATION_DEPTH_LIMIT` edges.
pub(crate) fn donate<Traits: KernelTraits>(lock: &mut CpuLockGuard<Traits>, donor: ThreadId) {
    let priority = priority_of::<Traits>(donor);
    let mut thread = donor;

    for depth in 0..Traits::DONATION_DEPTH_LIMIT {
        let Some(waiting_lock) = Traits::thread_cb(thread).waiting_lock.get(lock) else {
            return;
        };

        // Safety: `thread` is blocked (or about to block) in `Lock::acquire`,
        // which borrows the lock until `waiting_lock` is cleared
        let waiting_lock = unsafe { waiting_lock.as_ref() };

        let Some(holder) = waiting_lock.holder(lock) else {
            return;
        };

        let holder_cb = Traits::thread_cb(holder);
        if holder_cb.effective_priority() >= priority {
            return;
        }

        log::trace!("{donor} donates priority {priority} to {holder} (depth {depth})");
        holder_cb.set_effective_priority(lock, priority);
        thread = holder;
    }

    log::debug!(
        "donation from {donor} stopped at {thread}: depth limit ({}) reached",
        Traits::DONATION_DEPTH_LIMIT
    );
}

/// Remove the donors of `donee` that are waiting for `released`.
pub(crate) fn revoke<Traits: KernelTraits>(
    lock: &mut CpuLockGuard<Traits>,
    donee: ThreadId,
    released: &Lock<Traits>,
) {
    let donee_cb = Traits::thread_cb(donee);
    let mut donated_by = donee_cb.donated_by.take(lock);

    let lock_ref: &CpuLockGuard<Traits> = lock;
    donated_by.retain(|&donor| {
        let waits_for_released = Traits::thread_cb(donor)
            .waiting_lock
            .get(lock_ref)
            .map_or(false, |waiting_lock| waiting_lock.points_to(released));
        if waits_for_released {
            log::trace!("{donee} loses the donation from {donor}");
        }
        !waits_for_released
    });

    donee_cb.donated_by.replace(lock, donated_by);
}

/// Recalculate `thread`'s effective priority from its base priority and its
/// remaining donors. Returns the new effective priority.
pub(crate) fn refresh_priority<Traits: KernelTraits>(
    lock: &mut CpuLockGuard<Traits>,
    thread: ThreadId,
) -> usize {
    let thread_cb = Traits::thread_cb(thread);

    let highest_donation = {
        let mut donated_by = thread_cb.donated_by.write(lock);
        order::sort_by_priority(&mut donated_by[..], |&t| priority_of::<Traits>(t));
        donated_by.first().map(|&t| priority_of::<Traits>(t))
    };

    let base_priority = thread_cb.base_priority();
    let priority = highest_donation.map_or(base_priority, |p| p.max(base_priority));
    thread_cb.set_effective_priority(lock, priority);
    priority
}

/// Make the threads still waiting for a lock donors of its new holder.
///
/// Ownership may pass to a waiter that is not the highest-priority thread
/// interested in the lock (e.g., through `try_acquire`, or because priorities
/// changed after the wake-up); the remaining waiters keep their donation in
/// effect through the new holder.
pub(crate) fn inherit<Traits: KernelTraits>(
    lock: &mut CpuLockGuard<Traits>,
    holder: ThreadId,
    waiters: &[ThreadId],
) {
    if waiters.is_empty() {
        return;
    }

    let mut highest = None;
    for &waiter in waiters {
        add_donor::<Traits>(lock, holder, waiter);
        highest = highest.max(Some(priority_of::<Traits>(waiter)));
    }

    let holder_cb = Traits::thread_cb(holder);
    if let Some(priority) = highest {
        if priority > holder_cb.effective_priority() {
            log::trace!("{holder} inherits priority {priority} from the waiters of its new lock");
            holder_cb.set_effective_priority(lock, priority);
        }
    }
}
