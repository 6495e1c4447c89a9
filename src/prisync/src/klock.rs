//! Kernel state locking mechanism
use core::{fmt, marker::PhantomData};
use spin::rwlock::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::{error::BadContextError, PortThreading};

/// Cell type that can be accessed by presenting a [`CpuLockGuard`] (which can
/// be obtained by [`lock_cpu`]).
///
/// The inner lock never contends: the CPU Lock state already excludes every
/// other context. It only catches a `write` overlapping another borrow of the
/// same cell within one context, which is a bug. Any number of `read`s may
/// overlap.
pub(crate) struct CpuLockCell<Traits, T: ?Sized>(PhantomData<fn() -> Traits>, RwLock<T>);

impl<Traits, T> CpuLockCell<Traits, T> {
    pub(crate) const fn new(x: T) -> Self {
        Self(PhantomData, RwLock::new(x))
    }
}

impl<Traits: PortThreading, T: ?Sized> CpuLockCell<Traits, T> {
    /// Borrow the contents immutably.
    #[inline]
    pub(crate) fn read<'a>(&'a self, _lock: &'a CpuLockGuard<Traits>) -> RwLockReadGuard<'a, T> {
        match self.1.try_read() {
            Some(x) => x,
            None => unreachable!("`CpuLockCell` is mutably borrowed"),
        }
    }

    /// Borrow the contents mutably.
    #[inline]
    pub(crate) fn write<'a>(
        &'a self,
        _lock: &'a mut CpuLockGuard<Traits>,
    ) -> RwLockWriteGuard<'a, T> {
        match self.1.try_write() {
            Some(x) => x,
            None => unreachable!("`CpuLockCell` is already borrowed"),
        }
    }
}

impl<Traits: PortThreading, T> CpuLockCell<Traits, T> {
    #[inline]
    pub(crate) fn get(&self, lock: &CpuLockGuard<Traits>) -> T
    where
        T: Copy,
    {
        *self.read(lock)
    }

    #[inline]
    pub(crate) fn replace(&self, lock: &mut CpuLockGuard<Traits>, x: T) -> T {
        core::mem::replace(&mut *self.write(lock), x)
    }

    /// Take the contents out, leaving `Default::default()` in their place.
    #[inline]
    pub(crate) fn take(&self, lock: &mut CpuLockGuard<Traits>) -> T
    where
        T: Default,
    {
        self.replace(lock, T::default())
    }
}

impl<Traits: PortThreading, T: fmt::Debug> fmt::Debug for CpuLockCell<Traits, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Ok(lock) = lock_cpu::<Traits>() {
            let inner = self.read(&lock);
            f.debug_tuple("CpuLockCell").field(&*inner).finish()
        } else {
            f.write_str("CpuLockCell(< locked >)")
        }
    }
}

/// Attempt to enter a CPU Lock state and get an RAII guard.
/// Return `BadContext` if the kernel is already in a CPU Lock state.
pub(crate) fn lock_cpu<Traits: PortThreading>() -> Result<CpuLockGuard<Traits>, BadContextError> {
    // Safety: `try_enter_cpu_lock` is only meant to be called by the kernel
    if unsafe { Traits::try_enter_cpu_lock() } {
        Ok(CpuLockGuard {
            _phantom: PhantomData,
        })
    } else {
        Err(BadContextError::BadContext)
    }
}

/// RAII guard for a CPU Lock state.
///
/// Holding `&mut CpuLockGuard` proves that no borrows of any
/// [`CpuLockCell`] are alive in the current context, which is what the
/// blocking operations in [`crate::thread`] require.
pub(crate) struct CpuLockGuard<Traits: PortThreading> {
    // `!Send`: a CPU Lock state belongs to the context that entered it
    _phantom: PhantomData<(fn() -> Traits, *const ())>,
}

impl<Traits: PortThreading> Drop for CpuLockGuard<Traits> {
    fn drop(&mut self) {
        // Safety: CPU Lock is currently active, and it's us (the kernel) who
        // are currently controlling the CPU Lock state
        unsafe {
            Traits::leave_cpu_lock();
        }
    }
}
