//! Priority-aware synchronization primitives for a uniprocessor kernel.
//!
//! This crate provides counting [semaphores](Semaphore), non-recursive
//! [locks](Lock) with *priority donation*, and Mesa-style
//! [condition variables](Condvar). Every wait queue is served in the order of
//! the waiters' current effective priority.
//!
//! The crate does not schedule anything by itself. Thread creation, context
//! switching, and interrupt management belong to a *port*, which is plugged in
//! by implementing [`PortThreading`] and [`KernelCfg`] for a marker type (the
//! "kernel traits type"). All primitives are generic over that type.
//!
//! # Atomicity
//!
//! All state transitions happen in a *CPU Lock* state, in which the current
//! thread cannot be interrupted or preempted. On a real uniprocessor this is
//! interrupt masking. A thread that blocks does so while CPU Lock is active;
//! the port is responsible for transferring the CPU Lock state to the next
//! thread it dispatches.
//!
//! # Contract violations
//!
//! Misuse (blocking in an interrupt handler, acquiring a lock twice, releasing
//! a lock owned by someone else, ...) is a kernel bug. It is reported through
//! [`log::error!`] and then the calling thread panics.
#![cfg_attr(not(test), no_std)] // Link `std` only when building a test (`cfg(test)`)
#![deny(unsafe_op_in_unsafe_fn)]
#![deny(rust_2018_idioms)]
#![warn(clippy::doc_markdown)]

extern crate alloc;

use core::{fmt, num::NonZeroUsize};

pub mod cfg;
mod condvar;
mod donation;
pub mod error;
mod klock;
mod lock;
mod order;
mod semaphore;
mod state;
pub mod thread;
mod utils;
mod wait;

pub use self::{condvar::Condvar, lock::Lock, semaphore::Semaphore, thread::ThreadCb};

/// Numeric value used to identify a thread. Ports allocate IDs starting
/// from `1`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(NonZeroUsize);

impl ThreadId {
    /// Construct a `ThreadId` from a raw value. Returns `None` for `0`.
    #[inline]
    pub const fn new(raw: usize) -> Option<Self> {
        match NonZeroUsize::new(raw) {
            Some(x) => Some(Self(x)),
            None => None,
        }
    }

    /// Construct a `ThreadId` from a zero-based index.
    #[inline]
    pub const fn from_index(index: usize) -> Self {
        match NonZeroUsize::new(index.wrapping_add(1)) {
            Some(x) => Self(x),
            None => panic!("thread index overflow"),
        }
    }

    #[inline]
    pub const fn get(self) -> usize {
        self.0.get()
    }

    /// Get the zero-based index of the thread.
    #[inline]
    pub const fn index(self) -> usize {
        self.0.get() - 1
    }
}

impl fmt::Debug for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ThreadId({})", self.0)
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Implemented by a port. This trait contains items related to low-level
/// operations for controlling CPU states and context switching.
///
/// # Safety
///
/// Implementing a port is inherently unsafe because it's responsible for
/// initializing the execution environment and providing a dispatcher
/// implementation.
///
/// These methods are only meant to be called by the kernel.
#[allow(clippy::missing_safety_doc)]
pub unsafe trait PortThreading: 'static + Sized + Send + Sync {
    /// Disable all kernel-managed interrupts (this state is called *CPU Lock*).
    ///
    /// Precondition: CPU Lock inactive
    unsafe fn enter_cpu_lock();

    /// Re-enable kernel-managed interrupts previously disabled by
    /// `enter_cpu_lock`, thus deactivating the CPU Lock state.
    ///
    /// Precondition: CPU Lock active
    unsafe fn leave_cpu_lock();

    /// Activate CPU Lock. Return `true` iff CPU Lock was inactive before the
    /// call.
    unsafe fn try_enter_cpu_lock() -> bool {
        if Self::is_cpu_lock_active() {
            false
        } else {
            // Safety: CPU Lock inactive
            unsafe { Self::enter_cpu_lock() };
            true
        }
    }

    /// Return a flag indicating whether a CPU Lock state is active.
    fn is_cpu_lock_active() -> bool;

    /// Return a flag indicating whether the current context is an interrupt
    /// handler.
    fn is_interrupt_context() -> bool;

    /// Get the currently running thread. In an interrupt context, this is the
    /// interrupted thread.
    fn current_thread() -> ThreadId;

    /// Put the current thread into the Blocked state and dispatch another
    /// thread. Returns when the current thread is unblocked by
    /// [`unblock_thread`] and dispatched again.
    ///
    /// Precondition: CPU Lock active, a thread context
    ///
    /// Postcondition: CPU Lock active
    ///
    /// [`unblock_thread`]: Self::unblock_thread
    unsafe fn block_current_thread();

    /// Transition the specified Blocked thread into the Ready state. This does
    /// not preempt the current thread.
    ///
    /// Precondition: CPU Lock active, the thread is Blocked
    unsafe fn unblock_thread(thread: ThreadId);

    /// Yield the processor if a Ready thread has a higher effective priority
    /// than the current thread. In an interrupt context, the yield is deferred
    /// until the interrupt handler returns.
    ///
    /// Precondition: CPU Lock active
    ///
    /// Postcondition: CPU Lock active
    unsafe fn yield_if_needed();
}

/// Associates static configuration and thread control blocks with a kernel
/// traits type.
///
/// # Safety
///
/// `thread_cb` must return the same control block for a given thread ID for
/// the lifetime of the system, and each thread must have a distinct one.
pub unsafe trait KernelCfg: PortThreading {
    /// The maximum number of `waiting_lock → holder` edges followed by a
    /// single donation.
    const DONATION_DEPTH_LIMIT: usize = cfg::DEFAULT_DONATION_DEPTH_LIMIT;

    /// Get the control block of the specified thread.
    fn thread_cb(thread: ThreadId) -> &'static ThreadCb<Self>;

    /// Return `true` if priority donation is in effect. When `false`, locks
    /// behave as plain binary semaphores (flat mode).
    fn is_priority_donation_enabled() -> bool {
        true
    }
}

/// Represents a complete kernel traits type.
pub trait KernelTraits: PortThreading + KernelCfg {}

impl<T: PortThreading + KernelCfg> KernelTraits for T {}
