//! Simulation environment for running [`prisync`] on a hosted environment.
//!
//! This port simulates a uniprocessor with a strict priority scheduler. Every
//! simulated thread is backed by a host thread, but only the one that owns
//! the simulated processor makes progress; the rest are parked. A thread
//! loses the processor only when it blocks, exits, or yields to a
//! higher-priority thread at a kernel call. There is no timer, so a test
//! scenario runs the same way every time.
//!
//! ```rust,ignore
//! prisync_port_std::use_port!(unsafe struct SystemTraits);
//!
//! static LOCK: prisync::Lock<SystemTraits> = prisync::Lock::new();
//!
//! prisync_port_std::boot::<SystemTraits>(Default::default(), || {
//!     LOCK.acquire();
//!     LOCK.release();
//! });
//! ```
#![deny(unsafe_op_in_unsafe_fn)]
#![deny(rust_2018_idioms)]
use prisync::{cfg, KernelCfg, PortThreading, ThreadCb, ThreadId};
use spin::{Mutex as SpinMutex, MutexGuard as SpinMutexGuard};
use std::{
    any::Any,
    cell::Cell,
    panic,
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc,
    },
    thread,
};

mod sched;

use self::sched::{SchedState, Tsm};

/// Used by `use_port!`
#[doc(hidden)]
pub extern crate prisync;

/// Implemented on a kernel trait type by [`use_port!`].
///
/// # Safety
///
/// Only meant to be implemented by [`use_port!`].
#[doc(hidden)]
pub unsafe trait PortInstance: KernelCfg + PortThreading {
    fn port_state() -> &'static State<Self>;
}

/// Options for [`boot`].
#[derive(Debug, Clone, Copy)]
pub struct BootOptions {
    /// The initial priority of the main thread.
    pub main_priority: usize,
    /// Enables priority donation. When `false`, locks behave as plain binary
    /// semaphores (the scheduling mode in which priorities are managed by
    /// something other than donation).
    pub priority_donation: bool,
}

impl BootOptions {
    pub const fn new() -> Self {
        Self {
            main_priority: cfg::PRI_DEFAULT,
            priority_donation: true,
        }
    }

    pub const fn main_priority(self, main_priority: usize) -> Self {
        Self {
            main_priority,
            ..self
        }
    }

    pub const fn priority_donation(self, priority_donation: bool) -> Self {
        Self {
            priority_donation,
            ..self
        }
    }
}

impl Default for BootOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// How the simulation ended.
enum Exit {
    /// The main thread returned.
    Completed,
    /// A thread panicked.
    Panicked(Box<dyn Any + Send>),
    /// No thread can make progress.
    Deadlock(String),
}

thread_local! {
    /// The simulated thread backed by the current host thread.
    static CURRENT_THREAD: Cell<Option<ThreadId>> = Cell::new(None);
}

/// The internal state of the port.
///
/// # Safety
///
/// For the safety information of this type's methods, see the documentation of
/// the corresponding trait methods of [`PortThreading`].
#[doc(hidden)]
pub struct State<Traits: 'static> {
    /// The simulated processor. This is also what makes everything in the
    /// simulation atomic with respect to the host threads.
    sched: SpinMutex<SchedState<Traits>>,
    booted: AtomicBool,
    priority_donation: AtomicBool,
    exit_send: SpinMutex<Option<mpsc::Sender<Exit>>>,
}

impl<Traits: 'static> State<Traits> {
    pub const fn new() -> Self {
        Self {
            sched: SpinMutex::new(SchedState::new()),
            booted: AtomicBool::new(false),
            priority_donation: AtomicBool::new(true),
            exit_send: SpinMutex::new(None),
        }
    }
}

#[allow(clippy::missing_safety_doc)]
impl<Traits: PortInstance> State<Traits> {
    /// Start the simulation with `main` as the first thread and wait until it
    /// completes.
    pub fn port_boot(&'static self, options: BootOptions, main: impl FnOnce() + Send + 'static) {
        assert!(
            !self.booted.swap(true, Ordering::Relaxed),
            "the system was already booted"
        );

        let (exit_send, exit_recv) = mpsc::channel();
        *self.exit_send.lock() = Some(exit_send);

        self.priority_donation
            .store(options.priority_donation, Ordering::Relaxed);

        log::debug!("booting with {options:?}");
        self.spawn_thread("main", options.main_priority, main, true);

        {
            // The dispatched thread inherits CPU Lock
            let mut sched = self.sched.lock();
            sched.cpu_lock = true;
            self.dispatch(&mut sched);
        }

        match exit_recv.recv() {
            Ok(Exit::Completed) => log::debug!("the main thread completed"),
            Ok(Exit::Panicked(payload)) => panic::resume_unwind(payload),
            Ok(Exit::Deadlock(report)) => panic!("deadlock: {report}"),
            Err(mpsc::RecvError) => panic!("the simulation ended without a report"),
        }
    }

    /// Create a thread in the `Ready` state. Does not preempt the caller.
    fn spawn_thread(
        &'static self,
        name: &str,
        priority: usize,
        entry: impl FnOnce() + Send + 'static,
        is_main: bool,
    ) -> ThreadId {
        assert!(
            cfg::is_valid_priority(priority),
            "priority {priority} is out of range"
        );

        let cb: &'static ThreadCb<Traits> = Box::leak(Box::new(ThreadCb::new(priority)));
        let thread = self.sched.lock().add_thread(name.to_owned(), cb);

        let join_handle = thread::Builder::new()
            .name(name.to_owned())
            .spawn(move || self.thread_main(thread, entry, is_main))
            .unwrap_or_else(|e| panic!("failed to spawn a host thread: {e}"));

        let mut sched = self.sched.lock();
        sched.slot_mut(thread).host_thread = Some(join_handle.thread().clone());
        sched.make_ready(thread);
        log::debug!("spawned {thread} \"{name}\" at priority {priority}");

        thread
    }

    fn thread_main(&'static self, thread: ThreadId, entry: impl FnOnce(), is_main: bool) {
        CURRENT_THREAD.with(|cell| cell.set(Some(thread)));
        self.wait_until_running(thread);

        {
            let mut sched = self.sched.lock();
            assert!(sched.cpu_lock);
            sched.cpu_lock = false;
        }

        log::trace!("{thread} starts");
        let result = panic::catch_unwind(panic::AssertUnwindSafe(entry));

        let mut sched = self.sched.lock();
        match result {
            Ok(()) if is_main => self.halt(&mut sched, Exit::Completed),
            Ok(()) => {
                log::trace!("{thread} exits");
                if sched.cpu_lock {
                    log::warn!("{thread} exited with CPU Lock active");
                }
                sched.slot_mut(thread).tsm = Tsm::Exited;
                sched.running = None;
                sched.cpu_lock = true;
                self.dispatch(&mut sched);
            }
            Err(payload) => {
                log::debug!("{thread} panicked");
                self.halt(&mut sched, Exit::Panicked(payload));
            }
        }
    }

    /// Stop scheduling threads and report the outcome to `port_boot`.
    fn halt(&self, sched: &mut SchedState<Traits>, exit: Exit) {
        sched.running = None;
        if let Some(exit_send) = self.exit_send.lock().take() {
            // `port_boot` is waiting on the other end
            let _ = exit_send.send(exit);
        }
    }

    /// Hand the processor to the highest-priority ready thread.
    ///
    /// The caller must have removed the current thread from the `Running`
    /// state, and must then call `wait_until_running` if it still has
    /// something to do.
    fn dispatch(&self, sched: &mut SchedState<Traits>) {
        debug_assert!(sched.running.is_none());
        debug_assert!(sched.cpu_lock);

        let Some(next) = sched.choose_next_thread() else {
            let report = sched.deadlock_report();
            log::error!("deadlock: {report}");
            self.halt(sched, Exit::Deadlock(report));
            return;
        };

        sched.running = Some(next);
        let slot = sched.slot_mut(next);
        slot.tsm = Tsm::Running;
        log::trace!(
            "dispatching {next} \"{}\" (priority {})",
            slot.name,
            slot.cb.effective_priority()
        );
        if let Some(host_thread) = &slot.host_thread {
            host_thread.unpark();
        }
    }

    /// Park the current host thread until `thread` owns the processor. Never
    /// returns after the simulation halts.
    fn wait_until_running(&self, thread: ThreadId) {
        while self.sched.lock().running != Some(thread) {
            thread::park();
        }
    }

    /// Put the running thread back into the ready queue and dispatch.
    fn preempt(&'static self, mut sched: SpinMutexGuard<'_, SchedState<Traits>>, thread: ThreadId) {
        log::trace!("{thread} yields the processor");
        sched.make_ready(thread);
        sched.running = None;
        self.dispatch(&mut sched);
        drop(sched);
        self.wait_until_running(thread);
    }

    /// Get the current thread.
    ///
    /// # Panics
    ///
    /// Panics if the current host thread does not back a simulated thread.
    pub fn current_thread(&self) -> ThreadId {
        match CURRENT_THREAD.with(Cell::get) {
            Some(thread) => thread,
            None => panic!("called from a thread not managed by the simulator"),
        }
    }

    pub fn thread_cb(&self, thread: ThreadId) -> &'static ThreadCb<Traits> {
        self.sched.lock().slot(thread).cb
    }

    pub fn is_priority_donation_enabled(&self) -> bool {
        self.priority_donation.load(Ordering::Relaxed)
    }

    pub unsafe fn enter_cpu_lock(&self) {
        let mut sched = self.sched.lock();
        assert!(!sched.cpu_lock, "CPU Lock is already active");
        sched.cpu_lock = true;
    }

    pub unsafe fn leave_cpu_lock(&self) {
        let mut sched = self.sched.lock();
        assert!(sched.cpu_lock, "CPU Lock is inactive");
        sched.cpu_lock = false;
    }

    pub fn is_cpu_lock_active(&self) -> bool {
        self.sched.lock().cpu_lock
    }

    pub fn is_interrupt_context(&self) -> bool {
        self.sched.lock().interrupt
    }

    pub unsafe fn block_current_thread(&'static self) {
        let thread = self.current_thread();
        {
            let mut sched = self.sched.lock();
            assert!(sched.cpu_lock);
            assert!(!sched.interrupt, "cannot block in an interrupt handler");
            assert_eq!(sched.running, Some(thread));

            log::trace!("{thread} blocks");
            sched.slot_mut(thread).tsm = Tsm::Blocked;
            sched.running = None;
            self.dispatch(&mut sched);
        }
        self.wait_until_running(thread);
        log::trace!("{thread} resumes");
    }

    pub unsafe fn unblock_thread(&self, thread: ThreadId) {
        let mut sched = self.sched.lock();
        assert!(sched.cpu_lock);
        let tsm = sched.slot(thread).tsm;
        assert_eq!(tsm, Tsm::Blocked, "{thread} is not blocked");

        log::trace!("{thread} is unblocked");
        sched.make_ready(thread);
    }

    pub unsafe fn yield_if_needed(&'static self) {
        let mut sched = self.sched.lock();
        assert!(sched.cpu_lock);

        if sched.interrupt {
            sched.yield_on_interrupt_return = true;
            return;
        }

        let thread = self.current_thread();
        let priority = sched.slot(thread).cb.effective_priority();
        if sched
            .highest_ready_priority()
            .map_or(false, |ready_priority| ready_priority > priority)
        {
            self.preempt(sched, thread);
        }
    }

    /// Yield the processor to the ready threads of an equal or higher
    /// priority.
    unsafe fn yield_now(&'static self) {
        let sched = self.sched.lock();
        assert!(sched.cpu_lock);
        assert!(!sched.interrupt, "cannot yield in an interrupt handler");

        let thread = self.current_thread();
        self.preempt(sched, thread);
    }

    fn enter_interrupt(&self) {
        let mut sched = self.sched.lock();
        assert!(!sched.cpu_lock, "interrupts are masked by CPU Lock");
        assert!(!sched.interrupt, "nested interrupts are not supported");
        sched.interrupt = true;
    }

    /// Leave the interrupt context. Returns `true` if a yield was requested
    /// in the handler.
    fn leave_interrupt(&self) -> bool {
        let mut sched = self.sched.lock();
        debug_assert!(sched.interrupt);
        sched.interrupt = false;
        std::mem::take(&mut sched.yield_on_interrupt_return)
    }
}

/// Initialize the logger and run a simulation whose first thread executes
/// `main` (with the options specified by `options`).
///
/// Returns when `main` returns. Any other threads still alive at that point
/// are left parked forever.
///
/// # Panics
///
/// If a simulated thread panics, the panic is propagated to the caller. If
/// every thread is blocked, this function panics with a message starting with
/// `"deadlock: "`. Panics if the system was already booted.
pub fn boot<Traits: PortInstance>(options: BootOptions, main: impl FnOnce() + Send + 'static) {
    // `is_test(true)` would drop log messages from other threads
    let _ = env_logger::try_init();

    Traits::port_state().port_boot(options, main);
}

/// Create a thread. If it has a higher priority than the current thread, the
/// current thread yields the processor to it immediately.
///
/// Must be called from a simulated thread with CPU Lock inactive.
pub fn spawn<Traits: PortInstance>(
    name: &str,
    priority: usize,
    entry: impl FnOnce() + Send + 'static,
) -> ThreadId {
    let state = Traits::port_state();
    let thread = state.spawn_thread(name, priority, entry, false);

    // Safety: CPU Lock inactive (checked by `enter_cpu_lock`)
    unsafe {
        state.enter_cpu_lock();
        state.yield_if_needed();
        state.leave_cpu_lock();
    }

    thread
}

/// Yield the processor to the other ready threads of the same or a higher
/// priority.
pub fn yield_now<Traits: PortInstance>() {
    let state = Traits::port_state();

    // Safety: CPU Lock inactive (checked by `enter_cpu_lock`)
    unsafe {
        state.enter_cpu_lock();
        state.yield_now();
        state.leave_cpu_lock();
    }
}

/// Run `handler` as an interrupt handler on top of the current thread.
///
/// Kernel calls made by `handler` see an interrupt context. A context switch
/// requested by `handler` takes place after it returns.
///
/// # Panics
///
/// Panics if CPU Lock is active or if this is called from an interrupt
/// handler.
pub fn simulate_interrupt<Traits: PortInstance>(handler: impl FnOnce()) {
    let state = Traits::port_state();

    state.enter_interrupt();
    log::trace!("entering an interrupt handler");
    handler();
    log::trace!("leaving an interrupt handler");

    if state.leave_interrupt() {
        // Safety: CPU Lock inactive (checked by `enter_cpu_lock`)
        unsafe {
            state.enter_cpu_lock();
            state.yield_if_needed();
            state.leave_cpu_lock();
        }
    }
}

/// Get the current thread.
pub fn current_thread<Traits: PortInstance>() -> ThreadId {
    Traits::port_state().current_thread()
}

/// Instantiate the port.
///
/// This macro defines a kernel traits type `$SystemTraits` bound to a
/// simulated processor of its own. An optional `donation_depth_limit`
/// overrides [`KernelCfg::DONATION_DEPTH_LIMIT`].
///
/// ```rust,ignore
/// prisync_port_std::use_port!(unsafe struct SystemTraits);
/// prisync_port_std::use_port!(unsafe pub struct ShallowTraits; donation_depth_limit = 2);
/// ```
///
/// Each invocation defines a module named `port_std_impl`, so only one
/// invocation is allowed per module.
#[macro_export]
macro_rules! use_port {
    (unsafe $vis:vis struct $SystemTraits:ident) => {
        $crate::use_port!(
            unsafe $vis struct $SystemTraits;
            donation_depth_limit = $crate::prisync::cfg::DEFAULT_DONATION_DEPTH_LIMIT
        );
    };

    (unsafe $vis:vis struct $SystemTraits:ident; donation_depth_limit = $depth:expr) => {
        $vis struct $SystemTraits;

        mod port_std_impl {
            use super::$SystemTraits;
            use $crate::prisync::{KernelCfg, PortThreading, ThreadCb, ThreadId};
            use $crate::{PortInstance, State};

            pub(super) static PORT_STATE: State<$SystemTraits> = State::new();

            unsafe impl PortInstance for $SystemTraits {
                #[inline]
                fn port_state() -> &'static State<Self> {
                    &PORT_STATE
                }
            }

            unsafe impl PortThreading for $SystemTraits {
                unsafe fn enter_cpu_lock() {
                    unsafe { PORT_STATE.enter_cpu_lock() }
                }

                unsafe fn leave_cpu_lock() {
                    unsafe { PORT_STATE.leave_cpu_lock() }
                }

                fn is_cpu_lock_active() -> bool {
                    PORT_STATE.is_cpu_lock_active()
                }

                fn is_interrupt_context() -> bool {
                    PORT_STATE.is_interrupt_context()
                }

                fn current_thread() -> ThreadId {
                    PORT_STATE.current_thread()
                }

                unsafe fn block_current_thread() {
                    unsafe { PORT_STATE.block_current_thread() }
                }

                unsafe fn unblock_thread(thread: ThreadId) {
                    unsafe { PORT_STATE.unblock_thread(thread) }
                }

                unsafe fn yield_if_needed() {
                    unsafe { PORT_STATE.yield_if_needed() }
                }
            }

            unsafe impl KernelCfg for $SystemTraits {
                const DONATION_DEPTH_LIMIT: usize = $depth;

                fn thread_cb(thread: ThreadId) -> &'static ThreadCb<Self> {
                    PORT_STATE.thread_cb(thread)
                }

                fn is_priority_donation_enabled() -> bool {
                    PORT_STATE.is_priority_donation_enabled()
                }
            }
        }
    };
}
