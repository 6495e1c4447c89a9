//! The simulated processor's scheduling state
use prisync::{ThreadCb, ThreadId};
use std::{collections::VecDeque, fmt::Write as _};

/// Thread state machine
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(crate) enum Tsm {
    /// The thread is registered, but its backing host thread is not ready yet.
    Dormant,
    /// The thread is in the ready queue.
    Ready,
    /// The thread owns the processor.
    Running,
    /// The thread is waiting to be unblocked.
    Blocked,
    /// The thread has returned from its entry point.
    Exited,
}

pub(crate) struct ThreadSlot<Traits: 'static> {
    pub(crate) name: String,
    pub(crate) cb: &'static ThreadCb<Traits>,
    pub(crate) tsm: Tsm,
    /// The backing host thread, used for unparking.
    pub(crate) host_thread: Option<std::thread::Thread>,
}

pub(crate) struct SchedState<Traits: 'static> {
    threads: Vec<ThreadSlot<Traits>>,
    /// The threads in the `Ready` state, in the order in which they became
    /// ready.
    ready_queue: VecDeque<ThreadId>,
    /// The thread owning the processor.
    pub(crate) running: Option<ThreadId>,
    pub(crate) cpu_lock: bool,
    /// `true` while an interrupt handler is running.
    pub(crate) interrupt: bool,
    /// Set when a yield was requested in an interrupt handler.
    pub(crate) yield_on_interrupt_return: bool,
}

impl<Traits: 'static> SchedState<Traits> {
    pub(crate) const fn new() -> Self {
        Self {
            threads: Vec::new(),
            ready_queue: VecDeque::new(),
            running: None,
            cpu_lock: false,
            interrupt: false,
            yield_on_interrupt_return: false,
        }
    }

    /// Register a thread in the `Dormant` state.
    pub(crate) fn add_thread(&mut self, name: String, cb: &'static ThreadCb<Traits>) -> ThreadId {
        let thread = ThreadId::from_index(self.threads.len());
        self.threads.push(ThreadSlot {
            name,
            cb,
            tsm: Tsm::Dormant,
            host_thread: None,
        });
        thread
    }

    /// Get the slot of the specified thread.
    ///
    /// # Panics
    ///
    /// Panics if `thread` was not allocated by this scheduler.
    pub(crate) fn slot(&self, thread: ThreadId) -> &ThreadSlot<Traits> {
        match self.threads.get(thread.index()) {
            Some(slot) => slot,
            None => panic!("unknown thread {thread}"),
        }
    }

    pub(crate) fn slot_mut(&mut self, thread: ThreadId) -> &mut ThreadSlot<Traits> {
        match self.threads.get_mut(thread.index()) {
            Some(slot) => slot,
            None => panic!("unknown thread {thread}"),
        }
    }

    /// Transition the thread into the `Ready` state and put it at the end of
    /// the ready queue.
    pub(crate) fn make_ready(&mut self, thread: ThreadId) {
        let slot = self.slot_mut(thread);
        assert_ne!(slot.tsm, Tsm::Ready, "{thread} is already ready");
        assert_ne!(slot.tsm, Tsm::Exited, "{thread} has exited");
        slot.tsm = Tsm::Ready;
        self.ready_queue.push_back(thread);
    }

    /// Remove the ready thread with the highest effective priority from the
    /// ready queue. Among equals, the one that became ready first wins.
    pub(crate) fn choose_next_thread(&mut self) -> Option<ThreadId> {
        let (i, _) = self
            .ready_queue
            .iter()
            .enumerate()
            // `max_by_key` returns the last maximum element
            .rev()
            .max_by_key(|&(_, &thread)| self.slot(thread).cb.effective_priority())?;
        self.ready_queue.remove(i)
    }

    /// Get the highest effective priority among the ready threads.
    pub(crate) fn highest_ready_priority(&self) -> Option<usize> {
        self.ready_queue
            .iter()
            .map(|&thread| self.slot(thread).cb.effective_priority())
            .max()
    }

    /// Describe every thread that is stuck.
    pub(crate) fn deadlock_report(&self) -> String {
        let mut report = String::from("no thread is ready to run; blocked:");
        for (i, slot) in self.threads.iter().enumerate() {
            if slot.tsm == Tsm::Blocked {
                let _ = write!(
                    report,
                    " {} \"{}\" (priority {})",
                    ThreadId::from_index(i),
                    slot.name,
                    slot.cb.effective_priority()
                );
            }
        }
        report
    }
}
