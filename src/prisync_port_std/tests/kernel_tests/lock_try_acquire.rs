//! Makes sure that `Lock::try_acquire` never blocks nor donates, in a thread
//! or in an interrupt handler.
use prisync::{thread, KernelCfg, Lock, Semaphore};
use prisync_port_std::{simulate_interrupt, spawn, BootOptions};

use crate::SeqTracker;

mod from_thread {
    use super::*;

    prisync_port_std::use_port!(unsafe struct SystemTraits);

    static LOCK: Lock<SystemTraits> = Lock::new();
    static SEQ: SeqTracker = SeqTracker::new();

    #[test]
    fn run() {
        crate::run::<SystemTraits>(BootOptions::new(), main_body);
    }

    fn main_body() {
        assert!(LOCK.try_acquire());
        assert!(LOCK.held_by_current_thread());

        SEQ.expect_and_replace(0, 1);

        spawn::<SystemTraits>("task2", 40, || {
            SEQ.expect_and_replace(1, 2);
            assert!(!LOCK.try_acquire());
            assert!(!LOCK.held_by_current_thread());
            SEQ.expect_and_replace(2, 3);
        });

        SEQ.expect_and_replace(3, 4);
        assert_eq!(thread::current_priority::<SystemTraits>(), 31);
        assert!(thread::current::<SystemTraits>().donors().is_empty());

        LOCK.release();
        assert!(!LOCK.held_by_current_thread());

        // The lock can be taken again
        assert!(LOCK.try_acquire());
        LOCK.release();
        LOCK.acquire();
        LOCK.release();
    }
}

mod from_interrupt_handler {
    use super::*;

    prisync_port_std::use_port!(unsafe struct SystemTraits);

    static LOCK: Lock<SystemTraits> = Lock::new();
    static ACQUIRED: Semaphore<SystemTraits> = Semaphore::new(0);
    static RELEASED: Semaphore<SystemTraits> = Semaphore::new(0);
    static SEQ: SeqTracker = SeqTracker::new();

    #[test]
    fn run() {
        crate::run::<SystemTraits>(BootOptions::new(), main_body);
    }

    fn main_body() {
        let task2 = spawn::<SystemTraits>("task2", 10, task2_body);

        // `task2` takes the lock
        ACQUIRED.down();

        SEQ.expect_and_replace(1, 2);
        simulate_interrupt::<SystemTraits>(|| {
            assert!(!LOCK.try_acquire());
            SEQ.expect_and_replace(2, 3);
        });

        // No donation took place
        let task2_cb = SystemTraits::thread_cb(task2);
        assert_eq!(task2_cb.effective_priority(), 10);
        assert!(task2_cb.donors().is_empty());

        // `task2` releases the lock
        RELEASED.down();

        SEQ.expect_and_replace(4, 5);
        simulate_interrupt::<SystemTraits>(|| {
            assert!(LOCK.try_acquire());
            SEQ.expect_and_replace(5, 6);
        });

        // The interrupted thread owns the lock and releases it
        assert!(LOCK.held_by_current_thread());
        assert_eq!(thread::current_priority::<SystemTraits>(), 31);
        LOCK.release();
        assert!(!LOCK.held_by_current_thread());
    }

    fn task2_body() {
        LOCK.acquire();
        SEQ.expect_and_replace(0, 1);
        ACQUIRED.up(); // switching to `main`

        SEQ.expect_and_replace(3, 4);
        LOCK.release();
        RELEASED.up(); // switching to `main`
    }
}
