//! Ownership of a lock passes to a thread other than the waiter that was woken
//! up. The waiters still queued become donors of the new holder, and its next
//! `release` revokes them.
//!
//! `main` (base priority 10) holds `LOCK0` and `LOCK`. `x` (50) waits for
//! `LOCK0`; `h` (40) and `m` (35) wait for `LOCK`.
use prisync::{thread, KernelCfg, Lock, Semaphore, ThreadId};
use prisync_port_std::{simulate_interrupt, spawn, BootOptions};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::EventLog;

prisync_port_std::use_port!(unsafe struct SystemTraits);

static LOCK0: Lock<SystemTraits> = Lock::new();
static LOCK: Lock<SystemTraits> = Lock::new();
static GATE: Semaphore<SystemTraits> = Semaphore::new(0);
static EVENTS: EventLog = EventLog::new();
static MAIN_PRIORITY_SEEN_BY_X: AtomicUsize = AtomicUsize::new(0);

#[test]
fn run() {
    crate::run::<SystemTraits>(BootOptions::new().main_priority(10), main_body);
}

fn main_body() {
    let main = prisync_port_std::current_thread::<SystemTraits>();
    LOCK0.acquire();
    LOCK.acquire();

    // `x` preempts `main` and starts waiting
    spawn::<SystemTraits>("x", 50, move || x_body(main));
    assert_eq!(thread::current_priority::<SystemTraits>(), 50);

    let h = spawn::<SystemTraits>("h", 40, || waiter_body("h"));
    let m = spawn::<SystemTraits>("m", 35, || waiter_body("m"));
    spawn::<SystemTraits>("helper", 5, || GATE.up());

    // `h` and `m` start waiting for `LOCK`, and then `helper` wakes us up
    GATE.down();
    assert_eq!(thread::current::<SystemTraits>().donors().len(), 3);

    // `h` is woken up, but it can't preempt `main` yet
    LOCK.release();
    assert!(!LOCK.held_by_current_thread());
    assert_eq!(thread::current::<SystemTraits>().donors().len(), 1);

    // Take `LOCK` back before `h` gets to run. `m` is still queued.
    simulate_interrupt::<SystemTraits>(|| assert!(LOCK.try_acquire()));
    assert!(LOCK.held_by_current_thread());

    let donors = thread::current::<SystemTraits>().donors();
    assert!(donors.contains(&m));
    assert!(!donors.contains(&h));

    // Revoking `x`'s donation leaves `m`'s. `x` preempts `main` and records
    // `main`'s priority. `h` then blocks on `LOCK` again.
    LOCK0.release();
    assert_eq!(MAIN_PRIORITY_SEEN_BY_X.load(Ordering::Relaxed), 35);
    assert_eq!(EVENTS.get(), ["x"]);
    assert_eq!(thread::current_priority::<SystemTraits>(), 40);
    assert!(SystemTraits::thread_cb(h).is_waiting_on_lock());

    // switching to `h`, and then to `m`
    LOCK.release();
    assert_eq!(EVENTS.get(), ["x", "h", "m"]);
    assert_eq!(thread::current_priority::<SystemTraits>(), 10);
    assert!(thread::current::<SystemTraits>().donors().is_empty());
}

fn x_body(main: ThreadId) {
    LOCK0.acquire();
    MAIN_PRIORITY_SEEN_BY_X.store(
        SystemTraits::thread_cb(main).effective_priority(),
        Ordering::Relaxed,
    );
    EVENTS.push("x");
    LOCK0.release();
}

fn waiter_body(name: &'static str) {
    LOCK.acquire();
    EVENTS.push(name);
    LOCK.release();
}
