//! With priority donation disabled, a lock behaves as a plain binary semaphore
//! with an owner.
use prisync::{thread, KernelCfg, Lock};
use prisync_port_std::{spawn, BootOptions};

use crate::EventLog;

prisync_port_std::use_port!(unsafe struct SystemTraits);

static LOCK: Lock<SystemTraits> = Lock::new();
static EVENTS: EventLog = EventLog::new();

#[test]
fn run() {
    crate::run::<SystemTraits>(BootOptions::new().priority_donation(false), main_body);
}

fn main_body() {
    assert!(!SystemTraits::is_priority_donation_enabled());

    LOCK.acquire();

    let high = spawn::<SystemTraits>("high", 40, || {
        LOCK.acquire();
        EVENTS.push("high");
        LOCK.release();
    });

    // No donation took place
    assert_eq!(thread::current_priority::<SystemTraits>(), 31);
    assert!(thread::current::<SystemTraits>().donors().is_empty());
    assert!(!SystemTraits::thread_cb(high).is_waiting_on_lock());

    // Lowering the base priority lowers the effective priority immediately
    thread::set_current_priority::<SystemTraits>(20);
    assert_eq!(thread::current_priority::<SystemTraits>(), 20);

    // switching to `high`
    LOCK.release();
    assert_eq!(EVENTS.get(), ["high"]);
    assert_eq!(thread::current_priority::<SystemTraits>(), 20);
}
