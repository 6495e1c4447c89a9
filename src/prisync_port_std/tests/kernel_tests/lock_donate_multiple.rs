//! The main thread acquires two locks, and two higher-priority threads each
//! block on one of them. Releasing a lock only revokes the donation received
//! through that lock.
use prisync::{thread, Lock};
use prisync_port_std::{spawn, BootOptions};

use crate::EventLog;

prisync_port_std::use_port!(unsafe struct SystemTraits);

static LOCK_A: Lock<SystemTraits> = Lock::new();
static LOCK_B: Lock<SystemTraits> = Lock::new();
static EVENTS: EventLog = EventLog::new();

#[test]
fn run() {
    crate::run::<SystemTraits>(BootOptions::new(), main_body);
}

fn main_body() {
    LOCK_A.acquire();
    LOCK_B.acquire();

    spawn::<SystemTraits>("a", 32, || {
        LOCK_A.acquire();
        EVENTS.push("a");
        LOCK_A.release();
    });
    assert_eq!(thread::current_priority::<SystemTraits>(), 32);

    spawn::<SystemTraits>("b", 33, || {
        LOCK_B.acquire();
        EVENTS.push("b");
        LOCK_B.release();
    });
    assert_eq!(thread::current_priority::<SystemTraits>(), 33);

    // switching to `b`
    LOCK_B.release();
    assert_eq!(EVENTS.get(), ["b"]);
    assert_eq!(thread::current_priority::<SystemTraits>(), 32);

    // switching to `a`
    LOCK_A.release();
    assert_eq!(EVENTS.get(), ["b", "a"]);
    assert_eq!(thread::current_priority::<SystemTraits>(), 31);
    assert!(thread::current::<SystemTraits>().donors().is_empty());
}
