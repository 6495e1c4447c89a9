//! Makes sure that a donation stops after `DONATION_DEPTH_LIMIT` edges.
//!
//! ```text
//! t3 ──▶ LOCK_C (t2) ──▶ LOCK_B (t1) ──▶ LOCK_A (main)
//! ```
use prisync::{thread, KernelCfg, Lock};
use prisync_port_std::{spawn, BootOptions};

use crate::EventLog;

prisync_port_std::use_port!(unsafe struct SystemTraits; donation_depth_limit = 2);

static LOCK_A: Lock<SystemTraits> = Lock::new();
static LOCK_B: Lock<SystemTraits> = Lock::new();
static LOCK_C: Lock<SystemTraits> = Lock::new();
static EVENTS: EventLog = EventLog::new();

#[test]
fn run() {
    assert_eq!(SystemTraits::DONATION_DEPTH_LIMIT, 2);
    crate::run::<SystemTraits>(BootOptions::new().main_priority(1), main_body);
}

fn main_body() {
    LOCK_A.acquire();

    let t1 = spawn::<SystemTraits>("t1", 2, || {
        LOCK_B.acquire();
        LOCK_A.acquire();
        LOCK_A.release();
        LOCK_B.release();
        EVENTS.push("t1");
    });
    assert_eq!(thread::current_priority::<SystemTraits>(), 2);

    let t2 = spawn::<SystemTraits>("t2", 3, || {
        LOCK_C.acquire();
        LOCK_B.acquire();
        LOCK_B.release();
        LOCK_C.release();
        EVENTS.push("t2");
    });
    // Two edges: t2 → t1 → main
    assert_eq!(thread::current_priority::<SystemTraits>(), 3);

    spawn::<SystemTraits>("t3", 4, || {
        LOCK_C.acquire();
        LOCK_C.release();
        EVENTS.push("t3");
    });
    // t3 → t2 → t1, and the walk stops before reaching `main`
    assert_eq!(SystemTraits::thread_cb(t2).effective_priority(), 4);
    assert_eq!(SystemTraits::thread_cb(t1).effective_priority(), 4);
    assert_eq!(thread::current_priority::<SystemTraits>(), 3);

    LOCK_A.release();

    assert_eq!(EVENTS.get(), ["t3", "t2", "t1"]);
    assert_eq!(thread::current_priority::<SystemTraits>(), 1);
}
