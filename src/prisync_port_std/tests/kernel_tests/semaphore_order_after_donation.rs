//! Makes sure that a semaphore waiter's position is decided by its priority
//! at the time of `up`, not at the time it started waiting.
use prisync::{thread, KernelCfg, Lock, Semaphore};
use prisync_port_std::{spawn, BootOptions};

use crate::EventLog;

prisync_port_std::use_port!(unsafe struct SystemTraits);

static SEM: Semaphore<SystemTraits> = Semaphore::new(0);
static LOCK: Lock<SystemTraits> = Lock::new();
static EVENTS: EventLog = EventLog::new();

#[test]
fn run() {
    crate::run::<SystemTraits>(BootOptions::new(), main_body);
}

fn main_body() {
    // `low` takes `LOCK` and waits for `SEM`
    let low = spawn::<SystemTraits>("low", 32, low_body);
    // `mid` waits for `SEM` ahead of `low`
    spawn::<SystemTraits>("mid", 33, mid_body);

    assert_eq!(SystemTraits::thread_cb(low).effective_priority(), 32);

    // `high` waits for `LOCK`, donating its priority to `low`
    spawn::<SystemTraits>("high", 40, high_body);

    let low_cb = SystemTraits::thread_cb(low);
    assert_eq!(low_cb.effective_priority(), 40);
    assert_eq!(low_cb.base_priority(), 32);
    assert_eq!(thread::current_priority::<SystemTraits>(), 31);

    // `low` is woken up first. It releases `LOCK` and passes it to `high`.
    SEM.up();
    assert_eq!(EVENTS.get(), ["low", "high"]);
    assert_eq!(low_cb.effective_priority(), 32);

    SEM.up();
    assert_eq!(EVENTS.get(), ["low", "high", "mid"]);
}

fn low_body() {
    LOCK.acquire();
    SEM.down();
    EVENTS.push("low");

    // switching to `high`
    LOCK.release();
    assert_eq!(thread::current_priority::<SystemTraits>(), 32);
}

fn mid_body() {
    SEM.down();
    EVENTS.push("mid");
}

fn high_body() {
    LOCK.acquire();
    EVENTS.push("high");
    LOCK.release();
}
