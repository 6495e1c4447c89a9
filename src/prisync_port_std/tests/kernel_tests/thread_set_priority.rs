//! Makes sure that changing the current thread's priority yields the
//! processor when a ready thread now has a higher priority.
use prisync::thread;
use prisync_port_std::{spawn, BootOptions};

use crate::EventLog;

prisync_port_std::use_port!(unsafe struct SystemTraits);

static EVENTS: EventLog = EventLog::new();

#[test]
fn run() {
    crate::run::<SystemTraits>(BootOptions::new(), main_body);
}

fn main_body() {
    // switching to `thread2`
    spawn::<SystemTraits>("thread2", 32, thread2_body);
    EVENTS.push("main");

    // switching to `thread2`
    thread::set_current_priority::<SystemTraits>(29);
    assert_eq!(
        EVENTS.get(),
        ["thread2 lowering", "main", "thread2 exiting"]
    );

    // Raising the priority never yields
    thread::set_current_priority::<SystemTraits>(40);
    assert_eq!(thread::current_priority::<SystemTraits>(), 40);
    spawn::<SystemTraits>("thread3", 35, || EVENTS.push("thread3"));
    EVENTS.push("main again");

    // switching to `thread3`
    thread::set_current_priority::<SystemTraits>(31);
    assert_eq!(
        EVENTS.get(),
        [
            "thread2 lowering",
            "main",
            "thread2 exiting",
            "main again",
            "thread3"
        ]
    );
}

fn thread2_body() {
    EVENTS.push("thread2 lowering");

    // switching to `main`
    thread::set_current_priority::<SystemTraits>(30);
    assert_eq!(thread::current_priority::<SystemTraits>(), 30);

    EVENTS.push("thread2 exiting");
}
