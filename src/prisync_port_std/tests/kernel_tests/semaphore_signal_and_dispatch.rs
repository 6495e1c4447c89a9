//! Makes sure that `Semaphore::up` wakes up a waiting thread and dispatches
//! it if it has a higher priority.
use prisync::Semaphore;
use prisync_port_std::{spawn, BootOptions};

use crate::SeqTracker;

prisync_port_std::use_port!(unsafe struct SystemTraits);

static SEM: Semaphore<SystemTraits> = Semaphore::new(0);
static SEQ: SeqTracker = SeqTracker::new();

#[test]
fn run() {
    crate::run::<SystemTraits>(BootOptions::new(), main_body);
}

fn main_body() {
    SEQ.expect_and_replace(0, 1);

    // `task2` preempts `main` and starts waiting
    spawn::<SystemTraits>("task2", 32, task2_body);

    SEQ.expect_and_replace(2, 3);
    assert_eq!(SEM.value(), 0);
    assert!(SEM.has_waiters());

    SEM.up(); // wake up `task2`, switching to `task2`

    SEQ.expect_and_replace(5, 6);
    assert_eq!(SEM.value(), 0);
    assert!(!SEM.has_waiters());
}

fn task2_body() {
    SEQ.expect_and_replace(1, 2);

    SEM.down(); // start waiting, switching to `main`

    SEQ.expect_and_replace(3, 4);

    // The unit released by `main` was consumed
    assert_eq!(SEM.value(), 0);

    SEQ.expect_and_replace(4, 5);
}
