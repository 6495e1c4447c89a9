//! Makes sure that the non-blocking semaphore operations can be used in an
//! interrupt handler, and that a thread woken up by the handler is dispatched
//! when the handler returns.
use prisync::Semaphore;
use prisync_port_std::{simulate_interrupt, spawn, BootOptions};

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

    spawn::<SystemTraits>("task2", 40, task2_body);

    SEQ.expect_and_replace(2, 3);

    simulate_interrupt::<SystemTraits>(|| {
        assert!(!SEM.try_down());

        // `task2` becomes Ready, but the dispatch is deferred
        SEM.up();

        SEQ.expect_and_replace(3, 4);
    });

    SEQ.expect_and_replace(5, 6);

    SEM.up();
    assert_eq!(SEM.value(), 1);

    simulate_interrupt::<SystemTraits>(|| {
        assert!(SEM.try_down());
        assert!(!SEM.try_down());
        SEQ.expect_and_replace(6, 7);
    });

    assert_eq!(SEM.value(), 0);
}

fn task2_body() {
    SEQ.expect_and_replace(1, 2);

    SEM.down(); // start waiting, switching to `main`

    SEQ.expect_and_replace(4, 5);
}
