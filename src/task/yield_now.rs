use std::task::Poll;

use crate::source::arena;
use crate::task::Task;
use crate::ticker::{self, Timing};

/// Completes on the next tick, letting the rest of the current frame run
/// first.
///
/// # Panics
///
/// Panics if called outside the context of a tick loop.
pub fn yield_now() -> Task<()> {
    yield_to(Timing::Update)
}

/// Completes on the next sweep of the given phase.
pub fn yield_to(timing: Timing) -> Task<()> {
    let key = arena::acquire();
    ticker::current_unwrap("yield_now").register(timing, move |_now| {
        arena::complete(key, Ok(()));
        Poll::Ready(())
    });
    Task::from_slot(key)
}
