use super::TickLoop;
use std::cell::RefCell;

thread_local! {
    /// The tick loop driving promises constructed on this thread.
    pub(crate) static TICK_LOOP: RefCell<Option<TickLoop>> = RefCell::new(None);
}

/// Returns a handle to the tick loop the current thread is running under.
#[must_use]
pub fn current() -> Option<TickLoop> {
    TICK_LOOP.with(|cell| cell.borrow().clone())
}

#[track_caller]
#[inline]
pub(crate) fn current_unwrap(fun: &str) -> TickLoop {
    let Some(tick_loop) = current() else {
        panic!("called `{fun}` from the outside of a tick loop context.")
    };
    tick_loop
}
