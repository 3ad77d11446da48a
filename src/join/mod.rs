//! Combinators over collections of child tasks.
//!
//! [`all`] resolves once every child has, [`any`] with the first child to
//! resolve, and [`each`] streams results in completion order. Children may
//! complete concurrently from different threads; the aggregate decision is
//! made with atomic counters and the completion cell's single assignment,
//! never a broad lock, so no completing thread ever blocks on another.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Poll, Wake, Waker};

use crate::sync::lock;
use crate::task::Task;
use crate::Error;

pub use all::all;
pub use any::any;
pub use each::{each, WhenEach};

mod all;
mod any;
mod each;

/// An aggregate that children report into.
trait Fanout<T>: Send + Sync + 'static {
    /// Called exactly once per child, on whichever thread completed it.
    fn complete_child(&self, index: usize, outcome: Result<T, Error>);
}

/// The private completion callback given to one child: woken when the child
/// completes, it takes the child's result and reports it to the aggregate.
struct ChildSub<T, F> {
    state: Arc<F>,
    index: usize,
    /// Set before consuming, so a wake that fires while the child is not
    /// stashed yet is replayed by the subscriber.
    woken: AtomicBool,
    child: Mutex<Option<Task<T>>>,
}

impl<T, F> ChildSub<T, F>
where
    T: Send + 'static,
    F: Fanout<T>,
{
    fn try_consume(&self) {
        let Some(mut task) = lock(&self.child).take() else {
            return;
        };
        match task.take_now() {
            Poll::Ready(outcome) => self.state.complete_child(self.index, outcome),
            // spurious wake: put the child back for the real completion
            Poll::Pending => *lock(&self.child) = Some(task),
        }
    }
}

impl<T, F> Wake for ChildSub<T, F>
where
    T: Send + 'static,
    F: Fanout<T>,
{
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.woken.store(true, Ordering::Release);
        self.try_consume();
    }
}

/// Subscribes every child to the aggregate. Children that are already
/// complete report inline from the calling thread.
fn subscribe<T, F>(children: Vec<Task<T>>, state: &Arc<F>)
where
    T: Send + 'static,
    F: Fanout<T>,
{
    for (index, mut child) in children.into_iter().enumerate() {
        let sub = Arc::new(ChildSub {
            state: state.clone(),
            index,
            woken: AtomicBool::new(false),
            child: Mutex::new(None),
        });
        let waker = Waker::from(sub.clone());
        match child.register_raw(&waker) {
            Err(error) => state.complete_child(index, Err(error)),
            Ok(status) if status.is_completed() => match child.take_now() {
                Poll::Ready(outcome) => state.complete_child(index, outcome),
                Poll::Pending => {
                    *lock(&sub.child) = Some(child);
                    sub.try_consume();
                }
            },
            Ok(_) => {
                *lock(&sub.child) = Some(child);
                // the child may have completed while it was not stashed yet;
                // replay the wake we would have missed
                if sub.woken.load(Ordering::Acquire) {
                    sub.try_consume();
                }
            }
        }
    }
}
