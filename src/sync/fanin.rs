//! A minimal fan-in queue: many producers on arbitrary threads, one
//! asynchronous consumer. The streaming combinator funnels child completions
//! through one of these.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::task::{Context, Poll, Waker};

use crate::sync::lock;

pub struct FanIn<T> {
    inner: Mutex<Inner<T>>,
}

struct Inner<T> {
    items: VecDeque<T>,
    waker: Option<Waker>,
    /// All producers are done; the queue drains and then ends.
    completed: bool,
    /// The consumer went away; writes are rejected from now on.
    read_closed: bool,
}

impl<T> FanIn<T> {
    #[must_use]
    pub fn new() -> FanIn<T> {
        FanIn {
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                waker: None,
                completed: false,
                read_closed: false,
            }),
        }
    }

    /// Enqueues an item and wakes the consumer. Returns the item back if the
    /// consumer is gone.
    pub fn try_write(&self, item: T) -> Result<(), T> {
        let waker = {
            let mut inner = lock(&self.inner);
            if inner.read_closed {
                return Err(item);
            }
            inner.items.push_back(item);
            inner.waker.take()
        };
        if let Some(waker) = waker {
            waker.wake();
        }
        Ok(())
    }

    /// Marks the producer side finished. Returns whether this call was the
    /// one that completed the queue.
    pub fn try_complete(&self) -> bool {
        let (first, waker) = {
            let mut inner = lock(&self.inner);
            if inner.completed {
                (false, None)
            } else {
                inner.completed = true;
                (true, inner.waker.take())
            }
        };
        if let Some(waker) = waker {
            waker.wake();
        }
        first
    }

    /// Dequeues an item if one is ready.
    pub fn try_read(&self) -> Option<T> {
        lock(&self.inner).items.pop_front()
    }

    /// Dequeues an item, `Ready(None)` once completed and drained, or parks
    /// the consumer's waker.
    pub fn poll_read(&self, cx: &mut Context<'_>) -> Poll<Option<T>> {
        let mut inner = lock(&self.inner);
        if let Some(item) = inner.items.pop_front() {
            return Poll::Ready(Some(item));
        }
        if inner.completed {
            return Poll::Ready(None);
        }
        match &inner.waker {
            Some(old) if old.will_wake(cx.waker()) => {}
            _ => inner.waker = Some(cx.waker().clone()),
        }
        Poll::Pending
    }

    /// Tells producers the consumer is gone; later writes return their item.
    pub fn close_read(&self) {
        lock(&self.inner).read_closed = true;
    }
}

impl<T> Default for FanIn<T> {
    fn default() -> Self {
        FanIn::new()
    }
}
