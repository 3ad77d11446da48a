//! The opaque awaitable handle.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

use crate::cancel::CancelToken;
use crate::source::arena::{self, SlotKey};
use crate::source::{Source, Token};
use crate::{Error, Status};

pub use yield_now::{yield_now, yield_to};

mod yield_now;

/// A handle to one awaitable operation. Every promise kind in this crate —
/// timers, predicate waits, completion sources, combinators — hands out the
/// same concrete type, so call sites treat them uniformly.
///
/// Awaiting the task yields `Result<T, Error>`, consuming the underlying
/// source and recycling its storage. A task that is dropped before
/// completion disposes its source, which cancels any further bookkeeping for
/// it. Polling a task again after it has produced its result yields
/// [`Error::InvalidState`].
#[must_use = "tasks do nothing unless awaited or polled"]
pub struct Task<T> {
    repr: Repr<T>,
}

enum Repr<T> {
    /// Decided at construction; no backing source.
    Ready(Option<Result<T, Error>>),
    /// A shared source: {data pointer, dispatch table} plus the generation
    /// the handle was issued for.
    Shared {
        source: Arc<dyn Source<Output = T>>,
        token: Token,
    },
    /// An arena record; the record itself is zero-payload, the (unit) value
    /// rides in the handle.
    Slot { key: SlotKey, value: Option<T> },
}

// the handle only stores plain data, never a self-reference
impl<T> Unpin for Task<T> {}

impl<T> Task<T> {
    /// A task that is already completed with `value`.
    pub fn ready(value: T) -> Task<T> {
        Task {
            repr: Repr::Ready(Some(Ok(value))),
        }
    }

    /// A task that is already completed with `error`.
    pub fn from_error(error: Error) -> Task<T> {
        Task {
            repr: Repr::Ready(Some(Err(error))),
        }
    }

    pub(crate) fn from_source(source: Arc<dyn Source<Output = T>>, token: Token) -> Task<T> {
        Task {
            repr: Repr::Shared { source, token },
        }
    }

    /// Current status of the underlying source.
    pub fn status(&self) -> Result<Status, Error> {
        match &self.repr {
            Repr::Ready(Some(Ok(_))) => Ok(Status::Succeeded),
            Repr::Ready(Some(Err(Error::Canceled))) => Ok(Status::Canceled),
            Repr::Ready(Some(Err(_))) => Ok(Status::Faulted),
            Repr::Ready(None) => Err(Error::InvalidState("task already consumed")),
            Repr::Shared { source, token } => source.status(*token),
            Repr::Slot { key, .. } => arena::status(*key),
        }
    }

    /// Disposes the task without consuming its result. Equivalent to
    /// dropping it.
    pub fn dispose(self) {}
}

impl Task<()> {
    pub(crate) fn from_slot(key: SlotKey) -> Task<()> {
        Task {
            repr: Repr::Slot {
                key,
                value: Some(()),
            },
        }
    }
}

impl<T: Send + 'static> Task<T> {
    /// Installs `waker` on the underlying source. An already-decided source
    /// wakes the waker synchronously and reports its status.
    pub(crate) fn register_raw(&self, waker: &Waker) -> Result<Status, Error> {
        match &self.repr {
            Repr::Ready(Some(Ok(_))) => Ok(Status::Succeeded),
            Repr::Ready(Some(Err(Error::Canceled))) => Ok(Status::Canceled),
            Repr::Ready(Some(Err(_))) => Ok(Status::Faulted),
            Repr::Ready(None) => Err(Error::InvalidState("task already consumed")),
            Repr::Shared { source, token } => source.register(waker, *token),
            Repr::Slot { key, .. } => arena::register(*key, waker),
        }
    }

    /// Consumes the result if the task has completed, disposing the source.
    pub(crate) fn take_now(&mut self) -> Poll<Result<T, Error>> {
        let outcome = match &mut self.repr {
            Repr::Ready(slot) => match slot.take() {
                Some(outcome) => outcome,
                None => Err(Error::InvalidState("task already consumed")),
            },
            Repr::Shared { source, token } => match source.status(*token) {
                Ok(Status::Pending) => return Poll::Pending,
                Ok(_) => {
                    let outcome = source.take_result(*token);
                    source.dispose(*token);
                    outcome
                }
                Err(error) => Err(error),
            },
            Repr::Slot { key, value } => match arena::status(*key) {
                Ok(Status::Pending) => return Poll::Pending,
                Ok(_) => {
                    let outcome = arena::take(*key).and_then(|()| {
                        value
                            .take()
                            .ok_or(Error::InvalidState("unit payload already taken"))
                    });
                    arena::dispose(*key);
                    outcome
                }
                Err(error) => Err(error),
            },
        };
        self.repr = Repr::Ready(None);
        Poll::Ready(outcome)
    }
}

impl<T: Send + 'static> Future for Task<T> {
    type Output = Result<T, Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let task = self.get_mut();
        match task.take_now() {
            Poll::Ready(outcome) => Poll::Ready(outcome),
            Poll::Pending => match task.register_raw(cx.waker()) {
                Ok(Status::Pending) => Poll::Pending,
                // decided while registering: we were woken inline, consume now
                Ok(_) => task.take_now(),
                Err(error) => {
                    task.repr = Repr::Ready(None);
                    Poll::Ready(Err(error))
                }
            },
        }
    }
}

impl<T> Drop for Task<T> {
    fn drop(&mut self) {
        match &self.repr {
            Repr::Ready(_) => {}
            Repr::Shared { source, token } => source.dispose(*token),
            Repr::Slot { key, .. } => {
                arena::dispose(*key);
            }
        }
    }
}

/// A task that never completes on its own: only signaling `cancel` can ever
/// decide (and then recycle) it. With a token that cannot be signaled the
/// task stays pending forever.
pub fn never(cancel: CancelToken) -> Task<()> {
    if cancel.is_signaled() {
        return Task::from_error(Error::Canceled);
    }
    let key = arena::acquire();
    if cancel.can_be_signaled() {
        let registration = cancel.register(move || {
            arena::complete(key, Err(Error::Canceled));
        });
        arena::set_registration(key, registration);
    }
    Task::from_slot(key)
}
