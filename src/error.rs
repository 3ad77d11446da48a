use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// The ways an awaited [`Task`](crate::Task) can fail.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The handle's token no longer matches its source: the task was already
    /// consumed, or its storage was disposed and recycled for a newer task.
    /// This always indicates a usage bug on the caller's side.
    #[error("token mismatch: the task was already consumed or its storage recycled")]
    TokenMismatch,
    /// An internal state that should be unreachable.
    #[error("task source is in an invalid state: {0}")]
    InvalidState(&'static str),
    /// The task was canceled through its cancellation token.
    #[error("the task was canceled")]
    Canceled,
    /// A user callback failed; carries the propagated message.
    #[error("the task failed: {0}")]
    Faulted(Arc<str>),
    /// A combinator was invoked with an empty set of children.
    #[error("no tasks were provided")]
    NoChildren,
}

impl Error {
    /// Wraps an arbitrary failure message.
    pub fn faulted(message: impl fmt::Display) -> Error {
        Error::Faulted(message.to_string().into())
    }

    /// Converts a caught panic payload into a `Faulted` error, preserving
    /// the panic message when there is one.
    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Error {
        let message = payload
            .downcast_ref::<&'static str>()
            .map(|message| (*message).to_owned())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "user callback panicked".to_owned());
        Error::Faulted(message.into())
    }
}

/// The observable state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Not decided yet.
    Pending,
    /// Completed with a value.
    Succeeded,
    /// Completed with an error.
    Faulted,
    /// Completed by cancellation.
    Canceled,
}

impl Status {
    /// Whether the task has left the pending state.
    #[must_use]
    pub fn is_completed(self) -> bool {
        !matches!(self, Status::Pending)
    }
}
