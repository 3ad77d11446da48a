use std::fmt;
use std::sync::Arc;
use std::task::Waker;

use crate::source::core::Core;
use crate::source::{Generation, Source, Token};
use crate::task::Task;
use crate::{Error, Status};

/// The externally-completable promise: hand the [`Task`] to a consumer and
/// decide it later from any thread.
///
/// Exactly one of [`try_set_result`], [`try_set_error`] and
/// [`try_set_canceled`] takes effect; the rest are no-ops returning `false`.
/// Once the consumer has taken the result, every setter observes a stale
/// token and returns `false` as well.
///
/// [`try_set_result`]: CompletionSource::try_set_result
/// [`try_set_error`]: CompletionSource::try_set_error
/// [`try_set_canceled`]: CompletionSource::try_set_canceled
///
/// # Examples
///
/// ```
/// use tempo::CompletionSource;
///
/// let (source, task) = CompletionSource::new();
/// std::thread::spawn(move || {
///     source.try_set_result(42);
/// });
/// assert_eq!(tempo::block_on(task), Ok(42));
/// ```
pub struct CompletionSource<T> {
    source: Arc<ManualSource<T>>,
    token: Token,
}

struct ManualSource<T> {
    generation: Generation,
    core: Core<T>,
}

impl<T: Send + 'static> CompletionSource<T> {
    /// Creates the source and the task awaiting it.
    #[must_use]
    pub fn new() -> (CompletionSource<T>, Task<T>) {
        let source = Arc::new(ManualSource {
            generation: Generation::new(),
            core: Core::new(),
        });
        let token = source.generation.token();
        let task = Task::from_source(source.clone(), token);
        (CompletionSource { source, token }, task)
    }

    pub fn try_set_result(&self, value: T) -> bool {
        self.source.generation.check(self.token).is_ok() && self.source.core.try_set_result(value)
    }

    pub fn try_set_error(&self, message: impl fmt::Display) -> bool {
        self.source.generation.check(self.token).is_ok()
            && self.source.core.try_fail(Error::faulted(message))
    }

    pub fn try_set_canceled(&self) -> bool {
        self.source.generation.check(self.token).is_ok() && self.source.core.try_set_canceled()
    }

    /// Current status of the underlying cell, or `TokenMismatch` once the
    /// consumer has disposed it.
    pub fn status(&self) -> Result<Status, Error> {
        self.source.generation.check(self.token)?;
        Ok(self.source.core.status())
    }
}

impl<T> Clone for CompletionSource<T> {
    fn clone(&self) -> Self {
        CompletionSource {
            source: self.source.clone(),
            token: self.token,
        }
    }
}

impl<T: Send + 'static> Source for ManualSource<T> {
    type Output = T;

    fn status(&self, token: Token) -> Result<Status, Error> {
        self.generation.check(token)?;
        Ok(self.core.status())
    }

    fn register(&self, waker: &Waker, token: Token) -> Result<Status, Error> {
        self.generation.check(token)?;
        Ok(self.core.register(waker))
    }

    fn take_result(&self, token: Token) -> Result<T, Error> {
        self.generation.check(token)?;
        self.core.take()
    }

    fn dispose(&self, token: Token) {
        // explicitly allocated scheme: retiring the generation is all there
        // is to do, the memory goes away with the last Arc
        self.generation.retire(token);
    }
}
