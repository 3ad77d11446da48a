use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::Waker;

use crate::join::{subscribe, Fanout};
use crate::source::core::Core;
use crate::source::{Generation, Source, Token};
use crate::task::Task;
use crate::{Error, Status};

/// Waits for the first child to resolve, yielding its index and value — or
/// its error, uniformly, whichever a child produces first.
///
/// Losing children are still drained when they complete; their outcomes
/// cannot change the decided aggregate. An empty set fails immediately with
/// [`Error::NoChildren`].
///
/// Compose a timeout by racing an operation against a
/// [`delay`](crate::time::delay).
///
/// # Examples
///
/// ```
/// use tempo::CompletionSource;
///
/// let (a, task_a) = CompletionSource::new();
/// let (b, task_b) = CompletionSource::new();
/// let any = tempo::join::any(vec![task_a, task_b]);
///
/// b.try_set_result("second child wins");
/// a.try_set_result("too late");
/// assert_eq!(tempo::block_on(any), Ok((1, "second child wins")));
/// ```
pub fn any<T: Send + 'static>(children: Vec<Task<T>>) -> Task<(usize, T)> {
    if children.is_empty() {
        return Task::from_error(Error::NoChildren);
    }
    let state = Arc::new(AnyState {
        generation: Generation::new(),
        core: Core::new(),
        decided: AtomicUsize::new(0),
    });
    let token = state.generation.token();
    subscribe(children, &state);
    Task::from_source(state, token)
}

struct AnyState<T> {
    generation: Generation,
    core: Core<(usize, T)>,
    decided: AtomicUsize,
}

impl<T: Send + 'static> Fanout<T> for AnyState<T> {
    fn complete_child(&self, index: usize, outcome: Result<T, Error>) {
        // only the increment that leaves zero writes the aggregate
        if self.decided.fetch_add(1, Ordering::AcqRel) == 0 {
            match outcome {
                Ok(value) => {
                    self.core.try_set_result((index, value));
                }
                Err(error) => {
                    self.core.try_fail(error);
                }
            }
        } else if let Err(error) = outcome {
            log::debug!("when_any: losing child {index} failed: {error}");
        }
    }
}

impl<T: Send + 'static> Source for AnyState<T> {
    type Output = (usize, T);

    fn status(&self, token: Token) -> Result<Status, Error> {
        self.generation.check(token)?;
        Ok(self.core.status())
    }

    fn register(&self, waker: &Waker, token: Token) -> Result<Status, Error> {
        self.generation.check(token)?;
        Ok(self.core.register(waker))
    }

    fn take_result(&self, token: Token) -> Result<(usize, T), Error> {
        self.generation.check(token)?;
        self.core.take()
    }

    fn dispose(&self, token: Token) {
        self.generation.retire(token);
    }
}
