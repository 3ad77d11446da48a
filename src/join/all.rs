use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::Waker;

use crate::join::{subscribe, Fanout};
use crate::source::core::Core;
use crate::source::{Generation, Source, Token};
use crate::sync::lock;
use crate::task::Task;
use crate::{Error, Status};

/// Waits for every child, resolving with all results in the children's
/// original order.
///
/// The first child to fail decides the aggregate with its error; children
/// completing after that are still drained, their outcomes discarded. An
/// empty set resolves immediately with an empty `Vec`.
///
/// # Examples
///
/// ```
/// use tempo::CompletionSource;
///
/// let (a, task_a) = CompletionSource::new();
/// let (b, task_b) = CompletionSource::new();
/// let all = tempo::join::all(vec![task_a, task_b]);
///
/// // completion order does not matter, results keep the original order
/// b.try_set_result(2);
/// a.try_set_result(1);
/// assert_eq!(tempo::block_on(all), Ok(vec![1, 2]));
/// ```
pub fn all<T: Send + 'static>(children: Vec<Task<T>>) -> Task<Vec<T>> {
    if children.is_empty() {
        return Task::ready(Vec::new());
    }
    let state = Arc::new(AllState {
        generation: Generation::new(),
        core: Core::new(),
        slots: (0..children.len()).map(|_| Mutex::new(None)).collect(),
        completed: AtomicUsize::new(0),
    });
    let token = state.generation.token();
    subscribe(children, &state);
    Task::from_source(state, token)
}

struct AllState<T> {
    generation: Generation,
    core: Core<Vec<T>>,
    /// One slot per child; each is written exactly once, by its own child's
    /// callback, so the locks never contend.
    slots: Box<[Mutex<Option<T>>]>,
    completed: AtomicUsize,
}

impl<T: Send + 'static> AllState<T> {
    fn try_gather(&self) {
        let mut results = Vec::with_capacity(self.slots.len());
        for slot in &*self.slots {
            match lock(slot).take() {
                Some(value) => results.push(value),
                // a fault already decided the aggregate
                None => return,
            }
        }
        self.core.try_set_result(results);
    }
}

impl<T: Send + 'static> Fanout<T> for AllState<T> {
    fn complete_child(&self, index: usize, outcome: Result<T, Error>) {
        match outcome {
            Ok(value) => *lock(&self.slots[index]) = Some(value),
            Err(error) => {
                if !self.core.try_fail(error.clone()) {
                    log::debug!("when_all: child {index} failed after the aggregate was decided: {error}");
                }
            }
        }
        // the increment that reaches the child count gathers the buffer
        if self.completed.fetch_add(1, Ordering::AcqRel) + 1 == self.slots.len() {
            self.try_gather();
        }
    }
}

impl<T: Send + 'static> Source for AllState<T> {
    type Output = Vec<T>;

    fn status(&self, token: Token) -> Result<Status, Error> {
        self.generation.check(token)?;
        Ok(self.core.status())
    }

    fn register(&self, waker: &Waker, token: Token) -> Result<Status, Error> {
        self.generation.check(token)?;
        Ok(self.core.register(waker))
    }

    fn take_result(&self, token: Token) -> Result<Vec<T>, Error> {
        self.generation.check(token)?;
        self.core.take()
    }

    fn dispose(&self, token: Token) {
        self.generation.retire(token);
    }
}
