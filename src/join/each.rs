use std::future::poll_fn;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::join::{subscribe, Fanout};
use crate::sync::FanIn;
use crate::task::Task;
use crate::Error;

/// Streams child results in completion order: children with delays of
/// `[300ms, 100ms, 200ms]` yield indices `[1, 2, 0]`.
///
/// The stream ends after every child has been yielded. An empty set yields a
/// single [`Error::NoChildren`] and then ends.
///
/// # Examples
///
/// ```
/// use tempo::CompletionSource;
///
/// let (a, task_a) = CompletionSource::new();
/// let (b, task_b) = CompletionSource::new();
/// let mut stream = tempo::join::each(vec![task_a, task_b]);
///
/// b.try_set_result('y');
/// a.try_set_result('x');
/// tempo::block_on(async move {
///     assert_eq!(stream.next().await, Some(Ok((1, 'y'))));
///     assert_eq!(stream.next().await, Some(Ok((0, 'x'))));
///     assert_eq!(stream.next().await, None);
/// });
/// ```
pub fn each<T: Send + 'static>(children: Vec<Task<T>>) -> WhenEach<T> {
    let queue = Arc::new(FanIn::new());
    if children.is_empty() {
        let _ = queue.try_write(Err(Error::NoChildren));
        queue.try_complete();
        return WhenEach { queue };
    }
    let state = Arc::new(EachState {
        queue: queue.clone(),
        remaining: AtomicUsize::new(children.len()),
    });
    subscribe(children, &state);
    WhenEach { queue }
}

type Item<T> = Result<(usize, T), Error>;

/// The lazy, single-pass sequence produced by [`each`].
///
/// Dropping the stream stops surfacing items; children still in flight keep
/// completing into the internal queue so a failing straggler is observed
/// (and logged) rather than silently lost.
#[must_use = "streams do nothing unless polled"]
pub struct WhenEach<T> {
    queue: Arc<FanIn<Item<T>>>,
}

impl<T> WhenEach<T> {
    /// Waits for the next child to complete. Returns `None` once every child
    /// has been yielded.
    pub async fn next(&mut self) -> Option<Item<T>> {
        poll_fn(|cx| self.queue.poll_read(cx)).await
    }

    /// Returns an already-queued item without waiting.
    pub fn try_next(&mut self) -> Option<Item<T>> {
        self.queue.try_read()
    }
}

impl<T> Drop for WhenEach<T> {
    fn drop(&mut self) {
        self.queue.close_read();
        while let Some(item) = self.queue.try_read() {
            if let Err(error) = item {
                log::debug!("when_each: dropped unread failure: {error}");
            }
        }
    }
}

struct EachState<T> {
    queue: Arc<FanIn<Item<T>>>,
    remaining: AtomicUsize,
}

impl<T: Send + 'static> Fanout<T> for EachState<T> {
    fn complete_child(&self, index: usize, outcome: Result<T, Error>) {
        let item = outcome.map(|value| (index, value));
        if let Err(item) = self.queue.try_write(item) {
            if let Err(error) = item {
                log::debug!("when_each: straggler {index} failed after the stream was dropped: {error}");
            }
        }
        if self.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.queue.try_complete();
        }
    }
}
