//! Timer promises, driven by timestamp comparison on each tick.

use std::sync::Mutex;
use std::task::{Poll, Waker};
use std::time::Instant;

use once_cell::sync::Lazy;

use crate::cancel::{CancelToken, Registration};
use crate::source::core::Core;
use crate::source::pool::Pool;
use crate::source::{Generation, Source, Token};
use crate::sync::lock;
use crate::task::Task;
use crate::ticker::{self, Timing};
use crate::{Error, Status};

pub use std::time::Duration;

/// Waits until `duration` has elapsed. An asynchronous analog to
/// `std::thread::sleep` for tick-driven code.
///
/// The delay never reports completion while the elapsed time is below
/// `duration`, and completes on the first tick where it is not.
///
/// # Cancellation
///
/// Canceling a delay is done by dropping the returned task, or by passing a
/// cancellation token to [`delay_with`].
///
/// # Examples
///
/// ```
/// use tempo::time::{delay, Duration};
/// use std::time::Instant;
///
/// tempo::block_on(async {
///     let time = Instant::now();
///     let duration = Duration::from_millis(50);
///     delay(duration).await.unwrap();
///     assert!(time.elapsed() >= duration);
/// });
/// ```
///
/// # Panics
///
/// Panics if called outside the context of a tick loop.
pub fn delay(duration: Duration) -> Task<()> {
    delay_with(duration, Timing::Update, CancelToken::none(), false)
}

/// [`delay`] with an explicit phase, a cancellation token, and the choice of
/// when cancellation takes effect: `cancel_immediately` completes the task
/// the moment the token signals, otherwise cancellation is observed on the
/// delay's next tick.
pub fn delay_with(
    duration: Duration,
    timing: Timing,
    cancel: CancelToken,
    cancel_immediately: bool,
) -> Task<()> {
    if cancel.is_signaled() {
        return Task::from_error(Error::Canceled);
    }
    let source = POOL.acquire(DelaySource::new);
    let token = source.generation.token();
    {
        let mut state = lock(&source.state);
        state.start = Instant::now();
        state.duration = duration;
        state.cancel = cancel.clone();
    }
    if cancel_immediately && cancel.can_be_signaled() {
        // registered outside the state lock: a token signaling right now
        // runs the callback inline, and the callback takes that lock
        let cancelee = source.clone();
        let registration = cancel.register(move || cancelee.cancel_now(token));
        lock(&source.state).registration = Some(registration);
    }
    let stepper = source.clone();
    ticker::current_unwrap("delay").register(timing, move |now| stepper.step(token, now));
    Task::from_source(source, token)
}

static POOL: Lazy<Pool<DelaySource>> = Lazy::new(Pool::new);

struct DelaySource {
    index: u32,
    generation: Generation,
    core: Core<()>,
    state: Mutex<DelayState>,
}

struct DelayState {
    start: Instant,
    duration: Duration,
    cancel: CancelToken,
    registration: Option<Registration>,
}

impl DelaySource {
    fn new(index: u32) -> DelaySource {
        DelaySource {
            index,
            generation: Generation::new(),
            core: Core::new(),
            state: Mutex::new(DelayState {
                start: Instant::now(),
                duration: Duration::ZERO,
                cancel: CancelToken::none(),
                registration: None,
            }),
        }
    }

    /// One tick. The decision and the completion happen under the state
    /// lock so a racing dispose cannot recycle the cell underneath us; the
    /// wake runs after the lock is released.
    fn step(&self, token: Token, now: Instant) -> Poll<()> {
        let waker: Option<Waker> = {
            let state = lock(&self.state);
            if self.generation.check(token).is_err() {
                return Poll::Ready(());
            }
            let outcome = if state.cancel.is_signaled() {
                Err(Error::Canceled)
            } else if now.saturating_duration_since(state.start) >= state.duration {
                Ok(())
            } else {
                return Poll::Pending;
            };
            self.core.complete(outcome).flatten()
        };
        if let Some(waker) = waker {
            waker.wake();
        }
        Poll::Ready(())
    }

    /// The `cancel_immediately` callback: completes the cell without waiting
    /// for the next tick.
    fn cancel_now(&self, token: Token) {
        let waker = {
            let _state = lock(&self.state);
            if self.generation.check(token).is_err() {
                return;
            }
            self.core.complete(Err(Error::Canceled)).flatten()
        };
        if let Some(waker) = waker {
            waker.wake();
        }
    }
}

impl Source for DelaySource {
    type Output = ();

    fn status(&self, token: Token) -> Result<Status, Error> {
        self.generation.check(token)?;
        Ok(self.core.status())
    }

    fn register(&self, waker: &Waker, token: Token) -> Result<Status, Error> {
        self.generation.check(token)?;
        Ok(self.core.register(waker))
    }

    fn take_result(&self, token: Token) -> Result<(), Error> {
        self.generation.check(token)?;
        self.core.take()
    }

    fn dispose(&self, token: Token) {
        {
            let mut state = lock(&self.state);
            if !self.generation.retire(token) {
                return;
            }
            state.registration = None;
            state.cancel = CancelToken::none();
            self.core.reset();
        }
        POOL.release(self.index);
    }
}
