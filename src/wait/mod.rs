//! Predicate promises: wait until a condition holds, until it stops
//! holding, until a watched value changes, or until a cancellation token
//! signals.
//!
//! Conditions run once per tick on the loop thread. A panic inside a user
//! condition is caught and surfaces as [`Error::Faulted`] at the await site;
//! it never unwinds into the tick loop.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::task::{Poll, Waker};
use std::time::Instant;

use once_cell::sync::Lazy;

use crate::cancel::{CancelToken, Registration};
use crate::source::core::Core;
use crate::source::pool::Pool;
use crate::source::{arena, Generation, Source, Token};
use crate::sync::lock;
use crate::task::Task;
use crate::ticker::{self, Timing};
use crate::{Error, Status};

/// Completes on the first tick where `predicate()` returns true.
///
/// A predicate constructed against an already-signaled token reports
/// cancellation without the predicate ever running.
///
/// # Examples
///
/// ```
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// tempo::block_on(async {
///     let hits = Arc::new(AtomicUsize::new(0));
///     let counter = hits.clone();
///     tempo::wait::until(move || counter.fetch_add(1, Ordering::Relaxed) + 1 >= 3)
///         .await
///         .unwrap();
///     assert_eq!(hits.load(Ordering::Relaxed), 3);
/// });
/// ```
///
/// # Panics
///
/// Panics if called outside the context of a tick loop.
pub fn until(predicate: impl FnMut() -> bool + Send + 'static) -> Task<()> {
    until_with(predicate, Timing::Update, CancelToken::none(), false)
}

/// [`until`] with an explicit phase and cancellation.
pub fn until_with(
    predicate: impl FnMut() -> bool + Send + 'static,
    timing: Timing,
    cancel: CancelToken,
    cancel_immediately: bool,
) -> Task<()> {
    if cancel.is_signaled() {
        return Task::from_error(Error::Canceled);
    }
    let source = POOL.acquire(WaitSource::new);
    let token = source.generation.token();
    {
        let mut state = lock(&source.state);
        state.predicate = Some(Box::new(predicate));
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
    ticker::current_unwrap("wait::until").register(timing, move |now| stepper.step(token, now));
    Task::from_source(source, token)
}

/// Completes on the first tick where `predicate()` returns false.
pub fn while_true(predicate: impl FnMut() -> bool + Send + 'static) -> Task<()> {
    while_true_with(predicate, Timing::Update, CancelToken::none(), false)
}

/// [`while_true`] with an explicit phase and cancellation.
pub fn while_true_with(
    mut predicate: impl FnMut() -> bool + Send + 'static,
    timing: Timing,
    cancel: CancelToken,
    cancel_immediately: bool,
) -> Task<()> {
    until_with(move || !predicate(), timing, cancel, cancel_immediately)
}

/// Samples `watch()` at construction, then completes with the new value on
/// the first tick where it no longer equals that first sample.
pub fn for_change<V, W>(watch: W) -> Task<V>
where
    V: PartialEq + Send + 'static,
    W: FnMut() -> V + Send + 'static,
{
    for_change_with(watch, Timing::Update, CancelToken::none(), false)
}

/// [`for_change`] with an explicit phase and cancellation.
pub fn for_change_with<V, W>(
    mut watch: W,
    timing: Timing,
    cancel: CancelToken,
    cancel_immediately: bool,
) -> Task<V>
where
    V: PartialEq + Send + 'static,
    W: FnMut() -> V + Send + 'static,
{
    if cancel.is_signaled() {
        return Task::from_error(Error::Canceled);
    }
    let prior = match catch_unwind(AssertUnwindSafe(&mut watch)) {
        Ok(prior) => prior,
        Err(payload) => return Task::from_error(Error::from_panic(payload)),
    };
    let source = Arc::new(ChangeSource {
        generation: Generation::new(),
        core: Core::new(),
        state: Mutex::new(ChangeState {
            watch: Some(Box::new(watch)),
            prior: Some(prior),
            cancel: cancel.clone(),
            registration: None,
        }),
    });
    let token = source.generation.token();
    if cancel_immediately && cancel.can_be_signaled() {
        // registered outside the state lock, see `until_with`
        let cancelee = source.clone();
        let registration = cancel.register(move || cancelee.cancel_now(token));
        lock(&source.state).registration = Some(registration);
    }
    let stepper = source.clone();
    ticker::current_unwrap("wait::for_change").register(timing, move |now| stepper.step(token, now));
    Task::from_source(source, token)
}

/// Completes successfully when `cancel` signals: cancellation as an event
/// rather than an error. With a token that cannot be signaled the task stays
/// pending forever.
pub fn signaled(cancel: CancelToken) -> Task<()> {
    if cancel.is_signaled() {
        return Task::ready(());
    }
    let key = arena::acquire();
    if cancel.can_be_signaled() {
        let registration = cancel.register(move || {
            arena::complete(key, Ok(()));
        });
        arena::set_registration(key, registration);
    }
    Task::from_slot(key)
}

static POOL: Lazy<Pool<WaitSource>> = Lazy::new(Pool::new);

type Predicate = Box<dyn FnMut() -> bool + Send>;

struct WaitSource {
    index: u32,
    generation: Generation,
    core: Core<()>,
    state: Mutex<WaitState>,
}

struct WaitState {
    predicate: Option<Predicate>,
    cancel: CancelToken,
    registration: Option<Registration>,
}

impl WaitSource {
    fn new(index: u32) -> WaitSource {
        WaitSource {
            index,
            generation: Generation::new(),
            core: Core::new(),
            state: Mutex::new(WaitState {
                predicate: None,
                cancel: CancelToken::none(),
                registration: None,
            }),
        }
    }

    fn step(&self, token: Token, _now: Instant) -> Poll<()> {
        let waker: Option<Waker> = {
            let mut state = lock(&self.state);
            if self.generation.check(token).is_err() {
                return Poll::Ready(());
            }
            let outcome = if state.cancel.is_signaled() {
                Err(Error::Canceled)
            } else {
                match state.predicate.as_mut() {
                    None => Err(Error::InvalidState("predicate missing")),
                    Some(predicate) => match catch_unwind(AssertUnwindSafe(predicate)) {
                        Ok(true) => Ok(()),
                        Ok(false) => return Poll::Pending,
                        Err(payload) => Err(Error::from_panic(payload)),
                    },
                }
            };
            self.core.complete(outcome).flatten()
        };
        if let Some(waker) = waker {
            waker.wake();
        }
        Poll::Ready(())
    }

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

impl Source for WaitSource {
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
            state.predicate = None;
            state.registration = None;
            state.cancel = CancelToken::none();
            self.core.reset();
        }
        POOL.release(self.index);
    }
}

type Watch<V> = Box<dyn FnMut() -> V + Send>;

/// The value-change waiter carries a typed payload, so it uses the
/// explicitly allocated scheme rather than a pool.
struct ChangeSource<V> {
    generation: Generation,
    core: Core<V>,
    state: Mutex<ChangeState<V>>,
}

struct ChangeState<V> {
    watch: Option<Watch<V>>,
    prior: Option<V>,
    cancel: CancelToken,
    registration: Option<Registration>,
}

impl<V: PartialEq + Send + 'static> ChangeSource<V> {
    fn step(&self, token: Token, _now: Instant) -> Poll<()> {
        let waker: Option<Waker> = {
            let mut state = lock(&self.state);
            if self.generation.check(token).is_err() {
                return Poll::Ready(());
            }
            let outcome = if state.cancel.is_signaled() {
                Err(Error::Canceled)
            } else {
                let ChangeState { watch, prior, .. } = &mut *state;
                match (watch.as_mut(), prior.as_ref()) {
                    (Some(watch), Some(prior)) => match catch_unwind(AssertUnwindSafe(watch)) {
                        Ok(current) if current == *prior => return Poll::Pending,
                        Ok(current) => Ok(current),
                        Err(payload) => Err(Error::from_panic(payload)),
                    },
                    _ => Err(Error::InvalidState("watch function missing")),
                }
            };
            self.core.complete(outcome).flatten()
        };
        if let Some(waker) = waker {
            waker.wake();
        }
        Poll::Ready(())
    }

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

impl<V: PartialEq + Send + 'static> Source for ChangeSource<V> {
    type Output = V;

    fn status(&self, token: Token) -> Result<Status, Error> {
        self.generation.check(token)?;
        Ok(self.core.status())
    }

    fn register(&self, waker: &Waker, token: Token) -> Result<Status, Error> {
        self.generation.check(token)?;
        Ok(self.core.register(waker))
    }

    fn take_result(&self, token: Token) -> Result<V, Error> {
        self.generation.check(token)?;
        self.core.take()
    }

    fn dispose(&self, token: Token) {
        let mut state = lock(&self.state);
        if !self.generation.retire(token) {
            return;
        }
        state.watch = None;
        state.prior = None;
        state.registration = None;
        state.cancel = CancelToken::none();
    }
}
