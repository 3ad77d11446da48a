//! The cooperative tick loop.
//!
//! Leaf promises register a step closure here at construction; the loop runs
//! every registered step once per [`tick`](TickLoop::tick) until the step
//! reports [`Poll::Ready`]. The loop owns no threads: a host calls `tick`
//! once per frame, or [`block_on`](TickLoop::block_on) drives ticks itself
//! until a future resolves.

use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll, Wake, Waker};
use std::thread::{self, Thread};
use std::time::{Duration, Instant};

pub use globals::current;
pub(crate) use globals::{current_unwrap, TICK_LOOP};

mod globals;

/// The loop phase a step runs in. Phases are swept in declaration order
/// within one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Timing {
    Early,
    #[default]
    Update,
    Late,
}

impl Timing {
    const COUNT: usize = 3;

    fn index(self) -> usize {
        match self {
            Timing::Early => 0,
            Timing::Update => 1,
            Timing::Late => 2,
        }
    }
}

type Step = Box<dyn FnMut(Instant) -> Poll<()>>;

/// A single-threaded cooperative step scheduler.
#[derive(Clone)]
pub struct TickLoop {
    inner: Rc<Inner>,
}

struct Inner {
    buckets: [RefCell<Vec<Step>>; Timing::COUNT],
    /// Steps registered since the last tick; they join their bucket at the
    /// start of the next tick, so a step never runs in the tick that
    /// created it.
    incoming: RefCell<Vec<(Timing, Step)>>,
}

impl TickLoop {
    #[must_use]
    pub fn new() -> TickLoop {
        TickLoop {
            inner: Rc::new(Inner {
                buckets: [
                    RefCell::new(Vec::new()),
                    RefCell::new(Vec::new()),
                    RefCell::new(Vec::new()),
                ],
                incoming: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Registers a step to be run once per tick, starting next tick, until
    /// it returns `Poll::Ready(())`.
    pub fn register<F>(&self, timing: Timing, step: F)
    where
        F: FnMut(Instant) -> Poll<()> + 'static,
    {
        self.inner
            .incoming
            .borrow_mut()
            .push((timing, Box::new(step)));
    }

    /// Runs one scheduling slot: admits newly registered steps, then sweeps
    /// every phase, dropping steps that report done.
    pub fn tick(&self, now: Instant) {
        let incoming = std::mem::take(&mut *self.inner.incoming.borrow_mut());
        for (timing, step) in incoming {
            self.inner.buckets[timing.index()].borrow_mut().push(step);
        }
        for bucket in &self.inner.buckets {
            let mut steps = bucket.borrow_mut();
            let before = steps.len();
            steps.retain_mut(|step| step(now).is_pending());
            if steps.len() != before {
                log::trace!("tick retired {} steps", before - steps.len());
            }
        }
    }

    /// Whether no steps are registered or pending admission.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.inner.incoming.borrow().is_empty()
            && self
                .inner
                .buckets
                .iter()
                .all(|bucket| bucket.borrow().is_empty())
    }

    /// Enters this loop's context. While the guard is in scope, promise
    /// constructors on this thread register their steps here.
    #[must_use]
    pub fn enter(&self) -> impl Drop + '_ {
        struct Enter<'a>(Option<TickLoop>, &'a ());
        impl Drop for Enter<'_> {
            fn drop(&mut self) {
                TICK_LOOP.with(|cell| cell.replace(self.0.take()));
            }
        }
        let previous = TICK_LOOP.with(|cell| cell.replace(Some(self.clone())));
        Enter(previous, &())
    }

    /// Runs a future to completion, ticking this loop once per frame until
    /// the future resolves.
    ///
    /// # Panics
    ///
    /// Panics if called from the inside of another tick loop context.
    /// Loops cannot be nested.
    pub fn block_on<F: Future>(&self, mut future: F) -> F::Output {
        let msg = "called `block_on` from the inside of another tick loop.";
        assert!(current().is_none(), "{}", msg);
        let _enter = self.enter();

        // Safety: the future is shadowed and never moved again.
        let mut future = unsafe { Pin::new_unchecked(&mut future) };

        let unpark = Arc::new(Unpark {
            thread: thread::current(),
            woken: AtomicBool::new(true),
        });
        let waker = Waker::from(unpark.clone());
        let mut cx = Context::from_waker(&waker);

        loop {
            self.tick(Instant::now());
            if unpark.woken.swap(false, Ordering::AcqRel) {
                if let Poll::Ready(out) = future.as_mut().poll(&mut cx) {
                    return out;
                }
            }
            // frame pacing: wake early when a completion unparks us
            thread::park_timeout(FRAME);
        }
    }
}

impl Default for TickLoop {
    fn default() -> Self {
        TickLoop::new()
    }
}

const FRAME: Duration = Duration::from_millis(1);

struct Unpark {
    thread: Thread,
    woken: AtomicBool,
}

impl Wake for Unpark {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.woken.store(true, Ordering::Release);
        self.thread.unpark();
    }
}

/// Runs a future to completion on a fresh [`TickLoop`]. This is the simplest
/// entry point.
///
/// # Examples
///
/// ```
/// use tempo::time::{delay, Duration};
///
/// tempo::block_on(async {
///     delay(Duration::from_millis(10)).await.unwrap();
/// });
/// ```
pub fn block_on<F: Future>(future: F) -> F::Output {
    TickLoop::new().block_on(future)
}
