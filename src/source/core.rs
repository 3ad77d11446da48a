//! The completion cell: a single-assignment result/error holder with an
//! atomically registered waker.
//!
//! The synchronization strategy is the tokio `AtomicWaker` one: registration
//! briefly holds a `REGISTERING` lock state while cloning the waker in, and
//! completion holds a `COMPLETING` lock state while moving the payload in.
//! Each side spins through the other's window, so the cell resolves a race
//! between a registering consumer and a completing producer to exactly one
//! wake.

use std::cell::UnsafeCell;
use std::hint;
use std::sync::atomic::{AtomicU8, Ordering};
use std::task::Waker;

use crate::{Error, Status};

const PENDING: u8 = 0;
/// A consumer is installing its waker.
const REGISTERING: u8 = 1;
/// A waker is installed and may be woken by completion.
const WAITING: u8 = 2;
/// A completer won the race and is writing the payload.
const COMPLETING: u8 = 3;
const SUCCEEDED: u8 = 4;
const FAULTED: u8 = 5;
const CANCELED: u8 = 6;

pub(crate) struct Core<T> {
    state: AtomicU8,
    value: UnsafeCell<Option<T>>,
    error: UnsafeCell<Option<Error>>,
    waker: UnsafeCell<Option<Waker>>,
}

// Safety: the `UnsafeCell` fields are only touched while holding one of the
// exclusive lock states (REGISTERING for `waker`, COMPLETING for `value` and
// `error`), or after the state machine has reached a terminal state, which is
// never left again. See the methods below for the per-field arguments.
unsafe impl<T: Send> Sync for Core<T> {}
// Safety: `Core<T>` owns its payload; sending the cell sends the payload.
unsafe impl<T: Send> Send for Core<T> {}

impl<T> Core<T> {
    pub(crate) fn new() -> Core<T> {
        Core {
            state: AtomicU8::new(PENDING),
            value: UnsafeCell::new(None),
            error: UnsafeCell::new(None),
            waker: UnsafeCell::new(None),
        }
    }

    pub(crate) fn status(&self) -> Status {
        Self::status_of(self.state.load(Ordering::Acquire))
    }

    fn status_of(state: u8) -> Status {
        match state {
            SUCCEEDED => Status::Succeeded,
            FAULTED => Status::Faulted,
            CANCELED => Status::Canceled,
            _ => Status::Pending,
        }
    }

    /// Single assignment with an immediate wake. Returns whether this call
    /// decided the cell.
    pub(crate) fn try_set_result(&self, value: T) -> bool {
        finish(self.complete(Ok(value)))
    }

    /// Fails (or cancels, when `error` is [`Error::Canceled`]) the cell.
    pub(crate) fn try_fail(&self, error: Error) -> bool {
        finish(self.complete(Err(error)))
    }

    pub(crate) fn try_set_canceled(&self) -> bool {
        self.try_fail(Error::Canceled)
    }

    /// The deferred-wake completion primitive. `None` means the cell was
    /// already decided; `Some(waker)` means this call won and the caller must
    /// wake the returned waker *after* releasing any lock that serializes
    /// completion against disposal.
    pub(crate) fn complete(&self, outcome: Result<T, Error>) -> Option<Option<Waker>> {
        loop {
            let state = self.state.load(Ordering::Acquire);
            match state {
                SUCCEEDED | FAULTED | CANCELED | COMPLETING => return None,
                REGISTERING => hint::spin_loop(),
                _ => {
                    debug_assert!(state == PENDING || state == WAITING);
                    if self
                        .state
                        .compare_exchange(state, COMPLETING, Ordering::AcqRel, Ordering::Acquire)
                        .is_err()
                    {
                        continue;
                    }
                    let decided = match &outcome {
                        Ok(_) => SUCCEEDED,
                        Err(Error::Canceled) => CANCELED,
                        Err(_) => FAULTED,
                    };
                    // Safety: winning the CAS into COMPLETING grants exclusive
                    // access to the payload cells; registrars spin while we
                    // hold this state.
                    unsafe {
                        match outcome {
                            Ok(value) => *self.value.get() = Some(value),
                            Err(error) => *self.error.get() = Some(error),
                        }
                    }
                    // Safety: as above; the waker is taken before the decided
                    // state is published, so no registrar can be writing it.
                    let waker = unsafe { (*self.waker.get()).take() };
                    self.state.store(decided, Ordering::Release);
                    return Some(waker);
                }
            }
        }
    }

    /// Installs `waker`. If the cell is already decided the waker is woken
    /// synchronously and the decided status returned.
    pub(crate) fn register(&self, waker: &Waker) -> Status {
        loop {
            let state = self.state.load(Ordering::Acquire);
            match state {
                SUCCEEDED | FAULTED | CANCELED => {
                    waker.wake_by_ref();
                    return Self::status_of(state);
                }
                REGISTERING | COMPLETING => hint::spin_loop(),
                _ => {
                    debug_assert!(state == PENDING || state == WAITING);
                    if self
                        .state
                        .compare_exchange(state, REGISTERING, Ordering::AcqRel, Ordering::Acquire)
                        .is_err()
                    {
                        continue;
                    }
                    // Safety: winning the CAS into REGISTERING grants
                    // exclusive access to the waker cell; completers spin
                    // while we hold this state.
                    unsafe {
                        let slot = &mut *self.waker.get();
                        match slot {
                            Some(old) if old.will_wake(waker) => {}
                            slot => *slot = Some(waker.clone()),
                        }
                    }
                    self.state.store(WAITING, Ordering::Release);
                    return Status::Pending;
                }
            }
        }
    }

    /// Moves the decided payload out. The single consumer per generation
    /// calls this exactly once after observing a decided status.
    pub(crate) fn take(&self) -> Result<T, Error> {
        match self.state.load(Ordering::Acquire) {
            // Safety (all three arms): terminal states are never left, and
            // the caller is the unique consumer for this generation, so no
            // other thread touches the payload cells anymore.
            SUCCEEDED => {
                let value = unsafe { (*self.value.get()).take() };
                value.ok_or(Error::InvalidState("result already taken"))
            }
            FAULTED => {
                let error = unsafe { (*self.error.get()).take() };
                Err(error.unwrap_or(Error::InvalidState("missing error")))
            }
            CANCELED => {
                let error = unsafe { (*self.error.get()).take() };
                Err(error.unwrap_or(Error::Canceled))
            }
            _ => Err(Error::InvalidState("task has not completed")),
        }
    }

    /// Clears the cell for reuse. Callers guarantee exclusive access: the
    /// pooled sources retire the generation and reset under the same lock
    /// that serializes their completion path.
    pub(crate) fn reset(&self) {
        // Safety: per the method contract the caller holds exclusive access.
        unsafe {
            *self.value.get() = None;
            *self.error.get() = None;
            *self.waker.get() = None;
        }
        self.state.store(PENDING, Ordering::Release);
    }
}

fn finish(won: Option<Option<Waker>>) -> bool {
    match won {
        Some(waker) => {
            if let Some(waker) = waker {
                waker.wake();
            }
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::task::Wake;

    struct Flag(AtomicUsize);

    impl Wake for Flag {
        fn wake(self: Arc<Self>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
        fn wake_by_ref(self: &Arc<Self>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn single_assignment() {
        let core = Core::new();
        assert!(core.try_set_result(7));
        assert!(!core.try_set_result(8));
        assert!(!core.try_fail(Error::faulted("late")));
        assert!(!core.try_set_canceled());
        assert_eq!(core.status(), Status::Succeeded);
        assert_eq!(core.take(), Ok(7));
    }

    #[test]
    fn register_after_completion_wakes_inline() {
        let core = Core::new();
        core.try_set_result(1);
        let flag = Arc::new(Flag(AtomicUsize::new(0)));
        let waker = Waker::from(flag.clone());
        assert_eq!(core.register(&waker), Status::Succeeded);
        assert_eq!(flag.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn completion_wakes_registered_waker() {
        let core: Core<u8> = Core::new();
        let flag = Arc::new(Flag(AtomicUsize::new(0)));
        let waker = Waker::from(flag.clone());
        assert_eq!(core.register(&waker), Status::Pending);
        assert!(core.try_set_canceled());
        assert_eq!(flag.0.load(Ordering::SeqCst), 1);
        assert_eq!(core.take(), Err(Error::Canceled));
    }
}
