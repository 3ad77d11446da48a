//! The slot arena: pooled fixed-shape records for zero-payload leaves
//! (yield-once, never, wait-for-signal).
//!
//! Records live in one global [`Slab`]; a handle is a small index plus the
//! slot's generation. The free list and the generation bumps share a single
//! mutex because acquiring and releasing handles can race with unrelated
//! disposals sharing the pool. Wakes always happen after that mutex is
//! released.

use std::sync::Mutex;
use std::task::Waker;

use once_cell::sync::Lazy;
use slab::Slab;

use crate::cancel::Registration;
use crate::source::Token;
use crate::sync::lock;
use crate::{Error, Status};

/// Addresses one arena record for one generation.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SlotKey {
    index: usize,
    token: Token,
}

struct Record {
    status: Status,
    error: Option<Error>,
    waker: Option<Waker>,
    registration: Option<Registration>,
}

impl Record {
    fn new() -> Record {
        Record {
            status: Status::Pending,
            error: None,
            waker: None,
            registration: None,
        }
    }
}

struct Arena {
    slots: Slab<Record>,
    /// Generation per slot index, preserved across slab reuse so a stale key
    /// can never address a recycled record.
    generations: Vec<u32>,
}

static ARENA: Lazy<Mutex<Arena>> = Lazy::new(|| {
    Mutex::new(Arena {
        slots: Slab::new(),
        generations: Vec::new(),
    })
});

impl Arena {
    fn record(&mut self, key: SlotKey) -> Result<&mut Record, Error> {
        if self.generations.get(key.index).copied() != Some(key.token.0) {
            return Err(Error::TokenMismatch);
        }
        self.slots
            .get_mut(key.index)
            .ok_or(Error::InvalidState("arena slot vacated under a live token"))
    }
}

/// Hands out a fresh pending record.
pub(crate) fn acquire() -> SlotKey {
    let mut guard = lock(&ARENA);
    let arena = &mut *guard;
    let entry = arena.slots.vacant_entry();
    let index = entry.key();
    entry.insert(Record::new());
    if arena.generations.len() <= index {
        arena.generations.resize(index + 1, 0);
    }
    log::trace!("arena slot {index} acquired");
    SlotKey {
        index,
        token: Token(arena.generations[index]),
    }
}

/// Attaches the cancellation registration that may later complete this
/// record; it is revoked when the record is disposed.
pub(crate) fn set_registration(key: SlotKey, registration: Registration) {
    let stale = {
        let mut arena = lock(&ARENA);
        match arena.record(key) {
            Ok(record) => {
                record.registration = Some(registration);
                None
            }
            Err(_) => Some(registration),
        }
    };
    // a stale registration is revoked outside the arena lock
    drop(stale);
}

/// Single assignment. Returns whether this call decided the record.
pub(crate) fn complete(key: SlotKey, outcome: Result<(), Error>) -> bool {
    let waker = {
        let mut arena = lock(&ARENA);
        let Ok(record) = arena.record(key) else {
            return false;
        };
        if record.status != Status::Pending {
            return false;
        }
        record.status = match &outcome {
            Ok(()) => Status::Succeeded,
            Err(Error::Canceled) => Status::Canceled,
            Err(_) => Status::Faulted,
        };
        if let Err(error) = outcome {
            record.error = Some(error);
        }
        record.waker.take()
    };
    if let Some(waker) = waker {
        waker.wake();
    }
    true
}

pub(crate) fn status(key: SlotKey) -> Result<Status, Error> {
    let mut arena = lock(&ARENA);
    arena.record(key).map(|record| record.status)
}

/// Installs `waker`; wakes it synchronously when the record is already
/// decided.
pub(crate) fn register(key: SlotKey, waker: &Waker) -> Result<Status, Error> {
    let status = {
        let mut arena = lock(&ARENA);
        let record = arena.record(key)?;
        if record.status == Status::Pending {
            match &record.waker {
                Some(old) if old.will_wake(waker) => {}
                _ => record.waker = Some(waker.clone()),
            }
            return Ok(Status::Pending);
        }
        record.status
    };
    waker.wake_by_ref();
    Ok(status)
}

/// Reads the decided outcome. The record stays allocated until `dispose`.
pub(crate) fn take(key: SlotKey) -> Result<(), Error> {
    let mut arena = lock(&ARENA);
    let record = arena.record(key)?;
    match record.status {
        Status::Pending => Err(Error::InvalidState("task has not completed")),
        Status::Succeeded => Ok(()),
        Status::Canceled => Err(record.error.take().unwrap_or(Error::Canceled)),
        Status::Faulted => Err(record
            .error
            .take()
            .unwrap_or(Error::InvalidState("missing error"))),
    }
}

/// Retires the generation and frees the slot. Exactly one caller per
/// generation wins.
pub(crate) fn dispose(key: SlotKey) -> bool {
    let removed = {
        let mut guard = lock(&ARENA);
        let arena = &mut *guard;
        if arena.generations.get(key.index).copied() != Some(key.token.0) {
            return false;
        }
        arena.generations[key.index] = key.token.0.wrapping_add(1);
        arena.slots.try_remove(key.index)
    };
    // the record (and its cancellation registration) drops outside the lock
    drop(removed);
    log::trace!("arena slot {} disposed", key.index);
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_key_is_rejected_after_reuse() {
        let old = acquire();
        assert!(complete(old, Ok(())));
        assert!(dispose(old));

        // reacquire until the freed index comes back around (other tests
        // share the arena), so the stale key aims at a recycled record
        let mut grabbed = Vec::new();
        let new = loop {
            let key = acquire();
            if key.index == old.index {
                break key;
            }
            grabbed.push(key);
            assert!(grabbed.len() < 256, "slot was never recycled");
        };
        assert_eq!(status(old), Err(Error::TokenMismatch));
        assert_eq!(take(old), Err(Error::TokenMismatch));
        assert!(!complete(old, Ok(())));
        assert!(!dispose(old));
        assert_eq!(status(new), Ok(Status::Pending));
        assert!(dispose(new));
        for key in grabbed {
            dispose(key);
        }
    }

    #[test]
    fn double_completion_is_dropped() {
        let key = acquire();
        assert!(complete(key, Ok(())));
        assert!(!complete(key, Err(Error::faulted("late"))));
        assert_eq!(take(key), Ok(()));
        assert!(dispose(key));
    }
}
