//! Task sources: the completion cell, its recycling schemes, and the
//! four-operation dispatch surface every promise kind implements.

use std::sync::atomic::{AtomicU32, Ordering};
use std::task::Waker;

use crate::{Error, Status};

pub use completion::CompletionSource;

pub(crate) mod arena;
mod completion;
pub(crate) mod core;
pub(crate) mod pool;

/// A generation token. Every handle carries one; a source rejects any
/// operation whose token no longer matches its current generation, so a
/// disposed-and-recycled task surfaces as [`Error::TokenMismatch`] instead of
/// touching another task's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token(pub(crate) u32);

/// The operations a [`Task`](crate::Task) handle needs from its source. An
/// `Arc<dyn Source>` plus a [`Token`] is the whole handle: data pointer,
/// dispatch table, generation.
pub trait Source: Send + Sync {
    type Output;

    /// Current status. Fails only on a stale token; never panics.
    fn status(&self, token: Token) -> Result<Status, Error>;

    /// Installs `waker` to be woken when the source completes. If the source
    /// is already decided the waker is woken synchronously before this
    /// returns, and the decided status is returned.
    fn register(&self, waker: &Waker, token: Token) -> Result<Status, Error>;

    /// Moves the result out. Called at most once per generation, only after
    /// the status has left pending.
    fn take_result(&self, token: Token) -> Result<Self::Output, Error>;

    /// Retires this generation and recycles the backing storage. Exactly one
    /// caller per generation wins; later calls with the same token are
    /// no-ops.
    fn dispose(&self, token: Token);
}

/// The generation counter embedded in every source.
#[derive(Debug)]
pub(crate) struct Generation(AtomicU32);

impl Generation {
    pub(crate) fn new() -> Generation {
        Generation(AtomicU32::new(0))
    }

    pub(crate) fn token(&self) -> Token {
        Token(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn check(&self, token: Token) -> Result<(), Error> {
        if self.0.load(Ordering::Acquire) == token.0 {
            Ok(())
        } else {
            Err(Error::TokenMismatch)
        }
    }

    /// Bumps the generation past `token`. Only one caller can win this race;
    /// everyone else observes a stale token from then on.
    pub(crate) fn retire(&self, token: Token) -> bool {
        self.0
            .compare_exchange(
                token.0,
                token.0.wrapping_add(1),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }
}
