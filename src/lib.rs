//! A low-allocation async task runtime for hosts that drive work with a
//! cooperative per-tick loop. Call sites await a [`Task`]; timers, predicate
//! waits and combinators recycle their backing storage instead of allocating
//! per awaited operation.
#![warn(clippy::pedantic)]
#![warn(clippy::undocumented_unsafe_blocks)]
#![warn(unsafe_op_in_unsafe_fn)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

mod error;

pub mod cancel;
pub mod join;
pub mod source;
pub mod sync;
pub mod task;
pub mod ticker;
pub mod time;
pub mod wait;

pub use cancel::{CancelSource, CancelToken};
pub use error::{Error, Status};
pub use source::{CompletionSource, Source, Token};
pub use task::Task;
pub use ticker::{block_on, TickLoop, Timing};
