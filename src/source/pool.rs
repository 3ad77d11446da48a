//! A free-list pool of `Arc`-allocated source structs. Delay and predicate
//! wait promises acquire a recycled source here, so steady-state churn does
//! not allocate.

use std::sync::{Arc, Mutex};

use crate::sync::lock;

pub(crate) struct Pool<S> {
    entries: Mutex<Entries<S>>,
}

struct Entries<S> {
    all: Vec<Arc<S>>,
    free: Vec<u32>,
}

impl<S> Pool<S> {
    pub(crate) fn new() -> Pool<S> {
        Pool {
            entries: Mutex::new(Entries {
                all: Vec::new(),
                free: Vec::new(),
            }),
        }
    }

    /// Pops a recycled source, or builds a new one tagged with its pool
    /// index. The caller re-initializes the source before handing out a
    /// token for it.
    pub(crate) fn acquire(&self, create: impl FnOnce(u32) -> S) -> Arc<S> {
        let mut entries = lock(&self.entries);
        if let Some(index) = entries.free.pop() {
            return entries.all[index as usize].clone();
        }
        let index = u32::try_from(entries.all.len()).expect("source pool overflow");
        let source = Arc::new(create(index));
        entries.all.push(source.clone());
        source
    }

    /// Returns a retired source's slot to the free list.
    pub(crate) fn release(&self, index: u32) {
        lock(&self.entries).free.push(index);
    }
}
