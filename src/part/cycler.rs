//! Two-buffer pipeline-stage state: a committed snapshot plus the stage
//! under construction.
//!
//! The simulation thread mutates the pending stage through a
//! [`CycleWriter`]; the render thread reads the committed stage lock-free.
//! [`Cycler::commit`] publishes the pending stage at the pipeline boundary.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use arc_swap::{ArcSwap, Guard};
use parking_lot::{Mutex, MutexGuard};

/// Guard over a committed snapshot
pub type CycleGuard<T> = Guard<Arc<T>>;

/// Double-buffered state
pub struct Cycler<T> {
    committed: ArcSwap<T>,
    pending: Mutex<T>,
    generation: AtomicU64,
}

impl<T: Clone> Cycler<T> {
    pub fn new(initial: T) -> Self {
        Self {
            committed: ArcSwap::from(Arc::new(initial.clone())),
            pending: Mutex::new(initial),
            generation: AtomicU64::new(0),
        }
    }

    /// Read the committed stage without blocking writers
    pub fn read(&self) -> CycleGuard<T> {
        self.committed.load()
    }

    /// Owned handle on the committed stage
    pub fn read_full(&self) -> Arc<T> {
        self.committed.load_full()
    }

    /// Exclusive access to the stage under construction
    pub fn begin_write(&self) -> CycleWriter<'_, T> {
        CycleWriter {
            guard: self.pending.lock(),
        }
    }

    /// Look at the stage under construction. Waits while a writer holds it.
    pub fn read_pending<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.pending.lock())
    }

    /// Publish the pending stage as the committed one. Returns the new
    /// generation number.
    pub fn commit(&self) -> u64 {
        let snapshot = self.pending.lock().clone();
        self.committed.store(Arc::new(snapshot));
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Number of commits so far
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}

/// Writer handle on the pending stage
pub struct CycleWriter<'a, T> {
    guard: MutexGuard<'a, T>,
}

impl<T> Deref for CycleWriter<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for CycleWriter<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}
