use crate::error::{Result, StackError};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, Weak};

/// A non-owning reference from one layer to a neighbour, filled in once when the stack is
/// assembled. The assembly root owns every layer; handles never keep one alive.
pub(crate) struct Handle<T> {
    layer: &'static str,
    target: OnceLock<Weak<T>>,
}

impl<T> Handle<T> {
    pub fn new(layer: &'static str) -> Self {
        Handle {
            layer,
            target: OnceLock::new(),
        }
    }

    /// First wiring wins; later calls are ignored.
    pub fn set(&self, target: &Arc<T>) {
        let _ = self.target.set(Arc::downgrade(target));
    }

    pub fn get(&self) -> Result<Arc<T>> {
        self.target
            .get()
            .and_then(Weak::upgrade)
            .ok_or(StackError::NotWired(self.layer))
    }
}

/// Locks `mutex`, carrying on with the data if a previous holder panicked. Every critical
/// section in the stack leaves its state consistent before it can panic.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
