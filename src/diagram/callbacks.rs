use std::sync::{Arc, Mutex, MutexGuard};

/// Shared callback invoked with a borrowed event
pub type Callback<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// One-shot queue plus persistent list for one event kind.
///
/// Dispatch swaps the one-shot queue out before invoking anything, so a
/// callback registered while an event is being dispatched runs on the
/// next dispatch, never the current one.
pub struct CallbackQueue<E> {
    once: Mutex<Vec<Callback<E>>>,
    persistent: Mutex<Vec<Callback<E>>>,
}

impl<E> CallbackQueue<E> {
    pub fn new() -> Self {
        Self {
            once: Mutex::new(Vec::new()),
            persistent: Mutex::new(Vec::new()),
        }
    }

    /// Register a callback. The same `Arc` is never registered twice in
    /// the same list; returns false if it already was.
    pub fn register(&self, callback: Callback<E>, once: bool) -> bool {
        let mut list = if once {
            lock(&self.once)
        } else {
            lock(&self.persistent)
        };
        if list.iter().any(|existing| Arc::ptr_eq(existing, &callback)) {
            return false;
        }
        list.push(callback);
        true
    }

    /// Run queued one-shots then persistent callbacks.
    ///
    /// Returns how many callbacks ran.
    pub fn dispatch(&self, event: &E) -> usize {
        let one_time = std::mem::take(&mut *lock(&self.once));
        let persistent = lock(&self.persistent).clone();

        for callback in one_time.iter().chain(persistent.iter()) {
            callback(event);
        }
        one_time.len() + persistent.len()
    }

    pub fn pending_once(&self) -> usize {
        lock(&self.once).len()
    }

    pub fn persistent_count(&self) -> usize {
        lock(&self.persistent).len()
    }
}

impl<E> Default for CallbackQueue<E> {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
