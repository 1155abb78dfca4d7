//! Per-client state storage.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

/// Concurrent map from client key to independently locked state.
///
/// The map only guards key existence. Each value carries its own mutex, and
/// the map's shard lock is released before that mutex is taken, so callers
/// for different clients never wait on each other.
pub(crate) struct ClientStore<T> {
    entries: DashMap<String, Arc<Mutex<T>>>,
}

impl<T> ClientStore<T> {
    pub(crate) fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Fetch the state for `key`, creating it with `init` on first sight.
    ///
    /// When two callers race on an unseen key, the first insert wins and both
    /// receive the same state handle; the loser's `init` is never run.
    pub(crate) fn get_or_insert_with<F>(&self, key: &str, init: F) -> Arc<Mutex<T>>
    where
        F: FnOnce() -> T,
    {
        if let Some(existing) = self.entries.get(key) {
            return Arc::clone(existing.value());
        }

        let entry = self
            .entries
            .entry(key.to_owned())
            .or_insert_with(|| Arc::new(Mutex::new(init())));
        Arc::clone(entry.value())
    }

    /// Read a client's state without creating it.
    pub(crate) fn inspect<R, F>(&self, key: &str, f: F) -> Option<R>
    where
        F: FnOnce(&T) -> R,
    {
        let state = self.entries.get(key).map(|entry| Arc::clone(entry.value()))?;
        let guard = state.lock();
        Some(f(&guard))
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;

    #[test]
    fn test_insert_once_and_reuse() {
        let store: ClientStore<u32> = ClientStore::new();

        let first = store.get_or_insert_with("a", || 1);
        let second = store.get_or_insert_with("a", || 99);

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(*second.lock(), 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_inspect_does_not_create() {
        let store: ClientStore<u32> = ClientStore::new();

        assert_eq!(store.inspect("missing", |v| *v), None);
        assert_eq!(store.len(), 0);

        store.get_or_insert_with("present", || 3);
        assert_eq!(store.inspect("present", |v| *v), Some(3));
    }

    #[test]
    fn test_racing_first_insert_converges() {
        let store: ClientStore<u32> = ClientStore::new();
        let inits = AtomicUsize::new(0);
        let threads = 8;
        let barrier = Barrier::new(threads);

        let handles: Vec<Arc<Mutex<u32>>> = std::thread::scope(|s| {
            let workers: Vec<_> = (0..threads)
                .map(|_| {
                    s.spawn(|| {
                        barrier.wait();
                        store.get_or_insert_with("shared", || {
                            inits.fetch_add(1, Ordering::SeqCst);
                            0
                        })
                    })
                })
                .collect();
            workers.into_iter().map(|w| w.join().unwrap()).collect()
        });

        assert_eq!(inits.load(Ordering::SeqCst), 1);
        assert!(handles.iter().all(|h| Arc::ptr_eq(h, &handles[0])));
        assert_eq!(store.len(), 1);
    }
}
