//! Per-key write exclusion.

use crate::record::Key;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type LockMap<K> = HashMap<K, Arc<AsyncMutex<()>>>;

/// One async mutex per key, created on demand.
///
/// The store keeps one set keyed by `(id, version)` and another keyed by blob
/// path. Entries are removed again when the last holder or waiter lets go, so
/// the map only ever contains keys with a write in flight.
#[derive(Debug)]
pub(crate) struct KeyLocks<K = Key> {
    inner: Mutex<LockMap<K>>,
}

impl<K> Default for KeyLocks<K> {
    fn default() -> Self {
        Self { inner: Mutex::new(HashMap::new()) }
    }
}

pub(crate) struct KeyGuard<'a, K: Eq + Hash + Clone> {
    locks: &'a KeyLocks<K>,
    key: K,
    guard: Option<OwnedMutexGuard<()>>,
}

impl<K: Eq + Hash + Clone> KeyLocks<K> {
    fn map(&self) -> MutexGuard<'_, LockMap<K>> {
        // The map is never left half-updated, so a poisoned lock is still usable.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) async fn lock(&self, key: &K) -> KeyGuard<'_, K> {
        let mutex = self.map().entry(key.clone()).or_default().clone();
        let guard = mutex.lock_owned().await;
        KeyGuard { locks: self, key: key.clone(), guard: Some(guard) }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.map().len()
    }
}

impl<K: Eq + Hash + Clone> Drop for KeyGuard<'_, K> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut map = self.locks.map();
        if map.get(&self.key).is_some_and(|mutex| Arc::strong_count(mutex) == 1) {
            map.remove(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_key_is_exclusive() {
        let locks = Arc::new(KeyLocks::<Key>::default());
        let key = Key::new("Foo", "1.0.0");
        let first = locks.lock(&key).await;

        let waiter = {
            let locks = Arc::clone(&locks);
            let key = key.clone();
            tokio::spawn(async move {
                let _guard = locks.lock(&key).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());
        drop(first);
        waiter.await.unwrap();
        assert_eq!(locks.len(), 0);
    }

    #[tokio::test]
    async fn test_different_keys_do_not_block() {
        let locks = KeyLocks::<Key>::default();
        let _a = locks.lock(&Key::new("Foo", "1.0.0")).await;
        let _b = locks.lock(&Key::new("Foo", "2.0.0")).await;
        let _c = locks.lock(&Key::new("Bar", "1.0.0")).await;
        assert_eq!(locks.len(), 3);
    }

    #[tokio::test]
    async fn test_entries_are_cleaned_up() {
        let locks = KeyLocks::<String>::default();
        for _ in 0..3 {
            let _guard = locks.lock(&"foo.1.0.0.nupkg".to_string()).await;
        }
        assert_eq!(locks.len(), 0);
    }
}
