//! # Credential Cache
//!
//! Bounded least-recently-used cache of live auth providers.
//!
//! Keys bind an identity to the full audience context it was requested for, so
//! two resources using the same identity against different hosts or token
//! secrets never share a provider. A capacity of 0 turns the cache off: every
//! `get` misses and every `put` is dropped.

use std::fmt;
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard, PoisonError};

use lru::LruCache;

/// Cache key: the identity plus its comma-joined audiences
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub identity: String,
    pub audiences: String,
}

impl CacheKey {
    pub fn new(identity: impl Into<String>, audiences: &[String]) -> Self {
        Self {
            identity: identity.into(),
            audiences: audiences.join(","),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.identity, self.audiences)
    }
}

/// Called once for every entry that leaves the cache by overflow or `remove`
pub type EvictionHook<T> = Box<dyn Fn(&CacheKey, &T) + Send + Sync>;

pub struct CredentialCache<T> {
    capacity: usize,
    /// `None` when the capacity is 0
    entries: Option<Mutex<LruCache<CacheKey, T>>>,
    on_evict: Option<EvictionHook<T>>,
}

impl<T: Clone> CredentialCache<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: NonZeroUsize::new(capacity).map(|cap| Mutex::new(LruCache::new(cap))),
            on_evict: None,
        }
    }

    pub fn with_eviction_hook(
        capacity: usize,
        hook: impl Fn(&CacheKey, &T) + Send + Sync + 'static,
    ) -> Self {
        Self {
            on_evict: Some(Box::new(hook)),
            ..Self::new(capacity)
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Look up `key`, marking it most recently used on a hit
    pub fn get(&self, key: &CacheKey) -> Option<T> {
        self.lock()?.get(key).cloned()
    }

    /// Insert or replace `key`, evicting the least recently used entry on overflow
    pub fn put(&self, key: CacheKey, value: T) {
        let Some(mut entries) = self.lock() else {
            return;
        };

        // `push` hands back the previous value of a replaced key too; only a
        // different key is an eviction.
        let evicted = entries
            .push(key.clone(), value)
            .filter(|(evicted_key, _)| *evicted_key != key);
        drop(entries);

        // Hooks run outside the lock so they may touch the cache themselves.
        if let Some((key, value)) = evicted {
            self.notify(&key, &value);
        }
    }

    /// Drop `key` so the next lookup builds a fresh provider
    pub fn remove(&self, key: &CacheKey) -> Option<T> {
        let removed = self.lock()?.pop(key);
        if let Some(value) = &removed {
            self.notify(key, value);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.lock().map_or(0, |entries| entries.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn notify(&self, key: &CacheKey, value: &T) {
        if let Some(hook) = &self.on_evict {
            hook(key, value);
        }
    }

    fn lock(&self) -> Option<MutexGuard<'_, LruCache<CacheKey, T>>> {
        // Every operation leaves the LRU consistent, so a poisoned lock is still usable.
        self.entries
            .as_ref()
            .map(|entries| entries.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl<T> fmt::Debug for CredentialCache<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialCache")
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}
