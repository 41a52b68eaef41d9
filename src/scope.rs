//! Custom scope plugin API
//!
//! A definition whose scope is `Custom(name)` routes its storage through a
//! registered [`ScopeStore`] instead of the container's own singleton cache.
//! The container supplies the initializer; the store decides identity and
//! lifetime (thread-bound, request-bound, time-boxed — whatever the plugin
//! implements).

use crate::definition::AnyInstance;
use crate::error::Result;
use ahash::RandomState;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Mutex;
use std::thread::ThreadId;

#[cfg(feature = "logging")]
use tracing::trace;

/// Destruction callback registered by the container for a scoped instance
pub type ScopeCallback = Box<dyn FnOnce() + Send>;

/// Pluggable storage for a custom scope.
///
/// The container calls [`get`](Self::get) whenever a definition with this
/// scope is resolved, passing an initializer that runs the full build
/// protocol; the store decides whether to invoke it or return an existing
/// instance.
pub trait ScopeStore: Send + Sync {
    /// Return the instance stored under `name`, building it via
    /// `initializer` if absent
    fn get(
        &self,
        name: &str,
        initializer: &mut dyn FnMut() -> Result<AnyInstance>,
    ) -> Result<AnyInstance>;

    /// Remove and return the instance stored under `name`, if any
    fn remove(&self, name: &str) -> Option<AnyInstance>;

    /// Register a callback to run when the scoped instance is discarded.
    ///
    /// Stores are expected to run the callback from `remove` or from their
    /// own teardown; callbacks are fire-and-forget.
    fn register_destruction_callback(&self, name: &str, callback: ScopeCallback);
}

/// A thread-bound scope: each thread sees its own instance per definition.
///
/// # Examples
///
/// ```rust
/// use wirework::{ThreadScope, ScopeStore};
/// use std::sync::Arc;
///
/// let scope = ThreadScope::new();
/// let first = scope
///     .get("counter", &mut || Ok(Arc::new(41u32) as _))
///     .unwrap();
/// let second = scope
///     .get("counter", &mut || Ok(Arc::new(0u32) as _))
///     .unwrap();
///
/// // Same thread, same instance — the second initializer never ran.
/// assert!(Arc::ptr_eq(&first, &second));
/// ```
pub struct ThreadScope {
    instances: DashMap<(ThreadId, String), AnyInstance, RandomState>,
    callbacks: Mutex<HashMap<(ThreadId, String), Vec<ScopeCallback>>>,
}

impl ThreadScope {
    pub fn new() -> Self {
        Self {
            instances: DashMap::with_hasher(RandomState::new()),
            callbacks: Mutex::new(HashMap::new()),
        }
    }

    fn key(name: &str) -> (ThreadId, String) {
        (std::thread::current().id(), name.to_string())
    }

    /// Discard every instance bound to the calling thread, running their
    /// destruction callbacks.
    pub fn clear_current_thread(&self) {
        let thread = std::thread::current().id();
        self.instances.retain(|(owner, _), _| *owner != thread);

        let drained: Vec<ScopeCallback> = {
            let mut callbacks = self.callbacks.lock().expect("scope callbacks poisoned");
            let keys: Vec<_> = callbacks
                .keys()
                .filter(|(owner, _)| *owner == thread)
                .cloned()
                .collect();
            keys.into_iter()
                .filter_map(|key| callbacks.remove(&key))
                .flatten()
                .collect()
        };
        for callback in drained {
            callback();
        }
    }
}

impl Default for ThreadScope {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeStore for ThreadScope {
    fn get(
        &self,
        name: &str,
        initializer: &mut dyn FnMut() -> Result<AnyInstance>,
    ) -> Result<AnyInstance> {
        let key = Self::key(name);
        if let Some(existing) = self.instances.get(&key) {
            return Ok(existing.clone());
        }
        // Build outside the map entry so re-entrant resolution of other
        // scoped definitions cannot deadlock on the same shard.
        let built = initializer()?;

        #[cfg(feature = "logging")]
        trace!(
            target: "wirework",
            definition = %name,
            "Bound instance to current thread"
        );

        self.instances.insert(key, built.clone());
        Ok(built)
    }

    fn remove(&self, name: &str) -> Option<AnyInstance> {
        let key = Self::key(name);
        let removed = self.instances.remove(&key).map(|(_, instance)| instance);
        if removed.is_some() {
            let callbacks = self
                .callbacks
                .lock()
                .expect("scope callbacks poisoned")
                .remove(&key);
            for callback in callbacks.into_iter().flatten() {
                callback();
            }
        }
        removed
    }

    fn register_destruction_callback(&self, name: &str, callback: ScopeCallback) {
        self.callbacks
            .lock()
            .expect("scope callbacks poisoned")
            .entry(Self::key(name))
            .or_default()
            .push(callback);
    }
}

impl std::fmt::Debug for ThreadScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadScope")
            .field("instances", &self.instances.len())
            .finish()
    }
}
