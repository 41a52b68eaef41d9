//! Singleton instance store
//!
//! Per-scope storage for built instances, mirroring the classic three-level
//! singleton cache: fully initialized instances, early references already
//! handed out to cycle peers, and early-reference factories published right
//! after raw instantiation. Also owns the per-definition creation locks, the
//! thread-local resolution stack used for cycle detection, and the ordered
//! destruction list drained by `close()`.

#![allow(dead_code)]

use crate::definition::{AnyInstance, LifecycleCallback};
use crate::error::{DestructionFailure, Result};
use ahash::RandomState;
use dashmap::DashMap;
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[cfg(feature = "logging")]
use tracing::{debug, trace, warn};

/// Lifecycle state of one in-flight or completed construction.
///
/// Transitions are forward-only: NotStarted → UnderConstruction →
/// FullyInitialized → Destroyed. A failed construction forces the record to
/// Destroyed so a later retry starts fresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    NotStarted,
    UnderConstruction,
    FullyInitialized,
    Destroyed,
}

/// Tracks one construction: raw and exposed instances plus lifecycle state
pub(crate) struct InstanceRecord {
    pub state: InstanceState,
    /// Post-populate, pre-proxy instance
    pub raw: Option<AnyInstance>,
    /// What callers receive; equals `raw` or a proxy
    pub exposed: Option<AnyInstance>,
}

type EarlyFactory = Box<dyn FnOnce() -> Result<AnyInstance> + Send>;

/// A registered destroy callback, held with the raw instance it applies to
struct Disposable {
    definition_id: String,
    instance: AnyInstance,
    callback: LifecycleCallback,
}

thread_local! {
    /// Definition ids currently being resolved on this thread, outermost
    /// first. Cycle detection is per-thread: an id already on the stack means
    /// the current construction looped back into itself.
    static RESOLUTION_STACK: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
}

/// RAII frame on the thread-local resolution stack
pub(crate) struct ResolutionFrame;

impl ResolutionFrame {
    pub(crate) fn push(id: &str) -> Self {
        RESOLUTION_STACK.with(|stack| stack.borrow_mut().push(id.to_string()));
        Self
    }

    /// Whether `id` is already being resolved on this thread
    pub(crate) fn on_stack(id: &str) -> bool {
        RESOLUTION_STACK.with(|stack| stack.borrow().iter().any(|entry| entry == id))
    }

    /// The cycle path ending at `id`: stack from the first occurrence of
    /// `id`, plus `id` again to close the loop
    pub(crate) fn cycle_path(id: &str) -> Vec<String> {
        RESOLUTION_STACK.with(|stack| {
            let stack = stack.borrow();
            let start = stack.iter().position(|entry| entry == id).unwrap_or(0);
            let mut path: Vec<String> = stack[start..].to_vec();
            path.push(id.to_string());
            path
        })
    }
}

impl Drop for ResolutionFrame {
    fn drop(&mut self) {
        RESOLUTION_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

/// Thread-safe store for singleton records.
///
/// Concurrent maps use `DashMap` with `ahash`; the early-factory table and
/// the ordered destruction list sit behind plain mutexes since both are
/// touched only inside a creation lock or during teardown.
pub(crate) struct SingletonStore {
    records: DashMap<String, InstanceRecord, RandomState>,
    /// Early references already handed out to cycle peers
    early_refs: DashMap<String, AnyInstance, RandomState>,
    /// Early-reference factories published after raw instantiation
    early_factories: Mutex<HashMap<String, EarlyFactory>>,
    /// Per-definition creation locks; held for the whole build protocol so
    /// racing resolvers of the same definition block instead of double-building
    creation_locks: DashMap<String, Arc<Mutex<()>>, RandomState>,
    /// Destroy callbacks in construction order
    disposables: Mutex<Vec<Disposable>>,
}

impl SingletonStore {
    pub(crate) fn new() -> Self {
        Self {
            // 8 shards: container singleton sets are small, creation speed wins
            records: DashMap::with_capacity_and_hasher_and_shard_amount(
                0,
                RandomState::new(),
                8,
            ),
            early_refs: DashMap::with_capacity_and_hasher_and_shard_amount(
                0,
                RandomState::new(),
                8,
            ),
            early_factories: Mutex::new(HashMap::new()),
            creation_locks: DashMap::with_capacity_and_hasher_and_shard_amount(
                0,
                RandomState::new(),
                8,
            ),
            disposables: Mutex::new(Vec::new()),
        }
    }

    /// Fully initialized instance, if present
    #[inline]
    pub(crate) fn get_singleton(&self, id: &str) -> Option<AnyInstance> {
        self.records.get(id).and_then(|record| {
            (record.state == InstanceState::FullyInitialized)
                .then(|| record.exposed.clone())
                .flatten()
        })
    }

    /// Current lifecycle state of a definition's record
    pub(crate) fn state(&self, id: &str) -> Option<InstanceState> {
        self.records.get(id).map(|record| record.state)
    }

    /// The creation lock for one definition id.
    ///
    /// The `Arc` is cloned out so the dashmap shard guard is released before
    /// the caller blocks on the mutex.
    pub(crate) fn creation_lock(&self, id: &str) -> Arc<Mutex<()>> {
        self.creation_locks
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Transition a record to UnderConstruction before the constructor runs.
    /// A retry after a failed construction replaces the destroyed record.
    pub(crate) fn begin_creation(&self, id: &str) {
        self.records.insert(
            id.to_string(),
            InstanceRecord {
                state: InstanceState::UnderConstruction,
                raw: None,
                exposed: None,
            },
        );

        #[cfg(feature = "logging")]
        trace!(target: "wirework", definition = %id, "Instance under construction");
    }

    /// Record the raw instance immediately after instantiation
    pub(crate) fn set_raw(&self, id: &str, raw: AnyInstance) {
        if let Some(mut record) = self.records.get_mut(id) {
            record.raw = Some(raw);
        }
    }

    /// Publish the early-reference factory for an in-flight singleton
    pub(crate) fn publish_early_factory(&self, id: &str, factory: EarlyFactory) {
        self.early_factories
            .lock()
            .expect("early factory table poisoned")
            .insert(id.to_string(), factory);
    }

    /// Best-available reference to a not-yet-fully-built singleton.
    ///
    /// Consumes the early factory on first use and caches its product, so
    /// every cycle peer sees the same early reference.
    pub(crate) fn early_reference(&self, id: &str) -> Result<Option<AnyInstance>> {
        if let Some(early) = self.early_refs.get(id) {
            return Ok(Some(early.clone()));
        }
        let factory = self
            .early_factories
            .lock()
            .expect("early factory table poisoned")
            .remove(id);
        match factory {
            Some(factory) => {
                let early = factory()?;
                self.early_refs.insert(id.to_string(), early.clone());

                #[cfg(feature = "logging")]
                debug!(
                    target: "wirework",
                    definition = %id,
                    "Handed out early reference to break a dependency cycle"
                );

                Ok(Some(early))
            }
            None => Ok(None),
        }
    }

    /// The early reference already handed out for `id`, if any.
    ///
    /// Used at the end of the build protocol: if a peer took an early
    /// reference, that reference is the exposed instance.
    pub(crate) fn handed_out_early_reference(&self, id: &str) -> Option<AnyInstance> {
        self.early_refs.get(id).map(|early| early.clone())
    }

    /// Complete a singleton construction: store the exposed instance, clear
    /// the early entries, and register the destroy callback if declared.
    pub(crate) fn complete_singleton(
        &self,
        id: &str,
        raw: AnyInstance,
        exposed: AnyInstance,
        destroy: Option<LifecycleCallback>,
    ) {
        self.records.insert(
            id.to_string(),
            InstanceRecord {
                state: InstanceState::FullyInitialized,
                raw: Some(raw.clone()),
                exposed: Some(exposed),
            },
        );
        self.early_refs.remove(id);
        self.early_factories
            .lock()
            .expect("early factory table poisoned")
            .remove(id);
        if let Some(callback) = destroy {
            self.disposables
                .lock()
                .expect("disposables poisoned")
                .push(Disposable {
                    definition_id: id.to_string(),
                    instance: raw,
                    callback,
                });
        }

        #[cfg(feature = "logging")]
        trace!(target: "wirework", definition = %id, "Instance fully initialized");
    }

    /// Evict a failed or removed record so a later resolution rebuilds fresh.
    ///
    /// The record's state is forced to Destroyed — a failed build must never
    /// leave a half-initialized singleton reachable.
    pub(crate) fn evict(&self, id: &str) {
        if let Some(mut record) = self.records.get_mut(id) {
            record.state = InstanceState::Destroyed;
            record.exposed = None;
        }
        self.early_refs.remove(id);
        self.early_factories
            .lock()
            .expect("early factory table poisoned")
            .remove(id);
        self.disposables
            .lock()
            .expect("disposables poisoned")
            .retain(|disposable| disposable.definition_id != id);

        #[cfg(feature = "logging")]
        debug!(target: "wirework", definition = %id, "Evicted instance record");
    }

    /// Run the destroy callback for one definition (hot-rebind path)
    pub(crate) fn destroy_one(&self, id: &str) -> Option<DestructionFailure> {
        let disposable = {
            let mut disposables = self.disposables.lock().expect("disposables poisoned");
            let index = disposables
                .iter()
                .position(|disposable| disposable.definition_id == id)?;
            disposables.remove(index)
        };
        self.run_disposable(disposable)
    }

    /// Destroy every fully initialized singleton in strict reverse
    /// construction order, collecting failures instead of aborting.
    pub(crate) fn destroy_all(&self) -> Vec<DestructionFailure> {
        let disposables: Vec<Disposable> = {
            let mut guard = self.disposables.lock().expect("disposables poisoned");
            guard.drain(..).collect()
        };

        let mut failures = Vec::new();
        for disposable in disposables.into_iter().rev() {
            if let Some(failure) = self.run_disposable(disposable) {
                failures.push(failure);
            }
        }

        // Every record transitions to Destroyed, with or without a callback.
        for mut record in self.records.iter_mut() {
            record.state = InstanceState::Destroyed;
            record.exposed = None;
            record.raw = None;
        }
        self.early_refs.clear();
        self.early_factories
            .lock()
            .expect("early factory table poisoned")
            .clear();

        failures
    }

    fn run_disposable(&self, disposable: Disposable) -> Option<DestructionFailure> {
        let id = disposable.definition_id;
        if let Some(mut record) = self.records.get_mut(&id) {
            record.state = InstanceState::Destroyed;
            record.exposed = None;
        }

        #[cfg(feature = "logging")]
        trace!(
            target: "wirework",
            definition = %id,
            callback = disposable.callback.name,
            "Running destroy callback"
        );

        match disposable.callback.invoke(&disposable.instance) {
            Ok(()) => None,
            Err(source) => {
                #[cfg(feature = "logging")]
                warn!(
                    target: "wirework",
                    definition = %id,
                    error = %source,
                    "Destroy callback failed; continuing teardown"
                );

                Some(DestructionFailure {
                    definition_id: id,
                    source,
                })
            }
        }
    }
}

impl std::fmt::Debug for SingletonStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingletonStore")
            .field("records", &self.records.len())
            .field("early_refs", &self.early_refs.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct Session {
        token: String,
    }

    fn erased(token: &str) -> AnyInstance {
        Arc::new(Session {
            token: token.into(),
        })
    }

    #[test]
    fn records_track_state_forward() {
        let store = SingletonStore::new();
        assert_eq!(store.state("session"), None);

        store.begin_creation("session");
        assert_eq!(store.state("session"), Some(InstanceState::UnderConstruction));
        assert!(store.get_singleton("session").is_none());

        let instance = erased("abc");
        store.complete_singleton("session", instance.clone(), instance.clone(), None);
        assert_eq!(store.state("session"), Some(InstanceState::FullyInitialized));
        assert!(Arc::ptr_eq(
            &store.get_singleton("session").unwrap(),
            &instance
        ));
    }

    #[test]
    fn early_factory_consumed_once() {
        let store = SingletonStore::new();
        store.begin_creation("session");

        let instance = erased("early");
        let for_factory = instance.clone();
        store.publish_early_factory("session", Box::new(move || Ok(for_factory)));

        let first = store.early_reference("session").unwrap().unwrap();
        let second = store.early_reference("session").unwrap().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(Arc::ptr_eq(&first, &instance));
        assert!(store.handed_out_early_reference("session").is_some());
    }

    #[test]
    fn no_early_reference_without_factory() {
        let store = SingletonStore::new();
        assert!(store.early_reference("missing").unwrap().is_none());
    }

    #[test]
    fn evict_forces_destroyed_state() {
        let store = SingletonStore::new();
        store.begin_creation("session");
        store.evict("session");
        assert_eq!(store.state("session"), Some(InstanceState::Destroyed));

        // Retry replaces the destroyed record.
        store.begin_creation("session");
        assert_eq!(store.state("session"), Some(InstanceState::UnderConstruction));
    }

    #[test]
    fn resolution_stack_tracks_cycles() {
        assert!(!ResolutionFrame::on_stack("a"));
        {
            let _a = ResolutionFrame::push("a");
            let _b = ResolutionFrame::push("b");
            assert!(ResolutionFrame::on_stack("a"));
            assert_eq!(
                ResolutionFrame::cycle_path("a"),
                vec!["a".to_string(), "b".to_string(), "a".to_string()]
            );
        }
        assert!(!ResolutionFrame::on_stack("a"));
    }

    #[test]
    fn destroy_all_runs_in_reverse_order_past_failures() {
        let store = SingletonStore::new();
        let log: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

        for (id, fail) in [("first", false), ("second", true), ("third", false)] {
            store.begin_creation(id);
            let instance = erased(id);
            let log = Arc::clone(&log);
            let callback = LifecycleCallback {
                name: "shutdown",
                call: Arc::new(move |instance| {
                    let session = instance.downcast_ref::<Session>().unwrap();
                    log.lock().unwrap().push(session.token.clone());
                    if fail {
                        Err("flaky teardown".into())
                    } else {
                        Ok(())
                    }
                }),
            };
            store.complete_singleton(id, instance.clone(), instance, Some(callback));
        }

        let failures = store.destroy_all();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].definition_id, "second");
        assert_eq!(
            *log.lock().unwrap(),
            vec!["third".to_string(), "second".to_string(), "first".to_string()]
        );
        assert_eq!(store.state("first"), Some(InstanceState::Destroyed));
    }
}
