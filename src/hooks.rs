//! Extension hooks
//!
//! Two independently ordered chains of pluggable extensions: definition-time
//! hooks rewrite the registry before any instantiation; instance-time hooks
//! observe or wrap every instance as it is built. Ordering is by explicit
//! priority (lower runs first) with a stable tie-break on registration order.

use crate::definition::{AnyInstance, Definition};
use crate::error::Result;
use crate::registry::DefinitionRegistry;
use std::sync::Arc;

/// Runs once, before any instantiation, against the definition registry.
///
/// Typical use: expanding a higher-level declarative construct into concrete
/// definitions, or retagging scopes/laziness wholesale.
pub trait DefinitionHook: Send + Sync {
    /// Lower runs first; ties break by registration order
    fn priority(&self) -> i32 {
        0
    }

    /// Add, mutate, or remove definitions before the build phase starts
    fn process(&self, registry: &mut DefinitionRegistry) -> Result<()>;
}

/// Runs per instance record at the two initialization seams.
///
/// Hooks may return a different object than they were given; the proxy
/// engine is plugged in as the last after-init hook.
pub trait InstanceHook: Send + Sync {
    /// Lower runs first; ties break by registration order
    fn priority(&self) -> i32 {
        0
    }

    /// Before the definition's own init callback. Returning
    /// `Some(replacement)` skips the remaining before-init hooks *and* the
    /// init callback; the build proceeds straight to after-init hooks with
    /// the replacement.
    fn before_init(
        &self,
        _definition: &Definition,
        _instance: &AnyInstance,
    ) -> Result<Option<AnyInstance>> {
        Ok(None)
    }

    /// After the init callback; may substitute a wrapper for the instance
    fn after_init(&self, _definition: &Definition, instance: AnyInstance) -> Result<AnyInstance> {
        Ok(instance)
    }

    /// Invoked by the early-reference factory when a cycle peer needs a
    /// handle to this not-yet-initialized instance. Must make the same
    /// substitution decision as `after_init` so the early and final
    /// references are identical.
    fn early_reference(
        &self,
        _definition: &Definition,
        instance: AnyInstance,
    ) -> Result<AnyInstance> {
        Ok(instance)
    }
}

/// A priority-ordered hook list with stable registration tie-break
pub(crate) struct HookChain<H: ?Sized> {
    entries: Vec<Entry<H>>,
    next_seq: u64,
}

struct Entry<H: ?Sized> {
    priority: i32,
    seq: u64,
    hook: Arc<H>,
}

impl<H: ?Sized> HookChain<H> {
    pub(crate) fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_seq: 0,
        }
    }

    pub(crate) fn push(&mut self, priority: i32, hook: Arc<H>) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.push(Entry {
            priority,
            seq,
            hook,
        });
        self.entries
            .sort_by_key(|entry| (entry.priority, entry.seq));
    }

    /// Hooks in execution order
    pub(crate) fn ordered(&self) -> Vec<Arc<H>> {
        self.entries
            .iter()
            .map(|entry| Arc::clone(&entry.hook))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Tagger {
        tag: &'static str,
        priority: i32,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl DefinitionHook for Tagger {
        fn priority(&self) -> i32 {
            self.priority
        }

        fn process(&self, _registry: &mut DefinitionRegistry) -> Result<()> {
            self.log.lock().unwrap().push(self.tag);
            Ok(())
        }
    }

    #[test]
    fn chain_orders_by_priority_then_registration() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut chain: HookChain<dyn DefinitionHook> = HookChain::new();

        for (tag, priority) in [("late", 10), ("first-early", 0), ("second-early", 0)] {
            chain.push(
                priority,
                Arc::new(Tagger {
                    tag,
                    priority,
                    log: Arc::clone(&log),
                }),
            );
        }

        let mut registry = DefinitionRegistry::new();
        for hook in chain.ordered() {
            hook.process(&mut registry).unwrap();
        }

        assert_eq!(
            *log.lock().unwrap(),
            vec!["first-early", "second-early", "late"]
        );
    }

    #[test]
    fn instance_hook_defaults_are_identity() {
        struct Noop;
        impl InstanceHook for Noop {}

        let def = Definition::builder::<u32>("answer")
            .constructor(|_| Ok(42u32))
            .build();
        let instance: AnyInstance = Arc::new(42u32);

        let hook = Noop;
        assert!(hook.before_init(&def, &instance).unwrap().is_none());
        let out = hook.after_init(&def, Arc::clone(&instance)).unwrap();
        assert!(Arc::ptr_eq(&out, &instance));
        let early = hook.early_reference(&def, Arc::clone(&instance)).unwrap();
        assert!(Arc::ptr_eq(&early, &instance));
    }
}
