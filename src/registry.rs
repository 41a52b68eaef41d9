//! Definition registry
//!
//! A pure data store for [`Definition`]s: registration, id lookup, and
//! polymorphic type matching. No instantiation logic lives here.

use crate::definition::Definition;
use crate::error::{ContainerError, Result};
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::debug;

/// Holds component definitions and answers candidate queries.
///
/// `find_by_type` ordering is stable: primary-marked definitions first, then
/// registration order. Two calls with no intervening registration return the
/// same order.
#[derive(Default)]
pub struct DefinitionRegistry {
    definitions: HashMap<String, Arc<Definition>>,
    /// Registration order; drives eager start and stable candidate ordering
    order: Vec<String>,
}

impl DefinitionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a definition.
    ///
    /// Fails with [`DuplicateDefinition`](ContainerError::DuplicateDefinition)
    /// when the id is taken, unless `overwrite` is set — in which case the
    /// existing definition is replaced in place (keeping its registration
    /// position).
    pub fn register(&mut self, definition: Definition, overwrite: bool) -> Result<()> {
        let id = definition.id.clone();
        if self.definitions.contains_key(&id) {
            if !overwrite {
                return Err(ContainerError::DuplicateDefinition { id });
            }
        } else {
            self.order.push(id.clone());
        }

        #[cfg(feature = "logging")]
        debug!(
            target: "wirework",
            definition = %id,
            component = definition.type_name,
            scope = ?definition.scope,
            lazy = definition.lazy,
            "Registered definition"
        );

        self.definitions.insert(id, Arc::new(definition));
        Ok(())
    }

    /// Look up a definition by id
    #[inline]
    pub fn get(&self, id: &str) -> Option<Arc<Definition>> {
        self.definitions.get(id).cloned()
    }

    /// Whether a definition with this id exists
    #[inline]
    pub fn contains(&self, id: &str) -> bool {
        self.definitions.contains_key(id)
    }

    /// Every definition satisfying the requested type key.
    ///
    /// Ordered primary-first, then registration order; matching is
    /// polymorphic over the definitions' declared bindings.
    pub fn find_by_type(&self, key: TypeId) -> Vec<Arc<Definition>> {
        let mut matches: Vec<Arc<Definition>> = self
            .order
            .iter()
            .filter_map(|id| self.definitions.get(id))
            .filter(|def| def.provides(key))
            .cloned()
            .collect();
        // Stable sort keeps registration order within each group.
        matches.sort_by_key(|def| !def.primary);
        matches
    }

    /// Remove a definition, returning it if present.
    ///
    /// Required for hot-rebind; the container destroys any live instance
    /// before calling this.
    pub fn remove(&mut self, id: &str) -> Option<Arc<Definition>> {
        let removed = self.definitions.remove(id);
        if removed.is_some() {
            self.order.retain(|existing| existing != id);

            #[cfg(feature = "logging")]
            debug!(target: "wirework", definition = %id, "Removed definition");
        }
        removed
    }

    /// Definition ids in registration order
    pub fn definition_ids(&self) -> Vec<String> {
        self.order.clone()
    }

    /// Number of registered definitions
    #[inline]
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// Whether the registry is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

impl std::fmt::Debug for DefinitionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefinitionRegistry")
            .field("definitions", &self.len())
            .finish()
    }
}
