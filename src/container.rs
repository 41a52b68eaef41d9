//! Container façade and build protocol
//!
//! [`Container`] is the externally visible entry point: register definitions
//! and extensions, trigger the eager build phase, resolve instances by type
//! or id, and tear everything down in reverse construction order.
//!
//! The build protocol for a single definition (the heart of the crate):
//!
//! 1. cached-singleton fast path
//! 2. record `UnderConstruction` *before* the constructor runs
//! 3. instantiate raw (constructor dependencies resolved first), then
//!    publish the early-reference factory
//! 4. populate setter dependencies — recursion that loops back into a
//!    definition already on this thread's stack resolves through the early
//!    reference instead of recursing again
//! 5. before-init hooks → init callback → after-init hooks (where the proxy
//!    engine substitutes an interface proxy)
//! 6. transition to `FullyInitialized`, cache, register destruction
//!
//! Constructor-injected cycles have no early reference to fall back on and
//! fail with the full cycle path; so does any cycle through a Prototype.

use crate::definition::{
    AnyInstance, ConstructionStrategy, Definition, DependencyKey, InjectionSite, Multiplicity,
    Role, Scope,
};
use crate::error::{ContainerError, Result};
use crate::event::{EventBus, LifecycleEvent, LifecycleListener};
use crate::hooks::{DefinitionHook, HookChain, InstanceHook};
use crate::proxy::{Advisor, ProxyEngine, ProxyHook};
use crate::registry::DefinitionRegistry;
use crate::resolver::{ProviderHandle, Resolved, ResolvedDeps};
use crate::scope::ScopeStore;
use crate::store::{InstanceState, ResolutionFrame, SingletonStore};
use ahash::RandomState;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

#[cfg(feature = "logging")]
use tracing::{debug, trace};

pub(crate) struct ContainerInner {
    registry: RwLock<DefinitionRegistry>,
    store: SingletonStore,
    definition_hooks: Mutex<HookChain<dyn DefinitionHook>>,
    instance_hooks: RwLock<HookChain<dyn InstanceHook>>,
    proxy_engine: Arc<ProxyEngine>,
    scopes: DashMap<String, Arc<dyn ScopeStore>, RandomState>,
    events: EventBus,
    started: AtomicBool,
    closed: AtomicBool,
}

/// A raw instance and what callers actually receive (equal unless proxied)
struct Built {
    raw: AnyInstance,
    exposed: AnyInstance,
}

/// The inversion-of-control container.
///
/// Cheap to clone — clones share the same registry, caches, and hooks.
/// `resolve` is safe to call from any thread once [`start`](Self::start) has
/// run; two threads racing to build the same singleton serialize on a
/// per-definition creation lock and observe one shared instance.
///
/// # Examples
///
/// ```rust
/// use wirework::{Container, Definition};
///
/// struct Config {
///     name: String,
/// }
///
/// struct Service {
///     config: std::sync::Arc<Config>,
/// }
///
/// let container = Container::new();
/// container
///     .register_definition(
///         Definition::builder::<Config>("config")
///             .constructor(|_| Ok(Config { name: "app".into() }))
///             .build(),
///     )
///     .unwrap();
/// container
///     .register_definition(
///         Definition::builder::<Service>("service")
///             .depends_on::<Config>()
///             .constructor(|deps| Ok(Service { config: deps.take::<Config>(0)? }))
///             .build(),
///     )
///     .unwrap();
///
/// container.start().unwrap();
///
/// let service = container.resolve::<Service>().unwrap();
/// assert_eq!(service.config.name, "app");
/// ```
#[derive(Clone)]
pub struct Container {
    inner: Arc<ContainerInner>,
}

impl Container {
    /// Create an empty container with the proxy engine pre-wired as the
    /// last after-init hook.
    pub fn new() -> Self {
        #[cfg(feature = "logging")]
        debug!(target: "wirework", "Creating container");

        let proxy_engine = Arc::new(ProxyEngine::new());
        let mut instance_hooks: HookChain<dyn InstanceHook> = HookChain::new();
        let proxy_hook = ProxyHook::new(Arc::clone(&proxy_engine));
        instance_hooks.push(proxy_hook.priority(), Arc::new(proxy_hook));

        Self {
            inner: Arc::new(ContainerInner {
                registry: RwLock::new(DefinitionRegistry::new()),
                store: SingletonStore::new(),
                definition_hooks: Mutex::new(HookChain::new()),
                instance_hooks: RwLock::new(instance_hooks),
                proxy_engine,
                scopes: DashMap::with_hasher(RandomState::new()),
                events: EventBus::new(),
                started: AtomicBool::new(false),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<ContainerInner>) -> Self {
        Self { inner }
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Register a definition; fails with
    /// [`DuplicateDefinition`](ContainerError::DuplicateDefinition) when the
    /// id is taken.
    pub fn register_definition(&self, definition: Definition) -> Result<()> {
        self.ensure_open()?;
        self.inner
            .registry
            .write()
            .expect("registry poisoned")
            .register(definition, false)
    }

    /// Register a definition, replacing any existing one with the same id
    pub fn register_definition_overwriting(&self, definition: Definition) -> Result<()> {
        self.ensure_open()?;
        self.inner
            .registry
            .write()
            .expect("registry poisoned")
            .register(definition, true)
    }

    /// Register a definition-time hook (runs once, before any instantiation)
    pub fn register_definition_hook(&self, hook: Arc<dyn DefinitionHook>) {
        let priority = hook.priority();
        self.inner
            .definition_hooks
            .lock()
            .expect("definition hooks poisoned")
            .push(priority, hook);
    }

    /// Register an instance-time hook (runs per instance at before/after-init)
    pub fn register_instance_hook(&self, hook: Arc<dyn InstanceHook>) {
        let priority = hook.priority();
        self.inner
            .instance_hooks
            .write()
            .expect("instance hooks poisoned")
            .push(priority, hook);
    }

    /// Register an advisor directly (advisors may also be definitions
    /// providing `dyn Advisor`, collected at `start()`)
    pub fn register_advisor(&self, advisor: Arc<dyn Advisor>) {
        self.inner.proxy_engine.register(advisor);
    }

    /// Register a custom scope store under `name`
    pub fn register_scope(&self, name: impl Into<String>, store: Arc<dyn ScopeStore>) {
        self.inner.scopes.insert(name.into(), store);
    }

    /// Subscribe to container lifecycle events
    pub fn add_listener(&self, listener: Arc<dyn LifecycleListener>) {
        self.inner.events.subscribe(listener);
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Run the build phase: definition-time hooks, advisor freeze, then
    /// every non-lazy singleton in registration order. Publishes
    /// `DefinitionsFinalized` and `ContainerReady`. A second call is a no-op.
    pub fn start(&self) -> Result<()> {
        self.ensure_open()?;
        if self.inner.started.swap(true, Ordering::SeqCst) {
            #[cfg(feature = "logging")]
            debug!(target: "wirework", "start() called twice; ignoring");
            return Ok(());
        }

        // Definition-time hooks may add, mutate, or remove definitions.
        let hooks = self
            .inner
            .definition_hooks
            .lock()
            .expect("definition hooks poisoned")
            .ordered();
        {
            let mut registry = self.inner.registry.write().expect("registry poisoned");
            for hook in hooks {
                hook.process(&mut registry)?;
            }
        }
        self.inner.events.publish(LifecycleEvent::DefinitionsFinalized);

        // Freeze the advisor set: pre-registered advisors plus advisor
        // definitions. Frozen once, so early and final proxy decisions agree.
        let advisor_key = DependencyKey::of_trait::<dyn Advisor>();
        let advisor_defs = {
            self.inner
                .registry
                .read()
                .expect("registry poisoned")
                .find_by_type(advisor_key.type_id)
        };
        let mut collected: Vec<Arc<dyn Advisor>> = Vec::with_capacity(advisor_defs.len());
        for def in advisor_defs {
            let exposed = self.resolve_definition(&def)?;
            let view = self.expose_as(&def, &exposed, &advisor_key)?;
            let wrapped = view
                .downcast::<Arc<dyn Advisor>>()
                .map_err(|_| ContainerError::TypeMismatch {
                    id: def.id.clone(),
                    requested: advisor_key.type_name,
                })?;
            collected.push(Arc::clone(&*wrapped));
        }
        self.inner.proxy_engine.freeze(collected);

        // Eagerly build every non-lazy singleton in registration order.
        let ids = {
            self.inner
                .registry
                .read()
                .expect("registry poisoned")
                .definition_ids()
        };
        for id in ids {
            let def = {
                self.inner
                    .registry
                    .read()
                    .expect("registry poisoned")
                    .get(&id)
            };
            let Some(def) = def else { continue };
            if matches!(def.scope, Scope::Singleton)
                && !def.lazy
                && self.inner.store.get_singleton(&id).is_none()
            {
                self.resolve_singleton(&def)?;
            }
        }

        #[cfg(feature = "logging")]
        debug!(target: "wirework", "Container ready");

        self.inner.events.publish(LifecycleEvent::ContainerReady);
        Ok(())
    }

    /// Destroy every fully initialized singleton in strict reverse
    /// construction order. Destruction errors are collected, never allowed
    /// to abort the remaining destructions, and reported together. A second
    /// call is a no-op.
    pub fn close(&self) -> Result<()> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.inner.events.publish(LifecycleEvent::ContainerClosing);

        #[cfg(feature = "logging")]
        debug!(target: "wirework", "Closing container");

        let failures = self.inner.store.destroy_all();
        if failures.is_empty() {
            Ok(())
        } else {
            Err(ContainerError::Destruction { failures })
        }
    }

    /// Remove a definition, destroying its live instance first (hot-rebind).
    ///
    /// Returns `Ok(false)` when no such definition exists. A failing destroy
    /// callback is reported as [`Destruction`](ContainerError::Destruction);
    /// the definition and its caches are removed regardless, so a subsequent
    /// registration rebuilds fresh.
    pub fn remove_definition(&self, id: &str) -> Result<bool> {
        if !self
            .inner
            .registry
            .read()
            .expect("registry poisoned")
            .contains(id)
        {
            return Ok(false);
        }

        let failure = self.inner.store.destroy_one(id);
        self.inner.store.evict(id);
        self.inner
            .registry
            .write()
            .expect("registry poisoned")
            .remove(id);

        #[cfg(feature = "logging")]
        debug!(target: "wirework", definition = %id, "Definition removed (hot rebind)");

        match failure {
            Some(failure) => Err(ContainerError::Destruction {
                failures: vec![failure],
            }),
            None => Ok(true),
        }
    }

    // =========================================================================
    // Resolution
    // =========================================================================

    /// Resolve a component by concrete type.
    ///
    /// Triggers on-demand construction for lazy singletons; produces a fresh
    /// instance for Prototype definitions.
    pub fn resolve<T: Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        self.resolve_key_concrete::<T>(&DependencyKey::of::<T>())
    }

    /// Resolve a component by concrete type and qualifier (definition id)
    pub fn resolve_named<T: Send + Sync + 'static>(&self, qualifier: &str) -> Result<Arc<T>> {
        self.resolve_key_concrete::<T>(&DependencyKey::of::<T>().qualified(qualifier))
    }

    /// Resolve a component through an interface binding
    pub fn resolve_trait<I: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<I>> {
        self.resolve_key_interface::<I>(&DependencyKey::of_trait::<I>())
    }

    /// Resolve a component through an interface binding, by qualifier
    pub fn resolve_trait_named<I: ?Sized + Send + Sync + 'static>(
        &self,
        qualifier: &str,
    ) -> Result<Arc<I>> {
        self.resolve_key_interface::<I>(&DependencyKey::of_trait::<I>().qualified(qualifier))
    }

    /// Resolve every candidate of a concrete type, ordered primary-first
    /// then registration order
    pub fn resolve_all<T: Send + Sync + 'static>(&self) -> Result<Vec<Arc<T>>> {
        let key = DependencyKey::of::<T>();
        let candidates = self.candidates(&key);
        let mut instances = Vec::with_capacity(candidates.len());
        for def in candidates {
            let exposed = self.resolve_definition(&def)?;
            let view = self.expose_as(&def, &exposed, &key)?;
            let typed = view
                .downcast::<T>()
                .map_err(|_| ContainerError::TypeMismatch {
                    id: def.id.clone(),
                    requested: key.type_name,
                })?;
            instances.push(typed);
        }
        Ok(instances)
    }

    /// Resolve every candidate of an interface, ordered as `find_by_type`
    pub fn resolve_all_traits<I: ?Sized + Send + Sync + 'static>(&self) -> Result<Vec<Arc<I>>> {
        let key = DependencyKey::of_trait::<I>();
        let candidates = self.candidates(&key);
        let mut instances = Vec::with_capacity(candidates.len());
        for def in candidates {
            let exposed = self.resolve_definition(&def)?;
            let view = self.expose_as(&def, &exposed, &key)?;
            let wrapped = view
                .downcast::<Arc<I>>()
                .map_err(|_| ContainerError::TypeMismatch {
                    id: def.id.clone(),
                    requested: key.type_name,
                })?;
            instances.push(Arc::clone(&*wrapped));
        }
        Ok(instances)
    }

    /// Resolve by definition id, returning the type-erased exposed instance
    pub fn resolve_by_id(&self, id: &str) -> Result<AnyInstance> {
        let def = self
            .inner
            .registry
            .read()
            .expect("registry poisoned")
            .get(id)
            .ok_or_else(|| ContainerError::no_such_definition(id, None))?;
        self.resolve_definition(&def)
    }

    /// Whether any definition satisfies the concrete type `T`
    pub fn contains<T: Send + Sync + 'static>(&self) -> bool {
        !self
            .inner
            .registry
            .read()
            .expect("registry poisoned")
            .find_by_type(std::any::TypeId::of::<T>())
            .is_empty()
    }

    /// Lifecycle state of a definition's instance record, if one exists
    pub fn instance_state(&self, id: &str) -> Option<InstanceState> {
        self.inner.store.state(id)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn ensure_open(&self) -> Result<()> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(ContainerError::ContainerClosed);
        }
        Ok(())
    }

    fn candidates(&self, key: &DependencyKey) -> Vec<Arc<Definition>> {
        // Clone the matching definitions out so no registry lock is held
        // while construction recurses.
        let mut candidates = self
            .inner
            .registry
            .read()
            .expect("registry poisoned")
            .find_by_type(key.type_id);
        if let Some(qualifier) = &key.qualifier {
            candidates.retain(|def| def.id == *qualifier);
        }
        candidates
    }

    fn select_candidate(&self, key: &DependencyKey) -> Result<Arc<Definition>> {
        let mut candidates = self.candidates(key);
        match candidates.len() {
            0 => Err(ContainerError::no_such_definition(
                key.type_name,
                key.qualifier.as_deref(),
            )),
            1 => Ok(candidates.remove(0)),
            _ => {
                let mut primaries = candidates.iter().filter(|def| def.primary);
                match (primaries.next(), primaries.next()) {
                    (Some(only), None) => Ok(Arc::clone(only)),
                    _ => Err(ContainerError::AmbiguousDefinition {
                        type_name: key.type_name.to_string(),
                        candidates: candidates.iter().map(|def| def.id.clone()).collect(),
                    }),
                }
            }
        }
    }

    pub(crate) fn resolve_key_concrete<T: Send + Sync + 'static>(
        &self,
        key: &DependencyKey,
    ) -> Result<Arc<T>> {
        let def = self.select_candidate(key)?;
        let exposed = self.resolve_definition(&def)?;
        let view = self.expose_as(&def, &exposed, key)?;
        view.downcast::<T>()
            .map_err(|_| ContainerError::TypeMismatch {
                id: def.id.clone(),
                requested: std::any::type_name::<T>(),
            })
    }

    pub(crate) fn resolve_key_interface<I: ?Sized + Send + Sync + 'static>(
        &self,
        key: &DependencyKey,
    ) -> Result<Arc<I>> {
        let def = self.select_candidate(key)?;
        let exposed = self.resolve_definition(&def)?;
        let view = self.expose_as(&def, &exposed, key)?;
        let wrapped = view
            .downcast::<Arc<I>>()
            .map_err(|_| ContainerError::TypeMismatch {
                id: def.id.clone(),
                requested: std::any::type_name::<I>(),
            })?;
        Ok(Arc::clone(&*wrapped))
    }

    /// Type-erased single-candidate resolution, used by dependency injection
    pub(crate) fn resolve_erased(&self, key: &DependencyKey) -> Result<AnyInstance> {
        let def = self.select_candidate(key)?;
        let exposed = self.resolve_definition(&def)?;
        self.expose_as(&def, &exposed, key)
    }

    /// Re-expose a cached instance under the requested type key
    fn expose_as(
        &self,
        def: &Definition,
        exposed: &AnyInstance,
        key: &DependencyKey,
    ) -> Result<AnyInstance> {
        if let Some(binding) = def.bindings.iter().find(|b| b.key == key.type_id) {
            if let Some(view) = (binding.caster)(exposed) {
                return Ok(view);
            }
        }
        // A proxied instance only satisfies its bound interface: the stored
        // payload is the proxy's Arc<I>, so concrete casters miss above.
        if let Some(proxy) = &def.proxy {
            if proxy.interface == key.type_id {
                return Ok(Arc::clone(exposed));
            }
        }
        Err(ContainerError::TypeMismatch {
            id: def.id.clone(),
            requested: key.type_name,
        })
    }

    /// Scope dispatch for one definition
    fn resolve_definition(&self, def: &Arc<Definition>) -> Result<AnyInstance> {
        self.ensure_open()?;
        match &def.scope {
            Scope::Singleton => self.resolve_singleton(def),
            Scope::Prototype => {
                // No stable early reference exists for a type rebuilt on
                // every request: a cycle through a Prototype is fatal.
                if ResolutionFrame::on_stack(&def.id) {
                    return Err(ContainerError::UnresolvableCycle {
                        path: ResolutionFrame::cycle_path(&def.id),
                    });
                }
                self.build_instance(def, false).map(|built| built.exposed)
            }
            Scope::Custom(name) => {
                if ResolutionFrame::on_stack(&def.id) {
                    return Err(ContainerError::UnresolvableCycle {
                        path: ResolutionFrame::cycle_path(&def.id),
                    });
                }
                let store = self
                    .inner
                    .scopes
                    .get(name)
                    .map(|entry| Arc::clone(entry.value()))
                    .ok_or_else(|| ContainerError::UnknownScope {
                        id: def.id.clone(),
                        scope: name.clone(),
                    })?;
                let mut initializer = || -> Result<AnyInstance> {
                    let built = self.build_instance(def, false)?;
                    if let Some(destroy) = def.destroy.clone() {
                        let raw = built.raw.clone();
                        let id = def.id.clone();
                        store.register_destruction_callback(
                            &def.id,
                            Box::new(move || {
                                if let Err(_source) = destroy.invoke(&raw) {
                                    #[cfg(feature = "logging")]
                                    tracing::warn!(
                                        target: "wirework",
                                        definition = %id,
                                        error = %_source,
                                        "Scoped destroy callback failed"
                                    );
                                    #[cfg(not(feature = "logging"))]
                                    let _ = &id;
                                }
                            }),
                        );
                    }
                    Ok(built.exposed)
                };
                store.get(&def.id, &mut initializer)
            }
        }
    }

    /// Singleton path: fast path, cycle path, then locked construction
    fn resolve_singleton(&self, def: &Arc<Definition>) -> Result<AnyInstance> {
        let id = def.id.as_str();

        if let Some(existing) = self.inner.store.get_singleton(id) {
            return Ok(existing);
        }

        // A definition already on this thread's stack means construction
        // looped back into itself: hand out the early reference, or fail
        // with the cycle path if none exists yet (constructor cycle).
        if ResolutionFrame::on_stack(id) {
            if let Some(early) = self.inner.store.early_reference(id)? {
                return Ok(early);
            }
            return Err(ContainerError::UnresolvableCycle {
                path: ResolutionFrame::cycle_path(id),
            });
        }

        // Serialize racing resolvers of the same definition: the loser
        // blocks here and then observes the winner's cached instance.
        let lock = self.inner.store.creation_lock(id);
        let _guard = lock.lock().expect("creation lock poisoned");
        if let Some(existing) = self.inner.store.get_singleton(id) {
            return Ok(existing);
        }

        #[cfg(feature = "logging")]
        trace!(target: "wirework", definition = %id, "Building singleton");

        self.inner.store.begin_creation(id);
        match self.build_instance(def, true) {
            Ok(built) => {
                self.inner.store.complete_singleton(
                    id,
                    built.raw,
                    built.exposed.clone(),
                    def.destroy.clone(),
                );
                Ok(built.exposed)
            }
            Err(error) => {
                // Never leave a half-initialized singleton reachable.
                self.inner.store.evict(id);
                Err(error)
            }
        }
    }

    /// The build protocol for one definition (steps 2-5 of §4.2 in the
    /// module docs)
    fn build_instance(&self, def: &Arc<Definition>, track_early: bool) -> Result<Built> {
        let _frame = ResolutionFrame::push(&def.id);

        // Constructor-site dependencies come first; the raw instance does
        // not exist yet, so cycles landing here are unresolvable.
        let mut ctor_values: Vec<Resolved> = Vec::new();
        for spec in def.constructor_specs() {
            ctor_values.push(self.resolve_dependency(spec)?);
        }
        let mut deps = ResolvedDeps::new(ctor_values);

        let raw: AnyInstance = match &def.construction {
            ConstructionStrategy::Constructor(ctor) => {
                ctor(&mut deps).map_err(|source| ContainerError::construction(&def.id, source))?
            }
            ConstructionStrategy::FactoryMethod { factory_id, method } => {
                let factory = self.resolve_by_id(factory_id)?;
                method(factory, &mut deps)
                    .map_err(|source| ContainerError::construction(&def.id, source))?
            }
        };
        self.inner.store.set_raw(&def.id, raw.clone());

        // Publish the early-reference factory before dependency population:
        // from here on, cycle peers can obtain a handle to this instance.
        if track_early {
            let hooks = self.instance_hooks_snapshot();
            let def_for_early = Arc::clone(def);
            let raw_for_early = raw.clone();
            self.inner.store.publish_early_factory(
                &def.id,
                Box::new(move || {
                    let mut reference = raw_for_early;
                    for hook in &hooks {
                        reference = hook.early_reference(&def_for_early, reference)?;
                    }
                    Ok(reference)
                }),
            );
        }

        // Setter-site dependencies tolerate cycles via the early reference.
        for spec in def.setter_specs() {
            let value = self.resolve_dependency(spec)?;
            if let InjectionSite::Setter(apply) = &spec.site {
                apply(&raw, value)
                    .map_err(|source| ContainerError::construction(&def.id, source))?;
            }
        }

        let hooks = self.instance_hooks_snapshot();

        // Before-init hooks: a replacement short-circuits the remaining
        // before-init hooks and the definition's own init callback.
        let mut exposed = raw.clone();
        let mut skip_init = false;
        for hook in &hooks {
            if let Some(replacement) = hook.before_init(def, &exposed)? {
                exposed = replacement;
                skip_init = true;
                break;
            }
        }

        if !skip_init {
            if let Some(init) = &def.init {
                #[cfg(feature = "logging")]
                trace!(
                    target: "wirework",
                    definition = %def.id,
                    callback = init.name,
                    "Running init callback"
                );
                init.invoke(&exposed)
                    .map_err(|source| ContainerError::construction(&def.id, source))?;
            }
        }

        // After-init hooks; the proxy engine runs last and may substitute
        // an interface proxy.
        for hook in &hooks {
            exposed = hook.after_init(def, exposed)?;
        }

        // If a cycle peer took an early reference, that reference is the
        // exposed instance — the advisor set is frozen, so both went
        // through the same proxy decision.
        if track_early {
            if let Some(early) = self.inner.store.handed_out_early_reference(&def.id) {
                exposed = early;
            }
        }

        Ok(Built { raw, exposed })
    }

    /// Resolve one dependency descriptor to its injected value
    fn resolve_dependency(&self, spec: &crate::definition::DependencySpec) -> Result<Resolved> {
        match spec.multiplicity {
            Multiplicity::One => Ok(Resolved::One(self.resolve_erased(&spec.key)?)),
            Multiplicity::OptionalOne => match self.resolve_erased(&spec.key) {
                Ok(value) => Ok(Resolved::Optional(Some(value))),
                Err(ContainerError::NoSuchDefinition { .. }) => Ok(Resolved::Optional(None)),
                Err(error) => Err(error),
            },
            Multiplicity::Collection => {
                let mut candidates = self.candidates(&spec.key);
                // Infrastructure definitions are container plumbing, not
                // application candidates.
                candidates.retain(|def| def.role != Role::Infrastructure);
                let mut items = Vec::with_capacity(candidates.len());
                for def in candidates {
                    let exposed = self.resolve_definition(&def)?;
                    items.push(self.expose_as(&def, &exposed, &spec.key)?);
                }
                Ok(Resolved::Collection(items))
            }
            Multiplicity::LazyProvider => Ok(Resolved::Provider(ProviderHandle::new(
                Arc::downgrade(&self.inner),
                spec.key.clone(),
            ))),
        }
    }

    fn instance_hooks_snapshot(&self) -> Vec<Arc<dyn InstanceHook>> {
        self.inner
            .instance_hooks
            .read()
            .expect("instance hooks poisoned")
            .ordered()
    }
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field(
                "definitions",
                &self.inner.registry.read().expect("registry poisoned").len(),
            )
            .field("started", &self.inner.started.load(Ordering::Relaxed))
            .field("closed", &self.inner.closed.load(Ordering::Relaxed))
            .finish()
    }
}
