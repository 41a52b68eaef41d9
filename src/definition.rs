//! Component definitions
//!
//! A [`Definition`] is the metadata record describing how to build one
//! component instance: construction strategy, declared dependencies, scope,
//! lifecycle callbacks, and the set of type keys the instance satisfies.
//! Definitions are pure data; instantiation lives in the container.
//!
//! Construction is closure-based: instead of runtime reflection, a definition
//! carries type-erased factory closures that receive their resolved
//! dependencies. The closures are built once, at definition-build time, by
//! [`DefinitionBuilder`].

use crate::error::BoxError;
use crate::proxy::AdviceChain;
use crate::resolver::ResolvedDeps;
use std::any::{Any, TypeId};
use std::sync::Arc;

/// Marker trait for types that can be managed by the container.
///
/// Automatically implemented for every `Send + Sync + 'static` type; you
/// never implement it manually.
pub trait Component: Send + Sync + 'static {}

impl<T: Send + Sync + 'static> Component for T {}

/// A type-erased component instance, shared via `Arc`.
///
/// For a concrete component `T` the payload is `T`; for an interface binding
/// of trait `I` the payload is `Arc<I>` (the trait object is re-wrapped so it
/// fits behind `dyn Any`).
pub type AnyInstance = Arc<dyn Any + Send + Sync>;

pub(crate) type CtorFn =
    Arc<dyn Fn(&mut ResolvedDeps) -> std::result::Result<AnyInstance, BoxError> + Send + Sync>;
pub(crate) type FactoryMethodFn = Arc<
    dyn Fn(AnyInstance, &mut ResolvedDeps) -> std::result::Result<AnyInstance, BoxError>
        + Send
        + Sync,
>;
pub(crate) type SetterFn =
    Arc<dyn Fn(&AnyInstance, crate::resolver::Resolved) -> std::result::Result<(), BoxError> + Send + Sync>;
pub(crate) type CasterFn = Arc<dyn Fn(&AnyInstance) -> Option<AnyInstance> + Send + Sync>;
pub(crate) type BinderFn =
    Arc<dyn Fn(&AnyInstance, AdviceChain) -> std::result::Result<AnyInstance, BoxError> + Send + Sync>;
pub(crate) type CallbackFn =
    Arc<dyn Fn(&AnyInstance) -> std::result::Result<(), BoxError> + Send + Sync>;

/// How many instances exist and how long they live
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Scope {
    /// One shared instance, cached and torn down by the container
    #[default]
    Singleton,
    /// A fresh instance on every resolution; never cached, never torn down
    Prototype,
    /// Storage delegated to a registered [`ScopeStore`](crate::scope::ScopeStore)
    Custom(String),
}

/// Whether a definition is part of the application or of the container's own
/// plumbing. Infrastructure definitions are skipped by collection injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Role {
    #[default]
    Normal,
    Infrastructure,
}

/// How many candidates a dependency resolves to, and how eagerly
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Multiplicity {
    /// Exactly one candidate; ambiguity or absence is an error
    One,
    /// At most one candidate; absence resolves to `None`
    OptionalOne,
    /// Every matching candidate, in registry order
    Collection,
    /// A handle that resolves on first use, never at injection time
    LazyProvider,
}

/// Identifies the target of a dependency: a type key plus an optional
/// qualifier narrowing the candidate set to a single definition id.
#[derive(Debug, Clone)]
pub struct DependencyKey {
    pub type_id: TypeId,
    pub type_name: &'static str,
    pub qualifier: Option<String>,
}

impl DependencyKey {
    /// Key for a concrete component type
    #[inline]
    pub fn of<T: Component>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            qualifier: None,
        }
    }

    /// Key for an interface (trait object) binding
    #[inline]
    pub fn of_trait<I: ?Sized + Send + Sync + 'static>() -> Self {
        Self {
            type_id: TypeId::of::<Arc<I>>(),
            type_name: std::any::type_name::<I>(),
            qualifier: None,
        }
    }

    /// Narrow the candidate set to the definition with this id
    #[inline]
    pub fn qualified(mut self, qualifier: impl Into<String>) -> Self {
        self.qualifier = Some(qualifier.into());
        self
    }
}

/// Where a resolved dependency is injected
#[derive(Clone)]
pub enum InjectionSite {
    /// Passed to the construction closure, in declaration order
    Constructor,
    /// Applied after raw instantiation through the component's interior
    /// mutability; the only site that tolerates cycles
    Setter(SetterFn),
}

impl std::fmt::Debug for InjectionSite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Constructor => f.write_str("Constructor"),
            Self::Setter(_) => f.write_str("Setter(..)"),
        }
    }
}

/// One declared dependency of a definition
#[derive(Debug, Clone)]
pub struct DependencySpec {
    pub key: DependencyKey,
    pub multiplicity: Multiplicity,
    pub site: InjectionSite,
}

/// How the raw instance comes into existence
#[derive(Clone)]
pub enum ConstructionStrategy {
    /// A constructor closure over the resolved constructor dependencies
    Constructor(CtorFn),
    /// Resolve the named factory component first, then call the method
    /// closure with it plus the resolved dependencies
    FactoryMethod {
        factory_id: String,
        method: FactoryMethodFn,
    },
}

impl std::fmt::Debug for ConstructionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Constructor(_) => f.write_str("Constructor(..)"),
            Self::FactoryMethod { factory_id, .. } => {
                write!(f, "FactoryMethod {{ factory_id: {factory_id:?} }}")
            }
        }
    }
}

/// A named init or destroy callback
#[derive(Clone)]
pub struct LifecycleCallback {
    pub name: &'static str,
    pub(crate) call: CallbackFn,
}

impl LifecycleCallback {
    #[inline]
    pub(crate) fn invoke(&self, instance: &AnyInstance) -> std::result::Result<(), BoxError> {
        (self.call)(instance)
    }
}

impl std::fmt::Debug for LifecycleCallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "LifecycleCallback({:?})", self.name)
    }
}

/// A type key the definition satisfies, with the closure that re-exposes the
/// cached instance under that key
#[derive(Clone)]
pub struct TypeBinding {
    pub key: TypeId,
    pub type_name: &'static str,
    pub(crate) caster: CasterFn,
}

impl std::fmt::Debug for TypeBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TypeBinding({})", self.type_name)
    }
}

/// The interface through which a definition can be proxied: the key of the
/// bound trait plus the binder that composes the delegating proxy around it
#[derive(Clone)]
pub struct ProxyBinding {
    pub interface: TypeId,
    pub interface_name: &'static str,
    pub(crate) bind: BinderFn,
}

impl std::fmt::Debug for ProxyBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ProxyBinding({})", self.interface_name)
    }
}

/// Metadata describing how to build one component instance.
///
/// Immutable once the container's build phase starts; definition-time hooks
/// may rewrite definitions before that point.
///
/// # Examples
///
/// ```rust
/// use wirework::{Definition, Scope};
///
/// struct Database {
///     url: String,
/// }
///
/// let def = Definition::builder::<Database>("database")
///     .constructor(|_deps| {
///         Ok(Database { url: "postgres://localhost".into() })
///     })
///     .build();
///
/// assert_eq!(def.id, "database");
/// assert_eq!(def.scope, Scope::Singleton);
/// assert!(!def.lazy);
/// ```
#[derive(Debug, Clone)]
pub struct Definition {
    /// Unique name of the definition
    pub id: String,
    /// Concrete type produced by the construction strategy
    pub type_id: TypeId,
    /// Human-readable name of the concrete type
    pub type_name: &'static str,
    pub construction: ConstructionStrategy,
    /// Declared dependencies, in declaration order
    pub dependencies: Vec<DependencySpec>,
    pub scope: Scope,
    /// Lazy singletons are skipped by the eager build phase
    pub lazy: bool,
    /// Primary-marked definitions win `find_by_type` ordering and break
    /// multi-candidate ties
    pub primary: bool,
    pub role: Role,
    pub init: Option<LifecycleCallback>,
    pub destroy: Option<LifecycleCallback>,
    /// Type keys this definition satisfies (self-binding plus interfaces)
    pub bindings: Vec<TypeBinding>,
    /// Public method names visible to pointcut matching; empty means the
    /// type is opaque to advisors and never proxied
    pub methods: Vec<&'static str>,
    /// Present when the definition can be wrapped in an interface proxy
    pub proxy: Option<ProxyBinding>,
}

impl Definition {
    /// Start building a definition for concrete component type `T`.
    ///
    /// The definition starts with the self-binding for `T`, Singleton scope,
    /// eager construction, and no dependencies.
    #[inline]
    pub fn builder<T: Component>(id: impl Into<String>) -> DefinitionBuilder<T> {
        DefinitionBuilder::new(id)
    }

    /// Whether this definition satisfies the given type key
    #[inline]
    pub fn provides(&self, key: TypeId) -> bool {
        self.bindings.iter().any(|b| b.key == key)
    }

    pub(crate) fn constructor_specs(&self) -> impl Iterator<Item = &DependencySpec> {
        self.dependencies
            .iter()
            .filter(|d| matches!(d.site, InjectionSite::Constructor))
    }

    pub(crate) fn setter_specs(&self) -> impl Iterator<Item = &DependencySpec> {
        self.dependencies
            .iter()
            .filter(|d| matches!(d.site, InjectionSite::Setter(_)))
    }
}

/// Fluent builder for [`Definition`].
///
/// The type parameter pins the concrete component type so constructor,
/// setter, lifecycle, and binding closures stay fully typed; erasure happens
/// once, inside the builder.
///
/// # Examples
///
/// ```rust
/// use wirework::{Definition, Scope};
/// use std::sync::Arc;
///
/// trait Mailer: Send + Sync {
///     fn send(&self, to: &str) -> bool;
/// }
///
/// struct SmtpMailer {
///     host: String,
/// }
///
/// impl Mailer for SmtpMailer {
///     fn send(&self, _to: &str) -> bool {
///         true
///     }
/// }
///
/// let def = Definition::builder::<SmtpMailer>("mailer")
///     .constructor(|_deps| Ok(SmtpMailer { host: "localhost".into() }))
///     .implements::<dyn Mailer>(|m| m)
///     .scope(Scope::Singleton)
///     .lazy(true)
///     .build();
///
/// assert!(def.lazy);
/// assert_eq!(def.bindings.len(), 2); // self-binding + dyn Mailer
/// ```
pub struct DefinitionBuilder<T> {
    id: String,
    construction: Option<ConstructionStrategy>,
    dependencies: Vec<DependencySpec>,
    scope: Scope,
    lazy: bool,
    primary: bool,
    role: Role,
    init: Option<LifecycleCallback>,
    destroy: Option<LifecycleCallback>,
    bindings: Vec<TypeBinding>,
    methods: Vec<&'static str>,
    proxy: Option<ProxyBinding>,
    _marker: std::marker::PhantomData<fn() -> T>,
}

impl<T: Component> DefinitionBuilder<T> {
    fn new(id: impl Into<String>) -> Self {
        // Self-binding: expose the cached instance as Arc<T> by identity.
        let self_binding = TypeBinding {
            key: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            caster: Arc::new(|instance: &AnyInstance| {
                instance.is::<T>().then(|| Arc::clone(instance))
            }),
        };
        Self {
            id: id.into(),
            construction: None,
            dependencies: Vec::new(),
            scope: Scope::Singleton,
            lazy: false,
            primary: false,
            role: Role::Normal,
            init: None,
            destroy: None,
            bindings: vec![self_binding],
            methods: Vec::new(),
            proxy: None,
            _marker: std::marker::PhantomData,
        }
    }

    /// Supply the constructor closure. It receives the resolved
    /// constructor-site dependencies in declaration order.
    pub fn constructor<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut ResolvedDeps) -> std::result::Result<T, BoxError> + Send + Sync + 'static,
    {
        self.construction = Some(ConstructionStrategy::Constructor(Arc::new(move |deps| {
            f(deps).map(|t| Arc::new(t) as AnyInstance)
        })));
        self
    }

    /// Register a pre-built instance; every construction yields the same value.
    pub fn instance(mut self, value: T) -> Self {
        let shared = Arc::new(value);
        self.construction = Some(ConstructionStrategy::Constructor(Arc::new(move |_deps| {
            Ok(Arc::clone(&shared) as AnyInstance)
        })));
        self
    }

    /// Construct through a factory component: the container resolves
    /// `factory_id` first and passes it, typed, to the method closure.
    pub fn factory_method<FB, F>(mut self, factory_id: impl Into<String>, f: F) -> Self
    where
        FB: Component,
        F: Fn(Arc<FB>, &mut ResolvedDeps) -> std::result::Result<T, BoxError>
            + Send
            + Sync
            + 'static,
    {
        self.construction = Some(ConstructionStrategy::FactoryMethod {
            factory_id: factory_id.into(),
            method: Arc::new(move |factory: AnyInstance, deps| {
                let factory = factory.downcast::<FB>().map_err(|_| {
                    Box::<dyn std::error::Error + Send + Sync>::from(format!(
                        "factory component is not a {}",
                        std::any::type_name::<FB>()
                    ))
                })?;
                f(factory, deps).map(|t| Arc::new(t) as AnyInstance)
            }),
        });
        self
    }

    /// Declare a required constructor dependency on concrete type `D`
    pub fn depends_on<D: Component>(self) -> Self {
        self.push_ctor_dep(DependencyKey::of::<D>(), Multiplicity::One)
    }

    /// Declare a required constructor dependency on interface `I`
    pub fn depends_on_trait<I: ?Sized + Send + Sync + 'static>(self) -> Self {
        self.push_ctor_dep(DependencyKey::of_trait::<I>(), Multiplicity::One)
    }

    /// Declare a qualified constructor dependency (candidate id must match)
    pub fn depends_on_qualified<D: Component>(self, qualifier: impl Into<String>) -> Self {
        self.push_ctor_dep(DependencyKey::of::<D>().qualified(qualifier), Multiplicity::One)
    }

    /// Declare an optional constructor dependency on concrete type `D`
    pub fn depends_on_optional<D: Component>(self) -> Self {
        self.push_ctor_dep(DependencyKey::of::<D>(), Multiplicity::OptionalOne)
    }

    /// Declare a constructor dependency on every candidate of interface `I`
    pub fn depends_on_all_traits<I: ?Sized + Send + Sync + 'static>(self) -> Self {
        self.push_ctor_dep(DependencyKey::of_trait::<I>(), Multiplicity::Collection)
    }

    /// Declare a constructor dependency on every candidate of concrete type `D`
    pub fn depends_on_all<D: Component>(self) -> Self {
        self.push_ctor_dep(DependencyKey::of::<D>(), Multiplicity::Collection)
    }

    /// Declare a lazily resolved constructor dependency: the constructor
    /// receives a [`ProviderHandle`](crate::resolver::ProviderHandle) that
    /// resolves on first use and never triggers construction at injection time
    pub fn depends_on_provider<D: Component>(self) -> Self {
        self.push_ctor_dep(DependencyKey::of::<D>(), Multiplicity::LazyProvider)
    }

    fn push_ctor_dep(mut self, key: DependencyKey, multiplicity: Multiplicity) -> Self {
        self.dependencies.push(DependencySpec {
            key,
            multiplicity,
            site: InjectionSite::Constructor,
        });
        self
    }

    /// Declare a setter-injected dependency on concrete type `D`.
    ///
    /// The apply closure runs after raw instantiation and writes the value
    /// through the component's interior mutability. Setter injection is the
    /// only site that tolerates dependency cycles.
    pub fn setter<D: Component, F>(mut self, apply: F) -> Self
    where
        F: Fn(&T, Arc<D>) + Send + Sync + 'static,
    {
        let erased: SetterFn = Arc::new(move |target, resolved| {
            let target = target.downcast_ref::<T>().ok_or_else(|| {
                BoxError::from(format!(
                    "setter target is not a {}",
                    std::any::type_name::<T>()
                ))
            })?;
            apply(target, resolved.into_one::<D>()?);
            Ok(())
        });
        self.dependencies.push(DependencySpec {
            key: DependencyKey::of::<D>(),
            multiplicity: Multiplicity::One,
            site: InjectionSite::Setter(erased),
        });
        self
    }

    /// Declare a setter-injected dependency on interface `I`
    pub fn setter_trait<I, F>(mut self, apply: F) -> Self
    where
        I: ?Sized + Send + Sync + 'static,
        F: Fn(&T, Arc<I>) + Send + Sync + 'static,
    {
        let erased: SetterFn = Arc::new(move |target, resolved| {
            let target = target.downcast_ref::<T>().ok_or_else(|| {
                BoxError::from(format!(
                    "setter target is not a {}",
                    std::any::type_name::<T>()
                ))
            })?;
            apply(target, resolved.into_one_trait::<I>()?);
            Ok(())
        });
        self.dependencies.push(DependencySpec {
            key: DependencyKey::of_trait::<I>(),
            multiplicity: Multiplicity::One,
            site: InjectionSite::Setter(erased),
        });
        self
    }

    /// Declare that the component also satisfies interface `I`.
    ///
    /// The cast function is usually the identity closure `|t| t`, relying on
    /// unsize coercion from `Arc<T>` to `Arc<I>`.
    pub fn implements<I: ?Sized + Send + Sync + 'static>(
        mut self,
        cast: fn(Arc<T>) -> Arc<I>,
    ) -> Self {
        self.bindings.push(TypeBinding {
            key: TypeId::of::<Arc<I>>(),
            type_name: std::any::type_name::<I>(),
            caster: Arc::new(move |instance: &AnyInstance| {
                let concrete = Arc::clone(instance).downcast::<T>().ok()?;
                Some(Arc::new(cast(concrete)) as AnyInstance)
            }),
        });
        self
    }

    /// Declare the public method names visible to pointcut matching.
    ///
    /// A definition with no declared methods is opaque to advisors. Declaring
    /// methods without a proxy binding makes a matching advisor a
    /// [`ProxyCreationFailure`](crate::ContainerError::ProxyCreationFailure)
    /// rather than a silent skip.
    pub fn public_methods(mut self, methods: &[&'static str]) -> Self {
        for method in methods.iter().copied() {
            if !self.methods.contains(&method) {
                self.methods.push(method);
            }
        }
        self
    }

    /// Declare how to wrap the component in a delegating proxy for
    /// interface `I` when advisors match.
    ///
    /// `methods` is the intercepted surface (merged into the declared public
    /// methods); `bind` receives the raw target and the matched advice chain
    /// and composes the proxy. The interface should also be declared via
    /// [`implements`](Self::implements) so unproxied instances resolve
    /// through the same key.
    pub fn proxied<I, F>(mut self, methods: &[&'static str], bind: F) -> Self
    where
        I: ?Sized + Send + Sync + 'static,
        F: Fn(Arc<T>, AdviceChain) -> Arc<I> + Send + Sync + 'static,
    {
        self = self.public_methods(methods);
        self.proxy = Some(ProxyBinding {
            interface: TypeId::of::<Arc<I>>(),
            interface_name: std::any::type_name::<I>(),
            bind: Arc::new(move |instance: &AnyInstance, chain| {
                let concrete = Arc::clone(instance).downcast::<T>().map_err(|_| {
                    BoxError::from(format!(
                        "proxy target is not a {}",
                        std::any::type_name::<T>()
                    ))
                })?;
                let proxy: Arc<I> = bind(concrete, chain);
                Ok(Arc::new(proxy) as AnyInstance)
            }),
        });
        self
    }

    /// Set the scope (default Singleton)
    pub fn scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    /// Defer construction past the eager build phase (singletons only)
    pub fn lazy(mut self, lazy: bool) -> Self {
        self.lazy = lazy;
        self
    }

    /// Mark this definition as the preferred candidate among multiple
    /// matches for the same type key
    pub fn primary(mut self) -> Self {
        self.primary = true;
        self
    }

    /// Set the definition role (default Normal)
    pub fn role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    /// Register a named init callback, run after dependency population
    pub fn on_init<F>(mut self, name: &'static str, f: F) -> Self
    where
        F: Fn(&T) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        self.init = Some(LifecycleCallback {
            name,
            call: Arc::new(move |instance| {
                let target = instance.downcast_ref::<T>().ok_or_else(|| {
                    BoxError::from(format!(
                        "init target is not a {}",
                        std::any::type_name::<T>()
                    ))
                })?;
                f(target)
            }),
        });
        self
    }

    /// Register a named destroy callback, run in reverse construction order
    /// during [`close`](crate::Container::close)
    pub fn on_destroy<F>(mut self, name: &'static str, f: F) -> Self
    where
        F: Fn(&T) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        self.destroy = Some(LifecycleCallback {
            name,
            call: Arc::new(move |instance| {
                let target = instance.downcast_ref::<T>().ok_or_else(|| {
                    BoxError::from(format!(
                        "destroy target is not a {}",
                        std::any::type_name::<T>()
                    ))
                })?;
                f(target)
            }),
        });
        self
    }

    /// Finish the definition.
    ///
    /// # Panics
    ///
    /// Panics if no construction strategy was supplied, or if a proxy binding
    /// targets an interface that was never declared via `implements` — both
    /// are programming errors in the registration code, not runtime
    /// conditions.
    pub fn build(self) -> Definition {
        let construction = self
            .construction
            .unwrap_or_else(|| panic!("definition '{}' has no construction strategy", self.id));
        if let Some(proxy) = &self.proxy {
            assert!(
                self.bindings.iter().any(|b| b.key == proxy.interface),
                "definition '{}' proxies {} but never declares it via implements()",
                self.id,
                proxy.interface_name,
            );
        }
        Definition {
            id: self.id,
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            construction,
            dependencies: self.dependencies,
            scope: self.scope,
            lazy: self.lazy,
            primary: self.primary,
            role: self.role,
            init: self.init,
            destroy: self.destroy,
            bindings: self.bindings,
            methods: self.methods,
            proxy: self.proxy,
        }
    }
}
