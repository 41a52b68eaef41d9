//! # Wirework - Inversion-of-Control Container for Rust
//!
//! A container that constructs, wires, and manages the lifecycle of
//! components from declarative definitions: dependency graphs (including
//! setter-injected cycles), pluggable scopes, extension hooks, and optional
//! interface proxies that run advice chains around method calls.
//!
//! ## Features
//!
//! - 🧩 **Definition-driven** - components are described by data, built by closures
//! - 🔁 **Cycle breaking** - setter-injected singleton cycles resolve through early references
//! - 🧵 **Thread-safe resolution** - racing resolvers of one singleton serialize on a per-definition lock
//! - 🪝 **Extension hooks** - rewrite definitions before the build phase, wrap instances during it
//! - 🎭 **Interface proxies** - advisors match pointcuts against declared methods and run
//!   chain-of-responsibility interceptors around the real call
//! - 🗄️ **Pluggable scopes** - Singleton, Prototype, or custom stores (thread-bound included)
//! - 📊 **Observable** - optional `tracing` integration with JSON or pretty output
//!
//! ## Quick Start
//!
//! ```rust
//! use wirework::{Container, Definition};
//! use std::sync::Arc;
//!
//! struct Database {
//!     url: String,
//! }
//!
//! struct UserService {
//!     db: Arc<Database>,
//! }
//!
//! let container = Container::new();
//!
//! container.register_definition(
//!     Definition::builder::<Database>("database")
//!         .constructor(|_| Ok(Database { url: "postgres://localhost".into() }))
//!         .build(),
//! ).unwrap();
//!
//! container.register_definition(
//!     Definition::builder::<UserService>("user-service")
//!         .depends_on::<Database>()
//!         .constructor(|deps| Ok(UserService { db: deps.take::<Database>(0)? }))
//!         .build(),
//! ).unwrap();
//!
//! container.start().unwrap();
//!
//! let users = container.resolve::<UserService>().unwrap();
//! assert_eq!(users.db.url, "postgres://localhost");
//! ```
//!
//! ## Scopes
//!
//! ```rust
//! use wirework::{Container, Definition, Scope};
//! use std::sync::atomic::{AtomicU64, Ordering};
//!
//! static BUILT: AtomicU64 = AtomicU64::new(0);
//!
//! struct RequestId(u64);
//!
//! let container = Container::new();
//! container.register_definition(
//!     Definition::builder::<RequestId>("request-id")
//!         .constructor(|_| Ok(RequestId(BUILT.fetch_add(1, Ordering::SeqCst))))
//!         .scope(Scope::Prototype)
//!         .build(),
//! ).unwrap();
//! container.start().unwrap();
//!
//! let a = container.resolve::<RequestId>().unwrap();
//! let b = container.resolve::<RequestId>().unwrap();
//! assert_ne!(a.0, b.0); // fresh instance per resolution
//! ```

mod container;
mod definition;
mod error;
mod event;
mod hooks;
#[cfg(feature = "logging")]
pub mod logging;
mod proxy;
mod registry;
mod resolver;
mod scope;
mod store;

pub use container::Container;
pub use definition::{
    AnyInstance, Component, ConstructionStrategy, Definition, DefinitionBuilder, DependencyKey,
    DependencySpec, InjectionSite, LifecycleCallback, Multiplicity, ProxyBinding, Role, Scope,
    TypeBinding,
};
pub use error::{BoxError, ContainerError, DestructionFailure, Result};
pub use event::{LifecycleEvent, LifecycleListener};
pub use hooks::{DefinitionHook, InstanceHook};
pub use proxy::{
    AdviceChain, Advisor, AnyValue, DefaultAdvisor, FnPointcut, InvokeResult, MethodInterceptor,
    MethodInvocation, MethodNamePointcut, Pointcut,
};
pub use registry::DefinitionRegistry;
pub use resolver::{ProviderHandle, Resolved, ResolvedDeps};
pub use scope::{ScopeCallback, ScopeStore, ThreadScope};
pub use store::InstanceState;

// Re-export tracing macros for convenience when the logging feature is enabled
#[cfg(feature = "logging")]
pub use tracing::{debug, error, info, trace, warn};

// Re-export for convenience
pub use std::sync::Arc;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        Advisor, Container, ContainerError, DefaultAdvisor, Definition, DefinitionHook,
        InstanceHook, LifecycleEvent, LifecycleListener, MethodInterceptor, MethodNamePointcut,
        Multiplicity, Result, Role, Scope, ScopeStore,
    };
    pub use std::sync::Arc;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Mutex, RwLock};

    // =========================================================================
    // Singleton and Prototype lifetimes
    // =========================================================================

    struct Database {
        url: String,
    }

    fn database_def() -> Definition {
        Definition::builder::<Database>("database")
            .constructor(|_| {
                Ok(Database {
                    url: "postgres://localhost".into(),
                })
            })
            .build()
    }

    #[test]
    fn singleton_identity() {
        let container = Container::new();
        container.register_definition(database_def()).unwrap();
        container.start().unwrap();

        let a = container.resolve::<Database>().unwrap();
        let b = container.resolve::<Database>().unwrap();
        assert_eq!(a.url, "postgres://localhost");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn singleton_identity_across_threads() {
        let container = Container::new();
        container.register_definition(database_def()).unwrap();
        container.start().unwrap();

        let main_ptr = Arc::as_ptr(&container.resolve::<Database>().unwrap()) as usize;
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let container = container.clone();
                std::thread::spawn(move || {
                    Arc::as_ptr(&container.resolve::<Database>().unwrap()) as usize
                })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), main_ptr);
        }
    }

    #[test]
    fn racing_resolvers_build_once() {
        static BUILT: AtomicU32 = AtomicU32::new(0);

        struct Slow;

        let container = Container::new();
        container
            .register_definition(
                Definition::builder::<Slow>("slow")
                    .constructor(|_| {
                        BUILT.fetch_add(1, Ordering::SeqCst);
                        std::thread::sleep(std::time::Duration::from_millis(30));
                        Ok(Slow)
                    })
                    .lazy(true)
                    .build(),
            )
            .unwrap();
        container.start().unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let container = container.clone();
                std::thread::spawn(move || {
                    Arc::as_ptr(&container.resolve::<Slow>().unwrap()) as usize
                })
            })
            .collect();
        let ptrs: Vec<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(BUILT.load(Ordering::SeqCst), 1);
        assert!(ptrs.windows(2).all(|pair| pair[0] == pair[1]));
    }

    #[test]
    fn prototype_independence() {
        struct Job {
            serial: u32,
        }

        static SERIAL: AtomicU32 = AtomicU32::new(0);

        let container = Container::new();
        container
            .register_definition(
                Definition::builder::<Job>("job")
                    .constructor(|_| {
                        Ok(Job {
                            serial: SERIAL.fetch_add(1, Ordering::SeqCst),
                        })
                    })
                    .scope(Scope::Prototype)
                    .build(),
            )
            .unwrap();
        container.start().unwrap();

        let first = container.resolve::<Job>().unwrap();
        let second = container.resolve::<Job>().unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_ne!(first.serial, second.serial);
        // Prototypes are never recorded for teardown.
        assert_eq!(container.instance_state("job"), None);
    }

    #[test]
    fn lazy_singleton_defers_until_first_resolve() {
        static BUILT: AtomicU32 = AtomicU32::new(0);

        struct Expensive;

        let container = Container::new();
        container
            .register_definition(
                Definition::builder::<Expensive>("expensive")
                    .constructor(|_| {
                        BUILT.fetch_add(1, Ordering::SeqCst);
                        Ok(Expensive)
                    })
                    .lazy(true)
                    .build(),
            )
            .unwrap();
        container.start().unwrap();
        assert_eq!(BUILT.load(Ordering::SeqCst), 0);

        let _ = container.resolve::<Expensive>().unwrap();
        let _ = container.resolve::<Expensive>().unwrap();
        assert_eq!(BUILT.load(Ordering::SeqCst), 1);
    }

    // =========================================================================
    // Cycles
    // =========================================================================

    struct Alpha {
        beta: RwLock<Option<Arc<Beta>>>,
    }

    struct Beta {
        alpha: RwLock<Option<Arc<Alpha>>>,
    }

    #[test]
    fn setter_cycle_resolves_through_early_references() {
        let container = Container::new();
        container
            .register_definition(
                Definition::builder::<Alpha>("alpha")
                    .constructor(|_| {
                        Ok(Alpha {
                            beta: RwLock::new(None),
                        })
                    })
                    .setter::<Beta, _>(|alpha, beta| {
                        *alpha.beta.write().unwrap() = Some(beta);
                    })
                    .build(),
            )
            .unwrap();
        container
            .register_definition(
                Definition::builder::<Beta>("beta")
                    .constructor(|_| {
                        Ok(Beta {
                            alpha: RwLock::new(None),
                        })
                    })
                    .setter::<Alpha, _>(|beta, alpha| {
                        *beta.alpha.write().unwrap() = Some(alpha);
                    })
                    .build(),
            )
            .unwrap();

        container.start().unwrap();

        let alpha = container.resolve::<Alpha>().unwrap();
        let beta = container.resolve::<Beta>().unwrap();

        let alpha_beta = alpha.beta.read().unwrap().clone().unwrap();
        let beta_alpha = beta.alpha.read().unwrap().clone().unwrap();
        assert!(Arc::ptr_eq(&alpha_beta, &beta));
        assert!(Arc::ptr_eq(&beta_alpha, &alpha));
    }

    #[test]
    fn constructor_cycle_is_rejected_with_path() {
        #[derive(Debug)]
        struct Left {
            _right: Arc<Right>,
        }
        #[derive(Debug)]
        struct Right {
            _left: Arc<Left>,
        }

        let container = Container::new();
        container
            .register_definition(
                Definition::builder::<Left>("left")
                    .depends_on::<Right>()
                    .constructor(|deps| {
                        Ok(Left {
                            _right: deps.take::<Right>(0)?,
                        })
                    })
                    .lazy(true)
                    .build(),
            )
            .unwrap();
        container
            .register_definition(
                Definition::builder::<Right>("right")
                    .depends_on::<Left>()
                    .constructor(|deps| {
                        Ok(Right {
                            _left: deps.take::<Left>(0)?,
                        })
                    })
                    .lazy(true)
                    .build(),
            )
            .unwrap();
        container.start().unwrap();

        let err = container.resolve::<Left>().unwrap_err();
        match err {
            ContainerError::UnresolvableCycle { path } => {
                assert!(path.contains(&"left".to_string()));
                assert!(path.contains(&"right".to_string()));
                assert_eq!(path.first(), path.last());
            }
            other => panic!("expected cycle error, got: {other}"),
        }

        // The failed records were evicted, not left under construction.
        assert_eq!(
            container.instance_state("left"),
            Some(InstanceState::Destroyed)
        );
    }

    #[test]
    fn prototype_cycle_is_always_fatal() {
        #[derive(Debug)]
        struct Node {
            _next: RwLock<Option<Arc<Node>>>,
        }

        let container = Container::new();
        container
            .register_definition(
                Definition::builder::<Node>("node")
                    .constructor(|_| {
                        Ok(Node {
                            _next: RwLock::new(None),
                        })
                    })
                    .setter::<Node, _>(|node, next| {
                        *node._next.write().unwrap() = Some(next);
                    })
                    .scope(Scope::Prototype)
                    .build(),
            )
            .unwrap();
        container.start().unwrap();

        // Even a setter-site cycle cannot be broken for a prototype: no
        // stable early reference exists.
        let err = container.resolve::<Node>().unwrap_err();
        assert!(matches!(err, ContainerError::UnresolvableCycle { .. }));
    }

    #[test]
    fn failed_construction_can_be_retried() {
        static ATTEMPTS: AtomicU32 = AtomicU32::new(0);

        #[derive(Debug)]
        struct Flaky;

        let container = Container::new();
        container
            .register_definition(
                Definition::builder::<Flaky>("flaky")
                    .constructor(|_| {
                        if ATTEMPTS.fetch_add(1, Ordering::SeqCst) == 0 {
                            Err("boot failed".into())
                        } else {
                            Ok(Flaky)
                        }
                    })
                    .lazy(true)
                    .build(),
            )
            .unwrap();
        container.start().unwrap();

        let err = container.resolve::<Flaky>().unwrap_err();
        assert!(matches!(err, ContainerError::ConstructionFailure { ref id, .. } if id == "flaky"));
        assert_eq!(
            container.instance_state("flaky"),
            Some(InstanceState::Destroyed)
        );

        // Second attempt starts from a fresh record and succeeds.
        assert!(container.resolve::<Flaky>().is_ok());
        assert_eq!(ATTEMPTS.load(Ordering::SeqCst), 2);
    }

    // =========================================================================
    // Qualifiers, primaries, ambiguity, collections
    // =========================================================================

    trait CacheBackend: std::fmt::Debug + Send + Sync {
        fn name(&self) -> &'static str;
    }

    #[derive(Debug)]
    struct RedisCache;
    #[derive(Debug)]
    struct MemoryCache;

    impl CacheBackend for RedisCache {
        fn name(&self) -> &'static str {
            "redis"
        }
    }

    impl CacheBackend for MemoryCache {
        fn name(&self) -> &'static str {
            "memory"
        }
    }

    fn redis_def() -> Definition {
        Definition::builder::<RedisCache>("redis")
            .constructor(|_| Ok(RedisCache))
            .implements::<dyn CacheBackend>(|c| c)
            .build()
    }

    fn memory_def() -> Definition {
        Definition::builder::<MemoryCache>("memory")
            .constructor(|_| Ok(MemoryCache))
            .implements::<dyn CacheBackend>(|c| c)
            .build()
    }

    #[test]
    fn ambiguity_lists_all_candidates() {
        let container = Container::new();
        container.register_definition(redis_def()).unwrap();
        container.register_definition(memory_def()).unwrap();
        container.start().unwrap();

        let err = container.resolve_trait::<dyn CacheBackend>().unwrap_err();
        match err {
            ContainerError::AmbiguousDefinition { candidates, .. } => {
                assert_eq!(candidates, vec!["redis".to_string(), "memory".to_string()]);
            }
            other => panic!("expected ambiguity, got: {other}"),
        }
    }

    #[test]
    fn qualifier_disambiguates() {
        let container = Container::new();
        container.register_definition(redis_def()).unwrap();
        container.register_definition(memory_def()).unwrap();
        container.start().unwrap();

        let cache = container
            .resolve_trait_named::<dyn CacheBackend>("memory")
            .unwrap();
        assert_eq!(cache.name(), "memory");
    }

    #[test]
    fn primary_wins_unqualified_resolution() {
        let container = Container::new();
        container.register_definition(redis_def()).unwrap();
        let mut memory = memory_def();
        memory.primary = true;
        container.register_definition(memory).unwrap();
        container.start().unwrap();

        let cache = container.resolve_trait::<dyn CacheBackend>().unwrap();
        assert_eq!(cache.name(), "memory");

        // resolve_all orders primary first, then registration order.
        let all = container.resolve_all_traits::<dyn CacheBackend>().unwrap();
        let names: Vec<_> = all.iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["memory", "redis"]);
    }

    #[test]
    fn collection_injection_skips_infrastructure() {
        struct Fanout {
            backends: Vec<Arc<dyn CacheBackend>>,
        }

        #[derive(Debug)]
        struct AuditCache;
        impl CacheBackend for AuditCache {
            fn name(&self) -> &'static str {
                "audit"
            }
        }

        let container = Container::new();
        container.register_definition(redis_def()).unwrap();
        container.register_definition(memory_def()).unwrap();
        container
            .register_definition(
                Definition::builder::<AuditCache>("audit")
                    .constructor(|_| Ok(AuditCache))
                    .implements::<dyn CacheBackend>(|c| c)
                    .role(Role::Infrastructure)
                    .build(),
            )
            .unwrap();
        container
            .register_definition(
                Definition::builder::<Fanout>("fanout")
                    .depends_on_all_traits::<dyn CacheBackend>()
                    .constructor(|deps| {
                        Ok(Fanout {
                            backends: deps.take_all_traits::<dyn CacheBackend>(0)?,
                        })
                    })
                    .build(),
            )
            .unwrap();
        container.start().unwrap();

        let fanout = container.resolve::<Fanout>().unwrap();
        let names: Vec<_> = fanout.backends.iter().map(|b| b.name()).collect();
        assert_eq!(names, vec!["redis", "memory"]);

        // resolve_all_traits still sees the infrastructure definition.
        assert_eq!(
            container
                .resolve_all_traits::<dyn CacheBackend>()
                .unwrap()
                .len(),
            3
        );
    }

    #[test]
    fn optional_dependency_tolerates_absence() {
        struct Metrics;
        struct Server {
            metrics: Option<Arc<Metrics>>,
        }

        let container = Container::new();
        container
            .register_definition(
                Definition::builder::<Server>("server")
                    .depends_on_optional::<Metrics>()
                    .constructor(|deps| {
                        Ok(Server {
                            metrics: deps.take_optional::<Metrics>(0)?,
                        })
                    })
                    .build(),
            )
            .unwrap();
        container.start().unwrap();

        assert!(container.resolve::<Server>().unwrap().metrics.is_none());
    }

    #[test]
    fn lazy_provider_defers_construction() {
        static BUILT: AtomicU32 = AtomicU32::new(0);

        struct Heavy;
        struct Holder {
            heavy: ProviderHandle,
        }

        let container = Container::new();
        container
            .register_definition(
                Definition::builder::<Heavy>("heavy")
                    .constructor(|_| {
                        BUILT.fetch_add(1, Ordering::SeqCst);
                        Ok(Heavy)
                    })
                    .lazy(true)
                    .build(),
            )
            .unwrap();
        container
            .register_definition(
                Definition::builder::<Holder>("holder")
                    .depends_on_provider::<Heavy>()
                    .constructor(|deps| {
                        Ok(Holder {
                            heavy: deps.take_provider(0)?,
                        })
                    })
                    .build(),
            )
            .unwrap();
        container.start().unwrap();

        let holder = container.resolve::<Holder>().unwrap();
        // Injection did not construct the target.
        assert_eq!(BUILT.load(Ordering::SeqCst), 0);

        let first = holder.heavy.get::<Heavy>().unwrap();
        let second = holder.heavy.get::<Heavy>().unwrap();
        assert_eq!(BUILT.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&first, &second));
    }

    // =========================================================================
    // Hooks
    // =========================================================================

    #[test]
    fn definition_hook_rewrites_registry_before_build() {
        struct Injected;

        struct Expander;
        impl DefinitionHook for Expander {
            fn process(&self, registry: &mut DefinitionRegistry) -> Result<()> {
                registry.register(
                    Definition::builder::<Injected>("injected")
                        .constructor(|_| Ok(Injected))
                        .build(),
                    false,
                )
            }
        }

        let container = Container::new();
        container.register_definition_hook(Arc::new(Expander));
        container.start().unwrap();

        assert!(container.resolve::<Injected>().is_ok());
    }

    #[test]
    fn before_init_replacement_skips_init() {
        static INIT_RAN: AtomicU32 = AtomicU32::new(0);

        struct Greeting {
            text: &'static str,
        }

        struct Replacer;
        impl InstanceHook for Replacer {
            fn before_init(
                &self,
                definition: &Definition,
                _instance: &AnyInstance,
            ) -> Result<Option<AnyInstance>> {
                if definition.id == "greeting" {
                    Ok(Some(Arc::new(Greeting { text: "replaced" })))
                } else {
                    Ok(None)
                }
            }
        }

        let container = Container::new();
        container.register_instance_hook(Arc::new(Replacer));
        container
            .register_definition(
                Definition::builder::<Greeting>("greeting")
                    .constructor(|_| Ok(Greeting { text: "original" }))
                    .on_init("warm_up", |_| {
                        INIT_RAN.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    })
                    .build(),
            )
            .unwrap();
        container.start().unwrap();

        let greeting = container.resolve::<Greeting>().unwrap();
        assert_eq!(greeting.text, "replaced");
        assert_eq!(INIT_RAN.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn init_callback_runs_after_population() {
        struct Pool {
            warmed: AtomicU32,
        }

        let container = Container::new();
        container
            .register_definition(
                Definition::builder::<Pool>("pool")
                    .constructor(|_| {
                        Ok(Pool {
                            warmed: AtomicU32::new(0),
                        })
                    })
                    .on_init("warm_up", |pool| {
                        pool.warmed.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    })
                    .build(),
            )
            .unwrap();
        container.start().unwrap();

        let pool = container.resolve::<Pool>().unwrap();
        assert_eq!(pool.warmed.load(Ordering::SeqCst), 1);
    }

    // =========================================================================
    // Proxying
    // =========================================================================

    trait Greeter: Send + Sync {
        fn greet(&self, name: &str) -> String;
    }

    #[derive(Debug)]
    struct LoudGreeter {
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Greeter for LoudGreeter {
        fn greet(&self, name: &str) -> String {
            self.log.lock().unwrap().push("target".into());
            format!("HELLO {name}")
        }
    }

    struct GreeterProxy {
        target: Arc<dyn Greeter>,
        chain: AdviceChain,
    }

    impl Greeter for GreeterProxy {
        fn greet(&self, name: &str) -> String {
            let target = Arc::clone(&self.target);
            let mut args = name.to_string();
            let result = self
                .chain
                .dispatch("greet", &mut args, &mut |args| {
                    let name = args.downcast_ref::<String>().expect("greet takes a String");
                    Ok(Box::new(target.greet(name)))
                })
                .expect("greet advice failed");
            *result.downcast::<String>().expect("greet returns a String")
        }
    }

    struct Recording {
        tag: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl MethodInterceptor for Recording {
        fn invoke(&self, invocation: &mut MethodInvocation<'_>) -> InvokeResult {
            self.log.lock().unwrap().push(format!("{}:before", self.tag));
            let result = invocation.proceed();
            self.log.lock().unwrap().push(format!("{}:after", self.tag));
            result
        }
    }

    fn greeter_def(log: &Arc<Mutex<Vec<String>>>) -> Definition {
        let log = Arc::clone(log);
        Definition::builder::<LoudGreeter>("greeter")
            .constructor(move |_| Ok(LoudGreeter { log: log.clone() }))
            .implements::<dyn Greeter>(|g| g)
            .proxied::<dyn Greeter, _>(&["greet"], |target, chain| {
                Arc::new(GreeterProxy {
                    target: target as Arc<dyn Greeter>,
                    chain,
                })
            })
            .build()
    }

    fn recording_advisor(
        tag: &'static str,
        priority: i32,
        log: &Arc<Mutex<Vec<String>>>,
    ) -> Arc<dyn Advisor> {
        Arc::new(
            DefaultAdvisor::new(
                Arc::new(MethodNamePointcut::new(&["greet"])),
                Arc::new(Recording {
                    tag,
                    log: Arc::clone(log),
                }),
            )
            .with_priority(priority),
        )
    }

    #[test]
    fn advice_runs_in_priority_order_around_target() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let container = Container::new();
        container.register_definition(greeter_def(&log)).unwrap();
        container.register_advisor(recording_advisor("one", 1, &log));
        container.register_advisor(recording_advisor("two", 2, &log));
        container.start().unwrap();

        let greeter = container.resolve_trait::<dyn Greeter>().unwrap();
        assert_eq!(greeter.greet("ada"), "HELLO ada");
        assert_eq!(
            *log.lock().unwrap(),
            vec!["one:before", "two:before", "target", "two:after", "one:after"]
        );
    }

    #[test]
    fn no_matching_advisor_means_no_proxy() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let container = Container::new();
        container.register_definition(greeter_def(&log)).unwrap();
        // An advisor for some other method never matches the greeter.
        let advisor: Arc<dyn Advisor> = Arc::new(DefaultAdvisor::new(
            Arc::new(MethodNamePointcut::new(&["flush"])),
            Arc::new(Recording {
                tag: "unused",
                log: Arc::clone(&log),
            }),
        ));
        container.register_advisor(advisor);
        container.start().unwrap();

        // The exposed instance IS the raw instance: resolution by concrete
        // type still works and points at the same allocation.
        let concrete = container.resolve::<LoudGreeter>().unwrap();
        let as_iface = container.resolve_trait::<dyn Greeter>().unwrap();
        assert_eq!(
            Arc::as_ptr(&concrete) as *const (),
            Arc::as_ptr(&as_iface) as *const ()
        );
        assert_eq!(as_iface.greet("ada"), "HELLO ada");
    }

    #[test]
    fn proxied_definition_not_resolvable_by_concrete_type() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let container = Container::new();
        container.register_definition(greeter_def(&log)).unwrap();
        container.register_advisor(recording_advisor("one", 1, &log));
        container.start().unwrap();

        let err = container.resolve::<LoudGreeter>().unwrap_err();
        assert!(matches!(err, ContainerError::TypeMismatch { ref id, .. } if id == "greeter"));
    }

    #[test]
    fn early_reference_equals_final_proxy_in_cycles() {
        // The proxied service participates in a setter cycle: its peer must
        // observe exactly the instance later callers see.
        struct Auditor {
            greeter: RwLock<Option<Arc<dyn Greeter>>>,
        }

        let log = Arc::new(Mutex::new(Vec::new()));
        let container = Container::new();

        let audit_log = Arc::clone(&log);
        container
            .register_definition(
                Definition::builder::<LoudGreeter>("greeter")
                    .constructor(move |_| {
                        Ok(LoudGreeter {
                            log: audit_log.clone(),
                        })
                    })
                    .implements::<dyn Greeter>(|g| g)
                    .proxied::<dyn Greeter, _>(&["greet"], |target, chain| {
                        Arc::new(GreeterProxy {
                            target: target as Arc<dyn Greeter>,
                            chain,
                        })
                    })
                    // Close the cycle: the greeter needs the auditor too.
                    .setter::<Auditor, _>(|_greeter, _auditor| {})
                    .build(),
            )
            .unwrap();
        container
            .register_definition(
                Definition::builder::<Auditor>("auditor")
                    .constructor(|_| {
                        Ok(Auditor {
                            greeter: RwLock::new(None),
                        })
                    })
                    .setter_trait::<dyn Greeter, _>(|auditor, greeter| {
                        *auditor.greeter.write().unwrap() = Some(greeter);
                    })
                    .build(),
            )
            .unwrap();
        container.register_advisor(recording_advisor("one", 1, &log));
        container.start().unwrap();

        let via_cycle = container
            .resolve::<Auditor>()
            .unwrap()
            .greeter
            .read()
            .unwrap()
            .clone()
            .unwrap();
        let via_resolve = container.resolve_trait::<dyn Greeter>().unwrap();
        assert!(Arc::ptr_eq(&via_cycle, &via_resolve));

        // And the reference the peer holds is advised.
        log.lock().unwrap().clear();
        via_cycle.greet("ada");
        assert_eq!(
            *log.lock().unwrap(),
            vec!["one:before", "target", "one:after"]
        );
    }

    // =========================================================================
    // Events, teardown, rebind
    // =========================================================================

    #[test]
    fn lifecycle_events_in_order() {
        let events: Arc<Mutex<Vec<LifecycleEvent>>> = Arc::new(Mutex::new(Vec::new()));
        let container = Container::new();

        let sink = Arc::clone(&events);
        container.add_listener(Arc::new(move |event: &LifecycleEvent| {
            sink.lock().unwrap().push(*event);
        }));

        container.start().unwrap();
        container.close().unwrap();

        assert_eq!(
            *events.lock().unwrap(),
            vec![
                LifecycleEvent::DefinitionsFinalized,
                LifecycleEvent::ContainerReady,
                LifecycleEvent::ContainerClosing,
            ]
        );
    }

    #[test]
    fn teardown_reverses_construction_and_survives_failures() {
        let order: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

        struct Base;
        struct Dependent {
            _base: Arc<Base>,
        }

        let container = Container::new();
        let base_order = Arc::clone(&order);
        container
            .register_definition(
                Definition::builder::<Base>("base")
                    .constructor(|_| Ok(Base))
                    .on_destroy("shutdown", move |_| {
                        base_order.lock().unwrap().push("base");
                        Ok(())
                    })
                    .build(),
            )
            .unwrap();
        let dependent_order = Arc::clone(&order);
        container
            .register_definition(
                Definition::builder::<Dependent>("dependent")
                    .depends_on::<Base>()
                    .constructor(|deps| {
                        Ok(Dependent {
                            _base: deps.take::<Base>(0)?,
                        })
                    })
                    .on_destroy("shutdown", move |_| {
                        dependent_order.lock().unwrap().push("dependent");
                        Err("teardown glitch".into())
                    })
                    .build(),
            )
            .unwrap();
        container.start().unwrap();

        let err = container.close().unwrap_err();
        match err {
            ContainerError::Destruction { failures } => {
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].definition_id, "dependent");
            }
            other => panic!("expected aggregate destruction report, got: {other}"),
        }
        // Dependent destroyed before base; base still destroyed after the failure.
        assert_eq!(*order.lock().unwrap(), vec!["dependent", "base"]);
    }

    #[test]
    fn hot_rebind_destroys_then_rebuilds() {
        static DESTROYED: AtomicU32 = AtomicU32::new(0);

        struct Endpoint {
            port: u16,
        }

        fn endpoint_def(port: u16) -> Definition {
            Definition::builder::<Endpoint>("endpoint")
                .constructor(move |_| Ok(Endpoint { port }))
                .on_destroy("shutdown", |_| {
                    DESTROYED.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .build()
        }

        let container = Container::new();
        container.register_definition(endpoint_def(8080)).unwrap();
        container.start().unwrap();
        assert_eq!(container.resolve::<Endpoint>().unwrap().port, 8080);

        assert!(container.remove_definition("endpoint").unwrap());
        assert_eq!(DESTROYED.load(Ordering::SeqCst), 1);
        assert!(container.resolve::<Endpoint>().is_err());

        container.register_definition(endpoint_def(9090)).unwrap();
        assert_eq!(container.resolve::<Endpoint>().unwrap().port, 9090);
    }

    #[test]
    fn custom_scope_routes_through_plugin() {
        struct Session {
            id: u32,
        }

        static NEXT: AtomicU32 = AtomicU32::new(0);

        let container = Container::new();
        container.register_scope("thread", Arc::new(ThreadScope::new()));
        container
            .register_definition(
                Definition::builder::<Session>("session")
                    .constructor(|_| {
                        Ok(Session {
                            id: NEXT.fetch_add(1, Ordering::SeqCst),
                        })
                    })
                    .scope(Scope::Custom("thread".into()))
                    .build(),
            )
            .unwrap();
        container.start().unwrap();

        let a = container.resolve::<Session>().unwrap();
        let b = container.resolve::<Session>().unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        let other = {
            let container = container.clone();
            std::thread::spawn(move || container.resolve::<Session>().unwrap().id)
                .join()
                .unwrap()
        };
        assert_ne!(a.id, other);
    }
}
