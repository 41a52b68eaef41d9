//! Proxy engine
//!
//! Matches registered advisors (pointcut + interception behavior) against a
//! candidate instance's declared methods and, when any match, asks the
//! definition's proxy binding to compose a delegating interface proxy around
//! the target. Interception itself is a chain of responsibility over a join
//! point: each interceptor may run logic, short-circuit, or call `proceed` to
//! continue inward, with the innermost `proceed` invoking the real method.
//!
//! Proxies are hand-composed delegating structs — the proxy holds the target
//! trait object plus an [`AdviceChain`] and routes each intercepted method
//! through [`AdviceChain::dispatch`]. There is no bytecode generation and no
//! subclassing: a type that advisors match but that declares no proxy binding
//! is a hard [`ProxyCreationFailure`](crate::ContainerError::ProxyCreationFailure).

use crate::definition::{AnyInstance, Definition};
use crate::error::{BoxError, ContainerError, Result};
use crate::hooks::InstanceHook;
use ahash::RandomState;
use dashmap::{DashMap, DashSet};
use once_cell::sync::OnceCell;
use std::any::Any;
use std::sync::{Arc, Mutex};

#[cfg(feature = "logging")]
use tracing::{debug, trace};

/// Type-erased return value of an intercepted method call
pub type AnyValue = Box<dyn Any + Send>;

/// Result of running an interceptor chain or the real target method
pub type InvokeResult = std::result::Result<AnyValue, BoxError>;

/// Predicate over join points: which types and methods an advisor applies to
pub trait Pointcut: Send + Sync {
    /// Coarse filter on the target type; defaults to matching every type
    fn matches_type(&self, _type_name: &str) -> bool {
        true
    }

    /// Fine filter on one method of the target type
    fn matches_method(&self, type_name: &str, method: &str) -> bool;
}

/// Pointcut matching an explicit set of method names on any type
pub struct MethodNamePointcut {
    methods: Vec<&'static str>,
}

impl MethodNamePointcut {
    pub fn new(methods: &[&'static str]) -> Self {
        Self {
            methods: methods.to_vec(),
        }
    }
}

impl Pointcut for MethodNamePointcut {
    fn matches_method(&self, _type_name: &str, method: &str) -> bool {
        self.methods.iter().any(|m| *m == method)
    }
}

/// Pointcut delegating to a predicate closure over `(type_name, method)`
pub struct FnPointcut<F>(pub F);

impl<F> Pointcut for FnPointcut<F>
where
    F: Fn(&str, &str) -> bool + Send + Sync,
{
    fn matches_method(&self, type_name: &str, method: &str) -> bool {
        (self.0)(type_name, method)
    }
}

/// Behavior to run around a matched method call
pub trait MethodInterceptor: Send + Sync {
    /// Run advice around the join point. Call
    /// [`proceed`](MethodInvocation::proceed) to continue to the next
    /// interceptor (and ultimately the real method), or return without
    /// proceeding to short-circuit.
    fn invoke(&self, invocation: &mut MethodInvocation<'_>) -> InvokeResult;
}

/// Pairs a pointcut with the advice to run at matched join points
pub trait Advisor: Send + Sync {
    fn pointcut(&self) -> &dyn Pointcut;
    fn advice(&self) -> Arc<dyn MethodInterceptor>;

    /// Lower runs outermost; ties break by registration order
    fn priority(&self) -> i32 {
        0
    }
}

/// The common advisor shape: a pointcut, an interceptor, and a priority
pub struct DefaultAdvisor {
    pointcut: Arc<dyn Pointcut>,
    advice: Arc<dyn MethodInterceptor>,
    priority: i32,
}

impl DefaultAdvisor {
    pub fn new(pointcut: Arc<dyn Pointcut>, advice: Arc<dyn MethodInterceptor>) -> Self {
        Self {
            pointcut,
            advice,
            priority: 0,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

impl Advisor for DefaultAdvisor {
    fn pointcut(&self) -> &dyn Pointcut {
        &*self.pointcut
    }

    fn advice(&self) -> Arc<dyn MethodInterceptor> {
        Arc::clone(&self.advice)
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}

/// One in-flight intercepted call.
///
/// Every `proceed` creates a fresh cursor for the inner segment of the
/// chain, so an interceptor may call `proceed` more than once (retry advice)
/// and concurrent invocations never share chain position.
pub struct MethodInvocation<'a> {
    method: &'a str,
    target_type: &'static str,
    args: &'a mut (dyn Any + Send),
    interceptors: &'a [Arc<dyn MethodInterceptor>],
    cursor: usize,
    terminal: &'a mut dyn FnMut(&mut (dyn Any + Send)) -> InvokeResult,
}

impl<'a> MethodInvocation<'a> {
    /// Name of the intercepted method
    #[inline]
    pub fn method(&self) -> &str {
        self.method
    }

    /// Type name of the proxied target
    #[inline]
    pub fn target_type(&self) -> &'static str {
        self.target_type
    }

    /// Borrow the call arguments, typed
    #[inline]
    pub fn args<A: 'static>(&self) -> Option<&A> {
        self.args.downcast_ref::<A>()
    }

    /// Mutably borrow the call arguments, typed (advice may rewrite them)
    #[inline]
    pub fn args_mut<A: 'static>(&mut self) -> Option<&mut A> {
        self.args.downcast_mut::<A>()
    }

    /// Continue to the next interceptor, or to the real target method once
    /// the chain is exhausted.
    pub fn proceed(&mut self) -> InvokeResult {
        if self.cursor < self.interceptors.len() {
            let interceptor = Arc::clone(&self.interceptors[self.cursor]);
            let mut inner = MethodInvocation {
                method: self.method,
                target_type: self.target_type,
                args: &mut *self.args,
                interceptors: self.interceptors,
                cursor: self.cursor + 1,
                terminal: &mut *self.terminal,
            };
            interceptor.invoke(&mut inner)
        } else {
            (self.terminal)(&mut *self.args)
        }
    }
}

/// The matched advisors for one proxied instance, with a per-method
/// interceptor-chain cache.
///
/// Held by the hand-composed proxy struct; each intercepted method routes
/// through [`dispatch`](Self::dispatch).
pub struct AdviceChain {
    target_type: &'static str,
    /// Matched advisors in execution order (outermost first)
    advisors: Vec<Arc<dyn Advisor>>,
    /// Per-method interceptor lists, computed on first dispatch
    by_method: DashMap<&'static str, Arc<[Arc<dyn MethodInterceptor>]>, RandomState>,
}

impl AdviceChain {
    pub(crate) fn new(target_type: &'static str, advisors: Vec<Arc<dyn Advisor>>) -> Self {
        Self {
            target_type,
            advisors,
            by_method: DashMap::with_hasher(RandomState::new()),
        }
    }

    fn interceptors_for(&self, method: &'static str) -> Arc<[Arc<dyn MethodInterceptor>]> {
        if let Some(cached) = self.by_method.get(method) {
            return Arc::clone(&cached);
        }
        let computed: Arc<[Arc<dyn MethodInterceptor>]> = self
            .advisors
            .iter()
            .filter(|advisor| {
                advisor
                    .pointcut()
                    .matches_method(self.target_type, method)
            })
            .map(|advisor| advisor.advice())
            .collect::<Vec<_>>()
            .into();
        self.by_method.insert(method, Arc::clone(&computed));
        computed
    }

    /// Whether any advice applies to this method
    #[inline]
    pub fn intercepts(&self, method: &'static str) -> bool {
        !self.interceptors_for(method).is_empty()
    }

    /// Run the matched interceptors around `terminal` (the real method).
    ///
    /// `args` is the type-erased argument bundle the proxy packed for this
    /// call; interceptors see it through
    /// [`MethodInvocation::args`]/[`args_mut`](MethodInvocation::args_mut).
    pub fn dispatch(
        &self,
        method: &'static str,
        args: &mut (dyn Any + Send),
        terminal: &mut dyn FnMut(&mut (dyn Any + Send)) -> InvokeResult,
    ) -> InvokeResult {
        let interceptors = self.interceptors_for(method);

        #[cfg(feature = "logging")]
        trace!(
            target: "wirework",
            target_type = self.target_type,
            method = method,
            interceptors = interceptors.len(),
            "Dispatching intercepted call"
        );

        let mut invocation = MethodInvocation {
            method,
            target_type: self.target_type,
            args,
            interceptors: &interceptors[..],
            cursor: 0,
            terminal,
        };
        invocation.proceed()
    }
}

impl std::fmt::Debug for AdviceChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdviceChain")
            .field("target_type", &self.target_type)
            .field("advisors", &self.advisors.len())
            .finish()
    }
}

/// Matches advisors against candidates and decides whether to substitute a
/// proxy for the raw instance.
pub(crate) struct ProxyEngine {
    /// Advisors registered directly on the container, pre-freeze
    pre_registered: Mutex<Vec<(i32, u64, Arc<dyn Advisor>)>>,
    /// The full advisor set, frozen once at `start()` (pre-registered plus
    /// advisor definitions resolved from the registry)
    frozen: OnceCell<Vec<Arc<dyn Advisor>>>,
}

impl ProxyEngine {
    pub(crate) fn new() -> Self {
        Self {
            pre_registered: Mutex::new(Vec::new()),
            frozen: OnceCell::new(),
        }
    }

    pub(crate) fn register(&self, advisor: Arc<dyn Advisor>) {
        let mut advisors = self.pre_registered.lock().expect("advisor list poisoned");
        let seq = advisors.len() as u64;
        advisors.push((advisor.priority(), seq, advisor));
    }

    fn sorted_pre_registered(&self) -> Vec<Arc<dyn Advisor>> {
        let mut advisors = self
            .pre_registered
            .lock()
            .expect("advisor list poisoned")
            .clone();
        advisors.sort_by_key(|(priority, seq, _)| (*priority, *seq));
        advisors.into_iter().map(|(_, _, advisor)| advisor).collect()
    }

    /// Freeze the advisor set: pre-registered advisors plus the ones
    /// resolved from advisor definitions, priority-sorted. Called once at
    /// `start()`; later calls are ignored.
    pub(crate) fn freeze(&self, from_definitions: Vec<Arc<dyn Advisor>>) {
        let mut combined: Vec<(i32, u64, Arc<dyn Advisor>)> = self
            .pre_registered
            .lock()
            .expect("advisor list poisoned")
            .clone();
        let mut seq = combined.len() as u64;
        for advisor in from_definitions {
            combined.push((advisor.priority(), seq, advisor));
            seq += 1;
        }
        combined.sort_by_key(|(priority, seq, _)| (*priority, *seq));

        #[cfg(feature = "logging")]
        debug!(
            target: "wirework",
            advisors = combined.len(),
            "Advisor set frozen"
        );

        let _ = self
            .frozen
            .set(combined.into_iter().map(|(_, _, advisor)| advisor).collect());
    }

    fn snapshot(&self) -> Vec<Arc<dyn Advisor>> {
        match self.frozen.get() {
            Some(frozen) => frozen.clone(),
            None => self.sorted_pre_registered(),
        }
    }

    /// Decide whether `candidate` gets a proxy.
    ///
    /// Returns `Ok(None)` when no advisor matches — the fast path allocates
    /// nothing and the caller keeps the raw instance. A match against a
    /// definition without a proxy binding is a hard error.
    pub(crate) fn maybe_wrap(
        &self,
        definition: &Definition,
        candidate: &AnyInstance,
    ) -> Result<Option<AnyInstance>> {
        if definition.methods.is_empty() {
            return Ok(None);
        }
        let advisors = self.snapshot();
        let mut matched: Vec<Arc<dyn Advisor>> = Vec::new();
        for advisor in advisors {
            let pointcut = advisor.pointcut();
            if pointcut.matches_type(definition.type_name)
                && definition
                    .methods
                    .iter()
                    .any(|method| pointcut.matches_method(definition.type_name, method))
            {
                matched.push(advisor);
            }
        }
        if matched.is_empty() {
            return Ok(None);
        }

        let binding = definition.proxy.as_ref().ok_or_else(|| {
            ContainerError::proxy_creation(
                &definition.id,
                format!(
                    "{} advisor(s) match its declared methods but the definition \
                     has no proxy binding",
                    matched.len()
                ),
            )
        })?;

        #[cfg(feature = "logging")]
        debug!(
            target: "wirework",
            definition = %definition.id,
            interface = binding.interface_name,
            advisors = matched.len(),
            "Substituting interface proxy"
        );

        let chain = AdviceChain::new(definition.type_name, matched);
        let proxy = (binding.bind)(candidate, chain)
            .map_err(|source| ContainerError::proxy_creation(&definition.id, source.to_string()))?;
        Ok(Some(proxy))
    }
}

/// The instance hook that plugs the proxy engine into the build protocol.
///
/// Runs last among after-init hooks. The early-reference path applies the
/// same wrap decision and records the id so after-init never wraps twice —
/// the early and final exposed references are identical.
pub(crate) struct ProxyHook {
    engine: Arc<ProxyEngine>,
    early_wrapped: DashSet<String, RandomState>,
}

impl ProxyHook {
    pub(crate) fn new(engine: Arc<ProxyEngine>) -> Self {
        Self {
            engine,
            early_wrapped: DashSet::with_hasher(RandomState::new()),
        }
    }
}

impl InstanceHook for ProxyHook {
    fn priority(&self) -> i32 {
        i32::MAX
    }

    fn after_init(&self, definition: &Definition, instance: AnyInstance) -> Result<AnyInstance> {
        if self.early_wrapped.remove(definition.id.as_str()).is_some() {
            // Already wrapped on the early-reference path; the builder swaps
            // in the early reference as the exposed instance.
            return Ok(instance);
        }
        match self.engine.maybe_wrap(definition, &instance)? {
            Some(proxy) => Ok(proxy),
            None => Ok(instance),
        }
    }

    fn early_reference(
        &self,
        definition: &Definition,
        instance: AnyInstance,
    ) -> Result<AnyInstance> {
        match self.engine.maybe_wrap(definition, &instance)? {
            Some(proxy) => {
                self.early_wrapped.insert(definition.id.clone());
                Ok(proxy)
            }
            None => Ok(instance),
        }
    }
}
