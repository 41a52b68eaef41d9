//! Resolved dependency values
//!
//! The dependency resolver hands construction closures their dependencies as
//! type-erased [`Resolved`] values; [`ResolvedDeps`] adds the typed accessors
//! a constructor uses to take them back out. [`ProviderHandle`] is the
//! deferred variant: it resolves against the container on first use instead
//! of at injection time.

use crate::container::ContainerInner;
use crate::definition::{AnyInstance, DependencyKey};
use crate::error::{BoxError, ContainerError, Result};
use std::sync::{Arc, Weak};

/// A single resolved dependency value, shaped by its declared multiplicity
#[derive(Clone)]
pub enum Resolved {
    /// Exactly one candidate
    One(AnyInstance),
    /// Zero or one candidate
    Optional(Option<AnyInstance>),
    /// Every matching candidate, in registry order
    Collection(Vec<AnyInstance>),
    /// A handle that resolves on first use
    Provider(ProviderHandle),
}

impl Resolved {
    fn shape(&self) -> &'static str {
        match self {
            Self::One(_) => "One",
            Self::Optional(_) => "Optional",
            Self::Collection(_) => "Collection",
            Self::Provider(_) => "Provider",
        }
    }

    /// Take the value as `Arc<T>` for a concrete component type
    pub fn into_one<T: Send + Sync + 'static>(self) -> std::result::Result<Arc<T>, BoxError> {
        match self {
            Self::One(any) => downcast_concrete::<T>(any),
            other => Err(shape_error("One", other.shape())),
        }
    }

    /// Take the value as `Arc<I>` for an interface binding
    pub fn into_one_trait<I: ?Sized + Send + Sync + 'static>(
        self,
    ) -> std::result::Result<Arc<I>, BoxError> {
        match self {
            Self::One(any) => downcast_interface::<I>(any),
            other => Err(shape_error("One", other.shape())),
        }
    }
}

impl std::fmt::Debug for Resolved {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Resolved::{}", self.shape())
    }
}

fn shape_error(expected: &str, found: &str) -> BoxError {
    BoxError::from(format!(
        "dependency shape mismatch: expected {expected}, found {found}"
    ))
}

fn downcast_concrete<T: Send + Sync + 'static>(
    any: AnyInstance,
) -> std::result::Result<Arc<T>, BoxError> {
    any.downcast::<T>().map_err(|_| {
        BoxError::from(format!(
            "resolved value is not a {}",
            std::any::type_name::<T>()
        ))
    })
}

fn downcast_interface<I: ?Sized + Send + Sync + 'static>(
    any: AnyInstance,
) -> std::result::Result<Arc<I>, BoxError> {
    // Interface payloads are stored as Arc<I> re-wrapped behind dyn Any.
    let wrapped = any.downcast::<Arc<I>>().map_err(|_| {
        BoxError::from(format!(
            "resolved value is not bound as {}",
            std::any::type_name::<I>()
        ))
    })?;
    Ok(Arc::clone(&*wrapped))
}

/// The resolved constructor-site dependencies of one definition, in
/// declaration order.
///
/// Values are taken by index; taking the same slot twice is an error, as is
/// asking for a shape the declaration did not use.
pub struct ResolvedDeps {
    slots: Vec<Option<Resolved>>,
}

impl ResolvedDeps {
    pub(crate) fn new(values: Vec<Resolved>) -> Self {
        Self {
            slots: values.into_iter().map(Some).collect(),
        }
    }

    /// Number of constructor-site dependencies
    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether there are no constructor-site dependencies
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn take_slot(&mut self, index: usize) -> std::result::Result<Resolved, BoxError> {
        let declared = self.slots.len();
        self.slots
            .get_mut(index)
            .ok_or_else(|| {
                BoxError::from(format!(
                    "constructor argument {index} out of range ({declared} declared)"
                ))
            })?
            .take()
            .ok_or_else(|| BoxError::from(format!("constructor argument {index} already taken")))
    }

    /// Take slot `index` as `Arc<T>` (declared with `depends_on`)
    pub fn take<T: Send + Sync + 'static>(
        &mut self,
        index: usize,
    ) -> std::result::Result<Arc<T>, BoxError> {
        self.take_slot(index)?.into_one::<T>()
    }

    /// Take slot `index` as `Arc<I>` (declared with `depends_on_trait`)
    pub fn take_trait<I: ?Sized + Send + Sync + 'static>(
        &mut self,
        index: usize,
    ) -> std::result::Result<Arc<I>, BoxError> {
        self.take_slot(index)?.into_one_trait::<I>()
    }

    /// Take slot `index` as `Option<Arc<T>>` (declared with `depends_on_optional`)
    pub fn take_optional<T: Send + Sync + 'static>(
        &mut self,
        index: usize,
    ) -> std::result::Result<Option<Arc<T>>, BoxError> {
        match self.take_slot(index)? {
            Resolved::Optional(Some(any)) => downcast_concrete::<T>(any).map(Some),
            Resolved::Optional(None) => Ok(None),
            other => Err(shape_error("Optional", other.shape())),
        }
    }

    /// Take slot `index` as `Vec<Arc<T>>` (declared with `depends_on_all`)
    pub fn take_all<T: Send + Sync + 'static>(
        &mut self,
        index: usize,
    ) -> std::result::Result<Vec<Arc<T>>, BoxError> {
        match self.take_slot(index)? {
            Resolved::Collection(items) => items.into_iter().map(downcast_concrete::<T>).collect(),
            other => Err(shape_error("Collection", other.shape())),
        }
    }

    /// Take slot `index` as `Vec<Arc<I>>` (declared with `depends_on_all_traits`)
    pub fn take_all_traits<I: ?Sized + Send + Sync + 'static>(
        &mut self,
        index: usize,
    ) -> std::result::Result<Vec<Arc<I>>, BoxError> {
        match self.take_slot(index)? {
            Resolved::Collection(items) => {
                items.into_iter().map(downcast_interface::<I>).collect()
            }
            other => Err(shape_error("Collection", other.shape())),
        }
    }

    /// Take slot `index` as a lazy provider (declared with `depends_on_provider`)
    pub fn take_provider(
        &mut self,
        index: usize,
    ) -> std::result::Result<ProviderHandle, BoxError> {
        match self.take_slot(index)? {
            Resolved::Provider(handle) => Ok(handle),
            other => Err(shape_error("Provider", other.shape())),
        }
    }
}

/// A deferred dependency: resolves against the owning container on first
/// use, never at injection time.
///
/// Holds the container weakly so stored providers cannot keep a dropped
/// container alive; a handle that outlives its container reports
/// [`ContainerClosed`](ContainerError::ContainerClosed).
#[derive(Clone)]
pub struct ProviderHandle {
    inner: Weak<ContainerInner>,
    key: DependencyKey,
}

impl ProviderHandle {
    pub(crate) fn new(inner: Weak<ContainerInner>, key: DependencyKey) -> Self {
        Self { inner, key }
    }

    fn container(&self) -> Result<crate::Container> {
        self.inner
            .upgrade()
            .map(crate::Container::from_inner)
            .ok_or(ContainerError::ContainerClosed)
    }

    /// Resolve the target as a concrete component, constructing it on demand
    pub fn get<T: Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        self.container()?.resolve_key_concrete::<T>(&self.key)
    }

    /// Resolve the target as an interface binding, constructing it on demand
    pub fn get_trait<I: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<I>> {
        self.container()?.resolve_key_interface::<I>(&self.key)
    }

    /// The dependency key this provider resolves
    #[inline]
    pub fn key(&self) -> &DependencyKey {
        &self.key
    }
}

impl std::fmt::Debug for ProviderHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ProviderHandle({})", self.key.type_name)
    }
}
