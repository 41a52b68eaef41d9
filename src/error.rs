//! Error types for the container

use thiserror::Error;

/// Boxed error produced by user-supplied callbacks (constructors, factory
/// methods, init/destroy callbacks, setter applications).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur during registration, resolution, or teardown
#[derive(Error, Debug)]
pub enum ContainerError {
    /// A definition with the same id is already registered
    #[error("duplicate definition: '{id}' is already registered")]
    DuplicateDefinition { id: String },

    /// A resolution request matched zero candidate definitions
    #[error("no definition found for type {type_name}{}", fmt_qualifier(.qualifier))]
    NoSuchDefinition {
        type_name: String,
        qualifier: Option<String>,
    },

    /// A resolution request matched more than one candidate and no qualifier
    /// or primary marker disambiguates
    #[error("ambiguous definition for type {type_name}: candidates are {candidates:?}")]
    AmbiguousDefinition {
        type_name: String,
        candidates: Vec<String>,
    },

    /// A dependency cycle that cannot be broken by an early reference
    /// (constructor injection, or any cycle through a non-singleton)
    #[error("unresolvable dependency cycle: {}", .path.join(" -> "))]
    UnresolvableCycle { path: Vec<String> },

    /// The target's own constructor, setter, or init callback failed
    #[error("failed to construct '{id}': {source}")]
    ConstructionFailure {
        id: String,
        #[source]
        source: BoxError,
    },

    /// Advisors matched a candidate but no proxy could be built for it
    #[error("cannot create proxy for '{id}': {reason}")]
    ProxyCreationFailure { id: String, reason: String },

    /// The definition exists but its instance cannot be exposed as the
    /// requested type (e.g. resolving a proxied component by its concrete type)
    #[error("instance of '{id}' cannot be exposed as {requested}")]
    TypeMismatch { id: String, requested: &'static str },

    /// A definition declared a custom scope that was never registered
    #[error("unknown scope '{scope}' required by definition '{id}'")]
    UnknownScope { id: String, scope: String },

    /// A lazy provider outlived the container it was created from
    #[error("container has been dropped or closed")]
    ContainerClosed,

    /// One or more destroy callbacks failed during `close()`; teardown
    /// continued past every failure and the failures are reported together
    #[error("{} destruction callback(s) failed", .failures.len())]
    Destruction { failures: Vec<DestructionFailure> },
}

fn fmt_qualifier(qualifier: &Option<String>) -> String {
    match qualifier {
        Some(q) => format!(" (qualifier '{q}')"),
        None => String::new(),
    }
}

impl ContainerError {
    /// Create a NoSuchDefinition error for a requested type
    #[inline]
    pub fn no_such_definition(type_name: &str, qualifier: Option<&str>) -> Self {
        Self::NoSuchDefinition {
            type_name: type_name.to_string(),
            qualifier: qualifier.map(str::to_string),
        }
    }

    /// Create a ConstructionFailure wrapping a user callback error
    #[inline]
    pub fn construction(id: &str, source: impl Into<BoxError>) -> Self {
        Self::ConstructionFailure {
            id: id.to_string(),
            source: source.into(),
        }
    }

    /// Create a ProxyCreationFailure with a descriptive reason
    #[inline]
    pub fn proxy_creation(id: &str, reason: impl Into<String>) -> Self {
        Self::ProxyCreationFailure {
            id: id.to_string(),
            reason: reason.into(),
        }
    }
}

/// A single failed destroy callback, collected during best-effort teardown
#[derive(Debug)]
pub struct DestructionFailure {
    /// Definition whose destroy callback failed
    pub definition_id: String,
    /// The error raised by the callback
    pub source: BoxError,
}

impl std::fmt::Display for DestructionFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "destroying '{}': {}", self.definition_id, self.source)
    }
}

/// Result type alias for container operations
pub type Result<T> = std::result::Result<T, ContainerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_error_renders_path() {
        let err = ContainerError::UnresolvableCycle {
            path: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "unresolvable dependency cycle: a -> b -> a");
    }

    #[test]
    fn no_such_definition_includes_qualifier() {
        let err = ContainerError::no_such_definition("app::Database", Some("replica"));
        assert!(err.to_string().contains("replica"));

        let bare = ContainerError::no_such_definition("app::Database", None);
        assert!(!bare.to_string().contains("qualifier"));
    }

    #[test]
    fn construction_failure_preserves_source() {
        let err = ContainerError::construction("db", "connection refused".to_string());
        assert!(err.to_string().contains("db"));
        assert!(err.to_string().contains("connection refused"));
    }
}
