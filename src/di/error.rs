//! Error taxonomy for the dependency injection subsystem.

use thiserror::Error;

/// Boxed error returned by user supplied factories, teardowns and hooks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised by registries, containers and dependency expressions.
#[derive(Debug, Error)]
pub enum DiError {
    /// An operation was attempted on a container that has already been closed.
    #[error("the container is closed")]
    ContainerClosed,

    /// A dependency requires itself, directly or through other dependencies.
    #[error("{message}")]
    CircularDependency { message: String },

    /// A dependency is unknown to the container chain, or could not be built.
    #[error("{message}")]
    DependencyNotSatisfiable {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// A registry was mutated while a live container was built from it.
    #[error("the registry is frozen - a container built from it is still open")]
    RegistryFrozen,

    /// A graph edge referenced a node that was never declared.
    #[error("node {id} is not in the graph")]
    UnknownNode { id: String },

    /// A factory declared a parameter that cannot be dependency injected.
    #[error("invalid factory for {id}: {message}")]
    InvalidFactory { id: String, message: String },

    /// A resolved value was not of the type it was requested as.
    #[error("dependency {id} is not of type {expected}")]
    TypeMismatch { id: String, expected: &'static str },

    /// An argument was read from an argument set that does not hold it.
    #[error("no value available for argument {name:?}")]
    MissingArgument { name: String },

    /// A teardown callable failed while its container was closing.
    #[error("teardown for dependency {id} failed")]
    Teardown {
        id: String,
        #[source]
        source: BoxError,
    },
}

impl DiError {
    pub(crate) fn not_satisfiable(message: impl Into<String>) -> Self {
        Self::DependencyNotSatisfiable {
            message: message.into(),
            source: None,
        }
    }

    pub(crate) fn not_satisfiable_from(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::DependencyNotSatisfiable {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub(crate) fn circular(message: impl Into<String>) -> Self {
        Self::CircularDependency {
            message: message.into(),
        }
    }
}

/// Convenience `Result` type for dependency injection operations.
pub type DiResult<T> = std::result::Result<T, DiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_not_satisfiable_chains_source() {
        let inner = DiError::not_satisfiable("inner failure");
        let outer = DiError::not_satisfiable_from("could not create dependency \"a\"", inner);

        assert_eq!(outer.to_string(), "could not create dependency \"a\"");
        let source = outer.source().map(ToString::to_string);
        assert_eq!(source.as_deref(), Some("inner failure"));
    }
}
