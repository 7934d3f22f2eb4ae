//! Error types for the Rainbond component operator

use thiserror::Error;

/// Main error type for component handler operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// An object a resolution step depends on does not exist
    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        /// Kind of the missing object (e.g., "Secret")
        kind: String,
        /// Namespace that was searched
        namespace: String,
        /// Name of the missing object
        name: String,
    },

    /// A secret exists but lacks a key the handler needs
    #[error("secret {namespace}/{name} has no key {key}")]
    MissingSecretKey {
        /// Secret namespace
        namespace: String,
        /// Secret name
        name: String,
        /// Missing data key
        key: String,
    },

    /// A cluster fact needed before assembly could not be resolved
    #[error("failed to resolve {what}: {source}")]
    ConfigResolution {
        /// What was being resolved (e.g., "region database")
        what: String,
        /// The upstream cause
        #[source]
        source: Box<Error>,
    },

    /// Validation error for generated or declared objects
    #[error("validation error: {0}")]
    Validation(String),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Wrap an upstream failure with what was being resolved
    pub fn config_resolution(what: impl Into<String>, source: Error) -> Self {
        Self::ConfigResolution {
            what: what.into(),
            source: Box::new(source),
        }
    }

    /// Create a not-found error for a namespaced object
    pub fn not_found(
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self::NotFound {
            kind: kind.into(),
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Whether the control loop should requeue the pass after this error
    ///
    /// Missing objects and API failures can heal on their own; malformed
    /// input cannot.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube(_) | Error::NotFound { .. } | Error::MissingSecretKey { .. } => true,
            Error::ConfigResolution { source, .. } => source.is_retryable(),
            Error::Validation(_) | Error::Serialization(_) => false,
        }
    }
}
