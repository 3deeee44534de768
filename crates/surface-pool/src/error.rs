//! Error types for surface pooling
use thiserror::Error;

use crate::descriptor::SurfaceDescriptor;
use crate::surface::SurfaceId;

/// Result type for pool operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for surface pool operations.
///
/// Exceeding the configured capacity is deliberately absent: an overrun is a
/// soft condition reported through logging and [`crate::events::PoolEvent`],
/// never as an error return.
#[derive(Error, Debug)]
pub enum Error {
    /// The allocator could not produce a surface. Pool state is unchanged.
    #[error("Allocation failed for {descriptor}: {reason}")]
    AllocationFailed {
        /// The descriptor of the pool that requested the surface
        descriptor: SurfaceDescriptor,
        /// The failure reason
        reason: String,
        /// The underlying allocator error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A surface was handed back in a state the operation does not accept.
    ///
    /// The pool's collections are left untouched when this is returned.
    #[error("Protocol violation for surface {surface_id}: expected {expected}, found {actual}")]
    ProtocolViolation {
        /// The offending surface
        surface_id: SurfaceId,
        /// The state the operation requires
        expected: &'static str,
        /// The state the pool has on record (`unknown` if none)
        actual: &'static str,
    },

    /// Pool configuration is invalid
    #[error("Configuration error: {message}")]
    Configuration {
        /// The error message
        message: String,
    },

    /// A runtime-backed collaborator was built outside a runtime
    #[error("Runtime unavailable: {message}")]
    Runtime {
        /// The error message
        message: String,
    },
}

impl Error {
    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an allocation failure without an underlying source
    pub fn allocation_failed<S: Into<String>>(descriptor: SurfaceDescriptor, reason: S) -> Self {
        Self::AllocationFailed {
            descriptor,
            reason: reason.into(),
            source: None,
        }
    }

    /// Create an allocation failure wrapping the allocator's own error
    pub fn allocation_failed_with<S, E>(descriptor: SurfaceDescriptor, reason: S, source: E) -> Self
    where
        S: Into<String>,
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::AllocationFailed {
            descriptor,
            reason: reason.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Check if the caller may reasonably retry the operation
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::AllocationFailed { .. })
    }

    /// Get the surface associated with this error (if any)
    #[must_use]
    pub fn surface_id(&self) -> Option<SurfaceId> {
        match self {
            Self::ProtocolViolation { surface_id, .. } => Some(*surface_id),
            _ => None,
        }
    }
}
