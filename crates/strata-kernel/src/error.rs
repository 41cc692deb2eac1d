//! VFS error types.

use std::io;
use strata_types::Capability;
use thiserror::Error;

/// Boxed lower-level cause carried by [`VfsError::Access`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// VFS error type.
#[derive(Debug, Error)]
pub enum VfsError {
    /// Malformed name, or a resolution outside the requested scope.
    #[error("invalid name {name:?}: {reason}")]
    InvalidName { name: String, reason: String },

    /// Operation outside the file system's capability set.
    #[error("{name}: capability {capability} is not supported")]
    UnsupportedCapability { name: String, capability: Capability },

    /// Backend I/O or resolution failure.
    #[error("cannot access {name}: {source}")]
    Access {
        name: String,
        #[source]
        source: BoxError,
    },

    /// Operation invalid for the current type or stream state.
    #[error("{name}: {reason}")]
    InvalidState { name: String, reason: String },

    /// Existence required but the name resolves imaginary.
    #[error("not found: {0}")]
    NotFound(String),
}

/// The shared connection of a file system was torn down.
#[derive(Debug, Clone, Copy, Error)]
#[error("connection closed")]
pub struct ConnectionClosed;

impl VfsError {
    /// Create an InvalidName error.
    pub fn invalid_name(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidName {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create an UnsupportedCapability error.
    pub fn unsupported(name: impl Into<String>, capability: Capability) -> Self {
        Self::UnsupportedCapability {
            name: name.into(),
            capability,
        }
    }

    /// Create an Access error wrapping `source`.
    pub fn access(name: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Access {
            name: name.into(),
            source: source.into(),
        }
    }

    /// Create an InvalidState error.
    pub fn invalid_state(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidState {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create a NotFound error.
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound(name.into())
    }

    /// Create the Access error reported once a connection is gone.
    pub fn connection_closed(name: impl Into<String>) -> Self {
        Self::access(name, ConnectionClosed)
    }

    /// Wrap into an Access error unless this already is one.
    pub fn into_access(self, name: impl Into<String>) -> Self {
        match self {
            Self::Access { .. } => self,
            other => Self::access(name, other),
        }
    }

    /// Returns true if this error (or its cause) is a closed connection.
    pub fn is_connection_closed(&self) -> bool {
        match self {
            Self::Access { source, .. } => {
                source.is::<ConnectionClosed>()
                    || source
                        .downcast_ref::<VfsError>()
                        .is_some_and(VfsError::is_connection_closed)
            }
            _ => false,
        }
    }
}

/// Convert VfsError to std::io::Error for callers on the std I/O traits.
impl From<VfsError> for io::Error {
    fn from(e: VfsError) -> Self {
        match e {
            VfsError::InvalidName { .. } => io::Error::new(io::ErrorKind::InvalidInput, e),
            VfsError::UnsupportedCapability { .. } => io::Error::new(io::ErrorKind::Unsupported, e),
            VfsError::NotFound(_) => io::Error::new(io::ErrorKind::NotFound, e),
            VfsError::InvalidState { .. } => io::Error::new(io::ErrorKind::InvalidInput, e),
            VfsError::Access { .. } => io::Error::other(e),
        }
    }
}

/// VFS result type.
pub type VfsResult<T> = Result<T, VfsError>;
