use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failure reported by a [`Storage`](crate::storage::Storage) implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct StorageError(pub String);

impl StorageError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("{0}")]
    InvalidRequest(String),
    #[error("invalid cache configuration: {0}")]
    InvalidConfiguration(String),
    #[error("policy {name} not found")]
    NotFound { name: String },
    #[error("failed to decode {name}: {reason}")]
    Decode { name: String, reason: String },
    #[error("failed to encode {name}: {reason}")]
    Encode { name: String, reason: String },
    #[error("failed to convert cache-type to {cache_type}: {source}")]
    Conversion {
        cache_type: &'static str,
        #[source]
        source: Box<Error>,
    },
    #[error("storage {context}: {source}")]
    Storage {
        context: String,
        #[source]
        source: StorageError,
    },
}

impl Error {
    pub(crate) fn not_found(name: &str) -> Self {
        Self::NotFound {
            name: name.to_string(),
        }
    }

    pub(crate) fn storage(context: impl Into<String>, source: StorageError) -> Self {
        Self::Storage {
            context: context.into(),
            source,
        }
    }

    /// Whether the routing layer should classify this failure as "invalid request".
    pub fn is_invalid_request(&self) -> bool {
        match self {
            Error::InvalidRequest(_) | Error::InvalidConfiguration(_) => true,
            Error::Conversion { source, .. } => source.is_invalid_request(),
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}
