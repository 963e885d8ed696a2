use derive_more::Display;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error raised by cache backends and the fallback facade.
///
/// The variants form a fixed taxonomy: `ConnectionFailure`, `SystemFailure`
/// and `DataAccess` are the infrastructure kinds that trigger degradation to
/// the local tier; everything else crosses the facade boundary unchanged.
#[derive(Debug, Error, Display, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[display("Backend connection failure: {}", _0)]
    ConnectionFailure(String),

    #[display("Backend system failure: {}", _0)]
    SystemFailure(String),

    #[display("Data access failure: {}", _0)]
    DataAccess(String),

    #[display("Loader failed for key '{}': {}", key, reason)]
    Loader { key: String, reason: String },

    #[display("Serialization error: {}", _0)]
    Serialization(String),

    #[display("Configuration error: {}", _0)]
    Configuration(String),

    #[display("Internal error: {}", _0)]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, CacheError>;
