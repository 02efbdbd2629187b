//! Error types and result types for driver operations.
//!
//! Every fallible operation in the driver returns [`DriverResult<T>`]. Errors are
//! surfaced to the immediate caller; nothing in the driver retries or swallows them.

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// Represents all possible errors that can occur while building a connection
/// or dispatching a command against the database engine.
#[derive(Error, Debug)]
pub enum DriverError {
    /// The configuration is missing a mandatory field or holds an unusable value.
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// The engine could not be reached, or rejected the credentials.
    #[error("Connection error: {0}")]
    Connection(String),
    /// A raw command was requested that the engine handle does not provide.
    #[error("Unsupported command: {0}")]
    UnsupportedCommand(String),
    /// The engine reported a failure while executing a mapped command.
    /// The first argument is the command name, the second the engine's message.
    #[error("Engine operation {0} failed: {1}")]
    EngineOperation(String, String),
    /// The operation is declared but has no document-store implementation.
    #[error("Not implemented: {0}")]
    Unimplemented(String),
    /// A call descriptor carried options that do not fit the command.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    /// Conversion between BSON, JSON and Rust types failed.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl DriverError {
    /// Builds an [`DriverError::EngineOperation`] for the given command.
    pub fn engine(command: &str, message: impl ToString) -> Self {
        DriverError::EngineOperation(command.to_string(), message.to_string())
    }
}

/// A specialized `Result` type for driver operations.
pub type DriverResult<T> = Result<T, DriverError>;

impl From<BsonError> for DriverError {
    fn from(err: BsonError) -> Self {
        DriverError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for DriverError {
    fn from(err: SerdeJsonError) -> Self {
        DriverError::Serialization(err.to_string())
    }
}
