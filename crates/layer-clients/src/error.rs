//! Error types for layer-clients

use thiserror::Error;

/// Errors returned by the service clients.
///
/// `operation` names the remote call (`start_build`, `get_object`, ...) so a
/// message is self-describing without the surrounding call stack.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The addressed object or record does not exist
    #[error("object not found: {key}")]
    NotFound { key: String },

    /// The service understood the request and refused it
    #[error("{operation} rejected: {message}")]
    Rejected {
        operation: &'static str,
        message: String,
    },

    /// The request never produced a service answer (network, credentials, throttling)
    #[error("{operation} failed: {message}")]
    Transport {
        operation: &'static str,
        message: String,
    },

    /// The service answered with something this client cannot interpret
    #[error("{operation} returned a malformed response: {message}")]
    Malformed {
        operation: &'static str,
        message: String,
    },
}
