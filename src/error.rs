//! Error taxonomy for the binding layer.

use thiserror::Error;

/// Errors surfaced across the binding boundary.
#[derive(Error, Debug)]
pub enum RtcError {
    /// A dedicated engine thread could not be started. Fatal for factory construction.
    #[error("failed to start {role} thread: {source}")]
    ThreadStart {
        role: String,
        #[source]
        source: std::io::Error,
    },

    /// The engine declined to produce a factory.
    #[error("failed to create engine factory: {0}")]
    FactoryCreation(String),

    /// The engine declined to produce a peer connection.
    #[error("failed to create peer connection: {0}")]
    ConnectionCreation(String),

    /// A task was handed to a worker that has stopped, or the worker dropped it.
    #[error("worker thread {0} is not running")]
    WorkerStopped(String),

    /// Malformed input at the boundary.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Engine error from an SDP or ICE operation.
    #[error(transparent)]
    Engine(#[from] webrtc::Error),

    /// A report could not be rendered as JSON.
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RtcError>;
