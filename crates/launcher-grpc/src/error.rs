// ABOUTME: Error types for the launcher-grpc crate.
// ABOUTME: Provides structured errors for channel, authentication, and stream operations.

use thiserror::Error;
use tonic::Code;

/// Errors that can occur talking to the broker.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GrpcClientError {
    /// Invalid server address format.
    #[error("invalid server address: {0}")]
    InvalidAddress(String),

    /// Failed to connect to the server.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// The broker refused our credentials.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The duplex stream is gone; every later read or write fails the same way.
    #[error("stream ended: {0}")]
    StreamEnded(String),

    /// Any other RPC failure.
    #[error("rpc failed: {0}")]
    Rpc(String),
}

impl GrpcClientError {
    /// Whether this error means the duplex stream has ended.
    pub fn is_stream_ended(&self) -> bool {
        matches!(self, GrpcClientError::StreamEnded(_))
    }
}

impl From<tonic::Status> for GrpcClientError {
    fn from(status: tonic::Status) -> Self {
        match status.code() {
            Code::Unauthenticated | Code::PermissionDenied => {
                GrpcClientError::AuthenticationFailed(status.message().to_string())
            }
            Code::Unavailable => GrpcClientError::ConnectionFailed(status.message().to_string()),
            _ => GrpcClientError::Rpc(status.to_string()),
        }
    }
}

impl From<tonic::transport::Error> for GrpcClientError {
    fn from(err: tonic::transport::Error) -> Self {
        GrpcClientError::ConnectionFailed(err.to_string())
    }
}
