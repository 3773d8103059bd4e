// ABOUTME: Error types for the function launcher.
// ABOUTME: LauncherError for session and loop failures, CallError and StartFailure for per-call failures.

use std::time::Duration;

use launcher_grpc::GrpcClientError;
use thiserror::Error;

/// Errors that end a session or stop the launcher.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LauncherError {
    /// The broker refused our credentials or bearer token.
    #[error("broker authentication failed: {0}")]
    BrokerAuthentication(String),

    /// The duplex stream failed or completed.
    #[error("broker stream ended: {0}")]
    StreamEnded(String),

    /// The broker announced it will drop the stream.
    #[error("broker requested a reconnect ({0}s until disconnect)")]
    ReconnectRequested(i32),

    /// Could not reach the broker.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The function catalog could not be loaded.
    #[error("catalog error: {0}")]
    Catalog(String),

    /// Invalid configuration.
    #[error("config error: {0}")]
    Config(String),
}

impl LauncherError {
    /// Errors the dispatch loop answers with a reconnect.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            LauncherError::StreamEnded(_) | LauncherError::ReconnectRequested(_)
        )
    }
}

impl From<GrpcClientError> for LauncherError {
    fn from(err: GrpcClientError) -> Self {
        match err {
            GrpcClientError::AuthenticationFailed(msg) => LauncherError::BrokerAuthentication(msg),
            GrpcClientError::StreamEnded(msg) => LauncherError::StreamEnded(msg),
            GrpcClientError::InvalidAddress(msg) => LauncherError::Config(msg),
            GrpcClientError::ConnectionFailed(msg) | GrpcClientError::Rpc(msg) => {
                LauncherError::Connection(msg)
            }
        }
    }
}

/// Why the execution backend did not start a function.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StartFailure {
    /// The request never got an answer (connect error, I/O error, client timeout).
    #[error("executor request failed: {0}")]
    Request(String),

    /// The executor answered with a non-success status.
    #[error("executor rejected the start ({status}): {body}")]
    Rejected { status: u16, body: String },

    /// The start call did not finish within the dispatch timeout.
    #[error("executor did not answer within {0:?}")]
    TimedOut(Duration),
}

/// Per-call failures. Reported back to the broker, never fatal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    #[error("function {0} is not offered by this launcher")]
    UnknownFunction(String),

    #[error("function {function_id} could not be started: {source}")]
    NotStarted {
        function_id: String,
        #[source]
        source: StartFailure,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_errors() {
        assert!(LauncherError::StreamEnded("reset".into()).is_recoverable());
        assert!(LauncherError::ReconnectRequested(30).is_recoverable());

        assert!(!LauncherError::BrokerAuthentication("nope".into()).is_recoverable());
        assert!(!LauncherError::Connection("refused".into()).is_recoverable());
        assert!(!LauncherError::Catalog("missing".into()).is_recoverable());
        assert!(!LauncherError::Config("bad".into()).is_recoverable());
    }

    #[test]
    fn test_from_grpc_error() {
        assert_eq!(
            LauncherError::from(GrpcClientError::AuthenticationFailed("denied".into())),
            LauncherError::BrokerAuthentication("denied".into())
        );
        assert_eq!(
            LauncherError::from(GrpcClientError::StreamEnded("gone".into())),
            LauncherError::StreamEnded("gone".into())
        );
        assert_eq!(
            LauncherError::from(GrpcClientError::InvalidAddress("::".into())),
            LauncherError::Config("::".into())
        );
        assert_eq!(
            LauncherError::from(GrpcClientError::Rpc("internal".into())),
            LauncherError::Connection("internal".into())
        );
    }

    #[test]
    fn test_call_error_display() {
        let err = CallError::NotStarted {
            function_id: "abc".into(),
            source: StartFailure::Rejected {
                status: 503,
                body: "busy".into(),
            },
        };
        assert_eq!(
            err.to_string(),
            "function abc could not be started: executor rejected the start (503): busy"
        );
        assert_eq!(
            CallError::UnknownFunction("c9".into()).to_string(),
            "function c9 is not offered by this launcher"
        );
    }

    #[test]
    fn test_reconnect_display() {
        assert_eq!(
            LauncherError::ReconnectRequested(60).to_string(),
            "broker requested a reconnect (60s until disconnect)"
        );
    }
}
