// ABOUTME: Re-exports generated protobuf types for the function broker protocol.
// ABOUTME: Single source of truth for broker gRPC services and message types.

#![allow(clippy::derive_partial_eq_without_eq)]

/// Generated protobuf types for the function broker protocol.
pub mod function_broker {
    tonic::include_proto!("function_broker");
}

// Re-export commonly used types at crate root for convenience
pub use function_broker::*;

pub mod client {
    pub use super::function_broker::function_broker_client::FunctionBrokerClient;
}

pub mod server {
    pub use super::function_broker::function_broker_server::{
        FunctionBroker, FunctionBrokerServer,
    };
}
