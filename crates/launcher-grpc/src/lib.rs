// ABOUTME: gRPC plumbing shared by the function launcher.
// ABOUTME: Provides channel creation, bearer headers, the duplex stream pair and the communicator.

pub mod auth;
pub mod channel;
pub mod communicator;
pub mod error;
pub mod stream;

// Channel creation
pub use channel::{create_channel, ChannelConfig, KeepAliveConfig};

// Error types
pub use error::GrpcClientError;

// Authorization
pub use auth::{HeaderProvider, AUTHORIZATION_HEADER};

// Stream management
pub use communicator::Communicator;
pub use stream::{
    InboundCollector, OutboundSender, OutboundStream, StreamEnd, DEFAULT_CHANNEL_BUFFER,
    DEFAULT_SEND_TIMEOUT,
};
