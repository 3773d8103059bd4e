// ABOUTME: Authenticated broker session.
// ABOUTME: Exchanges credentials for a bearer token, then opens the function stream with that header.

use async_trait::async_trait;
use launcher_grpc::{create_channel, Communicator, GrpcClientError, HeaderProvider};
use launcher_proto::client::FunctionBrokerClient;
use launcher_proto::{Authenticate, EmptyMessage, FunctionSignature, FunctionUpdate};
use tonic::transport::Channel;

use crate::config::BrokerConfig;
use crate::error::LauncherError;
use crate::message::OutgoingMessage;

/// Communicator carrying function updates both ways.
pub type BrokerCommunicator = Communicator<FunctionUpdate, FunctionUpdate>;

/// One authenticated stream to the broker. Replaced wholesale on reconnect.
#[derive(Debug)]
pub struct BrokerSession {
    headers: HeaderProvider,
    communicator: BrokerCommunicator,
}

impl BrokerSession {
    /// Authenticate and open the function stream.
    pub async fn connect(config: &BrokerConfig) -> Result<Self, LauncherError> {
        let (channel, headers) = authenticated_channel(config).await?;

        let client = FunctionBrokerClient::with_interceptor(channel, headers.clone());
        let communicator = Communicator::open(move |requests| async move {
            let mut client = client;
            client.open_function_stream(requests).await
        })
        .await?;

        tracing::info!(endpoint = %config.endpoint_url(), cluster_id = %config.cluster_id, "Broker session open");
        Ok(Self::from_parts(headers, communicator))
    }

    /// Session over an existing header provider and communicator.
    pub fn from_parts(headers: HeaderProvider, communicator: BrokerCommunicator) -> Self {
        Self {
            headers,
            communicator,
        }
    }

    /// Use a refreshed bearer token for every call from now on.
    pub fn update_token(&self, token: &str) {
        self.headers.set(token);
        tracing::debug!("Bearer token updated");
    }

    pub fn headers(&self) -> &HeaderProvider {
        &self.headers
    }

    pub async fn send(&mut self, message: OutgoingMessage) -> Result<(), LauncherError> {
        self.communicator.send(message).await.map_err(Into::into)
    }

    pub fn receive(&self) -> Result<Option<FunctionUpdate>, LauncherError> {
        self.communicator.receive().map_err(Into::into)
    }

    pub fn stop(&mut self) {
        self.communicator.stop();
    }
}

/// Opens fresh broker sessions, for startup and for every reconnect.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open(&self) -> Result<BrokerSession, LauncherError>;
}

/// Sessions over gRPC to a real broker.
#[derive(Debug, Clone)]
pub struct GrpcSessionFactory {
    config: BrokerConfig,
}

impl GrpcSessionFactory {
    pub fn new(config: BrokerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }
}

#[async_trait]
impl SessionFactory for GrpcSessionFactory {
    async fn open(&self) -> Result<BrokerSession, LauncherError> {
        BrokerSession::connect(&self.config).await
    }
}

/// Ask the broker for a new function id and signature.
pub async fn generate_function_signature(
    config: &BrokerConfig,
) -> Result<FunctionSignature, LauncherError> {
    let (channel, headers) = authenticated_channel(config).await?;
    let mut client = FunctionBrokerClient::with_interceptor(channel, headers);
    let response = client
        .generate_function_signature(EmptyMessage {})
        .await
        .map_err(GrpcClientError::from)?;
    Ok(response.into_inner())
}

async fn authenticated_channel(
    config: &BrokerConfig,
) -> Result<(Channel, HeaderProvider), LauncherError> {
    let channel = create_channel(&config.channel_config()).await?;
    let token = authenticate(channel.clone(), config).await?;
    Ok((channel, HeaderProvider::new(token)))
}

/// Exchange client credentials for the initial bearer token.
async fn authenticate(channel: Channel, config: &BrokerConfig) -> Result<String, LauncherError> {
    let mut client = FunctionBrokerClient::new(channel);
    let request = Authenticate {
        client_id: config.client_id.clone(),
        client_secret: config.client_secret.clone(),
        cluster_id: config.cluster_id.clone(),
    };

    let response = client
        .get_function_broker_token(request)
        .await
        .map_err(|status| match GrpcClientError::from(status) {
            GrpcClientError::ConnectionFailed(msg) => LauncherError::Connection(msg),
            other => LauncherError::BrokerAuthentication(other.to_string()),
        })?;

    tracing::debug!(client_id = %config.client_id, "Authenticated with broker");
    Ok(response.into_inner().value)
}
