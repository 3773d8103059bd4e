// ABOUTME: Communicator facade over one broker duplex stream.
// ABOUTME: Opens the streaming RPC, then forwards send/receive/stop to the two halves.

use std::fmt;
use std::future::Future;

use futures::Stream;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Response, Status};

use crate::error::GrpcClientError;
use crate::stream::{InboundCollector, OutboundSender, OutboundStream, DEFAULT_CHANNEL_BUFFER};

/// One live duplex stream: writes go out through the sender, deliveries
/// land in the collector.
pub struct Communicator<TSend, TRecv> {
    inbound: InboundCollector<TRecv>,
    outbound: OutboundSender<TSend>,
}

impl<TSend, TRecv> fmt::Debug for Communicator<TSend, TRecv> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Communicator")
            .field("inbound", &self.inbound)
            .field("outbound", &self.outbound)
            .finish()
    }
}

impl<TSend, TRecv> Communicator<TSend, TRecv>
where
    TRecv: Send + 'static,
{
    /// Wire up an already-open stream pair.
    ///
    /// A background task feeds `incoming` into the collector until the
    /// stream fails or completes. Must be called inside a Tokio runtime.
    pub fn start<S, E>(outbound: OutboundSender<TSend>, incoming: S) -> Self
    where
        S: Stream<Item = Result<TRecv, E>> + Send + 'static,
        E: fmt::Display + Send,
    {
        let inbound = InboundCollector::new();
        // Detached on purpose: the pump ends with the response stream, and
        // cancelling it early would reset the call before a half-close flushes.
        let _pump = inbound.attach(incoming);
        Self { inbound, outbound }
    }

    /// Open the streaming RPC and wire it up.
    ///
    /// `open` receives the request stream and performs the call, e.g.
    /// `|requests| async move { client.open_function_stream(requests).await }`.
    pub async fn open<F, Fut, S>(open: F) -> Result<Self, GrpcClientError>
    where
        F: FnOnce(ReceiverStream<TSend>) -> Fut,
        Fut: Future<Output = Result<Response<S>, Status>>,
        S: Stream<Item = Result<TRecv, Status>> + Send + 'static,
    {
        let OutboundStream { sender, stream } = OutboundStream::new(DEFAULT_CHANNEL_BUFFER);
        let response = open(stream).await?;
        tracing::info!("Broker stream opened");
        Ok(Self::start(sender, response.into_inner()))
    }

    /// Write one message; fails for good once the stream has ended.
    pub async fn send<M>(&mut self, message: M) -> Result<(), GrpcClientError>
    where
        M: Into<TSend> + fmt::Display,
    {
        self.outbound.send(message).await
    }

    /// Next delivered message, `Ok(None)` if nothing is waiting.
    pub fn receive(&self) -> Result<Option<TRecv>, GrpcClientError> {
        self.inbound.receive()
    }

    /// Half-close the request stream and stop reading. Idempotent.
    pub fn stop(&mut self) {
        if !self.outbound.is_stopped() {
            tracing::info!("Closing broker stream");
        }
        self.outbound.stop();
        self.inbound.stop();
    }

    pub fn is_stopped(&self) -> bool {
        self.outbound.is_stopped()
    }
}
