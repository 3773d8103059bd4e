// ABOUTME: Duplex stream pair for the broker channel.
// ABOUTME: Inbound collector (callback-fed FIFO with a terminal latch) and outbound sender (latching writer).

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;

use crate::error::GrpcClientError;

/// Default buffer size for outbound message channels.
pub const DEFAULT_CHANNEL_BUFFER: usize = 100;

/// Longest a single outbound write may wait for buffer space.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Why the inbound half stopped delivering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEnd {
    /// The peer (or we, locally) completed the stream.
    Completed,
    /// The stream failed with a transport or RPC error.
    Failed(String),
}

impl fmt::Display for StreamEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamEnd::Completed => write!(f, "stream completed"),
            StreamEnd::Failed(cause) => write!(f, "{}", cause),
        }
    }
}

struct Inbound<T> {
    queue: Mutex<VecDeque<T>>,
    end: OnceLock<StreamEnd>,
}

/// Receiving half of the duplex stream.
///
/// The RPC runtime pushes into it from its own task (`on_message`,
/// `on_error`, `on_complete`); the dispatch loop drains it with the
/// non-blocking [`receive`](Self::receive). Clones share the same queue.
pub struct InboundCollector<T> {
    inner: Arc<Inbound<T>>,
}

impl<T> Clone for InboundCollector<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for InboundCollector<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for InboundCollector<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InboundCollector")
            .field("queued", &self.len())
            .field("end", &self.inner.end.get())
            .finish()
    }
}

impl<T> InboundCollector<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inbound {
                queue: Mutex::new(VecDeque::new()),
                end: OnceLock::new(),
            }),
        }
    }

    /// Queue a delivered message.
    pub fn on_message(&self, message: T) {
        self.queue().push_back(message);
    }

    /// Latch a stream failure. Only the first terminal signal is kept.
    pub fn on_error(&self, cause: impl fmt::Display) {
        let cause = cause.to_string();
        if self.inner.end.set(StreamEnd::Failed(cause.clone())).is_ok() {
            tracing::debug!(cause = %cause, "Inbound stream failed");
        }
    }

    /// Latch normal completion. Only the first terminal signal is kept.
    pub fn on_complete(&self) {
        if self.inner.end.set(StreamEnd::Completed).is_ok() {
            tracing::debug!("Inbound stream completed");
        }
    }

    /// Take the oldest queued message without waiting.
    ///
    /// `Ok(None)` means nothing has arrived yet. A latched end does not
    /// discard the backlog: messages delivered before the terminal signal
    /// are handed out first, in order, and only once the queue is empty does
    /// every call fail with [`GrpcClientError::StreamEnded`]. A reconnect
    /// notice sent just before the peer closes is therefore still seen.
    pub fn receive(&self) -> Result<Option<T>, GrpcClientError> {
        if let Some(message) = self.queue().pop_front() {
            return Ok(Some(message));
        }
        match self.inner.end.get() {
            Some(end) => Err(GrpcClientError::StreamEnded(end.to_string())),
            None => Ok(None),
        }
    }

    /// How the stream ended, if it has.
    pub fn ended(&self) -> Option<&StreamEnd> {
        self.inner.end.get()
    }

    /// Number of messages waiting.
    pub fn len(&self) -> usize {
        self.queue().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Local completion. Idempotent.
    pub fn stop(&self) {
        self.on_complete();
    }

    /// Spawn a task feeding this collector from an RPC response stream.
    ///
    /// The task ends after the first error or when the stream finishes.
    pub fn attach<S, E>(&self, stream: S) -> JoinHandle<()>
    where
        S: Stream<Item = Result<T, E>> + Send + 'static,
        E: fmt::Display + Send,
        T: Send + 'static,
    {
        let collector = self.clone();
        tokio::spawn(async move {
            let mut stream = Box::pin(stream);
            while let Some(item) = stream.next().await {
                match item {
                    Ok(message) => collector.on_message(message),
                    Err(e) => {
                        collector.on_error(e);
                        return;
                    }
                }
            }
            collector.on_complete();
        })
    }

    fn queue(&self) -> std::sync::MutexGuard<'_, VecDeque<T>> {
        // The queue is never left half-modified, so a poisoned lock is still usable.
        self.inner.queue.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Writing half of the duplex stream.
///
/// The first failed write latches; every later `send` returns that same
/// error without touching the channel.
pub struct OutboundSender<T> {
    tx: Option<mpsc::Sender<T>>,
    closing_error: Option<GrpcClientError>,
    send_timeout: Duration,
}

impl<T> fmt::Debug for OutboundSender<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutboundSender")
            .field("stopped", &self.tx.is_none())
            .field("closing_error", &self.closing_error)
            .field("send_timeout", &self.send_timeout)
            .finish()
    }
}

impl<T> OutboundSender<T> {
    /// Wrap the writable end of a request stream.
    pub fn new(tx: mpsc::Sender<T>) -> Self {
        Self {
            tx: Some(tx),
            closing_error: None,
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }

    /// Override how long a write may wait for buffer space.
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Write one message.
    pub async fn send<M>(&mut self, message: M) -> Result<(), GrpcClientError>
    where
        M: Into<T> + fmt::Display,
    {
        if let Some(err) = &self.closing_error {
            return Err(err.clone());
        }
        let Some(tx) = self.tx.as_ref() else {
            return Err(self.latch("request stream stopped".to_string()));
        };

        tracing::debug!(outbound = %message, "Sending to broker");
        let result = tx.send_timeout(message.into(), self.send_timeout).await;
        match result {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Closed(_)) => {
                Err(self.latch("request stream closed by the broker".to_string()))
            }
            Err(SendTimeoutError::Timeout(_)) => Err(self.latch(format!(
                "request stream stalled for {:?}",
                self.send_timeout
            ))),
        }
    }

    /// Graceful half-close. Idempotent.
    pub fn stop(&mut self) {
        if self.tx.take().is_some() {
            tracing::debug!("Outbound stream half-closed");
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.tx.is_none()
    }

    /// The latched write error, if any.
    pub fn closing_error(&self) -> Option<&GrpcClientError> {
        self.closing_error.as_ref()
    }

    fn latch(&mut self, cause: String) -> GrpcClientError {
        let err = GrpcClientError::StreamEnded(cause);
        self.closing_error = Some(err.clone());
        err
    }
}

/// A sender plus the request stream to hand to the streaming RPC.
pub struct OutboundStream<T> {
    /// Sender for pushing messages to the stream.
    pub sender: OutboundSender<T>,
    /// The stream to pass to the gRPC method.
    pub stream: ReceiverStream<T>,
}

impl<T> OutboundStream<T> {
    /// Create an outbound stream pair with the specified buffer size.
    pub fn new(buffer_size: usize) -> Self {
        let (tx, rx) = mpsc::channel(buffer_size);
        Self {
            sender: OutboundSender::new(tx),
            stream: ReceiverStream::new(rx),
        }
    }

    /// Create an outbound stream pair with the default buffer size.
    pub fn with_default_buffer() -> Self {
        Self::new(DEFAULT_CHANNEL_BUFFER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tonic::Status;

    #[test]
    fn test_receive_empty_is_none() {
        let collector: InboundCollector<u32> = InboundCollector::new();
        assert_eq!(collector.receive().unwrap(), None);
        assert!(collector.is_empty());
    }

    #[test]
    fn test_receive_preserves_fifo_order() {
        let collector = InboundCollector::new();
        for i in 0..100u32 {
            collector.on_message(i);
        }
        for i in 0..100u32 {
            assert_eq!(collector.receive().unwrap(), Some(i));
        }
        assert_eq!(collector.receive().unwrap(), None);
    }

    #[test]
    fn test_fifo_across_threads() {
        let collector = InboundCollector::new();
        let producer = collector.clone();
        let handle = std::thread::spawn(move || {
            for i in 0..1000u32 {
                producer.on_message(i);
            }
        });

        let mut seen = Vec::new();
        while seen.len() < 1000 {
            if let Some(v) = collector.receive().unwrap() {
                seen.push(v);
            }
        }
        handle.join().unwrap();
        assert_eq!(seen, (0..1000).collect::<Vec<_>>());
    }

    #[test]
    fn test_error_latches_and_first_wins() {
        let collector: InboundCollector<u32> = InboundCollector::new();
        collector.on_error("boom");
        collector.on_error("second");
        collector.on_complete();

        assert_eq!(collector.ended(), Some(&StreamEnd::Failed("boom".to_string())));
        let err = collector.receive().unwrap_err();
        assert_eq!(err, GrpcClientError::StreamEnded("boom".to_string()));
        // Still failing on the next call
        assert!(collector.receive().unwrap_err().is_stream_ended());
    }

    #[test]
    fn test_complete_latches() {
        let collector: InboundCollector<u32> = InboundCollector::new();
        collector.on_complete();
        collector.on_error("late");
        assert_eq!(collector.ended(), Some(&StreamEnd::Completed));
        assert_eq!(
            collector.receive().unwrap_err(),
            GrpcClientError::StreamEnded("stream completed".to_string())
        );
    }

    #[test]
    fn test_inbound_stop_is_idempotent() {
        let collector: InboundCollector<u32> = InboundCollector::new();
        collector.stop();
        collector.stop();
        assert_eq!(collector.ended(), Some(&StreamEnd::Completed));
    }

    #[tokio::test]
    async fn test_attach_pumps_messages_then_completion() {
        let collector = InboundCollector::new();
        let source = futures::stream::iter(vec![Ok::<_, Status>(1u32), Ok(2), Ok(3)]);
        collector.attach(source).await.unwrap();

        assert_eq!(collector.len(), 3);
        assert_eq!(collector.ended(), Some(&StreamEnd::Completed));
    }

    #[tokio::test]
    async fn test_attach_latches_error_and_stops() {
        let collector = InboundCollector::new();
        let source = futures::stream::iter(vec![
            Ok::<_, Status>(1u32),
            Err(Status::unavailable("broker gone")),
            Ok(2),
        ]);
        collector.attach(source).await.unwrap();

        assert_eq!(collector.len(), 1);
        assert_eq!(collector.receive().unwrap(), Some(1));
        assert!(collector.receive().unwrap_err().is_stream_ended());
        match collector.ended() {
            Some(StreamEnd::Failed(cause)) => assert!(cause.contains("broker gone")),
            other => panic!("expected failure latch, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_send_delivers_in_order() {
        let mut outbound: OutboundStream<String> = OutboundStream::new(8);
        outbound.sender.send("a").await.unwrap();
        outbound.sender.send("b").await.unwrap();
        outbound.sender.stop();

        let received: Vec<String> = outbound.stream.collect().await;
        assert_eq!(received, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn test_send_after_close_latches() {
        let (tx, rx) = mpsc::channel::<String>(4);
        let mut sender = OutboundSender::new(tx);
        drop(rx);

        let err = sender.send("first").await.unwrap_err();
        assert!(err.is_stream_ended());
        assert_eq!(sender.closing_error(), Some(&err));

        // Latched: same error, no further write attempted
        let again = sender.send("second").await.unwrap_err();
        assert_eq!(again, err);
    }

    #[tokio::test]
    async fn test_send_after_stop_fails() {
        let (tx, _rx) = mpsc::channel::<String>(4);
        let mut sender = OutboundSender::new(tx);
        sender.stop();
        sender.stop();
        assert!(sender.is_stopped());

        let err = sender.send("late").await.unwrap_err();
        assert!(err.is_stream_ended());
    }

    #[tokio::test]
    async fn test_stop_half_closes_request_stream() {
        let mut outbound: OutboundStream<String> = OutboundStream::new(4);
        outbound.sender.stop();
        assert_eq!(outbound.stream.next().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_timeout_latches() {
        let (tx, _rx) = mpsc::channel::<String>(1);
        let mut sender = OutboundSender::new(tx).with_send_timeout(Duration::from_millis(50));

        sender.send("fills the buffer").await.unwrap();
        let err = sender.send("stalls").await.unwrap_err();
        assert!(err.to_string().contains("stalled"));
        assert!(sender.send("after").await.is_err());
    }

    #[test]
    fn test_default_channel_buffer() {
        let outbound: OutboundStream<String> = OutboundStream::with_default_buffer();
        assert!(!outbound.sender.is_stopped());
        assert_eq!(DEFAULT_CHANNEL_BUFFER, 100);
    }
}
