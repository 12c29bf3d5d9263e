//! # Stream Consumers
//!
//! Two ways to consume a subscriber queue:
//!
//! - [`StreamSubscriber`]: callbacks driven by a private delivery task.
//! - [`StreamReceiver`]: pull-style, for consumers that own their loop.

use crate::queue::{SessionState, StreamItem, StreamStats, SubscriberQueue};
use async_trait::async_trait;
use futures::FutureExt;
use relay_types::{AudioChunk, BoxError, StreamMetadata};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, warn};

/// Callback-style stream consumer.
///
/// Failures are logged and counted against the subscriber; they never reach
/// the producer.
#[async_trait]
pub trait StreamSubscriber: Send + Sync + 'static {
    /// A session opened.
    async fn on_start(&self, _metadata: &StreamMetadata) -> Result<(), BoxError> {
        Ok(())
    }

    /// A chunk arrived.
    async fn on_chunk(&self, chunk: AudioChunk) -> Result<(), BoxError>;

    /// A session closed.
    async fn on_end(&self, _metadata: &StreamMetadata) -> Result<(), BoxError> {
        Ok(())
    }
}

/// Delivery task body: drain the queue into the callbacks until closed.
pub(crate) async fn deliver(queue: Arc<SubscriberQueue>, subscriber: Arc<dyn StreamSubscriber>) {
    debug!(subscriber = queue.name(), "Stream delivery task started");

    while let Some(item) = queue.pop().await {
        let (stage, call) = match &item {
            StreamItem::Start(meta) => ("on_start", subscriber.on_start(meta)),
            StreamItem::Chunk(chunk) => ("on_chunk", subscriber.on_chunk(chunk.clone())),
            StreamItem::End(meta) => ("on_end", subscriber.on_end(meta)),
        };

        let error = match AssertUnwindSafe(call).catch_unwind().await {
            Ok(Ok(())) => continue,
            Ok(Err(e)) => e.to_string(),
            Err(_) => "callback panicked".to_string(),
        };
        queue.record_callback_error();
        warn!(subscriber = queue.name(), stage, error = %error, "Stream subscriber callback failed");
    }

    debug!(subscriber = queue.name(), "Stream delivery task finished");
}

/// Pull-style handle on one subscriber queue.
///
/// Dropping the receiver unsubscribes it.
pub struct StreamReceiver {
    queue: Arc<SubscriberQueue>,
}

impl StreamReceiver {
    pub(crate) fn new(queue: Arc<SubscriberQueue>) -> Self {
        Self { queue }
    }

    /// Subscriber name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.queue.name()
    }

    /// Next item in FIFO order; `None` once the channel is closed and the
    /// queue is drained.
    pub async fn recv(&mut self) -> Option<StreamItem> {
        self.queue.pop().await
    }

    /// Next item if one is queued.
    pub fn try_recv(&mut self) -> Option<StreamItem> {
        self.queue.try_pop()
    }

    /// Next chunk, skipping control items.
    pub async fn recv_chunk(&mut self) -> Option<AudioChunk> {
        while let Some(item) = self.recv().await {
            if let StreamItem::Chunk(chunk) = item {
                return Some(chunk);
            }
        }
        None
    }

    /// Counters for this subscriber.
    #[must_use]
    pub fn stats(&self) -> StreamStats {
        self.queue.stats()
    }

    /// Session state as consumed so far.
    #[must_use]
    pub fn session(&self) -> SessionState {
        self.queue.session()
    }
}

impl Drop for StreamReceiver {
    fn drop(&mut self) {
        self.queue.close();
    }
}

impl std::fmt::Debug for StreamReceiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamReceiver")
            .field("name", &self.name())
            .field("stats", &self.stats())
            .finish()
    }
}
