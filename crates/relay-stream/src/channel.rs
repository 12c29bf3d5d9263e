//! # Streaming Channel
//!
//! Fan-out of binary chunks to independently paced subscribers.
//!
//! ## Publish Order
//!
//! 1. Every subscriber gets a non-waiting push. Drop policies resolve here.
//! 2. Blocking subscribers that were full are awaited concurrently; no other
//!    subscriber waits on them.
//! 3. Fail-fast rejections are reported last, after every other subscriber
//!    has the chunk.

use crate::config::{BackpressurePolicy, SubscriberConfig};
use crate::error::StreamError;
use crate::queue::{PushOutcome, SessionState, StreamItem, StreamStats, SubscriberQueue};
use crate::subscriber::{deliver, StreamReceiver, StreamSubscriber};
use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use relay_types::{AudioChunk, BackpressureOverflowError, StreamMetadata};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// Handle returned by [`StreamingChannel::subscribe`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSubscription {
    name: String,
}

impl StreamSubscription {
    /// Subscriber name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// The binary data plane.
pub struct StreamingChannel {
    subscribers: RwLock<Vec<Arc<SubscriberQueue>>>,
    session: Mutex<SessionState>,
    workers: TaskTracker,
    closed: AtomicBool,
}

impl Default for StreamingChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamingChannel {
    /// Create an empty channel.
    #[must_use]
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            session: Mutex::new(SessionState::Idle),
            workers: TaskTracker::new(),
            closed: AtomicBool::new(false),
        }
    }

    // -------------------------------------------------------------------------
    // Subscribers
    // -------------------------------------------------------------------------

    /// Register a callback subscriber served by its own delivery task.
    pub fn subscribe(
        &self,
        name: &str,
        subscriber: Arc<dyn StreamSubscriber>,
        config: SubscriberConfig,
    ) -> Result<StreamSubscription, StreamError> {
        let queue = self.insert(name, config)?;
        self.workers.spawn(deliver(queue, subscriber));
        Ok(StreamSubscription {
            name: name.to_string(),
        })
    }

    /// Register a pull-style subscriber.
    pub fn subscribe_queue(
        &self,
        name: &str,
        config: SubscriberConfig,
    ) -> Result<StreamReceiver, StreamError> {
        self.insert(name, config).map(StreamReceiver::new)
    }

    fn insert(&self, name: &str, config: SubscriberConfig) -> Result<Arc<SubscriberQueue>, StreamError> {
        if self.is_closed() {
            return Err(StreamError::Closed);
        }
        config.validate()?;

        let mut subscribers = self.subscribers.write();
        subscribers.retain(|q| !q.is_closed());
        if subscribers.iter().any(|q| q.name() == name) {
            return Err(StreamError::DuplicateSubscriber {
                name: name.to_string(),
            });
        }

        let queue = Arc::new(SubscriberQueue::new(name, config));
        subscribers.push(queue.clone());
        info!(
            subscriber = name,
            queue_size = config.queue_size,
            backpressure = %config.backpressure,
            "Stream subscriber registered"
        );
        Ok(queue)
    }

    /// Remove a subscriber. Items already queued are still delivered.
    pub fn unsubscribe(&self, subscription: &StreamSubscription) -> bool {
        let mut subscribers = self.subscribers.write();
        let Some(index) = subscribers.iter().position(|q| q.name() == subscription.name) else {
            return false;
        };
        subscribers.remove(index).close();
        debug!(subscriber = subscription.name.as_str(), "Stream subscriber removed");
        true
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .read()
            .iter()
            .filter(|q| !q.is_closed())
            .count()
    }

    /// Counters for one subscriber.
    #[must_use]
    pub fn stats(&self, name: &str) -> Option<StreamStats> {
        self.find(name).map(|q| q.stats())
    }

    /// Session state as consumed by one subscriber.
    #[must_use]
    pub fn subscriber_state(&self, name: &str) -> Option<SessionState> {
        self.find(name).map(|q| q.session())
    }

    /// Session state on the producer side.
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.session.lock()
    }

    fn find(&self, name: &str) -> Option<Arc<SubscriberQueue>> {
        self.subscribers
            .read()
            .iter()
            .find(|q| q.name() == name)
            .cloned()
    }

    fn snapshot(&self) -> Vec<Arc<SubscriberQueue>> {
        self.subscribers
            .read()
            .iter()
            .filter(|q| !q.is_closed())
            .cloned()
            .collect()
    }

    // -------------------------------------------------------------------------
    // Session
    // -------------------------------------------------------------------------

    /// Open a session on every current subscriber.
    pub fn notify_start(&self, metadata: &StreamMetadata) -> Result<(), StreamError> {
        if self.is_closed() {
            return Err(StreamError::Closed);
        }

        {
            let mut session = self.session.lock();
            if let SessionState::Streaming(previous) = *session {
                warn!(%previous, next = %metadata.session_id, "Stream session started without ending the previous one");
            }
            *session = SessionState::Streaming(metadata.session_id);
        }

        let subscribers = self.snapshot();
        for queue in &subscribers {
            queue.push_control(StreamItem::Start(metadata.clone()));
        }
        debug!(session = %metadata.session_id, subscribers = subscribers.len(), "Stream session started");
        Ok(())
    }

    /// Close the session on every current subscriber.
    pub fn notify_end(&self, metadata: &StreamMetadata) -> Result<(), StreamError> {
        if self.is_closed() {
            return Err(StreamError::Closed);
        }

        *self.session.lock() = SessionState::Idle;
        for queue in self.snapshot() {
            queue.push_control(StreamItem::End(metadata.clone()));
        }
        debug!(session = %metadata.session_id, "Stream session ended");
        Ok(())
    }

    /// Deliver `chunk` to every subscriber.
    ///
    /// Returns the number of subscribers that queued the chunk.
    ///
    /// # Errors
    ///
    /// - [`StreamError::Overflow`] naming every fail-fast subscriber that was
    ///   full. Everyone else has already been served.
    /// - [`StreamError::Closed`] if the channel closed while waiting.
    pub async fn publish(&self, chunk: AudioChunk) -> Result<usize, StreamError> {
        if self.is_closed() {
            return Err(StreamError::Closed);
        }

        let mut accepted = 0;
        let mut waiting = Vec::new();
        let mut overflowed = Vec::new();

        for queue in self.snapshot() {
            match queue.try_push_chunk(&chunk) {
                PushOutcome::Queued | PushOutcome::EvictedOldest => accepted += 1,
                PushOutcome::DroppedNewest => {
                    debug!(subscriber = queue.name(), sequence = chunk.sequence, "Chunk dropped");
                }
                PushOutcome::Full => match queue.policy() {
                    BackpressurePolicy::Block => waiting.push(queue),
                    _ => overflowed.push(queue.name().to_string()),
                },
                PushOutcome::Closed => {}
            }
        }

        if !waiting.is_empty() {
            debug!(subscribers = waiting.len(), sequence = chunk.sequence, "Publish waiting for space");
            let results = join_all(waiting.iter().map(|q| q.push_chunk_wait(&chunk))).await;
            for result in results {
                match result {
                    Ok(()) => accepted += 1,
                    // the subscriber left while we waited
                    Err(StreamError::Closed) if !self.is_closed() => {}
                    Err(e) => return Err(e),
                }
            }
        }

        if !overflowed.is_empty() {
            warn!(sequence = chunk.sequence, subscribers = ?overflowed, "Backpressure overflow");
            return Err(BackpressureOverflowError {
                sequence: chunk.sequence,
                subscribers: overflowed,
            }
            .into());
        }

        Ok(accepted)
    }

    // -------------------------------------------------------------------------
    // Shutdown
    // -------------------------------------------------------------------------

    /// Whether [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Close every queue and wait up to `timeout` for delivery tasks to
    /// drain. Blocked publishers return [`StreamError::Closed`].
    ///
    /// Returns `true` if every delivery task finished.
    pub async fn close(&self, timeout: Duration) -> bool {
        self.closed.store(true, Ordering::Release);
        for queue in self.subscribers.read().iter() {
            queue.close();
        }
        self.workers.close();

        let drained = tokio::time::timeout(timeout, self.workers.wait()).await.is_ok();
        if drained {
            info!("[StreamingChannel] Closed");
        } else {
            warn!(remaining = self.workers.len(), "[StreamingChannel] Delivery tasks still running after close");
        }
        drained
    }
}

impl std::fmt::Debug for StreamingChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingChannel")
            .field("subscribers", &self.subscriber_count())
            .field("state", &self.state())
            .field("closed", &self.is_closed())
            .finish()
    }
}
