//! # Subscriber Queue
//!
//! One bounded FIFO per subscriber. The producer side is `publish`; the
//! consumer side is either a delivery task or a [`StreamReceiver`].
//!
//! Only chunks count against `queue_size`. Eviction under
//! [`BackpressurePolicy::DropOldest`] happens under the same lock as the
//! insertion, so a consumer never observes the queue one short.
//!
//! [`StreamReceiver`]: crate::StreamReceiver

use crate::config::{BackpressurePolicy, SubscriberConfig};
use crate::error::StreamError;
use parking_lot::Mutex;
use relay_types::{AudioChunk, StreamMetadata};
use serde::Serialize;
use std::collections::VecDeque;
use std::pin::pin;
use tokio::sync::Notify;
use uuid::Uuid;

/// One entry of a subscriber queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamItem {
    /// Session opened.
    Start(StreamMetadata),
    /// Data.
    Chunk(AudioChunk),
    /// Session closed.
    End(StreamMetadata),
}

impl StreamItem {
    /// Whether this is a start/end marker.
    #[must_use]
    pub fn is_control(&self) -> bool {
        !matches!(self, Self::Chunk(_))
    }

    /// The chunk, if this is one.
    #[must_use]
    pub fn into_chunk(self) -> Option<AudioChunk> {
        match self {
            Self::Chunk(chunk) => Some(chunk),
            _ => None,
        }
    }
}

/// Session state as seen by one side of the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Between sessions.
    #[default]
    Idle,
    /// Inside the session with this id.
    Streaming(Uuid),
}

/// Per-subscriber counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StreamStats {
    /// Chunks handed to the consumer.
    pub delivered: u64,
    /// Chunks discarded by a drop policy.
    pub dropped: u64,
    /// Chunks rejected under fail-fast.
    pub overflowed: u64,
    /// Publishes that had to wait for space.
    pub blocked: u64,
    /// Subscriber callbacks that failed.
    pub callback_errors: u64,
    /// Chunks currently queued.
    pub queued: usize,
}

/// Result of a non-waiting push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PushOutcome {
    Queued,
    DroppedNewest,
    EvictedOldest,
    Full,
    Closed,
}

enum Pop {
    Item(StreamItem),
    Empty,
    Closed,
}

#[derive(Default)]
struct QueueState {
    items: VecDeque<StreamItem>,
    chunks: usize,
    closed: bool,
    session: SessionState,
    stats: StreamStats,
}

pub(crate) struct SubscriberQueue {
    name: String,
    config: SubscriberConfig,
    state: Mutex<QueueState>,
    items_ready: Notify,
    space_ready: Notify,
}

impl SubscriberQueue {
    pub(crate) fn new(name: impl Into<String>, config: SubscriberConfig) -> Self {
        Self {
            name: name.into(),
            config,
            state: Mutex::new(QueueState::default()),
            items_ready: Notify::new(),
            space_ready: Notify::new(),
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn policy(&self) -> BackpressurePolicy {
        self.config.backpressure
    }

    /// Enqueue a start/end marker. Never dropped.
    pub(crate) fn push_control(&self, item: StreamItem) -> bool {
        {
            let mut state = self.state.lock();
            if state.closed {
                return false;
            }
            state.items.push_back(item);
        }
        self.items_ready.notify_one();
        true
    }

    /// Enqueue a chunk without waiting, applying the drop policies.
    pub(crate) fn try_push_chunk(&self, chunk: &AudioChunk) -> PushOutcome {
        let outcome = {
            let mut state = self.state.lock();
            if state.closed {
                return PushOutcome::Closed;
            }

            if state.chunks < self.config.queue_size {
                state.items.push_back(StreamItem::Chunk(chunk.clone()));
                state.chunks += 1;
                PushOutcome::Queued
            } else {
                match self.config.backpressure {
                    BackpressurePolicy::DropNewest => {
                        state.stats.dropped += 1;
                        return PushOutcome::DroppedNewest;
                    }
                    BackpressurePolicy::DropOldest => {
                        if let Some(oldest) = state
                            .items
                            .iter()
                            .position(|item| matches!(item, StreamItem::Chunk(_)))
                        {
                            state.items.remove(oldest);
                        }
                        state.items.push_back(StreamItem::Chunk(chunk.clone()));
                        state.stats.dropped += 1;
                        PushOutcome::EvictedOldest
                    }
                    BackpressurePolicy::Block => return PushOutcome::Full,
                    BackpressurePolicy::FailFast => {
                        state.stats.overflowed += 1;
                        return PushOutcome::Full;
                    }
                }
            }
        };
        self.items_ready.notify_one();
        outcome
    }

    /// Enqueue a chunk, waiting for space if the queue is full.
    pub(crate) async fn push_chunk_wait(&self, chunk: &AudioChunk) -> Result<(), StreamError> {
        let mut counted = false;
        loop {
            let mut space = pin!(self.space_ready.notified());
            space.as_mut().enable();

            match self.try_push_chunk(chunk) {
                PushOutcome::Closed => return Err(StreamError::Closed),
                PushOutcome::Full => {
                    if !counted {
                        self.state.lock().stats.blocked += 1;
                        counted = true;
                    }
                }
                _ => return Ok(()),
            }

            space.await;
        }
    }

    /// Take the next item without waiting.
    pub(crate) fn try_pop(&self) -> Option<StreamItem> {
        match self.take() {
            Pop::Item(item) => Some(item),
            Pop::Empty | Pop::Closed => None,
        }
    }

    /// Take the next item, waiting until one arrives.
    ///
    /// Returns `None` once the queue is closed and empty.
    pub(crate) async fn pop(&self) -> Option<StreamItem> {
        loop {
            let mut ready = pin!(self.items_ready.notified());
            ready.as_mut().enable();

            match self.take() {
                Pop::Item(item) => return Some(item),
                Pop::Closed => return None,
                Pop::Empty => ready.await,
            }
        }
    }

    fn take(&self) -> Pop {
        let popped = {
            let mut state = self.state.lock();
            let Some(item) = state.items.pop_front() else {
                return if state.closed { Pop::Closed } else { Pop::Empty };
            };

            match &item {
                StreamItem::Start(meta) => state.session = SessionState::Streaming(meta.session_id),
                StreamItem::End(_) => state.session = SessionState::Idle,
                StreamItem::Chunk(_) => {
                    state.chunks -= 1;
                    state.stats.delivered += 1;
                }
            }
            item
        };

        if !popped.is_control() {
            self.space_ready.notify_waiters();
        }
        Pop::Item(popped)
    }

    /// Stop accepting items and wake every waiter.
    pub(crate) fn close(&self) {
        self.state.lock().closed = true;
        self.items_ready.notify_one();
        self.space_ready.notify_waiters();
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub(crate) fn record_callback_error(&self) {
        self.state.lock().stats.callback_errors += 1;
    }

    pub(crate) fn stats(&self) -> StreamStats {
        let state = self.state.lock();
        StreamStats {
            queued: state.chunks,
            ..state.stats
        }
    }

    pub(crate) fn session(&self) -> SessionState {
        self.state.lock().session
    }
}
