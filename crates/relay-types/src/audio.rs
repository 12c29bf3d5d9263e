//! # Streaming Payloads
//!
//! Binary chunks and session metadata carried by the streaming channel.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// PCM sample encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleFormat {
    /// Signed 16-bit little endian.
    S16Le,
    /// 32-bit float little endian.
    F32Le,
}

impl SampleFormat {
    /// Bytes per sample.
    #[must_use]
    pub fn sample_width(&self) -> usize {
        match self {
            Self::S16Le => 2,
            Self::F32Le => 4,
        }
    }
}

/// Describes one streaming session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamMetadata {
    /// Session id, shared by the start and end notifications.
    pub session_id: Uuid,
    /// Samples per second.
    pub sample_rate: u32,
    /// Interleaved channel count.
    pub channels: u16,
    /// Sample encoding.
    pub format: SampleFormat,
    /// Text being voiced, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl StreamMetadata {
    /// New session metadata with a fresh id.
    #[must_use]
    pub fn new(sample_rate: u32, channels: u16, format: SampleFormat) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            sample_rate,
            channels,
            format,
            text: None,
        }
    }

    /// Bytes per second of audio for this session.
    #[must_use]
    pub fn byte_rate(&self) -> usize {
        self.sample_rate as usize * self.channels as usize * self.format.sample_width()
    }
}

impl fmt::Display for StreamMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "session {} {}Hz x{} {:?}",
            self.session_id, self.sample_rate, self.channels, self.format
        )
    }
}

/// One chunk of binary data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk {
    /// Position of this chunk within its session.
    pub sequence: u64,
    /// Raw bytes; cheap to clone across subscribers.
    pub data: Bytes,
}

impl AudioChunk {
    /// Create a chunk.
    pub fn new(sequence: u64, data: impl Into<Bytes>) -> Self {
        Self {
            sequence,
            data: data.into(),
        }
    }

    /// Payload length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the chunk carries no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
