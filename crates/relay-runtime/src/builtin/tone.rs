//! Output provider voicing intents as a sine tone.
//!
//! Stands in for a TTS engine: each intent becomes one streaming session of
//! mono S16LE audio whose length grows with the text. Chunks go through the
//! streaming channel so any number of players, meters or recorders can
//! consume them.

use crate::provider::{OutputProvider, ProviderContext};
use async_trait::async_trait;
use bytes::{BufMut, BytesMut};
use parking_lot::Mutex;
use relay_stream::StreamingChannel;
use relay_types::{AudioChunk, BoxError, IntentPayload, SampleFormat, StreamMetadata};
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;
use std::sync::Arc;
use tracing::debug;

/// Config blob of the `tone` provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToneConfig {
    /// Output sample rate.
    pub sample_rate: u32,
    /// Tone pitch.
    pub frequency_hz: f64,
    /// Peak amplitude in `0.0..=1.0`.
    pub amplitude: f64,
    /// Audio per character of text.
    pub ms_per_char: u64,
    /// Shortest session.
    pub min_ms: u64,
    /// Longest session.
    pub max_ms: u64,
    /// Audio per chunk.
    pub chunk_ms: u64,
}

impl Default for ToneConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            frequency_hz: 440.0,
            amplitude: 0.3,
            ms_per_char: 40,
            min_ms: 100,
            max_ms: 3_000,
            chunk_ms: 20,
        }
    }
}

/// Renders each intent into the streaming channel.
#[derive(Debug)]
pub struct ToneOutput {
    config: ToneConfig,
    stream: Mutex<Option<Arc<StreamingChannel>>>,
    // one session at a time on the shared channel
    speaking: tokio::sync::Mutex<()>,
}

impl ToneOutput {
    /// Build from a parsed config.
    pub fn from_config(config: ToneConfig) -> Result<Self, BoxError> {
        if config.sample_rate == 0 || config.chunk_ms == 0 {
            return Err("tone: sample_rate and chunk_ms must be positive".into());
        }
        if !(0.0..=1.0).contains(&config.amplitude) {
            return Err("tone: amplitude must be within 0.0..=1.0".into());
        }
        if config.min_ms > config.max_ms {
            return Err("tone: min_ms exceeds max_ms".into());
        }
        Ok(Self {
            config,
            stream: Mutex::new(None),
            speaking: tokio::sync::Mutex::new(()),
        })
    }

    /// Session length for `text`, in milliseconds.
    #[must_use]
    pub fn duration_ms(&self, text: &str) -> u64 {
        (text.chars().count() as u64 * self.config.ms_per_char).clamp(self.config.min_ms, self.config.max_ms)
    }

    /// PCM for `duration_ms` of tone, split into chunks.
    fn synthesize(&self, duration_ms: u64) -> Vec<AudioChunk> {
        let rate = u64::from(self.config.sample_rate);
        let total = (rate * duration_ms / 1_000) as usize;
        let per_chunk = ((rate * self.config.chunk_ms / 1_000) as usize).max(1);
        let step = TAU * self.config.frequency_hz / rate as f64;
        let peak = self.config.amplitude * f64::from(i16::MAX);

        let mut chunks = Vec::with_capacity(total.div_ceil(per_chunk));
        let mut buf = BytesMut::with_capacity(per_chunk * SampleFormat::S16Le.sample_width());
        for n in 0..total {
            let sample = ((n as f64 * step).sin() * peak).round() as i16;
            buf.put_i16_le(sample);
            if (n + 1) % per_chunk == 0 || n + 1 == total {
                chunks.push(AudioChunk::new(chunks.len() as u64, buf.split().freeze()));
            }
        }
        chunks
    }
}

#[async_trait]
impl OutputProvider for ToneOutput {
    async fn setup(&self, ctx: &ProviderContext) -> Result<(), BoxError> {
        *self.stream.lock() = Some(Arc::clone(ctx.stream()));
        Ok(())
    }

    async fn render(&self, intent: &IntentPayload) -> Result<(), BoxError> {
        let Some(stream) = self.stream.lock().clone() else {
            return Err("tone: render before setup".into());
        };

        let _speaking = self.speaking.lock().await;
        let duration_ms = self.duration_ms(&intent.text);
        let mut metadata = StreamMetadata::new(self.config.sample_rate, 1, SampleFormat::S16Le);
        metadata.text = Some(intent.text.clone());

        stream.notify_start(&metadata)?;
        let chunks = self.synthesize(duration_ms);
        let count = chunks.len();
        let mut outcome = Ok(());
        for chunk in chunks {
            if let Err(e) = stream.publish(chunk).await {
                outcome = Err(e);
                break;
            }
        }
        // close the session even when a fail-fast subscriber overflowed
        stream.notify_end(&metadata)?;

        debug!(
            session = %metadata.session_id,
            chunks = count,
            duration_ms,
            "Tone rendered"
        );
        Ok(outcome?)
    }

    async fn cleanup(&self) -> Result<(), BoxError> {
        self.stream.lock().take();
        Ok(())
    }
}
