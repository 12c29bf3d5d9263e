//! Stream subscriber measuring S16LE audio levels.

use async_trait::async_trait;
use parking_lot::Mutex;
use relay_stream::StreamSubscriber;
use relay_types::{AudioChunk, BoxError, SampleFormat, StreamMetadata};
use serde::Serialize;
use tracing::info;

/// Levels of the current (or last) session.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct MeterReading {
    /// Sessions seen so far.
    pub sessions: u64,
    /// Chunks in the current session.
    pub chunks: u64,
    /// Samples in the current session.
    pub samples: u64,
    /// Peak absolute level in `0.0..=1.0`.
    pub peak: f64,
    /// Root mean square level in `0.0..=1.0`.
    pub rms: f64,
}

#[derive(Debug, Default)]
struct Accumulator {
    reading: MeterReading,
    sum_squares: f64,
    format: Option<SampleFormat>,
}

/// Peak/RMS meter fed by the streaming channel.
#[derive(Debug, Default)]
pub struct AudioMeter {
    state: Mutex<Accumulator>,
}

impl AudioMeter {
    /// A meter with no readings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current reading.
    #[must_use]
    pub fn reading(&self) -> MeterReading {
        self.state.lock().reading
    }
}

#[async_trait]
impl StreamSubscriber for AudioMeter {
    async fn on_start(&self, metadata: &StreamMetadata) -> Result<(), BoxError> {
        let mut state = self.state.lock();
        let sessions = state.reading.sessions + 1;
        *state = Accumulator {
            reading: MeterReading {
                sessions,
                ..MeterReading::default()
            },
            sum_squares: 0.0,
            format: Some(metadata.format),
        };
        Ok(())
    }

    async fn on_chunk(&self, chunk: AudioChunk) -> Result<(), BoxError> {
        let mut state = self.state.lock();
        if state.format != Some(SampleFormat::S16Le) {
            return Err(format!("meter: unsupported format {:?}", state.format).into());
        }
        if chunk.len() % 2 != 0 {
            return Err(format!("meter: chunk {} has an odd byte count", chunk.sequence).into());
        }

        for pair in chunk.data.chunks_exact(2) {
            let level = f64::from(i16::from_le_bytes([pair[0], pair[1]])) / f64::from(i16::MAX);
            state.sum_squares += level * level;
            state.reading.peak = state.reading.peak.max(level.abs().min(1.0));
        }
        state.reading.chunks += 1;
        state.reading.samples += (chunk.len() / 2) as u64;
        if state.reading.samples > 0 {
            state.reading.rms = (state.sum_squares / state.reading.samples as f64).sqrt();
        }
        Ok(())
    }

    async fn on_end(&self, metadata: &StreamMetadata) -> Result<(), BoxError> {
        let reading = self.reading();
        info!(
            session = %metadata.session_id,
            chunks = reading.chunks,
            peak = format!("{:.3}", reading.peak),
            rms = format!("{:.3}", reading.rms),
            "[AudioMeter] Session finished"
        );
        Ok(())
    }
}
