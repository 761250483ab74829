use chrono::{DateTime, Utc};
use tracing::debug;

use super::source::AudioFrame;

/// An immutable, sequence-numbered slice of captured audio, handed to the
/// dispatcher as one discrete transcription request.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Monotonic position within the session, starting at 1
    pub sequence: u64,
    /// Mono PCM payload
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Payload length in seconds
    pub duration_seconds: f64,
    /// When the chunk was cut from the buffer
    pub captured_at: DateTime<Utc>,
}

/// Buffers capture frames between flushes and cuts them into chunks.
///
/// Purely synchronous; the periodic flush driver lives in the session's
/// capture loop, so buffering and sequencing stay trivially unit-testable.
pub struct ChunkAssembler {
    sample_rate: u32,
    min_final_flush_secs: f64,
    buffer: Vec<i16>,
    next_sequence: u64,
}

impl ChunkAssembler {
    pub fn new(sample_rate: u32, min_final_flush_secs: f64) -> Self {
        Self {
            sample_rate,
            min_final_flush_secs,
            buffer: Vec::new(),
            next_sequence: 1,
        }
    }

    /// Append a capture frame to the pending buffer.
    pub fn push(&mut self, frame: &AudioFrame) {
        self.buffer.extend_from_slice(&frame.samples);
    }

    /// Seconds of audio currently buffered.
    pub fn buffered_seconds(&self) -> f64 {
        self.buffer.len() as f64 / self.sample_rate as f64
    }

    /// Cut the buffered audio into a chunk and clear the buffer.
    /// No-op on an empty buffer.
    pub fn flush(&mut self) -> Option<AudioChunk> {
        if self.buffer.is_empty() {
            return None;
        }
        let samples = std::mem::take(&mut self.buffer);
        let duration_seconds = samples.len() as f64 / self.sample_rate as f64;
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        Some(AudioChunk {
            sequence,
            samples,
            sample_rate: self.sample_rate,
            duration_seconds,
            captured_at: Utc::now(),
        })
    }

    /// One last flush at stop so trailing audio is not dropped. A residual
    /// buffer below the minimum viable duration is discarded as noise.
    pub fn final_flush(&mut self) -> Option<AudioChunk> {
        if self.buffered_seconds() < self.min_final_flush_secs {
            if !self.buffer.is_empty() {
                debug!(
                    seconds = self.buffered_seconds(),
                    "discarding sub-minimum residual buffer at stop"
                );
                self.buffer.clear();
            }
            return None;
        }
        self.flush()
    }

    /// Chunks produced so far.
    pub fn chunks_produced(&self) -> u64 {
        self.next_sequence - 1
    }
}
