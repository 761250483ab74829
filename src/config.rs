use anyhow::Result;
use serde::Deserialize;

use crate::transcribe::corrections::{default_corrections, Correction};

/// Pipeline-wide tunables.
///
/// Every numeric threshold here is empirically tuned rather than invariant,
/// so all of them are deployment configuration with working defaults. A
/// config file only needs the keys it wants to override.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PipelineConfig {
    pub audio: AudioConfig,
    pub chunking: ChunkingConfig,
    pub transcription: TranscriptionConfig,
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Capture sample rate in Hz (16kHz is what recognition providers want)
    pub sample_rate: u32,
    /// Number of channels (1 = mono)
    pub channels: u16,
    /// Size of each capture frame in milliseconds
    pub frame_duration_ms: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            channels: 1,
            frame_duration_ms: 100,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Seconds of audio between periodic flushes
    pub interval_secs: u64,
    /// Residual buffers shorter than this are discarded as noise at stop
    pub min_final_flush_secs: f64,
    /// How long stop() waits for in-flight chunks before cancelling them
    pub stop_drain_secs: u64,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            interval_secs: 10,
            min_final_flush_secs: 0.5,
            stop_drain_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TranscriptionConfig {
    /// Chunks shorter than this are skipped without calling the recognizer
    pub min_chunk_secs: f64,
    /// Mean absolute amplitude below which a chunk counts as silence
    pub silence_threshold: f32,
    /// Gain normalization scales a quiet chunk's peak toward this value
    pub gain_target_peak: f32,
    /// Upper bound on the normalization factor
    pub max_gain: f32,
    /// Domain vocabulary boost list sent with every recognition request
    pub vocabulary: Vec<String>,
    /// Deterministic post-corrections for known misrecognitions
    pub corrections: Vec<Correction>,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            min_chunk_secs: 0.5,
            silence_threshold: 0.01,
            gain_target_peak: 0.9,
            max_gain: 8.0,
            vocabulary: default_vocabulary(),
            corrections: default_corrections(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts per chunk, first try included
    pub max_attempts: u32,
    /// Delay before the first retry; doubles per attempt
    pub base_delay_ms: u64,
    /// Cap on the exponential backoff delay
    pub max_delay_ms: u64,
    /// Per-attempt deadline; exceeding it counts as a transient failure
    pub attempt_timeout_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 8_000,
            attempt_timeout_secs: 30,
        }
    }
}

impl PipelineConfig {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}

/// Clinical terms the recognizer is biased toward. Callers append their own
/// specialty vocabulary through `TranscriptionConfig::vocabulary`.
fn default_vocabulary() -> Vec<String> {
    [
        "hypertension",
        "hypotension",
        "tachycardia",
        "bradycardia",
        "atrial fibrillation",
        "myocardial infarction",
        "metformin",
        "amoxicillin",
        "ibuprofen",
        "anticoagulant",
        "auscultation",
        "dyspnea",
        "anaphylaxis",
        "subcutaneous",
        "intravenous",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}
