//! Chunk validation and transcription.
//!
//! The service is the only place that talks to the external recognizer. It
//! front-loads the cheap checks (duration, amplitude, gain rescue) so silent
//! or too-short chunks never cost a provider call, and post-processes the
//! returned text deterministically.

pub mod corrections;
pub mod recognizer;

pub use corrections::{apply_corrections, default_corrections, Correction};
pub use recognizer::{RecognitionRequest, RecognizerError, RecognizerOutput, SpeechRecognizer};

use crate::audio::AudioChunk;
use crate::config::TranscriptionConfig;
use crate::language::{LanguageCode, LanguagePolicy};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Terminal classification for one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkStatus {
    /// Transcribed text is attached
    Success,
    /// No detectable speech, even after gain normalization
    Silence,
    /// Below the minimum duration; recognizer never called
    Skipped,
    /// Retry budget exhausted; this interval is a transcript gap
    Error,
}

/// Peak and mean absolute amplitude over a chunk, normalized to [0, 1].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AmplitudeStats {
    pub peak: f32,
    pub average: f32,
}

impl AmplitudeStats {
    pub fn measure(samples: &[f32]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }
        let mut peak = 0.0f32;
        let mut sum = 0.0f64;
        for &sample in samples {
            let magnitude = sample.abs();
            peak = peak.max(magnitude);
            sum += magnitude as f64;
        }
        Self {
            peak,
            average: (sum / samples.len() as f64) as f32,
        }
    }
}

/// Outcome of one chunk's trip through the service, keyed by the chunk's
/// sequence number so the controller can place it.
#[derive(Debug, Clone, Serialize)]
pub struct TranscriptionResult {
    pub sequence: u64,
    pub status: ChunkStatus,
    pub text: String,
    pub confidence: f32,
    pub language: Option<LanguageCode>,
    pub amplitude: AmplitudeStats,
    pub duration_seconds: f64,
}

impl TranscriptionResult {
    pub fn skipped(sequence: u64, duration_seconds: f64) -> Self {
        Self {
            sequence,
            status: ChunkStatus::Skipped,
            text: String::new(),
            confidence: 0.0,
            language: None,
            amplitude: AmplitudeStats::default(),
            duration_seconds,
        }
    }

    pub fn silence(sequence: u64, amplitude: AmplitudeStats, duration_seconds: f64) -> Self {
        Self {
            sequence,
            status: ChunkStatus::Silence,
            text: String::new(),
            confidence: 0.0,
            language: None,
            amplitude,
            duration_seconds,
        }
    }

    pub fn error(sequence: u64, duration_seconds: f64) -> Self {
        Self {
            sequence,
            status: ChunkStatus::Error,
            text: String::new(),
            confidence: 0.0,
            language: None,
            amplitude: AmplitudeStats::default(),
            duration_seconds,
        }
    }
}

/// Validates chunks and calls the recognizer.
pub struct TranscriptionService {
    recognizer: Arc<dyn SpeechRecognizer>,
    config: TranscriptionConfig,
}

impl TranscriptionService {
    pub fn new(recognizer: Arc<dyn SpeechRecognizer>, config: TranscriptionConfig) -> Self {
        Self { recognizer, config }
    }

    /// Transcribe one chunk.
    ///
    /// `Skipped` and `Silence` resolve locally without a provider call and
    /// are terminal for the chunk. Provider errors propagate as `Err` for
    /// the dispatcher to classify and retry.
    pub async fn transcribe(
        &self,
        chunk: &AudioChunk,
        policy: &LanguagePolicy,
    ) -> Result<TranscriptionResult, RecognizerError> {
        let sequence = chunk.sequence;
        let duration = chunk.duration_seconds;

        if duration < self.config.min_chunk_secs {
            debug!(sequence, duration, "chunk below minimum duration, skipping");
            return Ok(TranscriptionResult::skipped(sequence, duration));
        }

        let mut samples = decode_pcm(&chunk.samples);
        let mut amplitude = AmplitudeStats::measure(&samples);

        if amplitude.average < self.config.silence_threshold {
            // One gain pass before giving up: quiet mics are common and the
            // recognizer call is the expensive part.
            let gained = apply_gain(&samples, self.config.gain_target_peak, self.config.max_gain);
            let gained_amplitude = AmplitudeStats::measure(&gained);
            if gained_amplitude.average < self.config.silence_threshold {
                debug!(
                    sequence,
                    average = amplitude.average,
                    "chunk is silence after gain normalization"
                );
                return Ok(TranscriptionResult::silence(sequence, amplitude, duration));
            }
            samples = gained;
            amplitude = gained_amplitude;
        }

        let request = RecognitionRequest {
            samples,
            sample_rate: chunk.sample_rate,
            languages: policy.priority(),
            vocabulary: self.config.vocabulary.clone(),
        };

        match self.recognizer.recognize(request).await? {
            None => {
                debug!(sequence, "recognizer returned no result, mapping to silence");
                Ok(TranscriptionResult::silence(sequence, amplitude, duration))
            }
            Some(output) => {
                let text = apply_corrections(&output.text, &self.config.corrections);
                Ok(TranscriptionResult {
                    sequence,
                    status: ChunkStatus::Success,
                    text,
                    confidence: output.confidence.clamp(0.0, 1.0),
                    language: output.language,
                    amplitude,
                    duration_seconds: duration,
                })
            }
        }
    }
}

/// i16 PCM to normalized f32.
pub(crate) fn decode_pcm(samples: &[i16]) -> Vec<f32> {
    samples
        .iter()
        .map(|&sample| sample as f32 / 32_768.0)
        .collect()
}

/// Scale samples so the peak approaches `target_peak`, capped at `max_gain`.
/// All-zero input comes back unchanged.
fn apply_gain(samples: &[f32], target_peak: f32, max_gain: f32) -> Vec<f32> {
    let peak = samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
    if peak <= f32::EPSILON {
        return samples.to_vec();
    }
    let gain = (target_peak / peak).min(max_gain);
    samples.iter().map(|s| s * gain).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::LanguageSelection;
    use chrono::Utc;
    use mockall::mock;
    use mockall::predicate::always;

    mock! {
        pub Recognizer {}

        #[async_trait::async_trait]
        impl SpeechRecognizer for Recognizer {
            async fn recognize(
                &self,
                request: RecognitionRequest,
            ) -> Result<Option<RecognizerOutput>, RecognizerError>;

            fn name(&self) -> &'static str;
        }
    }

    fn policy() -> LanguagePolicy {
        LanguagePolicy::from_selection(&LanguageSelection::primary(LanguageCode::En)).unwrap()
    }

    fn chunk(sequence: u64, samples: Vec<i16>) -> AudioChunk {
        let duration_seconds = samples.len() as f64 / 16_000.0;
        AudioChunk {
            sequence,
            samples,
            sample_rate: 16_000,
            duration_seconds,
            captured_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn short_chunk_skipped_without_recognizer_call() {
        // No expectation set: any recognize call would panic the mock.
        let recognizer = MockRecognizer::new();
        let service = TranscriptionService::new(Arc::new(recognizer), Default::default());

        // 0.2s < 0.5s minimum
        let result = service
            .transcribe(&chunk(3, vec![5_000; 3_200]), &policy())
            .await
            .unwrap();

        assert_eq!(result.status, ChunkStatus::Skipped);
        assert_eq!(result.sequence, 3);
    }

    #[tokio::test]
    async fn silent_chunk_resolves_without_recognizer_call() {
        let recognizer = MockRecognizer::new();
        let service = TranscriptionService::new(Arc::new(recognizer), Default::default());

        // ~0.0005 normalized amplitude; even 8x gain stays under 0.01
        let result = service
            .transcribe(&chunk(1, vec![16; 16_000]), &policy())
            .await
            .unwrap();

        assert_eq!(result.status, ChunkStatus::Silence);
        assert!(result.amplitude.average > 0.0);
        assert!(result.amplitude.average < 0.01);
    }

    #[tokio::test]
    async fn quiet_chunk_is_rescued_by_gain_normalization() {
        let mut recognizer = MockRecognizer::new();
        recognizer
            .expect_recognize()
            .with(always())
            .times(1)
            .returning(|request| {
                // The service must hand over the gained samples
                let amplitude = AmplitudeStats::measure(&request.samples);
                assert!(amplitude.average >= 0.01);
                Ok(Some(RecognizerOutput {
                    text: "faint but audible".into(),
                    confidence: 0.7,
                    language: Some(LanguageCode::En),
                }))
            });
        let service = TranscriptionService::new(Arc::new(recognizer), Default::default());

        // ~0.004 normalized; 8x gain lifts it above the 0.01 threshold
        let result = service
            .transcribe(&chunk(2, vec![130; 16_000]), &policy())
            .await
            .unwrap();

        assert_eq!(result.status, ChunkStatus::Success);
        assert_eq!(result.text, "faint but audible");
    }

    #[tokio::test]
    async fn recognizer_no_result_maps_to_silence() {
        let mut recognizer = MockRecognizer::new();
        recognizer
            .expect_recognize()
            .times(1)
            .returning(|_| Ok(None));
        let service = TranscriptionService::new(Arc::new(recognizer), Default::default());

        let result = service
            .transcribe(&chunk(4, vec![5_000; 16_000]), &policy())
            .await
            .unwrap();

        assert_eq!(result.status, ChunkStatus::Silence);
    }

    #[tokio::test]
    async fn success_applies_corrections_and_language_priority() {
        let mut recognizer = MockRecognizer::new();
        recognizer
            .expect_recognize()
            .times(1)
            .returning(|request| {
                assert_eq!(request.languages[0], LanguageCode::Fr);
                assert_eq!(request.languages.len(), LanguageCode::ALL.len());
                assert!(request.vocabulary.iter().any(|term| term == "metformin"));
                Ok(Some(RecognizerOutput {
                    text: "patient prend met forming".into(),
                    confidence: 0.93,
                    language: Some(LanguageCode::Fr),
                }))
            });
        let service = TranscriptionService::new(Arc::new(recognizer), Default::default());
        let policy =
            LanguagePolicy::from_selection(&LanguageSelection::primary(LanguageCode::Fr)).unwrap();

        let result = service
            .transcribe(&chunk(1, vec![5_000; 16_000]), &policy)
            .await
            .unwrap();

        assert_eq!(result.status, ChunkStatus::Success);
        assert_eq!(result.text, "patient prend metformin");
        assert_eq!(result.language, Some(LanguageCode::Fr));
    }

    #[tokio::test]
    async fn provider_error_propagates_for_retry() {
        let mut recognizer = MockRecognizer::new();
        recognizer
            .expect_recognize()
            .times(1)
            .returning(|_| Err(RecognizerError::Transient("503".into())));
        let service = TranscriptionService::new(Arc::new(recognizer), Default::default());

        let err = service
            .transcribe(&chunk(5, vec![5_000; 16_000]), &policy())
            .await
            .unwrap_err();

        assert!(err.is_transient());
    }

    #[test]
    fn amplitude_stats_measure() {
        let stats = AmplitudeStats::measure(&[0.5, -1.0, 0.0, 0.5]);
        assert_eq!(stats.peak, 1.0);
        assert!((stats.average - 0.5).abs() < 1e-6);
    }

    #[test]
    fn gain_leaves_all_zero_input_alone() {
        let samples = vec![0.0f32; 100];
        assert_eq!(apply_gain(&samples, 0.9, 8.0), samples);
    }
}
