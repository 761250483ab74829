//! Real-time multilingual consultation transcription.
//!
//! Captures a clinician's spoken consultation, slices it into
//! sequence-numbered chunks on a periodic timer, streams each chunk
//! concurrently to a speech-recognition provider, and assembles an
//! order-correct transcript while the session is live.
//!
//! The entry point is [`SessionController`]: give it an [`AudioSource`], a
//! [`SpeechRecognizer`] and an explicit [`LanguageSelection`], then drive it
//! with `start`/`pause`/`resume`/`stop` and watch [`SessionEvent`]s.

pub mod audio;
pub mod config;
pub mod dispatch;
pub mod language;
pub mod session;
pub mod transcribe;

#[cfg(feature = "microphone")]
pub use audio::MicrophoneSource;
pub use audio::{AudioChunk, AudioFrame, AudioSource, AudioSourceError, ChunkAssembler, ScriptedSource};
pub use config::{AudioConfig, ChunkingConfig, PipelineConfig, RetryConfig, TranscriptionConfig};
pub use dispatch::Dispatcher;
pub use language::{LanguageCode, LanguagePolicy, LanguageSelection, MissingLanguageSelection};
pub use session::{
    SessionController, SessionError, SessionEvent, SessionRegistry, SessionState, SessionStats,
    StopReason, SubjectClaim, Transcript, TranscriptSegment,
};
pub use transcribe::{
    apply_corrections, AmplitudeStats, ChunkStatus, Correction, RecognitionRequest,
    RecognizerError, RecognizerOutput, SpeechRecognizer, TranscriptionResult, TranscriptionService,
};
