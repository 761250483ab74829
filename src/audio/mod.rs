pub mod assembler;
#[cfg(feature = "microphone")]
pub mod microphone;
pub mod scripted;
pub mod source;

pub use assembler::{AudioChunk, ChunkAssembler};
#[cfg(feature = "microphone")]
pub use microphone::MicrophoneSource;
pub use scripted::ScriptedSource;
pub use source::{AudioFrame, AudioSource, AudioSourceError};
