use thiserror::Error;
use tokio::sync::mpsc;

/// A fixed-size block of mono PCM samples from a capture device.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw samples (i16 PCM)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Milliseconds since capture started
    pub timestamp_ms: u64,
}

impl AudioFrame {
    pub fn duration_seconds(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

#[derive(Debug, Error)]
pub enum AudioSourceError {
    #[error("audio input device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("audio capture stream error: {0}")]
    Stream(String),

    #[error("audio source is not capturing")]
    NotCapturing,
}

/// Audio capture backend.
///
/// `start` hands back the frame channel; emission happens on the backend's
/// own capture context (a cpal callback thread for the microphone, a spawned
/// task for the scripted source) so callers are never in the signal path.
/// The channel closing mid-session means the device was lost.
#[async_trait::async_trait]
pub trait AudioSource: Send {
    /// Acquire the device and start emitting frames.
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>, AudioSourceError>;

    /// Suspend frame emission without releasing the device.
    async fn pause(&mut self) -> Result<(), AudioSourceError>;

    /// Resume frame emission after a pause.
    async fn resume(&mut self) -> Result<(), AudioSourceError>;

    /// Stop capturing and release the device.
    async fn stop(&mut self) -> Result<(), AudioSourceError>;

    /// Whether the backend currently holds the device.
    fn is_capturing(&self) -> bool;

    /// Backend name for logging.
    fn name(&self) -> &'static str;
}
