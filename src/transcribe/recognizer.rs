use crate::language::LanguageCode;
use thiserror::Error;

/// One recognition call: canonical PCM plus the session's language priority
/// list and the clinical vocabulary boost list.
#[derive(Debug, Clone)]
pub struct RecognitionRequest {
    /// Normalized mono samples in [-1, 1]
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    /// Most-preferred first; the provider may detect any of them
    pub languages: Vec<LanguageCode>,
    /// Domain terms to bias recognition toward
    pub vocabulary: Vec<String>,
}

/// What the provider heard.
#[derive(Debug, Clone)]
pub struct RecognizerOutput {
    pub text: String,
    /// Provider confidence in [0, 1]
    pub confidence: f32,
    /// Language the provider settled on, when reported
    pub language: Option<LanguageCode>,
}

#[derive(Debug, Error)]
pub enum RecognizerError {
    /// Timeouts, connection resets, provider 5xx equivalents. The dispatcher
    /// retries these up to its budget.
    #[error("transient recognizer failure: {0}")]
    Transient(String),

    /// The provider rejected the request outright. Never retried.
    #[error("recognizer rejected request: {0}")]
    Rejected(String),
}

impl RecognizerError {
    pub fn is_transient(&self) -> bool {
        matches!(self, RecognizerError::Transient(_))
    }
}

/// External speech-recognition provider.
///
/// `Ok(None)` means the provider found no speech in the payload; the service
/// maps it to a `Silence` result. This is the only call in the pipeline
/// expected to suspend for a non-trivial duration, and the dispatcher bounds
/// and cancels it from outside.
#[async_trait::async_trait]
pub trait SpeechRecognizer: Send + Sync {
    async fn recognize(
        &self,
        request: RecognitionRequest,
    ) -> Result<Option<RecognizerOutput>, RecognizerError>;

    /// Provider name for logging.
    fn name(&self) -> &'static str;
}
