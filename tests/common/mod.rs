#![allow(dead_code)]

use async_trait::async_trait;
use consult_scribe::{RecognitionRequest, RecognizerError, RecognizerOutput, SpeechRecognizer};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Log output for debugging test runs (`RUST_LOG` style filtering via the
/// default subscriber). Safe to call from every test; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// What the scripted recognizer should do for one call.
pub enum RecognizerReply {
    Text(String),
    /// Sleep first, then answer. Drives out-of-order completion and
    /// attempt-timeout scenarios under the paused test clock.
    DelayedText(Duration, String),
    NoSpeech,
    Fail(RecognizerError),
}

/// Recognizer driven by a closure over (request, call index).
///
/// Records every request so tests can assert on what actually reached the
/// provider: payload length, language priority, vocabulary.
pub struct ScriptedRecognizer {
    script: Box<dyn Fn(&RecognitionRequest, usize) -> RecognizerReply + Send + Sync>,
    calls: AtomicUsize,
    requests: Mutex<Vec<RecognitionRequest>>,
}

impl ScriptedRecognizer {
    pub fn new(
        script: impl Fn(&RecognitionRequest, usize) -> RecognizerReply + Send + Sync + 'static,
    ) -> Self {
        Self {
            script: Box::new(script),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Answers every call with "segment <n>", n counting from 1.
    pub fn echo() -> Self {
        Self::new(|_, index| RecognizerReply::Text(format!("segment {}", index + 1)))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<RecognitionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl SpeechRecognizer for ScriptedRecognizer {
    async fn recognize(
        &self,
        request: RecognitionRequest,
    ) -> Result<Option<RecognizerOutput>, RecognizerError> {
        let index = self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        let reply = (self.script)(&request, index);
        let output = |text: String| RecognizerOutput {
            language: request.languages.first().copied(),
            confidence: 0.92,
            text,
        };
        match reply {
            RecognizerReply::Text(text) => Ok(Some(output(text))),
            RecognizerReply::DelayedText(delay, text) => {
                tokio::time::sleep(delay).await;
                Ok(Some(output(text)))
            }
            RecognizerReply::NoSpeech => Ok(None),
            RecognizerReply::Fail(err) => Err(err),
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}
