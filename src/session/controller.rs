use super::events::{SessionEvent, StopReason};
use super::registry::{SessionRegistry, SubjectClaim};
use super::state::SessionState;
use super::transcript::{Transcript, TranscriptSegment};
use crate::audio::{AudioFrame, AudioSource, AudioSourceError, ChunkAssembler};
use crate::config::PipelineConfig;
use crate::dispatch::Dispatcher;
use crate::language::{LanguagePolicy, LanguageSelection};
use crate::transcribe::{ChunkStatus, SpeechRecognizer, TranscriptionResult, TranscriptionService};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no primary language selected for the session")]
    MissingLanguageSelection,

    #[error("audio device unavailable")]
    DeviceUnavailable(#[source] AudioSourceError),

    #[error("subject {0} already has a live session")]
    SubjectBusy(String),

    #[error("cannot {operation} while session is {state}")]
    InvalidTransition {
        state: SessionState,
        operation: &'static str,
    },
}

/// Point-in-time snapshot of a session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    pub state: SessionState,
    pub started_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
    /// Elapsed recording time; live sessions measure up to now.
    pub duration_seconds: Option<f64>,
    pub chunks_dispatched: usize,
    pub segments: usize,
}

/// Owns one consultation session end to end: capture, chunking, dispatch,
/// transcript assembly, and the lifecycle state machine.
///
/// Each controller is self-contained: it owns its audio source, assembler
/// and dispatcher for exactly one session, and is spent once the session
/// reaches Stopped. A new session takes a new controller and a fresh,
/// explicit language selection.
pub struct SessionController {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    id: Uuid,
    subject_id: String,
    config: PipelineConfig,
    recognizer: Arc<dyn SpeechRecognizer>,
    registry: Option<SessionRegistry>,

    state: RwLock<SessionState>,
    /// Checked-and-set before any other stop side effect; makes stop()
    /// idempotent under re-entrant and concurrent calls.
    stop_guard: AtomicBool,
    started_at: Mutex<Option<DateTime<Utc>>>,
    stopped_at: Mutex<Option<DateTime<Utc>>>,
    policy: Mutex<Option<LanguagePolicy>>,
    transcript: Mutex<Transcript>,
    events: broadcast::Sender<SessionEvent>,
    paused: watch::Sender<bool>,
    capture_stop: CancellationToken,

    source: Mutex<Option<Box<dyn AudioSource>>>,
    dispatcher: Mutex<Option<Arc<Dispatcher>>>,
    claim: Mutex<Option<SubjectClaim>>,
    capture_task: Mutex<Option<JoinHandle<()>>>,
    result_task: Mutex<Option<JoinHandle<()>>>,
}

impl SessionController {
    pub fn new(
        subject_id: impl Into<String>,
        config: PipelineConfig,
        source: Box<dyn AudioSource>,
        recognizer: Arc<dyn SpeechRecognizer>,
    ) -> Self {
        Self::build(subject_id.into(), config, source, recognizer, None)
    }

    /// Controller that claims its subject in `registry` on start, enforcing
    /// one live session per subject across controllers.
    pub fn with_registry(
        subject_id: impl Into<String>,
        config: PipelineConfig,
        source: Box<dyn AudioSource>,
        recognizer: Arc<dyn SpeechRecognizer>,
        registry: SessionRegistry,
    ) -> Self {
        Self::build(subject_id.into(), config, source, recognizer, Some(registry))
    }

    fn build(
        subject_id: String,
        config: PipelineConfig,
        source: Box<dyn AudioSource>,
        recognizer: Arc<dyn SpeechRecognizer>,
        registry: Option<SessionRegistry>,
    ) -> Self {
        let (events, _) = broadcast::channel(256);
        let (paused, _) = watch::channel(false);
        Self {
            inner: Arc::new(SessionInner {
                id: Uuid::new_v4(),
                subject_id,
                config,
                recognizer,
                registry,
                state: RwLock::new(SessionState::Idle),
                stop_guard: AtomicBool::new(false),
                started_at: Mutex::new(None),
                stopped_at: Mutex::new(None),
                policy: Mutex::new(None),
                transcript: Mutex::new(Transcript::new()),
                events,
                paused,
                capture_stop: CancellationToken::new(),
                source: Mutex::new(Some(source)),
                dispatcher: Mutex::new(None),
                claim: Mutex::new(None),
                capture_task: Mutex::new(None),
                result_task: Mutex::new(None),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn subject_id(&self) -> &str {
        &self.inner.subject_id
    }

    pub async fn state(&self) -> SessionState {
        *self.inner.state.read().await
    }

    /// Subscribe to lifecycle, segment and diagnostic events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    /// Start recording.
    ///
    /// Refused without an explicit primary language; there is no default.
    /// On device acquisition failure the session never reaches Recording.
    pub async fn start(&self, selection: LanguageSelection) -> Result<(), SessionError> {
        let policy = LanguagePolicy::from_selection(&selection)
            .map_err(|_| SessionError::MissingLanguageSelection)?;

        let mut state = self.inner.state.write().await;
        if *state != SessionState::Idle {
            return Err(SessionError::InvalidTransition {
                state: *state,
                operation: "start",
            });
        }

        let claim = match &self.inner.registry {
            Some(registry) => Some(
                registry
                    .claim(&self.inner.subject_id)
                    .ok_or_else(|| SessionError::SubjectBusy(self.inner.subject_id.clone()))?,
            ),
            None => None,
        };

        let frames = {
            let mut source = self.inner.source.lock().await;
            let source = source.as_mut().ok_or_else(|| {
                SessionError::DeviceUnavailable(AudioSourceError::DeviceUnavailable(
                    "audio source already released".into(),
                ))
            })?;
            source.start().await.map_err(SessionError::DeviceUnavailable)?
        };

        let (result_tx, result_rx) = mpsc::channel(64);
        let service = Arc::new(TranscriptionService::new(
            Arc::clone(&self.inner.recognizer),
            self.inner.config.transcription.clone(),
        ));
        let dispatcher = Arc::new(Dispatcher::new(
            service,
            policy.clone(),
            self.inner.config.retry.clone(),
            result_tx,
        ));

        *self.inner.policy.lock().await = Some(policy);
        *self.inner.claim.lock().await = claim;
        *self.inner.dispatcher.lock().await = Some(Arc::clone(&dispatcher));
        *self.inner.started_at.lock().await = Some(Utc::now());

        let capture = tokio::spawn(capture_loop(
            Arc::clone(&self.inner),
            Arc::clone(&dispatcher),
            frames,
        ));
        *self.inner.capture_task.lock().await = Some(capture);

        let results = tokio::spawn(result_loop(Arc::clone(&self.inner), result_rx));
        *self.inner.result_task.lock().await = Some(results);

        *state = SessionState::Recording;
        drop(state);

        info!(
            session_id = %self.inner.id,
            subject_id = %self.inner.subject_id,
            "consultation session started"
        );
        self.inner.emit(SessionEvent::Started {
            session_id: self.inner.id,
            subject_id: self.inner.subject_id.clone(),
        });
        Ok(())
    }

    /// Suspend capture. Already-buffered audio is retained and rides the
    /// first post-resume flush.
    pub async fn pause(&self) -> Result<(), SessionError> {
        {
            let mut state = self.inner.state.write().await;
            if !state.can_pause() {
                return Err(SessionError::InvalidTransition {
                    state: *state,
                    operation: "pause",
                });
            }
            *state = SessionState::Paused;
        }

        if let Some(source) = self.inner.source.lock().await.as_mut() {
            if let Err(e) = source.pause().await {
                // The paused flag already suppresses frames; a device that
                // cannot pause keeps running muted.
                warn!(session_id = %self.inner.id, "audio source pause failed: {e}");
            }
        }
        self.inner.paused.send_replace(true);

        info!(session_id = %self.inner.id, "session paused");
        self.inner.emit(SessionEvent::Paused {
            session_id: self.inner.id,
        });
        Ok(())
    }

    /// Resume capture after a pause. The flush timer restarts with a full
    /// interval.
    pub async fn resume(&self) -> Result<(), SessionError> {
        {
            let mut state = self.inner.state.write().await;
            if !state.can_resume() {
                return Err(SessionError::InvalidTransition {
                    state: *state,
                    operation: "resume",
                });
            }
            *state = SessionState::Recording;
        }

        if let Some(source) = self.inner.source.lock().await.as_mut() {
            if let Err(e) = source.resume().await {
                warn!(session_id = %self.inner.id, "audio source resume failed: {e}");
            }
        }
        self.inner.paused.send_replace(false);

        info!(session_id = %self.inner.id, "session resumed");
        self.inner.emit(SessionEvent::Resumed {
            session_id: self.inner.id,
        });
        Ok(())
    }

    /// Stop the session. Idempotent: duplicate and concurrent calls are
    /// pure no-ops, and the Stopped notification fires exactly once.
    pub async fn stop(&self) {
        Arc::clone(&self.inner)
            .shutdown(StopReason::Requested)
            .await;
    }

    /// All segments (every status) in sequence order.
    pub async fn transcript(&self) -> Vec<TranscriptSegment> {
        self.inner.transcript.lock().await.segments()
    }

    /// Successful text in sequence order.
    pub async fn transcript_text(&self) -> String {
        self.inner.transcript.lock().await.text()
    }

    /// Chunks handed to the dispatcher so far.
    pub async fn dispatched_chunks(&self) -> usize {
        match self.inner.dispatcher.lock().await.as_ref() {
            Some(dispatcher) => dispatcher.dispatched(),
            None => 0,
        }
    }

    pub async fn stats(&self) -> SessionStats {
        let started_at = *self.inner.started_at.lock().await;
        let stopped_at = *self.inner.stopped_at.lock().await;
        let duration_seconds = started_at.map(|started| {
            let end = stopped_at.unwrap_or_else(Utc::now);
            (end - started).num_milliseconds() as f64 / 1000.0
        });
        SessionStats {
            state: *self.inner.state.read().await,
            started_at,
            stopped_at,
            duration_seconds,
            chunks_dispatched: self.dispatched_chunks().await,
            segments: self.inner.transcript.lock().await.len(),
        }
    }
}

impl SessionInner {
    fn emit(&self, event: SessionEvent) {
        // Err here only means nobody is subscribed
        let _ = self.events.send(event);
    }

    async fn shutdown(self: Arc<Self>, reason: StopReason) {
        // Guard first, before any other side effect.
        if self.stop_guard.swap(true, Ordering::SeqCst) {
            debug!(session_id = %self.id, "stop already handled, ignoring");
            return;
        }

        {
            let mut state = self.state.write().await;
            if *state == SessionState::Idle {
                // Never started: nothing to tear down, no lifecycle events.
                *state = SessionState::Stopped;
                return;
            }
            *state = SessionState::Stopping;
        }
        info!(session_id = %self.id, ?reason, "stopping consultation session");

        // The capture loop owns the flush timer and the frame buffer; ending
        // it cancels the timer and runs the final flush.
        self.capture_stop.cancel();
        if let Some(task) = self.capture_task.lock().await.take() {
            if let Err(e) = task.await {
                error!(session_id = %self.id, "capture task panicked: {e}");
            }
        }

        // Give in-flight chunks, the stop flush included, a bounded window
        // to resolve, then cancel whatever is left. After this, no new
        // recognizer activity can start.
        let dispatcher = self.dispatcher.lock().await.clone();
        if let Some(dispatcher) = &dispatcher {
            let drain = Duration::from_secs(self.config.chunking.stop_drain_secs);
            dispatcher.drain(drain).await;
            dispatcher.cancel_all();
            dispatcher.close();
        }

        if let Some(task) = self.result_task.lock().await.take() {
            if let Err(e) = task.await {
                error!(session_id = %self.id, "result task panicked: {e}");
            }
        }

        // Release the device.
        if let Some(mut source) = self.source.lock().await.take() {
            if let Err(e) = source.stop().await {
                warn!(session_id = %self.id, "audio source stop failed: {e}");
            }
        }

        // Free the subject slot for the next session.
        self.claim.lock().await.take();

        *self.stopped_at.lock().await = Some(Utc::now());
        let segments = self.transcript.lock().await.len();
        {
            let mut state = self.state.write().await;
            *state = SessionState::Stopped;
        }

        info!(session_id = %self.id, segments, "consultation session stopped");
        self.emit(SessionEvent::Stopped {
            session_id: self.id,
            reason,
            segments,
        });
    }
}

/// Buffers frames and cuts chunks on the periodic timer. The tick handler
/// only hands the chunk to the dispatcher and never blocks on I/O.
async fn capture_loop(
    inner: Arc<SessionInner>,
    dispatcher: Arc<Dispatcher>,
    mut frames: mpsc::Receiver<AudioFrame>,
) {
    let config = &inner.config;
    let mut assembler = ChunkAssembler::new(
        config.audio.sample_rate,
        config.chunking.min_final_flush_secs,
    );
    let period = Duration::from_secs(config.chunking.interval_secs);
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    let mut paused = inner.paused.subscribe();
    let mut device_lost = false;

    debug!(session_id = %inner.id, "capture loop started");
    loop {
        tokio::select! {
            _ = inner.capture_stop.cancelled() => break,

            maybe_frame = frames.recv() => match maybe_frame {
                Some(frame) => {
                    if !*paused.borrow() {
                        assembler.push(&frame);
                    }
                }
                None => {
                    warn!(session_id = %inner.id, "audio frame channel closed mid-session, device lost");
                    device_lost = true;
                    break;
                }
            },

            _ = ticker.tick(), if !*paused.borrow() => {
                if let Some(chunk) = assembler.flush() {
                    debug!(
                        session_id = %inner.id,
                        sequence = chunk.sequence,
                        seconds = chunk.duration_seconds,
                        "periodic flush"
                    );
                    dispatcher.dispatch(chunk);
                }
            }

            changed = paused.changed() => {
                if changed.is_ok() && !*paused.borrow() {
                    // Resumed: restart the timer so the next flush gets a
                    // full interval instead of a leftover partial one.
                    ticker = tokio::time::interval_at(
                        tokio::time::Instant::now() + period,
                        period,
                    );
                }
            }
        }
    }

    // Trailing audio rides one final chunk unless it is sub-minimum noise.
    if let Some(chunk) = assembler.final_flush() {
        info!(
            session_id = %inner.id,
            sequence = chunk.sequence,
            seconds = chunk.duration_seconds,
            "final flush at stop"
        );
        dispatcher.dispatch(chunk);
    }
    debug!(session_id = %inner.id, chunks = assembler.chunks_produced(), "capture loop finished");

    if device_lost {
        // Equivalent to a user-initiated stop; the guard makes the race
        // against an explicit stop() harmless.
        tokio::spawn(Arc::clone(&inner).shutdown(StopReason::DeviceLost));
    }
}

/// Folds results into the transcript in sequence order. This is the only
/// place the transcript is mutated.
async fn result_loop(inner: Arc<SessionInner>, mut results: mpsc::Receiver<TranscriptionResult>) {
    while let Some(result) = results.recv().await {
        let state = *inner.state.read().await;
        if state == SessionState::Stopped {
            // Shutdown joins this loop before the state reaches Stopped, so
            // this arm only fires if that teardown ordering is ever loosened.
            debug!(sequence = result.sequence, "result arrived after stop, ignoring");
            continue;
        }

        let sequence = result.sequence;
        match result.status {
            ChunkStatus::Success => {
                debug!(sequence, confidence = result.confidence, "transcript segment ready");
            }
            ChunkStatus::Silence => {
                warn!(sequence, average = result.amplitude.average, "chunk carried no detectable speech");
                inner.emit(SessionEvent::SilenceDetected {
                    session_id: inner.id,
                    sequence,
                    amplitude: result.amplitude,
                    duration_seconds: result.duration_seconds,
                });
            }
            ChunkStatus::Skipped => {
                debug!(sequence, "chunk below minimum duration, dropped");
            }
            ChunkStatus::Error => {
                warn!(sequence, "chunk failed after retries, transcript gap at this interval");
            }
        }

        let segment = TranscriptSegment::from_result(&result);
        let inserted = inner.transcript.lock().await.apply(segment.clone());
        if inserted {
            inner.emit(SessionEvent::Segment {
                session_id: inner.id,
                segment,
            });
        } else {
            debug!(sequence, "duplicate result ignored");
        }
    }
    debug!(session_id = %inner.id, "result loop finished");
}
