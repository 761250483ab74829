//! Per-chunk dispatch: one task per chunk, bounded sequential retries
//! inside a task, cooperative cancellation across all of them.
//!
//! Ordering is restored downstream from sequence numbers, so nothing here
//! serializes chunks against each other. One slow or failing chunk never
//! holds up its neighbours.

use crate::audio::AudioChunk;
use crate::config::RetryConfig;
use crate::language::LanguagePolicy;
use crate::transcribe::{TranscriptionResult, TranscriptionService};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub struct Dispatcher {
    service: Arc<TranscriptionService>,
    policy: LanguagePolicy,
    retry: RetryConfig,
    results: Mutex<Option<mpsc::Sender<TranscriptionResult>>>,
    cancel: CancellationToken,
    inflight: Mutex<Vec<JoinHandle<()>>>,
    dispatched: AtomicUsize,
}

impl Dispatcher {
    pub fn new(
        service: Arc<TranscriptionService>,
        policy: LanguagePolicy,
        retry: RetryConfig,
        results: mpsc::Sender<TranscriptionResult>,
    ) -> Self {
        Self {
            service,
            policy,
            retry,
            results: Mutex::new(Some(results)),
            cancel: CancellationToken::new(),
            inflight: Mutex::new(Vec::new()),
            dispatched: AtomicUsize::new(0),
        }
    }

    /// Chunks handed to dispatch tasks so far.
    pub fn dispatched(&self) -> usize {
        self.dispatched.load(Ordering::SeqCst)
    }

    /// Hand one chunk to its own dispatch task.
    ///
    /// Called from the flush tick, so it must return immediately: all it
    /// does is spawn. Chunks arriving after cancellation are refused.
    pub fn dispatch(&self, chunk: AudioChunk) {
        if self.cancel.is_cancelled() {
            debug!(sequence = chunk.sequence, "dispatcher cancelled, refusing chunk");
            return;
        }
        let results = match lock(&self.results).as_ref() {
            Some(sender) => sender.clone(),
            None => {
                debug!(sequence = chunk.sequence, "dispatcher closed, refusing chunk");
                return;
            }
        };

        self.dispatched.fetch_add(1, Ordering::SeqCst);
        let handle = tokio::spawn(run_chunk(
            Arc::clone(&self.service),
            self.policy.clone(),
            self.retry.clone(),
            chunk,
            self.cancel.child_token(),
            results,
        ));
        let mut inflight = lock(&self.inflight);
        // Sweep resolved handles here so the vector stays bounded by the
        // number of genuinely outstanding chunks, not session length.
        inflight.retain(|task| !task.is_finished());
        inflight.push(handle);
    }

    /// Chunk task handles currently tracked. Finished handles are swept on
    /// the next `dispatch`.
    pub fn inflight(&self) -> usize {
        lock(&self.inflight).len()
    }

    /// Cancel every outstanding chunk task. Terminal: the dispatcher refuses
    /// new chunks afterwards.
    pub fn cancel_all(&self) {
        self.cancel.cancel();
    }

    /// Stop accepting results. In-flight tasks holding a sender clone finish
    /// sending; the controller's result loop ends once they do.
    pub fn close(&self) {
        lock(&self.results).take();
    }

    /// Wait up to `timeout` for in-flight chunks to resolve, then cancel and
    /// abort whatever is left.
    pub async fn drain(&self, timeout: Duration) {
        let handles: Vec<JoinHandle<()>> = lock(&self.inflight).drain(..).collect();
        if handles.is_empty() {
            return;
        }
        let deadline = tokio::time::Instant::now() + timeout;
        for mut handle in handles {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if tokio::time::timeout(remaining, &mut handle).await.is_err() {
                warn!("in-flight chunk did not resolve within the drain window, cancelling");
                self.cancel.cancel();
                handle.abort();
            }
        }
    }
}

// Mutex poisoning carries no invariant here; take the data either way.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

async fn run_chunk(
    service: Arc<TranscriptionService>,
    policy: LanguagePolicy,
    retry: RetryConfig,
    chunk: AudioChunk,
    token: CancellationToken,
    results: mpsc::Sender<TranscriptionResult>,
) {
    let sequence = chunk.sequence;
    let attempt_timeout = Duration::from_secs(retry.attempt_timeout_secs);
    let mut attempt: u32 = 1;

    let result = loop {
        let outcome = tokio::select! {
            // Cancellation is terminal and not a failure: no result, no log
            // beyond debug.
            _ = token.cancelled() => {
                debug!(sequence, "chunk dispatch cancelled");
                return;
            }
            outcome = tokio::time::timeout(attempt_timeout, service.transcribe(&chunk, &policy)) => outcome,
        };

        match outcome {
            Ok(Ok(result)) => break result,
            Ok(Err(err)) if err.is_transient() && attempt < retry.max_attempts => {
                warn!(sequence, attempt, error = %err, "transient transcription failure, retrying");
            }
            Ok(Err(err)) => {
                warn!(
                    sequence,
                    attempt,
                    error = %err,
                    "transcription failed, marking chunk as error"
                );
                break TranscriptionResult::error(sequence, chunk.duration_seconds);
            }
            Err(_) if attempt < retry.max_attempts => {
                warn!(sequence, attempt, "transcription attempt timed out, retrying");
            }
            Err(_) => {
                warn!(
                    sequence,
                    attempt, "retry budget exhausted on timeout, marking chunk as error"
                );
                break TranscriptionResult::error(sequence, chunk.duration_seconds);
            }
        }

        let delay = backoff_delay(&retry, attempt);
        attempt += 1;
        tokio::select! {
            _ = token.cancelled() => {
                debug!(sequence, "chunk dispatch cancelled during backoff");
                return;
            }
            _ = tokio::time::sleep(delay) => {}
        }
    };

    if results.send(result).await.is_err() {
        debug!(sequence, "result channel closed, dropping chunk result");
    }
}

/// base * 2^(attempt-1), capped.
fn backoff_delay(retry: &RetryConfig, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    let millis = retry
        .base_delay_ms
        .saturating_mul(1u64 << exponent)
        .min(retry.max_delay_ms);
    Duration::from_millis(millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let retry = RetryConfig {
            max_attempts: 5,
            base_delay_ms: 500,
            max_delay_ms: 3_000,
            attempt_timeout_secs: 30,
        };
        assert_eq!(backoff_delay(&retry, 1), Duration::from_millis(500));
        assert_eq!(backoff_delay(&retry, 2), Duration::from_millis(1_000));
        assert_eq!(backoff_delay(&retry, 3), Duration::from_millis(2_000));
        assert_eq!(backoff_delay(&retry, 4), Duration::from_millis(3_000));
        assert_eq!(backoff_delay(&retry, 10), Duration::from_millis(3_000));
    }
}
