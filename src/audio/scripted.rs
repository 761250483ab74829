//! Deterministic audio source for tests and batch replay.
//!
//! Emits a prepared frame list on a spawned task at the capture cadence.
//! Under `tokio::time::pause` the emission schedule advances with the test
//! clock, which makes timer-driven session scenarios reproducible.

use super::source::{AudioFrame, AudioSource, AudioSourceError};
use crate::config::AudioConfig;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub struct ScriptedSource {
    frames: Option<Vec<AudioFrame>>,
    frame_interval: Duration,
    close_when_exhausted: bool,
    paused: watch::Sender<bool>,
    cancel: CancellationToken,
    capturing: bool,
    stop_calls: Arc<AtomicUsize>,
}

impl ScriptedSource {
    pub fn new(frames: Vec<AudioFrame>, frame_interval: Duration) -> Self {
        let (paused, _) = watch::channel(false);
        Self {
            frames: Some(frames),
            frame_interval,
            close_when_exhausted: false,
            paused,
            cancel: CancellationToken::new(),
            capturing: false,
            stop_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Constant-amplitude frames covering `total`, emitted at the configured
    /// frame cadence. `amplitude` is a raw i16 sample value.
    pub fn speech(total: Duration, amplitude: i16, config: &AudioConfig) -> Self {
        let frames = constant_frames(total, amplitude, config);
        Self::new(frames, Duration::from_millis(config.frame_duration_ms))
    }

    /// All-zero frames covering `total`.
    pub fn silence(total: Duration, config: &AudioConfig) -> Self {
        Self::speech(total, 0, config)
    }

    /// Close the frame channel once the script runs out instead of idling.
    /// The session controller sees that as a lost device.
    pub fn close_when_exhausted(mut self) -> Self {
        self.close_when_exhausted = true;
        self
    }

    /// Counter bumped on every `stop()` call; used to assert single device
    /// release under concurrent stops.
    pub fn stop_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.stop_calls)
    }
}

fn constant_frames(total: Duration, amplitude: i16, config: &AudioConfig) -> Vec<AudioFrame> {
    let frame_ms = config.frame_duration_ms.max(1);
    let samples_per_frame = (config.sample_rate as u64 * frame_ms / 1000) as usize;
    let count = (total.as_millis() as u64 / frame_ms) as usize;
    (0..count)
        .map(|i| AudioFrame {
            samples: vec![amplitude; samples_per_frame],
            sample_rate: config.sample_rate,
            timestamp_ms: i as u64 * frame_ms,
        })
        .collect()
}

#[async_trait::async_trait]
impl AudioSource for ScriptedSource {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>, AudioSourceError> {
        let frames = self
            .frames
            .take()
            .ok_or_else(|| AudioSourceError::DeviceUnavailable("script already consumed".into()))?;

        let (tx, rx) = mpsc::channel(64);
        let mut paused_rx = self.paused.subscribe();
        let cancel = self.cancel.clone();
        let interval = self.frame_interval;
        let hold_open = !self.close_when_exhausted;

        tokio::spawn(async move {
            'emit: for frame in frames {
                // Hold emission while paused, like a muted device.
                while *paused_rx.borrow() {
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        changed = paused_rx.changed() => {
                            if changed.is_err() {
                                return;
                            }
                        }
                    }
                }
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(interval) => {}
                }
                if tx.send(frame).await.is_err() {
                    break 'emit;
                }
            }
            if hold_open {
                // Script exhausted but the mic is still "open": keep the
                // channel alive until the session stops.
                cancel.cancelled().await;
            }
            debug!("scripted source emission finished");
        });

        self.capturing = true;
        Ok(rx)
    }

    async fn pause(&mut self) -> Result<(), AudioSourceError> {
        if !self.capturing {
            return Err(AudioSourceError::NotCapturing);
        }
        self.paused.send_replace(true);
        Ok(())
    }

    async fn resume(&mut self) -> Result<(), AudioSourceError> {
        if !self.capturing {
            return Err(AudioSourceError::NotCapturing);
        }
        self.paused.send_replace(false);
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), AudioSourceError> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        self.cancel.cancel();
        self.capturing = false;
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn emits_frames_at_cadence() {
        let config = AudioConfig::default();
        let mut source = ScriptedSource::speech(Duration::from_millis(300), 1000, &config);
        let mut rx = source.start().await.unwrap();

        for i in 0..3u64 {
            let frame = rx.recv().await.unwrap();
            assert_eq!(frame.timestamp_ms, i * 100);
            assert_eq!(frame.samples.len(), 1600);
        }
        source.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn closes_channel_when_exhausted() {
        let config = AudioConfig::default();
        let mut source =
            ScriptedSource::speech(Duration::from_millis(200), 500, &config).close_when_exhausted();
        let mut rx = source.start().await.unwrap();

        let mut received = 0;
        while rx.recv().await.is_some() {
            received += 1;
        }
        assert_eq!(received, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_suspends_emission() {
        let config = AudioConfig::default();
        let mut source = ScriptedSource::speech(Duration::from_secs(2), 500, &config);
        let mut rx = source.start().await.unwrap();

        assert!(rx.recv().await.is_some());
        source.pause().await.unwrap();

        let paused_recv = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await;
        assert!(paused_recv.is_err(), "no frames while paused");

        source.resume().await.unwrap();
        assert!(rx.recv().await.is_some());
        source.stop().await.unwrap();
    }
}
