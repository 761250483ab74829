//! Microphone capture via cpal.
//!
//! The cpal stream lives on a dedicated capture thread: the input callback
//! fires on the platform's audio thread and is never scheduled behind the
//! caller's runtime, and `cpal::Stream` being `!Send` stays contained.
//! Control (pause/resume/stop) crosses over on a std channel.

use super::source::{AudioFrame, AudioSource, AudioSourceError};
use crate::config::AudioConfig;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{RecvTimeoutError, Sender as StdSender};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

enum Control {
    Pause,
    Resume,
    Stop,
}

pub struct MicrophoneSource {
    config: AudioConfig,
    control: Option<StdSender<Control>>,
}

impl MicrophoneSource {
    pub fn new(config: AudioConfig) -> Self {
        Self {
            config,
            control: None,
        }
    }

    fn send_control(&self, control: Control) -> Result<(), AudioSourceError> {
        match &self.control {
            Some(tx) => tx.send(control).map_err(|_| AudioSourceError::NotCapturing),
            None => Err(AudioSourceError::NotCapturing),
        }
    }
}

#[async_trait::async_trait]
impl AudioSource for MicrophoneSource {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>, AudioSourceError> {
        let (frame_tx, frame_rx) = mpsc::channel(64);
        let (control_tx, control_rx) = std::sync::mpsc::channel();
        let (ready_tx, ready_rx) = std::sync::mpsc::channel();
        let config = self.config.clone();

        std::thread::Builder::new()
            .name("mic-capture".into())
            .spawn(move || capture_thread(config, frame_tx, control_rx, ready_tx))
            .map_err(|e| AudioSourceError::DeviceUnavailable(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                self.control = Some(control_tx);
                info!("microphone capture started");
                Ok(frame_rx)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(AudioSourceError::DeviceUnavailable(
                "capture thread exited before reporting readiness".into(),
            )),
        }
    }

    async fn pause(&mut self) -> Result<(), AudioSourceError> {
        self.send_control(Control::Pause)
    }

    async fn resume(&mut self) -> Result<(), AudioSourceError> {
        self.send_control(Control::Resume)
    }

    async fn stop(&mut self) -> Result<(), AudioSourceError> {
        if let Some(tx) = self.control.take() {
            let _ = tx.send(Control::Stop);
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.control.is_some()
    }

    fn name(&self) -> &'static str {
        "microphone"
    }
}

fn capture_thread(
    config: AudioConfig,
    frame_tx: mpsc::Sender<AudioFrame>,
    control_rx: std::sync::mpsc::Receiver<Control>,
    ready_tx: StdSender<Result<(), AudioSourceError>>,
) {
    let host = cpal::default_host();
    let device = match host.default_input_device() {
        Some(device) => device,
        None => {
            let _ = ready_tx.send(Err(AudioSourceError::DeviceUnavailable(
                "no default input device".into(),
            )));
            return;
        }
    };

    let stream_config = StreamConfig {
        channels: config.channels,
        sample_rate: SampleRate(config.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let frame_ms = config.frame_duration_ms.max(1);
    let frame_len = (config.sample_rate as u64 * frame_ms / 1000) as usize;
    let mut pending: Vec<i16> = Vec::with_capacity(frame_len);
    let mut timestamp_ms: u64 = 0;
    let failed = Arc::new(AtomicBool::new(false));

    let data_tx = frame_tx.clone();
    let stream = device.build_input_stream(
        &stream_config,
        move |data: &[f32], _: &cpal::InputCallbackInfo| {
            for &sample in data {
                let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                pending.push(value);
                if pending.len() == frame_len {
                    let samples = std::mem::replace(&mut pending, Vec::with_capacity(frame_len));
                    let frame = AudioFrame {
                        samples,
                        sample_rate: config.sample_rate,
                        timestamp_ms,
                    };
                    timestamp_ms += frame_ms;
                    // The queue absorbs scheduling jitter; a full queue means
                    // the consumer stalled and the frame is dropped.
                    if data_tx.try_send(frame).is_err() {
                        warn!("frame queue full, dropping capture frame");
                    }
                }
            }
        },
        {
            let failed = Arc::clone(&failed);
            move |err| {
                error!("capture stream error: {err}");
                failed.store(true, Ordering::SeqCst);
            }
        },
        None,
    );

    let stream = match stream {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready_tx.send(Err(AudioSourceError::Stream(e.to_string())));
            return;
        }
    };

    if let Err(e) = stream.play() {
        let _ = ready_tx.send(Err(AudioSourceError::Stream(e.to_string())));
        return;
    }
    let _ = ready_tx.send(Ok(()));

    loop {
        match control_rx.recv_timeout(Duration::from_millis(250)) {
            Ok(Control::Pause) => {
                if let Err(e) = stream.pause() {
                    warn!("failed to pause capture stream: {e}");
                }
            }
            Ok(Control::Resume) => {
                if let Err(e) = stream.play() {
                    warn!("failed to resume capture stream: {e}");
                }
            }
            Ok(Control::Stop) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {
                if failed.load(Ordering::SeqCst) {
                    // Dropping the stream and frame sender below surfaces
                    // this to the session as a lost device.
                    break;
                }
            }
        }
    }

    drop(stream);
    drop(frame_tx);
    info!("microphone capture stopped");
}
