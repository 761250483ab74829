use super::transcript::TranscriptSegment;
use crate::transcribe::AmplitudeStats;
use serde::Serialize;
use uuid::Uuid;

/// Why a session reached Stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Caller called stop()
    Requested,
    /// The capture device went away mid-session
    DeviceLost,
}

/// Everything a caller can observe while a session is live.
///
/// Lifecycle events fire exactly once each; `Segment` fires once per chunk;
/// `SilenceDetected` is a non-blocking diagnostic (for example to prompt
/// "speak louder") while recording continues.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    Started {
        session_id: Uuid,
        subject_id: String,
    },
    Paused {
        session_id: Uuid,
    },
    Resumed {
        session_id: Uuid,
    },
    Stopped {
        session_id: Uuid,
        reason: StopReason,
        segments: usize,
    },
    Segment {
        session_id: Uuid,
        segment: TranscriptSegment,
    },
    SilenceDetected {
        session_id: Uuid,
        sequence: u64,
        amplitude: AmplitudeStats,
        duration_seconds: f64,
    },
}
