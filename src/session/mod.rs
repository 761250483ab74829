//! Consultation session management
//!
//! This module provides the `SessionController` abstraction that owns:
//! - The session lifecycle state machine (idempotent stop included)
//! - Audio capture and periodic chunk flushing
//! - Concurrent chunk dispatch and result collection
//! - Order-correct transcript assembly
//! - Lifecycle/segment/diagnostic event emission

mod controller;
mod events;
mod registry;
mod state;
mod transcript;

pub use controller::{SessionController, SessionError, SessionStats};
pub use events::{SessionEvent, StopReason};
pub use registry::{SessionRegistry, SubjectClaim};
pub use state::SessionState;
pub use transcript::{Transcript, TranscriptSegment};
