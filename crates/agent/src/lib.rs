//! Advisory orchestration for live call coaching.
//!
//! The core crate decides which battlecard to show from transcript text alone. This
//! crate adds the slower loop around it: a debounced call to an external advisory
//! service, confidence gating of whatever comes back, SPIN phase nudges, time-boxed
//! whispers, and the runtime task that serializes all of it.
//!
//! # Safety Principle
//!
//! The advisory service is strictly optional. Malformed payloads, low confidence, and
//! network failures all collapse to "no suggestion"; static cards keep working.

pub mod advisory;
pub mod llm;
pub mod orchestrator;
pub mod runtime;
pub mod whisper;

pub use advisory::{AdvisoryRequest, AdvisoryResponse, RequestLimits};
pub use llm::{
    client_from_config, AdvisoryClient, AdvisoryError, DisabledAdvisoryClient, HttpAdvisoryClient,
};
pub use orchestrator::{AdvisoryStatus, CallState, CoachingOrchestrator, CycleOutcome};
pub use runtime::{
    Clock, CoachEvent, CoachHandle, CoachRuntime, CoachSignal, CoachSnapshot, SystemClock,
};
pub use whisper::{Whisper, WhisperPriority, WhisperSlot};
