//! Debounced advisory cadence.
//!
//! A cycle is split in two halves so the caller decides how to await the network:
//! [`CoachingOrchestrator::begin_cycle`] checks eligibility, flips the call state to
//! `InFlight` and builds the request; [`CoachingOrchestrator::complete_cycle`] applies
//! the outcome to the session and returns the call state to `Idle`.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use callcoach_core::config::CoachingConfig;
use callcoach_core::phase::{PhaseTransition, TransitionSource};
use callcoach_core::session::{CardSignal, SessionContext};

use crate::advisory::{AdvisoryRequest, AdvisoryResponse, RequestLimits};
use crate::llm::{AdvisoryClient, AdvisoryError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallState {
    Idle,
    InFlight,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    InFlight,
    NotLive,
    NoNewLines,
    Debounce,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AdvisoryStatus {
    Disabled,
    Idle,
    Ok { at: DateTime<Utc>, confidence: f64 },
    Unavailable { at: DateTime<Utc>, reason: String },
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OrchestratorSettings {
    pub debounce: Duration,
    pub confidence_threshold: f64,
    pub limits: RequestLimits,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from(&CoachingConfig::default())
    }
}

impl From<&CoachingConfig> for OrchestratorSettings {
    fn from(config: &CoachingConfig) -> Self {
        Self {
            debounce: Duration::seconds(i64::try_from(config.debounce_secs).unwrap_or(i64::MAX / 1_000)),
            confidence_threshold: config.confidence_threshold,
            limits: RequestLimits::from(config),
        }
    }
}

/// Everything a completed cycle changed.
#[derive(Clone, Debug, PartialEq)]
pub struct CycleOutcome {
    pub status: AdvisoryStatus,
    pub response: Option<AdvisoryResponse>,
    pub transition: Option<PhaseTransition>,
    pub whisper: Option<String>,
    pub risk: Option<String>,
    pub tip: Option<CardSignal>,
}

#[derive(Clone, Debug)]
pub struct CoachingOrchestrator {
    settings: OrchestratorSettings,
    state: CallState,
    last_call_at: Option<DateTime<Utc>>,
    lines_seen: u64,
}

impl CoachingOrchestrator {
    pub fn new(settings: OrchestratorSettings) -> Self {
        Self { settings, state: CallState::Idle, last_call_at: None, lines_seen: 0 }
    }

    pub fn state(&self) -> CallState {
        self.state
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Forgets any in-flight call and cadence history; used on session switch.
    pub fn reset(&mut self) {
        self.state = CallState::Idle;
        self.last_call_at = None;
        self.lines_seen = 0;
    }

    pub fn begin_cycle(
        &mut self,
        session: &SessionContext,
        now: DateTime<Utc>,
    ) -> Result<AdvisoryRequest, SkipReason> {
        if self.state == CallState::InFlight {
            return Err(SkipReason::InFlight);
        }
        if !session.phase().is_live() {
            return Err(SkipReason::NotLive);
        }
        let accepted = session.feed().accepted();
        if accepted <= self.lines_seen || session.feed().is_empty() {
            return Err(SkipReason::NoNewLines);
        }
        if self.last_call_at.is_some_and(|last| now - last < self.settings.debounce) {
            return Err(SkipReason::Debounce);
        }

        self.state = CallState::InFlight;
        self.last_call_at = Some(now);
        self.lines_seen = accepted;
        Ok(AdvisoryRequest::from_session(session, &self.settings.limits, now))
    }

    pub fn complete_cycle(
        &mut self,
        session: &mut SessionContext,
        result: Result<String, AdvisoryError>,
        now: DateTime<Utc>,
    ) -> CycleOutcome {
        self.state = CallState::Idle;
        let correlation_id = session.session_id().unwrap_or("none").to_string();

        let raw = match result {
            Ok(raw) => raw,
            Err(error) => {
                warn!(
                    event_name = "coach.advisory.failed",
                    correlation_id = %correlation_id,
                    error = %error,
                    "advisory call failed; static cards remain available"
                );
                return CycleOutcome {
                    status: AdvisoryStatus::Unavailable { at: now, reason: error.to_string() },
                    response: None,
                    transition: None,
                    whisper: None,
                    risk: None,
                    tip: None,
                };
            }
        };

        let current = session.phase().current();
        let threshold = self.settings.confidence_threshold;
        let response = AdvisoryResponse::parse(&raw, current).gated(threshold);
        let actionable = response.is_actionable(threshold);

        // Below the threshold nothing is applied, including the stage.
        let transition = match response.stage.filter(|stage| actionable && *stage != current) {
            Some(stage) => match session.set_phase(stage, TransitionSource::Advisory) {
                Ok(transition) => transition,
                Err(error) => {
                    debug!(
                        correlation_id = %correlation_id,
                        error = %error,
                        "advisory stage change ignored"
                    );
                    None
                }
            },
            None => None,
        };

        let whisper =
            Some(response.coach_whisper.clone()).filter(|whisper| !whisper.trim().is_empty());
        let tip = match response.suggested_card().filter(|_| actionable) {
            Some(key) if session.library().contains(key) => session.surface_tip(key, now).ok(),
            Some(key) => {
                debug!(correlation_id = %correlation_id, card = key, "advisory named unknown card");
                None
            }
            None => None,
        };

        info!(
            event_name = "coach.advisory.completed",
            correlation_id = %correlation_id,
            confidence = response.confidence,
            actionable,
            stage_changed = transition.is_some(),
            "advisory cycle completed"
        );

        CycleOutcome {
            status: AdvisoryStatus::Ok { at: now, confidence: response.confidence },
            risk: response.risk.clone().filter(|_| actionable),
            response: Some(response),
            transition,
            whisper,
            tip,
        }
    }

    /// Runs one full cycle inline, awaiting the client. `None` when the cycle was skipped.
    pub async fn run_cycle(
        &mut self,
        session: &mut SessionContext,
        client: &dyn AdvisoryClient,
        now: DateTime<Utc>,
    ) -> Option<CycleOutcome> {
        let request = self.begin_cycle(session, now).ok()?;
        let result = client.advise(&request).await;
        Some(self.complete_cycle(session, result, now))
    }
}
