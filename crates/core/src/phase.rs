use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpinPhase {
    Situation,
    Problem,
    Implication,
    Payoff,
}

impl SpinPhase {
    pub const ALL: [SpinPhase; 4] = [Self::Situation, Self::Problem, Self::Implication, Self::Payoff];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Situation => "situation",
            Self::Problem => "problem",
            Self::Implication => "implication",
            Self::Payoff => "payoff",
        }
    }
}

impl fmt::Display for SpinPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SpinPhase {
    type Err = PhaseTransitionError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "situation" | "s" => Ok(Self::Situation),
            "problem" | "p" => Ok(Self::Problem),
            "implication" | "i" => Ok(Self::Implication),
            "payoff" | "need-payoff" | "need_payoff" | "needpayoff" | "n" => Ok(Self::Payoff),
            other => Err(PhaseTransitionError::UnknownPhase(other.to_string())),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionSource {
    Manual,
    Advisory,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Idle,
    Live,
    Paused,
    Ended,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseState {
    pub current_phase: SpinPhase,
    pub phase_elapsed_seconds: u64,
    pub total_elapsed_seconds: u64,
    pub per_phase_elapsed_seconds: BTreeMap<SpinPhase, u64>,
}

impl Default for PhaseState {
    fn default() -> Self {
        Self {
            current_phase: SpinPhase::Situation,
            phase_elapsed_seconds: 0,
            total_elapsed_seconds: 0,
            per_phase_elapsed_seconds: SpinPhase::ALL.into_iter().map(|phase| (phase, 0)).collect(),
        }
    }
}

impl PhaseState {
    pub fn elapsed_in(&self, phase: SpinPhase) -> u64 {
        self.per_phase_elapsed_seconds.get(&phase).copied().unwrap_or(0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseTransition {
    pub from: SpinPhase,
    pub to: SpinPhase,
    pub source: TransitionSource,
    pub left_after_seconds: u64,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PhaseTransitionError {
    #[error("session has not started; cannot move to {to}")]
    NotStarted { to: SpinPhase },
    #[error("session has ended; cannot move to {to}")]
    SessionEnded { to: SpinPhase },
    #[error("unknown SPIN phase `{0}`")]
    UnknownPhase(String),
}

impl From<PhaseTransitionError> for DomainError {
    fn from(error: PhaseTransitionError) -> Self {
        match error {
            PhaseTransitionError::NotStarted { .. } | PhaseTransitionError::SessionEnded { .. } => {
                DomainError::SessionNotLive
            }
            PhaseTransitionError::UnknownPhase(_) => DomainError::InvariantViolation(error.to_string()),
        }
    }
}

/// Current SPIN phase plus elapsed-time counters for one session.
///
/// Counters only advance on [`PhaseTracker::tick`] while the session is live. Any phase
/// may be entered from any other; entering a different phase zeroes the phase timer but
/// leaves the total and per-phase accumulators untouched.
#[derive(Clone, Debug)]
pub struct PhaseTracker {
    state: PhaseState,
    status: SessionStatus,
}

impl Default for PhaseTracker {
    fn default() -> Self {
        Self { state: PhaseState::default(), status: SessionStatus::Idle }
    }
}

impl PhaseTracker {
    pub fn state(&self) -> &PhaseState {
        &self.state
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn current(&self) -> SpinPhase {
        self.state.current_phase
    }

    pub fn is_live(&self) -> bool {
        self.status == SessionStatus::Live
    }

    /// Resets to `situation` with all counters at zero and goes live.
    pub fn start(&mut self) {
        self.state = PhaseState::default();
        self.status = SessionStatus::Live;
    }

    pub fn pause(&mut self) -> bool {
        if self.status != SessionStatus::Live {
            return false;
        }
        self.status = SessionStatus::Paused;
        true
    }

    pub fn resume(&mut self) -> bool {
        if self.status != SessionStatus::Paused {
            return false;
        }
        self.status = SessionStatus::Live;
        true
    }

    pub fn end(&mut self) {
        self.status = SessionStatus::Ended;
    }

    /// One-second tick. Returns `false` without touching counters unless live.
    pub fn tick(&mut self) -> bool {
        if !self.is_live() {
            return false;
        }

        let current = self.state.current_phase;
        self.state.total_elapsed_seconds += 1;
        self.state.phase_elapsed_seconds += 1;
        *self.state.per_phase_elapsed_seconds.entry(current).or_insert(0) += 1;
        true
    }

    /// Moves to `to`. `Ok(None)` when already there.
    pub fn transition_to(
        &mut self,
        to: SpinPhase,
        source: TransitionSource,
    ) -> Result<Option<PhaseTransition>, PhaseTransitionError> {
        match self.status {
            SessionStatus::Idle => return Err(PhaseTransitionError::NotStarted { to }),
            SessionStatus::Ended => return Err(PhaseTransitionError::SessionEnded { to }),
            SessionStatus::Live | SessionStatus::Paused => {}
        }

        let from = self.state.current_phase;
        if from == to {
            return Ok(None);
        }

        let left_after_seconds = self.state.phase_elapsed_seconds;
        self.state.current_phase = to;
        self.state.phase_elapsed_seconds = 0;

        Ok(Some(PhaseTransition { from, to, source, left_after_seconds }))
    }
}

#[cfg(test)]
mod tests {
    use super::{
        PhaseTracker, PhaseTransitionError, SessionStatus, SpinPhase, TransitionSource,
    };

    fn live_tracker() -> PhaseTracker {
        let mut tracker = PhaseTracker::default();
        tracker.start();
        tracker
    }

    #[test]
    fn manual_change_at_tick_150_splits_per_phase_time() {
        let mut tracker = live_tracker();

        for _ in 0..150 {
            assert!(tracker.tick());
        }
        let transition = tracker
            .transition_to(SpinPhase::Problem, TransitionSource::Manual)
            .expect("live session accepts transitions")
            .expect("phase actually changes");
        assert_eq!(transition.from, SpinPhase::Situation);
        assert_eq!(transition.left_after_seconds, 150);

        for _ in 0..151 {
            assert!(tracker.tick());
        }

        let state = tracker.state();
        assert_eq!(state.elapsed_in(SpinPhase::Situation), 150);
        assert_eq!(state.elapsed_in(SpinPhase::Problem), 151);
        assert_eq!(state.total_elapsed_seconds, 301);
        assert_eq!(state.phase_elapsed_seconds, 151);
    }

    #[test]
    fn phase_timer_is_zero_right_after_transition_and_increases_after() {
        let mut tracker = live_tracker();
        for _ in 0..5 {
            tracker.tick();
        }

        for (index, phase) in
            [SpinPhase::Implication, SpinPhase::Situation, SpinPhase::Payoff].into_iter().enumerate()
        {
            let source =
                if index % 2 == 0 { TransitionSource::Advisory } else { TransitionSource::Manual };
            tracker.transition_to(phase, source).expect("transition accepted");
            assert_eq!(tracker.state().phase_elapsed_seconds, 0);

            let mut previous = 0;
            for _ in 0..3 {
                tracker.tick();
                assert!(tracker.state().phase_elapsed_seconds > previous);
                previous = tracker.state().phase_elapsed_seconds;
            }
        }
    }

    #[test]
    fn total_elapsed_never_decreases() {
        let mut tracker = live_tracker();
        let mut previous_total = 0;
        let script = [
            Some(SpinPhase::Problem),
            None,
            Some(SpinPhase::Problem),
            Some(SpinPhase::Situation),
            None,
            Some(SpinPhase::Payoff),
        ];

        for step in script.iter().cycle().take(60) {
            if let Some(phase) = step {
                tracker.transition_to(*phase, TransitionSource::Manual).expect("accepted");
            }
            tracker.tick();
            assert!(tracker.state().total_elapsed_seconds >= previous_total);
            previous_total = tracker.state().total_elapsed_seconds;
        }
        assert_eq!(previous_total, 60);
    }

    #[test]
    fn same_phase_transition_is_a_noop() {
        let mut tracker = live_tracker();
        tracker.tick();
        tracker.tick();

        let outcome = tracker.transition_to(SpinPhase::Situation, TransitionSource::Manual);
        assert_eq!(outcome, Ok(None));
        assert_eq!(tracker.state().phase_elapsed_seconds, 2);
    }

    #[test]
    fn ticks_only_count_while_live() {
        let mut tracker = PhaseTracker::default();
        assert!(!tracker.tick(), "idle sessions do not tick");

        tracker.start();
        tracker.tick();
        assert!(tracker.pause());
        assert!(!tracker.tick());
        assert!(!tracker.pause(), "already paused");
        assert!(tracker.resume());
        tracker.tick();
        tracker.end();
        assert!(!tracker.tick());

        assert_eq!(tracker.state().total_elapsed_seconds, 2);
        assert_eq!(tracker.status(), SessionStatus::Ended);
    }

    #[test]
    fn start_resets_all_counters() {
        let mut tracker = live_tracker();
        tracker.transition_to(SpinPhase::Payoff, TransitionSource::Advisory).expect("accepted");
        tracker.tick();

        tracker.start();
        assert_eq!(tracker.current(), SpinPhase::Situation);
        assert_eq!(tracker.state().total_elapsed_seconds, 0);
        assert!(tracker.state().per_phase_elapsed_seconds.values().all(|seconds| *seconds == 0));
        assert_eq!(tracker.state().per_phase_elapsed_seconds.len(), 4);
    }

    #[test]
    fn transitions_outside_a_session_are_rejected() {
        let mut tracker = PhaseTracker::default();
        assert_eq!(
            tracker.transition_to(SpinPhase::Problem, TransitionSource::Manual),
            Err(PhaseTransitionError::NotStarted { to: SpinPhase::Problem })
        );

        tracker.start();
        tracker.end();
        assert!(matches!(
            tracker.transition_to(SpinPhase::Problem, TransitionSource::Advisory),
            Err(PhaseTransitionError::SessionEnded { .. })
        ));
    }

    #[test]
    fn parses_phase_aliases() {
        assert_eq!("Need-Payoff".parse::<SpinPhase>(), Ok(SpinPhase::Payoff));
        assert_eq!("problem".parse::<SpinPhase>(), Ok(SpinPhase::Problem));
        assert!("closing".parse::<SpinPhase>().is_err());
    }
}
