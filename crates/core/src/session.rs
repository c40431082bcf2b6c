//! Per-call coaching state owned by a single writer.
//!
//! `SessionContext` ties the caption feed, cooldowns, SPIN phase tracker and the card
//! library together and keeps the one card currently shown to the salesperson.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::battlecards::{Battlecard, BattlecardLibrary, CardCategory};
use crate::config::CoachingConfig;
use crate::cooldown::{CooldownPolicy, CooldownReason, CooldownRegistry};
use crate::errors::DomainError;
use crate::feed::{Caption, FeedBuffer, FeedLine};
use crate::matcher::{MatchResult, MatchSet, TriggerMatcher};
use crate::phase::{
    PhaseTracker, PhaseTransition, PhaseTransitionError, SessionStatus, SpinPhase,
    TransitionSource,
};

/// Context supplied when a call starts; feeds the advisory request.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionProfile {
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub deal_state: String,
    #[serde(default)]
    pub proof_points: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardSource {
    Trigger,
    AdvisoryTip,
}

/// Outward signal for the card currently on screen.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardSignal {
    pub card: String,
    pub category: CardCategory,
    pub title: String,
    pub primary_response: String,
    pub follow_up_prompt: String,
    pub score: u32,
    pub source: CardSource,
}

impl CardSignal {
    fn from_card(card: &Battlecard, score: u32, source: CardSource) -> Self {
        Self {
            card: card.key.clone(),
            category: card.category,
            title: card.title.clone(),
            primary_response: card.primary_response.clone(),
            follow_up_prompt: card.follow_up_prompt.clone(),
            score,
            source,
        }
    }

    fn from_match(result: &MatchResult) -> Self {
        Self::from_card(&result.card, result.score, CardSource::Trigger)
    }
}

/// How the card on screen changed after the window was re-scored.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ActiveChange {
    Surfaced(CardSignal),
    /// The trigger card's lines left the window and nothing else matches.
    Cleared(String),
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IngestOutcome {
    /// The accepted line; `None` for blank, stale or re-delivered captions.
    pub line: Option<FeedLine>,
    /// Set when the active card changed as a result of this caption.
    pub change: Option<ActiveChange>,
}

impl IngestOutcome {
    pub fn surfaced(&self) -> Option<&CardSignal> {
        match &self.change {
            Some(ActiveChange::Surfaced(signal)) => Some(signal),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TickOutcome {
    /// Whether the phase timers advanced; false unless live.
    pub advanced: bool,
    pub change: Option<ActiveChange>,
}

#[derive(Clone, Debug)]
pub struct SessionContext {
    session_id: Option<String>,
    profile: SessionProfile,
    library: BattlecardLibrary,
    matcher: TriggerMatcher,
    policy: CooldownPolicy,
    feed: FeedBuffer,
    cooldowns: CooldownRegistry,
    phase: PhaseTracker,
    matches: MatchSet,
    active: Option<CardSignal>,
}

impl SessionContext {
    pub fn new(library: BattlecardLibrary, config: &CoachingConfig) -> Self {
        Self {
            session_id: None,
            profile: SessionProfile::default(),
            library,
            matcher: TriggerMatcher::new(config.scoring_rules()),
            policy: config.cooldown_policy(),
            feed: FeedBuffer::new(config.feed_capacity, config.window_secs),
            cooldowns: CooldownRegistry::default(),
            phase: PhaseTracker::default(),
            matches: MatchSet::default(),
            active: None,
        }
    }

    /// Starts a fresh session: feed, cooldowns, active card and phase counters are reset.
    pub fn start(&mut self, profile: SessionProfile) -> &str {
        self.reset();
        self.profile = profile;
        self.phase.start();
        self.session_id.insert(Uuid::new_v4().to_string()).as_str()
    }

    pub fn end(&mut self) {
        self.phase.end();
        self.feed.clear();
        self.matches = MatchSet::default();
        self.active = None;
    }

    pub fn pause(&mut self) -> bool {
        self.phase.pause()
    }

    pub fn resume(&mut self) -> bool {
        self.phase.resume()
    }

    /// One-second tick: prunes the feed, advances phase timers and, while live, re-scores
    /// what is left of the window.
    pub fn tick(&mut self, now: DateTime<Utc>) -> TickOutcome {
        self.feed.prune(now);
        let advanced = self.phase.tick();
        let change = if self.phase.is_live() { self.reevaluate(now) } else { None };
        TickOutcome { advanced, change }
    }

    pub fn ingest(
        &mut self,
        caption: Caption,
        now: DateTime<Utc>,
    ) -> Result<IngestOutcome, DomainError> {
        if !self.phase.is_live() {
            return Err(DomainError::SessionNotLive);
        }

        let Some(line) = self.feed.push(caption, now).cloned() else {
            return Ok(IngestOutcome::default());
        };
        let change = self.reevaluate(now);
        Ok(IngestOutcome { line: Some(line), change })
    }

    /// Scores the current window. A different winner replaces the active card; a trigger
    /// card with no winner left is cleared. Advisory tips stay until replaced or acted on.
    pub fn reevaluate(&mut self, now: DateTime<Utc>) -> Option<ActiveChange> {
        let window = self.feed.window_texts(now);
        self.matches = self.matcher.evaluate(&self.library, &window, &self.cooldowns, now);

        let Some(best) = self.matches.best.as_ref() else {
            if self.active.as_ref().is_some_and(|active| active.source == CardSource::Trigger) {
                return self.active.take().map(|active| ActiveChange::Cleared(active.card));
            }
            return None;
        };
        if self.active.as_ref().is_some_and(|active| active.card == best.card.key) {
            return None;
        }
        let signal = CardSignal::from_match(best);
        self.active = Some(signal.clone());
        Some(ActiveChange::Surfaced(signal))
    }

    pub fn use_card(&mut self, key: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, DomainError> {
        self.suppress_card(key, CooldownReason::Used, now)
    }

    pub fn dismiss_card(
        &mut self,
        key: &str,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, DomainError> {
        self.suppress_card(key, CooldownReason::Dismissed, now)
    }

    /// Shows `key` immediately as an advisory tip and puts it on the tip cooldown.
    pub fn surface_tip(&mut self, key: &str, now: DateTime<Utc>) -> Result<CardSignal, DomainError> {
        let card = self.library.get(key).ok_or_else(|| DomainError::UnknownCard(key.to_string()))?;
        let signal = CardSignal::from_card(card, 0, CardSource::AdvisoryTip);
        self.cooldowns.suppress(key, self.policy.seconds_for(CooldownReason::AdvisoryTip), now);
        self.active = Some(signal.clone());
        Ok(signal)
    }

    pub fn set_phase(
        &mut self,
        phase: SpinPhase,
        source: TransitionSource,
    ) -> Result<Option<PhaseTransition>, PhaseTransitionError> {
        self.phase.transition_to(phase, source)
    }

    /// Merges cards into the library; returns the resulting library size.
    pub fn augment_library(&mut self, cards: Vec<Battlecard>) -> Result<usize, DomainError> {
        self.library = self.library.merged(cards)?;
        Ok(self.library.len())
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn profile(&self) -> &SessionProfile {
        &self.profile
    }

    pub fn status(&self) -> SessionStatus {
        self.phase.status()
    }

    pub fn phase(&self) -> &PhaseTracker {
        &self.phase
    }

    pub fn feed(&self) -> &FeedBuffer {
        &self.feed
    }

    pub fn cooldowns(&self) -> &CooldownRegistry {
        &self.cooldowns
    }

    pub fn library(&self) -> &BattlecardLibrary {
        &self.library
    }

    pub fn matches(&self) -> &MatchSet {
        &self.matches
    }

    pub fn active(&self) -> Option<&CardSignal> {
        self.active.as_ref()
    }

    fn suppress_card(
        &mut self,
        key: &str,
        reason: CooldownReason,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, DomainError> {
        if !self.library.contains(key) {
            return Err(DomainError::UnknownCard(key.to_string()));
        }
        let until = self.cooldowns.suppress(key, self.policy.seconds_for(reason), now);
        if self.active.as_ref().is_some_and(|active| active.card == key) {
            self.active = None;
        }
        Ok(until)
    }

    fn reset(&mut self) {
        self.feed.clear();
        self.cooldowns.clear();
        self.phase = PhaseTracker::default();
        self.matches = MatchSet::default();
        self.active = None;
        self.profile = SessionProfile::default();
    }
}
