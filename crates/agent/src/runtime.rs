//! Coach runtime: the single writer for one salesperson's coaching state.
//!
//! Every input (captions, operator actions, the 1 Hz tick, advisory results) arrives on
//! one bounded channel and is handled in arrival order. Only the advisory call leaves the
//! loop; its result is posted back tagged with the session epoch so results from a
//! session that has since ended are dropped.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use callcoach_core::battlecards::{Battlecard, BattlecardLibrary};
use callcoach_core::config::CoachingConfig;
use callcoach_core::errors::{ApplicationError, DomainError};
use callcoach_core::feed::Caption;
use callcoach_core::phase::{PhaseState, SessionStatus, SpinPhase, TransitionSource};
use callcoach_core::session::{ActiveChange, CardSignal, SessionContext, SessionProfile};

use crate::advisory::AdvisoryRequest;
use crate::llm::{AdvisoryClient, AdvisoryError};
use crate::orchestrator::{
    AdvisoryStatus, CallState, CoachingOrchestrator, CycleOutcome, OrchestratorSettings,
};
use crate::whisper::{Whisper, WhisperPriority, WhisperSlot};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Clone, Debug)]
pub enum CoachEvent {
    StartSession { profile: SessionProfile },
    EndSession,
    Pause,
    Resume,
    Caption(Caption),
    BridgeReady { timestamp: DateTime<Utc> },
    Tick,
    UseCard { key: String },
    DismissCard { key: String },
    SetPhase { phase: SpinPhase },
    AugmentLibrary { cards: Vec<Battlecard> },
    AdvisoryCompleted { epoch: u64, result: Result<String, AdvisoryError> },
}

impl CoachEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::StartSession { .. } => "start_session",
            Self::EndSession => "end_session",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Caption(_) => "caption",
            Self::BridgeReady { .. } => "bridge_ready",
            Self::Tick => "tick",
            Self::UseCard { .. } => "use_card",
            Self::DismissCard { .. } => "dismiss_card",
            Self::SetPhase { .. } => "set_phase",
            Self::AugmentLibrary { .. } => "augment_library",
            Self::AdvisoryCompleted { .. } => "advisory_completed",
        }
    }
}

/// Outward notifications for the overlay.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum CoachSignal {
    #[serde(rename_all = "camelCase")]
    Session { session_id: Option<String>, status: SessionStatus },
    Card(CardSignal),
    CardCleared { card: String },
    Whisper { text: String, priority: WhisperPriority },
    WhisperCleared,
    SayNext { text: String, confidence: f64 },
    Phase { from: SpinPhase, to: SpinPhase, source: TransitionSource },
    Advisory { status: AdvisoryStatus },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoachSnapshot {
    pub session_id: Option<String>,
    pub status: SessionStatus,
    pub phase: PhaseState,
    pub active_card: Option<CardSignal>,
    pub alt_card: Option<String>,
    pub persona_card: Option<String>,
    pub whisper: Option<Whisper>,
    pub say_next: Option<String>,
    pub advisory: AdvisoryStatus,
    pub call_state: CallState,
    pub bridge_seen_at: Option<DateTime<Utc>>,
    pub cooled_down: Vec<String>,
    pub feed_lines: usize,
    pub library_size: usize,
    pub updated_at: DateTime<Utc>,
}

type Reply = oneshot::Sender<Result<(), ApplicationError>>;

struct Inbound {
    event: CoachEvent,
    reply: Option<Reply>,
}

/// Cloneable front door to a running [`CoachRuntime`].
#[derive(Clone)]
pub struct CoachHandle {
    events: mpsc::Sender<Inbound>,
    snapshot: watch::Receiver<CoachSnapshot>,
    signals: broadcast::Sender<CoachSignal>,
}

impl CoachHandle {
    /// Queues an event without waiting for it to be handled.
    pub async fn send(&self, event: CoachEvent) -> Result<(), ApplicationError> {
        self.events
            .send(Inbound { event, reply: None })
            .await
            .map_err(|_| ApplicationError::Capture("coach runtime has stopped".to_string()))
    }

    /// Queues an event, failing immediately when the channel is full.
    pub fn try_send(&self, event: CoachEvent) -> Result<(), ApplicationError> {
        self.events.try_send(Inbound { event, reply: None }).map_err(|error| match error {
            mpsc::error::TrySendError::Full(_) => {
                ApplicationError::Capture("coach event channel is full".to_string())
            }
            mpsc::error::TrySendError::Closed(_) => {
                ApplicationError::Capture("coach runtime has stopped".to_string())
            }
        })
    }

    /// Queues an event and waits for the runtime's verdict.
    pub async fn request(&self, event: CoachEvent) -> Result<(), ApplicationError> {
        let (reply, verdict) = oneshot::channel();
        self.events
            .send(Inbound { event, reply: Some(reply) })
            .await
            .map_err(|_| ApplicationError::Capture("coach runtime has stopped".to_string()))?;
        verdict
            .await
            .map_err(|_| ApplicationError::Capture("coach runtime dropped the request".to_string()))?
    }

    pub fn is_running(&self) -> bool {
        !self.events.is_closed()
    }

    pub fn snapshot(&self) -> CoachSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<CoachSnapshot> {
        self.snapshot.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CoachSignal> {
        self.signals.subscribe()
    }
}

pub struct CoachRuntime {
    session: SessionContext,
    orchestrator: CoachingOrchestrator,
    whisper: WhisperSlot,
    client: Arc<dyn AdvisoryClient>,
    clock: Arc<dyn Clock>,
    epoch: u64,
    advisory_status: AdvisoryStatus,
    say_next: Option<String>,
    bridge_seen_at: Option<DateTime<Utc>>,
    inbox: mpsc::Receiver<Inbound>,
    results: mpsc::WeakSender<Inbound>,
    signals: broadcast::Sender<CoachSignal>,
    snapshot: watch::Sender<CoachSnapshot>,
}

impl CoachRuntime {
    pub fn new(
        library: BattlecardLibrary,
        config: &CoachingConfig,
        client: Arc<dyn AdvisoryClient>,
        clock: Arc<dyn Clock>,
        channel_capacity: usize,
    ) -> (Self, CoachHandle) {
        let capacity = channel_capacity.max(1);
        let (events, inbox) = mpsc::channel(capacity);
        let (signals, _) = broadcast::channel(capacity);
        let advisory_status =
            if client.is_enabled() { AdvisoryStatus::Idle } else { AdvisoryStatus::Disabled };

        let mut runtime = Self {
            session: SessionContext::new(library, config),
            orchestrator: CoachingOrchestrator::new(OrchestratorSettings::from(config)),
            whisper: WhisperSlot::new(config.whisper_ttl_secs),
            client,
            clock,
            epoch: 0,
            advisory_status,
            say_next: None,
            bridge_seen_at: None,
            inbox,
            results: events.downgrade(),
            signals: signals.clone(),
            snapshot: watch::channel(placeholder_snapshot()).0,
        };
        let now = runtime.clock.now();
        let (snapshot_tx, snapshot_rx) = watch::channel(runtime.build_snapshot(now));
        runtime.snapshot = snapshot_tx;

        let handle = CoachHandle { events, snapshot: snapshot_rx, signals };
        (runtime, handle)
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Handles events until every [`CoachHandle`] has been dropped.
    pub async fn run(mut self) {
        info!(event_name = "coach.runtime.started", "coach runtime started");

        while let Some(Inbound { event, reply }) = self.inbox.recv().await {
            let name = event.name();
            let now = self.clock.now();
            let result = self.handle(event, now);
            self.publish(now);

            if let Err(error) = &result {
                debug!(
                    event_name = "coach.event.rejected",
                    correlation_id = self.session.session_id().unwrap_or("none"),
                    coach_event = name,
                    error = %error,
                    "coach event rejected"
                );
            }
            if let Some(reply) = reply {
                // The requester may have given up waiting.
                let _ = reply.send(result);
            }
        }

        info!(event_name = "coach.runtime.stopped", "coach runtime stopped");
    }

    fn handle(&mut self, event: CoachEvent, now: DateTime<Utc>) -> Result<(), ApplicationError> {
        match event {
            CoachEvent::StartSession { profile } => {
                self.reset_cycle();
                let session_id = self.session.start(profile).to_string();
                self.advisory_status = if self.client.is_enabled() {
                    AdvisoryStatus::Idle
                } else {
                    AdvisoryStatus::Disabled
                };
                info!(
                    event_name = "coach.session.started",
                    correlation_id = %session_id,
                    epoch = self.epoch,
                    "coaching session started"
                );
                self.emit_session();
            }
            CoachEvent::EndSession => {
                if self.session.session_id().is_none() {
                    return Err(DomainError::SessionNotLive.into());
                }
                self.reset_cycle();
                self.session.end();
                info!(
                    event_name = "coach.session.ended",
                    correlation_id = self.session.session_id().unwrap_or("none"),
                    total_elapsed_seconds = self.session.phase().state().total_elapsed_seconds,
                    "coaching session ended"
                );
                self.emit_session();
            }
            CoachEvent::Pause => {
                if !self.session.pause() {
                    return Err(DomainError::SessionNotLive.into());
                }
                self.emit_session();
            }
            CoachEvent::Resume => {
                if !self.session.resume() {
                    return Err(DomainError::InvariantViolation(
                        "session is not paused".to_string(),
                    )
                    .into());
                }
                self.emit_session();
            }
            CoachEvent::Caption(caption) => {
                let outcome = self.session.ingest(caption, now)?;
                if let Some(line) = &outcome.line {
                    debug!(
                        event_name = "coach.caption.accepted",
                        correlation_id = self.session.session_id().unwrap_or("none"),
                        line_id = %line.id,
                        "caption accepted"
                    );
                }
                if let Some(change) = outcome.change {
                    self.apply_change(change);
                }
            }
            CoachEvent::BridgeReady { timestamp } => {
                self.bridge_seen_at = Some(now);
                debug!(
                    event_name = "coach.bridge.ready",
                    sent_at = %timestamp,
                    "capture bridge reported ready"
                );
            }
            CoachEvent::Tick => self.on_tick(now),
            CoachEvent::UseCard { key } => {
                let was_active = self.is_active(&key);
                self.session.use_card(&key, now)?;
                self.after_card_action(key, was_active, now);
            }
            CoachEvent::DismissCard { key } => {
                let was_active = self.is_active(&key);
                self.session.dismiss_card(&key, now)?;
                self.after_card_action(key, was_active, now);
            }
            CoachEvent::SetPhase { phase } => {
                let transition = self
                    .session
                    .set_phase(phase, TransitionSource::Manual)
                    .map_err(DomainError::from)?;
                if let Some(transition) = transition {
                    self.emit_transition(transition.from, transition.to, transition.source);
                }
            }
            CoachEvent::AugmentLibrary { cards } => {
                let added = cards.len();
                let library_size = self.session.library().len();
                let size = self.session.augment_library(cards)?;
                info!(
                    event_name = "coach.library.augmented",
                    correlation_id = self.session.session_id().unwrap_or("none"),
                    added,
                    previous_size = library_size,
                    library_size = size,
                    "battlecard library augmented"
                );
            }
            CoachEvent::AdvisoryCompleted { epoch, result } => {
                if epoch != self.epoch {
                    debug!(
                        event_name = "coach.advisory.stale",
                        epoch,
                        current_epoch = self.epoch,
                        "dropping advisory result from a previous session"
                    );
                    return Ok(());
                }
                let outcome = self.orchestrator.complete_cycle(&mut self.session, result, now);
                self.apply_outcome(outcome, now);
            }
        }

        Ok(())
    }

    fn on_tick(&mut self, now: DateTime<Utc>) {
        if let Some(change) = self.session.tick(now).change {
            self.apply_change(change);
        }
        if self.whisper.expire(now).is_some() {
            self.emit(CoachSignal::WhisperCleared);
        }
        if !self.client.is_enabled() {
            return;
        }

        match self.orchestrator.begin_cycle(&self.session, now) {
            Ok(request) => self.spawn_advisory(request),
            Err(reason) => {
                debug!(
                    correlation_id = self.session.session_id().unwrap_or("none"),
                    reason = ?reason,
                    "advisory cycle skipped"
                );
            }
        }
    }

    fn spawn_advisory(&self, request: AdvisoryRequest) {
        let client = Arc::clone(&self.client);
        let results = self.results.clone();
        let epoch = self.epoch;

        info!(
            event_name = "coach.advisory.requested",
            correlation_id = self.session.session_id().unwrap_or("none"),
            stage = %request.stage,
            transcript_lines = request.transcript_window.len(),
            epoch,
            "requesting advisory suggestion"
        );

        tokio::spawn(async move {
            let result = client.advise(&request).await;
            let Some(sender) = results.upgrade() else {
                return;
            };
            let event = CoachEvent::AdvisoryCompleted { epoch, result };
            if sender.send(Inbound { event, reply: None }).await.is_err() {
                debug!(epoch, "coach runtime stopped before advisory result was delivered");
            }
        });
    }

    fn apply_outcome(&mut self, outcome: CycleOutcome, now: DateTime<Utc>) {
        self.advisory_status = outcome.status.clone();
        self.emit(CoachSignal::Advisory { status: outcome.status });

        if let Some(response) = outcome.response {
            self.emit(CoachSignal::SayNext {
                text: response.say_next.clone(),
                confidence: response.confidence,
            });
            self.say_next = Some(response.say_next);
        }
        if let Some(transition) = outcome.transition {
            self.emit_transition(transition.from, transition.to, transition.source);
        }
        if let Some(text) = outcome.whisper {
            let priority =
                if outcome.risk.is_some() { WhisperPriority::High } else { WhisperPriority::Normal };
            let text = self.whisper.show(text, priority, now).text.clone();
            self.emit(CoachSignal::Whisper { text, priority });
        }
        if let Some(tip) = outcome.tip {
            self.surface(tip);
        }
    }

    fn after_card_action(&mut self, key: String, was_active: bool, now: DateTime<Utc>) {
        if was_active {
            self.emit(CoachSignal::CardCleared { card: key });
        }
        if let Some(change) = self.session.reevaluate(now) {
            self.apply_change(change);
        }
    }

    fn apply_change(&self, change: ActiveChange) {
        match change {
            ActiveChange::Surfaced(card) => self.surface(card),
            ActiveChange::Cleared(card) => {
                debug!(
                    event_name = "coach.match.cleared",
                    correlation_id = self.session.session_id().unwrap_or("none"),
                    card = %card,
                    "battlecard left the matching window"
                );
                self.emit(CoachSignal::CardCleared { card });
            }
        }
    }

    fn is_active(&self, key: &str) -> bool {
        self.session.active().is_some_and(|active| active.card == key)
    }

    fn surface(&self, card: CardSignal) {
        info!(
            event_name = "coach.match.surfaced",
            correlation_id = self.session.session_id().unwrap_or("none"),
            card = %card.card,
            category = %card.category,
            score = card.score,
            source = ?card.source,
            "battlecard surfaced"
        );
        self.emit(CoachSignal::Card(card));
    }

    fn emit_transition(&self, from: SpinPhase, to: SpinPhase, source: TransitionSource) {
        info!(
            event_name = "coach.phase.transition",
            correlation_id = self.session.session_id().unwrap_or("none"),
            from = %from,
            to = %to,
            source = ?source,
            "SPIN phase changed"
        );
        self.emit(CoachSignal::Phase { from, to, source });
    }

    fn emit_session(&self) {
        self.emit(CoachSignal::Session {
            session_id: self.session.session_id().map(str::to_string),
            status: self.session.status(),
        });
    }

    fn emit(&self, signal: CoachSignal) {
        // No subscribers is fine; the snapshot still carries the state.
        let _ = self.signals.send(signal);
    }

    fn reset_cycle(&mut self) {
        self.epoch += 1;
        self.orchestrator.reset();
        if self.whisper.clear().is_some() {
            self.emit(CoachSignal::WhisperCleared);
        }
        self.say_next = None;
    }

    fn publish(&self, now: DateTime<Utc>) {
        self.snapshot.send_replace(self.build_snapshot(now));
    }

    fn build_snapshot(&self, now: DateTime<Utc>) -> CoachSnapshot {
        let matches = self.session.matches();
        CoachSnapshot {
            session_id: self.session.session_id().map(str::to_string),
            status: self.session.status(),
            phase: self.session.phase().state().clone(),
            active_card: self.session.active().cloned(),
            alt_card: matches.alt.as_ref().map(|result| result.card.key.clone()),
            persona_card: matches.persona.as_ref().map(|result| result.card.key.clone()),
            whisper: self.whisper.current(now).cloned(),
            say_next: self.say_next.clone(),
            advisory: self.advisory_status.clone(),
            call_state: self.orchestrator.state(),
            bridge_seen_at: self.bridge_seen_at,
            cooled_down: self
                .session
                .cooldowns()
                .active_keys(now)
                .into_iter()
                .map(str::to_string)
                .collect(),
            feed_lines: self.session.feed().len(),
            library_size: self.session.library().len(),
            updated_at: now,
        }
    }
}

fn placeholder_snapshot() -> CoachSnapshot {
    CoachSnapshot {
        session_id: None,
        status: SessionStatus::Idle,
        phase: PhaseState::default(),
        active_card: None,
        alt_card: None,
        persona_card: None,
        whisper: None,
        say_next: None,
        advisory: AdvisoryStatus::Idle,
        call_state: CallState::Idle,
        bridge_seen_at: None,
        cooled_down: Vec::new(),
        feed_lines: 0,
        library_size: 0,
        updated_at: DateTime::<Utc>::UNIX_EPOCH,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration as StdDuration;

    use async_trait::async_trait;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use tokio::sync::{Mutex, Notify};

    use callcoach_core::battlecards::BattlecardLibrary;
    use callcoach_core::config::CoachingConfig;
    use callcoach_core::errors::{ApplicationError, DomainError};
    use callcoach_core::feed::Caption;
    use callcoach_core::phase::{SessionStatus, SpinPhase};
    use callcoach_core::session::SessionProfile;

    use super::{Clock, CoachEvent, CoachHandle, CoachRuntime, CoachSignal};
    use crate::advisory::AdvisoryRequest;
    use crate::llm::{AdvisoryClient, AdvisoryError, DisabledAdvisoryClient};
    use crate::orchestrator::{AdvisoryStatus, CallState};

    struct ManualClock {
        now: std::sync::Mutex<DateTime<Utc>>,
    }

    impl ManualClock {
        fn starting_at(now: DateTime<Utc>) -> Self {
            Self { now: std::sync::Mutex::new(now) }
        }

        fn advance(&self, seconds: i64) -> DateTime<Utc> {
            let mut now = self.now.lock().expect("clock lock");
            *now += Duration::seconds(seconds);
            *now
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.now.lock().expect("clock lock")
        }
    }

    /// Holds every call until released, then answers from the script.
    #[derive(Default)]
    struct GatedAdvisoryClient {
        replies: Mutex<VecDeque<Result<String, AdvisoryError>>>,
        release: Notify,
        calls: AtomicUsize,
    }

    impl GatedAdvisoryClient {
        fn with_replies(replies: Vec<Result<String, AdvisoryError>>) -> Self {
            Self { replies: Mutex::new(replies.into()), ..Self::default() }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl AdvisoryClient for GatedAdvisoryClient {
        async fn advise(&self, _request: &AdvisoryRequest) -> Result<String, AdvisoryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.release.notified().await;
            self.replies.lock().await.pop_front().unwrap_or(Err(AdvisoryError::Timeout))
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).single().expect("valid timestamp")
    }

    fn runtime_with(
        client: Arc<dyn AdvisoryClient>,
        clock: Arc<ManualClock>,
    ) -> (CoachRuntime, CoachHandle) {
        CoachRuntime::new(BattlecardLibrary::builtin(), &CoachingConfig::default(), client, clock, 32)
    }

    async fn wait_for_calls(client: &GatedAdvisoryClient, expected: usize) {
        tokio::time::timeout(StdDuration::from_secs(2), async {
            while client.calls() < expected {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("advisory client called in time");
    }

    #[tokio::test]
    async fn captions_surface_cards_and_update_snapshot() {
        let clock = Arc::new(ManualClock::starting_at(t0()));
        let (runtime, handle) = runtime_with(Arc::new(DisabledAdvisoryClient), clock);
        let mut signals = handle.subscribe();
        let _task = runtime.spawn();

        handle
            .request(CoachEvent::StartSession { profile: SessionProfile::default() })
            .await
            .expect("session starts");
        handle
            .request(CoachEvent::Caption(Caption::new(t0(), "No, máme na to rozpočet problém")))
            .await
            .expect("caption accepted");

        let snapshot = handle.snapshot();
        assert_eq!(snapshot.status, SessionStatus::Live);
        assert_eq!(snapshot.active_card.map(|card| card.card), Some("price".to_string()));
        assert_eq!(snapshot.advisory, AdvisoryStatus::Disabled);
        assert_eq!(snapshot.feed_lines, 1);

        let mut saw_card = false;
        while let Ok(signal) = signals.try_recv() {
            if let CoachSignal::Card(card) = signal {
                saw_card = card.card == "price";
            }
        }
        assert!(saw_card);
    }

    #[tokio::test]
    async fn used_card_is_cleared_and_cooled_down() {
        let clock = Arc::new(ManualClock::starting_at(t0()));
        let (runtime, handle) = runtime_with(Arc::new(DisabledAdvisoryClient), clock);
        let _task = runtime.spawn();

        handle
            .request(CoachEvent::StartSession { profile: SessionProfile::default() })
            .await
            .expect("session starts");
        handle
            .request(CoachEvent::Caption(Caption::new(t0(), "to je drahé")))
            .await
            .expect("caption accepted");
        handle.request(CoachEvent::UseCard { key: "price".to_string() }).await.expect("known card");

        let snapshot = handle.snapshot();
        assert!(snapshot.active_card.is_none());
        assert_eq!(snapshot.cooled_down, vec!["price".to_string()]);

        let error = handle
            .request(CoachEvent::DismissCard { key: "missing".to_string() })
            .await
            .expect_err("unknown card rejected");
        assert_eq!(error, ApplicationError::Domain(DomainError::UnknownCard("missing".to_string())));
    }

    #[tokio::test]
    async fn card_is_cleared_once_its_line_leaves_the_window() {
        let clock = Arc::new(ManualClock::starting_at(t0()));
        let (runtime, handle) = runtime_with(Arc::new(DisabledAdvisoryClient), Arc::clone(&clock));
        let mut signals = handle.subscribe();
        let _task = runtime.spawn();

        handle
            .request(CoachEvent::StartSession { profile: SessionProfile::default() })
            .await
            .expect("session starts");
        handle
            .request(CoachEvent::Caption(Caption::new(t0(), "to je drahé")))
            .await
            .expect("caption accepted");
        clock.advance(41);
        handle.request(CoachEvent::Tick).await.expect("tick");

        assert!(handle.snapshot().active_card.is_none());
        let mut cleared = Vec::new();
        while let Ok(signal) = signals.try_recv() {
            if let CoachSignal::CardCleared { card } = signal {
                cleared.push(card);
            }
        }
        assert_eq!(cleared, vec!["price".to_string()]);
    }

    #[tokio::test]
    async fn unrelated_late_caption_clears_the_stale_card() {
        let clock = Arc::new(ManualClock::starting_at(t0()));
        let (runtime, handle) = runtime_with(Arc::new(DisabledAdvisoryClient), Arc::clone(&clock));
        let mut signals = handle.subscribe();
        let _task = runtime.spawn();

        handle
            .request(CoachEvent::StartSession { profile: SessionProfile::default() })
            .await
            .expect("session starts");
        handle
            .request(CoachEvent::Caption(Caption::new(t0(), "to je drahé")))
            .await
            .expect("caption accepted");
        let later = clock.advance(60);
        handle
            .request(CoachEvent::Caption(Caption::new(later, "dobrý den")))
            .await
            .expect("caption accepted");

        assert!(handle.snapshot().active_card.is_none());
        let mut saw_cleared = false;
        while let Ok(signal) = signals.try_recv() {
            if let CoachSignal::CardCleared { card } = signal {
                saw_cleared = card == "price";
            }
        }
        assert!(saw_cleared);
    }

    #[tokio::test]
    async fn ticks_advance_phase_timers_only_while_live() {
        let clock = Arc::new(ManualClock::starting_at(t0()));
        let (runtime, handle) = runtime_with(Arc::new(DisabledAdvisoryClient), Arc::clone(&clock));
        let _task = runtime.spawn();

        handle.request(CoachEvent::Tick).await.expect("idle tick is harmless");
        handle
            .request(CoachEvent::StartSession { profile: SessionProfile::default() })
            .await
            .expect("session starts");
        for _ in 0..3 {
            clock.advance(1);
            handle.request(CoachEvent::Tick).await.expect("tick");
        }
        handle
            .request(CoachEvent::SetPhase { phase: SpinPhase::Problem })
            .await
            .expect("manual phase change");
        handle.request(CoachEvent::Pause).await.expect("pause");
        handle.request(CoachEvent::Tick).await.expect("paused tick");
        handle.request(CoachEvent::Resume).await.expect("resume");
        handle.request(CoachEvent::Tick).await.expect("tick");

        let phase = handle.snapshot().phase;
        assert_eq!(phase.total_elapsed_seconds, 4);
        assert_eq!(phase.elapsed_in(SpinPhase::Situation), 3);
        assert_eq!(phase.elapsed_in(SpinPhase::Problem), 1);
        assert!(handle.request(CoachEvent::Resume).await.is_err());
    }

    #[tokio::test]
    async fn eligible_tick_during_in_flight_call_does_not_call_again() {
        let clock = Arc::new(ManualClock::starting_at(t0()));
        let client = Arc::new(GatedAdvisoryClient::with_replies(vec![
            Ok(r#"{"stage":"problem","sayNext":"Co vás trápí?","coachWhisper":"ptej se","confidence":0.9}"#
                .to_string()),
            Ok(r#"{"sayNext":"Pokračuj","confidence":0.9}"#.to_string()),
        ]));
        let (runtime, handle) = runtime_with(client.clone(), Arc::clone(&clock));
        let mut snapshots = handle.watch();
        let _task = runtime.spawn();

        handle
            .request(CoachEvent::StartSession { profile: SessionProfile::default() })
            .await
            .expect("session starts");
        handle
            .request(CoachEvent::Caption(Caption::new(t0(), "dobrý den")))
            .await
            .expect("caption");
        handle.request(CoachEvent::Tick).await.expect("tick");
        wait_for_calls(&client, 1).await;
        assert_eq!(handle.snapshot().call_state, CallState::InFlight);

        let later = clock.advance(10);
        handle
            .request(CoachEvent::Caption(Caption::new(later, "máme chvilku")))
            .await
            .expect("caption");
        handle.request(CoachEvent::Tick).await.expect("tick");
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(client.calls(), 1);

        client.release.notify_one();
        tokio::time::timeout(
            StdDuration::from_secs(2),
            snapshots.wait_for(|snapshot| matches!(snapshot.advisory, AdvisoryStatus::Ok { .. })),
        )
        .await
        .expect("advisory result applied in time")
        .expect("runtime alive");

        let snapshot = handle.snapshot();
        assert_eq!(snapshot.call_state, CallState::Idle);
        assert_eq!(snapshot.phase.current_phase, SpinPhase::Problem);
        assert_eq!(snapshot.say_next.as_deref(), Some("Co vás trápí?"));
        assert_eq!(snapshot.whisper.map(|whisper| whisper.text), Some("ptej se".to_string()));

        let next = clock.advance(10);
        handle
            .request(CoachEvent::Caption(Caption::new(next, "a ještě jedna věc")))
            .await
            .expect("caption");
        handle.request(CoachEvent::Tick).await.expect("tick");
        wait_for_calls(&client, 2).await;
        client.release.notify_one();
    }

    #[test]
    fn stale_advisory_result_is_dropped_after_session_switch() {
        let clock = Arc::new(ManualClock::starting_at(t0()));
        let client = Arc::new(GatedAdvisoryClient::default());
        let (mut runtime, _handle) = runtime_with(client, clock);

        runtime
            .handle(CoachEvent::StartSession { profile: SessionProfile::default() }, t0())
            .expect("session starts");
        let stale_epoch = runtime.epoch;
        runtime.handle(CoachEvent::EndSession, t0()).expect("session ends");
        runtime
            .handle(CoachEvent::StartSession { profile: SessionProfile::default() }, t0())
            .expect("next session starts");

        runtime
            .handle(
                CoachEvent::AdvisoryCompleted {
                    epoch: stale_epoch,
                    result: Ok(r#"{"stage":"payoff","sayNext":"x","confidence":1}"#.to_string()),
                },
                t0(),
            )
            .expect("stale result ignored");

        assert_eq!(runtime.session.phase().current(), SpinPhase::Situation);
        assert_eq!(runtime.advisory_status, AdvisoryStatus::Idle);
        assert!(runtime.say_next.is_none());
    }

    #[test]
    fn advisory_failure_is_reported_and_loop_continues() {
        let clock = Arc::new(ManualClock::starting_at(t0()));
        let client = Arc::new(GatedAdvisoryClient::default());
        let (mut runtime, _handle) = runtime_with(client, clock);

        runtime
            .handle(CoachEvent::StartSession { profile: SessionProfile::default() }, t0())
            .expect("session starts");
        let epoch = runtime.epoch;
        runtime
            .handle(
                CoachEvent::AdvisoryCompleted { epoch, result: Err(AdvisoryError::Timeout) },
                t0(),
            )
            .expect("failure is not fatal");

        assert!(matches!(runtime.advisory_status, AdvisoryStatus::Unavailable { .. }));
        assert_eq!(runtime.orchestrator.state(), CallState::Idle);
        assert_eq!(runtime.session.status(), SessionStatus::Live);
    }

    #[test]
    fn bridge_ready_is_recorded_for_health() {
        let clock = Arc::new(ManualClock::starting_at(t0()));
        let (mut runtime, _handle) = runtime_with(Arc::new(DisabledAdvisoryClient), clock);

        runtime.handle(CoachEvent::BridgeReady { timestamp: t0() }, t0()).expect("recorded");
        assert_eq!(runtime.build_snapshot(t0()).bridge_seen_at, Some(t0()));
        assert!(runtime.handle(CoachEvent::EndSession, t0()).is_err());
    }
}
