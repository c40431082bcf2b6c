pub mod battlecards;
pub mod config;
pub mod cooldown;
pub mod errors;
pub mod feed;
pub mod matcher;
pub mod normalize;
pub mod phase;
pub mod session;

pub use battlecards::{Battlecard, BattlecardLibrary, CardCategory, SearchAlias};
pub use cooldown::{CooldownPolicy, CooldownReason, CooldownRegistry};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use feed::{Caption, FeedBuffer, FeedLine};
pub use matcher::{MatchResult, MatchSet, ScoringRules, TriggerMatcher};
pub use phase::{
    PhaseState, PhaseTracker, PhaseTransition, PhaseTransitionError, SessionStatus, SpinPhase,
    TransitionSource,
};
pub use session::{
    ActiveChange, CardSignal, CardSource, IngestOutcome, SessionContext, SessionProfile, TickOutcome,
};
