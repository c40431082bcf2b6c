//! Trigger scoring and suggestion selection.
//!
//! Every card (minus the ones on cooldown) is scored against the current line window:
//! a multi-word trigger found in a line adds 5, a single-word trigger adds 3, and a line
//! that hits two or more distinct triggers of the same card earns a flat bonus. The
//! best non-persona card, an optional near-tied alternative, and the best persona card
//! are then picked by category priority, score, and key.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::battlecards::{Battlecard, BattlecardLibrary, CardCategory};
use crate::cooldown::CooldownRegistry;
use crate::normalize::{is_multi_word, normalize};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScoringRules {
    pub multi_word_weight: u32,
    pub single_word_weight: u32,
    pub multi_trigger_bonus: u32,
    pub alt_score_margin: u32,
}

impl Default for ScoringRules {
    fn default() -> Self {
        Self { multi_word_weight: 5, single_word_weight: 3, multi_trigger_bonus: 2, alt_score_margin: 2 }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MatchResult {
    pub card: Battlecard,
    pub score: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MatchSet {
    pub best: Option<MatchResult>,
    pub alt: Option<MatchResult>,
    pub persona: Option<MatchResult>,
}

impl MatchSet {
    pub fn is_empty(&self) -> bool {
        self.best.is_none() && self.alt.is_none() && self.persona.is_none()
    }
}

#[derive(Clone, Debug, Default)]
pub struct TriggerMatcher {
    rules: ScoringRules,
}

impl TriggerMatcher {
    pub fn new(rules: ScoringRules) -> Self {
        Self { rules }
    }

    /// Scores one card against raw window lines. Aliases are extra trigger phrases
    /// resolving to this card.
    pub fn score_card<'a, I>(&self, card: &'a Battlecard, aliases: I, window: &[&str]) -> u32
    where
        I: IntoIterator<Item = &'a str>,
    {
        let triggers = effective_triggers(card, aliases);
        let lines = window.iter().map(|line| normalize(line)).collect::<Vec<_>>();
        self.score_normalized(&triggers, &lines)
    }

    /// Scores the whole library, skipping cooled-down cards, and selects the surfaced set.
    pub fn evaluate(
        &self,
        library: &BattlecardLibrary,
        window: &[&str],
        cooldowns: &CooldownRegistry,
        now: DateTime<Utc>,
    ) -> MatchSet {
        let lines = window
            .iter()
            .map(|line| normalize(line))
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>();
        if lines.is_empty() {
            return MatchSet::default();
        }

        let mut primary = Vec::new();
        let mut personas = Vec::new();
        for card in library.cards() {
            if cooldowns.is_active(&card.key, now) {
                continue;
            }
            let triggers = effective_triggers(card, library.aliases_for(&card.key));
            let score = self.score_normalized(&triggers, &lines);
            if score == 0 {
                continue;
            }

            let result = MatchResult { card: card.clone(), score };
            if card.category == CardCategory::Persona {
                personas.push(result);
            } else {
                primary.push(result);
            }
        }

        primary.sort_by(rank);
        personas.sort_by(rank);

        let mut primary = primary.into_iter();
        let best = primary.next();
        let alt = match (&best, primary.next()) {
            (Some(best), Some(candidate))
                if candidate.card.key != best.card.key
                    && best.score.abs_diff(candidate.score) <= self.rules.alt_score_margin =>
            {
                Some(candidate)
            }
            _ => None,
        };

        MatchSet { best, alt, persona: personas.into_iter().next() }
    }

    fn score_normalized(&self, triggers: &BTreeSet<String>, lines: &[String]) -> u32 {
        let mut score = 0;
        for line in lines {
            let mut hits = 0;
            for trigger in triggers {
                if line.contains(trigger.as_str()) {
                    score += if is_multi_word(trigger) {
                        self.rules.multi_word_weight
                    } else {
                        self.rules.single_word_weight
                    };
                    hits += 1;
                }
            }
            if hits >= 2 {
                score += self.rules.multi_trigger_bonus;
            }
        }
        score
    }
}

/// Own triggers plus aliases, normalized and deduplicated; empty phrases are dropped.
pub fn effective_triggers<'a, I>(card: &'a Battlecard, aliases: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = &'a str>,
{
    card.trigger_phrases
        .iter()
        .map(String::as_str)
        .chain(aliases)
        .map(normalize)
        .filter(|trigger| !trigger.is_empty())
        .collect()
}

fn rank(left: &MatchResult, right: &MatchResult) -> Ordering {
    right
        .card
        .category
        .priority()
        .cmp(&left.card.category.priority())
        .then_with(|| right.score.cmp(&left.score))
        .then_with(|| left.card.key.cmp(&right.card.key))
}
