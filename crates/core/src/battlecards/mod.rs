//! Battlecard library: the immutable rule table the matcher scores against.
//!
//! The built-in cards are compiled in. A dynamically generated set (for example one
//! produced for a specific company or industry) can be merged on top with
//! [`BattlecardLibrary::merged`]; entries are keyed by `key` and a later source always
//! replaces an earlier card with the same key.

mod seeds;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::normalize::normalize;

use self::seeds::{ALIAS_SEEDS, CARD_SEEDS};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CardCategory {
    Objection,
    Persona,
    Security,
    NextStep,
}

impl CardCategory {
    /// Selection priority; higher wins before score is considered.
    pub fn priority(self) -> u8 {
        match self {
            Self::Security => 4,
            Self::NextStep => 3,
            Self::Objection => 2,
            Self::Persona => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Objection => "objection",
            Self::Persona => "persona",
            Self::Security => "security",
            Self::NextStep => "next-step",
        }
    }
}

impl fmt::Display for CardCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CardCategory {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "objection" => Ok(Self::Objection),
            "persona" => Ok(Self::Persona),
            "security" => Ok(Self::Security),
            "next-step" | "next_step" | "nextstep" => Ok(Self::NextStep),
            other => Err(DomainError::InvariantViolation(format!(
                "unsupported card category `{other}` (expected objection|persona|security|next-step)"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Battlecard {
    pub key: String,
    pub category: CardCategory,
    pub title: String,
    #[serde(default)]
    pub trigger_phrases: Vec<String>,
    pub primary_response: String,
    #[serde(default)]
    pub alternate_responses: Vec<String>,
    #[serde(default)]
    pub follow_up_prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tone_hint: Option<String>,
}

impl Battlecard {
    pub fn new(
        key: impl Into<String>,
        category: CardCategory,
        title: impl Into<String>,
        primary_response: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            category,
            title: title.into(),
            trigger_phrases: Vec::new(),
            primary_response: primary_response.into(),
            alternate_responses: Vec::new(),
            follow_up_prompt: String::new(),
            tone_hint: None,
        }
    }

    pub fn with_triggers<I, S>(mut self, triggers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.trigger_phrases = triggers.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_follow_up(mut self, prompt: impl Into<String>) -> Self {
        self.follow_up_prompt = prompt.into();
        self
    }

    fn validate(&self) -> Result<(), DomainError> {
        let invalid = |reason: &str| DomainError::InvalidCard {
            key: self.key.clone(),
            reason: reason.to_string(),
        };

        if self.key.trim().is_empty() {
            return Err(invalid("key must not be empty"));
        }
        if self.title.trim().is_empty() {
            return Err(invalid("title must not be empty"));
        }
        if self.primary_response.trim().is_empty() {
            return Err(invalid("primary response must not be empty"));
        }
        Ok(())
    }
}

/// Extra phrase that resolves to an existing card, without editing the card itself.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchAlias {
    pub phrase: String,
    pub card_key: String,
}

impl SearchAlias {
    pub fn new(phrase: impl Into<String>, card_key: impl Into<String>) -> Self {
        Self { phrase: phrase.into(), card_key: card_key.into() }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BattlecardLibrary {
    cards: BTreeMap<String, Battlecard>,
    aliases: Vec<SearchAlias>,
}

impl BattlecardLibrary {
    /// Builds a library, validating every card. Duplicate keys resolve to the last entry.
    pub fn new(cards: Vec<Battlecard>, aliases: Vec<SearchAlias>) -> Result<Self, DomainError> {
        let mut library = Self::default();
        for card in cards {
            card.validate()?;
            library.cards.insert(card.key.clone(), card);
        }
        for alias in aliases {
            library.push_alias(alias)?;
        }
        Ok(library)
    }

    pub fn builtin() -> Self {
        let cards = CARD_SEEDS
            .iter()
            .map(|seed| (seed.key.to_string(), card_from_seed(seed)))
            .collect::<BTreeMap<_, _>>();
        let aliases = ALIAS_SEEDS
            .iter()
            .map(|seed| SearchAlias::new(seed.phrase, seed.card_key))
            .collect::<Vec<_>>();

        Self { cards, aliases }
    }

    /// Returns a new library with `dynamic` merged on top; dynamic cards win on key collision.
    pub fn merged(&self, dynamic: Vec<Battlecard>) -> Result<Self, DomainError> {
        let mut library = self.clone();
        for card in dynamic {
            card.validate()?;
            library.cards.insert(card.key.clone(), card);
        }
        Ok(library)
    }

    pub fn with_aliases(mut self, aliases: Vec<SearchAlias>) -> Result<Self, DomainError> {
        for alias in aliases {
            self.push_alias(alias)?;
        }
        Ok(self)
    }

    /// Parses a JSON array of cards as delivered by the augmentation source.
    pub fn parse_dynamic(raw: &str) -> Result<Vec<Battlecard>, DomainError> {
        serde_json::from_str::<Vec<Battlecard>>(raw).map_err(|error| {
            DomainError::InvariantViolation(format!("could not parse battlecard list: {error}"))
        })
    }

    pub fn get(&self, key: &str) -> Option<&Battlecard> {
        self.cards.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.cards.contains_key(key)
    }

    pub fn cards(&self) -> impl Iterator<Item = &Battlecard> {
        self.cards.values()
    }

    pub fn aliases(&self) -> &[SearchAlias] {
        &self.aliases
    }

    pub fn aliases_for<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.aliases
            .iter()
            .filter(move |alias| alias.card_key == key)
            .map(|alias| alias.phrase.as_str())
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    fn push_alias(&mut self, alias: SearchAlias) -> Result<(), DomainError> {
        if !self.cards.contains_key(&alias.card_key) {
            return Err(DomainError::UnknownCard(alias.card_key));
        }
        if normalize(&alias.phrase).is_empty() {
            return Err(DomainError::InvalidCard {
                key: alias.card_key,
                reason: "alias phrase normalizes to an empty string".to_string(),
            });
        }
        self.aliases.push(alias);
        Ok(())
    }
}

fn card_from_seed(seed: &seeds::CardSeed) -> Battlecard {
    Battlecard {
        key: seed.key.to_string(),
        category: seed.category,
        title: seed.title.to_string(),
        trigger_phrases: seed.triggers.iter().map(|phrase| phrase.to_string()).collect(),
        primary_response: seed.primary.to_string(),
        alternate_responses: seed.alternates.iter().map(|text| text.to_string()).collect(),
        follow_up_prompt: seed.follow_up.to_string(),
        tone_hint: seed.tone_hint.map(str::to_string),
    }
}
