use std::fs;
use std::path::Path;

use callcoach_core::config::{AppConfig, LoadOptions};
use callcoach_core::feed::Caption;
use callcoach_core::session::{ActiveChange, SessionContext, SessionProfile};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::commands::cards::load_library;
use crate::commands::CommandResult;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SurfacedMatch {
    line: usize,
    at: DateTime<Utc>,
    text: String,
    card: String,
    title: String,
    score: u32,
    alt: Option<String>,
    persona: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ClearedMatch {
    line: usize,
    at: DateTime<Utc>,
    card: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReplaySummary {
    captions: usize,
    accepted: u64,
    surfaced: Vec<SurfacedMatch>,
    cleared: Vec<ClearedMatch>,
}

/// Feeds every caption through a fresh session, using each caption's timestamp as the clock.
pub fn run(transcript: &Path, extra: Option<&Path>) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "replay",
                "config_validation",
                format!("config validation failed: {error}"),
                2,
            );
        }
    };

    let library = match load_library("replay", extra) {
        Ok(library) => library,
        Err(failure) => return failure,
    };

    let raw = match fs::read_to_string(transcript) {
        Ok(raw) => raw,
        Err(error) => {
            return CommandResult::failure(
                "replay",
                "io",
                format!("could not read `{}`: {error}", transcript.display()),
                3,
            );
        }
    };

    let captions = match parse_transcript(&raw) {
        Ok(captions) => captions,
        Err((line, error)) => {
            return CommandResult::failure(
                "replay",
                "transcript_parse",
                format!("line {line}: {error}"),
                2,
            );
        }
    };

    let mut session = SessionContext::new(library, &config.coaching);
    session.start(SessionProfile::default());

    let mut surfaced = Vec::new();
    let mut cleared = Vec::new();
    for (line, caption) in &captions {
        let now = caption.timestamp;
        let outcome = match session.ingest(caption.clone(), now) {
            Ok(outcome) => outcome,
            Err(error) => {
                return CommandResult::failure(
                    "replay",
                    "session",
                    format!("line {line}: {error}"),
                    4,
                );
            }
        };

        match outcome.change {
            Some(ActiveChange::Surfaced(card)) => {
                let matches = session.matches();
                surfaced.push(SurfacedMatch {
                    line: *line,
                    at: now,
                    text: caption.text.clone(),
                    card: card.card,
                    title: card.title,
                    score: card.score,
                    alt: matches.alt.as_ref().map(|alt| alt.card.key.clone()),
                    persona: matches.persona.as_ref().map(|persona| persona.card.key.clone()),
                });
            }
            Some(ActiveChange::Cleared(card)) => {
                cleared.push(ClearedMatch { line: *line, at: now, card });
            }
            None => {}
        }
    }

    let summary = ReplaySummary {
        captions: captions.len(),
        accepted: session.feed().accepted(),
        surfaced,
        cleared,
    };
    let message = format!(
        "replayed {} captions, {} cards surfaced",
        summary.captions,
        summary.surfaced.len()
    );

    match serde_json::to_value(&summary) {
        Ok(data) => CommandResult::success_with_data("replay", message, data),
        Err(error) => CommandResult::failure(
            "replay",
            "serialization",
            format!("could not render replay: {error}"),
            3,
        ),
    }
}

/// Blank lines are skipped; line numbers are 1-based.
fn parse_transcript(raw: &str) -> Result<Vec<(usize, Caption)>, (usize, serde_json::Error)> {
    raw.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            serde_json::from_str::<Caption>(line)
                .map(|caption| (index + 1, caption))
                .map_err(|error| (index + 1, error))
        })
        .collect()
}
