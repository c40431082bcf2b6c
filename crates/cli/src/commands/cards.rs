use std::fs;
use std::path::Path;

use callcoach_core::battlecards::{Battlecard, BattlecardLibrary};
use serde::Serialize;

use crate::commands::CommandResult;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CardListing<'a> {
    #[serde(flatten)]
    card: &'a Battlecard,
    aliases: Vec<&'a str>,
}

pub fn run(extra: Option<&Path>) -> CommandResult {
    let library = match load_library("cards", extra) {
        Ok(library) => library,
        Err(failure) => return failure,
    };

    let listing = library
        .cards()
        .map(|card| CardListing { card, aliases: library.aliases_for(&card.key).collect() })
        .collect::<Vec<_>>();

    match serde_json::to_value(&listing) {
        Ok(data) => CommandResult::success_with_data(
            "cards",
            format!("{} cards, {} aliases", library.len(), library.aliases().len()),
            data,
        ),
        Err(error) => CommandResult::failure(
            "cards",
            "serialization",
            format!("could not render library: {error}"),
            3,
        ),
    }
}

/// Builtin library, with cards from `extra` merged over it by key.
pub(crate) fn load_library(
    command: &str,
    extra: Option<&Path>,
) -> Result<BattlecardLibrary, CommandResult> {
    let builtin = BattlecardLibrary::builtin();
    let Some(path) = extra else {
        return Ok(builtin);
    };

    let raw = fs::read_to_string(path).map_err(|error| {
        CommandResult::failure(
            command,
            "io",
            format!("could not read `{}`: {error}", path.display()),
            3,
        )
    })?;

    BattlecardLibrary::parse_dynamic(&raw)
        .and_then(|cards| builtin.merged(cards))
        .map_err(|error| {
            CommandResult::failure(
                command,
                "card_validation",
                format!("`{}`: {error}", path.display()),
                2,
            )
        })
}
