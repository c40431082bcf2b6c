pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "callcoach",
    about = "Callcoach operator CLI",
    long_about = "Inspect configuration, validate battlecard libraries, and replay captured transcripts offline.",
    after_help = "Examples:\n  callcoach config\n  callcoach cards --extra cards.json\n  callcoach replay call.jsonl"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "List the merged battlecard library as JSON")]
    Cards {
        #[arg(long, help = "JSON file with extra cards merged over the builtin library")]
        extra: Option<PathBuf>,
    },
    #[command(about = "Replay a JSONL caption transcript and print every surfaced card")]
    Replay {
        #[arg(help = "Transcript file, one caption object per line")]
        transcript: PathBuf,
        #[arg(long, help = "JSON file with extra cards merged over the builtin library")]
        extra: Option<PathBuf>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Config => commands::config::run(),
        Command::Cards { extra } => commands::cards::run(extra.as_deref()),
        Command::Replay { transcript, extra } => {
            commands::replay::run(&transcript, extra.as_deref())
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
