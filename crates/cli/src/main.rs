use std::process::ExitCode;

fn main() -> ExitCode {
    callcoach_cli::run()
}
