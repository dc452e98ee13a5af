// mirrorsync CLI entry point.

use std::io::IsTerminal;
use std::process;

use clap::Parser;
use tracing_subscriber::EnvFilter;

mod commands;
mod exit_code;
mod output;
mod target;

use exit_code::ExitCode;

const DEFAULT_LOG_FILTER: &str = "mirrorsync=info";

#[derive(Parser)]
#[command(
    name = "mirrorsync",
    version,
    about = "Mirror a local branch into a destination repository, merging unrelated history"
)]
struct Cli {
    /// Write logs to stderr as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: commands::Command,
}

fn main() -> process::ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match commands::run(cli.command) {
        Ok(code) => code.into(),
        Err(error) => ExitCode::from_error(&error).into(),
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal());
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
