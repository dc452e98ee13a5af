// CLI subcommand dispatch.

use clap::Subcommand;

use crate::exit_code::ExitCode;

pub mod credential;
pub mod doctor;
pub mod init;
pub mod sync;

#[derive(Subcommand)]
pub enum Command {
    /// Fetch the destination, merge it into the local branch, push
    Sync(sync::SyncArgs),
    /// Check the local setup without contacting the destination
    Doctor(doctor::DoctorArgs),
    /// Write a repository config (.mirrorsync.toml)
    Init(init::InitArgs),
    /// Manage the destination token in the OS keychain
    Credential(credential::CredentialArgs),
}

pub fn run(cmd: Command) -> anyhow::Result<ExitCode> {
    match cmd {
        Command::Sync(args) => sync::run(args),
        Command::Doctor(args) => doctor::run(args),
        Command::Init(args) => init::run(args).map(|()| ExitCode::Success),
        Command::Credential(args) => credential::run(args).map(|()| ExitCode::Success),
    }
}

/// Single-threaded runtime for commands that drive git with timeouts.
pub(crate) fn runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|error| anyhow::anyhow!("failed to start async runtime: {error}"))
}
