// Consistent exit codes for the mirrorsync CLI.
//
//   0  = success
//   1  = unexpected local error
//   2  = usage/argument error
//   11 = configuration error (nothing was touched)
//   12 = merge conflict, needs a manual merge
//   13 = transport failure, safe to retry

use std::process;

use mirrorsync_common::refname::RefNameError;
use mirrorsync_common::remote::RemoteError;
use mirrorsync_common::types::{DescriptorError, SyncOutcome};
use mirrorsync_engine::config::ConfigError;
use mirrorsync_engine::lock::RunLockError;
use mirrorsync_engine::sync::{ConfigurationError, SyncError};

/// Named exit codes for the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    Error = 1,
    Usage = 2,
    Config = 11,
    Conflict = 12,
    Transport = 13,
}

impl ExitCode {
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn from_outcome(outcome: &SyncOutcome) -> Self {
        match outcome {
            SyncOutcome::Success { .. } => Self::Success,
            SyncOutcome::ConflictDetected { .. } => Self::Conflict,
            SyncOutcome::TransportFailure { .. } => Self::Transport,
        }
    }

    /// Map an anyhow error to an exit code by inspecting the error chain.
    pub fn from_error(err: &anyhow::Error) -> Self {
        for cause in err.chain() {
            if let Some(sync_err) = cause.downcast_ref::<SyncError>() {
                return match sync_err {
                    SyncError::Configuration(_) => Self::Config,
                    SyncError::Git { .. } => Self::Error,
                };
            }
            if cause.is::<ConfigurationError>()
                || cause.is::<ConfigError>()
                || cause.is::<RunLockError>()
                || cause.is::<DescriptorError>()
                || cause.is::<RemoteError>()
                || cause.is::<RefNameError>()
            {
                return Self::Config;
            }
            if cause.is::<clap::Error>() {
                return Self::Usage;
            }
        }

        Self::Error
    }
}

impl From<ExitCode> for process::ExitCode {
    fn from(code: ExitCode) -> Self {
        process::ExitCode::from(code.code() as u8)
    }
}
