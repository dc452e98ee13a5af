use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

use mirrorsync_common::remote::RemoteError;
use mirrorsync_common::types::{DescriptorError, SyncPhase};

use crate::git::worker::GitWorkerError;

/// Problems detected before any remote is contacted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    MissingCredential { url: String },
    InvalidDestination { message: String },
    InvalidSource { message: String },
    GitUnavailable { message: String },
    NotARepository { path: PathBuf },
    ShallowRepository { path: PathBuf },
    MissingBranch { branch: String },
}

impl Display for ConfigurationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingCredential { url } => write!(
                f,
                "no credential for `{url}`: embed it in the URL, set the token environment \
                 variable, or run `mirrorsync credential set`"
            ),
            Self::InvalidDestination { message } => write!(f, "invalid destination: {message}"),
            Self::InvalidSource { message } => write!(f, "invalid source: {message}"),
            Self::GitUnavailable { message } => write!(f, "git is not available: {message}"),
            Self::NotARepository { path } => {
                write!(f, "`{}` is not a git working copy", path.display())
            }
            Self::ShallowRepository { path } => write!(
                f,
                "`{}` is a shallow clone; mirroring needs complete history \
                 (run `git fetch --unshallow` or check out with full depth)",
                path.display()
            ),
            Self::MissingBranch { branch } => {
                write!(f, "local branch `{branch}` does not exist")
            }
        }
    }
}

impl Error for ConfigurationError {}

impl From<DescriptorError> for ConfigurationError {
    fn from(error: DescriptorError) -> Self {
        match error {
            DescriptorError::Remote(remote) => remote.into(),
            other => Self::InvalidDestination { message: other.to_string() },
        }
    }
}

impl From<RemoteError> for ConfigurationError {
    fn from(error: RemoteError) -> Self {
        match error {
            RemoteError::MissingCredential(url) => Self::MissingCredential { url },
            other => Self::InvalidDestination { message: other.to_string() },
        }
    }
}

/// Errors that end a run without producing a [`SyncOutcome`].
///
/// [`SyncOutcome`]: mirrorsync_common::types::SyncOutcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    Configuration(ConfigurationError),
    /// A local git operation failed for a reason that is neither a merge
    /// conflict nor a transport problem.
    Git { phase: SyncPhase, error: GitWorkerError },
}

impl SyncError {
    pub fn git(phase: SyncPhase, error: GitWorkerError) -> Self {
        Self::Git { phase, error }
    }

    pub fn phase(&self) -> SyncPhase {
        match self {
            Self::Configuration(_) => SyncPhase::Configure,
            Self::Git { phase, .. } => *phase,
        }
    }
}

impl Display for SyncError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Configuration(error) => write!(f, "configuration error: {error}"),
            Self::Git { phase, error } => write!(f, "{phase} failed: {error}"),
        }
    }
}

impl Error for SyncError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Configuration(error) => Some(error),
            Self::Git { error, .. } => Some(error),
        }
    }
}

impl From<ConfigurationError> for SyncError {
    fn from(error: ConfigurationError) -> Self {
        Self::Configuration(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_credential_maps_from_remote_error() {
        let error: ConfigurationError =
            RemoteError::MissingCredential("https://git.example.com/r.git".to_string()).into();
        assert_eq!(
            error,
            ConfigurationError::MissingCredential {
                url: "https://git.example.com/r.git".to_string()
            }
        );
        assert!(error.to_string().contains("mirrorsync credential set"));
    }

    #[test]
    fn sync_error_reports_phase() {
        let error = SyncError::git(
            SyncPhase::Merge,
            GitWorkerError::CommandFailed {
                command: "git merge".to_string(),
                code: Some(2),
                stderr: "error: untracked working tree files would be overwritten".to_string(),
            },
        );
        assert_eq!(error.phase(), SyncPhase::Merge);
        assert!(error.to_string().starts_with("merge failed:"));

        let config = SyncError::from(ConfigurationError::MissingBranch { branch: "main".into() });
        assert_eq!(config.phase(), SyncPhase::Configure);
    }
}
