// Core domain types shared across the mirrorsync crates.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::refname::{validate_branch_name, validate_remote_name, RefNameError};
use crate::remote::{Credential, RemoteError, RemoteUrl};

/// Branch mirrored when nothing else is configured.
pub const DEFAULT_BRANCH: &str = "main";

/// Remote name used to register the destination in the source repository.
pub const DEFAULT_REMOTE_NAME: &str = "mirror";

/// A local working copy with complete history and the branch being mirrored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryHandle {
    path: PathBuf,
    branch: String,
}

impl RepositoryHandle {
    pub fn new(path: impl Into<PathBuf>, branch: impl Into<String>) -> Result<Self, RefNameError> {
        let branch = branch.into();
        validate_branch_name(&branch)?;
        Ok(Self { path: path.into(), branch })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DescriptorError {
    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    RefName(#[from] RefNameError),
}

/// The destination remote for one run.
///
/// The URL is kept credential-free; the credential travels beside it and is
/// only combined with the URL for individual fetch/push invocations.
#[derive(Debug, Clone)]
pub struct RemoteDescriptor {
    name: String,
    url: RemoteUrl,
    branch: String,
    username: Option<String>,
    credential: Option<Credential>,
}

impl RemoteDescriptor {
    /// Parse `raw_url`; any userinfo embedded in it becomes the descriptor's
    /// username and credential.
    pub fn parse(
        name: impl Into<String>,
        raw_url: &str,
        branch: impl Into<String>,
    ) -> Result<Self, DescriptorError> {
        let name = name.into();
        let branch = branch.into();
        validate_remote_name(&name)?;
        validate_branch_name(&branch)?;

        let parsed = RemoteUrl::parse(raw_url)?;
        Ok(Self {
            name,
            url: parsed.url,
            branch,
            username: parsed.username,
            credential: parsed.credential,
        })
    }

    /// Set the username unless the URL already carried one.
    pub fn with_username(mut self, username: Option<String>) -> Self {
        if self.username.is_none() {
            self.username = username.filter(|name| !name.trim().is_empty());
        }
        self
    }

    /// Set the credential unless the URL already carried one.
    pub fn with_credential(mut self, credential: Option<Credential>) -> Self {
        if self.credential.is_none() {
            self.credential = credential;
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn url(&self) -> &RemoteUrl {
        &self.url
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    pub fn has_credential(&self) -> bool {
        self.credential.is_some()
    }

    /// URL with the credential embedded, for a single git invocation.
    pub fn authenticated_url(&self) -> Result<String, RemoteError> {
        self.url.authenticated(self.username(), self.credential())
    }

    /// `refs/remotes/<name>/<branch>`: where the fetched destination tip lands.
    pub fn tracking_ref(&self) -> String {
        format!("refs/remotes/{}/{}", self.name, self.branch)
    }
}

// ── Outcomes ───────────────────────────────────────────────────────

/// Stage of a synchronization run, used to label diagnostics.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Configure,
    Fetch,
    Merge,
    Push,
}

impl SyncPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Configure => "configure",
            Self::Fetch => "fetch",
            Self::Merge => "merge",
            Self::Push => "push",
        }
    }
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the destination branch was folded into the local branch.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Integration {
    /// Destination had no branch to integrate.
    DestinationEmpty,
    /// Destination tip is already an ancestor of the local branch.
    AlreadyIntegrated,
    /// Local branch was behind and simply advanced.
    FastForward,
    /// A merge commit joins the local tip and the destination tip.
    MergeCommit,
}

/// Result of one synchronization attempt. Immutable once produced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SyncOutcome {
    Success { integration: Integration, head: String, diagnostic: String },
    ConflictDetected { paths: Vec<String>, push_attempted: bool, diagnostic: String },
    TransportFailure { phase: SyncPhase, rejected: bool, diagnostic: String },
}

impl SyncOutcome {
    pub fn success(integration: Integration, head: impl Into<String>) -> Self {
        let head = head.into();
        let short = short_sha(&head);
        let diagnostic = match integration {
            Integration::DestinationEmpty => {
                format!("destination branch was empty; pushed {short}")
            }
            Integration::AlreadyIntegrated => {
                format!("destination already integrated; pushed {short}")
            }
            Integration::FastForward => {
                format!("fast-forwarded to destination at {short}; pushed")
            }
            Integration::MergeCommit => {
                format!("merged destination history as {short} and pushed")
            }
        };
        Self::Success { integration, head, diagnostic }
    }

    /// `push_note` describes a push attempted despite the conflict.
    pub fn conflict(paths: Vec<String>, push_note: Option<String>) -> Self {
        let mut diagnostic = if paths.is_empty() {
            "merge conflict; manual merge required".to_string()
        } else {
            format!(
                "merge conflict in {} path(s): {}; manual merge required",
                paths.len(),
                paths.join(", ")
            )
        };
        let push_attempted = push_note.is_some();
        if let Some(note) = push_note {
            diagnostic.push_str(&format!(" ({note})"));
        }
        Self::ConflictDetected { paths, push_attempted, diagnostic }
    }

    pub fn transport(phase: SyncPhase, rejected: bool, detail: &str) -> Self {
        let detail = detail.trim();
        let diagnostic = if rejected {
            format!("{phase} rejected: {detail}")
        } else {
            format!("{phase} failed: {detail}")
        };
        Self::TransportFailure { phase, rejected, diagnostic }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Success { .. } => "success",
            Self::ConflictDetected { .. } => "conflict_detected",
            Self::TransportFailure { .. } => "transport_failure",
        }
    }

    pub fn diagnostic(&self) -> &str {
        match self {
            Self::Success { diagnostic, .. }
            | Self::ConflictDetected { diagnostic, .. }
            | Self::TransportFailure { diagnostic, .. } => diagnostic,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Transport failures leave nothing half-applied and may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransportFailure { .. })
    }
}

/// Abbreviate a commit id for human-facing text.
pub fn short_sha(sha: &str) -> &str {
    sha.get(..12).unwrap_or(sha)
}
