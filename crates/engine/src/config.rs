// Configuration files for mirrorsync.
//
// Global config: `~/.mirrorsync/config.toml`
// Repository config: `<repo>/.mirrorsync.toml`
//
// Files are layered over the built-in defaults, global first, repository
// second. Command-line flags (and their environment fallbacks) are applied
// on top by the CLI.

use std::path::{Path, PathBuf};
use std::time::Duration;

use mirrorsync_common::remote::RemoteUrl;
use mirrorsync_common::types::{DEFAULT_BRANCH, DEFAULT_REMOTE_NAME};
use serde::{Deserialize, Serialize};

use crate::git::worker::GitIdentity;
use crate::security::{ensure_owner_only_dir, ensure_owner_only_file};
use crate::sync::{ConflictPolicy, RetryPolicy, SyncOptions};

/// Environment variable consulted for the destination token by default.
pub const DEFAULT_TOKEN_ENV: &str = "MIRRORSYNC_TOKEN";

pub const REPO_CONFIG_FILE: &str = ".mirrorsync.toml";

/// Root directory for global state: `~/.mirrorsync/`.
pub fn global_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".mirrorsync"))
}

/// Path to the global config file: `~/.mirrorsync/config.toml`.
pub fn global_config_path() -> Option<PathBuf> {
    global_dir().map(|d| d.join("config.toml"))
}

/// Path to the repository config file: `<repo>/.mirrorsync.toml`.
pub fn repo_config_path(repo_root: &Path) -> PathBuf {
    repo_root.join(REPO_CONFIG_FILE)
}

// ── Effective config ───────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct MirrorConfig {
    pub destination: DestinationConfig,
    pub source: SourceConfig,
    pub identity: IdentityConfig,
    pub transport: TransportConfig,
    pub merge: MergeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DestinationConfig {
    /// Name under which the destination is registered in the source repository.
    pub remote_name: String,
    /// Destination URL. Must not carry a password.
    pub url: Option<String>,
    /// Username paired with the token for http(s) destinations.
    pub username: Option<String>,
    pub branch: String,
    /// Environment variable holding the token.
    pub token_env: String,
}

impl Default for DestinationConfig {
    fn default() -> Self {
        Self {
            remote_name: DEFAULT_REMOTE_NAME.into(),
            url: None,
            username: None,
            branch: DEFAULT_BRANCH.into(),
            token_env: DEFAULT_TOKEN_ENV.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct SourceConfig {
    /// Local branch to mirror; the destination branch when unset.
    pub branch: Option<String>,
}

/// Author of merge commits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IdentityConfig {
    pub name: String,
    pub email: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        let identity = SyncOptions::default().identity;
        Self { name: identity.name, email: identity.email }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TransportConfig {
    /// Fetch/push timeout in seconds.
    pub timeout_sec: u64,
    /// Timeout for git commands that stay local.
    pub local_timeout_sec: u64,
    /// Extra attempts after a transport failure.
    pub retries: u32,
    pub retry_backoff_sec: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self { timeout_sec: 300, local_timeout_sec: 60, retries: 0, retry_backoff_sec: 5 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct MergeConfig {
    pub on_conflict: ConflictPolicy,
    /// Merge commit message template (`{remote}`, `{branch}`, `{source_branch}`).
    pub message: Option<String>,
}

impl MirrorConfig {
    /// Load the global and repository files for `repo_root`. Missing files
    /// are skipped; unreadable or invalid ones are errors.
    pub fn load(repo_root: &Path) -> Result<Self, ConfigError> {
        Self::load_from(global_config_path().as_deref(), &repo_config_path(repo_root))
    }

    pub fn load_from(global: Option<&Path>, repo: &Path) -> Result<Self, ConfigError> {
        let global = match global {
            Some(path) => ConfigLayer::load_if_exists(path)?,
            None => None,
        };
        let repo = ConfigLayer::load_if_exists(repo)?;
        Ok(merge_layers(global, repo))
    }

    pub fn source_branch(&self) -> &str {
        self.source.branch.as_deref().unwrap_or(&self.destination.branch)
    }

    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            identity: GitIdentity::new(&self.identity.name, &self.identity.email),
            transport_timeout: Duration::from_secs(self.transport.timeout_sec.max(1)),
            local_timeout: Duration::from_secs(self.transport.local_timeout_sec.max(1)),
            on_conflict: self.merge.on_conflict,
            merge_message: self.merge.message.clone(),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.transport.retries,
            Duration::from_secs(self.transport.retry_backoff_sec),
        )
    }
}

// ── Layers ─────────────────────────────────────────────────────────

/// One config file. Every field is optional so that a file only overrides
/// what it names.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigLayer {
    #[serde(skip_serializing_if = "DestinationLayer::is_empty")]
    pub destination: DestinationLayer,
    #[serde(skip_serializing_if = "SourceLayer::is_empty")]
    pub source: SourceLayer,
    #[serde(skip_serializing_if = "IdentityLayer::is_empty")]
    pub identity: IdentityLayer,
    #[serde(skip_serializing_if = "TransportLayer::is_empty")]
    pub transport: TransportLayer,
    #[serde(skip_serializing_if = "MergeLayer::is_empty")]
    pub merge: MergeLayer,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default, deny_unknown_fields)]
pub struct DestinationLayer {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_env: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default, deny_unknown_fields)]
pub struct SourceLayer {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default, deny_unknown_fields)]
pub struct IdentityLayer {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default, deny_unknown_fields)]
pub struct TransportLayer {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_sec: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_timeout_sec: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_backoff_sec: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default, deny_unknown_fields)]
pub struct MergeLayer {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on_conflict: Option<ConflictPolicy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

macro_rules! impl_is_empty {
    ($($layer:ty),*) => {
        $(impl $layer {
            pub fn is_empty(&self) -> bool {
                *self == Self::default()
            }
        })*
    };
}

impl_is_empty!(DestinationLayer, SourceLayer, IdentityLayer, TransportLayer, MergeLayer);

impl ConfigLayer {
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        let layer: Self = toml::from_str(&contents)
            .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })?;
        layer.reject_credentials(path)?;
        Ok(layer)
    }

    fn load_if_exists(path: &Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }
        Self::load_from(path).map(Some)
    }

    /// Save to a specific path (creates parent directories).
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        self.reject_credentials(path)?;
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(ConfigError::Io)?;
                ensure_owner_only_dir(parent)
                    .map_err(|error| ConfigError::Io(std::io::Error::other(error.to_string())))?;
            }
        }
        let contents = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        std::fs::write(path, contents).map_err(ConfigError::Io).and_then(|_| {
            ensure_owner_only_file(path)
                .map_err(|error| ConfigError::Io(std::io::Error::other(error.to_string())))
        })
    }

    pub fn apply_to(&self, config: &mut MirrorConfig) {
        let destination = &mut config.destination;
        if let Some(value) = &self.destination.remote_name {
            destination.remote_name = value.clone();
        }
        if let Some(value) = &self.destination.url {
            destination.url = Some(value.clone());
        }
        if let Some(value) = &self.destination.username {
            destination.username = Some(value.clone());
        }
        if let Some(value) = &self.destination.branch {
            destination.branch = value.clone();
        }
        if let Some(value) = &self.destination.token_env {
            destination.token_env = value.clone();
        }

        if let Some(value) = &self.source.branch {
            config.source.branch = Some(value.clone());
        }

        if let Some(value) = &self.identity.name {
            config.identity.name = value.clone();
        }
        if let Some(value) = &self.identity.email {
            config.identity.email = value.clone();
        }

        let transport = &mut config.transport;
        if let Some(value) = self.transport.timeout_sec {
            transport.timeout_sec = value;
        }
        if let Some(value) = self.transport.local_timeout_sec {
            transport.local_timeout_sec = value;
        }
        if let Some(value) = self.transport.retries {
            transport.retries = value;
        }
        if let Some(value) = self.transport.retry_backoff_sec {
            transport.retry_backoff_sec = value;
        }

        if let Some(value) = self.merge.on_conflict {
            config.merge.on_conflict = value;
        }
        if let Some(value) = &self.merge.message {
            config.merge.message = Some(value.clone());
        }
    }

    /// Tokens belong in the keychain or the environment, never in a file.
    fn reject_credentials(&self, path: &Path) -> Result<(), ConfigError> {
        let Some(url) = &self.destination.url else {
            return Ok(());
        };
        // Malformed URLs are reported when the destination is built.
        match RemoteUrl::parse(url) {
            Ok(parsed) if parsed.credential.is_some() => {
                Err(ConfigError::CredentialInFile { path: path.to_path_buf() })
            }
            _ => Ok(()),
        }
    }
}

pub fn merge_layers(global: Option<ConfigLayer>, repo: Option<ConfigLayer>) -> MirrorConfig {
    let mut config = MirrorConfig::default();
    if let Some(layer) = global {
        layer.apply_to(&mut config);
    }
    if let Some(layer) = repo {
        layer.apply_to(&mut config);
    }
    config
}

// ── Errors ─────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse { path: PathBuf, source: toml::de::Error },
    Serialize(toml::ser::Error),
    CredentialInFile { path: PathBuf },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "config I/O error: {e}"),
            Self::Parse { path, source } => {
                write!(f, "config parse error in `{}`: {source}", path.display())
            }
            Self::Serialize(e) => write!(f, "config serialize error: {e}"),
            Self::CredentialInFile { path } => write!(
                f,
                "`{}` contains a destination URL with a password; store the token in the \
                 keychain or an environment variable instead",
                path.display()
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Parse { source, .. } => Some(source),
            Self::Serialize(e) => Some(e),
            Self::CredentialInFile { .. } => None,
        }
    }
}
