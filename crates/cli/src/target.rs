// Resolves what a command operates on: the effective configuration, the
// source repository, the destination, and where the token comes from.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Args;
use mirrorsync_common::remote::{Credential, RemoteUrl};
use mirrorsync_common::types::{RemoteDescriptor, RepositoryHandle};
use mirrorsync_engine::config::MirrorConfig;
use mirrorsync_engine::security;
use mirrorsync_engine::sync::ConfigurationError;
use serde::Serialize;
use tracing::{debug, warn};

#[derive(Debug, Clone, Args, Default)]
pub struct TargetArgs {
    /// Source working copy.
    #[arg(long, default_value = ".")]
    pub repo: PathBuf,

    /// Destination URL. A token embedded in the URL is used for this run only.
    #[arg(long, env = "MIRRORSYNC_URL")]
    pub url: Option<String>,

    /// Name under which the destination is registered locally.
    #[arg(long)]
    pub remote: Option<String>,

    /// Destination branch.
    #[arg(long)]
    pub branch: Option<String>,

    /// Local branch to mirror (defaults to the destination branch).
    #[arg(long)]
    pub source_branch: Option<String>,

    /// Username paired with the token for http(s) destinations.
    #[arg(long)]
    pub username: Option<String>,

    /// Environment variable holding the destination token.
    #[arg(long)]
    pub token_env: Option<String>,

    /// Do not look up the token in the OS keychain.
    #[arg(long)]
    pub no_keychain: bool,
}

impl TargetArgs {
    /// Load config files for `--repo` and apply the flags on top.
    pub fn load_config(&self) -> anyhow::Result<MirrorConfig> {
        let mut config = MirrorConfig::load(&self.repo).with_context(|| {
            format!("failed to load configuration for `{}`", self.repo.display())
        })?;
        self.apply_to(&mut config);
        Ok(config)
    }

    pub fn apply_to(&self, config: &mut MirrorConfig) {
        let destination = &mut config.destination;
        if let Some(url) = &self.url {
            destination.url = Some(url.clone());
        }
        if let Some(remote) = &self.remote {
            destination.remote_name = remote.clone();
        }
        if let Some(branch) = &self.branch {
            destination.branch = branch.clone();
        }
        if let Some(username) = &self.username {
            destination.username = Some(username.clone());
        }
        if let Some(token_env) = &self.token_env {
            destination.token_env = token_env.clone();
        }
        if let Some(source_branch) = &self.source_branch {
            config.source.branch = Some(source_branch.clone());
        }
    }
}

pub fn source(config: &MirrorConfig, repo: &Path) -> Result<RepositoryHandle, ConfigurationError> {
    RepositoryHandle::new(repo, config.source_branch())
        .map_err(|error| ConfigurationError::InvalidSource { message: error.to_string() })
}

/// Destination described by `config`, without a credential from outside the URL.
pub fn destination(config: &MirrorConfig) -> Result<RemoteDescriptor, ConfigurationError> {
    let url = config.destination.url.as_deref().ok_or_else(|| {
        ConfigurationError::InvalidDestination {
            message: "no destination URL; pass --url or set `destination.url` in .mirrorsync.toml"
                .to_string(),
        }
    })?;
    let descriptor =
        RemoteDescriptor::parse(&config.destination.remote_name, url, &config.destination.branch)?;
    Ok(descriptor.with_username(config.destination.username.clone()))
}

/// Where the destination token came from. Never carries the token itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum CredentialSource {
    NotRequired,
    Url,
    Env(String),
    Keychain,
    Missing,
}

impl CredentialSource {
    pub fn describe(&self) -> String {
        match self {
            Self::NotRequired => "no token needed for this URL scheme".to_string(),
            Self::Url => "token embedded in the URL".to_string(),
            Self::Env(name) => format!("token from ${name}"),
            Self::Keychain => "token from the OS keychain".to_string(),
            Self::Missing => "no token found".to_string(),
        }
    }
}

/// Attach a credential to `descriptor`: URL first, then the environment
/// variable, then the keychain.
pub fn resolve_credential(
    descriptor: RemoteDescriptor,
    token_env: &str,
    use_keychain: bool,
) -> (RemoteDescriptor, CredentialSource) {
    resolve_credential_with(
        descriptor,
        token_env,
        |name| std::env::var(name).ok(),
        use_keychain.then_some(security::get_token as fn(&RemoteUrl) -> anyhow::Result<Option<Credential>>),
    )
}

fn resolve_credential_with<L, K>(
    descriptor: RemoteDescriptor,
    token_env: &str,
    env_lookup: L,
    keychain: Option<K>,
) -> (RemoteDescriptor, CredentialSource)
where
    L: Fn(&str) -> Option<String>,
    K: Fn(&RemoteUrl) -> anyhow::Result<Option<Credential>>,
{
    if !descriptor.url().requires_credential() {
        return (descriptor, CredentialSource::NotRequired);
    }
    if descriptor.has_credential() {
        return (descriptor, CredentialSource::Url);
    }

    if let Some(credential) = env_lookup(token_env).and_then(Credential::new) {
        debug!(env = token_env, "using token from environment");
        return (descriptor.with_credential(Some(credential)), CredentialSource::Env(token_env.to_string()));
    }

    if let Some(lookup) = keychain {
        match lookup(descriptor.url()) {
            Ok(Some(credential)) => {
                debug!(url = %descriptor.url(), "using token from keychain");
                return (descriptor.with_credential(Some(credential)), CredentialSource::Keychain);
            }
            Ok(None) => {}
            Err(error) => warn!(error = %format!("{error:#}"), "keychain lookup failed"),
        }
    }

    (descriptor, CredentialSource::Missing)
}
