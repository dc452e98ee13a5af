use std::fs::{self, OpenOptions};
use std::path::Path;

use anyhow::{bail, Context, Result};
use mirrorsync_common::remote::{Credential, RemoteUrl};

const KEYRING_SERVICE: &str = "dev.mirrorsync";

/// Keychain account for a destination: its credential-free URL.
fn account(url: &RemoteUrl) -> &str {
    url.as_str()
}

pub fn set_token(url: &RemoteUrl, token: &str) -> Result<()> {
    set_token_with_store(&KeyringSecretStore, url, token)
}

pub fn get_token(url: &RemoteUrl) -> Result<Option<Credential>> {
    get_token_with_store(&KeyringSecretStore, url)
}

pub fn delete_token(url: &RemoteUrl) -> Result<()> {
    delete_token_with_store(&KeyringSecretStore, url)
}

pub fn ensure_owner_only_file(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        if !path.exists() {
            return Ok(());
        }

        let metadata = fs::metadata(path)
            .with_context(|| format!("failed to read metadata for `{}`", path.display()))?;
        let mode = metadata.permissions().mode() & 0o777;
        if mode != 0o600 {
            fs::set_permissions(path, fs::Permissions::from_mode(0o600))
                .with_context(|| format!("failed to set owner-only mode on `{}`", path.display()))?;
        }
    }

    #[cfg(not(unix))]
    {
        let _ = path;
    }

    Ok(())
}

pub fn ensure_owner_only_dir(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        if !path.exists() {
            return Ok(());
        }

        let metadata = fs::metadata(path)
            .with_context(|| format!("failed to read metadata for `{}`", path.display()))?;
        let mode = metadata.permissions().mode() & 0o777;
        if mode != 0o700 {
            fs::set_permissions(path, fs::Permissions::from_mode(0o700))
                .with_context(|| format!("failed to set owner-only mode on `{}`", path.display()))?;
        }
    }

    #[cfg(not(unix))]
    {
        let _ = path;
    }

    Ok(())
}

/// Create `path` exclusively with owner-only permissions. Fails with
/// `AlreadyExists` when the file is already there.
pub fn open_private_create_new(path: &Path) -> std::io::Result<std::fs::File> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;

        OpenOptions::new().write(true).create_new(true).mode(0o600).open(path)
    }
    #[cfg(not(unix))]
    {
        OpenOptions::new().write(true).create_new(true).open(path)
    }
}

trait SecretStore: Send + Sync {
    fn set_secret(&self, service: &str, account: &str, value: &str) -> Result<()>;
    fn get_secret(&self, service: &str, account: &str) -> Result<Option<String>>;
    fn delete_secret(&self, service: &str, account: &str) -> Result<()>;
}

struct KeyringSecretStore;

impl SecretStore for KeyringSecretStore {
    fn set_secret(&self, service: &str, account: &str, value: &str) -> Result<()> {
        let entry = keyring::Entry::new(service, account)
            .context("failed to initialize keychain entry")?;
        entry.set_password(value).context("failed to write keychain entry")?;
        Ok(())
    }

    fn get_secret(&self, service: &str, account: &str) -> Result<Option<String>> {
        let entry = keyring::Entry::new(service, account)
            .context("failed to initialize keychain entry")?;
        match entry.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(error) => Err(error).context("failed to read keychain entry"),
        }
    }

    fn delete_secret(&self, service: &str, account: &str) -> Result<()> {
        let entry = keyring::Entry::new(service, account)
            .context("failed to initialize keychain entry")?;
        match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(error) => Err(error).context("failed to delete keychain entry"),
        }
    }
}

fn set_token_with_store(store: &dyn SecretStore, url: &RemoteUrl, token: &str) -> Result<()> {
    if token.trim().is_empty() {
        bail!("token must not be empty");
    }
    store
        .set_secret(KEYRING_SERVICE, account(url), token.trim())
        .with_context(|| format!("failed to store token for `{url}` in keychain"))
}

fn get_token_with_store(store: &dyn SecretStore, url: &RemoteUrl) -> Result<Option<Credential>> {
    let stored = store
        .get_secret(KEYRING_SERVICE, account(url))
        .with_context(|| format!("failed to read token for `{url}` from keychain"))?;
    Ok(stored.and_then(Credential::new))
}

fn delete_token_with_store(store: &dyn SecretStore, url: &RemoteUrl) -> Result<()> {
    store
        .delete_secret(KEYRING_SERVICE, account(url))
        .with_context(|| format!("failed to clear token for `{url}` from keychain"))
}
