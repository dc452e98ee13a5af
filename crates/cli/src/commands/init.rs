// `mirrorsync init`: write the repository config file.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::Args;
use mirrorsync_common::remote::RemoteUrl;
use mirrorsync_common::types::{RemoteDescriptor, DEFAULT_BRANCH, DEFAULT_REMOTE_NAME};
use mirrorsync_engine::config::{repo_config_path, ConfigLayer, DEFAULT_TOKEN_ENV};
use serde::Serialize;

use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct InitArgs {
    /// Source working copy the config is written into.
    #[arg(long, default_value = ".")]
    repo: PathBuf,

    /// Destination URL, without a token.
    #[arg(long)]
    url: String,

    /// Name under which the destination is registered locally.
    #[arg(long)]
    remote: Option<String>,

    /// Destination branch.
    #[arg(long)]
    branch: Option<String>,

    /// Local branch to mirror.
    #[arg(long)]
    source_branch: Option<String>,

    /// Username paired with the token for http(s) destinations.
    #[arg(long)]
    username: Option<String>,

    /// Overwrite an existing config file.
    #[arg(long)]
    force: bool,

    /// Force JSON output.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct InitResult {
    pub config_path: PathBuf,
    pub url: String,
    pub remote: String,
    pub branch: String,
    pub requires_token: bool,
}

pub fn run(args: InitArgs) -> anyhow::Result<()> {
    let format = OutputFormat::detect(args.json);
    match write_config(&args) {
        Ok(result) => {
            output::print_output(format, &result, format_human)?;
            Ok(())
        }
        Err(error) => {
            output::print_anyhow_error(format, &error);
            Err(error)
        }
    }
}

fn write_config(args: &InitArgs) -> anyhow::Result<InitResult> {
    let parsed = RemoteUrl::parse(&args.url)?;
    if parsed.credential.is_some() {
        bail!(
            "refusing to write a token into the config file; \
             store it with `mirrorsync credential set` or the {DEFAULT_TOKEN_ENV} variable"
        );
    }

    let layer = build_layer(args, &parsed.url, parsed.username);
    // Validates remote and branch names the same way a sync would.
    let descriptor = RemoteDescriptor::parse(
        layer.destination.remote_name.as_deref().unwrap_or(DEFAULT_REMOTE_NAME),
        parsed.url.as_str(),
        layer.destination.branch.as_deref().unwrap_or(DEFAULT_BRANCH),
    )?;

    let path = repo_config_path(&args.repo);
    ensure_writable(&path, args.force)?;
    layer
        .save_to(&path)
        .with_context(|| format!("failed to write {}", path.display()))?;

    Ok(InitResult {
        config_path: path,
        url: descriptor.url().to_string(),
        remote: descriptor.name().to_string(),
        branch: descriptor.branch().to_string(),
        requires_token: descriptor.url().requires_credential(),
    })
}

fn build_layer(args: &InitArgs, url: &RemoteUrl, url_username: Option<String>) -> ConfigLayer {
    let mut layer = ConfigLayer::default();
    layer.destination.url = Some(url.as_str().to_string());
    layer.destination.remote_name = args.remote.clone();
    layer.destination.branch = args.branch.clone();
    layer.destination.username = args.username.clone().or(url_username);
    layer.source.branch = args.source_branch.clone();
    layer
}

fn ensure_writable(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        bail!("{} already exists; pass --force to overwrite it", path.display());
    }
    Ok(())
}

fn format_human(result: &InitResult) -> String {
    let mut lines = vec![
        format!("Wrote {}", result.config_path.display()),
        format!("  destination: {} ({}/{})", result.url, result.remote, result.branch),
    ];
    if result.requires_token {
        lines.push(format!(
            "  next: export {DEFAULT_TOKEN_ENV} or run `mirrorsync credential set --stdin`"
        ));
    }
    lines.join("\n")
}
