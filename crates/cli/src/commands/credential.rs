// `mirrorsync credential`: keep the destination token in the OS keychain.

use std::io::{self, BufRead};
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Args, Subcommand};
use mirrorsync_common::remote::{Credential, RemoteUrl};
use mirrorsync_engine::config::MirrorConfig;
use mirrorsync_engine::security;
use serde::Serialize;

use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct CredentialArgs {
    #[command(subcommand)]
    action: CredentialAction,
}

#[derive(Debug, Subcommand)]
enum CredentialAction {
    /// Store a token for the destination
    Set(SetArgs),
    /// Remove the stored token for the destination
    Delete(DestinationArgs),
}

#[derive(Debug, Args)]
struct DestinationArgs {
    /// Repository whose config names the destination.
    #[arg(long, default_value = ".")]
    repo: PathBuf,

    /// Destination URL (overrides the config).
    #[arg(long, env = "MIRRORSYNC_URL")]
    url: Option<String>,

    /// Force JSON output.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
struct SetArgs {
    #[command(flatten)]
    destination: DestinationArgs,

    /// Read the token from the first line of stdin.
    #[arg(long)]
    stdin: bool,

    /// Environment variable to read the token from when --stdin is not given.
    #[arg(long)]
    token_env: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CredentialResult {
    pub action: &'static str,
    pub url: String,
}

pub fn run(args: CredentialArgs) -> anyhow::Result<()> {
    let (json, result) = match &args.action {
        CredentialAction::Set(set) => (set.destination.json, store(set)),
        CredentialAction::Delete(delete) => (delete.json, remove(delete)),
    };
    let format = OutputFormat::detect(json);
    match result {
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

fn store(args: &SetArgs) -> anyhow::Result<CredentialResult> {
    let (url, config) = resolve_url(&args.destination)?;
    let token = if args.stdin {
        read_token(io::stdin().lock())?
    } else {
        let name = args.token_env.clone().unwrap_or(config.destination.token_env);
        std::env::var(&name)
            .ok()
            .and_then(Credential::new)
            .with_context(|| format!("no token given; pass --stdin or set ${name}"))?
    };

    security::set_token(&url, token.expose())?;
    Ok(CredentialResult { action: "stored", url: url.to_string() })
}

fn remove(args: &DestinationArgs) -> anyhow::Result<CredentialResult> {
    let (url, _) = resolve_url(args)?;
    security::delete_token(&url)?;
    Ok(CredentialResult { action: "deleted", url: url.to_string() })
}

fn resolve_url(args: &DestinationArgs) -> anyhow::Result<(RemoteUrl, MirrorConfig)> {
    let mut config = MirrorConfig::load(&args.repo).with_context(|| {
        format!("failed to load configuration for `{}`", args.repo.display())
    })?;
    if let Some(url) = &args.url {
        config.destination.url = Some(url.clone());
    }
    let Some(raw) = config.destination.url.as_deref() else {
        bail!("no destination URL; pass --url or run `mirrorsync init`");
    };

    let parsed = RemoteUrl::parse(raw)?;
    if !parsed.url.requires_credential() {
        bail!("{} URLs do not use a token", parsed.url.scheme());
    }
    Ok((parsed.url, config))
}

fn read_token(reader: impl BufRead) -> anyhow::Result<Credential> {
    let line = reader
        .lines()
        .next()
        .transpose()
        .context("failed to read token from stdin")?
        .unwrap_or_default();
    Credential::new(line).context("empty token on stdin")
}

fn format_human(result: &CredentialResult) -> String {
    format!("Token {} for {}", result.action, result.url)
}
