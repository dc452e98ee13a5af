// `mirrorsync sync`: one synchronization run, with optional retries.

use anyhow::Context;
use clap::{Args, ValueEnum};
use mirrorsync_common::types::{short_sha, SyncOutcome};
use mirrorsync_engine::config::MirrorConfig;
use mirrorsync_engine::git::worker::GitWorker;
use mirrorsync_engine::lock::RunLock;
use mirrorsync_engine::sync::{ConfigurationError, ConflictPolicy, RetryReport, Synchronizer};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::exit_code::ExitCode;
use crate::output::{self, OutputFormat};
use crate::target::{self, CredentialSource, TargetArgs};

#[derive(Debug, Args)]
pub struct SyncArgs {
    #[command(flatten)]
    target: TargetArgs,

    /// Fetch/push timeout in seconds.
    #[arg(long)]
    timeout: Option<u64>,

    /// Extra attempts after a transport failure.
    #[arg(long)]
    retries: Option<u32>,

    /// Seconds to wait between attempts.
    #[arg(long)]
    retry_backoff: Option<u64>,

    /// What to do when the merge conflicts.
    #[arg(long, value_enum)]
    on_conflict: Option<OnConflict>,

    /// Force JSON output.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OnConflict {
    Abort,
    ReportAndPush,
}

impl From<OnConflict> for ConflictPolicy {
    fn from(value: OnConflict) -> Self {
        match value {
            OnConflict::Abort => ConflictPolicy::Abort,
            OnConflict::ReportAndPush => ConflictPolicy::ReportAndPush,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub run_id: Uuid,
    pub remote: String,
    pub url: String,
    pub source_branch: String,
    pub branch: String,
    pub credential: CredentialSource,
    pub attempts: u32,
    pub outcome: SyncOutcome,
}

pub fn run(args: SyncArgs) -> anyhow::Result<ExitCode> {
    let format = OutputFormat::detect(args.json);
    match execute(&args) {
        Ok(report) => {
            output::print_output(format, &report, format_human)?;
            match &report.outcome {
                SyncOutcome::Success { .. } => {}
                SyncOutcome::ConflictDetected { diagnostic, .. } => output::print_error(
                    format,
                    "CONFLICT",
                    &format!("needs manual merge: {diagnostic}"),
                ),
                SyncOutcome::TransportFailure { diagnostic, .. } => output::print_error(
                    format,
                    "TRANSPORT_FAILURE",
                    &format!("transient network issue, safe to retry: {diagnostic}"),
                ),
            }
            Ok(ExitCode::from_outcome(&report.outcome))
        }
        Err(error) => {
            output::print_anyhow_error(format, &error);
            Err(error)
        }
    }
}

fn execute(args: &SyncArgs) -> anyhow::Result<SyncReport> {
    let mut config = args.target.load_config()?;
    apply_overrides(args, &mut config);

    let source = target::source(&config, &args.target.repo)?;
    let destination = target::destination(&config)?;
    let (destination, credential) = target::resolve_credential(
        destination,
        &config.destination.token_env,
        !args.target.no_keychain,
    );
    if credential == CredentialSource::Missing {
        return Err(ConfigurationError::MissingCredential {
            url: destination.url().to_string(),
        }
        .into());
    }

    let run_id = Uuid::new_v4();
    let synchronizer = Synchronizer::new(config.sync_options());
    let policy = config.retry_policy();
    info!(%run_id, url = %destination.url(), branch = destination.branch(), "starting sync");

    let report = super::runtime()?.block_on(async {
        // Outside a repository the synchronizer reports the problem itself.
        let lock = match GitWorker::new(source.path()).git_dir().await {
            Ok(git_dir) => Some(
                RunLock::acquire(&git_dir, run_id).context("failed to take the run lock")?,
            ),
            Err(error) => {
                warn!(error = %error, "could not locate git directory; running without lock");
                None
            }
        };

        let report = synchronizer
            .synchronize_with_retry(&source, &destination, &policy, run_id)
            .await
            .context("sync failed")?;

        if let Some(lock) = lock {
            if let Err(error) = lock.release() {
                warn!(error = %error, "failed to remove run lock");
            }
        }
        anyhow::Ok(report)
    })?;

    let RetryReport { outcome, attempts } = report;
    Ok(SyncReport {
        run_id,
        remote: destination.name().to_string(),
        url: destination.url().to_string(),
        source_branch: source.branch().to_string(),
        branch: destination.branch().to_string(),
        credential,
        attempts,
        outcome,
    })
}

fn apply_overrides(args: &SyncArgs, config: &mut MirrorConfig) {
    if let Some(timeout) = args.timeout {
        config.transport.timeout_sec = timeout;
    }
    if let Some(retries) = args.retries {
        config.transport.retries = retries;
    }
    if let Some(backoff) = args.retry_backoff {
        config.transport.retry_backoff_sec = backoff;
    }
    if let Some(on_conflict) = args.on_conflict {
        config.merge.on_conflict = on_conflict.into();
    }
}

fn format_human(report: &SyncReport) -> String {
    let mut lines = Vec::new();
    let symbol = match &report.outcome {
        SyncOutcome::Success { .. } => "✓",
        SyncOutcome::ConflictDetected { .. } => "✗",
        SyncOutcome::TransportFailure { .. } => "⚠",
    };
    lines.push(format!("{symbol} {}", report.outcome.diagnostic()));
    lines.push(format!(
        "  {} → {} ({}/{})",
        report.source_branch, report.url, report.remote, report.branch
    ));
    if let SyncOutcome::Success { head, .. } = &report.outcome {
        lines.push(format!("  head: {}", short_sha(head)));
    }
    if let SyncOutcome::ConflictDetected { paths, .. } = &report.outcome {
        for path in paths {
            lines.push(format!("  conflict: {path}"));
        }
    }
    if report.attempts > 1 {
        lines.push(format!("  attempts: {}", report.attempts));
    }
    lines.join("\n")
}
