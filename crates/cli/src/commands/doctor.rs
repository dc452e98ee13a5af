// `mirrorsync doctor`: local health checks. Never contacts the destination.

use std::io::IsTerminal;
use std::path::Path;
use std::process::Command;

use clap::Args;
use mirrorsync_common::remote::{redact_userinfo, RemoteUrl};
use mirrorsync_engine::config::MirrorConfig;
use mirrorsync_engine::git::worker::GitWorker;
use mirrorsync_engine::lock::{is_stale, read_lock_meta, RunLockError, LOCK_FILE_NAME};
use serde::Serialize;

use crate::exit_code::ExitCode;
use crate::output::{self, OutputFormat, ANSI_GREEN, ANSI_RED, ANSI_RESET, ANSI_YELLOW};
use crate::target::{self, CredentialSource, TargetArgs};

#[derive(Debug, Args)]
pub struct DoctorArgs {
    #[command(flatten)]
    target: TargetArgs,

    /// Force JSON output.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
enum DoctorStatus {
    Pass,
    Warning,
    Fail,
}

#[derive(Debug, Clone, Serialize)]
pub struct DoctorCheck {
    name: String,
    status: DoctorStatus,
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<String>,
}

impl DoctorCheck {
    fn pass(name: &str, detail: impl Into<String>) -> Self {
        Self { name: name.to_string(), status: DoctorStatus::Pass, detail: detail.into(), hint: None }
    }

    fn warning(name: &str, detail: impl Into<String>, hint: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status: DoctorStatus::Warning,
            detail: detail.into(),
            hint: Some(hint.into()),
        }
    }

    fn fail(name: &str, detail: impl Into<String>, hint: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status: DoctorStatus::Fail,
            detail: detail.into(),
            hint: Some(hint.into()),
        }
    }
}

pub fn run(args: DoctorArgs) -> anyhow::Result<ExitCode> {
    let format = OutputFormat::detect(args.json);
    let checks = super::runtime()?.block_on(collect_checks(&args.target));

    output::print_output(format, &checks, |checks| format_human(checks))?;
    let status = checks.iter().fold(DoctorStatus::Pass, |acc, check| worse_status(acc, check.status));
    if status == DoctorStatus::Fail {
        output::print_error(format, "DOCTOR_FAILED", "one or more checks failed");
        return Ok(ExitCode::Config);
    }
    Ok(ExitCode::Success)
}

async fn collect_checks(target: &TargetArgs) -> Vec<DoctorCheck> {
    let mut checks = vec![check_git()];

    let config = match target.load_config() {
        Ok(config) => {
            checks.push(DoctorCheck::pass("config", "configuration loaded"));
            config
        }
        Err(error) => {
            checks.push(DoctorCheck::fail(
                "config",
                format!("{error:#}"),
                "fix or remove the offending config file",
            ));
            return checks;
        }
    };

    let worker = GitWorker::new(target.repo.as_path());
    let in_repository = check_repository(&worker, &target.repo, &mut checks).await;
    if in_repository {
        checks.push(check_branch(&worker, config.source_branch()).await);
    }

    checks.extend(check_destination(&config, target.no_keychain));

    if in_repository {
        checks.push(check_run_lock(&worker).await);
        checks.push(check_remote(&worker, &config).await);
    }
    checks
}

fn check_git() -> DoctorCheck {
    match Command::new("git").arg("--version").output() {
        Ok(output) if output.status.success() => {
            DoctorCheck::pass("git", String::from_utf8_lossy(&output.stdout).trim().to_string())
        }
        Ok(output) => DoctorCheck::fail(
            "git",
            format!("git --version exited with {}", output.status),
            "reinstall git",
        ),
        Err(error) => DoctorCheck::fail(
            "git",
            format!("git is not runnable: {error}"),
            "install git and make sure it is on PATH",
        ),
    }
}

/// Push the work-tree and shallow checks; returns whether `repo` is usable.
async fn check_repository(worker: &GitWorker, repo: &Path, checks: &mut Vec<DoctorCheck>) -> bool {
    match worker.is_work_tree().await {
        Ok(true) => {
            checks.push(DoctorCheck::pass("repository", format!("{} is a git working copy", repo.display())));
        }
        Ok(false) => {
            checks.push(DoctorCheck::fail(
                "repository",
                format!("{} is not a git working copy", repo.display()),
                "pass --repo pointing at a clone of the source repository",
            ));
            return false;
        }
        Err(error) => {
            checks.push(DoctorCheck::fail("repository", error.detail(), "check that git runs"));
            return false;
        }
    }

    match worker.is_shallow().await {
        Ok(false) => checks.push(DoctorCheck::pass("history", "complete history available")),
        Ok(true) => checks.push(DoctorCheck::fail(
            "history",
            "shallow clone",
            "run `git fetch --unshallow` or clone with full depth",
        )),
        Err(error) => checks.push(DoctorCheck::warning(
            "history",
            error.detail(),
            "could not tell whether the clone is shallow",
        )),
    }
    true
}

async fn check_branch(worker: &GitWorker, branch: &str) -> DoctorCheck {
    match worker.resolve_commit(&format!("refs/heads/{branch}")).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            return DoctorCheck::fail(
                "branch",
                format!("local branch `{branch}` does not exist"),
                "pass --source-branch or create the branch",
            );
        }
        Err(error) => return DoctorCheck::fail("branch", error.detail(), "check the repository"),
    }

    match worker.merge_in_progress().await {
        Ok(true) => DoctorCheck::warning(
            "branch",
            format!("`{branch}` exists but a merge is in progress"),
            "the next sync aborts the unfinished merge",
        ),
        Ok(false) => DoctorCheck::pass("branch", format!("`{branch}` exists")),
        Err(error) => DoctorCheck::warning("branch", error.detail(), "check the repository"),
    }
}

fn check_destination(config: &MirrorConfig, no_keychain: bool) -> Vec<DoctorCheck> {
    let descriptor = match target::destination(config) {
        Ok(descriptor) => descriptor,
        Err(error) => {
            return vec![DoctorCheck::fail(
                "destination",
                error.to_string(),
                "run `mirrorsync init --url <url>` or pass --url",
            )];
        }
    };

    let destination = DoctorCheck::pass(
        "destination",
        format!("{} ({}/{})", descriptor.url(), descriptor.name(), descriptor.branch()),
    );
    let (_, source) =
        target::resolve_credential(descriptor, &config.destination.token_env, !no_keychain);
    let credential = match source {
        CredentialSource::Missing => DoctorCheck::fail(
            "credential",
            source.describe(),
            format!(
                "export {} or run `mirrorsync credential set --stdin`",
                config.destination.token_env
            ),
        ),
        CredentialSource::Url => DoctorCheck::warning(
            "credential",
            source.describe(),
            "prefer the token environment variable or the keychain",
        ),
        other => DoctorCheck::pass("credential", other.describe()),
    };
    vec![destination, credential]
}

async fn check_run_lock(worker: &GitWorker) -> DoctorCheck {
    let git_dir = match worker.git_dir().await {
        Ok(git_dir) => git_dir,
        Err(error) => return DoctorCheck::warning("run_lock", error.detail(), "check the repository"),
    };
    let path = git_dir.join(LOCK_FILE_NAME);
    if !path.exists() && path.symlink_metadata().is_err() {
        return DoctorCheck::pass("run_lock", "no sync in progress");
    }

    let hint = format!("if no sync is running, delete {}", path.display());
    match read_lock_meta(&path) {
        Ok(meta) if is_stale(&meta) => DoctorCheck::warning(
            "run_lock",
            format!("left by pid {} (run {}), which is no longer running", meta.pid, meta.run_id),
            "the next sync takes it over",
        ),
        Ok(meta) => DoctorCheck::warning(
            "run_lock",
            format!("held by pid {} (run {}) since {}", meta.pid, meta.run_id, meta.started_at),
            hint,
        ),
        Err(error @ RunLockError::Symlink { .. }) => {
            DoctorCheck::fail("run_lock", error.to_string(), hint)
        }
        Err(_) => DoctorCheck::warning("run_lock", "lock file present but unreadable", hint),
    }
}

async fn check_remote(worker: &GitWorker, config: &MirrorConfig) -> DoctorCheck {
    let name = &config.destination.remote_name;
    let registered = match worker.remote_url(name).await {
        Ok(registered) => registered,
        Err(error) => return DoctorCheck::warning("remote", error.detail(), "check the repository"),
    };
    let Some(registered) = registered else {
        return DoctorCheck::pass("remote", format!("`{name}` not registered yet; sync adds it"));
    };

    let embeds_secret =
        RemoteUrl::parse(&registered).is_ok_and(|parsed| parsed.credential.is_some());
    if embeds_secret {
        return DoctorCheck::fail(
            "remote",
            format!("`{name}` has a credential stored in .git/config"),
            format!("run `git remote set-url {name} <url without credentials>`"),
        );
    }
    let expected = config
        .destination
        .url
        .as_deref()
        .and_then(|url| RemoteUrl::parse(url).ok())
        .map(|parsed| parsed.url.as_str().to_string());
    match expected {
        Some(expected) if expected != registered => DoctorCheck::warning(
            "remote",
            format!("`{name}` points at {}", redact_userinfo(&registered)),
            "sync will update it to the configured destination",
        ),
        _ => DoctorCheck::pass("remote", format!("`{name}` → {registered}")),
    }
}

fn worse_status(current: DoctorStatus, next: DoctorStatus) -> DoctorStatus {
    match (current, next) {
        (DoctorStatus::Fail, _) | (_, DoctorStatus::Fail) => DoctorStatus::Fail,
        (DoctorStatus::Warning, _) | (_, DoctorStatus::Warning) => DoctorStatus::Warning,
        _ => DoctorStatus::Pass,
    }
}

fn format_human(checks: &[DoctorCheck]) -> String {
    let use_color = std::io::stdout().is_terminal();
    let mut lines = Vec::new();

    for check in checks {
        let (symbol, color) = match check.status {
            DoctorStatus::Pass => ("✓", ANSI_GREEN),
            DoctorStatus::Warning => ("⚠", ANSI_YELLOW),
            DoctorStatus::Fail => ("✗", ANSI_RED),
        };
        let rendered_symbol =
            if use_color { format!("{color}{symbol}{ANSI_RESET}") } else { symbol.to_string() };
        lines.push(format!("{rendered_symbol} {}: {}", check.name, check.detail));
        if let Some(hint) = &check.hint {
            lines.push(format!("  hint: {hint}"));
        }
    }

    let passed = checks.iter().filter(|check| check.status == DoctorStatus::Pass).count();
    let warnings = checks.iter().filter(|check| check.status == DoctorStatus::Warning).count();
    let failed = checks.iter().filter(|check| check.status == DoctorStatus::Fail).count();
    lines.push(String::new());
    lines.push(format!("Summary: {passed} passed, {warnings} warning(s), {failed} failed"));
    lines.join("\n")
}
