use std::error::Error;
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use mirrorsync_common::remote::Redactor;
use tokio::process::Command;
use tracing::debug;

/// Timeout for git commands that never leave the machine.
pub const DEFAULT_LOCAL_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitCommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Failures running git. Command strings and stderr are already redacted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GitWorkerError {
    SpawnFailed { command: String, message: String },
    CommandFailed { command: String, code: Option<i32>, stderr: String },
    TimedOut { command: String, after: Duration },
}

impl GitWorkerError {
    /// One-line summary of what git reported, without `hint:` noise.
    pub fn detail(&self) -> String {
        match self {
            GitWorkerError::SpawnFailed { message, .. } => message.clone(),
            GitWorkerError::CommandFailed { code, stderr, .. } => {
                let lines: Vec<&str> = stderr
                    .lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty() && !line.starts_with("hint:"))
                    .collect();
                if lines.is_empty() {
                    format!("exited with code {code:?}")
                } else {
                    lines.join("; ")
                }
            }
            GitWorkerError::TimedOut { after, .. } => {
                format!("timed out after {}s", after.as_secs())
            }
        }
    }

    pub fn stderr(&self) -> &str {
        match self {
            GitWorkerError::CommandFailed { stderr, .. } => stderr,
            _ => "",
        }
    }
}

impl Display for GitWorkerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            GitWorkerError::SpawnFailed { command, message } => {
                write!(f, "failed to run `{command}`: {message}")
            }
            GitWorkerError::CommandFailed { command, code, stderr } => {
                write!(f, "`{command}` failed with code {:?}: {}", code, stderr.trim())
            }
            GitWorkerError::TimedOut { command, after } => {
                write!(f, "`{command}` timed out after {}s", after.as_secs())
            }
        }
    }
}

impl Error for GitWorkerError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

pub trait CommandExecutor: Send + Sync {
    fn execute(
        &self,
        program: &str,
        args: &[String],
        cwd: &Path,
    ) -> impl Future<Output = Result<CommandResult, std::io::Error>> + Send;
}

/// Runs git as a child process. The child is killed if the returned future
/// is dropped, which is how timeouts terminate hung fetches and pushes.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessCommandExecutor;

impl CommandExecutor for ProcessCommandExecutor {
    async fn execute(
        &self,
        program: &str,
        args: &[String],
        cwd: &Path,
    ) -> Result<CommandResult, std::io::Error> {
        let output = Command::new(program)
            .args(args)
            .current_dir(cwd)
            // Never block on an interactive credential prompt.
            .env("GIT_TERMINAL_PROMPT", "0")
            .env("LC_ALL", "C")
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await?;
        Ok(CommandResult {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Author identity for commits created by the synchronizer. Passed with
/// `-c` on each invocation so no repository or global config is touched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitIdentity {
    pub name: String,
    pub email: String,
}

impl GitIdentity {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self { name: name.into(), email: email.into() }
    }

    fn config_args(&self) -> Vec<String> {
        vec![
            "-c".to_string(),
            format!("user.name={}", self.name),
            "-c".to_string(),
            format!("user.email={}", self.email),
            "-c".to_string(),
            "commit.gpgsign=false".to_string(),
        ]
    }
}

#[derive(Debug, Clone)]
pub struct GitWorker<E = ProcessCommandExecutor> {
    repo_path: PathBuf,
    executor: E,
    local_timeout: Duration,
    redactor: Redactor,
}

impl GitWorker<ProcessCommandExecutor> {
    pub fn new(repo_path: impl Into<PathBuf>) -> Self {
        Self::with_executor(repo_path, ProcessCommandExecutor)
    }
}

impl<E: CommandExecutor> GitWorker<E> {
    pub fn with_executor(repo_path: impl Into<PathBuf>, executor: E) -> Self {
        Self {
            repo_path: repo_path.into(),
            executor,
            local_timeout: DEFAULT_LOCAL_TIMEOUT,
            redactor: Redactor::new(),
        }
    }

    pub fn with_local_timeout(mut self, timeout: Duration) -> Self {
        self.local_timeout = timeout;
        self
    }

    /// Secrets scrubbed from every command string and stderr this worker reports.
    pub fn with_redactor(mut self, redactor: Redactor) -> Self {
        self.redactor = redactor;
        self
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    pub async fn is_work_tree(&self) -> Result<bool, GitWorkerError> {
        let result = self.run_unchecked(args(&["rev-parse", "--is-inside-work-tree"])).await?;
        Ok(result.success && result.stdout.trim() == "true")
    }

    pub async fn is_shallow(&self) -> Result<bool, GitWorkerError> {
        let output = self.run(args(&["rev-parse", "--is-shallow-repository"])).await?;
        Ok(output.stdout.trim() == "true")
    }

    pub async fn git_dir(&self) -> Result<PathBuf, GitWorkerError> {
        let output = self.run(args(&["rev-parse", "--absolute-git-dir"])).await?;
        Ok(PathBuf::from(output.stdout.trim()))
    }

    /// Short name of the checked-out branch, `None` when HEAD is detached.
    pub async fn current_branch(&self) -> Result<Option<String>, GitWorkerError> {
        let arguments = args(&["symbolic-ref", "--quiet", "--short", "HEAD"]);
        let result = self.run_unchecked(arguments.clone()).await?;
        match (result.success, result.code) {
            (true, _) => Ok(Some(result.stdout.trim().to_string())),
            (false, Some(1)) => Ok(None),
            _ => Err(self.failure(&arguments, result)),
        }
    }

    /// Resolve `rev` to a commit id, `None` when it does not exist.
    pub async fn resolve_commit(&self, rev: &str) -> Result<Option<String>, GitWorkerError> {
        let arguments = vec![
            "rev-parse".to_string(),
            "--verify".to_string(),
            "--quiet".to_string(),
            format!("{rev}^{{commit}}"),
        ];
        let result = self.run_unchecked(arguments.clone()).await?;
        match (result.success, result.code) {
            (true, _) => Ok(Some(result.stdout.trim().to_string())),
            (false, Some(1)) => Ok(None),
            _ => Err(self.failure(&arguments, result)),
        }
    }

    pub async fn head(&self) -> Result<String, GitWorkerError> {
        let output = self.run(args(&["rev-parse", "HEAD"])).await?;
        Ok(output.stdout.trim().to_string())
    }

    pub async fn checkout(&self, branch: &str) -> Result<GitCommandOutput, GitWorkerError> {
        self.run(vec!["checkout".to_string(), branch.to_string(), "--".to_string()]).await
    }

    /// Configured URL of remote `name`, `None` when no such remote exists.
    pub async fn remote_url(&self, name: &str) -> Result<Option<String>, GitWorkerError> {
        let arguments = vec!["remote".to_string(), "get-url".to_string(), name.to_string()];
        let result = self.run_unchecked(arguments.clone()).await?;
        if result.success {
            return Ok(Some(result.stdout.trim().to_string()));
        }
        if result.code == Some(2) || result.stderr.contains("No such remote") {
            return Ok(None);
        }
        Err(self.failure(&arguments, result))
    }

    pub async fn add_remote(&self, name: &str, url: &str) -> Result<GitCommandOutput, GitWorkerError> {
        self.run(vec!["remote".to_string(), "add".to_string(), name.to_string(), url.to_string()])
            .await
    }

    pub async fn set_remote_url(
        &self,
        name: &str,
        url: &str,
    ) -> Result<GitCommandOutput, GitWorkerError> {
        self.run(vec![
            "remote".to_string(),
            "set-url".to_string(),
            name.to_string(),
            url.to_string(),
        ])
        .await
    }

    pub async fn fetch(
        &self,
        url: &str,
        refspec: &str,
        timeout: Duration,
    ) -> Result<GitCommandOutput, GitWorkerError> {
        self.run_with_timeout(
            vec![
                "fetch".to_string(),
                "--prune".to_string(),
                "--no-tags".to_string(),
                url.to_string(),
                refspec.to_string(),
            ],
            timeout,
        )
        .await
    }

    pub async fn is_ancestor(
        &self,
        ancestor: &str,
        descendant: &str,
    ) -> Result<bool, GitWorkerError> {
        let arguments = vec![
            "merge-base".to_string(),
            "--is-ancestor".to_string(),
            ancestor.to_string(),
            descendant.to_string(),
        ];
        let result = self.run_unchecked(arguments.clone()).await?;
        match result.code {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            _ => Err(self.failure(&arguments, result)),
        }
    }

    /// Merge `rev` into the checked-out branch, allowing unrelated histories.
    pub async fn merge(
        &self,
        rev: &str,
        identity: &GitIdentity,
        message: &str,
    ) -> Result<GitCommandOutput, GitWorkerError> {
        let mut arguments = identity.config_args();
        arguments.extend([
            "merge".to_string(),
            "--no-edit".to_string(),
            "--allow-unrelated-histories".to_string(),
            "-m".to_string(),
            message.to_string(),
            rev.to_string(),
        ]);
        self.run(arguments).await
    }

    pub async fn merge_in_progress(&self) -> Result<bool, GitWorkerError> {
        Ok(self.resolve_commit("MERGE_HEAD").await?.is_some())
    }

    /// Paths left unmerged by a failed merge, sorted.
    pub async fn unmerged_paths(&self) -> Result<Vec<String>, GitWorkerError> {
        let output = self
            .run(args(&[
                "-c",
                "core.quotepath=off",
                "diff",
                "--name-only",
                "-z",
                "--diff-filter=U",
            ]))
            .await?;
        let mut paths: Vec<String> = output
            .stdout
            .split('\0')
            .map(str::trim)
            .filter(|path| !path.is_empty())
            .map(str::to_string)
            .collect();
        paths.sort();
        paths.dedup();
        Ok(paths)
    }

    pub async fn merge_abort(&self) -> Result<GitCommandOutput, GitWorkerError> {
        self.run(args(&["merge", "--abort"])).await
    }

    pub async fn push(
        &self,
        url: &str,
        refspec: &str,
        timeout: Duration,
    ) -> Result<GitCommandOutput, GitWorkerError> {
        self.run_with_timeout(vec!["push".to_string(), url.to_string(), refspec.to_string()], timeout)
            .await
    }

    pub async fn update_ref(
        &self,
        reference: &str,
        sha: &str,
    ) -> Result<GitCommandOutput, GitWorkerError> {
        self.run(vec!["update-ref".to_string(), reference.to_string(), sha.to_string()]).await
    }

    async fn run(&self, args: Vec<String>) -> Result<GitCommandOutput, GitWorkerError> {
        self.run_with_timeout(args, self.local_timeout).await
    }

    async fn run_with_timeout(
        &self,
        args: Vec<String>,
        timeout: Duration,
    ) -> Result<GitCommandOutput, GitWorkerError> {
        let result = self.execute(&args, timeout).await?;
        if result.success {
            return Ok(GitCommandOutput { stdout: result.stdout, stderr: result.stderr });
        }
        Err(self.failure(&args, result))
    }

    /// Run a command whose non-zero exit is an answer rather than an error.
    async fn run_unchecked(&self, args: Vec<String>) -> Result<CommandResult, GitWorkerError> {
        self.execute(&args, self.local_timeout).await
    }

    async fn execute(
        &self,
        args: &[String],
        timeout: Duration,
    ) -> Result<CommandResult, GitWorkerError> {
        let command = self.command_string(args);
        debug!(command = %command, "running git");

        let execution = self.executor.execute("git", args, &self.repo_path);
        match tokio::time::timeout(timeout, execution).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(error)) => Err(GitWorkerError::SpawnFailed {
                command,
                message: self.redactor.redact(&error.to_string()),
            }),
            Err(_) => Err(GitWorkerError::TimedOut { command, after: timeout }),
        }
    }

    fn failure(&self, args: &[String], result: CommandResult) -> GitWorkerError {
        let stderr = if result.stderr.trim().is_empty() { result.stdout } else { result.stderr };
        GitWorkerError::CommandFailed {
            command: self.command_string(args),
            code: result.code,
            stderr: self.redactor.redact(&stderr),
        }
    }

    fn command_string(&self, args: &[String]) -> String {
        self.redactor.redact(&format!("git {}", args.join(" ")))
    }
}

fn args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|part| part.to_string()).collect()
}
