#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::Command;

use mirrorsync_common::types::{RemoteDescriptor, RepositoryHandle};
use tempfile::TempDir;

/// A source working copy and a bare destination repository.
pub struct Fixture {
    pub temp: TempDir,
    pub source: PathBuf,
    pub destination: PathBuf,
}

impl Fixture {
    pub fn new() -> Self {
        let temp = TempDir::new().expect("tempdir should be created");
        let source = temp.path().join("source");
        let destination = temp.path().join("destination.git");

        run_git(temp.path(), &["init", "--bare", "-b", "main", path_str(&destination)]);
        init_repo(temp.path(), &source);

        Self { temp, source, destination }
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    pub fn handle(&self) -> RepositoryHandle {
        RepositoryHandle::new(&self.source, "main").expect("handle should be valid")
    }

    pub fn descriptor(&self) -> RemoteDescriptor {
        RemoteDescriptor::parse("mirror", path_str(&self.destination), "main")
            .expect("descriptor should be valid")
    }

    /// Push commits from a fresh, unrelated repository to the destination.
    pub fn seed_destination(&self, files: &[(&str, &str)]) -> String {
        let seed = self.root().join("seed");
        init_repo(self.root(), &seed);
        for (path, contents) in files {
            write_file(&seed, path, contents);
        }
        let head = commit_all(&seed, "destination history");
        run_git(&seed, &["push", path_str(&self.destination), "main:main"]);
        head
    }

    /// Clone the destination, commit on top, push back.
    pub fn advance_destination(&self, name: &str, path: &str, contents: &str) -> String {
        let clone = self.root().join(name);
        run_git(self.root(), &["clone", "-q", path_str(&self.destination), path_str(&clone)]);
        configure_identity(&clone);
        write_file(&clone, path, contents);
        let head = commit_all(&clone, "concurrent destination change");
        run_git(&clone, &["push", "origin", "main:main"]);
        head
    }

    pub fn destination_head(&self) -> Option<String> {
        let output = Command::new("git")
            .args(["--git-dir", path_str(&self.destination), "rev-parse", "--verify", "--quiet"])
            .arg("refs/heads/main")
            .output()
            .expect("git command should run");
        output
            .status
            .success()
            .then(|| String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    pub fn source_head(&self) -> String {
        run_git_capture(&self.source, &["rev-parse", "HEAD"]).trim().to_string()
    }
}

pub fn init_repo(cwd: &Path, path: &Path) {
    run_git(cwd, &["init", "-q", "-b", "main", path_str(path)]);
    configure_identity(path);
}

pub fn configure_identity(repo: &Path) {
    run_git(repo, &["config", "user.name", "Fixture Author"]);
    run_git(repo, &["config", "user.email", "fixture@example.test"]);
    run_git(repo, &["config", "commit.gpgsign", "false"]);
}

pub fn write_file(repo: &Path, path: &str, contents: &str) {
    let full = repo.join(path);
    if let Some(parent) = full.parent() {
        std::fs::create_dir_all(parent).expect("parent directory should be created");
    }
    std::fs::write(full, contents).expect("file should be written");
}

/// Stage everything and commit; returns the new HEAD.
pub fn commit_all(repo: &Path, message: &str) -> String {
    run_git(repo, &["add", "-A"]);
    run_git(repo, &["commit", "-q", "--allow-empty", "-m", message]);
    run_git_capture(repo, &["rev-parse", "HEAD"]).trim().to_string()
}

pub fn is_ancestor(repo: &Path, ancestor: &str, descendant: &str) -> bool {
    Command::new("git")
        .args(["merge-base", "--is-ancestor", ancestor, descendant])
        .current_dir(repo)
        .status()
        .expect("git command should run")
        .success()
}

pub fn path_str(path: &Path) -> &str {
    path.to_str().expect("utf8 path")
}

pub fn run_git(cwd: &Path, args: &[&str]) {
    let output =
        Command::new("git").args(args).current_dir(cwd).output().expect("git command should run");
    assert!(
        output.status.success(),
        "git {:?} failed:\nstdout: {}\nstderr: {}",
        args,
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
}

pub fn run_git_capture(cwd: &Path, args: &[&str]) -> String {
    let output =
        Command::new("git").args(args).current_dir(cwd).output().expect("git command should run");
    assert!(
        output.status.success(),
        "git {:?} failed:\nstdout: {}\nstderr: {}",
        args,
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout).expect("utf8 output")
}
