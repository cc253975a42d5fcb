//! Git plumbing for reading repository state and landing fixes on a branch.

use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;
use tracing::debug;

use crate::domain::Repository;

#[derive(Debug, Error)]
pub enum GitError {
    #[error("failed to run git: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("git {command} failed: {stderr}")]
    Command { command: String, stderr: String },

    #[error("not a git repository: {0}")]
    NotARepository(PathBuf),
}

pub type Result<T> = std::result::Result<T, GitError>;

/// Run git in `repo_dir` and return trimmed stdout.
fn git<I, S>(repo_dir: &Path, args: I) -> Result<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<std::ffi::OsStr>,
{
    let args: Vec<std::ffi::OsString> = args.into_iter().map(|a| a.as_ref().to_owned()).collect();
    let output = Command::new("git")
        .args(&args)
        .current_dir(repo_dir)
        .output()?;

    if !output.status.success() {
        let command = args
            .iter()
            .take(2)
            .map(|a| a.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ");
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let stderr = if stderr.is_empty() {
            String::from_utf8_lossy(&output.stdout).trim().to_string()
        } else {
            stderr
        };
        return Err(GitError::Command { command, stderr });
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Capture the HEAD commit SHA.
pub fn capture_head_sha(repo_dir: &Path) -> Result<String> {
    let sha = git(repo_dir, ["rev-parse", "HEAD"])?;
    if sha.is_empty() {
        return Err(GitError::Command {
            command: "rev-parse HEAD".to_string(),
            stderr: "empty output".to_string(),
        });
    }
    Ok(sha)
}

/// Check whether a directory is inside a git work tree.
pub fn is_git_repo(dir: &Path) -> bool {
    git(dir, ["rev-parse", "--is-inside-work-tree"])
        .map(|out| out == "true")
        .unwrap_or(false)
}

/// Checked-out branch name, `None` when HEAD is detached.
pub fn current_branch(repo_dir: &Path) -> Result<Option<String>> {
    match git(repo_dir, ["symbolic-ref", "--quiet", "--short", "HEAD"]) {
        Ok(name) => Ok(Some(name)),
        Err(GitError::Command { .. }) => Ok(None),
        Err(err) => Err(err),
    }
}

/// Whether tracked files have no staged or unstaged changes.
///
/// Untracked files do not count; fixes only ever stage files they wrote.
pub fn is_clean(repo_dir: &Path) -> Result<bool> {
    Ok(git(repo_dir, ["status", "--porcelain", "--untracked-files=no"])?.is_empty())
}

/// Read path, HEAD and cleanliness of the repository at `dir`.
pub fn snapshot(dir: &Path) -> Result<Repository> {
    if !dir.is_dir() || !is_git_repo(dir) {
        return Err(GitError::NotARepository(dir.to_path_buf()));
    }
    let path = PathBuf::from(git(dir, ["rev-parse", "--show-toplevel"])?);
    Ok(Repository {
        head: capture_head_sha(&path)?,
        branch: current_branch(&path)?,
        clean: is_clean(&path)?,
        path,
    })
}

pub fn branch_exists(repo_dir: &Path, name: &str) -> bool {
    git(
        repo_dir,
        ["rev-parse", "--verify", "--quiet", &format!("refs/heads/{name}")],
    )
    .is_ok()
}

/// Create `name` at HEAD and check it out. `overwrite` resets an existing
/// branch of that name.
pub fn create_branch(repo_dir: &Path, name: &str, overwrite: bool) -> Result<()> {
    let flag = if overwrite { "-B" } else { "-b" };
    git(repo_dir, ["checkout", "--quiet", flag, name])?;
    debug!(branch = name, "created branch");
    Ok(())
}

/// Force-checkout `reference`, discarding changes to tracked files.
pub fn force_checkout(repo_dir: &Path, reference: &str) -> Result<()> {
    git(repo_dir, ["checkout", "--quiet", "--force", reference])?;
    Ok(())
}

pub fn delete_branch(repo_dir: &Path, name: &str) -> Result<()> {
    git(repo_dir, ["branch", "--quiet", "-D", name])?;
    Ok(())
}

/// Stage exactly `files` (repo-relative).
pub fn stage(repo_dir: &Path, files: &[PathBuf]) -> Result<()> {
    let mut args: Vec<std::ffi::OsString> = vec!["add".into(), "--".into()];
    args.extend(files.iter().map(|f| f.as_os_str().to_owned()));
    git(repo_dir, args)?;
    Ok(())
}

/// Commit the index and return the new HEAD SHA.
pub fn commit(repo_dir: &Path, message: &str) -> Result<String> {
    git(repo_dir, ["commit", "--quiet", "-m", message])?;
    capture_head_sha(repo_dir)
}

/// Fetch URL of `remote`, `None` if it is not configured.
pub fn remote_url(repo_dir: &Path, remote: &str) -> Result<Option<String>> {
    match git(repo_dir, ["remote", "get-url", remote]) {
        Ok(url) => Ok(Some(url)),
        Err(GitError::Command { .. }) => Ok(None),
        Err(err) => Err(err),
    }
}

pub fn push(repo_dir: &Path, remote: &str, branch: &str) -> Result<()> {
    git(repo_dir, ["push", "--quiet", "-u", remote, branch])?;
    Ok(())
}
