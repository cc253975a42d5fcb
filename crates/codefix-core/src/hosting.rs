//! Pushing the fix branch and opening a pull/merge request.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use lint_env_manager::{run_command, CancelToken, CommandSpec};
use regex::Regex;
use thiserror::Error;
use tracing::info;

use crate::git;

/// Upper bound for `gh`/`glab` calls.
const HOST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Error)]
pub enum HostError {
    #[error("push failed: {0}")]
    Push(String),

    #[error("remote '{0}' is not configured")]
    NoRemote(String),

    #[error("no pull request tool for remote {0}")]
    UnsupportedHost(String),

    #[error("{tool} failed: {detail}")]
    Tool { tool: String, detail: String },
}

/// Hosting service behind a remote URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostKind {
    GitHub,
    GitLab,
    Unknown,
}

pub fn detect_host(remote_url: &str) -> HostKind {
    let url = remote_url.to_ascii_lowercase();
    if url.contains("github.com") {
        HostKind::GitHub
    } else if url.contains("gitlab") {
        HostKind::GitLab
    } else {
        HostKind::Unknown
    }
}

/// Remote side of the workflow. Failures here never undo the local commit.
#[async_trait]
pub trait VcsHost: Send + Sync {
    async fn push(&self, branch: &str, cancel: &CancelToken) -> Result<(), HostError>;

    /// Open a request for `branch` and return its URL.
    async fn open_request(
        &self,
        branch: &str,
        title: &str,
        body: &str,
        cancel: &CancelToken,
    ) -> Result<String, HostError>;
}

/// `git push` plus `gh`/`glab`, chosen from the remote URL.
#[derive(Debug, Clone)]
pub struct CliHost {
    repo: PathBuf,
    remote: String,
}

impl CliHost {
    pub fn new(repo: impl Into<PathBuf>, remote: impl Into<String>) -> Self {
        Self {
            repo: repo.into(),
            remote: remote.into(),
        }
    }

    pub fn repo(&self) -> &Path {
        &self.repo
    }

    fn remote_url(&self) -> Result<String, HostError> {
        git::remote_url(&self.repo, &self.remote)
            .map_err(|e| HostError::Push(e.to_string()))?
            .ok_or_else(|| HostError::NoRemote(self.remote.clone()))
    }
}

#[async_trait]
impl VcsHost for CliHost {
    async fn push(&self, branch: &str, _cancel: &CancelToken) -> Result<(), HostError> {
        self.remote_url()?;
        git::push(&self.repo, &self.remote, branch).map_err(|e| HostError::Push(e.to_string()))?;
        info!(remote = %self.remote, branch, "pushed branch");
        Ok(())
    }

    async fn open_request(
        &self,
        branch: &str,
        title: &str,
        body: &str,
        cancel: &CancelToken,
    ) -> Result<String, HostError> {
        let url = self.remote_url()?;
        let (tool, spec) = match detect_host(&url) {
            HostKind::GitHub => (
                "gh",
                CommandSpec::new("gh")
                    .args(["pr", "create", "--head", branch, "--title", title, "--body", body]),
            ),
            HostKind::GitLab => (
                "glab",
                CommandSpec::new("glab").args([
                    "mr",
                    "create",
                    "--yes",
                    "--source-branch",
                    branch,
                    "--title",
                    title,
                    "--description",
                    body,
                ]),
            ),
            HostKind::Unknown => return Err(HostError::UnsupportedHost(url)),
        };

        let spec = spec.current_dir(&self.repo).timeout(HOST_TIMEOUT);
        let output = run_command(&spec, cancel).await.map_err(|e| HostError::Tool {
            tool: tool.to_string(),
            detail: e.to_string(),
        })?;
        if !output.success() {
            return Err(HostError::Tool {
                tool: tool.to_string(),
                detail: output.stderr.trim().to_string(),
            });
        }
        extract_url(&output.stdout).ok_or_else(|| HostError::Tool {
            tool: tool.to_string(),
            detail: "request created but no URL in output".to_string(),
        })
    }
}

/// Last http(s) URL printed by a hosting CLI.
pub fn extract_url(output: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"https?://\S+").expect("valid regex"));
    re.find_iter(output).last().map(|m| m.as_str().to_string())
}
