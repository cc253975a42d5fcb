//! Runs an adapter inside its environment and normalizes what comes back.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use lint_env_manager::{CancelToken, LanguageEnvironment};
use tracing::{debug, info};

use crate::adapter::{LintTarget, LinterAdapter};
use crate::error::LintError;
use crate::issue::{normalize_issues, LintIssue};

/// Adapter-agnostic lint driver.
#[derive(Debug, Clone)]
pub struct LintOrchestrator {
    timeout: Duration,
}

impl Default for LintOrchestrator {
    fn default() -> Self {
        Self::new(Duration::from_secs(300))
    }
}

impl LintOrchestrator {
    /// `timeout` bounds every individual linter process.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Lint `files` (relative to `root`) with `adapter` in `env`.
    ///
    /// Every requested file appears in the result, with an empty list when
    /// clean. Issues for files that were not requested are dropped, since
    /// package-level linters report on the whole tree.
    pub async fn lint(
        &self,
        adapter: &dyn LinterAdapter,
        env: &LanguageEnvironment,
        root: &Path,
        files: &[PathBuf],
        cancel: &CancelToken,
    ) -> Result<BTreeMap<PathBuf, Vec<LintIssue>>, LintError> {
        let mut by_file: BTreeMap<PathBuf, Vec<LintIssue>> =
            files.iter().map(|f| (f.clone(), Vec::new())).collect();
        if files.is_empty() {
            return Ok(by_file);
        }

        let start = Instant::now();
        let issues = self.collect(adapter, env, root, files, cancel).await?;
        let total = issues.len();
        for issue in issues {
            if let Some(list) = by_file.get_mut(&issue.file) {
                list.push(issue);
            }
        }

        info!(
            language = %adapter.language(),
            files = files.len(),
            issues = total,
            duration_ms = start.elapsed().as_millis() as u64,
            "lint complete"
        );
        Ok(by_file)
    }

    /// Re-lint a candidate body for `file` without touching the repository.
    ///
    /// The candidate is written to a scratch directory inside the already
    /// provisioned environment, at the same relative path, and linted there.
    /// Returns `None` when the adapter cannot lint a single file.
    pub async fn relint(
        &self,
        adapter: &dyn LinterAdapter,
        env: &LanguageEnvironment,
        file: &Path,
        content: &str,
        cancel: &CancelToken,
    ) -> Result<Option<Vec<LintIssue>>, LintError> {
        if !adapter.supports_relint() {
            return Ok(None);
        }

        let scratch = tempfile::Builder::new()
            .prefix("relint-")
            .tempdir_in(env.path())?;
        let target = scratch.path().join(file);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, content).await?;

        let files = [file.to_path_buf()];
        let issues = self
            .collect(adapter, env, scratch.path(), &files, cancel)
            .await?
            .into_iter()
            .filter(|i| i.file == file)
            .collect::<Vec<_>>();

        debug!(file = %file.display(), issues = issues.len(), "relint complete");
        Ok(Some(issues))
    }

    async fn collect(
        &self,
        adapter: &dyn LinterAdapter,
        env: &LanguageEnvironment,
        root: &Path,
        files: &[PathBuf],
        cancel: &CancelToken,
    ) -> Result<Vec<LintIssue>, LintError> {
        let target = LintTarget { root, files };
        let outputs = adapter.run(env, target, self.timeout, cancel).await?;

        let requested: BTreeSet<&PathBuf> = files.iter().collect();
        let issues = outputs
            .iter()
            .flat_map(|raw| adapter.parse(raw, root))
            .filter(|issue| requested.contains(&issue.file))
            .collect();
        Ok(normalize_issues(issues))
    }
}
