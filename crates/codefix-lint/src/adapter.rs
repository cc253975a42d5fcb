//! The capability every language adapter implements.

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use lint_env_manager::{run_command, CancelToken, CommandSpec, LanguageEnvironment, Provisioner};
use tracing::debug;

use crate::error::LintError;
use crate::issue::LintIssue;
use crate::language::Language;

/// Captured output of one linter process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawOutput {
    /// Which linter produced this output; adapters with several linters
    /// dispatch on it when parsing.
    pub linter: String,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// What to lint: a directory and files relative to it.
#[derive(Debug, Clone, Copy)]
pub struct LintTarget<'a> {
    pub root: &'a Path,
    pub files: &'a [PathBuf],
}

/// Knows how to install, invoke and parse one language's linters.
#[async_trait]
pub trait LinterAdapter: Send + Sync {
    fn language(&self) -> Language;

    /// Whether the linter can check a single file in a scratch directory.
    /// Package-level linters (go, rust) cannot.
    fn supports_relint(&self) -> bool {
        true
    }

    /// Install the linter toolchain into an empty environment directory.
    async fn provision(&self, dir: &Path, cancel: &CancelToken) -> anyhow::Result<()>;

    /// Run the linters against `target` using the tools in `env`.
    async fn run(
        &self,
        env: &LanguageEnvironment,
        target: LintTarget<'_>,
        timeout: Duration,
        cancel: &CancelToken,
    ) -> Result<Vec<RawOutput>, LintError>;

    /// Map native diagnostics to [`LintIssue`]s with paths relative to `root`.
    ///
    /// Lines that cannot be understood are skipped.
    fn parse(&self, raw: &RawOutput, root: &Path) -> Vec<LintIssue>;
}

/// Lets the environment manager provision through an adapter.
pub struct AdapterProvisioner<'a>(pub &'a dyn LinterAdapter);

#[async_trait]
impl Provisioner for AdapterProvisioner<'_> {
    async fn provision(&self, dir: &Path, cancel: &CancelToken) -> anyhow::Result<()> {
        self.0.provision(dir, cancel).await
    }
}

/// Run one linter process and accept only the listed exit codes.
///
/// Most linters exit 1 when they find issues; anything outside `ok_codes`
/// is an execution failure.
pub async fn run_linter(
    language: Language,
    linter: &str,
    spec: CommandSpec,
    ok_codes: &[i32],
    cancel: &CancelToken,
) -> Result<RawOutput, LintError> {
    let output = run_command(&spec, cancel)
        .await
        .map_err(|e| LintError::from_exec(language.as_str(), linter, e))?;

    debug!(
        language = %language,
        linter,
        exit_code = output.exit_code,
        duration_ms = output.duration_ms,
        "linter finished"
    );

    if !ok_codes.contains(&output.exit_code) {
        let detail = output
            .stderr
            .lines()
            .find(|l| !l.trim().is_empty())
            .unwrap_or("no output")
            .trim()
            .to_string();
        return Err(LintError::LinterExecution {
            language: language.as_str().to_string(),
            linter: linter.to_string(),
            reason: format!("unexpected exit status {}: {}", output.exit_code, detail),
        });
    }

    Ok(RawOutput {
        linter: linter.to_string(),
        exit_code: output.exit_code,
        stdout: output.stdout,
        stderr: output.stderr,
    })
}

/// Normalize a path reported by a linter to one relative to `root`.
pub fn relative_path(root: &Path, reported: &str) -> PathBuf {
    let path = Path::new(reported.trim());
    if path.is_absolute() {
        if let Ok(rel) = path.strip_prefix(root) {
            return clean(rel);
        }
        if let Ok(canonical) = std::fs::canonicalize(root) {
            if let Ok(rel) = path.strip_prefix(&canonical) {
                return clean(rel);
            }
        }
        return path.to_path_buf();
    }
    clean(path)
}

fn clean(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}
