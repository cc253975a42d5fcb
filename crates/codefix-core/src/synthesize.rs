//! Fix synthesis and validation.
//!
//! [`FixSynthesizer::synthesize`] turns one file's issues into a
//! [`FixCandidate`]. Every failure is recorded on the candidate as a
//! rejection; nothing here is fatal to the run.
//!
//! Gates, in order: model call (one retry on transient errors), code
//! extraction, size bound, no-op check, optional re-lint regression check.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use codefix_lint::{
    count_at_or_above, LintError, LintIssue, LintOrchestrator, LinterAdapter, Severity,
};
use lint_env_manager::{CancelToken, LanguageEnvironment};
use tracing::{debug, warn};

use crate::config::CodefixConfig;
use crate::diff::unified_diff;
use crate::domain::{FixCandidate, RejectReason};
use crate::extract::extract_code;
use crate::model::{ModelError, ModelRunner};

/// Lints a candidate body without touching the repository.
#[async_trait]
pub trait Relinter: Send + Sync {
    /// `Ok(None)` when this language cannot re-lint a single file.
    async fn relint(
        &self,
        file: &Path,
        content: &str,
        cancel: &CancelToken,
    ) -> Result<Option<Vec<LintIssue>>, LintError>;
}

/// Re-lints through a language adapter inside its held environment.
#[derive(Clone)]
pub struct AdapterRelinter {
    orchestrator: LintOrchestrator,
    adapter: Arc<dyn LinterAdapter>,
    env: LanguageEnvironment,
}

impl AdapterRelinter {
    pub fn new(
        orchestrator: LintOrchestrator,
        adapter: Arc<dyn LinterAdapter>,
        env: LanguageEnvironment,
    ) -> Self {
        Self {
            orchestrator,
            adapter,
            env,
        }
    }
}

#[async_trait]
impl Relinter for AdapterRelinter {
    async fn relint(
        &self,
        file: &Path,
        content: &str,
        cancel: &CancelToken,
    ) -> Result<Option<Vec<LintIssue>>, LintError> {
        self.orchestrator
            .relint(self.adapter.as_ref(), &self.env, file, content, cancel)
            .await
    }
}

/// Tunables for synthesis and validation.
#[derive(Debug, Clone)]
pub struct SynthesisConfig {
    pub model_timeout: Duration,
    /// Wait before the single retry of a transient model error.
    pub retry_backoff: Duration,
    pub max_line_delta_ratio: f64,
    pub min_line_slack: usize,
    pub relint: bool,
    pub max_context_bytes: usize,
    pub max_prompt_issues: usize,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self::from(&CodefixConfig::default())
    }
}

impl From<&CodefixConfig> for SynthesisConfig {
    fn from(config: &CodefixConfig) -> Self {
        Self {
            model_timeout: config.model_timeout(),
            retry_backoff: Duration::from_millis(500),
            max_line_delta_ratio: config.fix.max_line_delta_ratio,
            min_line_slack: config.fix.min_line_slack,
            relint: config.fix.relint,
            max_context_bytes: config.fix.max_context_bytes,
            max_prompt_issues: config.fix.max_prompt_issues,
        }
    }
}

/// Render the model prompt for `file`.
pub fn build_prompt(file: &Path, original: &str, issues: &[LintIssue], max_issues: usize) -> String {
    let mut listed: Vec<String> = issues
        .iter()
        .take(max_issues)
        .map(|i| {
            format!(
                "Line {}, Column {}: {} - {}",
                i.line, i.column, i.rule, i.message
            )
        })
        .collect();
    if issues.len() > max_issues {
        listed.push(format!("... and {} more", issues.len() - max_issues));
    }

    format!(
        "You are a programming assistant. Below is a source file and its lint issues.\n\n\
         FILE: {file}\n\n\
         SOURCE CODE:\n{code}\n\n\
         LINT ISSUES:\n{issues}\n\n\
         Return the complete corrected file with every lint issue fixed. Keep all other code \
         unchanged. Return only the corrected code without any explanations or markdown \
         formatting.\n\n\
         CORRECTED CODE:\n",
        file = file.display(),
        code = original.trim_end_matches('\n'),
        issues = listed.join("\n"),
    )
}

/// Drives the model and validates what it returns.
pub struct FixSynthesizer {
    runner: Arc<dyn ModelRunner>,
    config: SynthesisConfig,
}

impl FixSynthesizer {
    pub fn new(runner: Arc<dyn ModelRunner>, config: SynthesisConfig) -> Self {
        Self { runner, config }
    }

    pub fn config(&self) -> &SynthesisConfig {
        &self.config
    }

    /// Produce a validated candidate for `file`.
    ///
    /// `issues` must be the complete issue list for the file, as the
    /// regression gate compares against it.
    pub async fn synthesize(
        &self,
        file: &Path,
        original: &str,
        issues: Vec<LintIssue>,
        relinter: Option<&dyn Relinter>,
        cancel: &CancelToken,
    ) -> FixCandidate {
        let reject = |issues: Vec<LintIssue>, proposed: Option<String>, reason: RejectReason| {
            debug!(file = %file.display(), reason = %reason, "candidate rejected");
            FixCandidate::rejected(
                file.to_path_buf(),
                original.to_string(),
                issues,
                proposed,
                reason,
            )
        };

        if cancel.is_cancelled() {
            return reject(issues, None, RejectReason::Cancelled);
        }
        if original.len() > self.config.max_context_bytes {
            let detail = format!(
                "file is {} bytes, prompt limit is {}",
                original.len(),
                self.config.max_context_bytes
            );
            return reject(issues, None, RejectReason::SizeAnomaly(detail));
        }

        let prompt = build_prompt(file, original, &issues, self.config.max_prompt_issues);
        let raw = match self.call_model(file, &prompt, cancel).await {
            Ok(raw) => raw,
            Err(ModelError::Cancelled) => return reject(issues, None, RejectReason::Cancelled),
            Err(err) => {
                return reject(issues, None, RejectReason::ModelUnavailable(err.to_string()))
            }
        };

        let proposed = match extract_code(&raw) {
            Ok(code) => match_line_endings(original, code),
            Err(err) => return reject(issues, None, RejectReason::UnparsableOutput(err.to_string())),
        };

        if let Some(detail) = self.size_anomaly(original, &proposed) {
            return reject(issues, Some(proposed), RejectReason::SizeAnomaly(detail));
        }
        if proposed == original {
            return reject(issues, Some(proposed), RejectReason::NoChange);
        }

        if self.config.relint {
            if let Some(relinter) = relinter {
                match relinter.relint(file, &proposed, cancel).await {
                    Ok(Some(after)) => {
                        if let Some(detail) = regression(&issues, &after) {
                            return reject(
                                issues,
                                Some(proposed),
                                RejectReason::RegressedIssues(detail),
                            );
                        }
                    }
                    Ok(None) => {
                        debug!(file = %file.display(), "re-lint not supported, gate skipped");
                    }
                    Err(LintError::Cancelled) => {
                        return reject(issues, Some(proposed), RejectReason::Cancelled)
                    }
                    Err(err) => {
                        warn!(file = %file.display(), error = %err, "re-lint failed, gate skipped");
                    }
                }
            }
        }

        let diff = unified_diff(file, original, &proposed);
        FixCandidate::accepted(
            PathBuf::from(file),
            original.to_string(),
            issues,
            proposed,
            diff,
        )
    }

    async fn call_model(
        &self,
        file: &Path,
        prompt: &str,
        cancel: &CancelToken,
    ) -> Result<String, ModelError> {
        let timeout = self.config.model_timeout;
        match self.runner.generate(prompt, timeout, cancel).await {
            Err(err) if err.is_transient() => {
                warn!(
                    file = %file.display(),
                    runner = self.runner.name(),
                    error = %err,
                    "model call failed, retrying once"
                );
                tokio::select! {
                    _ = tokio::time::sleep(self.config.retry_backoff) => {}
                    _ = cancel.cancelled() => return Err(ModelError::Cancelled),
                }
                self.runner.generate(prompt, timeout, cancel).await
            }
            other => other,
        }
    }

    fn size_anomaly(&self, original: &str, proposed: &str) -> Option<String> {
        if proposed.trim().is_empty() {
            return Some("candidate is empty".to_string());
        }
        let before = original.lines().count();
        let after = proposed.lines().count();
        let allowed = ((before as f64) * self.config.max_line_delta_ratio).ceil() as usize;
        let allowed = allowed.max(self.config.min_line_slack);
        if before.abs_diff(after) > allowed {
            return Some(format!(
                "{after} lines vs {before} original (allowed delta {allowed})"
            ));
        }
        None
    }
}

/// Restore the original's line terminator style on an extracted body.
fn match_line_endings(original: &str, code: String) -> String {
    let crlf = original.contains("\r\n");
    let mut body = if crlf { code.replace('\n', "\r\n") } else { code };
    if original.ends_with('\n') {
        body.push_str(if crlf { "\r\n" } else { "\n" });
    }
    body
}

/// Describe the first severity threshold at which `after` is worse.
fn regression(before: &[LintIssue], after: &[LintIssue]) -> Option<String> {
    Severity::ALL.iter().rev().find_map(|&severity| {
        let old = count_at_or_above(before, severity);
        let new = count_at_or_above(after, severity);
        (new > old).then(|| {
            format!(
                "{new} issues at {} or above after fix, {old} before",
                severity.as_str()
            )
        })
    })
}
