//! Rust via `cargo clippy` with an isolated target directory.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use lint_env_manager::{CancelToken, CommandSpec, LanguageEnvironment};
use serde::Deserialize;

use super::provision_step;
use crate::adapter::{relative_path, run_linter, LintTarget, LinterAdapter, RawOutput};
use crate::error::LintError;
use crate::issue::{LintIssue, Severity};
use crate::language::Language;

#[derive(Debug, Default, Clone, Copy)]
pub struct RustAdapter;

#[async_trait]
impl LinterAdapter for RustAdapter {
    fn language(&self) -> Language {
        Language::Rust
    }

    fn supports_relint(&self) -> bool {
        false
    }

    /// Clippy ships with rustup; provisioning only checks it is present.
    /// The environment directory serves as the build's target dir.
    async fn provision(&self, dir: &Path, cancel: &CancelToken) -> anyhow::Result<()> {
        provision_step(
            CommandSpec::new("cargo").args(["clippy", "--version"]).current_dir(dir),
            cancel,
        )
        .await
    }

    async fn run(
        &self,
        env: &LanguageEnvironment,
        target: LintTarget<'_>,
        timeout: Duration,
        cancel: &CancelToken,
    ) -> Result<Vec<RawOutput>, LintError> {
        let clippy = CommandSpec::new("cargo")
            .args(["clippy", "--message-format=json", "--all-targets", "--quiet"])
            .env("CARGO_TARGET_DIR", env.path().join("target"))
            .current_dir(target.root)
            .timeout(timeout);
        // 101 is cargo's exit status when the crate fails to compile; the
        // compiler errors are still in the JSON stream.
        let raw = run_linter(Language::Rust, "clippy", clippy, &[0, 101], cancel).await?;
        Ok(vec![raw])
    }

    fn parse(&self, raw: &RawOutput, root: &Path) -> Vec<LintIssue> {
        parse_clippy_json(&raw.stdout, root)
    }
}

#[derive(Debug, Deserialize)]
struct CargoMessage {
    reason: String,
    message: Option<Diagnostic>,
}

#[derive(Debug, Deserialize)]
struct Diagnostic {
    message: String,
    level: String,
    code: Option<DiagnosticCode>,
    #[serde(default)]
    spans: Vec<Span>,
}

#[derive(Debug, Deserialize)]
struct DiagnosticCode {
    code: String,
}

#[derive(Debug, Deserialize)]
struct Span {
    file_name: String,
    line_start: u32,
    column_start: u32,
    is_primary: bool,
}

fn parse_clippy_json(output: &str, root: &Path) -> Vec<LintIssue> {
    let mut issues = Vec::new();
    for line in output.lines() {
        let Ok(msg) = serde_json::from_str::<CargoMessage>(line) else {
            continue;
        };
        if msg.reason != "compiler-message" {
            continue;
        }
        let Some(diag) = msg.message else { continue };
        let severity = match diag.level.as_str() {
            "error" => Severity::Error,
            "warning" => Severity::Warning,
            "note" | "help" => Severity::Info,
            _ => continue,
        };
        // Summary lines like "aborting due to 2 previous errors" have no span.
        let Some(span) = diag.spans.iter().find(|s| s.is_primary) else {
            continue;
        };
        issues.push(LintIssue {
            file: relative_path(root, &span.file_name),
            line: span.line_start,
            column: span.column_start,
            severity,
            rule: diag
                .code
                .map(|c| c.code)
                .unwrap_or_else(|| "rustc".to_string()),
            message: diag.message,
            source: "clippy".to_string(),
        });
    }
    issues
}
