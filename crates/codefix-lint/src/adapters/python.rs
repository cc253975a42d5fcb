//! Python: flake8 for style and correctness, mypy for types.

use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use lint_env_manager::{CancelToken, CommandSpec, LanguageEnvironment};
use regex::Regex;
use tracing::debug;

use super::{file_args, provision_venv, venv_bin};
use crate::adapter::{relative_path, run_linter, LintTarget, LinterAdapter, RawOutput};
use crate::error::LintError;
use crate::issue::{LintIssue, Severity};
use crate::language::Language;

const FLAKE8_CONFIG: &str = "[flake8]
max-line-length = 88
extend-ignore = E203, W503, E501
exclude = .git,__pycache__,build,dist,.venv,venv,node_modules
per-file-ignores =
    __init__.py:F401
";

#[derive(Debug, Default, Clone, Copy)]
pub struct PythonAdapter;

#[async_trait]
impl LinterAdapter for PythonAdapter {
    fn language(&self) -> Language {
        Language::Python
    }

    async fn provision(&self, dir: &Path, cancel: &CancelToken) -> anyhow::Result<()> {
        provision_venv(dir, &["flake8", "mypy"], cancel).await?;
        tokio::fs::write(dir.join(".flake8"), FLAKE8_CONFIG).await?;
        Ok(())
    }

    async fn run(
        &self,
        env: &LanguageEnvironment,
        target: LintTarget<'_>,
        timeout: Duration,
        cancel: &CancelToken,
    ) -> Result<Vec<RawOutput>, LintError> {
        let flake8 = CommandSpec::new(venv_bin(env.path(), "flake8"))
            .arg("--config")
            .arg(env.path().join(".flake8"))
            .args(file_args(target.files))
            .current_dir(target.root)
            .timeout(timeout);
        let flake8 = run_linter(Language::Python, "flake8", flake8, &[0, 1], cancel).await?;

        let mypy = CommandSpec::new(venv_bin(env.path(), "mypy"))
            .args([
                "--no-error-summary",
                "--no-pretty",
                "--show-column-numbers",
                "--show-error-codes",
                "--ignore-missing-imports",
                "--cache-dir",
            ])
            .arg(env.path().join(".mypy_cache"))
            .args(file_args(target.files))
            .current_dir(target.root)
            .timeout(timeout);
        let mypy = run_linter(Language::Python, "mypy", mypy, &[0, 1], cancel).await?;

        Ok(vec![flake8, mypy])
    }

    fn parse(&self, raw: &RawOutput, root: &Path) -> Vec<LintIssue> {
        match raw.linter.as_str() {
            "flake8" => parse_flake8(&raw.stdout, root),
            "mypy" => parse_mypy(&raw.stdout, root),
            other => {
                debug!(linter = other, "no parser for linter output");
                Vec::new()
            }
        }
    }
}

fn flake8_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?P<file>.+?):(?P<line>\d+):(?P<col>\d+):\s*(?P<code>[A-Z]+\d+)\s+(?P<msg>.+)$")
            .expect("valid regex")
    })
}

fn mypy_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(?P<file>.+?):(?P<line>\d+):(?:(?P<col>\d+):)?\s*(?P<level>error|warning|note):\s*(?P<msg>.+?)(?:\s+\[(?P<code>[\w-]+)\])?$",
        )
        .expect("valid regex")
    })
}

/// flake8 codes: E/F are errors, W/C warnings, anything else informational.
fn flake8_severity(code: &str) -> Severity {
    match code.chars().next() {
        Some('E') | Some('F') => Severity::Error,
        Some('W') | Some('C') => Severity::Warning,
        _ => Severity::Info,
    }
}

/// Parse flake8's default `path:line:col: CODE message` output.
pub fn parse_flake8(output: &str, root: &Path) -> Vec<LintIssue> {
    let mut issues = Vec::new();
    for line in output.lines().filter(|l| !l.trim().is_empty()) {
        let Some(caps) = flake8_pattern().captures(line.trim_end()) else {
            debug!(linter = "flake8", line, "skipping unparseable line");
            continue;
        };
        let (Ok(line_no), Ok(col)) = (caps["line"].parse::<u32>(), caps["col"].parse::<u32>()) else {
            debug!(linter = "flake8", line, "skipping line with bad position");
            continue;
        };
        let code = &caps["code"];
        issues.push(LintIssue {
            file: relative_path(root, &caps["file"]),
            line: line_no,
            column: col,
            severity: flake8_severity(code),
            rule: code.to_string(),
            message: caps["msg"].trim().to_string(),
            source: "flake8".to_string(),
        });
    }
    issues
}

/// Parse mypy's `path:line[:col]: error: message [code]` output. Notes are
/// attached context for an earlier error and are dropped.
pub fn parse_mypy(output: &str, root: &Path) -> Vec<LintIssue> {
    let mut issues = Vec::new();
    for line in output.lines().filter(|l| !l.trim().is_empty()) {
        let Some(caps) = mypy_pattern().captures(line.trim_end()) else {
            debug!(linter = "mypy", line, "skipping unparseable line");
            continue;
        };
        let severity = match &caps["level"] {
            "error" => Severity::Error,
            "warning" => Severity::Warning,
            _ => continue,
        };
        let Ok(line_no) = caps["line"].parse::<u32>() else {
            continue;
        };
        let column = caps
            .name("col")
            .and_then(|c| c.as_str().parse().ok())
            .unwrap_or(1);
        issues.push(LintIssue {
            file: relative_path(root, &caps["file"]),
            line: line_no,
            column,
            severity,
            rule: caps
                .name("code")
                .map(|c| c.as_str().to_string())
                .unwrap_or_else(|| "mypy".to_string()),
            message: caps["msg"].trim().to_string(),
            source: "mypy".to_string(),
        });
    }
    issues
}
