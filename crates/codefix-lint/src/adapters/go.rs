//! Go via golangci-lint, installed into the environment's own GOBIN.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use lint_env_manager::{CancelToken, CommandSpec, LanguageEnvironment};
use serde::Deserialize;
use tracing::debug;

use super::provision_step;
use crate::adapter::{relative_path, run_linter, LintTarget, LinterAdapter, RawOutput};
use crate::error::LintError;
use crate::issue::{LintIssue, Severity};
use crate::language::Language;

const GOLANGCI_MODULE: &str = "github.com/golangci/golangci-lint/cmd/golangci-lint@v1.59.1";

#[derive(Debug, Default, Clone, Copy)]
pub struct GoAdapter;

#[async_trait]
impl LinterAdapter for GoAdapter {
    fn language(&self) -> Language {
        Language::Go
    }

    fn supports_relint(&self) -> bool {
        false
    }

    async fn provision(&self, dir: &Path, cancel: &CancelToken) -> anyhow::Result<()> {
        provision_step(
            CommandSpec::new("go")
                .args(["install", GOLANGCI_MODULE])
                .env("GOBIN", dir.join("bin"))
                .current_dir(dir),
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
        // golangci-lint analyses packages; results are filtered to the
        // requested files afterwards.
        let lint = CommandSpec::new(env.path().join("bin").join("golangci-lint"))
            .args(["run", "--out-format", "json", "--issues-exit-code", "1", "./..."])
            .env("GOLANGCI_LINT_CACHE", env.path().join("cache"))
            .current_dir(target.root)
            .timeout(timeout);
        let raw = run_linter(Language::Go, "golangci-lint", lint, &[0, 1], cancel).await?;
        Ok(vec![raw])
    }

    fn parse(&self, raw: &RawOutput, root: &Path) -> Vec<LintIssue> {
        parse_golangci_json(&raw.stdout, root)
    }
}

#[derive(Debug, Deserialize)]
struct Report {
    #[serde(rename = "Issues", default)]
    issues: Option<Vec<Issue>>,
}

#[derive(Debug, Deserialize)]
struct Issue {
    #[serde(rename = "FromLinter")]
    from_linter: String,
    #[serde(rename = "Text")]
    text: String,
    #[serde(rename = "Severity", default)]
    severity: String,
    #[serde(rename = "Pos")]
    pos: Position,
}

#[derive(Debug, Deserialize)]
struct Position {
    #[serde(rename = "Filename")]
    filename: String,
    #[serde(rename = "Line")]
    line: u32,
    #[serde(rename = "Column", default)]
    column: u32,
}

fn parse_golangci_json(output: &str, root: &Path) -> Vec<LintIssue> {
    // The JSON report is the first line; progress text may follow.
    let Some(line) = output.lines().find(|l| l.trim_start().starts_with('{')) else {
        return Vec::new();
    };
    let report: Report = match serde_json::from_str(line) {
        Ok(r) => r,
        Err(e) => {
            debug!(linter = "golangci-lint", error = %e, "unparseable report");
            return Vec::new();
        }
    };

    report
        .issues
        .unwrap_or_default()
        .into_iter()
        .map(|issue| LintIssue {
            file: relative_path(root, &issue.pos.filename),
            line: issue.pos.line,
            column: issue.pos.column.max(1),
            severity: match issue.severity.to_ascii_lowercase().as_str() {
                "error" => Severity::Error,
                "info" => Severity::Info,
                _ => Severity::Warning,
            },
            rule: issue.from_linter,
            message: issue.text,
            source: "golangci-lint".to_string(),
        })
        .collect()
}
