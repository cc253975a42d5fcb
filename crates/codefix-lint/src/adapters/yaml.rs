//! YAML via yamllint's parsable format.

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

const YAMLLINT_CONFIG: &str = "extends: default
rules:
  line-length:
    max: 120
    level: warning
  document-start: disable
  truthy:
    check-keys: false
";

#[derive(Debug, Default, Clone, Copy)]
pub struct YamlAdapter;

#[async_trait]
impl LinterAdapter for YamlAdapter {
    fn language(&self) -> Language {
        Language::Yaml
    }

    async fn provision(&self, dir: &Path, cancel: &CancelToken) -> anyhow::Result<()> {
        provision_venv(dir, &["yamllint"], cancel).await?;
        tokio::fs::write(dir.join(".yamllint"), YAMLLINT_CONFIG).await?;
        Ok(())
    }

    async fn run(
        &self,
        env: &LanguageEnvironment,
        target: LintTarget<'_>,
        timeout: Duration,
        cancel: &CancelToken,
    ) -> Result<Vec<RawOutput>, LintError> {
        let yamllint = CommandSpec::new(venv_bin(env.path(), "yamllint"))
            .arg("-c")
            .arg(env.path().join(".yamllint"))
            .args(["-f", "parsable"])
            .args(file_args(target.files))
            .current_dir(target.root)
            .timeout(timeout);
        let raw = run_linter(Language::Yaml, "yamllint", yamllint, &[0, 1], cancel).await?;
        Ok(vec![raw])
    }

    fn parse(&self, raw: &RawOutput, root: &Path) -> Vec<LintIssue> {
        parse_yamllint(&raw.stdout, root)
    }
}

fn pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(?P<file>.+?):(?P<line>\d+):(?P<col>\d+):\s*\[(?P<level>\w+)\]\s*(?P<msg>.+?)(?:\s+\((?P<rule>[\w-]+)\))?$",
        )
        .expect("valid regex")
    })
}

fn parse_yamllint(output: &str, root: &Path) -> Vec<LintIssue> {
    let mut issues = Vec::new();
    for line in output.lines().filter(|l| !l.trim().is_empty()) {
        let Some(caps) = pattern().captures(line.trim_end()) else {
            debug!(linter = "yamllint", line, "skipping unparseable line");
            continue;
        };
        let (Ok(line_no), Ok(col)) = (caps["line"].parse::<u32>(), caps["col"].parse::<u32>()) else {
            continue;
        };
        issues.push(LintIssue {
            file: relative_path(root, &caps["file"]),
            line: line_no,
            column: col,
            severity: match &caps["level"] {
                "error" => Severity::Error,
                "warning" => Severity::Warning,
                _ => Severity::Info,
            },
            rule: caps
                .name("rule")
                .map(|r| r.as_str().to_string())
                .unwrap_or_else(|| "yamllint".to_string()),
            message: caps["msg"].trim().to_string(),
            source: "yamllint".to_string(),
        });
    }
    issues
}
