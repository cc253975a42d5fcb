//! CSS via stylelint's JSON formatter.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use lint_env_manager::{CancelToken, CommandSpec, LanguageEnvironment};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{file_args, provision_step};
use crate::adapter::{relative_path, run_linter, LintTarget, LinterAdapter, RawOutput};
use crate::error::LintError;
use crate::issue::{LintIssue, Severity};
use crate::language::Language;

#[derive(Debug, Default, Clone, Copy)]
pub struct CssAdapter;

fn stylelint_config() -> serde_json::Value {
    json!({
        "extends": "stylelint-config-standard",
        "rules": {
            "color-hex-length": "short",
            "declaration-block-no-duplicate-properties": true,
            "font-family-name-quotes": "always-where-recommended"
        }
    })
}

#[async_trait]
impl LinterAdapter for CssAdapter {
    fn language(&self) -> Language {
        Language::Css
    }

    async fn provision(&self, dir: &Path, cancel: &CancelToken) -> anyhow::Result<()> {
        provision_step(
            CommandSpec::new("npm").args(["init", "-y"]).current_dir(dir),
            cancel,
        )
        .await?;
        provision_step(
            CommandSpec::new("npm")
                .args([
                    "install",
                    "--save-dev",
                    "--no-audit",
                    "--no-fund",
                    "stylelint@15",
                    "stylelint-config-standard@34",
                ])
                .current_dir(dir),
            cancel,
        )
        .await?;
        let config = serde_json::to_vec_pretty(&stylelint_config())?;
        tokio::fs::write(dir.join(".stylelintrc.json"), config).await?;
        Ok(())
    }

    async fn run(
        &self,
        env: &LanguageEnvironment,
        target: LintTarget<'_>,
        timeout: Duration,
        cancel: &CancelToken,
    ) -> Result<Vec<RawOutput>, LintError> {
        // `extends` resolves from the config's directory, i.e. the env dir.
        let stylelint = CommandSpec::new(env.path().join("node_modules").join(".bin").join("stylelint"))
            .arg("--config")
            .arg(env.path().join(".stylelintrc.json"))
            .args(["--formatter", "json", "--allow-empty-input"])
            .args(file_args(target.files))
            .current_dir(target.root)
            .timeout(timeout);
        // 2 means problems were found; 78 is a config error.
        let raw = run_linter(Language::Css, "stylelint", stylelint, &[0, 2], cancel).await?;
        Ok(vec![raw])
    }

    fn parse(&self, raw: &RawOutput, root: &Path) -> Vec<LintIssue> {
        // Newer stylelint releases print the report on stderr.
        if raw.stdout.trim().is_empty() {
            return parse_stylelint_json(&raw.stderr, root);
        }
        parse_stylelint_json(&raw.stdout, root)
    }
}

#[derive(Debug, Deserialize)]
struct StyleResult {
    source: String,
    #[serde(default)]
    warnings: Vec<StyleWarning>,
}

#[derive(Debug, Deserialize)]
struct StyleWarning {
    line: Option<u32>,
    column: Option<u32>,
    rule: String,
    #[serde(default)]
    severity: String,
    text: String,
}

fn parse_stylelint_json(output: &str, root: &Path) -> Vec<LintIssue> {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    let results: Vec<StyleResult> = match serde_json::from_str(trimmed) {
        Ok(results) => results,
        Err(e) => {
            debug!(linter = "stylelint", error = %e, "unparseable stylelint output");
            return Vec::new();
        }
    };

    results
        .into_iter()
        .flat_map(|result| {
            let path = relative_path(root, &result.source);
            result.warnings.into_iter().map(move |w| {
                // The text repeats the rule name in parentheses.
                let suffix = format!("({})", w.rule);
                let message = w
                    .text
                    .trim()
                    .strip_suffix(suffix.as_str())
                    .unwrap_or(w.text.trim())
                    .trim_end()
                    .to_string();
                LintIssue {
                    file: path.clone(),
                    line: w.line.unwrap_or(1),
                    column: w.column.unwrap_or(1),
                    severity: match w.severity.as_str() {
                        "error" => Severity::Error,
                        "warning" => Severity::Warning,
                        _ => Severity::Info,
                    },
                    rule: w.rule,
                    message,
                    source: "stylelint".to_string(),
                }
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_parse_stylelint_json() {
        let out = r##"[
          {"source":"/repo/static/site.css","deprecations":[],"invalidOptionWarnings":[],"parseErrors":[],"errored":true,
           "warnings":[
             {"line":3,"column":10,"endLine":3,"endColumn":17,"rule":"color-hex-length","severity":"error","text":"Expected \"#ffffff\" to be \"#fff\" (color-hex-length)"},
             {"line":7,"column":1,"rule":"block-no-empty","severity":"warning","text":"Unexpected empty block (block-no-empty)"}
           ]},
          {"source":"/repo/static/clean.css","warnings":[]}
        ]"##;
        let issues = parse_stylelint_json(out, Path::new("/repo"));
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].file, PathBuf::from("static/site.css"));
        assert_eq!(issues[0].rule, "color-hex-length");
        assert_eq!(issues[0].message, "Expected \"#ffffff\" to be \"#fff\"");
        assert_eq!(issues[0].severity, Severity::Error);
        assert_eq!(issues[1].severity, Severity::Warning);
        assert_eq!(issues[1].line, 7);
    }

    #[test]
    fn test_report_on_stderr_is_parsed() {
        let raw = RawOutput {
            linter: "stylelint".to_string(),
            exit_code: 2,
            stdout: String::new(),
            stderr: r#"[{"source":"a.css","warnings":[{"line":1,"column":1,"rule":"no-empty-source","severity":"error","text":"Unexpected empty source (no-empty-source)"}]}]"#.to_string(),
        };
        let issues = CssAdapter.parse(&raw, Path::new("/repo"));
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].file, PathBuf::from("a.css"));
        assert_eq!(issues[0].message, "Unexpected empty source");
    }
}
