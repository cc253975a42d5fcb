//! JavaScript and TypeScript via ESLint's JSON formatter.

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
pub struct JavaScriptAdapter;

fn eslint_config() -> serde_json::Value {
    json!({
        "root": true,
        "env": { "browser": true, "es2021": true, "node": true },
        "extends": ["eslint:recommended"],
        "parserOptions": { "ecmaVersion": "latest", "sourceType": "module" },
        "rules": {
            "indent": ["error", 2],
            "linebreak-style": ["error", "unix"],
            "quotes": ["error", "single"],
            "semi": ["error", "always"],
            "no-unused-vars": ["warn"],
            "no-console": ["warn"],
            "prefer-const": ["error"]
        },
        "overrides": [
            { "files": ["*.ts", "*.tsx"], "parser": "@typescript-eslint/parser" }
        ]
    })
}

#[async_trait]
impl LinterAdapter for JavaScriptAdapter {
    fn language(&self) -> Language {
        Language::JavaScript
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
                    "eslint@8",
                    "@typescript-eslint/parser@6",
                    "typescript",
                ])
                .current_dir(dir),
            cancel,
        )
        .await?;
        let config = serde_json::to_vec_pretty(&eslint_config())?;
        tokio::fs::write(dir.join(".eslintrc.json"), config).await?;
        Ok(())
    }

    async fn run(
        &self,
        env: &LanguageEnvironment,
        target: LintTarget<'_>,
        timeout: Duration,
        cancel: &CancelToken,
    ) -> Result<Vec<RawOutput>, LintError> {
        let eslint = CommandSpec::new(env.path().join("node_modules").join(".bin").join("eslint"))
            .arg("--no-eslintrc")
            .arg("--config")
            .arg(env.path().join(".eslintrc.json"))
            .arg("--resolve-plugins-relative-to")
            .arg(env.path())
            .args(["--format", "json", "--no-error-on-unmatched-pattern"])
            .args(file_args(target.files))
            .current_dir(target.root)
            .timeout(timeout);
        let raw = run_linter(Language::JavaScript, "eslint", eslint, &[0, 1], cancel).await?;
        Ok(vec![raw])
    }

    fn parse(&self, raw: &RawOutput, root: &Path) -> Vec<LintIssue> {
        parse_eslint_json(&raw.stdout, root)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EslintFile {
    file_path: String,
    #[serde(default)]
    messages: Vec<EslintMessage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EslintMessage {
    rule_id: Option<String>,
    severity: u8,
    message: String,
    line: Option<u32>,
    column: Option<u32>,
}

fn parse_eslint_json(output: &str, root: &Path) -> Vec<LintIssue> {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    let files: Vec<EslintFile> = match serde_json::from_str(trimmed) {
        Ok(files) => files,
        Err(e) => {
            debug!(linter = "eslint", error = %e, "unparseable eslint output");
            return Vec::new();
        }
    };

    files
        .into_iter()
        .flat_map(|file| {
            let path = relative_path(root, &file.file_path);
            file.messages.into_iter().map(move |m| LintIssue {
                file: path.clone(),
                line: m.line.unwrap_or(1),
                column: m.column.unwrap_or(1),
                severity: match m.severity {
                    2 => Severity::Error,
                    1 => Severity::Warning,
                    _ => Severity::Info,
                },
                // Parse errors carry no rule id.
                rule: m.rule_id.unwrap_or_else(|| "parse-error".to_string()),
                message: m.message,
                source: "eslint".to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_parse_eslint_json() {
        let out = r#"[
          {"filePath": "/repo/src/app.js", "messages": [
            {"ruleId": "no-unused-vars", "severity": 1, "message": "'x' is assigned a value but never used.", "line": 2, "column": 7},
            {"ruleId": "semi", "severity": 2, "message": "Missing semicolon.", "line": 4, "column": 12}
          ], "errorCount": 1, "warningCount": 1},
          {"filePath": "/repo/src/clean.js", "messages": []}
        ]"#;
        let issues = parse_eslint_json(out, Path::new("/repo"));
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].file, PathBuf::from("src/app.js"));
        assert_eq!(issues[0].severity, Severity::Warning);
        assert_eq!(issues[0].rule, "no-unused-vars");
        assert_eq!(issues[1].severity, Severity::Error);
        assert_eq!(issues[1].column, 12);
    }

    #[test]
    fn test_parse_error_without_rule() {
        let out = r#"[{"filePath": "/repo/a.ts", "messages": [
            {"ruleId": null, "fatal": true, "severity": 2, "message": "Parsing error: Unexpected token", "line": 1, "column": 5}
        ]}]"#;
        let issues = parse_eslint_json(out, Path::new("/repo"));
        assert_eq!(issues[0].rule, "parse-error");
        assert_eq!(issues[0].severity, Severity::Error);
    }

    #[test]
    fn test_non_json_output_is_dropped() {
        assert!(parse_eslint_json("Oops! Something went wrong!", Path::new("/repo")).is_empty());
        assert!(parse_eslint_json("", Path::new("/repo")).is_empty());
    }

    #[test]
    fn test_config_parses_typescript_files() {
        let config = eslint_config();
        assert_eq!(config["overrides"][0]["parser"], "@typescript-eslint/parser");
        assert_eq!(config["root"], true);
    }
}
