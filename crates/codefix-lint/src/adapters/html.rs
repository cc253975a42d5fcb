//! HTML via htmlhint's JSON formatter.

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
pub struct HtmlAdapter;

fn htmlhint_config() -> serde_json::Value {
    json!({
        "tagname-lowercase": true,
        "attr-lowercase": true,
        "attr-value-double-quotes": true,
        "attr-no-duplication": true,
        "doctype-first": true,
        "id-unique": true,
        "src-not-empty": true,
        "title-require": true,
        "tag-pair": true
    })
}

#[async_trait]
impl LinterAdapter for HtmlAdapter {
    fn language(&self) -> Language {
        Language::Html
    }

    async fn provision(&self, dir: &Path, cancel: &CancelToken) -> anyhow::Result<()> {
        provision_step(
            CommandSpec::new("npm").args(["init", "-y"]).current_dir(dir),
            cancel,
        )
        .await?;
        provision_step(
            CommandSpec::new("npm")
                .args(["install", "--save-dev", "--no-audit", "--no-fund", "htmlhint@1"])
                .current_dir(dir),
            cancel,
        )
        .await?;
        let config = serde_json::to_vec_pretty(&htmlhint_config())?;
        tokio::fs::write(dir.join(".htmlhintrc"), config).await?;
        Ok(())
    }

    async fn run(
        &self,
        env: &LanguageEnvironment,
        target: LintTarget<'_>,
        timeout: Duration,
        cancel: &CancelToken,
    ) -> Result<Vec<RawOutput>, LintError> {
        let htmlhint = CommandSpec::new(env.path().join("node_modules").join(".bin").join("htmlhint"))
            .arg("--config")
            .arg(env.path().join(".htmlhintrc"))
            .args(["--format", "json"])
            .args(file_args(target.files))
            .current_dir(target.root)
            .timeout(timeout);
        let raw = run_linter(Language::Html, "htmlhint", htmlhint, &[0, 1], cancel).await?;
        Ok(vec![raw])
    }

    fn parse(&self, raw: &RawOutput, root: &Path) -> Vec<LintIssue> {
        parse_htmlhint_json(&raw.stdout, root)
    }
}

#[derive(Debug, Deserialize)]
struct HintFile {
    file: String,
    #[serde(default)]
    messages: Vec<HintMessage>,
}

#[derive(Debug, Deserialize)]
struct HintMessage {
    #[serde(rename = "type", default)]
    kind: String,
    message: String,
    line: Option<u32>,
    col: Option<u32>,
    rule: Option<HintRule>,
}

#[derive(Debug, Deserialize)]
struct HintRule {
    id: String,
}

fn parse_htmlhint_json(output: &str, root: &Path) -> Vec<LintIssue> {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    let files: Vec<HintFile> = match serde_json::from_str(trimmed) {
        Ok(files) => files,
        Err(e) => {
            debug!(linter = "htmlhint", error = %e, "unparseable htmlhint output");
            return Vec::new();
        }
    };

    files
        .into_iter()
        .flat_map(|file| {
            let path = relative_path(root, &file.file);
            file.messages.into_iter().map(move |m| LintIssue {
                file: path.clone(),
                line: m.line.unwrap_or(1),
                column: m.col.unwrap_or(1),
                severity: match m.kind.as_str() {
                    "error" => Severity::Error,
                    "warning" => Severity::Warning,
                    _ => Severity::Info,
                },
                rule: m
                    .rule
                    .map(|r| r.id)
                    .unwrap_or_else(|| "htmlhint".to_string()),
                message: m.message,
                source: "htmlhint".to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_parse_htmlhint_json() {
        let out = r#"[{"file":"/repo/site/index.html","messages":[
            {"type":"error","message":"Doctype must be declared first.","raw":"<html>","evidence":"<html>","line":1,"col":1,
             "rule":{"id":"doctype-first","description":"Doctype must be declared first.","link":"https://htmlhint.com/docs/user-guide/rules/doctype-first"}},
            {"type":"warning","message":"<title></title> must be present in <head> tag.","raw":"<head>","evidence":"<head>","line":2,"col":3,
             "rule":{"id":"title-require","description":"","link":""}}
        ],"time":3}]"#;
        let issues = parse_htmlhint_json(out, Path::new("/repo"));
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].file, PathBuf::from("site/index.html"));
        assert_eq!(issues[0].rule, "doctype-first");
        assert_eq!(issues[0].severity, Severity::Error);
        assert_eq!(issues[1].severity, Severity::Warning);
        assert_eq!(issues[1].column, 3);
    }

    #[test]
    fn test_clean_run_prints_empty_array() {
        assert!(parse_htmlhint_json("[]", Path::new("/repo")).is_empty());
        assert!(parse_htmlhint_json("Config could not be loaded", Path::new("/repo")).is_empty());
    }
}
