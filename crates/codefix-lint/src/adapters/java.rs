//! Java via Checkstyle's plain formatter.
//!
//! The Checkstyle jar is downloaded into the environment directory; a
//! system `java` runtime is required.

use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use lint_env_manager::{CancelToken, CommandSpec, LanguageEnvironment};
use regex::Regex;
use tracing::debug;

use super::{file_args, provision_step};
use crate::adapter::{relative_path, run_linter, LintTarget, LinterAdapter, RawOutput};
use crate::error::LintError;
use crate::issue::{LintIssue, Severity};
use crate::language::Language;

const CHECKSTYLE_URL: &str =
    "https://github.com/checkstyle/checkstyle/releases/download/checkstyle-10.17.0/checkstyle-10.17.0-all.jar";

const CHECKSTYLE_CONFIG: &str = r#"<?xml version="1.0"?>
<!DOCTYPE module PUBLIC
    "-//Checkstyle//DTD Checkstyle Configuration 1.3//EN"
    "https://checkstyle.org/dtds/configuration_1_3.dtd">
<module name="Checker">
  <property name="charset" value="UTF-8"/>
  <property name="severity" value="warning"/>
  <module name="TreeWalker">
    <module name="AvoidStarImport"/>
    <module name="RedundantImport"/>
    <module name="UnusedImports"/>
    <module name="ConstantName"/>
    <module name="MethodName"/>
    <module name="LocalVariableName"/>
    <module name="TypeName"/>
    <module name="EmptyStatement"/>
    <module name="EqualsHashCode"/>
    <module name="MissingSwitchDefault"/>
    <module name="NeedBraces"/>
    <module name="LeftCurly"/>
    <module name="RightCurly"/>
    <module name="WhitespaceAround"/>
    <module name="ModifierOrder"/>
    <module name="UpperEll"/>
  </module>
</module>
"#;

#[derive(Debug, Default, Clone, Copy)]
pub struct JavaAdapter;

#[async_trait]
impl LinterAdapter for JavaAdapter {
    fn language(&self) -> Language {
        Language::Java
    }

    async fn provision(&self, dir: &Path, cancel: &CancelToken) -> anyhow::Result<()> {
        provision_step(CommandSpec::new("java").arg("-version"), cancel).await?;
        provision_step(
            CommandSpec::new("curl")
                .args(["-fsSL", "-o"])
                .arg(dir.join("checkstyle.jar"))
                .arg(CHECKSTYLE_URL),
            cancel,
        )
        .await?;
        tokio::fs::write(dir.join("checkstyle.xml"), CHECKSTYLE_CONFIG).await?;
        Ok(())
    }

    async fn run(
        &self,
        env: &LanguageEnvironment,
        target: LintTarget<'_>,
        timeout: Duration,
        cancel: &CancelToken,
    ) -> Result<Vec<RawOutput>, LintError> {
        // Every check reports at warning severity, so findings exit 0;
        // a nonzero status means Checkstyle itself failed.
        let checkstyle = CommandSpec::new("java")
            .arg("-jar")
            .arg(env.path().join("checkstyle.jar"))
            .arg("-c")
            .arg(env.path().join("checkstyle.xml"))
            .args(["-f", "plain"])
            .args(file_args(target.files))
            .current_dir(target.root)
            .timeout(timeout);
        let raw = run_linter(Language::Java, "checkstyle", checkstyle, &[0], cancel).await?;
        Ok(vec![raw])
    }

    fn parse(&self, raw: &RawOutput, root: &Path) -> Vec<LintIssue> {
        parse_checkstyle(&raw.stdout, root)
    }
}

fn pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^\[(?P<level>[A-Z]+)\]\s+(?P<file>.+?):(?P<line>\d+):(?:(?P<col>\d+):)?\s*(?P<msg>.+?)\s+\[(?P<rule>\w+)\]$",
        )
        .expect("valid regex")
    })
}

fn parse_checkstyle(output: &str, root: &Path) -> Vec<LintIssue> {
    let mut issues = Vec::new();
    for line in output.lines().map(str::trim_end) {
        if line.is_empty() || line.starts_with("Starting audit") || line.starts_with("Audit done") {
            continue;
        }
        let Some(caps) = pattern().captures(line) else {
            debug!(linter = "checkstyle", line, "skipping unparseable line");
            continue;
        };
        let Ok(line_no) = caps["line"].parse::<u32>() else {
            continue;
        };
        issues.push(LintIssue {
            file: relative_path(root, &caps["file"]),
            line: line_no,
            column: caps
                .name("col")
                .and_then(|c| c.as_str().parse().ok())
                .unwrap_or(1),
            severity: match &caps["level"] {
                "ERROR" => Severity::Error,
                "WARN" => Severity::Warning,
                _ => Severity::Info,
            },
            rule: caps["rule"].to_string(),
            message: caps["msg"].trim().to_string(),
            source: "checkstyle".to_string(),
        });
    }
    issues
}
