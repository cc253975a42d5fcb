//! Integration tests for the lint orchestrator using a grep-based adapter.

use async_trait::async_trait;
use codefix_lint::{
    relative_path, run_linter, Language, LintError, LintIssue, LintOrchestrator, LintTarget,
    LinterAdapter, RawOutput, Severity,
};
use lint_env_manager::{
    CancelToken, CommandSpec, EnvironmentKey, EnvironmentState, LanguageEnvironment,
};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Reports every TODO (warning) and FIXME (error) line.
struct GrepAdapter {
    /// Run the scan twice under different linter names.
    duplicate: bool,
    relint: bool,
    /// Replace the scan with a long sleep.
    hang: bool,
}

impl GrepAdapter {
    fn new() -> Self {
        Self {
            duplicate: false,
            relint: true,
            hang: false,
        }
    }
}

#[async_trait]
impl LinterAdapter for GrepAdapter {
    fn language(&self) -> Language {
        Language::Python
    }

    fn supports_relint(&self) -> bool {
        self.relint
    }

    async fn provision(&self, _dir: &Path, _cancel: &CancelToken) -> anyhow::Result<()> {
        Ok(())
    }

    async fn run(
        &self,
        _env: &LanguageEnvironment,
        target: LintTarget<'_>,
        timeout: Duration,
        cancel: &CancelToken,
    ) -> Result<Vec<RawOutput>, LintError> {
        let script = if self.hang {
            "sleep 5"
        } else {
            "grep -n -H -E 'TODO|FIXME' \"$@\"; exit 0"
        };
        let names: &[&str] = if self.duplicate {
            &["grep-a", "grep-b"]
        } else {
            &["grep-a"]
        };
        let mut outputs = Vec::new();
        for name in names {
            let spec = CommandSpec::new("sh")
                .args(["-c", script, "sh"])
                .args(target.files.iter().map(|f| f.as_os_str().to_owned()))
                .current_dir(target.root)
                .timeout(timeout);
            outputs.push(run_linter(Language::Python, name, spec, &[0], cancel).await?);
        }
        Ok(outputs)
    }

    fn parse(&self, raw: &RawOutput, root: &Path) -> Vec<LintIssue> {
        raw.stdout
            .lines()
            .filter_map(|line| {
                let mut parts = line.splitn(3, ':');
                let file = parts.next()?;
                let line_no: u32 = parts.next()?.parse().ok()?;
                let text = parts.next()?;
                let (rule, severity) = if text.contains("FIXME") {
                    ("fixme", Severity::Error)
                } else {
                    ("todo", Severity::Warning)
                };
                Some(LintIssue {
                    file: relative_path(root, file),
                    line: line_no,
                    column: 1,
                    severity,
                    rule: rule.to_string(),
                    message: text.trim().to_string(),
                    source: raw.linter.clone(),
                })
            })
            .collect()
    }
}

fn ready_env(dir: &Path) -> LanguageEnvironment {
    let now = chrono::Utc::now();
    LanguageEnvironment {
        key: EnvironmentKey::new("python", "test"),
        dir: dir.to_path_buf(),
        state: EnvironmentState::Ready,
        created_at: now,
        last_used_at: now,
    }
}

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

#[tokio::test]
async fn test_lint_groups_sorts_and_filters_issues() {
    let repo = tempfile::tempdir().unwrap();
    let env_dir = tempfile::tempdir().unwrap();
    write(repo.path(), "src/a.py", "x = 1\n# FIXME later\ny = 2\n# TODO one\n");
    write(repo.path(), "b.py", "clean = True\n");
    write(repo.path(), "c.py", "# TODO not requested\n");

    let env = ready_env(env_dir.path());
    let files = vec![PathBuf::from("src/a.py"), PathBuf::from("b.py")];
    let result = LintOrchestrator::default()
        .lint(&GrepAdapter::new(), &env, repo.path(), &files, &CancelToken::new())
        .await
        .unwrap();

    assert_eq!(
        result.keys().cloned().collect::<Vec<_>>(),
        vec![PathBuf::from("b.py"), PathBuf::from("src/a.py")]
    );
    assert!(result[&PathBuf::from("b.py")].is_empty());

    let a = &result[&PathBuf::from("src/a.py")];
    assert_eq!(a.len(), 2);
    assert_eq!((a[0].line, a[0].rule.as_str()), (2, "fixme"));
    assert_eq!(a[0].severity, Severity::Error);
    assert_eq!((a[1].line, a[1].rule.as_str()), (4, "todo"));
}

#[tokio::test]
async fn test_duplicate_reports_keep_first_linter() {
    let repo = tempfile::tempdir().unwrap();
    let env_dir = tempfile::tempdir().unwrap();
    write(repo.path(), "a.py", "# TODO\n");

    let adapter = GrepAdapter {
        duplicate: true,
        ..GrepAdapter::new()
    };
    let env = ready_env(env_dir.path());
    let files = vec![PathBuf::from("a.py")];
    let result = LintOrchestrator::default()
        .lint(&adapter, &env, repo.path(), &files, &CancelToken::new())
        .await
        .unwrap();

    let issues = &result[&PathBuf::from("a.py")];
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].source, "grep-a");
}

#[tokio::test]
async fn test_relint_uses_scratch_copy_inside_environment() {
    let env_dir = tempfile::tempdir().unwrap();
    let env = ready_env(env_dir.path());
    let orchestrator = LintOrchestrator::default();
    let file = Path::new("pkg/mod.py");

    let dirty = orchestrator
        .relint(&GrepAdapter::new(), &env, file, "# TODO\n# FIXME\n", &CancelToken::new())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(dirty.len(), 2);
    assert!(dirty.iter().all(|i| i.file == file));

    let clean = orchestrator
        .relint(&GrepAdapter::new(), &env, file, "value = 1\n", &CancelToken::new())
        .await
        .unwrap()
        .unwrap();
    assert!(clean.is_empty());

    // Scratch directories are removed afterwards.
    assert_eq!(std::fs::read_dir(env_dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_relint_not_supported_returns_none() {
    let env_dir = tempfile::tempdir().unwrap();
    let env = ready_env(env_dir.path());
    let adapter = GrepAdapter {
        relint: false,
        ..GrepAdapter::new()
    };
    let result = LintOrchestrator::default()
        .relint(&adapter, &env, Path::new("a.py"), "x\n", &CancelToken::new())
        .await
        .unwrap();
    assert!(result.is_none());
}

#[tokio::test]
async fn test_linter_timeout_is_execution_error() {
    let repo = tempfile::tempdir().unwrap();
    let env_dir = tempfile::tempdir().unwrap();
    write(repo.path(), "a.py", "x\n");

    let adapter = GrepAdapter {
        hang: true,
        ..GrepAdapter::new()
    };
    let env = ready_env(env_dir.path());
    let files = vec![PathBuf::from("a.py")];
    let err = LintOrchestrator::new(Duration::from_millis(100))
        .lint(&adapter, &env, repo.path(), &files, &CancelToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.code(), "LinterExecutionError");
    assert!(err.to_string().contains("timed out"));
}

#[tokio::test]
async fn test_empty_file_list_runs_nothing() {
    let env_dir = tempfile::tempdir().unwrap();
    let env = ready_env(env_dir.path());
    let adapter = GrepAdapter {
        hang: true,
        ..GrepAdapter::new()
    };
    let result = LintOrchestrator::new(Duration::from_millis(10))
        .lint(&adapter, &env, env_dir.path(), &[], &CancelToken::new())
        .await
        .unwrap();
    assert!(result.is_empty());
}
