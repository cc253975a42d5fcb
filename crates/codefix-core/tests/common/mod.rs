//! Shared fakes and fixtures for codefix-core integration tests.
#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use codefix_core::{
    FileSink, FixSynthesizer, HostError, ModelError, ModelRunner, SynthesisConfig, VcsHost,
    WorkflowController, WorkflowOptions,
};
use codefix_lint::{
    AdapterRegistry, Language, LintError, LintIssue, LintTarget, LinterAdapter, RawOutput,
    Severity,
};
use lint_env_manager::{CancelToken, EnvironmentManager, LanguageEnvironment, ManagerConfig};

// ---------------------------------------------------------------------------
// Git
// ---------------------------------------------------------------------------

pub fn run_git(repo_dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(repo_dir)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// A repository with `files` committed on its initial branch.
pub fn make_git_repo(files: &[(&str, &str)]) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    run_git(dir.path(), &["init", "--quiet"]);
    run_git(dir.path(), &["config", "user.name", "test-user"]);
    run_git(dir.path(), &["config", "user.email", "test@example.com"]);
    run_git(dir.path(), &["config", "commit.gpgsign", "false"]);
    for (rel, content) in files {
        let path = dir.path().join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }
    run_git(dir.path(), &["add", "--all"]);
    run_git(dir.path(), &["commit", "--quiet", "--allow-empty", "-m", "initial"]);
    dir
}

pub fn head_sha(repo: &Path) -> String {
    run_git(repo, &["rev-parse", "HEAD"])
}

pub fn current_branch(repo: &Path) -> String {
    run_git(repo, &["symbolic-ref", "--short", "HEAD"])
}

pub fn branches(repo: &Path) -> Vec<String> {
    run_git(repo, &["branch", "--format=%(refname:short)"])
        .lines()
        .map(str::to_string)
        .collect()
}

pub fn status(repo: &Path) -> String {
    run_git(repo, &["status", "--porcelain"])
}

pub fn read(repo: &Path, rel: &str) -> String {
    std::fs::read_to_string(repo.join(rel)).unwrap()
}

// ---------------------------------------------------------------------------
// Linting
// ---------------------------------------------------------------------------

/// In-process Python "linter" with two rules:
/// - `F401` (error): `import x` where `x` is never used again
/// - `E225` (warning): `=` without surrounding spaces
pub struct FakeAdapter {
    pub language: Language,
    pub fail_provision: bool,
    pub relint: bool,
    pub provisions: AtomicUsize,
    pub runs: AtomicUsize,
}

impl FakeAdapter {
    pub fn python() -> Self {
        Self {
            language: Language::Python,
            fail_provision: false,
            relint: true,
            provisions: AtomicUsize::new(0),
            runs: AtomicUsize::new(0),
        }
    }

    pub fn failing(language: Language) -> Self {
        Self {
            language,
            fail_provision: true,
            ..Self::python()
        }
    }
}

/// `path:line:col:code:message` for every finding in `content`.
pub fn fake_lint(path: &Path, content: &str) -> Vec<String> {
    let lines: Vec<&str> = content.lines().collect();
    let mut out = Vec::new();
    for (idx, line) in lines.iter().enumerate() {
        let line_no = idx + 1;
        if let Some(name) = line.strip_prefix("import ") {
            let name = name.trim();
            let used = lines
                .iter()
                .enumerate()
                .any(|(other, l)| other != idx && l.contains(name));
            if !used {
                out.push(format!(
                    "{}:{line_no}:1:F401:'{name}' imported but unused",
                    path.display()
                ));
            }
        }
        if let Some(pos) = line.find('=') {
            if !line.contains(" = ") && !line.contains("==") {
                out.push(format!(
                    "{}:{line_no}:{}:E225:missing whitespace around operator",
                    path.display(),
                    pos + 1
                ));
            }
        }
    }
    out
}

#[async_trait]
impl LinterAdapter for FakeAdapter {
    fn language(&self) -> Language {
        self.language
    }

    fn supports_relint(&self) -> bool {
        self.relint
    }

    async fn provision(&self, dir: &Path, _cancel: &CancelToken) -> anyhow::Result<()> {
        self.provisions.fetch_add(1, Ordering::SeqCst);
        if self.fail_provision {
            anyhow::bail!("pip install failed: no network");
        }
        tokio::fs::write(dir.join("fake-linter"), "ok").await?;
        Ok(())
    }

    async fn run(
        &self,
        _env: &LanguageEnvironment,
        target: LintTarget<'_>,
        _timeout: Duration,
        _cancel: &CancelToken,
    ) -> Result<Vec<RawOutput>, LintError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        let mut stdout = Vec::new();
        for file in target.files {
            let content = tokio::fs::read_to_string(target.root.join(file)).await?;
            stdout.extend(fake_lint(file, &content));
        }
        Ok(vec![RawOutput {
            linter: "fakelint".to_string(),
            exit_code: if stdout.is_empty() { 0 } else { 1 },
            stdout: stdout.join("\n"),
            stderr: String::new(),
        }])
    }

    fn parse(&self, raw: &RawOutput, _root: &Path) -> Vec<LintIssue> {
        raw.stdout
            .lines()
            .filter_map(|line| {
                let mut parts = line.splitn(5, ':');
                let file = parts.next()?;
                let line_no = parts.next()?.parse().ok()?;
                let column = parts.next()?.parse().ok()?;
                let rule = parts.next()?;
                let message = parts.next()?;
                Some(LintIssue {
                    file: PathBuf::from(file),
                    line: line_no,
                    column,
                    severity: if rule.starts_with('F') {
                        Severity::Error
                    } else {
                        Severity::Warning
                    },
                    rule: rule.to_string(),
                    message: message.to_string(),
                    source: raw.linter.clone(),
                })
            })
            .collect()
    }
}

pub fn issue(file: &str, line: u32, rule: &str, severity: Severity) -> LintIssue {
    LintIssue {
        file: PathBuf::from(file),
        line,
        column: 1,
        severity,
        rule: rule.to_string(),
        message: format!("{rule} finding"),
        source: "fakelint".to_string(),
    }
}

// ---------------------------------------------------------------------------
// Model runners
// ---------------------------------------------------------------------------

/// Replays a fixed sequence of responses, then fails.
pub struct ScriptedRunner {
    responses: Mutex<VecDeque<Result<String, ModelError>>>,
    pub calls: AtomicUsize,
}

impl ScriptedRunner {
    pub fn new(responses: Vec<Result<String, ModelError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelRunner for ScriptedRunner {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(
        &self,
        _prompt: &str,
        _timeout: Duration,
        _cancel: &CancelToken,
    ) -> Result<String, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ModelError::Failed("script exhausted".to_string())))
    }
}

/// Answers with the fix registered for the file named in the prompt.
pub struct FixTableRunner {
    fixes: BTreeMap<String, String>,
    pub calls: AtomicUsize,
}

impl FixTableRunner {
    pub fn new(fixes: &[(&str, &str)]) -> Self {
        Self {
            fixes: fixes
                .iter()
                .map(|(f, c)| (f.to_string(), c.to_string()))
                .collect(),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ModelRunner for FixTableRunner {
    fn name(&self) -> &str {
        "fix-table"
    }

    async fn generate(
        &self,
        prompt: &str,
        _timeout: Duration,
        _cancel: &CancelToken,
    ) -> Result<String, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let file = prompt
            .lines()
            .find_map(|l| l.strip_prefix("FILE: "))
            .unwrap_or_default();
        match self.fixes.get(file) {
            Some(fix) => Ok(format!("Here is the corrected code:\n```python\n{fix}```\n")),
            None => Err(ModelError::Failed(format!("no fix for {file}"))),
        }
    }
}

/// Answers from a fix table after a pause, recording how many calls
/// overlap.
pub struct PacedRunner {
    table: FixTableRunner,
    pause: Duration,
    in_flight: AtomicUsize,
    pub peak: AtomicUsize,
}

impl PacedRunner {
    pub fn new(fixes: &[(&str, &str)], pause: Duration) -> Self {
        Self {
            table: FixTableRunner::new(fixes),
            pause,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelRunner for PacedRunner {
    fn name(&self) -> &str {
        "paced"
    }

    async fn generate(
        &self,
        prompt: &str,
        timeout: Duration,
        cancel: &CancelToken,
    ) -> Result<String, ModelError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.pause).await;
        let answer = self.table.generate(prompt, timeout, cancel).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        answer
    }
}

/// Panics on prompts for `crash_on`; answers the rest from a fix table.
pub struct CrashingRunner {
    pub crash_on: &'static str,
    pub table: FixTableRunner,
}

#[async_trait]
impl ModelRunner for CrashingRunner {
    fn name(&self) -> &str {
        "crashing"
    }

    async fn generate(
        &self,
        prompt: &str,
        timeout: Duration,
        cancel: &CancelToken,
    ) -> Result<String, ModelError> {
        if prompt.contains(&format!("FILE: {}", self.crash_on)) {
            panic!("model client crashed");
        }
        self.table.generate(prompt, timeout, cancel).await
    }
}

/// Always refuses the connection.
pub struct DownRunner;

#[async_trait]
impl ModelRunner for DownRunner {
    fn name(&self) -> &str {
        "down"
    }

    async fn generate(
        &self,
        _prompt: &str,
        _timeout: Duration,
        _cancel: &CancelToken,
    ) -> Result<String, ModelError> {
        Err(ModelError::Unavailable("connection refused".to_string()))
    }
}

pub fn fast_synthesis() -> SynthesisConfig {
    SynthesisConfig {
        retry_backoff: Duration::from_millis(5),
        ..SynthesisConfig::default()
    }
}

// ---------------------------------------------------------------------------
// Hosting and file writes
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeHost {
    pub fail_push: bool,
    pub pushed: Mutex<Vec<String>>,
    pub requests: Mutex<Vec<(String, String, String)>>,
}

#[async_trait]
impl VcsHost for FakeHost {
    async fn push(&self, branch: &str, _cancel: &CancelToken) -> Result<(), HostError> {
        if self.fail_push {
            return Err(HostError::Push("remote rejected".to_string()));
        }
        self.pushed.lock().unwrap().push(branch.to_string());
        Ok(())
    }

    async fn open_request(
        &self,
        branch: &str,
        title: &str,
        body: &str,
        _cancel: &CancelToken,
    ) -> Result<String, HostError> {
        self.requests
            .lock()
            .unwrap()
            .push((branch.to_string(), title.to_string(), body.to_string()));
        Ok("https://github.com/org/repo/pull/7".to_string())
    }
}

/// Writes normally until the `fail_at`-th write (1-based), which fails.
pub struct FlakySink {
    pub fail_at: usize,
    pub writes: AtomicUsize,
}

#[async_trait]
impl FileSink for FlakySink {
    async fn write(&self, path: &Path, content: &str) -> std::io::Result<()> {
        let n = self.writes.fetch_add(1, Ordering::SeqCst) + 1;
        if n == self.fail_at {
            return Err(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "disk full",
            ));
        }
        tokio::fs::write(path, content).await
    }
}

// ---------------------------------------------------------------------------
// Controller assembly
// ---------------------------------------------------------------------------

pub struct Harness {
    pub env_root: tempfile::TempDir,
    pub envs: Arc<EnvironmentManager>,
    pub adapter: Arc<FakeAdapter>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_adapter(FakeAdapter::python())
    }

    pub fn with_adapter(adapter: FakeAdapter) -> Self {
        let env_root = tempfile::tempdir().unwrap();
        let envs = Arc::new(EnvironmentManager::new(ManagerConfig {
            root: env_root.path().to_path_buf(),
            ..ManagerConfig::default()
        }));
        Self {
            env_root,
            envs,
            adapter: Arc::new(adapter),
        }
    }

    pub fn registry(&self) -> AdapterRegistry {
        AdapterRegistry::empty().with_adapter(self.adapter.clone())
    }

    pub fn controller(
        &self,
        runner: Arc<dyn ModelRunner>,
        options: WorkflowOptions,
    ) -> WorkflowController {
        WorkflowController::new(
            self.envs.clone(),
            self.registry(),
            FixSynthesizer::new(runner, fast_synthesis()),
            options,
        )
    }
}

pub fn options(dry_run: bool) -> WorkflowOptions {
    WorkflowOptions {
        dry_run,
        push: false,
        ..WorkflowOptions::default()
    }
}

/// Install a `pre-commit` hook that rejects every commit.
#[cfg(unix)]
pub fn reject_commits(repo: &Path) {
    use std::os::unix::fs::PermissionsExt;

    let hook = repo.join(".git").join("hooks").join("pre-commit");
    std::fs::create_dir_all(hook.parent().unwrap()).unwrap();
    std::fs::write(&hook, "#!/bin/sh\necho 'commit blocked by policy' >&2\nexit 1\n").unwrap();
    std::fs::set_permissions(&hook, std::fs::Permissions::from_mode(0o755)).unwrap();
}

pub fn python_files(files: &[&str]) -> BTreeMap<Language, Vec<PathBuf>> {
    let mut map = BTreeMap::new();
    map.insert(
        Language::Python,
        files.iter().map(PathBuf::from).collect::<Vec<_>>(),
    );
    map
}
