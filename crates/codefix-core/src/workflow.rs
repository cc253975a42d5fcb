//! Workflow controller: one instance sequences one run.
//!
//! ```text
//! Init -> Detecting -> Linting -> Fixing -> DryRunReport -> Done
//!                                        -> Applying -> Committing -> [Pushing -> PrOpened] -> Done
//! ```
//!
//! Language failures are recorded as skipped languages and file failures
//! as rejected candidates. Only repository problems, apply/commit errors
//! and cancellation end the run in `Failed`. Apply and commit failures
//! roll the repository back to its pre-run branch and contents. Push and
//! pull request failures leave the local commit in place.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use codefix_lint::{
    detect_languages, AdapterProvisioner, AdapterRegistry, Language, LintIssue, LintOrchestrator,
    LinterAdapter,
};
use lint_env_manager::{CancelToken, EnvironmentManager, LanguageEnvironment};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn, Instrument};

use crate::config::CodefixConfig;
use crate::domain::{
    CommitResult, FailureReason, FixCandidate, FixSession, OutputMode, ReasonCode, RejectReason,
    Repository, SkippedLanguage, Stage,
};
use crate::git;
use crate::hosting::{CliHost, VcsHost};
use crate::obs;
use crate::report;
use crate::synthesize::{AdapterRelinter, FixSynthesizer, Relinter};

/// Where accepted fixes are written.
#[async_trait]
pub trait FileSink: Send + Sync {
    async fn write(&self, path: &Path, content: &str) -> std::io::Result<()>;
}

/// Writes straight to the filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsSink;

#[async_trait]
impl FileSink for FsSink {
    async fn write(&self, path: &Path, content: &str) -> std::io::Result<()> {
        tokio::fs::write(path, content).await
    }
}

/// Per-run switches.
#[derive(Debug, Clone)]
pub struct WorkflowOptions {
    pub branch: String,
    pub remote: String,
    pub dry_run: bool,
    pub overwrite_branch: bool,
    pub push: bool,
    pub output_mode: OutputMode,
    /// Files synthesized in parallel; at least one.
    pub max_concurrency: usize,
}

impl Default for WorkflowOptions {
    fn default() -> Self {
        Self::from(&CodefixConfig::default())
    }
}

impl From<&CodefixConfig> for WorkflowOptions {
    fn from(config: &CodefixConfig) -> Self {
        Self {
            branch: config.git.branch.clone(),
            remote: config.git.remote.clone(),
            dry_run: false,
            overwrite_branch: config.git.overwrite_branch,
            push: config.git.push,
            output_mode: config.output.mode,
            max_concurrency: config.fix.max_concurrency,
        }
    }
}

/// Final state of a run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub session: FixSession,
    /// `Done` or `Failed`.
    pub stage: Stage,
    /// Every stage entered, in order.
    pub stages: Vec<Stage>,
    pub failure: Option<FailureReason>,
    pub commit: Option<CommitResult>,
    /// Non-fatal push or pull request error.
    pub push_error: Option<String>,
}

impl RunOutcome {
    pub fn is_failed(&self) -> bool {
        self.stage == Stage::Failed
    }
}

/// A language whose lint pass completed; its environment is still held.
struct LintedLanguage {
    adapter: Arc<dyn LinterAdapter>,
    env: LanguageEnvironment,
    issues: BTreeMap<PathBuf, Vec<LintIssue>>,
}

/// Tracks stage transitions for one run.
struct Progress {
    session_id: String,
    stage: Stage,
    stages: Vec<Stage>,
}

impl Progress {
    fn new(session_id: String) -> Self {
        obs::emit_stage(&session_id, Stage::Init);
        Self {
            session_id,
            stage: Stage::Init,
            stages: vec![Stage::Init],
        }
    }

    fn advance(&mut self, next: Stage) {
        debug_assert!(
            self.stage.can_advance_to(next),
            "illegal transition {} -> {}",
            self.stage,
            next
        );
        self.stage = next;
        self.stages.push(next);
        obs::emit_stage(&self.session_id, next);
    }
}

pub struct WorkflowController {
    envs: Arc<EnvironmentManager>,
    registry: AdapterRegistry,
    orchestrator: LintOrchestrator,
    synthesizer: Arc<FixSynthesizer>,
    host: Option<Arc<dyn VcsHost>>,
    sink: Arc<dyn FileSink>,
    options: WorkflowOptions,
}

impl WorkflowController {
    pub fn new(
        envs: Arc<EnvironmentManager>,
        registry: AdapterRegistry,
        synthesizer: FixSynthesizer,
        options: WorkflowOptions,
    ) -> Self {
        Self {
            envs,
            registry,
            orchestrator: LintOrchestrator::default(),
            synthesizer: Arc::new(synthesizer),
            host: None,
            sink: Arc::new(FsSink),
            options,
        }
    }

    pub fn with_orchestrator(mut self, orchestrator: LintOrchestrator) -> Self {
        self.orchestrator = orchestrator;
        self
    }

    /// Use `host` instead of `git push` + `gh`/`glab`.
    pub fn with_host(mut self, host: Arc<dyn VcsHost>) -> Self {
        self.host = Some(host);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn FileSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn options(&self) -> &WorkflowOptions {
        &self.options
    }

    /// Detect languages by extension, then run.
    pub async fn run_detected(&self, repo: &Path, cancel: &CancelToken) -> RunOutcome {
        let repo = repo.to_path_buf();
        let detect_root = repo.clone();
        self.execute(
            &repo,
            move || detect_languages(&detect_root).map_err(|e| e.to_string()),
            cancel,
        )
        .await
    }

    /// Run over a given language -> files mapping (repo-relative paths).
    pub async fn run(
        &self,
        repo: &Path,
        files: BTreeMap<Language, Vec<PathBuf>>,
        cancel: &CancelToken,
    ) -> RunOutcome {
        self.execute(repo, move || Ok(files), cancel).await
    }

    async fn execute<F>(&self, repo: &Path, detect: F, cancel: &CancelToken) -> RunOutcome
    where
        F: FnOnce() -> Result<BTreeMap<Language, Vec<PathBuf>>, String>,
    {
        let started = Instant::now();
        let snapshot = git::snapshot(repo);
        let repository = match &snapshot {
            Ok(repository) => repository.clone(),
            Err(_) => Repository {
                path: repo.to_path_buf(),
                head: String::new(),
                branch: None,
                clean: false,
            },
        };
        let session = FixSession::new(
            repository,
            self.options.branch.clone(),
            self.options.dry_run,
            self.options.output_mode,
        );
        let session_id = session.id.to_string();
        let span = obs::session_span(&session_id);
        obs::emit_session_started(&session_id, repo, self.options.dry_run);

        let mut run = Run {
            session,
            progress: Progress::new(session_id),
            commit: None,
            push_error: None,
        };
        let failure = self
            .drive(&mut run, snapshot.err(), detect, cancel)
            .instrument(span)
            .await
            .err();

        let _span = obs::SessionSpan::enter(&run.progress.session_id);
        if let Some(failure) = &failure {
            run.progress.advance(Stage::Failed);
            warn!(stage = %failure.stage, code = %failure.code, detail = %failure.detail, "run failed");
        }

        obs::emit_session_finished(
            &run.progress.session_id,
            started.elapsed().as_millis() as u64,
            run.session.files_with_fixes(),
            failure.as_ref(),
        );
        RunOutcome {
            session: run.session,
            stage: run.progress.stage,
            stages: run.progress.stages,
            failure,
            commit: run.commit,
            push_error: run.push_error,
        }
    }

    async fn drive<F>(
        &self,
        run: &mut Run,
        snapshot_error: Option<git::GitError>,
        detect: F,
        cancel: &CancelToken,
    ) -> Result<(), FailureReason>
    where
        F: FnOnce() -> Result<BTreeMap<Language, Vec<PathBuf>>, String>,
    {
        // Init
        if let Some(err) = snapshot_error {
            return Err(FailureReason::new(
                Stage::Init,
                ReasonCode::DirtyOrInvalidRepo,
                err.to_string(),
            ));
        }
        if !run.session.repository.clean {
            return Err(FailureReason::new(
                Stage::Init,
                ReasonCode::DirtyOrInvalidRepo,
                "working tree has uncommitted changes",
            ));
        }
        check_cancel(Stage::Init, cancel)?;

        run.progress.advance(Stage::Detecting);
        let files = detect()
            .map_err(|e| FailureReason::new(Stage::Detecting, ReasonCode::DirtyOrInvalidRepo, e))?;
        let files: BTreeMap<Language, Vec<PathBuf>> =
            files.into_iter().filter(|(_, f)| !f.is_empty()).collect();
        run.session.languages = files.keys().copied().collect();
        info!(languages = ?run.session.languages, "languages detected");

        run.progress.advance(Stage::Linting);
        let linted = self.lint_languages(run, files, cancel).await;
        if let Err(failure) = check_cancel(Stage::Linting, cancel) {
            self.release_all(&linted);
            return Err(failure);
        }

        run.progress.advance(Stage::Fixing);
        let candidates = self.fix_files(&run.session.repository.path, &linted, cancel).await;
        self.release_all(&linted);
        for candidate in candidates {
            obs::emit_file_verdict(&run.progress.session_id, candidate.file(), candidate.verdict());
            run.session
                .candidates
                .insert(candidate.file().to_path_buf(), candidate);
        }
        check_cancel(Stage::Fixing, cancel)?;

        if self.options.dry_run {
            run.progress.advance(Stage::DryRunReport);
            run.progress.advance(Stage::Done);
            return Ok(());
        }
        if run.session.files_with_fixes() == 0 {
            info!("no fixes accepted, nothing to apply");
            run.progress.advance(Stage::Done);
            return Ok(());
        }

        run.progress.advance(Stage::Applying);
        let written = self.apply(&run.session).await?;

        run.progress.advance(Stage::Committing);
        let commit = self.commit(&run.session, &written)?;
        run.commit = Some(commit);

        if self.options.push {
            run.progress.advance(Stage::Pushing);
            self.publish(run, cancel).await;
        }
        run.progress.advance(Stage::Done);
        Ok(())
    }

    /// Acquire and lint every language concurrently.
    async fn lint_languages(
        &self,
        run: &mut Run,
        files: BTreeMap<Language, Vec<PathBuf>>,
        cancel: &CancelToken,
    ) -> Vec<LintedLanguage> {
        let repo = run.session.repository.path.clone();
        let passes = files
            .into_iter()
            .map(|(language, files)| self.lint_language(&repo, language, files, cancel));
        let results = futures::future::join_all(passes).await;

        let mut linted = Vec::new();
        for result in results {
            match result {
                Ok(language) => {
                    run.session
                        .issues
                        .extend(language.issues.iter().map(|(f, i)| (f.clone(), i.clone())));
                    linted.push(language);
                }
                Err(skipped) => {
                    obs::emit_language_skipped(
                        &run.progress.session_id,
                        skipped.language.as_str(),
                        skipped.code,
                        &skipped.detail,
                    );
                    run.session.skipped.push(skipped);
                }
            }
        }
        linted
    }

    async fn lint_language(
        &self,
        repo: &Path,
        language: Language,
        files: Vec<PathBuf>,
        cancel: &CancelToken,
    ) -> Result<LintedLanguage, SkippedLanguage> {
        let skipped = |code: ReasonCode, detail: String| SkippedLanguage {
            language,
            code,
            detail,
        };

        let Some(adapter) = self.registry.get(language) else {
            return Err(skipped(
                ReasonCode::LinterExecutionError,
                format!("no linter adapter for {language}"),
            ));
        };

        let env = self
            .envs
            .acquire(
                language.as_str(),
                repo,
                &AdapterProvisioner(adapter.as_ref()),
                cancel,
            )
            .await
            .map_err(|e| {
                let code = ReasonCode::from_code(e.code()).unwrap_or(ReasonCode::ProvisioningFailed);
                skipped(code, e.to_string())
            })?;

        match self
            .orchestrator
            .lint(adapter.as_ref(), &env, repo, &files, cancel)
            .await
        {
            Ok(issues) => Ok(LintedLanguage {
                adapter,
                env,
                issues,
            }),
            Err(err) => {
                self.release(&env);
                let code = ReasonCode::from_code(err.code()).unwrap_or(ReasonCode::LinterExecutionError);
                Err(skipped(code, err.to_string()))
            }
        }
    }

    /// Synthesize a candidate for every file with issues, at most
    /// `max_concurrency` at a time. Returned in path order.
    async fn fix_files(
        &self,
        repo: &Path,
        linted: &[LintedLanguage],
        cancel: &CancelToken,
    ) -> Vec<FixCandidate> {
        let semaphore = Arc::new(Semaphore::new(self.options.max_concurrency.max(1)));
        let mut tasks = JoinSet::new();
        // Lets a crashed task still report its file.
        let mut owners: HashMap<tokio::task::Id, (PathBuf, Vec<LintIssue>)> = HashMap::new();

        for language in linted {
            let relinter: Arc<dyn Relinter> = Arc::new(AdapterRelinter::new(
                self.orchestrator.clone(),
                language.adapter.clone(),
                language.env.clone(),
            ));
            for (file, issues) in language.issues.iter().filter(|(_, i)| !i.is_empty()) {
                let semaphore = semaphore.clone();
                let synthesizer = self.synthesizer.clone();
                let relinter = relinter.clone();
                let cancel = cancel.clone();
                let path = repo.join(file);
                let file = file.clone();
                let issues = issues.clone();
                let owner = (file.clone(), issues.clone());

                let task = async move {
                    let _permit = semaphore.acquire_owned().await.ok();
                    let original = match tokio::fs::read_to_string(&path).await {
                        Ok(original) => original,
                        Err(err) => {
                            return FixCandidate::rejected(
                                file,
                                String::new(),
                                issues,
                                None,
                                RejectReason::UnreadableSource(err.to_string()),
                            )
                        }
                    };
                    synthesizer
                        .synthesize(&file, &original, issues, Some(relinter.as_ref()), &cancel)
                        .await
                };
                let handle = tasks.spawn(task.instrument(tracing::Span::current()));
                owners.insert(handle.id(), owner);
            }
        }

        let mut candidates = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(candidate) => candidates.push(candidate),
                Err(err) => {
                    let Some((file, issues)) = owners.remove(&err.id()) else {
                        warn!(error = %err, "fix task failed");
                        continue;
                    };
                    warn!(file = %file.display(), error = %err, "fix task failed");
                    candidates.push(FixCandidate::rejected(
                        file,
                        String::new(),
                        issues,
                        None,
                        RejectReason::SynthesisAborted(err.to_string()),
                    ));
                }
            }
        }
        candidates.sort_by(|a, b| a.file().cmp(b.file()));
        candidates
    }

    /// Create the fix branch and write every accepted candidate.
    /// Returns the repo-relative paths written.
    async fn apply(&self, session: &FixSession) -> Result<Vec<PathBuf>, FailureReason> {
        let repo = &session.repository.path;
        let branch = &self.options.branch;

        let on_target = session.repository.branch.as_deref() == Some(branch.as_str());
        if on_target || (git::branch_exists(repo, branch) && !self.options.overwrite_branch) {
            return Err(FailureReason::new(
                Stage::Applying,
                ReasonCode::BranchExists,
                format!("branch '{branch}' already exists"),
            ));
        }
        git::create_branch(repo, branch, self.options.overwrite_branch).map_err(|e| {
            FailureReason::new(Stage::Applying, ReasonCode::ApplyRolledBack, e.to_string())
        })?;

        let accepted: Vec<&FixCandidate> = session.accepted().collect();
        let mut written: Vec<&FixCandidate> = Vec::new();
        for &candidate in &accepted {
            let Some(proposed) = candidate.proposed() else {
                continue;
            };
            let path = repo.join(candidate.file());
            // Record before writing so a partial write is restored too.
            written.push(candidate);
            if let Err(err) = self.sink.write(&path, proposed).await {
                let detail = format!(
                    "writing {} failed after {} of {} files: {err}",
                    candidate.file().display(),
                    written.len() - 1,
                    accepted.len()
                );
                self.rollback(session, &written);
                return Err(FailureReason::new(
                    Stage::Applying,
                    ReasonCode::ApplyRolledBack,
                    detail,
                ));
            }
            debug!(file = %candidate.file().display(), "applied fix");
        }
        Ok(written.iter().map(|c| c.file().to_path_buf()).collect())
    }

    fn commit(&self, session: &FixSession, files: &[PathBuf]) -> Result<CommitResult, FailureReason> {
        let repo = &session.repository.path;
        let result = git::stage(repo, files)
            .and_then(|()| git::commit(repo, &report::commit_message(session)));
        match result {
            Ok(sha) => {
                info!(branch = %self.options.branch, commit = %sha, files = files.len(), "committed fixes");
                Ok(CommitResult {
                    branch: self.options.branch.clone(),
                    commit: sha,
                    pushed: false,
                    request_url: None,
                })
            }
            Err(err) => {
                let written: Vec<&FixCandidate> = session.accepted().collect();
                self.rollback(session, &written);
                Err(FailureReason::new(
                    Stage::Committing,
                    ReasonCode::CommitFailed,
                    err.to_string(),
                ))
            }
        }
    }

    /// Push and open a request. Failures are recorded, never fatal.
    async fn publish(&self, run: &mut Run, cancel: &CancelToken) {
        let host: Arc<dyn VcsHost> = match &self.host {
            Some(host) => host.clone(),
            None => Arc::new(CliHost::new(
                run.session.repository.path.clone(),
                self.options.remote.clone(),
            )),
        };
        let branch = self.options.branch.clone();

        if let Err(err) = host.push(&branch, cancel).await {
            warn!(error = %err, "push failed, commit kept locally");
            run.push_error = Some(format!("{}: {err}", ReasonCode::PushFailed));
            return;
        }
        if let Some(commit) = run.commit.as_mut() {
            commit.pushed = true;
        }

        let title = report::request_title(&run.session);
        let body = report::request_body(&run.session);
        match host.open_request(&branch, &title, &body, cancel).await {
            Ok(url) => {
                info!(url = %url, "opened pull request");
                if let Some(commit) = run.commit.as_mut() {
                    commit.request_url = Some(url);
                }
                run.progress.advance(Stage::PrOpened);
            }
            Err(err) => {
                warn!(error = %err, "could not open pull request");
                run.push_error = Some(format!("{}: {err}", ReasonCode::PushFailed));
            }
        }
    }

    /// Restore written files, return to the starting ref and delete the
    /// fix branch.
    fn rollback(&self, session: &FixSession, written: &[&FixCandidate]) {
        let repo = &session.repository.path;
        for candidate in written {
            if let Err(err) = std::fs::write(repo.join(candidate.file()), candidate.original()) {
                warn!(file = %candidate.file().display(), error = %err, "failed to restore file");
            }
        }
        let start = session
            .repository
            .branch
            .clone()
            .unwrap_or_else(|| session.repository.head.clone());
        if let Err(err) = git::force_checkout(repo, &start) {
            warn!(reference = %start, error = %err, "rollback checkout failed");
        }
        if let Err(err) = git::delete_branch(repo, &self.options.branch) {
            warn!(branch = %self.options.branch, error = %err, "rollback branch delete failed");
        }
        info!(branch = %self.options.branch, "rolled back fix branch");
    }

    fn release(&self, env: &LanguageEnvironment) {
        if let Err(err) = self.envs.release(env) {
            warn!(environment = %env.key, error = %err, "failed to release environment");
        }
    }

    fn release_all(&self, linted: &[LintedLanguage]) {
        for language in linted {
            self.release(&language.env);
        }
    }
}

struct Run {
    session: FixSession,
    progress: Progress,
    commit: Option<CommitResult>,
    push_error: Option<String>,
}

fn check_cancel(stage: Stage, cancel: &CancelToken) -> Result<(), FailureReason> {
    if cancel.is_cancelled() {
        return Err(FailureReason::new(stage, ReasonCode::Cancelled, "run cancelled"));
    }
    Ok(())
}
