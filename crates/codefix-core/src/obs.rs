//! Structured lifecycle events for a fix run.
//!
//! - `SessionSpan` tags everything logged during a run with its session id
//! - `emit_*` functions log one event each, keyed by an `event` field
//!
//! Environment events (`env.provisioned`, `env.evicted`) are emitted by
//! the environment manager itself.

use std::path::Path;

use tracing::{info, warn};

use crate::domain::{FailureReason, ReasonCode, Stage, Verdict};

/// RAII guard that enters a session-scoped span on synchronous paths.
pub struct SessionSpan {
    _span: tracing::span::EnteredSpan,
}

impl SessionSpan {
    pub fn enter(session_id: &str) -> Self {
        Self {
            _span: session_span(session_id).entered(),
        }
    }
}

/// The span itself, for instrumenting async work.
pub fn session_span(session_id: &str) -> tracing::Span {
    tracing::info_span!("codefix.session", session_id = %session_id)
}

pub fn emit_session_started(session_id: &str, repo: &Path, dry_run: bool) {
    info!(
        event = "session.started",
        session_id = %session_id,
        repo = %repo.display(),
        dry_run = dry_run,
    );
}

pub fn emit_stage(session_id: &str, stage: Stage) {
    info!(event = "session.stage", session_id = %session_id, stage = %stage);
}

pub fn emit_language_skipped(session_id: &str, language: &str, code: ReasonCode, detail: &str) {
    warn!(
        event = "language.skipped",
        session_id = %session_id,
        language = %language,
        code = %code,
        detail = %detail,
    );
}

pub fn emit_file_verdict(session_id: &str, file: &Path, verdict: &Verdict) {
    match verdict {
        Verdict::Accepted => info!(
            event = "file.verdict",
            session_id = %session_id,
            file = %file.display(),
            verdict = "accepted",
        ),
        Verdict::Rejected(reason) => info!(
            event = "file.verdict",
            session_id = %session_id,
            file = %file.display(),
            verdict = "rejected",
            code = %reason.code(),
        ),
    }
}

/// Final event of a run; `failure` is `None` on success.
pub fn emit_session_finished(
    session_id: &str,
    duration_ms: u64,
    files_with_fixes: usize,
    failure: Option<&FailureReason>,
) {
    match failure {
        None => info!(
            event = "session.finished",
            session_id = %session_id,
            duration_ms = duration_ms,
            files_with_fixes = files_with_fixes,
            success = true,
        ),
        Some(failure) => warn!(
            event = "session.finished",
            session_id = %session_id,
            duration_ms = duration_ms,
            files_with_fixes = files_with_fixes,
            success = false,
            stage = %failure.stage,
            code = %failure.code,
        ),
    }
}
