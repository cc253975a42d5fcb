//! Fix candidates and their validation verdicts.

use std::path::{Path, PathBuf};

use codefix_lint::LintIssue;
use serde::{Deserialize, Serialize};

use super::error::ReasonCode;

/// Why a candidate was not accepted. Each variant carries a human detail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code", content = "detail")]
pub enum RejectReason {
    ModelUnavailable(String),
    UnparsableOutput(String),
    SizeAnomaly(String),
    NoChange,
    RegressedIssues(String),
    UnreadableSource(String),
    SynthesisAborted(String),
    Cancelled,
}

impl RejectReason {
    pub fn code(&self) -> ReasonCode {
        match self {
            RejectReason::ModelUnavailable(_) => ReasonCode::ModelUnavailable,
            RejectReason::UnparsableOutput(_) => ReasonCode::UnparsableOutput,
            RejectReason::SizeAnomaly(_) => ReasonCode::SizeAnomaly,
            RejectReason::NoChange => ReasonCode::NoChange,
            RejectReason::RegressedIssues(_) => ReasonCode::RegressedIssues,
            RejectReason::UnreadableSource(_) => ReasonCode::UnreadableSource,
            RejectReason::SynthesisAborted(_) => ReasonCode::SynthesisAborted,
            RejectReason::Cancelled => ReasonCode::Cancelled,
        }
    }

    pub fn detail(&self) -> Option<&str> {
        match self {
            RejectReason::ModelUnavailable(d)
            | RejectReason::UnparsableOutput(d)
            | RejectReason::SizeAnomaly(d)
            | RejectReason::RegressedIssues(d)
            | RejectReason::UnreadableSource(d)
            | RejectReason::SynthesisAborted(d) => Some(d),
            RejectReason::NoChange | RejectReason::Cancelled => None,
        }
    }
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.detail() {
            Some(detail) => write!(f, "{}: {}", self.code(), detail),
            None => write!(f, "{}", self.code()),
        }
    }
}

/// Validation outcome of a candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", content = "reason", rename_all = "snake_case")]
pub enum Verdict {
    Accepted,
    Rejected(RejectReason),
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accepted)
    }
}

/// A proposed rewrite of one file.
///
/// Only the synthesizer builds candidates, and they are never modified
/// afterwards. An accepted candidate always differs from its original.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FixCandidate {
    file: PathBuf,
    original: String,
    issues: Vec<LintIssue>,
    proposed: Option<String>,
    diff: Option<String>,
    verdict: Verdict,
}

impl FixCandidate {
    pub(crate) fn accepted(
        file: PathBuf,
        original: String,
        issues: Vec<LintIssue>,
        proposed: String,
        diff: String,
    ) -> Self {
        debug_assert_ne!(original, proposed);
        Self {
            file,
            original,
            issues,
            proposed: Some(proposed),
            diff: Some(diff),
            verdict: Verdict::Accepted,
        }
    }

    pub(crate) fn rejected(
        file: PathBuf,
        original: String,
        issues: Vec<LintIssue>,
        proposed: Option<String>,
        reason: RejectReason,
    ) -> Self {
        Self {
            file,
            original,
            issues,
            proposed,
            diff: None,
            verdict: Verdict::Rejected(reason),
        }
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    pub fn original(&self) -> &str {
        &self.original
    }

    /// Issues this candidate targets, in file order.
    pub fn issues(&self) -> &[LintIssue] {
        &self.issues
    }

    /// The extracted candidate body, when extraction got that far.
    pub fn proposed(&self) -> Option<&str> {
        self.proposed.as_deref()
    }

    /// Unified diff from original to proposed; present only when accepted.
    pub fn diff(&self) -> Option<&str> {
        self.diff.as_deref()
    }

    pub fn verdict(&self) -> &Verdict {
        &self.verdict
    }

    pub fn is_accepted(&self) -> bool {
        self.verdict.is_accepted()
    }

    pub fn reject_reason(&self) -> Option<&RejectReason> {
        match &self.verdict {
            Verdict::Rejected(reason) => Some(reason),
            Verdict::Accepted => None,
        }
    }
}
