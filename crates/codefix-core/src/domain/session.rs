//! Per-run state: repository snapshot, session maps and commit result.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use codefix_lint::{Language, LintIssue};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::candidate::FixCandidate;
use super::error::ReasonCode;

/// Repository state read at session start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    /// Absolute path of the work tree.
    pub path: PathBuf,

    /// Commit SHA of HEAD.
    pub head: String,

    /// Checked-out branch, `None` when HEAD is detached.
    pub branch: Option<String>,

    /// Whether tracked files have no uncommitted changes.
    pub clean: bool,
}

/// How the final report is rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(OutputMode::Text),
            "json" => Ok(OutputMode::Json),
            other => Err(format!("unknown output mode: {other}")),
        }
    }
}

/// A language that was not linted, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedLanguage {
    pub language: Language,
    pub code: ReasonCode,
    pub detail: String,
}

/// Everything one run learns. Lives for exactly one run.
#[derive(Debug, Clone, Serialize)]
pub struct FixSession {
    pub id: Uuid,
    pub repository: Repository,
    /// Branch fixes are committed to.
    pub branch: String,
    pub dry_run: bool,
    pub output_mode: OutputMode,
    pub started_at: DateTime<Utc>,
    pub languages: Vec<Language>,
    pub skipped: Vec<SkippedLanguage>,
    /// Issues per linted file (files with no issues map to an empty list).
    pub issues: BTreeMap<PathBuf, Vec<LintIssue>>,
    /// One candidate per file that had issues.
    pub candidates: BTreeMap<PathBuf, FixCandidate>,
}

impl FixSession {
    pub fn new(repository: Repository, branch: impl Into<String>, dry_run: bool, output_mode: OutputMode) -> Self {
        Self {
            id: Uuid::new_v4(),
            repository,
            branch: branch.into(),
            dry_run,
            output_mode,
            started_at: Utc::now(),
            languages: Vec::new(),
            skipped: Vec::new(),
            issues: BTreeMap::new(),
            candidates: BTreeMap::new(),
        }
    }

    pub fn total_issues(&self) -> usize {
        self.issues.values().map(Vec::len).sum()
    }

    pub fn files_with_issues(&self) -> usize {
        self.issues.values().filter(|v| !v.is_empty()).count()
    }

    /// Accepted candidates in path order.
    pub fn accepted(&self) -> impl Iterator<Item = &FixCandidate> {
        self.candidates.values().filter(|c| c.is_accepted())
    }

    pub fn files_with_fixes(&self) -> usize {
        self.accepted().count()
    }
}

/// Result of a successful, non-dry-run commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitResult {
    pub branch: String,
    pub commit: String,
    pub pushed: bool,
    /// URL of the opened pull/merge request.
    pub request_url: Option<String>,
}
