//! Serializable run summary and the text shown to people: console output,
//! commit messages and pull request bodies.

use std::path::PathBuf;

use codefix_lint::{Language, LintIssue};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::{
    CommitResult, FailureReason, FixSession, OutputMode, ReasonCode, SkippedLanguage, Stage,
};
use crate::workflow::RunOutcome;

/// Optional per-file sections.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReportDetail {
    pub show_issues: bool,
    pub show_diff: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FileReport {
    pub file: PathBuf,
    pub issue_count: usize,
    /// `accepted` / `rejected`; absent when no candidate was produced.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verdict: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<ReasonCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issues: Option<Vec<LintIssue>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct Totals {
    pub total_issues: usize,
    pub files_with_issues: usize,
    /// Files with an accepted candidate.
    pub files_with_fixes: usize,
    /// Files changed by the commit; zero for dry runs and failed runs.
    pub files_fixed: usize,
}

/// Everything a presentation layer needs about one run.
#[derive(Debug, Clone, Serialize)]
pub struct FixReport {
    pub session_id: Uuid,
    pub repository: PathBuf,
    pub branch: String,
    pub dry_run: bool,
    pub stage: Stage,
    pub stages: Vec<Stage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureReason>,
    pub languages: Vec<Language>,
    pub skipped: Vec<SkippedLanguage>,
    pub files: Vec<FileReport>,
    pub totals: Totals,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit: Option<CommitResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub push_error: Option<String>,
}

impl FixReport {
    pub fn build(outcome: &RunOutcome, detail: ReportDetail) -> Self {
        let session = &outcome.session;
        let files = session
            .issues
            .iter()
            .filter(|(_, issues)| !issues.is_empty())
            .map(|(file, issues)| {
                let candidate = session.candidates.get(file);
                let reason = candidate.and_then(|c| c.reject_reason());
                FileReport {
                    file: file.clone(),
                    issue_count: issues.len(),
                    verdict: candidate.map(|c| if c.is_accepted() { "accepted" } else { "rejected" }),
                    reason: reason.map(|r| r.code()),
                    detail: reason.and_then(|r| r.detail()).map(str::to_string),
                    issues: detail.show_issues.then(|| issues.clone()),
                    diff: candidate
                        .and_then(|c| c.diff())
                        .filter(|_| detail.show_diff)
                        .map(str::to_string),
                }
            })
            .collect();

        let files_with_fixes = session.files_with_fixes();
        Self {
            session_id: session.id,
            repository: session.repository.path.clone(),
            branch: session.branch.clone(),
            dry_run: session.dry_run,
            stage: outcome.stage,
            stages: outcome.stages.clone(),
            failure: outcome.failure.clone(),
            languages: session.languages.clone(),
            skipped: session.skipped.clone(),
            files,
            totals: Totals {
                total_issues: session.total_issues(),
                files_with_issues: session.files_with_issues(),
                files_with_fixes,
                files_fixed: if outcome.commit.is_some() { files_with_fixes } else { 0 },
            },
            commit: outcome.commit.clone(),
            push_error: outcome.push_error.clone(),
        }
    }

    pub fn render(&self, mode: OutputMode) -> serde_json::Result<String> {
        match mode {
            OutputMode::Json => serde_json::to_string_pretty(self),
            OutputMode::Text => Ok(self.render_text()),
        }
    }

    pub fn render_text(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "CodeFix run {} on {}\n",
            self.session_id,
            self.repository.display()
        ));
        if self.dry_run {
            out.push_str("Mode: dry run (no files or refs changed)\n");
        } else {
            out.push_str(&format!("Branch: {}\n", self.branch));
        }

        let languages: Vec<&str> = self.languages.iter().map(|l| l.as_str()).collect();
        out.push_str(&format!(
            "Languages: {}\n",
            if languages.is_empty() { "none".to_string() } else { languages.join(", ") }
        ));
        for skipped in &self.skipped {
            out.push_str(&format!(
                "  skipped {}: {} ({})\n",
                skipped.language, skipped.code, skipped.detail
            ));
        }

        if !self.files.is_empty() {
            out.push_str("\nFiles:\n");
        }
        for file in &self.files {
            out.push_str(&format!(
                "  {}: {} issue{}",
                file.file.display(),
                file.issue_count,
                if file.issue_count == 1 { "" } else { "s" }
            ));
            match (file.verdict, file.reason) {
                (Some(verdict), Some(reason)) => {
                    out.push_str(&format!(", {verdict} ({reason}"));
                    if let Some(detail) = &file.detail {
                        out.push_str(&format!(": {detail}"));
                    }
                    out.push(')');
                }
                (Some(verdict), None) => out.push_str(&format!(", {verdict}")),
                _ => {}
            }
            out.push('\n');

            for issue in file.issues.iter().flatten() {
                out.push_str(&format!(
                    "    L{}:{} {} {} {} [{}]\n",
                    issue.line, issue.column, issue.severity, issue.rule, issue.message, issue.source
                ));
            }
            if let Some(diff) = &file.diff {
                for line in diff.lines() {
                    out.push_str(&format!("    {line}\n"));
                }
            }
        }

        let t = &self.totals;
        out.push_str(&format!(
            "\nTotals: {} issues in {} files, {} fixes accepted, {} files fixed\n",
            t.total_issues, t.files_with_issues, t.files_with_fixes, t.files_fixed
        ));

        if let Some(commit) = &self.commit {
            out.push_str(&format!("Commit: {} on {}", short_sha(&commit.commit), commit.branch));
            if commit.pushed {
                out.push_str(" (pushed)");
            }
            out.push('\n');
            if let Some(url) = &commit.request_url {
                out.push_str(&format!("Pull request: {url}\n"));
            }
        }
        if let Some(err) = &self.push_error {
            out.push_str(&format!("Push/PR skipped: {err}\n"));
        }

        match &self.failure {
            Some(failure) => out.push_str(&format!("Result: FAILED ({failure})\n")),
            None => out.push_str(&format!("Result: {}\n", self.stage)),
        }
        out
    }
}

fn short_sha(sha: &str) -> &str {
    sha.get(..12).unwrap_or(sha)
}

/// Commit message for the accepted fixes in `session`.
pub fn commit_message(session: &FixSession) -> String {
    let accepted: Vec<_> = session.accepted().collect();
    let issues: usize = accepted.iter().map(|c| c.issues().len()).sum();
    let mut msg = format!(
        "Auto fixes by CodeFixer\n\nFixed {} issue{} in {} file{}:\n",
        issues,
        if issues == 1 { "" } else { "s" },
        accepted.len(),
        if accepted.len() == 1 { "" } else { "s" }
    );
    for candidate in accepted {
        msg.push_str(&format!(
            "\n- {} ({} issue{})",
            candidate.file().display(),
            candidate.issues().len(),
            if candidate.issues().len() == 1 { "" } else { "s" }
        ));
    }
    msg.push('\n');
    msg
}

pub fn request_title(session: &FixSession) -> String {
    format!("Auto fixes by CodeFixer - {} files", session.files_with_fixes())
}

/// Pull/merge request body listing fixed files and the issues addressed.
pub fn request_body(session: &FixSession) -> String {
    let accepted: Vec<_> = session.accepted().collect();
    let issues: usize = accepted.iter().map(|c| c.issues().len()).sum();

    let mut body = String::from("## Summary\n\n");
    body.push_str("This PR contains automated fixes for linting issues detected by CodeFixer.\n\n");
    body.push_str("### Changes\n");
    body.push_str(&format!(
        "- Fixed {} files\n- Resolved {} linting issues\n\n",
        accepted.len(),
        issues
    ));

    body.push_str("### Files Modified\n");
    for candidate in &accepted {
        body.push_str(&format!("- `{}`\n", candidate.file().display()));
    }

    body.push_str("\n### Linting Issues Fixed\n");
    for candidate in &accepted {
        body.push_str(&format!("\n**{}:**\n", candidate.file().display()));
        for issue in candidate.issues() {
            body.push_str(&format!(
                "- Line {}: {} - {}\n",
                issue.line, issue.rule, issue.message
            ));
        }
    }
    body
}
