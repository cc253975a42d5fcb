//! The uniform issue schema every adapter normalizes into.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Issue severity, ordered `Info < Warning < Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    pub const ALL: [Severity; 3] = [Severity::Info, Severity::Warning, Severity::Error];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single linter diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LintIssue {
    /// Repository-relative path.
    pub file: PathBuf,

    /// 1-based line.
    pub line: u32,

    /// 1-based column (1 when the linter reports none).
    pub column: u32,

    pub severity: Severity,

    /// Rule identifier, e.g. `F401` or `no-unused-vars`.
    pub rule: String,

    pub message: String,

    /// Name of the linter that produced the issue.
    pub source: String,
}

/// Deduplicate by (file, line, column, rule) and sort by file, line, column.
///
/// The first occurrence of a key wins, so linter order decides which
/// message survives. The sort is stable, keeping linter order for issues at
/// the same position.
pub fn normalize_issues(issues: Vec<LintIssue>) -> Vec<LintIssue> {
    let mut seen = std::collections::HashSet::new();
    let mut unique: Vec<LintIssue> = Vec::with_capacity(issues.len());
    for issue in issues {
        let key = (issue.file.clone(), issue.line, issue.column, issue.rule.clone());
        if seen.insert(key) {
            unique.push(issue);
        }
    }
    unique.sort_by(|a, b| (&a.file, a.line, a.column).cmp(&(&b.file, b.line, b.column)));
    unique
}

/// Count issues whose severity is at or above `threshold`.
pub fn count_at_or_above(issues: &[LintIssue], threshold: Severity) -> usize {
    issues.iter().filter(|i| i.severity >= threshold).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issue(file: &str, line: u32, column: u32, rule: &str, source: &str) -> LintIssue {
        LintIssue {
            file: PathBuf::from(file),
            line,
            column,
            severity: Severity::Warning,
            rule: rule.to_string(),
            message: format!("{rule} from {source}"),
            source: source.to_string(),
        }
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Error > Severity::Warning);
        assert!(Severity::Warning > Severity::Info);
    }

    #[test]
    fn test_normalize_dedups_first_wins() {
        let issues = vec![
            issue("a.py", 3, 1, "F401", "flake8"),
            issue("a.py", 3, 1, "F401", "mypy"),
            issue("a.py", 3, 1, "E225", "flake8"),
        ];
        let out = normalize_issues(issues);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].source, "flake8");
        assert_eq!(out[0].rule, "F401");
    }

    #[test]
    fn test_normalize_sorts_by_file_line_column() {
        let issues = vec![
            issue("b.py", 1, 1, "X", "l"),
            issue("a.py", 10, 2, "X", "l"),
            issue("a.py", 2, 9, "X", "l"),
            issue("a.py", 2, 3, "Y", "l"),
        ];
        let out = normalize_issues(issues);
        let positions: Vec<_> = out
            .iter()
            .map(|i| (i.file.to_str().unwrap(), i.line, i.column))
            .collect();
        assert_eq!(
            positions,
            vec![("a.py", 2, 3), ("a.py", 2, 9), ("a.py", 10, 2), ("b.py", 1, 1)]
        );
    }

    #[test]
    fn test_count_at_or_above() {
        let mut issues = vec![
            issue("a.py", 1, 1, "A", "l"),
            issue("a.py", 2, 1, "B", "l"),
            issue("a.py", 3, 1, "C", "l"),
        ];
        issues[0].severity = Severity::Error;
        issues[2].severity = Severity::Info;
        assert_eq!(count_at_or_above(&issues, Severity::Error), 1);
        assert_eq!(count_at_or_above(&issues, Severity::Warning), 2);
        assert_eq!(count_at_or_above(&issues, Severity::Info), 3);
    }
}
