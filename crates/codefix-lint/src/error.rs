//! Error types for codefix-lint

use lint_env_manager::ExecError;
use thiserror::Error;

/// Errors raised while linting one language
#[derive(Error, Debug)]
pub enum LintError {
    /// The linter timed out, could not start, or exited unexpectedly
    #[error("{linter} failed for {language}: {reason}")]
    LinterExecution {
        language: String,
        linter: String,
        reason: String,
    },

    /// Run-level cancellation killed the linter
    #[error("linting cancelled")]
    Cancelled,

    /// IO error (scratch files for re-lint)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LintError {
    /// Stable reason code used in run reports.
    pub fn code(&self) -> &'static str {
        match self {
            LintError::Cancelled => "Cancelled",
            LintError::LinterExecution { .. } | LintError::Io(_) => "LinterExecutionError",
        }
    }

    /// Translate a process failure for `linter` into a lint error.
    pub fn from_exec(language: &str, linter: &str, err: ExecError) -> Self {
        let reason = match err {
            ExecError::Cancelled { .. } => return LintError::Cancelled,
            ExecError::TimedOut { timeout_secs, .. } => format!("timed out after {timeout_secs}s"),
            other if other.is_not_found() => format!("{linter} is not installed in the environment"),
            other => other.to_string(),
        };
        LintError::LinterExecution {
            language: language.to_string(),
            linter: linter.to_string(),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_maps_to_linter_execution() {
        let err = LintError::from_exec(
            "python",
            "flake8",
            ExecError::TimedOut {
                program: "flake8".to_string(),
                timeout_secs: 30,
            },
        );
        assert_eq!(err.code(), "LinterExecutionError");
        assert!(err.to_string().contains("timed out after 30s"));
    }

    #[test]
    fn test_cancel_maps_to_cancelled() {
        let err = LintError::from_exec(
            "go",
            "golangci-lint",
            ExecError::Cancelled {
                program: "golangci-lint".to_string(),
            },
        );
        assert!(matches!(err, LintError::Cancelled));
    }
}
