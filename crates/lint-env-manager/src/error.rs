//! Error types for lint-env-manager

use thiserror::Error;

/// Errors that can occur while managing linter environments
#[derive(Error, Debug)]
pub enum EnvError {
    /// Provisioning ran and failed; the environment directory was torn down
    #[error("provisioning {language} environment failed: {source}")]
    ProvisioningFailed {
        language: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    /// A run-level cancellation interrupted the operation
    #[error("environment operation cancelled")]
    Cancelled,

    /// Release or lookup of an environment this manager never handed out
    #[error("unknown environment: {0}")]
    UnknownEnvironment(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Environment marker could not be encoded or decoded
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EnvError {
    /// Stable reason code used in run reports.
    pub fn code(&self) -> &'static str {
        match self {
            EnvError::ProvisioningFailed { .. } => "ProvisioningFailed",
            EnvError::Cancelled => "Cancelled",
            EnvError::UnknownEnvironment(_) | EnvError::Io(_) | EnvError::Json(_) => {
                "ProvisioningFailed"
            }
        }
    }
}

/// Errors from running an external process
#[derive(Error, Debug)]
pub enum ExecError {
    /// The program could not be started (missing binary, bad cwd, ...)
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The process outlived its time budget and was killed
    #[error("{program} timed out after {timeout_secs}s")]
    TimedOut { program: String, timeout_secs: u64 },

    /// The run was cancelled and the process was killed
    #[error("{program} cancelled")]
    Cancelled { program: String },

    /// IO error while collecting output
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExecError {
    /// Whether the program binary itself is missing.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ExecError::Spawn { source, .. } if source.kind() == std::io::ErrorKind::NotFound
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provisioning_failed_carries_cause() {
        let err = EnvError::ProvisioningFailed {
            language: "python".to_string(),
            source: "pip install exited with 1".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("python"));
        assert!(msg.contains("pip install exited with 1"));
        assert_eq!(err.code(), "ProvisioningFailed");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn spawn_not_found_is_detected() {
        let err = ExecError::Spawn {
            program: "flake8".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        };
        assert!(err.is_not_found());

        let err = ExecError::TimedOut {
            program: "flake8".to_string(),
            timeout_secs: 5,
        };
        assert!(!err.is_not_found());
    }
}
