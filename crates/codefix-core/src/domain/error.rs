//! Reason codes and terminal failures.

use serde::{Deserialize, Serialize};

use super::stage::Stage;

/// Stable code attached to every non-success outcome in a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReasonCode {
    ProvisioningFailed,
    LinterExecutionError,
    ModelUnavailable,
    UnparsableOutput,
    SizeAnomaly,
    NoChange,
    RegressedIssues,
    /// The source file could not be read for synthesis.
    UnreadableSource,
    /// The synthesis task for a file crashed before producing a verdict.
    SynthesisAborted,
    BranchExists,
    DirtyOrInvalidRepo,
    ApplyRolledBack,
    CommitFailed,
    PushFailed,
    /// The run was cancelled by the user or a deadline.
    Cancelled,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::ProvisioningFailed => "ProvisioningFailed",
            ReasonCode::LinterExecutionError => "LinterExecutionError",
            ReasonCode::ModelUnavailable => "ModelUnavailable",
            ReasonCode::UnparsableOutput => "UnparsableOutput",
            ReasonCode::SizeAnomaly => "SizeAnomaly",
            ReasonCode::NoChange => "NoChange",
            ReasonCode::RegressedIssues => "RegressedIssues",
            ReasonCode::UnreadableSource => "UnreadableSource",
            ReasonCode::SynthesisAborted => "SynthesisAborted",
            ReasonCode::BranchExists => "BranchExists",
            ReasonCode::DirtyOrInvalidRepo => "DirtyOrInvalidRepo",
            ReasonCode::ApplyRolledBack => "ApplyRolledBack",
            ReasonCode::CommitFailed => "CommitFailed",
            ReasonCode::PushFailed => "PushFailed",
            ReasonCode::Cancelled => "Cancelled",
        }
    }

    /// Map the code string used by lower layers (`EnvError::code`,
    /// `LintError::code`) back to a reason code.
    pub fn from_code(code: &str) -> Option<ReasonCode> {
        let code = match code {
            "ProvisioningFailed" => ReasonCode::ProvisioningFailed,
            "LinterExecutionError" => ReasonCode::LinterExecutionError,
            "ModelUnavailable" => ReasonCode::ModelUnavailable,
            "UnparsableOutput" => ReasonCode::UnparsableOutput,
            "SizeAnomaly" => ReasonCode::SizeAnomaly,
            "NoChange" => ReasonCode::NoChange,
            "RegressedIssues" => ReasonCode::RegressedIssues,
            "UnreadableSource" => ReasonCode::UnreadableSource,
            "SynthesisAborted" => ReasonCode::SynthesisAborted,
            "BranchExists" => ReasonCode::BranchExists,
            "DirtyOrInvalidRepo" => ReasonCode::DirtyOrInvalidRepo,
            "ApplyRolledBack" => ReasonCode::ApplyRolledBack,
            "CommitFailed" => ReasonCode::CommitFailed,
            "PushFailed" => ReasonCode::PushFailed,
            "Cancelled" => ReasonCode::Cancelled,
            _ => return None,
        };
        Some(code)
    }
}

impl std::fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unrecoverable error that ended a run in `Failed(stage, reason)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{stage} failed with {code}: {detail}")]
pub struct FailureReason {
    /// Stage the run was in when it failed.
    pub stage: Stage,
    #[serde(rename = "reason")]
    pub code: ReasonCode,
    pub detail: String,
}

impl FailureReason {
    pub fn new(stage: Stage, code: ReasonCode, detail: impl Into<String>) -> Self {
        Self {
            stage,
            code,
            detail: detail.into(),
        }
    }
}
