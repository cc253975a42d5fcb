//! CodeFix Core Library
//!
//! Fix synthesis, validation and the branch/commit workflow, on top of
//! `lint-env-manager` (environments) and `codefix-lint` (linting).

pub mod config;
pub mod diff;
pub mod domain;
pub mod extract;
pub mod git;
pub mod hosting;
pub mod model;
pub mod obs;
pub mod report;
pub mod synthesize;
pub mod telemetry;
pub mod workflow;

pub use config::{load_or_default, CodefixConfig, ConfigError};

pub use domain::{
    CommitResult, FailureReason, FixCandidate, FixSession, OutputMode, ReasonCode, RejectReason,
    Repository, SkippedLanguage, Stage, Verdict,
};

pub use extract::{extract_code, ExtractError};

pub use git::{capture_head_sha, is_git_repo, GitError};

pub use hosting::{CliHost, HostError, HostKind, VcsHost};

pub use model::{
    runner_from_config, CommandModelRunner, ModelError, ModelRunner, OllamaClient, RunnerKind,
};

pub use report::{FixReport, ReportDetail};

pub use synthesize::{AdapterRelinter, FixSynthesizer, Relinter, SynthesisConfig};

pub use workflow::{FileSink, FsSink, RunOutcome, WorkflowController, WorkflowOptions};
