//! codefix-lint: linting with uniform, deterministic results
//!
//! Provides:
//! - the [`LintIssue`] schema every linter is normalized into
//! - one adapter per supported [`Language`], selected through [`AdapterRegistry`]
//! - [`LintOrchestrator`] for repository runs and single-candidate re-lints
//! - extension-based language detection

pub mod adapter;
pub mod adapters;
pub mod detect;
pub mod error;
pub mod issue;
pub mod language;
pub mod orchestrator;
pub mod registry;

// Re-export key types
pub use adapter::{relative_path, run_linter, AdapterProvisioner, LintTarget, LinterAdapter, RawOutput};
pub use detect::detect_languages;
pub use error::LintError;
pub use issue::{count_at_or_above, normalize_issues, LintIssue, Severity};
pub use language::Language;
pub use orchestrator::LintOrchestrator;
pub use registry::AdapterRegistry;
