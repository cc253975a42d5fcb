//! lint-env-manager: isolated, cached linter environments for CodeFix
//!
//! Each (language, repository) pair gets its own directory holding that
//! language's linter toolchain. Environments survive across runs and are
//! evicted by age or by manual cleanup.
//!
//! ## Layer 1 - Environment/Tooling
//!
//! Focus: exclusive provisioning per key, explicit hold tracking, and
//! process execution that honours timeouts and run-level cancellation.

pub mod cancel;
pub mod clock;
pub mod environment;
pub mod error;
pub mod exec;
pub mod fingerprint;
mod lock;
pub mod manager;

pub use cancel::CancelToken;
pub use clock::{Clock, ManualClock, SystemClock};
pub use environment::{EnvironmentKey, EnvironmentState, LanguageEnvironment, MARKER_FILE};
pub use error::{EnvError, ExecError};
pub use exec::{run_command, CommandSpec, ExecOutput};
pub use fingerprint::repository_fingerprint;
pub use manager::{EnvironmentManager, EvictionReport, ManagerConfig, Provisioner};

/// Result type for environment operations
pub type Result<T> = std::result::Result<T, EnvError>;
