//! Domain models for a fix run.
//!
//! - `FixSession`: everything one run learns, keyed by file path
//! - `FixCandidate`: a proposed rewrite of one file and its verdict
//! - `Stage`: the workflow state machine
//! - `ReasonCode`: stable codes for every skipped language, rejected file
//!   and terminal failure

pub mod candidate;
pub mod error;
pub mod session;
pub mod stage;

pub use candidate::{FixCandidate, RejectReason, Verdict};
pub use error::{FailureReason, ReasonCode};
pub use session::{CommitResult, FixSession, OutputMode, Repository, SkippedLanguage};
pub use stage::Stage;
