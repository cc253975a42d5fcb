//! Workflow state machine.

use serde::{Deserialize, Serialize};

/// One state of a run.
///
/// ```text
/// Init -> Detecting -> Linting -> Fixing -> DryRunReport -> Done
///                                        -> Applying -> Committing -> Done
///                                                                 -> Pushing -> PrOpened -> Done
/// ```
/// `Failed` is reachable from every non-terminal stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Init,
    Detecting,
    Linting,
    Fixing,
    DryRunReport,
    Applying,
    Committing,
    Pushing,
    PrOpened,
    Done,
    Failed,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Init => "init",
            Stage::Detecting => "detecting",
            Stage::Linting => "linting",
            Stage::Fixing => "fixing",
            Stage::DryRunReport => "dry_run_report",
            Stage::Applying => "applying",
            Stage::Committing => "committing",
            Stage::Pushing => "pushing",
            Stage::PrOpened => "pr_opened",
            Stage::Done => "done",
            Stage::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Done | Stage::Failed)
    }

    /// Whether `next` is a legal successor of `self`.
    pub fn can_advance_to(&self, next: Stage) -> bool {
        if next == Stage::Failed {
            return !self.is_terminal();
        }
        matches!(
            (self, next),
            (Stage::Init, Stage::Detecting)
                | (Stage::Detecting, Stage::Linting)
                | (Stage::Linting, Stage::Fixing)
                | (Stage::Fixing, Stage::DryRunReport)
                | (Stage::Fixing, Stage::Applying)
                // Nothing accepted: there is nothing to apply.
                | (Stage::Fixing, Stage::Done)
                | (Stage::DryRunReport, Stage::Done)
                | (Stage::Applying, Stage::Committing)
                | (Stage::Committing, Stage::Pushing)
                | (Stage::Committing, Stage::Done)
                | (Stage::Pushing, Stage::PrOpened)
                | (Stage::Pushing, Stage::Done)
                | (Stage::PrOpened, Stage::Done)
        )
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
