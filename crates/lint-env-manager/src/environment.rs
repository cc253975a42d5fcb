//! Environment identity, lifecycle state and on-disk marker.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::fingerprint::repository_fingerprint;
use crate::Result;

/// Marker written into a ready environment directory.
pub const MARKER_FILE: &str = ".codefix-env.json";

/// Cache key: one environment per (language, repository).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EnvironmentKey {
    /// Language identifier (`python`, `javascript`, ...)
    pub language: String,
    /// Fingerprint of the repository the environment serves
    pub repo_fingerprint: String,
}

impl EnvironmentKey {
    pub fn new(language: impl Into<String>, repo_fingerprint: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            repo_fingerprint: repo_fingerprint.into(),
        }
    }

    /// Key for a language in the repository at `repo`.
    pub fn for_repository(language: &str, repo: &Path) -> Result<Self> {
        Ok(Self::new(language, repository_fingerprint(repo)?))
    }

    /// Directory name under the cache root.
    pub fn dir_name(&self) -> String {
        format!("{}_{}", self.language, self.repo_fingerprint)
    }
}

impl std::fmt::Display for EnvironmentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.language, self.repo_fingerprint)
    }
}

/// Lifecycle of a cached environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvironmentState {
    Provisioning,
    Ready,
    Stale,
    Deleted,
}

impl std::fmt::Display for EnvironmentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EnvironmentState::Provisioning => "provisioning",
            EnvironmentState::Ready => "ready",
            EnvironmentState::Stale => "stale",
            EnvironmentState::Deleted => "deleted",
        };
        f.write_str(s)
    }
}

/// An isolated directory holding one language's linter toolchain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageEnvironment {
    pub key: EnvironmentKey,
    /// Absolute path of the environment directory
    pub dir: PathBuf,
    pub state: EnvironmentState,
    /// When provisioning completed
    pub created_at: DateTime<Utc>,
    /// Last time a run released this environment
    pub last_used_at: DateTime<Utc>,
}

impl LanguageEnvironment {
    pub fn path(&self) -> &Path {
        &self.dir
    }

    pub fn language(&self) -> &str {
        &self.key.language
    }

    /// Persist the marker so later processes can reuse this environment.
    pub fn write_marker(&self) -> Result<()> {
        let json = serde_json::to_vec_pretty(self)?;
        std::fs::write(self.dir.join(MARKER_FILE), json)?;
        Ok(())
    }

    /// Load the marker from `dir`, if one exists and parses.
    ///
    /// The stored path is replaced with `dir` so a moved cache root still
    /// resolves correctly.
    pub fn read_marker(dir: &Path) -> Option<Self> {
        let bytes = std::fs::read(dir.join(MARKER_FILE)).ok()?;
        let mut env: LanguageEnvironment = serde_json::from_slice(&bytes).ok()?;
        env.dir = dir.to_path_buf();
        Some(env)
    }
}
