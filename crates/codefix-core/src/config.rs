//! Configuration file loading.
//!
//! Looks for an explicit path first, then `$HOME/.codefix/config.toml`.
//! Every section is optional; missing keys fall back to the defaults
//! below. CLI flags are applied on top by the binary.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::domain::OutputMode;
use crate::model::RunnerKind;

pub const CONFIG_DIR_NAME: &str = ".codefix";
pub const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodefixConfig {
    pub model: ModelConfig,
    pub lint: LintConfig,
    pub fix: FixConfig,
    pub env: EnvConfig,
    pub git: GitConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub runner: RunnerKind,
    /// Model name, or a GGUF path for llama.cpp.
    pub name: String,
    /// Ollama server base URL.
    pub endpoint: String,
    /// llama.cpp binary.
    pub llama_binary: PathBuf,
    pub timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            runner: RunnerKind::Ollama,
            name: "smollm2:135m".to_string(),
            endpoint: "http://localhost:11434".to_string(),
            llama_binary: PathBuf::from("llama-cli"),
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LintConfig {
    /// Per linter process.
    pub timeout_secs: u64,
}

impl Default for LintConfig {
    fn default() -> Self {
        Self { timeout_secs: 300 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FixConfig {
    /// Files synthesized in parallel.
    pub max_concurrency: usize,
    /// Largest allowed |proposed lines - original lines| / original lines.
    pub max_line_delta_ratio: f64,
    /// Absolute line delta always tolerated, for very small files.
    pub min_line_slack: usize,
    /// Re-lint candidates before accepting them.
    pub relint: bool,
    /// Source bytes included in a prompt.
    pub max_context_bytes: usize,
    /// Issues listed in a prompt.
    pub max_prompt_issues: usize,
}

impl Default for FixConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 2,
            max_line_delta_ratio: 0.5,
            min_line_slack: 3,
            relint: true,
            max_context_bytes: 32 * 1024,
            max_prompt_issues: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvConfig {
    /// Cache root; the system temp dir when unset.
    pub root: Option<PathBuf>,
    pub staleness_days: i64,
    /// Age used by `cleanup --older-than-hours` when no value is given.
    pub eviction_hours: i64,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            root: None,
            staleness_days: 7,
            eviction_hours: 24,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GitConfig {
    pub branch: String,
    pub remote: String,
    /// Push and open a pull/merge request after committing.
    pub push: bool,
    /// Delete and recreate the branch if it already exists.
    pub overwrite_branch: bool,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            branch: "codefixer-fixes".to_string(),
            remote: "origin".to_string(),
            push: true,
            overwrite_branch: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub mode: OutputMode,
    pub show_issues: bool,
    pub show_diff: bool,
}

impl CodefixConfig {
    pub fn model_timeout(&self) -> Duration {
        Duration::from_secs(self.model.timeout_secs)
    }

    pub fn lint_timeout(&self) -> Duration {
        Duration::from_secs(self.lint.timeout_secs)
    }
}

/// `$HOME/.codefix/config.toml`, if a home directory is known.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

/// Parse a config document. Missing sections and keys keep their defaults.
pub fn parse_config(contents: &str) -> Result<CodefixConfig, toml::de::Error> {
    toml::from_str(contents)
}

pub fn load_config(path: &Path) -> Result<CodefixConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Load `explicit` if given (it must exist), else the default path if it
/// exists, else defaults.
pub fn load_or_default(explicit: Option<&Path>) -> Result<CodefixConfig, ConfigError> {
    if let Some(path) = explicit {
        return load_config(path);
    }
    match default_config_path() {
        Some(path) if path.is_file() => {
            debug!(path = %path.display(), "loading config");
            load_config(&path)
        }
        _ => {
            debug!("no config file found, using defaults");
            Ok(CodefixConfig::default())
        }
    }
}
