//! Local model runners.
//!
//! The synthesizer only sees [`ModelRunner::generate`]: a prompt goes in,
//! arbitrary text comes out, or the call fails. Three runners exist:
//! the Ollama HTTP API, the `ollama run` CLI, and llama.cpp's `llama-cli`.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lint_env_manager::{run_command, CancelToken, CommandSpec, ExecError};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::debug;

use crate::config::ModelConfig;

/// Errors from a model call.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Runner not reachable (connection refused, binary missing).
    #[error("model runner unavailable: {0}")]
    Unavailable(String),

    #[error("model call timed out after {0}s")]
    Timeout(u64),

    #[error("model call cancelled")]
    Cancelled,

    /// The runner answered but the call failed.
    #[error("model call failed: {0}")]
    Failed(String),
}

impl ModelError {
    /// Whether a retry might succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, ModelError::Unavailable(_) | ModelError::Timeout(_))
    }
}

/// Text generation backend.
#[async_trait]
pub trait ModelRunner: Send + Sync {
    /// Short runner name for logs.
    fn name(&self) -> &str;

    async fn generate(
        &self,
        prompt: &str,
        timeout: Duration,
        cancel: &CancelToken,
    ) -> Result<String, ModelError>;
}

/// Which runner to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RunnerKind {
    /// Ollama HTTP API.
    #[default]
    #[serde(rename = "ollama")]
    Ollama,
    /// `ollama run <model> <prompt>`.
    #[serde(rename = "ollama-cli")]
    OllamaCli,
    /// `llama-cli -m <model> -p <prompt>`.
    #[serde(rename = "llama.cpp")]
    LlamaCpp,
}

impl RunnerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunnerKind::Ollama => "ollama",
            RunnerKind::OllamaCli => "ollama-cli",
            RunnerKind::LlamaCpp => "llama.cpp",
        }
    }
}

impl std::fmt::Display for RunnerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunnerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ollama" => Ok(RunnerKind::Ollama),
            "ollama-cli" => Ok(RunnerKind::OllamaCli),
            "llama.cpp" | "llama-cpp" | "llamacpp" => Ok(RunnerKind::LlamaCpp),
            other => Err(format!("unknown model runner: {other}")),
        }
    }
}

/// Build the runner described by `config`.
pub fn runner_from_config(config: &ModelConfig) -> Result<Arc<dyn ModelRunner>, ModelError> {
    let runner: Arc<dyn ModelRunner> = match config.runner {
        RunnerKind::Ollama => Arc::new(OllamaClient::new(&config.endpoint, &config.name)?),
        RunnerKind::OllamaCli => Arc::new(CommandModelRunner::ollama_cli("ollama", &config.name)),
        RunnerKind::LlamaCpp => Arc::new(CommandModelRunner::llama_cpp(
            &config.llama_binary,
            &config.name,
        )),
    };
    Ok(runner)
}

// ---------------------------------------------------------------------------
// Ollama HTTP
// ---------------------------------------------------------------------------

/// Client for a local Ollama server.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: String,
    model: String,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Debug, Deserialize)]
struct ModelTag {
    name: String,
}

impl OllamaClient {
    pub fn new(base_url: &str, model: &str) -> Result<Self, ModelError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("codefix/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ModelError::Failed(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            http,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Names of the models the server has pulled.
    pub async fn list_models(&self) -> Result<Vec<String>, ModelError> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .http
            .get(&url)
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| classify_http_error(e, 10))?;
        if !response.status().is_success() {
            return Err(ModelError::Failed(format!(
                "GET /api/tags returned {}",
                response.status()
            )));
        }
        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| ModelError::Failed(format!("invalid /api/tags response: {e}")))?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    async fn request(&self, prompt: &str, timeout: Duration) -> Result<String, ModelError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": { "temperature": 0.1 }
        });
        let response = self
            .http
            .post(&url)
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_http_error(e, timeout.as_secs()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ModelError::Failed(format!(
                "POST /api/generate returned {status}: {}",
                text.trim()
            )));
        }
        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| classify_http_error(e, timeout.as_secs()))?;
        Ok(parsed.response)
    }
}

fn classify_http_error(err: reqwest::Error, timeout_secs: u64) -> ModelError {
    if err.is_timeout() {
        ModelError::Timeout(timeout_secs)
    } else if err.is_connect() {
        ModelError::Unavailable(err.to_string())
    } else if err.is_decode() {
        ModelError::Failed(format!("invalid response body: {err}"))
    } else {
        ModelError::Failed(err.to_string())
    }
}

#[async_trait]
impl ModelRunner for OllamaClient {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn generate(
        &self,
        prompt: &str,
        timeout: Duration,
        cancel: &CancelToken,
    ) -> Result<String, ModelError> {
        debug!(model = %self.model, prompt_bytes = prompt.len(), "calling ollama");
        tokio::select! {
            result = self.request(prompt, timeout) => result,
            _ = cancel.cancelled() => Err(ModelError::Cancelled),
        }
    }
}

// ---------------------------------------------------------------------------
// Process-based runners
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CommandStyle {
    OllamaCli,
    LlamaCpp,
}

/// A runner that shells out once per prompt.
#[derive(Debug, Clone)]
pub struct CommandModelRunner {
    style: CommandStyle,
    program: PathBuf,
    model: String,
}

impl CommandModelRunner {
    pub fn ollama_cli(program: impl Into<PathBuf>, model: &str) -> Self {
        Self {
            style: CommandStyle::OllamaCli,
            program: program.into(),
            model: model.to_string(),
        }
    }

    /// `model` is a path to a GGUF file.
    pub fn llama_cpp(program: impl Into<PathBuf>, model: &str) -> Self {
        Self {
            style: CommandStyle::LlamaCpp,
            program: program.into(),
            model: model.to_string(),
        }
    }

    fn command(&self, prompt: &str, timeout: Duration) -> CommandSpec {
        let spec = CommandSpec::new(self.program.as_os_str()).timeout(timeout);
        match self.style {
            CommandStyle::OllamaCli => spec.arg("run").arg(&self.model).arg(prompt),
            CommandStyle::LlamaCpp => spec
                .arg("-m")
                .arg(&self.model)
                .arg("-p")
                .arg(prompt)
                .args([
                    "--temp",
                    "0.1",
                    "--repeat-penalty",
                    "1.1",
                    "--ctx-size",
                    "4096",
                    "--no-display-prompt",
                ]),
        }
    }
}

#[async_trait]
impl ModelRunner for CommandModelRunner {
    fn name(&self) -> &str {
        match self.style {
            CommandStyle::OllamaCli => "ollama-cli",
            CommandStyle::LlamaCpp => "llama.cpp",
        }
    }

    async fn generate(
        &self,
        prompt: &str,
        timeout: Duration,
        cancel: &CancelToken,
    ) -> Result<String, ModelError> {
        let spec = self.command(prompt, timeout);
        let output = run_command(&spec, cancel).await.map_err(|e| match e {
            ExecError::TimedOut { timeout_secs, .. } => ModelError::Timeout(timeout_secs),
            ExecError::Cancelled { .. } => ModelError::Cancelled,
            other if other.is_not_found() => ModelError::Unavailable(format!(
                "{} not found",
                self.program.display()
            )),
            other => ModelError::Failed(other.to_string()),
        })?;

        if !output.success() {
            let stderr = output.stderr.trim().to_string();
            let lower = stderr.to_ascii_lowercase();
            if lower.contains("could not connect") || lower.contains("connection refused") {
                return Err(ModelError::Unavailable(stderr));
            }
            return Err(ModelError::Failed(format!(
                "{} exited with status {}: {}",
                self.name(),
                output.exit_code,
                stderr
            )));
        }
        Ok(output.stdout)
    }
}
