//! Built-in linter adapters, one per [`Language`](crate::Language).

mod css;
mod go;
mod html;
mod java;
mod javascript;
mod python;
mod rust;
mod yaml;

pub use css::CssAdapter;
pub use go::GoAdapter;
pub use html::HtmlAdapter;
pub use java::JavaAdapter;
pub use javascript::JavaScriptAdapter;
pub use python::{parse_flake8, parse_mypy, PythonAdapter};
pub use rust::RustAdapter;
pub use yaml::YamlAdapter;

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use lint_env_manager::{run_command, CancelToken, CommandSpec};

/// Budget for a single provisioning step (venv creation, package install).
pub(crate) const PROVISION_TIMEOUT: Duration = Duration::from_secs(600);

/// Run a provisioning step and fail with its stderr when it exits nonzero.
pub(crate) async fn provision_step(spec: CommandSpec, cancel: &CancelToken) -> anyhow::Result<()> {
    let name = spec.display_name();
    let output = run_command(&spec.timeout(PROVISION_TIMEOUT), cancel)
        .await
        .with_context(|| format!("failed to run {name}"))?;
    if !output.success() {
        anyhow::bail!(
            "{} exited with status {}: {}",
            name,
            output.exit_code,
            output.stderr.trim()
        );
    }
    Ok(())
}

/// Create `<dir>/venv` and install `packages` into it.
pub(crate) async fn provision_venv(
    dir: &Path,
    packages: &[&str],
    cancel: &CancelToken,
) -> anyhow::Result<()> {
    let venv = dir.join("venv");
    provision_step(
        CommandSpec::new("python3").arg("-m").arg("venv").arg(&venv),
        cancel,
    )
    .await?;
    provision_step(
        CommandSpec::new(venv_bin(dir, "pip"))
            .args(["install", "--quiet", "--upgrade"])
            .args(packages.iter().copied()),
        cancel,
    )
    .await
}

/// Path of an executable installed in the environment's venv.
pub(crate) fn venv_bin(dir: &Path, tool: &str) -> PathBuf {
    dir.join("venv").join("bin").join(tool)
}

pub(crate) fn file_args(files: &[PathBuf]) -> Vec<OsString> {
    files.iter().map(|f| f.as_os_str().to_owned()).collect()
}
