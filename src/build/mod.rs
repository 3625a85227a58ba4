//! Running a site generator inside a working tree.

pub mod variant;

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use crate::process::{ProcessError, ProcessRunner};

pub use variant::{BuildStep, BuildVariant, detect_variant};

/// Errors from the build stage.
#[derive(Debug, Error)]
pub enum BuildError {
    /// A required step exited unsuccessfully.
    #[error("`{command}` failed with {status}")]
    StepFailed {
        command: String,
        status: String,
        /// Captured stderr, or stdout when stderr was empty.
        output: String,
    },

    /// A step could not be run to completion (including timeouts).
    #[error(transparent)]
    Process(#[from] ProcessError),

    /// The generator succeeded but produced no output directory.
    #[error("build output directory missing: {}", .0.display())]
    MissingOutput(PathBuf),
}

impl BuildError {
    /// Text suitable for a failure notification.
    pub fn excerpt(&self) -> String {
        match self {
            BuildError::StepFailed { output, .. } if !output.is_empty() => output.clone(),
            other => other.to_string(),
        }
    }
}

/// Runs every step of `variant` in `tree` and returns the output directory.
pub async fn run_build<R: ProcessRunner>(
    runner: &R,
    variant: BuildVariant,
    tree: &Path,
    timeout: Duration,
) -> Result<PathBuf, BuildError> {
    for step in variant.steps() {
        let spec = step.command(tree, timeout);
        let command = spec.display();
        let output = runner.run(spec).await?;

        if output.success() {
            info!(command = %command, "Build step finished");
            continue;
        }

        if step.required {
            warn!(
                command = %command,
                status = %output.exit_description(),
                stdout = %output.stdout,
                stderr = %output.stderr,
                "Build step failed"
            );
            return Err(BuildError::StepFailed {
                command,
                status: output.exit_description(),
                output: output.diagnostic().to_string(),
            });
        }

        warn!(
            command = %command,
            status = %output.exit_description(),
            "Optional build step failed, continuing"
        );
    }

    let out_dir = tree.join(variant.output_dir());
    if tokio::fs::metadata(&out_dir)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
    {
        Ok(out_dir)
    } else {
        Err(BuildError::MissingOutput(out_dir))
    }
}
