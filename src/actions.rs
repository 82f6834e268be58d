//! Action dispatch implementations
//!
//! An action identifier resolved by the gesture engine is either a shell
//! command line (run via `sh -c`) or, in dry-run mode, just logged. Dispatch
//! is fire-and-forget from the engine's point of view; the returned error is
//! only ever logged by the caller.

use crate::ports::ActionDispatchPort;
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use tracing::{debug, info, warn};

/// Runs action identifiers as shell command lines
pub struct CommandDispatch;

#[async_trait]
impl ActionDispatchPort for CommandDispatch {
    async fn perform(&self, action_id: &str) -> Result<()> {
        debug!(action = %action_id, "running action command");

        let output = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(action_id)
            .output()
            .await
            .with_context(|| format!("failed to spawn action command: {action_id}"))?;

        if output.status.success() {
            debug!(action = %action_id, "action command finished");
            Ok(())
        } else {
            warn!(
                action = %action_id,
                status = %output.status,
                stderr = %String::from_utf8_lossy(&output.stderr),
                "action command failed"
            );
            Err(anyhow!("action command exited with {}", output.status))
        }
    }
}

/// Dry-run dispatch: logs what would have run and does nothing
pub struct LogDispatch;

#[async_trait]
impl ActionDispatchPort for LogDispatch {
    async fn perform(&self, action_id: &str) -> Result<()> {
        info!(action = %action_id, "dry-run: would dispatch action");
        Ok(())
    }
}
