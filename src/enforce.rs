//! Enforcement of block verdicts.
//!
//! Executes the minimal-damage corrective action for a blocked container.
//! State is always re-queried from the runtime first; the triggering event is
//! stale by the time enforcement runs.

use crate::runtime::{ContainerRuntime, RuntimeError};

/// Enforcement posture selected on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnforceMode {
    /// Stop blocked containers but never remove them.
    Safe,
    /// Remove blocked containers outright.
    Strict,
}

/// What enforcement actually did to the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnforcementOutcome {
    /// The container was running and was stopped (safe mode).
    Stopped,
    /// The container was running, then stopped and removed (strict mode).
    StoppedAndRemoved,
    /// The container was already stopped and was removed (strict mode).
    Removed,
    /// The container was already stopped and stays put for inspection
    /// (safe mode).
    LeftInPlace,
    /// The container disappeared before or during enforcement. Informational,
    /// not an error: someone else already did the work.
    AlreadyGone,
}

/// Apply the enforcement action for a blocked container.
///
/// | Mode   | Running            | Stopped        |
/// |--------|--------------------|----------------|
/// | Strict | stop then remove   | remove         |
/// | Safe   | stop only          | leave in place |
///
/// # Errors
///
/// Propagates runtime failures other than `NotFound`. Callers log a warning
/// and rely on the cached block verdict to retry on the container's next
/// lifecycle event.
pub async fn enforce<R: ContainerRuntime + ?Sized>(
    runtime: &R,
    container_id: &str,
    mode: EnforceMode,
) -> Result<EnforcementOutcome, RuntimeError> {
    let snapshot = match runtime.inspect(container_id).await {
        Ok(snapshot) => snapshot,
        Err(RuntimeError::NotFound { .. }) => return Ok(EnforcementOutcome::AlreadyGone),
        Err(e) => return Err(e),
    };

    if snapshot.running {
        match runtime.stop(container_id).await {
            Ok(()) => {}
            Err(RuntimeError::NotFound { .. }) => return Ok(EnforcementOutcome::AlreadyGone),
            Err(e) => return Err(e),
        }
        match mode {
            EnforceMode::Safe => Ok(EnforcementOutcome::Stopped),
            EnforceMode::Strict => match runtime.remove(container_id).await {
                Ok(()) => Ok(EnforcementOutcome::StoppedAndRemoved),
                Err(RuntimeError::NotFound { .. }) => Ok(EnforcementOutcome::AlreadyGone),
                Err(e) => Err(e),
            },
        }
    } else {
        match mode {
            EnforceMode::Safe => Ok(EnforcementOutcome::LeftInPlace),
            EnforceMode::Strict => match runtime.remove(container_id).await {
                Ok(()) => Ok(EnforcementOutcome::Removed),
                Err(RuntimeError::NotFound { .. }) => Ok(EnforcementOutcome::AlreadyGone),
                Err(e) => Err(e),
            },
        }
    }
}
