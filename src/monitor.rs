//! The admission monitor: event loop, per-container decision cache, dispatch.
//!
//! Consumes the runtime's lifecycle event stream and drives identity
//! resolution, the decision rule, auditing, and enforcement. Every container
//! id gets at most one verdict per process lifetime; a cached block verdict
//! is re-asserted on each later event for that id so a transiently failed
//! enforcement attempt is retried. A failure while handling one event is
//! logged and never terminates the loop.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, info, warn};

use crate::audit::{AuditKind, AuditLog};
use crate::decision::{decide, Verdict};
use crate::enforce::{enforce, EnforceMode, EnforcementOutcome};
use crate::identity::ImageIdentity;
use crate::policy::PolicyStore;
use crate::runtime::{ContainerRuntime, LifecycleAction, LifecycleEvent, RuntimeError};

/// Per-container state for the lifetime of this process.
///
/// Created on the first event referencing the id. `verdict` stays `None`
/// until identity resolution and the decision succeed once; the next event
/// for the id then computes exactly one verdict.
#[derive(Debug, Clone)]
pub struct ContainerRecord {
    /// Resolved image digest, when resolution succeeded.
    pub digest: Option<String>,
    /// Resolved image tag, when the image is tagged.
    pub tag: Option<String>,
    /// The memoized decision; `None` while unresolved.
    pub verdict: Option<Verdict>,
    /// When this container id was first seen.
    pub first_seen: DateTime<Utc>,
}

impl ContainerRecord {
    fn unresolved() -> Self {
        Self {
            digest: None,
            tag: None,
            verdict: None,
            first_seen: Utc::now(),
        }
    }
}

/// The event loop and the state it owns.
pub struct Monitor<R> {
    runtime: R,
    policy: PolicyStore,
    audit: AuditLog,
    mode: EnforceMode,
    allow_unregistered: bool,
    records: HashMap<String, ContainerRecord>,
}

impl<R: ContainerRuntime> Monitor<R> {
    /// Build a monitor over a runtime, a policy snapshot, and an audit sink.
    pub fn new(
        runtime: R,
        policy: PolicyStore,
        audit: AuditLog,
        mode: EnforceMode,
        allow_unregistered: bool,
    ) -> Self {
        Self {
            runtime,
            policy,
            audit,
            mode,
            allow_unregistered,
            records: HashMap::new(),
        }
    }

    /// The cached verdict for a container id, if one was computed.
    pub fn verdict(&self, container_id: &str) -> Option<Verdict> {
        self.records
            .get(container_id)
            .and_then(|record| record.verdict)
    }

    /// Consume the event stream until it ends or the operator interrupts.
    ///
    /// Each event is handled inside an isolating boundary: handler errors and
    /// undecodable stream items are logged at warn and the loop moves on.
    /// Ctrl-C exits cleanly; audit writes are single atomic appends, so there
    /// is nothing to flush mid-record.
    pub async fn run<S>(&mut self, events: S)
    where
        S: Stream<Item = Result<LifecycleEvent, RuntimeError>>,
    {
        tokio::pin!(events);
        loop {
            tokio::select! {
                item = events.next() => {
                    let Some(item) = item else {
                        info!("event stream closed");
                        break;
                    };
                    match item {
                        Ok(event) => {
                            if let Err(e) = self.handle_event(&event).await {
                                warn!(
                                    container_id = %event.container_id,
                                    error = %e,
                                    "error handling event"
                                );
                            }
                        }
                        Err(e) => {
                            warn!(error = %e, "skipping undecodable event");
                        }
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("received shutdown signal, exiting monitoring");
                    break;
                }
            }
        }
    }

    /// Handle one lifecycle event.
    ///
    /// A cached verdict short-circuits: no runtime inspection, no identity
    /// resolution. Decided(Allow) is a no-op, Decided(Block) goes straight to
    /// enforcement.
    ///
    /// # Errors
    ///
    /// Returns per-event recoverable failures (inspection errors, enforcement
    /// API errors). The record for the id survives with whatever was learned,
    /// so a later event picks up where this one failed.
    pub async fn handle_event(&mut self, event: &LifecycleEvent) -> Result<(), RuntimeError> {
        let container_id = event.container_id.as_str();
        self.records
            .entry(container_id.to_owned())
            .or_insert_with(ContainerRecord::unresolved);

        let verdict = match self.cached_verdict(container_id) {
            Some((verdict, identity)) => {
                if event.action == LifecycleAction::Created {
                    self.audit_or_warn(
                        AuditKind::Created,
                        container_id,
                        &identity,
                        "Container created",
                    );
                }
                verdict
            }
            None => {
                let snapshot = self.runtime.inspect(container_id).await?;
                let identity = ImageIdentity::resolve(&snapshot);

                if event.action == LifecycleAction::Created {
                    self.audit_or_warn(
                        AuditKind::Created,
                        container_id,
                        &identity,
                        "Container created",
                    );
                    info!(
                        container_id,
                        image = identity.tag.as_deref().unwrap_or("<untagged>"),
                        digest = identity.digest.as_deref().unwrap_or("<none>"),
                        "container created"
                    );
                }

                self.decide_and_record(container_id, &identity)
            }
        };

        if verdict == Verdict::Block {
            self.enforce_block(container_id).await?;
        } else {
            debug!(container_id, "container already allowed");
        }

        Ok(())
    }

    /// The memoized verdict and the identity it was computed from, if any.
    fn cached_verdict(&self, container_id: &str) -> Option<(Verdict, ImageIdentity)> {
        let record = self.records.get(container_id)?;
        let verdict = record.verdict?;
        let identity = ImageIdentity {
            digest: record.digest.clone(),
            tag: record.tag.clone(),
        };
        Some((verdict, identity))
    }

    /// Compute, memoize, and audit the one verdict for a container id.
    fn decide_and_record(&mut self, container_id: &str, identity: &ImageIdentity) -> Verdict {
        let verdict = decide(identity, &self.policy, self.allow_unregistered);

        if let Some(record) = self.records.get_mut(container_id) {
            record.digest = identity.digest.clone();
            record.tag = identity.tag.clone();
            record.verdict = Some(verdict);
        }

        match verdict {
            Verdict::Allow => {
                info!(
                    container_id,
                    image = identity.tag.as_deref().unwrap_or("<untagged>"),
                    digest = identity.digest.as_deref().unwrap_or("<none>"),
                    "image admitted"
                );
                self.audit_or_warn(
                    AuditKind::Allowed,
                    container_id,
                    identity,
                    "Digest registered or allowed by flag",
                );
            }
            Verdict::Block => {
                let message = if identity.is_unresolved() {
                    "No image metadata; blocked"
                } else {
                    "Digest not registered"
                };
                warn!(
                    container_id,
                    image = identity.tag.as_deref().unwrap_or("<untagged>"),
                    digest = identity.digest.as_deref().unwrap_or("<none>"),
                    decision = "block",
                    message
                );
                self.audit_or_warn(AuditKind::Blocked, container_id, identity, message);
            }
        }

        verdict
    }

    /// Carry out (or retry) enforcement for a blocked container.
    async fn enforce_block(&self, container_id: &str) -> Result<(), RuntimeError> {
        let outcome = enforce(&self.runtime, container_id, self.mode).await?;
        match outcome {
            EnforcementOutcome::Stopped => {
                warn!(container_id, decision = "block", "stopped blocked container");
            }
            EnforcementOutcome::StoppedAndRemoved => {
                warn!(
                    container_id,
                    decision = "block",
                    "stopped and removed blocked container"
                );
            }
            EnforcementOutcome::Removed => {
                warn!(container_id, decision = "block", "removed blocked container");
            }
            EnforcementOutcome::LeftInPlace => {
                warn!(
                    container_id,
                    decision = "block",
                    "blocked container not running; left in place for inspection"
                );
            }
            EnforcementOutcome::AlreadyGone => {
                info!(container_id, "container already removed");
            }
        }
        Ok(())
    }

    /// Append an audit record; a sink failure is a warning, never an error.
    fn audit_or_warn(
        &self,
        kind: AuditKind,
        container_id: &str,
        identity: &ImageIdentity,
        message: &str,
    ) {
        if let Err(e) = self.audit.record(
            kind,
            container_id,
            identity.tag.as_deref(),
            message,
            identity.digest.as_deref(),
        ) {
            warn!(container_id, error = %e, "failed to write audit record");
        }
    }
}
