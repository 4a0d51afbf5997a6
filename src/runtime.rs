//! Container runtime access behind a narrow trait.
//!
//! The monitor only ever needs four operations against the runtime: a startup
//! ping, a fresh container inspection, stop, and remove. Putting them behind
//! [`ContainerRuntime`] keeps the event loop testable against a scripted fake
//! while [`DockerRuntime`] talks to the real daemon via bollard.

use std::collections::HashMap;

use async_trait::async_trait;
use bollard::container::{InspectContainerOptions, RemoveContainerOptions, StopContainerOptions};
use bollard::errors::Error as BollardError;
use bollard::models::{EventMessage, EventMessageTypeEnum};
use bollard::system::EventsOptions;
use bollard::Docker;
use tokio_stream::{Stream, StreamExt};
use tracing::debug;

/// Grace period passed to the runtime when stopping a container.
const STOP_GRACE_SECONDS: i64 = 10;

/// Lifecycle actions the monitor reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleAction {
    /// A container was created.
    Created,
    /// A container was started.
    Started,
}

/// One decoded lifecycle event from the runtime's event feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleEvent {
    /// What happened.
    pub action: LifecycleAction,
    /// The container the event refers to.
    pub container_id: String,
}

/// Freshly inspected container state plus its image's identity metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerSnapshot {
    /// Whether the container is currently running.
    pub running: bool,
    /// Local content id of the image (`sha256:…`), when known.
    pub image_id: Option<String>,
    /// Repo digests of the image (`name@sha256:…`), possibly empty.
    pub repo_digests: Vec<String>,
    /// Human tags of the image, possibly empty.
    pub tags: Vec<String>,
}

/// Errors surfaced by runtime operations.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// The runtime daemon cannot be reached at all.
    #[error("runtime unreachable: {0}")]
    Unreachable(String),

    /// The targeted container no longer exists.
    #[error("container {container_id} not found")]
    NotFound {
        /// Id the runtime reported as unknown.
        container_id: String,
    },

    /// Any other runtime API failure.
    #[error("runtime API error: {0}")]
    Api(String),

    /// An event arrived that could not be decoded.
    #[error("malformed event: {0}")]
    MalformedEvent(String),
}

/// The runtime operations the monitor depends on.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Verify the runtime daemon is reachable.
    async fn ping(&self) -> Result<(), RuntimeError>;

    /// Inspect a container's current state and image metadata.
    async fn inspect(&self, container_id: &str) -> Result<ContainerSnapshot, RuntimeError>;

    /// Stop a container.
    async fn stop(&self, container_id: &str) -> Result<(), RuntimeError>;

    /// Remove a (stopped) container.
    async fn remove(&self, container_id: &str) -> Result<(), RuntimeError>;
}

/// Docker-backed runtime implementation.
#[derive(Debug, Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connect to the local Docker daemon.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Unreachable`] when no local daemon endpoint
    /// can be set up. Reachability itself is verified by [`ping`].
    ///
    /// [`ping`]: ContainerRuntime::ping
    pub fn connect() -> Result<Self, RuntimeError> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| RuntimeError::Unreachable(e.to_string()))?;
        Ok(Self { docker })
    }

    /// Access the underlying bollard handle for non-monitoring operations.
    pub fn docker(&self) -> &Docker {
        &self.docker
    }

    /// Subscribe to the live feed of container create/start events.
    ///
    /// The subscription is long-lived and blocks indefinitely between events.
    /// Each item is either a decoded [`LifecycleEvent`] or a per-event error;
    /// the stream itself never ends the subscription over one bad item.
    pub fn events(&self) -> impl Stream<Item = Result<LifecycleEvent, RuntimeError>> {
        let options = EventsOptions::<String> {
            filters: HashMap::from([
                ("type".to_owned(), vec!["container".to_owned()]),
                (
                    "event".to_owned(),
                    vec!["create".to_owned(), "start".to_owned()],
                ),
            ]),
            ..Default::default()
        };

        self.docker.events(Some(options)).map(|item| match item {
            Ok(message) => decode_event(message),
            Err(e) => Err(RuntimeError::Api(e.to_string())),
        })
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn ping(&self) -> Result<(), RuntimeError> {
        self.docker
            .ping()
            .await
            .map_err(|e| RuntimeError::Unreachable(e.to_string()))?;
        Ok(())
    }

    async fn inspect(&self, container_id: &str) -> Result<ContainerSnapshot, RuntimeError> {
        let state = self
            .docker
            .inspect_container(container_id, None::<InspectContainerOptions>)
            .await
            .map_err(|e| map_container_error(container_id, e))?;

        let running = state
            .state
            .and_then(|value| value.running)
            .unwrap_or(false);

        let mut snapshot = ContainerSnapshot {
            running,
            ..ContainerSnapshot::default()
        };

        // Image metadata is best-effort: a container whose image cannot be
        // inspected resolves to no identity, which the decision engine treats
        // as an integrity failure rather than an error here.
        if let Some(image_ref) = state.image {
            match self.docker.inspect_image(&image_ref).await {
                Ok(image) => {
                    snapshot.image_id = image.id;
                    snapshot.repo_digests = image.repo_digests.unwrap_or_default();
                    snapshot.tags = image.repo_tags.unwrap_or_default();
                }
                Err(e) => {
                    debug!(container_id, error = %e, "image metadata unavailable");
                }
            }
        }

        Ok(snapshot)
    }

    async fn stop(&self, container_id: &str) -> Result<(), RuntimeError> {
        self.docker
            .stop_container(
                container_id,
                Some(StopContainerOptions {
                    t: STOP_GRACE_SECONDS,
                }),
            )
            .await
            .map_err(|e| map_container_error(container_id, e))
    }

    async fn remove(&self, container_id: &str) -> Result<(), RuntimeError> {
        self.docker
            .remove_container(container_id, None::<RemoveContainerOptions>)
            .await
            .map_err(|e| map_container_error(container_id, e))
    }
}

/// Map a bollard error for a container-targeted call, folding 404 into
/// [`RuntimeError::NotFound`].
fn map_container_error(container_id: &str, err: BollardError) -> RuntimeError {
    match err {
        BollardError::DockerResponseServerError {
            status_code: 404, ..
        } => RuntimeError::NotFound {
            container_id: container_id.to_owned(),
        },
        other => RuntimeError::Api(other.to_string()),
    }
}

/// Decode a raw runtime event message into a [`LifecycleEvent`].
///
/// The subscription filters already narrow the feed to container create and
/// start actions; anything else that slips through is a malformed event, not
/// a panic.
pub fn decode_event(message: EventMessage) -> Result<LifecycleEvent, RuntimeError> {
    if message.typ != Some(EventMessageTypeEnum::CONTAINER) {
        return Err(RuntimeError::MalformedEvent(format!(
            "unexpected event type {:?}",
            message.typ
        )));
    }

    let action = match message.action.as_deref() {
        Some("create") => LifecycleAction::Created,
        Some("start") => LifecycleAction::Started,
        other => {
            return Err(RuntimeError::MalformedEvent(format!(
                "unexpected container action {other:?}"
            )));
        }
    };

    let container_id = message
        .actor
        .and_then(|actor| actor.id)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| RuntimeError::MalformedEvent("event carries no container id".to_owned()))?;

    Ok(LifecycleEvent {
        action,
        container_id,
    })
}
