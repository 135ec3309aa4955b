//! Docker client module using bollard.
//!
//! [`ContainerEngine`] is the narrow surface the resolver and the event
//! watcher need from the engine. [`bollard::Docker`] implements it directly;
//! tests swap in an in-memory engine.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bollard::errors::Error as DockerError;
use bollard::models::{ContainerInspectResponse, ContainerSummary, EventMessage};
use bollard::query_parameters::{
    EventsOptions, EventsOptionsBuilder, InspectContainerOptions, InspectContainerOptionsBuilder,
    ListContainersOptions, ListContainersOptionsBuilder,
};
use bollard::{API_DEFAULT_VERSION, Docker};
use futures::stream::BoxStream;
use futures_util::StreamExt;
use serde::Deserialize;

pub const DEFAULT_DOCKER_HOST: &str = "unix:///var/run/docker.sock";

#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("Unsupported docker host '{0}', expected unix://, tcp:// or http://")]
    UnsupportedHost(String),
    #[error("Docker API error: {0}")]
    DockerApi(#[from] DockerError),
}

/// Build a client for `host`.
///
/// `timeout` bounds every request/response exchange with the daemon. The
/// event stream body is read without a deadline.
pub fn connect(host: &str, timeout: Duration) -> Result<Docker, ConnectError> {
    let timeout = timeout.as_secs();
    match host.split_once("://") {
        Some(("unix", path)) => Ok(Docker::connect_with_unix(
            path,
            timeout,
            API_DEFAULT_VERSION,
        )?),
        Some(("tcp" | "http", _)) => Ok(Docker::connect_with_http(
            host,
            timeout,
            API_DEFAULT_VERSION,
        )?),
        _ => Err(ConnectError::UnsupportedHost(host.to_string())),
    }
}

#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Summaries of every container, stopped ones included.
    async fn list_containers(&self) -> Result<Vec<ContainerSummary>, DockerError>;

    async fn inspect_container(&self, id: &str) -> Result<ContainerInspectResponse, DockerError>;

    /// The engine's container event feed. Yields until the daemon closes
    /// the stream.
    ///
    /// With `since` (nanoseconds since the Unix epoch) the daemon first
    /// replays buffered events at or after that instant.
    fn events(&self, since: Option<i64>) -> BoxStream<'_, Result<EventMessage, DockerError>>;
}

#[async_trait]
impl ContainerEngine for Docker {
    async fn list_containers(&self) -> Result<Vec<ContainerSummary>, DockerError> {
        let options: ListContainersOptions = ListContainersOptionsBuilder::new().all(true).build();
        Docker::list_containers(self, Some(options)).await
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerInspectResponse, DockerError> {
        let options: InspectContainerOptions = InspectContainerOptionsBuilder::new().build();
        Docker::inspect_container(self, id, Some(options)).await
    }

    fn events(&self, since: Option<i64>) -> BoxStream<'_, Result<EventMessage, DockerError>> {
        let filters = HashMap::from([("type", vec!["container"])]);
        let mut builder = EventsOptionsBuilder::new().filters(&filters);
        if let Some(since) = since {
            builder = builder.since(&format_since(since));
        }
        let options: EventsOptions = builder.build();
        Docker::events(self, Some(options)).boxed()
    }
}

/// The daemon answered with a 404 for the requested object.
pub fn is_not_found(err: &DockerError) -> bool {
    matches!(
        err,
        DockerError::DockerResponseServerError {
            status_code: 404,
            ..
        }
    )
}

/// `seconds.nanoseconds`, the finest resolution the daemon accepts.
fn format_since(nanos: i64) -> String {
    format!(
        "{}.{:09}",
        nanos.div_euclid(NANOS_PER_SEC),
        nanos.rem_euclid(NANOS_PER_SEC)
    )
}

pub const NANOS_PER_SEC: i64 = 1_000_000_000;

/// Nanosecond timestamp of an event, falling back to its whole seconds.
pub fn event_time_nanos(message: &EventMessage) -> Option<i64> {
    message
        .time_nano
        .or_else(|| message.time.map(|secs| secs.saturating_mul(NANOS_PER_SEC)))
}

#[derive(Deserialize)]
struct EventTime {
    #[serde(rename = "timeNano")]
    time_nano: Option<i64>,
    time: Option<i64>,
}

/// Timestamp of the record that failed to decode, read from the raw line
/// the error carries. `None` when the line does not even hold one.
pub fn undecodable_event_time(err: &DockerError) -> Option<i64> {
    let DockerError::JsonDataError { contents, .. } = err else {
        return None;
    };
    let stamp: EventTime = serde_json::from_str(contents).ok()?;
    stamp
        .time_nano
        .or_else(|| stamp.time.map(|secs| secs.saturating_mul(NANOS_PER_SEC)))
}

/// A response arrived but its body could not be decoded.
pub fn is_decode_error(err: &DockerError) -> bool {
    matches!(
        err,
        DockerError::JsonDataError { .. } | DockerError::JsonSerdeError { .. }
    )
}
