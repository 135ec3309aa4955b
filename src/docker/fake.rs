//! In-memory [`ContainerEngine`] used by unit tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bollard::errors::Error as DockerError;
use bollard::models::{
    ContainerConfig, ContainerInspectResponse, ContainerState, ContainerSummary, EndpointSettings,
    EventActor, EventMessage, EventMessageTypeEnum, HostConfig, NetworkSettings, PortBinding,
    RestartPolicy, RestartPolicyNameEnum,
};
use futures::stream::{self, BoxStream};
use futures_util::StreamExt;
use tokio::sync::Notify;

use super::client::{ContainerEngine, NANOS_PER_SEC, event_time_nanos};

pub enum Inspection {
    Found(Box<ContainerInspectResponse>),
    Status(u16),
    Undecodable,
}

#[derive(Clone)]
pub enum FakeEvent {
    Message(EventMessage),
    /// A record of an unknown type emitted at the given second. Like
    /// bollard's line decoder, the stream ends right after it.
    Undecodable(i64),
    /// The stream breaks with this status. Only served to the first stream.
    Failure(u16),
}

impl FakeEvent {
    fn time_nanos(&self) -> Option<i64> {
        match self {
            FakeEvent::Message(message) => event_time_nanos(message),
            FakeEvent::Undecodable(secs) => Some(secs * NANOS_PER_SEC),
            FakeEvent::Failure(_) => None,
        }
    }
}

/// Every event pushed so far. Each opened stream reads it from its own
/// position, the way the daemon replays its buffer for `since`.
#[derive(Default)]
struct Feed {
    script: Mutex<Script>,
    pushed: Notify,
}

#[derive(Default)]
struct Script {
    events: Vec<FakeEvent>,
    closed: bool,
}

#[derive(Default)]
pub struct FakeEngine {
    summaries: Vec<ContainerSummary>,
    inspections: HashMap<String, Inspection>,
    list_status: Option<u16>,
    feed: Arc<Feed>,
    opened: Mutex<Vec<Option<i64>>>,
}

impl FakeEngine {
    pub fn with_container(self, id: &str, raw: ContainerInspectResponse) -> Self {
        self.with_inspection(id, Inspection::Found(Box::new(raw)))
    }

    /// Lists `id` and answers its inspection with `inspection`.
    pub fn with_inspection(mut self, id: &str, inspection: Inspection) -> Self {
        self.summaries.push(ContainerSummary {
            id: Some(id.to_string()),
            image: Some("nginx:1.27".to_string()),
            status: Some("Up 5 minutes".to_string()),
            ..Default::default()
        });
        self.inspections.insert(id.to_string(), inspection);
        self
    }

    pub fn with_list_status(mut self, status: u16) -> Self {
        self.list_status = Some(status);
        self
    }

    pub fn push(&self, event: FakeEvent) {
        let mut script = self.feed.script.lock().unwrap();
        if !script.closed {
            script.events.push(event);
        }
        drop(script);
        self.feed.pushed.notify_waiters();
    }

    /// Ends every event stream once the pushed events are consumed.
    pub fn close_feed(&self) {
        self.feed.script.lock().unwrap().closed = true;
        self.feed.pushed.notify_waiters();
    }

    /// The `since` of every `events` call, in call order.
    pub fn opened_since(&self) -> Vec<Option<i64>> {
        self.opened.lock().unwrap().clone()
    }
}

fn server_error(status_code: u16) -> DockerError {
    DockerError::DockerResponseServerError {
        status_code,
        message: format!("fake engine answered {status_code}"),
    }
}

fn decode_error() -> DockerError {
    DockerError::from(serde_json::from_str::<EventMessage>("{\"Type\":").unwrap_err())
}

fn unknown_event_error(secs: i64) -> DockerError {
    DockerError::JsonDataError {
        message: "unknown variant `futuretype`".to_string(),
        column: 20,
        contents: format!(r#"{{"Type":"futuretype","Action":"create","time":{secs}}}"#),
    }
}

#[async_trait]
impl ContainerEngine for FakeEngine {
    async fn list_containers(&self) -> Result<Vec<ContainerSummary>, DockerError> {
        match self.list_status {
            Some(status) => Err(server_error(status)),
            None => Ok(self.summaries.clone()),
        }
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerInspectResponse, DockerError> {
        match self.inspections.get(id) {
            Some(Inspection::Found(raw)) => Ok(raw.as_ref().clone()),
            Some(Inspection::Status(status)) => Err(server_error(*status)),
            Some(Inspection::Undecodable) => Err(decode_error()),
            None => Err(server_error(404)),
        }
    }

    /// `None` serves the script from the start; `Some` replays the events
    /// at or after that instant.
    fn events(&self, since: Option<i64>) -> BoxStream<'_, Result<EventMessage, DockerError>> {
        self.opened.lock().unwrap().push(since);
        let feed = Arc::clone(&self.feed);

        // (feed, next index, stream already broke)
        stream::unfold((feed, 0usize, false), move |(feed, mut next, broken)| async move {
            if broken {
                return None;
            }
            loop {
                // Registered before looking so a push in between is not missed
                let pushed = feed.pushed.notified();
                {
                    let script = feed.script.lock().unwrap();
                    while let Some(event) = script.events.get(next) {
                        let replayed = match (since, event.time_nanos()) {
                            (None, _) => true,
                            (Some(since), Some(time)) => time >= since,
                            (Some(_), None) => false,
                        };
                        if replayed {
                            break;
                        }
                        next += 1;
                    }
                    match script.events.get(next) {
                        Some(FakeEvent::Message(message)) => {
                            return Some((Ok(message.clone()), (Arc::clone(&feed), next + 1, false)));
                        }
                        Some(FakeEvent::Undecodable(secs)) => {
                            let err = unknown_event_error(*secs);
                            return Some((Err(err), (Arc::clone(&feed), next + 1, true)));
                        }
                        Some(FakeEvent::Failure(status)) => {
                            let err = server_error(*status);
                            return Some((Err(err), (Arc::clone(&feed), next + 1, true)));
                        }
                        None if script.closed => return None,
                        None => {}
                    }
                }
                pushed.await;
            }
        })
        .boxed()
    }
}

pub fn container_event(action: &str, id: &str, time: i64) -> EventMessage {
    EventMessage {
        typ: Some(EventMessageTypeEnum::CONTAINER),
        action: Some(action.to_string()),
        actor: Some(EventActor {
            id: Some(id.to_string()),
            attributes: Some(HashMap::from([
                ("image".to_string(), "nginx:1.27".to_string()),
                ("name".to_string(), "web".to_string()),
            ])),
            ..Default::default()
        }),
        time: Some(time),
        ..Default::default()
    }
}

pub fn inspect_response(id: &str, name: &str) -> ContainerInspectResponse {
    ContainerInspectResponse {
        id: Some(id.to_string()),
        name: Some(format!("/{name}")),
        image: Some("sha256:feed".to_string()),
        config: Some(ContainerConfig {
            hostname: Some(name.to_string()),
            domainname: Some("example.internal".to_string()),
            image: Some("nginx:1.27".to_string()),
            ..Default::default()
        }),
        host_config: Some(HostConfig {
            network_mode: Some("bridge".to_string()),
            publish_all_ports: Some(false),
            restart_policy: Some(RestartPolicy {
                name: Some(RestartPolicyNameEnum::ON_FAILURE),
                maximum_retry_count: Some(3),
                ..Default::default()
            }),
            volumes_from: Some(vec!["data".to_string()]),
            ..Default::default()
        }),
        state: Some(ContainerState {
            running: Some(true),
            paused: Some(false),
            restarting: Some(false),
            pid: Some(4242),
            exit_code: Some(0),
            started_at: Some("2024-05-01T10:00:00Z".to_string()),
            finished_at: Some("0001-01-01T00:00:00Z".to_string()),
            ..Default::default()
        }),
        network_settings: Some(NetworkSettings {
            networks: Some(HashMap::from([(
                "bridge".to_string(),
                EndpointSettings {
                    ip_address: Some("172.17.0.2".to_string()),
                    ..Default::default()
                },
            )])),
            ports: Some(HashMap::from([
                (
                    "80/tcp".to_string(),
                    Some(vec![PortBinding {
                        host_ip: Some("0.0.0.0".to_string()),
                        host_port: Some("8080".to_string()),
                        ..Default::default()
                    }]),
                ),
                ("443/tcp".to_string(), None),
            ])),
            ..Default::default()
        }),
        ..Default::default()
    }
}
