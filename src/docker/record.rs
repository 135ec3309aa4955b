use std::collections::BTreeMap;

use bollard::models::{ContainerInspectResponse, PortBinding};
use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

/// A normalized, point-in-time view of one container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerRecord {
    pub id: String,
    /// Container name without the leading `/` the engine reports.
    pub name: String,
    /// Image reference the container was created from (e.g. `nginx:1.27`).
    pub image: String,
    /// Content-addressed id of that image.
    pub image_id: String,
    pub pid: i64,
    pub host_name: String,
    pub domain_name: String,
    pub ip_address: String,
    pub network_mode: String,
    pub running: bool,
    pub paused: bool,
    pub restarting: bool,
    pub exit_code: i64,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub restart_policy_name: String,
    pub restart_policy_maximum_retry_count: i64,
    pub publish_all_ports: bool,
    pub ports: Vec<PortMapping>,
    pub volumes: Vec<VolumeBinding>,
    pub volumes_from: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PortMapping {
    pub container_port: u16,
    pub protocol: String,
    pub host_ip: Option<String>,
    /// `None` when the port is exposed but not published.
    pub host_port: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VolumeBinding {
    pub container_path: String,
    pub host_path: String,
    pub read_write: bool,
}

/// The inspect payload did not have the shape we need.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {reason}")]
pub struct MalformedRecord {
    pub field: &'static str,
    pub reason: String,
}

impl MalformedRecord {
    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

impl TryFrom<ContainerInspectResponse> for ContainerRecord {
    type Error = MalformedRecord;

    fn try_from(raw: ContainerInspectResponse) -> Result<Self, Self::Error> {
        let id = raw
            .id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| MalformedRecord::new("Id", "missing from inspect response"))?;

        let config = raw.config.unwrap_or_default();
        let host_config = raw.host_config.unwrap_or_default();
        let state = raw.state.unwrap_or_default();
        let network_settings = raw.network_settings.unwrap_or_default();
        let restart_policy = host_config.restart_policy.unwrap_or_default();

        let name = raw.name.unwrap_or_default();
        let name = name.strip_prefix('/').unwrap_or(&name).to_string();

        // Sorted so the first attached network wins deterministically
        let ip_address = network_settings
            .networks
            .unwrap_or_default()
            .into_iter()
            .collect::<BTreeMap<_, _>>()
            .into_values()
            .filter_map(|endpoint| endpoint.ip_address)
            .find(|ip| !ip.is_empty())
            .unwrap_or_default();

        let mut ports = Vec::new();
        for (key, bindings) in network_settings.ports.unwrap_or_default() {
            ports.extend(parse_port_bindings(&key, bindings.unwrap_or_default())?);
        }
        ports.sort();

        let mut volumes: Vec<VolumeBinding> = raw
            .mounts
            .unwrap_or_default()
            .into_iter()
            .filter_map(|mount| {
                Some(VolumeBinding {
                    container_path: mount.destination?,
                    host_path: mount.source.unwrap_or_default(),
                    read_write: mount.rw.unwrap_or(false),
                })
            })
            .collect();
        volumes.sort();

        Ok(ContainerRecord {
            id,
            name,
            image: config.image.unwrap_or_default(),
            image_id: raw.image.unwrap_or_default(),
            pid: state.pid.unwrap_or_default(),
            host_name: config.hostname.unwrap_or_default(),
            domain_name: config.domainname.unwrap_or_default(),
            ip_address,
            network_mode: host_config.network_mode.unwrap_or_default(),
            running: state.running.unwrap_or(false),
            paused: state.paused.unwrap_or(false),
            restarting: state.restarting.unwrap_or(false),
            exit_code: state.exit_code.unwrap_or_default(),
            started_at: parse_timestamp("State.StartedAt", state.started_at.as_deref())?,
            finished_at: parse_timestamp("State.FinishedAt", state.finished_at.as_deref())?,
            restart_policy_name: restart_policy
                .name
                .map(|name| name.to_string())
                .unwrap_or_default(),
            restart_policy_maximum_retry_count: restart_policy
                .maximum_retry_count
                .unwrap_or_default(),
            publish_all_ports: host_config.publish_all_ports.unwrap_or(false),
            ports,
            volumes,
            volumes_from: host_config.volumes_from.unwrap_or_default(),
        })
    }
}

/// The engine reports "never happened" as `0001-01-01T00:00:00Z`.
/// That, and an absent value, both become `None`.
fn parse_timestamp(
    field: &'static str,
    raw: Option<&str>,
) -> Result<Option<DateTime<Utc>>, MalformedRecord> {
    let raw = match raw {
        None | Some("") => return Ok(None),
        Some(raw) => raw,
    };
    let timestamp = DateTime::parse_from_rfc3339(raw)
        .map_err(|e| MalformedRecord::new(field, format!("'{raw}' is not RFC 3339: {e}")))?
        .with_timezone(&Utc);
    if timestamp.year() <= 1 {
        return Ok(None);
    }
    Ok(Some(timestamp))
}

/// Parse one `"80/tcp" => [bindings]` entry of the engine's port map.
fn parse_port_bindings(
    key: &str,
    bindings: Vec<PortBinding>,
) -> Result<Vec<PortMapping>, MalformedRecord> {
    let (port, protocol) = key.split_once('/').unwrap_or((key, "tcp"));
    let container_port: u16 = port
        .parse()
        .map_err(|_| MalformedRecord::new("NetworkSettings.Ports", format!("bad port '{key}'")))?;

    if bindings.is_empty() {
        return Ok(vec![PortMapping {
            container_port,
            protocol: protocol.to_string(),
            host_ip: None,
            host_port: None,
        }]);
    }

    bindings
        .into_iter()
        .map(|binding| {
            let host_port = match binding.host_port.as_deref() {
                None | Some("") => None,
                Some(p) => Some(p.parse::<u16>().map_err(|_| {
                    MalformedRecord::new(
                        "NetworkSettings.Ports",
                        format!("bad host port '{p}' for {key}"),
                    )
                })?),
            };
            Ok(PortMapping {
                container_port,
                protocol: protocol.to_string(),
                host_ip: binding.host_ip.filter(|ip| !ip.is_empty()),
                host_port,
            })
        })
        .collect()
}
