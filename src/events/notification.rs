use bollard::models::{EventMessage, EventMessageTypeEnum};
use serde::{Deserialize, Serialize};

/// One container state change, as fanned out to subscribers.
///
/// Serialized with the short field names viewers already expect:
/// `{"status": "start", "id": "...", "from": "nginx:1.27", "time": 1714557600}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub status: String,
    pub id: String,
    /// Image the container was created from.
    pub from: String,
    /// Seconds since the Unix epoch.
    pub time: i64,
}

/// Why an engine event was not turned into a [`Notification`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Skipped {
    #[error("not a container event ({0})")]
    NotContainer(String),
    #[error("event has no {0}")]
    Missing(&'static str),
}

impl TryFrom<EventMessage> for Notification {
    type Error = Skipped;

    fn try_from(message: EventMessage) -> Result<Self, Self::Error> {
        match message.typ {
            Some(EventMessageTypeEnum::CONTAINER) => {}
            Some(other) => return Err(Skipped::NotContainer(other.to_string())),
            None => return Err(Skipped::Missing("type")),
        }

        let status = message
            .action
            .filter(|action| !action.is_empty())
            .ok_or(Skipped::Missing("action"))?;
        let actor = message.actor.ok_or(Skipped::Missing("actor"))?;
        let id = actor
            .id
            .filter(|id| !id.is_empty())
            .ok_or(Skipped::Missing("actor id"))?;
        let time = message.time.ok_or(Skipped::Missing("time"))?;
        let from = actor
            .attributes
            .and_then(|mut attributes| attributes.remove("image"))
            .unwrap_or_default();

        Ok(Notification {
            status,
            id,
            from,
            time,
        })
    }
}
