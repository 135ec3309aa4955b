use std::sync::Arc;

use bollard::errors::Error as DockerError;
use futures::future;

use super::client::{ContainerEngine, is_decode_error, is_not_found};
use super::record::{ContainerRecord, MalformedRecord};

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("Docker daemon unavailable: {0}")]
    Unavailable(#[source] DockerError),
    #[error("Docker daemon returned {status}: {message}")]
    Protocol { status: u16, message: String },
    #[error("Unable to decode Docker response: {0}")]
    Decode(#[source] DockerError),
    #[error("Malformed container data: {0}")]
    Malformed(#[from] MalformedRecord),
    #[error("Container {0} was listed but no longer exists")]
    Vanished(String),
}

impl From<DockerError> for ResolveError {
    fn from(err: DockerError) -> Self {
        match err {
            DockerError::DockerResponseServerError {
                status_code,
                message,
            } => ResolveError::Protocol {
                status: status_code,
                message,
            },
            err if is_decode_error(&err) => ResolveError::Decode(err),
            err => ResolveError::Unavailable(err),
        }
    }
}

/// Answers point-in-time questions about containers.
///
/// Holds nothing but a handle to the engine, so it can be cloned freely into
/// request handlers and never interferes with the event pipeline.
#[derive(Clone)]
pub struct StateResolver {
    engine: Arc<dyn ContainerEngine>,
}

impl StateResolver {
    pub fn new(engine: Arc<dyn ContainerEngine>) -> Self {
        Self { engine }
    }

    /// `Ok(None)` means the engine does not know `id`. That is an answer,
    /// not a failure.
    pub async fn resolve_one(&self, id: &str) -> Result<Option<ContainerRecord>, ResolveError> {
        log::debug!("Inspecting container {id}");
        let raw = match self.engine.inspect_container(id).await {
            Ok(raw) => raw,
            Err(e) if is_not_found(&e) => {
                log::debug!("Container {id} not found");
                return Ok(None);
            }
            Err(e) => {
                log::error!("Failed to inspect container {id}: {e}");
                return Err(e.into());
            }
        };

        Ok(Some(ContainerRecord::try_from(raw)?))
    }

    /// Every container the engine lists, in listing order.
    ///
    /// All or nothing: if any listed container cannot be resolved the whole
    /// call fails instead of returning a partial list.
    pub async fn resolve_all(&self) -> Result<Vec<ContainerRecord>, ResolveError> {
        let summaries = self.engine.list_containers().await.inspect_err(|e| {
            log::error!("Failed to list containers: {e}");
        })?;

        let ids = summaries
            .into_iter()
            .map(|summary| {
                summary
                    .id
                    .filter(|id| !id.is_empty())
                    .ok_or_else(|| MalformedRecord::new("Id", "missing from container summary"))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let lookups = ids.iter().map(|id| async move {
            let record = self.resolve_one(id).await?;
            record.ok_or_else(|| {
                log::warn!("Container {id} disappeared between listing and inspection");
                ResolveError::Vanished(id.clone())
            })
        });
        let records = future::try_join_all(lookups).await?;

        log::debug!("Resolved {} containers", records.len());
        Ok(records)
    }
}
