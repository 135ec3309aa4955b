use std::sync::Arc;
use std::time::Duration;

use log::info;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::broadcast::{Broadcaster, DEFAULT_SEND_TIMEOUT};
use super::registry::SubscriberRegistry;
use super::watcher::{WatchError, watch};
use crate::docker::ContainerEngine;

pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSettings {
    /// How many notifications may wait between watcher and broadcaster.
    pub queue_capacity: usize,
    pub send_timeout: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }
}

/// Owns everything between the engine's event feed and the viewers: the
/// queue, the registry, and the two tasks moving notifications along.
pub struct EventPipeline {
    registry: Arc<SubscriberRegistry>,
    watcher: JoinHandle<Result<(), WatchError>>,
    broadcaster: JoinHandle<()>,
}

impl EventPipeline {
    /// Spawn the watcher and the broadcast loop. Must be called from within
    /// a tokio runtime.
    pub fn start(engine: Arc<dyn ContainerEngine>, settings: PipelineSettings) -> Self {
        let registry = Arc::new(SubscriberRegistry::new());
        let (tx, rx) = mpsc::channel(settings.queue_capacity.max(1));

        let broadcaster = tokio::spawn(
            Broadcaster::new(Arc::clone(&registry), rx, settings.send_timeout).run(),
        );
        let watcher = tokio::spawn(watch(engine, tx));
        info!(
            "Event pipeline started (queue capacity {}, send timeout {:?})",
            settings.queue_capacity, settings.send_timeout
        );

        Self {
            registry,
            watcher,
            broadcaster,
        }
    }

    pub fn registry(&self) -> Arc<SubscriberRegistry> {
        Arc::clone(&self.registry)
    }

    /// Resolves when the watcher stops, with the reason it stopped.
    pub async fn watcher_finished(&mut self) -> Result<(), WatchError> {
        (&mut self.watcher).await?
    }

    pub fn shutdown(self) {
        self.watcher.abort();
        self.broadcaster.abort();
        let dropped = self.registry.clear();
        info!("Event pipeline stopped, disconnected {dropped} subscribers");
    }
}
