//! The set of live viewer connections.
//!
//! Every subscriber is stored under a time-ordered id behind one lock. The
//! lock is only ever held to copy or edit the map, never while talking to a
//! peer, so a slow connection cannot hold up new registrations.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use log::info;
use tokio::sync::oneshot;
use uuid::Uuid;

use super::notification::Notification;

pub type SubscriberId = Uuid;

#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("Connection lost: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Peer did not accept the notification within {0:?}")]
    Timeout(Duration),
    #[error("Peer refused the notification: {0}")]
    Rejected(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Unable to serialize notification: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl SendError {
    /// The peer is gone or unresponsive, as opposed to a one-off failure on
    /// our side.
    pub fn is_transport(&self) -> bool {
        matches!(self, SendError::Transport(_) | SendError::Timeout(_))
    }
}

/// A duplex connection to one remote viewer.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Human readable peer description, for logs.
    fn peer(&self) -> String;

    async fn send(&self, notification: &Notification) -> Result<(), SendError>;
}

pub struct Subscriber {
    id: SubscriberId,
    connection: Box<dyn Connection>,
    disconnected: Mutex<Option<oneshot::Sender<()>>>,
}

impl Subscriber {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn peer(&self) -> String {
        self.connection.peer()
    }

    pub async fn send(&self, notification: &Notification) -> Result<(), SendError> {
        self.connection.send(notification).await
    }

    /// Fire the disconnected signal. Only the first call does anything;
    /// returns whether this call was it.
    pub fn disconnect(&self) -> bool {
        match lock(&self.disconnected).take() {
            Some(tx) => {
                // The owner may already have stopped listening
                let _ = tx.send(());
                true
            }
            None => false,
        }
    }
}

/// Handed back by [`SubscriberRegistry::register`].
///
/// `disconnected` resolves once the subscriber has been dropped from the
/// registry; the owner should then tear its connection down.
pub struct Registration {
    pub id: SubscriberId,
    pub disconnected: oneshot::Receiver<()>,
}

#[derive(Default)]
pub struct SubscriberRegistry {
    subscribers: Mutex<BTreeMap<SubscriberId, Arc<Subscriber>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, connection: Box<dyn Connection>) -> Registration {
        let (tx, rx) = oneshot::channel();
        let id = Uuid::now_v7();
        let peer = connection.peer();
        let subscriber = Arc::new(Subscriber {
            id,
            connection,
            disconnected: Mutex::new(Some(tx)),
        });

        let count = {
            let mut subscribers = lock(&self.subscribers);
            subscribers.insert(id, subscriber);
            subscribers.len()
        };
        info!("Registered subscriber {id} for {peer} ({count} connected)");

        Registration {
            id,
            disconnected: rx,
        }
    }

    /// Point-in-time copy of the current subscribers. Registrations made
    /// after this returns are not part of it.
    pub fn snapshot(&self) -> Vec<Arc<Subscriber>> {
        lock(&self.subscribers).values().cloned().collect()
    }

    /// Drop the given subscribers and fire their disconnected signals.
    /// Unknown ids are ignored. Returns how many were removed.
    pub fn remove(&self, ids: &[SubscriberId]) -> usize {
        if ids.is_empty() {
            return 0;
        }

        let (removed, remaining) = {
            let mut subscribers = lock(&self.subscribers);
            if subscribers.is_empty() {
                return 0;
            }
            let removed: Vec<_> = ids.iter().filter_map(|id| subscribers.remove(id)).collect();
            (removed, subscribers.len())
        };

        for subscriber in &removed {
            subscriber.disconnect();
            info!(
                "Removed subscriber {} for {} ({remaining} connected)",
                subscriber.id(),
                subscriber.peer()
            );
        }
        removed.len()
    }

    /// Remove everyone, e.g. on shutdown.
    pub fn clear(&self) -> usize {
        let removed = std::mem::take(&mut *lock(&self.subscribers));
        for subscriber in removed.values() {
            subscriber.disconnect();
        }
        removed.len()
    }

    pub fn len(&self) -> usize {
        lock(&self.subscribers).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.subscribers).is_empty()
    }
}
