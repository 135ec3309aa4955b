use std::sync::Arc;
use std::time::Duration;

use futures::future;
use log::{debug, info, warn};
use tokio::sync::mpsc::Receiver;

use super::notification::Notification;
use super::registry::{SendError, Subscriber, SubscriberId, SubscriberRegistry};

pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// What happened to one subscriber during one broadcast.
enum Delivery {
    Delivered,
    Dropped(SubscriberId),
    Kept,
}

/// Single consumer of the notification queue.
///
/// Each notification is offered to a snapshot of the registry. Cycles never
/// overlap, so every subscriber sees notifications in queue order.
pub struct Broadcaster {
    registry: Arc<SubscriberRegistry>,
    incoming: Receiver<Notification>,
    send_timeout: Duration,
}

impl Broadcaster {
    pub fn new(
        registry: Arc<SubscriberRegistry>,
        incoming: Receiver<Notification>,
        send_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            incoming,
            send_timeout,
        }
    }

    pub async fn run(mut self) {
        info!("Broadcast loop started");
        while let Some(notification) = self.incoming.recv().await {
            self.publish(&notification).await;
        }
        info!("Event queue closed, broadcast loop stopped");
    }

    /// Offer `notification` to everyone registered right now and prune the
    /// ones whose connection is gone. Returns how many received it.
    pub async fn publish(&self, notification: &Notification) -> usize {
        let subscribers = self.registry.snapshot();
        if subscribers.is_empty() {
            debug!(
                "No subscribers, dropping {} event for {}",
                notification.status, notification.id
            );
            return 0;
        }
        debug!(
            "Publishing {} event for {} to {} subscribers",
            notification.status,
            notification.id,
            subscribers.len()
        );

        let outcomes = future::join_all(
            subscribers
                .iter()
                .map(|subscriber| self.deliver(subscriber, notification)),
        )
        .await;

        let mut delivered = 0;
        let mut dropped = Vec::new();
        for outcome in outcomes {
            match outcome {
                Delivery::Delivered => delivered += 1,
                Delivery::Dropped(id) => dropped.push(id),
                Delivery::Kept => {}
            }
        }
        self.registry.remove(&dropped);

        delivered
    }

    async fn deliver(&self, subscriber: &Subscriber, notification: &Notification) -> Delivery {
        let result = match tokio::time::timeout(self.send_timeout, subscriber.send(notification))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(SendError::Timeout(self.send_timeout)),
        };

        match result {
            Ok(()) => Delivery::Delivered,
            Err(e) if e.is_transport() => {
                warn!(
                    "Dropping subscriber {} ({}): {e}",
                    subscriber.id(),
                    subscriber.peer()
                );
                // Let the owner start tearing down before the rest of the
                // cycle finishes
                subscriber.disconnect();
                Delivery::Dropped(subscriber.id())
            }
            Err(e) => {
                warn!(
                    "Failed to send to subscriber {} ({}), keeping it: {e}",
                    subscriber.id(),
                    subscriber.peer()
                );
                Delivery::Kept
            }
        }
    }
}
