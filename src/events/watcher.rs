use std::sync::Arc;

use bollard::errors::Error as DockerError;
use chrono::Utc;
use futures_util::StreamExt;
use log::{debug, info, warn};
use tokio::sync::mpsc::Sender;

use super::notification::{Notification, Skipped};
use crate::docker::ContainerEngine;
use crate::docker::client::{event_time_nanos, is_decode_error, undecodable_event_time};

#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("Docker event stream failed: {0}")]
    Stream(#[source] DockerError),
    #[error("Docker event stream ended")]
    Ended,
    #[error("Watcher task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Follow the engine's event feed and push every container event onto
/// `outgoing`, in the order the engine emits them.
///
/// A single bad record is logged and skipped. bollard stops a feed at the
/// first record it cannot decode, so in that case the feed is reopened just
/// past the bad record and nothing after it is lost. Anything else that
/// breaks the stream, or the daemon closing it, ends the watcher: it does
/// not reconnect. Returns `Ok` only when nobody is listening on `outgoing`
/// any more.
pub async fn watch(
    engine: Arc<dyn ContainerEngine>,
    outgoing: Sender<Notification>,
) -> Result<(), WatchError> {
    info!("Watching Docker events");
    // Nanosecond instant just past the last record consumed
    let mut cursor: Option<i64> = None;
    let mut since = None;

    loop {
        let mut events = engine.events(since);
        let mut cut_short = false;

        while let Some(item) = events.next().await {
            cut_short = false;
            let message = match item {
                Ok(message) => message,
                Err(e) if is_decode_error(&e) => {
                    warn!("Skipping undecodable Docker event: {e}");
                    let skipped_to = match undecodable_event_time(&e) {
                        Some(time) => time.saturating_add(1),
                        // No way to tell when it happened, resume from now
                        None => Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX),
                    };
                    cursor = Some(cursor.map_or(skipped_to, |c| c.max(skipped_to)));
                    cut_short = true;
                    continue;
                }
                Err(e) => return Err(WatchError::Stream(e)),
            };

            if let Some(time) = event_time_nanos(&message) {
                let next = time.saturating_add(1);
                cursor = Some(cursor.map_or(next, |c| c.max(next)));
            }

            let notification = match Notification::try_from(message) {
                Ok(notification) => notification,
                Err(skipped @ Skipped::NotContainer(_)) => {
                    debug!("Ignoring event: {skipped}");
                    continue;
                }
                Err(skipped) => {
                    warn!("Skipping malformed Docker event: {skipped}");
                    continue;
                }
            };

            debug!(
                "Queueing {} event for container {}",
                notification.status, notification.id
            );
            // Blocks while the broadcast loop is behind
            if outgoing.send(notification).await.is_err() {
                info!("Event queue closed, stopping watcher");
                return Ok(());
            }
        }

        if !cut_short {
            return Err(WatchError::Ended);
        }
        info!("Docker event stream stopped at an undecodable record, reopening");
        since = cursor;
    }
}
