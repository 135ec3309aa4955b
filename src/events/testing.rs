//! Connection double that records what it was sent.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::notification::Notification;
use super::registry::{Connection, SendError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    /// The peer hung up.
    Transport,
    /// Something on our side went wrong; the peer is fine.
    Serialize,
    /// The peer never accepts the frame.
    Stall,
}

type Hook = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct State {
    received: Mutex<Vec<Notification>>,
    failure: Mutex<Option<Failure>>,
    on_send: Mutex<Option<Hook>>,
}

#[derive(Clone, Default)]
pub struct RecordingConnection {
    state: Arc<State>,
}

impl RecordingConnection {
    pub fn received(&self) -> Vec<Notification> {
        self.state.received.lock().unwrap().clone()
    }

    pub fn fail_with(&self, failure: Option<Failure>) {
        *self.state.failure.lock().unwrap() = failure;
    }

    /// Run `hook` at the start of the next send.
    pub fn on_next_send(&self, hook: impl FnOnce() + Send + 'static) {
        *self.state.on_send.lock().unwrap() = Some(Box::new(hook));
    }
}

#[async_trait]
impl Connection for RecordingConnection {
    fn peer(&self) -> String {
        "test-peer".to_string()
    }

    async fn send(&self, notification: &Notification) -> Result<(), SendError> {
        let hook = self.state.on_send.lock().unwrap().take();
        if let Some(hook) = hook {
            hook();
        }

        let failure = *self.state.failure.lock().unwrap();
        match failure {
            Some(Failure::Transport) => Err(SendError::Transport(Box::new(
                std::io::Error::new(std::io::ErrorKind::BrokenPipe, "peer went away"),
            ))),
            Some(Failure::Serialize) => Err(SendError::Serialize(
                serde_json::from_str::<Notification>("{").unwrap_err(),
            )),
            Some(Failure::Stall) => std::future::pending().await,
            None => {
                self.state
                    .received
                    .lock()
                    .unwrap()
                    .push(notification.clone());
                Ok(())
            }
        }
    }
}
