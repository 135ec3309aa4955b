pub mod broadcast;
pub mod notification;
pub mod pipeline;
pub mod registry;
#[cfg(test)]
pub mod testing;
pub mod watcher;

pub use notification::Notification;
pub use pipeline::{EventPipeline, PipelineSettings};
pub use registry::{Connection, Registration, SendError, SubscriberRegistry};
