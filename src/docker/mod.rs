pub mod client;
pub mod record;
pub mod resolver;

#[cfg(test)]
pub mod fake;

pub use client::{ContainerEngine, DEFAULT_DOCKER_HOST, connect};
pub use record::ContainerRecord;
pub use resolver::StateResolver;
