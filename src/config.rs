use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::cli::Args;
use crate::docker::DEFAULT_DOCKER_HOST;
use crate::events::PipelineSettings;
use crate::events::broadcast::DEFAULT_SEND_TIMEOUT;
use crate::events::pipeline::DEFAULT_QUEUE_CAPACITY;
use crate::http::DEFAULT_PORT;

const DEFAULT_TIMEOUT_SECS: u64 = 32;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("queue_capacity must be at least 1")]
    ZeroQueueCapacity,
    #[error("send_timeout_secs must be at least 1")]
    ZeroSendTimeout,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub docker_host: String,
    pub port: u16,
    /// Docker request timeout, in seconds.
    pub timeout_secs: u64,
    pub queue_capacity: usize,
    pub send_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            docker_host: DEFAULT_DOCKER_HOST.to_string(),
            port: DEFAULT_PORT,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            send_timeout_secs: DEFAULT_SEND_TIMEOUT.as_secs(),
        }
    }
}

impl Config {
    fn try_init_from_string(val: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(val)?)
    }

    /// Read the config file at `path`. A missing file means defaults.
    pub fn try_init_from_file(path: &Path) -> Result<Self, ConfigError> {
        use std::io::Read;
        match std::fs::File::open(path) {
            Ok(mut file) => {
                let mut config = String::new();
                file.read_to_string(&mut config)?;
                Self::try_init_from_string(&config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("No config file at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Load the file named on the command line and apply the flags on top.
    pub fn try_init(args: &Args) -> Result<Self, ConfigError> {
        let config = Self::try_init_from_file(&args.config)?.with_overrides(args);
        config.validate()?;
        Ok(config)
    }

    pub fn with_overrides(mut self, args: &Args) -> Self {
        if let Some(docker_host) = &args.docker_host {
            self.docker_host = docker_host.clone();
        }
        if let Some(port) = args.port {
            self.port = port;
        }
        if let Some(timeout_secs) = args.timeout_secs {
            self.timeout_secs = timeout_secs;
        }
        if let Some(queue_capacity) = args.queue_capacity {
            self.queue_capacity = queue_capacity;
        }
        if let Some(send_timeout_secs) = args.send_timeout_secs {
            self.send_timeout_secs = send_timeout_secs;
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_capacity == 0 {
            return Err(ConfigError::ZeroQueueCapacity);
        }
        if self.send_timeout_secs == 0 {
            return Err(ConfigError::ZeroSendTimeout);
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            queue_capacity: self.queue_capacity,
            send_timeout: Duration::from_secs(self.send_timeout_secs),
        }
    }
}
