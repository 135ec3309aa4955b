use std::{path::PathBuf, sync::OnceLock};

use clap::Parser;

/// Live container state and event fan-out for a Docker host.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Path to the config file.
    #[arg(short, long, default_value = "dockwatch.toml")]
    pub config: PathBuf,
    /// Docker daemon address (unix://, tcp:// or http://).
    #[arg(long)]
    pub docker_host: Option<String>,
    /// Port the HTTP service listens on.
    #[arg(short, long)]
    pub port: Option<u16>,
    /// Timeout in seconds for requests to the Docker daemon.
    #[arg(long)]
    pub timeout_secs: Option<u64>,
    /// Number of events that may wait for the broadcaster.
    #[arg(long)]
    pub queue_capacity: Option<usize>,
    /// Seconds a viewer gets to accept an event before it is dropped.
    #[arg(long)]
    pub send_timeout_secs: Option<u64>,
}

static ARGS: OnceLock<Args> = OnceLock::new();

pub fn get_cli_args() -> &'static Args {
    ARGS.get_or_init(Args::parse)
}
