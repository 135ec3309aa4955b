use std::process::ExitCode;
use std::sync::Arc;

use log::{error, info};

use config::{Config, ConfigError};
use docker::StateResolver;
use docker::client::ConnectError;
use events::EventPipeline;
use http::AppState;

mod cli;
mod config;
mod docker;
mod events;
mod http;

#[derive(Debug, thiserror::Error)]
enum StartupError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
    #[error("Unable to connect to Docker: {0}")]
    Connect(#[from] ConnectError),
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run().await {
        Ok(code) => code,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<ExitCode, StartupError> {
    let config = Config::try_init(cli::get_cli_args())?;
    let docker = Arc::new(docker::connect(
        &config.docker_host,
        config.request_timeout(),
    )?);
    info!("Using Docker at {}", config.docker_host);

    let mut pipeline = EventPipeline::start(docker.clone(), config.pipeline_settings());
    let state = Arc::new(AppState {
        resolver: StateResolver::new(docker),
        registry: pipeline.registry(),
    });

    let code = tokio::select! {
        res = http::serve(config.port, state) => {
            match res {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    error!("HTTP service failed: {e}");
                    ExitCode::FAILURE
                }
            }
        }
        res = pipeline.watcher_finished() => {
            match res {
                Ok(()) => error!("Event watcher stopped"),
                Err(e) => error!("Event watcher stopped: {e}"),
            }
            ExitCode::FAILURE
        }
        res = tokio::signal::ctrl_c() => {
            match res {
                Ok(()) => {
                    info!("Received SIGINT, shutting down");
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    error!("Unable to listen for SIGINT: {e}");
                    ExitCode::FAILURE
                }
            }
        }
    };

    pipeline.shutdown();
    Ok(code)
}
