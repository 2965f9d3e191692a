use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use mediakit_session::null::{NullBackend, NullOptions};
use mediakit_session::{GraphBackend, MediaLibrary};

mod cli;
mod commands;
mod config;

use cli::Command;
use config::{BackendKind, Config, LogConfig};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = cli::Args::parse();
    let mut config = Config::load(&args.config)?;
    if let Some(backend) = args.backend {
        config.backend = backend;
    }
    init_tracing(&config.log);
    info!(config = %args.config, backend = ?config.backend, "mediakit starting");

    let library = MediaLibrary::load(make_backend(config.backend)?)?;
    let backend = library.backend().clone();

    let result = match args.command {
        Command::Play(play) => commands::play(backend.as_ref(), &config, play).await,
        Command::Probe { uri } => commands::probe(backend.as_ref(), &config, &uri),
        Command::Camera(camera) => commands::camera(backend.as_ref(), &config, camera).await,
        Command::Cameras => commands::cameras(backend.as_ref()),
    };

    drop(backend);
    library.unload();
    result
}

fn init_tracing(log: &LogConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.filter));
    // Notifications own stdout.
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if log.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn make_backend(kind: BackendKind) -> Result<Arc<dyn GraphBackend>> {
    match kind {
        BackendKind::Null => Ok(Arc::new(NullBackend::new(NullOptions {
            realtime: true,
            record_calls: false,
            ..NullOptions::default()
        }))),
        #[cfg(feature = "gst")]
        BackendKind::Gst => Ok(Arc::new(mediakit_session::gst::GstBackend::new())),
        #[cfg(not(feature = "gst"))]
        BackendKind::Gst => anyhow::bail!("mediakit was built without the `gst` feature"),
    }
}
