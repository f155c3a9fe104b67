use std::io;
use std::path::PathBuf;

use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use imsfinder::{Imsfinder, ImsfinderError};

#[cfg(feature = "mimalloc")]
use mimalloc::MiMalloc;

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn configure_log(log_file: Option<&PathBuf>) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let stderr_layer = fmt::layer()
        .compact()
        .with_timer(fmt::time::ChronoLocal::rfc_3339())
        .with_writer(io::stderr)
        .with_filter(
            EnvFilter::builder()
                .with_default_directive(tracing::Level::INFO.into())
                .from_env_lossy(),
        );

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let directory = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."));
            let file_name = path.file_name().map(PathBuf::from).unwrap_or_else(|| PathBuf::from("imsfinder.log"));
            let appender = tracing_appender::rolling::never(directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .compact()
                .with_ansi(false)
                .with_timer(fmt::time::ChronoLocal::rfc_3339())
                .with_writer(writer)
                .with_filter(
                    EnvFilter::builder()
                        .with_default_directive(tracing::Level::DEBUG.into())
                        .from_env_lossy(),
                );
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let subscriber = tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer);
    tracing::subscriber::set_global_default(subscriber)
        .expect("a global subscriber was already set");
    tracing_log::LogTracer::init().expect("a global logger was already set");
    guard
}

fn main() -> Result<(), ImsfinderError> {
    let args = Imsfinder::parse();

    let mut config = Figment::new()
        .merge(Serialized::defaults(&args))
        .merge(Toml::file("imsfinder.toml"));
    if let Some(path) = args.config_file.as_ref() {
        config = config.merge(Toml::file_exact(path));
    }
    config = config.merge(Env::prefixed("IMSFINDER_").split("__"));

    let _guard = configure_log(args.log_file.as_ref());

    let driver: Imsfinder = match config.extract() {
        Ok(driver) => driver,
        Err(e) => {
            tracing::error!("Failed to read configuration: {e}");
            std::process::exit(2);
        }
    };
    driver.main()?;
    Ok(())
}
