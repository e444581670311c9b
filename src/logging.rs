//! Tracing setup shared by the service and the client

use std::io::Write;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

/// Install the global subscriber writing to `writer`.
///
/// `RUST_LOG` takes precedence over the configured level. Keep the returned
/// guard alive until exit or buffered lines are lost.
pub fn init<W>(config: &LoggingConfig, writer: W) -> WorkerGuard
where
    W: Write + Send + 'static,
{
    let (writer, guard) = tracing_appender::non_blocking(writer);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "lending_desk={level},lending_client={level}",
            level = config.level
        )
        .into()
    });

    let registry = tracing_subscriber::registry().with(filter);

    let installed = if config.format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(writer))
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(writer))
            .try_init()
    };

    if let Err(e) = installed {
        eprintln!("Logging already initialized: {}", e);
    }

    guard
}
