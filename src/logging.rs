//! Tracing subscriber setup for the CLI and server.

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, prelude::*};

use crate::config::{LogFormat, LoggingSection};

const LOG_FILE_PREFIX: &str = "teamboard.log";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Pick the filter: `--verbose` wins, then `RUST_LOG`, then the configured
/// level (which already includes `TEAMBOARD_LOG`).
pub fn build_filter(config: &LoggingSection, verbose: bool) -> Result<EnvFilter> {
    if verbose {
        return Ok(EnvFilter::new("teamboard=debug,tower_http=debug,info"));
    }
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(&config.level)
        .with_context(|| format!("Invalid log level '{}'", config.level))
}

/// Install the global subscriber. Logs go to stderr, and also to a daily
/// rolling file when `config.dir` is set.
///
/// The returned guard flushes the file writer on drop; hold it for the
/// life of the process.
pub fn init_logging(config: &LoggingSection, verbose: bool) -> Result<Option<WorkerGuard>> {
    let filter = build_filter(config, verbose)?;

    let stderr_layer: BoxedLayer = match config.format {
        LogFormat::Pretty => fmt::layer().with_writer(std::io::stderr).boxed(),
        LogFormat::Json => fmt::layer().json().with_writer(std::io::stderr).boxed(),
    };
    let mut layers = vec![stderr_layer];

    let guard = match &config.dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file_layer: BoxedLayer = match config.format {
                LogFormat::Pretty => fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .boxed(),
                LogFormat::Json => fmt::layer().json().with_writer(writer).boxed(),
            };
            layers.push(file_layer);
            Some(guard)
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbose_filter_enables_debug() -> Result<()> {
        let filter = build_filter(&LoggingSection::default(), true)?;
        assert!(filter.to_string().contains("teamboard=debug"));
        Ok(())
    }

    #[test]
    fn test_invalid_level_is_rejected() {
        // RUST_LOG would take precedence over the configured level.
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        let config = LoggingSection {
            level: "teamboard=loudest".to_string(),
            ..LoggingSection::default()
        };
        assert!(build_filter(&config, false).is_err());
    }
}
