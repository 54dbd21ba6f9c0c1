//! Structured logging setup.

use anyhow::{Result, anyhow};
use tracing::Subscriber;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::{LogFormat, LoggingConfig};

/// Build the filter: `RUST_LOG` if set, else the configured directive.
pub fn env_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&config.filter)
            .map_err(|e| anyhow!("Invalid log filter {:?}: {}", config.filter, e)),
    }
}

/// Formatting layer for the configured output format.
pub fn fmt_layer<S, W>(format: LogFormat, writer: W) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .pretty()
            .with_writer(writer)
            .boxed(),
        LogFormat::Compact => tracing_subscriber::fmt::layer()
            .compact()
            .with_writer(writer)
            .boxed(),
    }
}

/// Install the global subscriber, writing to stdout.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let filter = env_filter(config)?;

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer(config.format, std::io::stdout))
        .try_init()
        .map_err(|e| anyhow!("Failed to initialize logging: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_log::CapturedLogs;

    fn render(format: LogFormat) -> String {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber =
            tracing_subscriber::registry().with(fmt_layer(format, move || writer.clone()));

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(port = 8080, "Server listening");
        });
        logs.contents()
    }

    #[test]
    fn test_pretty_format_is_multi_line() {
        let output = render(LogFormat::Pretty);
        assert!(output.contains("Server listening"), "{output}");
        // Pretty output puts the source location on its own line.
        assert!(output.contains("logging.rs"), "{output}");
        assert!(output.trim_end().lines().count() > 1, "{output}");
    }

    #[test]
    fn test_compact_format_is_single_line() {
        let output = render(LogFormat::Compact);
        assert!(output.contains("Server listening"), "{output}");
        assert_eq!(output.trim_end().lines().count(), 1, "{output}");
    }

    #[test]
    fn test_invalid_filter_rejected() {
        // Only meaningful when RUST_LOG is not overriding the config.
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        let config = LoggingConfig {
            filter: "enclave_ack=notalevel".to_string(),
            format: LogFormat::Pretty,
        };
        assert!(env_filter(&config).is_err());
    }

    #[test]
    fn test_default_filter_accepted() {
        assert!(env_filter(&LoggingConfig::default()).is_ok());
    }
}
