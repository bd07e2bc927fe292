//! Logging and metrics bootstrap shared by the server and client binaries.

use crate::error::TelemetryError;
use opentelemetry::global;
use opentelemetry_sdk::metrics::MeterProvider;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Verbosity requested on the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    #[default]
    Normal,
    Verbose,
    Debug,
}

impl LogLevel {
    pub fn from_flags(verbose: bool, debug: bool) -> Self {
        if debug {
            LogLevel::Debug
        } else if verbose {
            LogLevel::Verbose
        } else {
            LogLevel::Normal
        }
    }

    fn directive(&self) -> &'static str {
        match self {
            LogLevel::Normal | LogLevel::Verbose => "info",
            LogLevel::Debug => "debug",
        }
    }
}

/// Install the global `tracing` subscriber, reporting on stderr if one
/// could not be installed.
pub fn init_logging(level: LogLevel) {
    if let Err(e) = try_init_logging(level) {
        eprintln!("{}", e);
    }
}

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` wins when set; otherwise the level follows the CLI flags.
/// Fails if a global subscriber is already installed.
pub fn try_init_logging(level: LogLevel) -> Result<(), TelemetryError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.directive()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(level != LogLevel::Normal)
        .try_init()
        .map_err(|e| TelemetryError::LoggingInit(e.to_string()))
}

pub struct TelemetryConfig {
    pub enable_metrics: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enable_metrics: true,
        }
    }
}

pub struct TelemetryService {
    provider: Option<MeterProvider>,
}

impl TelemetryService {
    pub fn new(config: TelemetryConfig) -> Result<Self, TelemetryError> {
        if !config.enable_metrics {
            info!("Metrics collection disabled");
            return Ok(Self { provider: None });
        }

        let provider = MeterProvider::builder().build();
        global::set_meter_provider(provider.clone());

        Ok(Self {
            provider: Some(provider),
        })
    }

    /// Flush and stop the meter provider.
    pub fn shutdown(&self) -> Result<(), TelemetryError> {
        if let Some(provider) = &self.provider {
            provider
                .shutdown()
                .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
        }
        Ok(())
    }
}

// Convenience function to initialize telemetry with default configuration
pub fn init_telemetry() -> Result<TelemetryService, TelemetryError> {
    init_telemetry_with_config(TelemetryConfig::default())
}

pub fn init_telemetry_with_config(
    config: TelemetryConfig,
) -> Result<TelemetryService, TelemetryError> {
    let service = TelemetryService::new(config)?;

    // Instruments bind to whichever provider is global at first use
    crate::metrics::Metrics::init();

    info!("OpenTelemetry telemetry initialized");
    Ok(service)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_from_flags() {
        assert_eq!(LogLevel::from_flags(false, false), LogLevel::Normal);
        assert_eq!(LogLevel::from_flags(true, false), LogLevel::Verbose);
        assert_eq!(LogLevel::from_flags(true, true), LogLevel::Debug);
    }

    #[test]
    fn test_second_logging_init_reports_error() {
        // Another test may already have installed a subscriber, so only the
        // second call has a known outcome.
        let _ = try_init_logging(LogLevel::Normal);
        let err = try_init_logging(LogLevel::Debug).unwrap_err();
        assert!(matches!(err, TelemetryError::LoggingInit(_)));
    }

    #[test]
    fn test_disabled_metrics_shutdown_is_noop() {
        let service = TelemetryService::new(TelemetryConfig {
            enable_metrics: false,
        })
        .unwrap();
        assert!(service.shutdown().is_ok());
    }
}
