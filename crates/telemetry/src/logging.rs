use std::env;
use std::io;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Console log format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable, for running the monitor by hand
    #[default]
    Pretty,
    /// One JSON object per line
    Json,
}

impl LogFormat {
    /// `LOG_FORMAT`, falling back to pretty output
    pub fn from_env() -> Self {
        env::var("LOG_FORMAT")
            .map(|v| Self::parse(&v))
            .unwrap_or_default()
    }

    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Pretty
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub format: LogFormat,
    pub service_name: String,
    pub service_version: String,
    /// Monitored location, attached to the startup line
    pub location: Option<String>,
    /// Also write JSON lines to a daily rolling file here (`LOG_DIR`)
    pub log_dir: Option<PathBuf>,
}

impl LogConfig {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            format: LogFormat::from_env(),
            service_name: service_name.into(),
            service_version: String::from("0.1.0"),
            location: None,
            log_dir: env::var("LOG_DIR").ok().map(PathBuf::from),
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.service_version = version.into();
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// `<service>.log`, rotated daily by the appender
    fn file_prefix(&self) -> String {
        format!("{}.log", self.service_name)
    }
}

/// Install the global subscriber.
///
/// With a log directory configured the returned guard must live until
/// shutdown, otherwise buffered file lines are lost.
pub fn init_structured_logging(config: LogConfig) -> Option<WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,tokio=warn"));

    let (file_layer, guard) = match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, config.file_prefix());
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().json().with_current_span(true).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let registry = tracing_subscriber::registry().with(filter).with(file_layer);
    match config.format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_target(true)
                    .with_thread_names(true)
                    .with_writer(io::stdout),
            )
            .init(),
        LogFormat::Pretty => registry
            .with(fmt::layer().pretty().with_target(true).with_line_number(true))
            .init(),
    }

    tracing::info!(
        service.name = %config.service_name,
        service.version = %config.service_version,
        location = ?config.location,
        format = ?config.format,
        log_dir = ?config.log_dir,
        "structured logging initialized"
    );

    guard
}
