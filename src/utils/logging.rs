
use clap::ValueEnum;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::{fmt, EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use crate::config::service::ServiceConfig;
use crate::config::settings::{LogFormat, LoggingConfig};


#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogLevel {
    TRACE,
    DEBUG,
    INFO,
    WARN,
    ERROR,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match *self {
            LogLevel::TRACE => "trace",
            LogLevel::DEBUG => "debug",
            LogLevel::INFO => "info",
            LogLevel::WARN => "warn",
            LogLevel::ERROR => "error",
        }
    }
}


/// CLI level wins over the config file, config over the `info` default.
pub fn run(service_config: &ServiceConfig, arg_log_level: Option<LogLevel>) {
    let logging_config = resolve(service_config.settings.logging.as_ref(), arg_log_level);
    init_logging(&logging_config);
}

fn resolve(config: Option<&LoggingConfig>, arg_log_level: Option<LogLevel>) -> LoggingConfig {
    let level = arg_log_level
        .map(|level| level.as_str().to_owned())
        .or_else(|| config.map(|config| config.level.to_lowercase()))
        .unwrap_or_else(|| "info".to_owned());
    let format = config
        .map(|config| config.format.to_owned())
        .unwrap_or(LogFormat::Compact);
    LoggingConfig::new(level, format)
}


/// Initialize tracing with the desired config.
pub fn init_logging(cfg: &LoggingConfig) {
    let env_filter = EnvFilter::try_new(&cfg.level)
        .unwrap_or_else(|_| EnvFilter::new("info"));

    // Base layer: filter + writer
    let registry = tracing_subscriber::registry().with(env_filter);

    // Choose format layer
    match cfg.format {
        LogFormat::Json => {
            let layer = fmt::layer()
                .json()
                .with_timer(UtcTime::rfc_3339())
                .flatten_event(true) // flattens fields, good for CRI log parsers
                .with_ansi(false); // CRI parsers dislike ANSI color codes

            let _ = registry.with(layer).try_init();
        }
        LogFormat::Compact => {
            let layer = fmt::layer()
                .compact()
                .with_timer(UtcTime::rfc_3339())
                .with_ansi(true);

            let _ = registry.with(layer).try_init();
        }
    };
}
