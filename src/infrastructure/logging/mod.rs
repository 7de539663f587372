//! Logging setup and the audit trail.

pub mod audit;

pub use audit::{AuditLogger, AuditRecord};

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::infrastructure::config::LoggingConfig;

/// Initialize tracing from config. Returns the appender guard that must be
/// kept alive for the process lifetime when file logging is enabled.
pub fn init_tracing(config: &LoggingConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.clone()));

    let mut guard = None;
    let file_writer = config.file_dir.as_ref().map(|dir| {
        let appender = tracing_appender::rolling::daily(dir, "atabus.log");
        let (writer, g) = tracing_appender::non_blocking(appender);
        guard = Some(g);
        writer
    });

    if config.format == "json" {
        let registry = tracing_subscriber::registry().with(filter).with(fmt::layer().json());
        match file_writer {
            Some(writer) => {
                let _ = registry
                    .with(fmt::layer().json().with_writer(writer).with_ansi(false))
                    .try_init();
            }
            None => {
                let _ = registry.try_init();
            }
        }
    } else {
        let registry = tracing_subscriber::registry().with(filter).with(fmt::layer());
        match file_writer {
            Some(writer) => {
                let _ = registry
                    .with(fmt::layer().json().with_writer(writer).with_ansi(false))
                    .try_init();
            }
            None => {
                let _ = registry.try_init();
            }
        }
    }
    guard
}
