use std::io::Write;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use env_logger::WriteStyle;
use log::{Level, LevelFilter};

use crate::config::LoggingConfig;

/// Initializes the process logger from the configuration. The level comes only from
/// `logging.level`; `RUST_LOG` is not consulted.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let level = config.level_filter()?;
    let mut builder = env_logger::Builder::new();
    builder.filter_level(level);
    // HTTP stack internals are only useful when tracing.
    if level < LevelFilter::Trace {
        for noisy in ["hyper", "hyper_util", "reqwest", "h2", "rustls"] {
            builder.filter_module(noisy, LevelFilter::Warn);
        }
    }

    if !config.human_readable {
        builder.write_style(WriteStyle::Never);
        builder.format(|buf, record| {
            writeln!(
                buf,
                "{}",
                structured_line(
                    Utc::now(),
                    record.level(),
                    record.target(),
                    &record.args().to_string()
                )
            )
        });
    }

    builder.try_init().context("logger already initialized")
}

fn structured_line(at: DateTime<Utc>, level: Level, target: &str, message: &str) -> String {
    format!(
        "ts={} level={} target={} msg={:?}",
        at.to_rfc3339_opts(SecondsFormat::Millis, true),
        level.as_str().to_lowercase(),
        target,
        message
    )
}
