//! Logging and tracing setup.
//!
//! Logs go to stderr so that progress output on stdout stays readable. The
//! formatter is either human-oriented or JSON for log aggregation.

use std::time::Duration;

use tokio::time::Instant;
use tracing::Level;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::{SubscriberInitExt, TryInitError},
};

use crate::config::LoggingConfig;

/// Install the global subscriber.
///
/// `RUST_LOG` overrides the level chosen from `config.verbose`.
///
/// ```ignore
/// syncwatch::logging::init(&LoggingConfig { verbose: true, ..Default::default() })?;
/// ```
pub fn init(config: &LoggingConfig) -> Result<(), TryInitError> {
    let default_level = if config.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "syncwatch={}",
            default_level.as_str().to_lowercase()
        ))
    });

    if config.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .with_span_events(FmtSpan::CLOSE)
                    .with_current_span(true)
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    }
}

/// Rate limiter for one repeating log line, such as a poll loop that keeps
/// failing against an unreachable backend.
///
/// Owned by a single task. Uses tokio's clock, so paused test time applies.
#[derive(Debug)]
pub struct LogThrottle {
    interval: Duration,
    last_logged: Option<Instant>,
}

impl LogThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_logged: None,
        }
    }

    /// True for the first call and then at most once per `interval`.
    pub fn should_log(&mut self) -> bool {
        let now = Instant::now();
        match self.last_logged {
            Some(last) if now.duration_since(last) < self.interval => false,
            _ => {
                self.last_logged = Some(now);
                true
            }
        }
    }

    /// Forget the last log, e.g. once the failing operation succeeds again.
    pub fn reset(&mut self) {
        self.last_logged = None;
    }
}
