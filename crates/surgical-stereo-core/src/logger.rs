//! Stderr logger for tools and tests built on the workspace.
//!
//! Lines look like `[  0.123s  INFO dots] message`, where the last field is
//! the final segment of the record's target. Library code only emits
//! records; installing a logger is left to the binary.
//!
//! Both the `log` logger and the `tracing` subscriber take their level from
//! [`LOG_ENV`].

use std::fmt::Arguments;
use std::io::Write;
use std::sync::OnceLock;
use std::time::Instant;

use log::{Level, LevelFilter, Log, Metadata, Record};

#[cfg(feature = "tracing")]
use tracing_subscriber::fmt::format::FmtSpan;
#[cfg(feature = "tracing")]
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
#[cfg(feature = "tracing")]
use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable read by [`init_from_env`] and `init_tracing`.
pub const LOG_ENV: &str = "SURGICAL_STEREO_LOG";

const DEFAULT_LEVEL: LevelFilter = LevelFilter::Info;

/// Pipeline stage named by a record target: `surgical_stereo_dense::seeds`
/// becomes `seeds`.
fn stage(target: &str) -> &str {
    target.rsplit("::").next().unwrap_or(target)
}

fn format_line(elapsed: f64, level: Level, target: &str, args: &Arguments<'_>) -> String {
    format!("[{elapsed:8.3}s {level:>5} {}] {args}", stage(target))
}

/// Level named by `value`, falling back to `info` when unset or unknown.
fn parse_level(value: Option<&str>) -> LevelFilter {
    value
        .and_then(|v| v.trim().parse::<LevelFilter>().ok())
        .unwrap_or(DEFAULT_LEVEL)
}

struct StageLogger {
    level: LevelFilter,
    started: Instant,
}

impl Log for StageLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format_line(
            self.started.elapsed().as_secs_f64(),
            record.level(),
            record.target(),
            record.args(),
        );
        let _ = writeln!(std::io::stderr().lock(), "{line}");
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

static LOGGER: OnceLock<StageLogger> = OnceLock::new();

/// Install the stderr logger with `level`.
///
/// Later calls keep the first logger.
pub fn init_with_level(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    if LOGGER.get().is_none() {
        let logger = LOGGER.get_or_init(|| StageLogger {
            level,
            started: Instant::now(),
        });
        log::set_logger(logger)?;
        log::set_max_level(level);
    }
    Ok(())
}

/// Install the stderr logger with the level named by `SURGICAL_STEREO_LOG`
/// (`error`, `warn`, `info`, `debug`, `trace`, `off`), defaulting to `info`.
pub fn init_from_env() -> Result<(), log::SetLoggerError> {
    init_with_level(parse_level(std::env::var(LOG_ENV).ok().as_deref()))
}

/// Install a `tracing` subscriber that reports span timings, as JSON lines
/// when `json` is set.
///
/// The filter is read from `SURGICAL_STEREO_LOG` using `EnvFilter`
/// directives (for example `surgical_stereo_dense=debug`), defaulting to
/// `info`. Fails if a global subscriber is already installed.
#[cfg(feature = "tracing")]
pub fn init_tracing(json: bool) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LEVEL.to_string().to_lowercase()));
    let spans = fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(true);
    if json {
        spans.json().flatten_event(true).finish().try_init()
    } else {
        spans
            .with_timer(fmt::time::Uptime::default())
            .finish()
            .try_init()
    }
}
