//! Engine Logging Layer
//!
//! The engine runs inside a hypervisor and never owns an output device.
//! The embedder registers a [`LogSink`] once at bring-up; until then every
//! log call is a cheap level check and a no-op. The hot sampling paths
//! (`touch`, `forget`) do not log at all; only the control surface does.

use core::fmt;
use core::sync::atomic::{AtomicU8, Ordering};

use spin::RwLock;

static LOG_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::INFO.priority());
static SINK: RwLock<Option<&'static dyn LogSink>> = RwLock::new(None);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    FATAL,
    ERROR,
    WARN,
    INFO,
    DEBUG,
    TRACE,
}

impl LogLevel {
    pub const fn as_str(self) -> &'static str {
        match self {
            LogLevel::FATAL => "FATAL",
            LogLevel::ERROR => "ERROR",
            LogLevel::WARN => "WARN",
            LogLevel::INFO => "INFO",
            LogLevel::DEBUG => "DEBUG",
            LogLevel::TRACE => "TRACE",
        }
    }

    pub const fn priority(self) -> u8 {
        match self {
            LogLevel::FATAL => 0,
            LogLevel::ERROR => 1,
            LogLevel::WARN => 2,
            LogLevel::INFO => 3,
            LogLevel::DEBUG => 4,
            LogLevel::TRACE => 5,
        }
    }

    fn from_priority(value: u8) -> Self {
        match value {
            0 => LogLevel::FATAL,
            1 => LogLevel::ERROR,
            2 => LogLevel::WARN,
            3 => LogLevel::INFO,
            4 => LogLevel::DEBUG,
            _ => LogLevel::TRACE,
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        if value.eq_ignore_ascii_case("fatal") {
            Some(LogLevel::FATAL)
        } else if value.eq_ignore_ascii_case("error") {
            Some(LogLevel::ERROR)
        } else if value.eq_ignore_ascii_case("warn") || value.eq_ignore_ascii_case("warning") {
            Some(LogLevel::WARN)
        } else if value.eq_ignore_ascii_case("info") {
            Some(LogLevel::INFO)
        } else if value.eq_ignore_ascii_case("debug") {
            Some(LogLevel::DEBUG)
        } else if value.eq_ignore_ascii_case("trace") {
            Some(LogLevel::TRACE)
        } else {
            None
        }
    }
}

/// Output device supplied by the embedding hypervisor.
///
/// Implementations must tolerate calls from restrictive contexts: the engine
/// may log while holding its own spinlocks, so a sink must not call back
/// into the engine.
pub trait LogSink: Sync {
    fn write_line(&self, level: LogLevel, args: fmt::Arguments<'_>);
}

/// Register the output sink. Rejects a second registration so a booted
/// system cannot have its log stream silently redirected.
pub fn register_sink(sink: &'static dyn LogSink) -> Result<(), &'static str> {
    let mut slot = SINK.write();
    if slot.is_some() {
        return Err("log sink already registered");
    }
    *slot = Some(sink);
    Ok(())
}

/// Drop the registered sink. Subsequent log calls become no-ops.
pub fn unregister_sink() {
    *SINK.write() = None;
}

pub fn sink_registered() -> bool {
    SINK.read().is_some()
}

pub fn log(level: LogLevel, args: fmt::Arguments<'_>) {
    if level.priority() > LOG_LEVEL.load(Ordering::Relaxed) {
        return;
    }
    if let Some(sink) = *SINK.read() {
        sink.write_line(level, args);
    }
}

pub fn set_max_level(level: LogLevel) {
    LOG_LEVEL.store(level.priority(), Ordering::Relaxed);
}

pub fn max_level() -> LogLevel {
    LogLevel::from_priority(LOG_LEVEL.load(Ordering::Relaxed))
}

/// Scan a configuration string for a `log=` or `loglevel=` directive.
///
/// The hypervisor control plane passes textual options through unchanged,
/// so the engine accepts the same `loglevel=debug` convention the rest of
/// the system uses.
pub fn parse_level_directive(options: &str) -> Option<LogLevel> {
    for token in options.split_whitespace() {
        if let Some((key, value)) = token.split_once('=') {
            if key.eq_ignore_ascii_case("log") || key.eq_ignore_ascii_case("loglevel") {
                if let Some(level) = LogLevel::from_str(value) {
                    return Some(level);
                }
            }
        }
    }
    None
}

// ============================================================================
// Tests
// ============================================================================
