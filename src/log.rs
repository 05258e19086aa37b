//! Leveled, independently maskable logging.
//!
//! The containers never panic on bad caller input; instead they report the
//! problem here and return a failure value. Each level can be switched on or
//! off on its own. Enabled events are forwarded to `tracing` so the host
//! application decides where they end up.

use core::fmt;
use core::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};

pub use crate::error::ParseMaskError;

/// Name of the environment variable read by [`init_from_env`].
pub const LOG_ENV_VAR: &str = "RC_COLLECTIONS_LOG";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Level {
    /// Internal state transitions (growth, recentering).
    Trace,
    /// Resource exhaustion.
    Critical,
    /// Precondition violations by the caller.
    Assert,
    Info,
}

impl Level {
    const fn bit(self) -> u8 {
        match self {
            Level::Trace => 1 << 0,
            Level::Critical => 1 << 1,
            Level::Assert => 1 << 2,
            Level::Info => 1 << 3,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Critical => "critical",
            Level::Assert => "assert",
            Level::Info => "info",
        }
    }
}

/// Set of enabled levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LogMask(u8);

impl LogMask {
    pub const NONE: LogMask = LogMask(0);
    pub const ALL: LogMask = LogMask(0b1111);
    pub const DEFAULT: LogMask = LogMask(Level::Critical.bit() | Level::Assert.bit());

    pub const fn with(self, level: Level) -> Self {
        LogMask(self.0 | level.bit())
    }

    pub const fn without(self, level: Level) -> Self {
        LogMask(self.0 & !level.bit())
    }

    pub const fn contains(self, level: Level) -> bool {
        self.0 & level.bit() != 0
    }
}

impl Default for LogMask {
    fn default() -> Self {
        LogMask::DEFAULT
    }
}

impl FromStr for LogMask {
    type Err = ParseMaskError;

    /// Parses a comma separated list such as `"trace,critical"`, or one of
    /// `"all"` / `"none"`. Whitespace and case are ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut mask = LogMask::NONE;
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            mask = match part.to_ascii_lowercase().as_str() {
                "all" => LogMask::ALL,
                "none" => LogMask::NONE,
                "trace" => mask.with(Level::Trace),
                "critical" => mask.with(Level::Critical),
                "assert" => mask.with(Level::Assert),
                "info" => mask.with(Level::Info),
                _ => return Err(ParseMaskError(part.to_string())),
            };
        }
        Ok(mask)
    }
}

static MASK: AtomicU8 = AtomicU8::new(LogMask::DEFAULT.0);

pub fn mask() -> LogMask {
    LogMask(MASK.load(Ordering::Relaxed))
}

/// Replace the process-wide mask, returning the previous one.
pub fn set_mask(mask: LogMask) -> LogMask {
    LogMask(MASK.swap(mask.0, Ordering::Relaxed))
}

#[inline]
pub fn enabled(level: Level) -> bool {
    mask().contains(level)
}

/// Apply the mask named by `RC_COLLECTIONS_LOG`, if set.
///
/// An unset variable keeps the current mask; an unparsable value is reported
/// and leaves the mask unchanged.
pub fn init_from_env() -> Result<LogMask, ParseMaskError> {
    match std::env::var(LOG_ENV_VAR) {
        Ok(value) => {
            let parsed: LogMask = value.parse()?;
            set_mask(parsed);
            Ok(parsed)
        }
        Err(_) => Ok(mask()),
    }
}

#[doc(hidden)]
pub fn __emit(level: Level, module: &str, args: fmt::Arguments<'_>) {
    match level {
        Level::Trace => tracing::trace!(target: "rc_collections", module, "{}", args),
        Level::Critical => tracing::error!(target: "rc_collections", module, "{}", args),
        Level::Assert => tracing::warn!(target: "rc_collections", module, "{}", args),
        Level::Info => tracing::info!(target: "rc_collections", module, "{}", args),
    }
}

#[macro_export]
#[doc(hidden)]
macro_rules! __rc_log {
    ($level:expr, $($arg:tt)*) => {
        if $crate::log::enabled($level) {
            $crate::log::__emit($level, module_path!(), format_args!($($arg)*));
        }
    };
}

#[macro_export]
macro_rules! rc_trace {
    ($($arg:tt)*) => { $crate::__rc_log!($crate::log::Level::Trace, $($arg)*) };
}

#[macro_export]
macro_rules! rc_critical {
    ($($arg:tt)*) => { $crate::__rc_log!($crate::log::Level::Critical, $($arg)*) };
}

#[macro_export]
macro_rules! rc_info {
    ($($arg:tt)*) => { $crate::__rc_log!($crate::log::Level::Info, $($arg)*) };
}

/// Report a failed precondition. Evaluates to `true` when `cond` holds, so
/// callers can write `if !rc_assert!(i < len, "...") { return Err(..) }`.
#[macro_export]
macro_rules! rc_assert {
    ($cond:expr, $($arg:tt)*) => {{
        let ok: bool = $cond;
        if !ok {
            $crate::__rc_log!($crate::log::Level::Assert, $($arg)*);
        }
        ok
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_lists_and_keywords() {
        let m: LogMask = "trace, Critical".parse().unwrap();
        assert!(m.contains(Level::Trace));
        assert!(m.contains(Level::Critical));
        assert!(!m.contains(Level::Assert));
        assert!(!m.contains(Level::Info));

        assert_eq!("all".parse::<LogMask>().unwrap(), LogMask::ALL);
        assert_eq!("none".parse::<LogMask>().unwrap(), LogMask::NONE);
        assert_eq!("".parse::<LogMask>().unwrap(), LogMask::NONE);
        assert!("loud".parse::<LogMask>().is_err());
    }

    #[test]
    fn unknown_level_is_named_in_the_error() {
        let err = "trace, loud".parse::<LogMask>().unwrap_err();
        assert_eq!(err, ParseMaskError("loud".to_string()));
        assert_eq!(err.to_string(), "unknown log level `loud`");
        let _: &dyn std::error::Error = &err;
    }

    #[test]
    fn levels_mask_independently() {
        let m = LogMask::NONE.with(Level::Assert).with(Level::Info);
        assert!(m.contains(Level::Assert));
        assert!(m.contains(Level::Info));
        let m = m.without(Level::Assert);
        assert!(!m.contains(Level::Assert));
        assert!(m.contains(Level::Info));
    }

    #[test]
    fn assert_macro_yields_condition() {
        assert!(crate::rc_assert!(1 + 1 == 2, "math"));
        assert!(!crate::rc_assert!(1 + 1 == 3, "math is {}", "broken"));
    }
}
