//! Runtime configuration.
//!
//! Two knobs are read from the environment on first use and cached:
//! - `HOSTPTHREAD_LOG`: structured event log threshold
//!   (`off|error|warn|info|debug|trace`, default `off`).
//! - `HOSTPTHREAD_SPIN_LIMIT`: busy-wait iterations a lazy-init loser spins
//!   before falling back to yielding (default 64, clamped to `0..=65536`).
//!
//! Both can be overridden programmatically; an override wins over the
//! environment from then on.

use std::sync::atomic::{AtomicU8, AtomicU32, Ordering};

use serde::{Deserialize, Serialize};

/// Severity threshold for the structured event log.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    #[default]
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Parse from string (case-insensitive). Unknown values disable logging.
    #[must_use]
    pub fn from_str_loose(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" => Self::Error,
            "warn" | "warning" => Self::Warn,
            "info" => Self::Info,
            "debug" => Self::Debug,
            "trace" | "all" => Self::Trace,
            _ => Self::Off,
        }
    }

    const fn to_u8(self) -> u8 {
        match self {
            Self::Off => 1,
            Self::Error => 2,
            Self::Warn => 3,
            Self::Info => 4,
            Self::Debug => 5,
            Self::Trace => 6,
        }
    }

    const fn from_u8(v: u8) -> Self {
        match v {
            2 => Self::Error,
            3 => Self::Warn,
            4 => Self::Info,
            5 => Self::Debug,
            6 => Self::Trace,
            _ => Self::Off,
        }
    }
}

pub const DEFAULT_SPIN_LIMIT: u32 = 64;
pub const MAX_SPIN_LIMIT: u32 = 65_536;

// 0 = unresolved, 255 = resolving, otherwise LogLevel::to_u8.
const UNRESOLVED: u8 = 0;
const RESOLVING: u8 = 255;

static CACHED_LOG: AtomicU8 = AtomicU8::new(UNRESOLVED);

// u32::MAX = unresolved, u32::MAX - 1 = resolving.
const SPIN_UNRESOLVED: u32 = u32::MAX;
const SPIN_RESOLVING: u32 = u32::MAX - 1;

static CACHED_SPIN: AtomicU32 = AtomicU32::new(SPIN_UNRESOLVED);

fn parse_spin_limit(raw: &str) -> u32 {
    raw.trim()
        .parse::<u64>()
        .map(|v| v.min(u64::from(MAX_SPIN_LIMIT)) as u32)
        .unwrap_or(DEFAULT_SPIN_LIMIT)
}

/// Configured log threshold (reads `HOSTPTHREAD_LOG` on first call).
///
/// A reentrant or racing call observed during resolution gets `Off` rather
/// than blocking.
#[must_use]
pub fn log_level() -> LogLevel {
    let cached = CACHED_LOG.load(Ordering::Acquire);
    if cached != UNRESOLVED && cached != RESOLVING {
        return LogLevel::from_u8(cached);
    }
    if cached == RESOLVING
        || CACHED_LOG
            .compare_exchange(UNRESOLVED, RESOLVING, Ordering::SeqCst, Ordering::Relaxed)
            .is_err()
    {
        return LogLevel::from_u8(CACHED_LOG.load(Ordering::Acquire));
    }

    let level = std::env::var("HOSTPTHREAD_LOG")
        .map(|v| LogLevel::from_str_loose(&v))
        .unwrap_or_default();
    // An override that raced in while we were resolving wins.
    let _ = CACHED_LOG.compare_exchange(
        RESOLVING,
        level.to_u8(),
        Ordering::AcqRel,
        Ordering::Relaxed,
    );
    LogLevel::from_u8(CACHED_LOG.load(Ordering::Acquire))
}

/// Overrides the log threshold for the rest of the process.
pub fn set_log_level(level: LogLevel) {
    CACHED_LOG.store(level.to_u8(), Ordering::Release);
}

/// Returns true when events at `level` should be emitted.
#[must_use]
pub fn log_enabled(level: LogLevel) -> bool {
    passes(level, log_level())
}

const fn passes(level: LogLevel, threshold: LogLevel) -> bool {
    !matches!(level, LogLevel::Off) && level.to_u8() <= threshold.to_u8()
}

/// Spin iterations before a lazy-init waiter starts yielding.
#[must_use]
pub fn spin_limit() -> u32 {
    let cached = CACHED_SPIN.load(Ordering::Acquire);
    if cached != SPIN_UNRESOLVED && cached != SPIN_RESOLVING {
        return cached;
    }
    if cached == SPIN_RESOLVING
        || CACHED_SPIN
            .compare_exchange(
                SPIN_UNRESOLVED,
                SPIN_RESOLVING,
                Ordering::SeqCst,
                Ordering::Relaxed,
            )
            .is_err()
    {
        let v = CACHED_SPIN.load(Ordering::Acquire);
        return if v >= SPIN_RESOLVING {
            DEFAULT_SPIN_LIMIT
        } else {
            v
        };
    }

    let limit = std::env::var("HOSTPTHREAD_SPIN_LIMIT")
        .map(|v| parse_spin_limit(&v))
        .unwrap_or(DEFAULT_SPIN_LIMIT);
    let _ = CACHED_SPIN.compare_exchange(SPIN_RESOLVING, limit, Ordering::AcqRel, Ordering::Relaxed);
    let v = CACHED_SPIN.load(Ordering::Acquire);
    if v >= SPIN_RESOLVING {
        DEFAULT_SPIN_LIMIT
    } else {
        v
    }
}

/// Overrides the spin limit (clamped to [`MAX_SPIN_LIMIT`]).
pub fn set_spin_limit(limit: u32) {
    CACHED_SPIN.store(limit.min(MAX_SPIN_LIMIT), Ordering::Release);
}
