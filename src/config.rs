use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::FixedOffset;
use tracing::warn;

/// Largest accepted facility offset from UTC, in minutes (±18h).
pub const MAX_UTC_OFFSET_MINUTES: i32 = 18 * 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub metrics_port: Option<u16>,
    pub compact_threshold: u64,
    pub utc_offset: FixedOffset,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    OffsetOutOfRange(i32),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::OffsetOutOfRange(minutes) => write!(
                f,
                "ROOMBOOK_UTC_OFFSET_MINUTES={minutes} is outside ±{MAX_UTC_OFFSET_MINUTES}"
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key → value source. Unparseable values fall back to
    /// their defaults with a warning.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let offset_minutes: i32 = parsed(&get, "ROOMBOOK_UTC_OFFSET_MINUTES", 0);
        if offset_minutes.abs() > MAX_UTC_OFFSET_MINUTES {
            return Err(ConfigError::OffsetOutOfRange(offset_minutes));
        }
        let utc_offset = FixedOffset::east_opt(offset_minutes * 60)
            .ok_or(ConfigError::OffsetOutOfRange(offset_minutes))?;

        Ok(Self {
            bind: get("ROOMBOOK_BIND").unwrap_or_else(|| "0.0.0.0".into()),
            port: parsed(&get, "ROOMBOOK_PORT", 8080),
            data_dir: get("ROOMBOOK_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./data")),
            metrics_port: get("ROOMBOOK_METRICS_PORT").and_then(|raw| match raw.parse() {
                Ok(port) => Some(port),
                Err(_) => {
                    warn!("ignoring ROOMBOOK_METRICS_PORT={raw:?}: not a port number");
                    None
                }
            }),
            compact_threshold: parsed(&get, "ROOMBOOK_COMPACT_THRESHOLD", 1000),
            utc_offset,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("roombook.wal")
    }
}

fn parsed<T: FromStr + fmt::Display>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    let Some(raw) = get(key) else { return default };
    match raw.trim().parse() {
        Ok(value) => value,
        Err(_) => {
            warn!("ignoring {key}={raw:?}, using default {default}");
            default
        }
    }
}
