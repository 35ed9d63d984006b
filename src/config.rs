//! Portal configuration.
//!
//! Read from a TOML file; every key is optional and `PORTAL_*` environment
//! variables override what the file says.
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalConfig {
    pub store_path: PathBuf,
    pub limits: Limits,
    pub views: ViewConfig,
    pub dispatch: DispatchConfig,
    pub logging: LoggingConfig,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            store_path: PathBuf::from("portal.db"),
            limits: Limits::default(),
            views: ViewConfig::default(),
            dispatch: DispatchConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Payload validation bounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    pub overtime_min_minutes: u32,
    pub overtime_max_minutes: u32,
    pub advance_reason_min_chars: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            overtime_min_minutes: 30,
            overtime_max_minutes: 12 * 60,
            advance_reason_min_chars: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewConfig {
    /// Days ahead of `as_of` that count as "upcoming".
    pub upcoming_window_days: i64,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            upcoming_window_days: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Write attempts per recipient before the event is left in the outbox.
    pub attempts: u32,
    /// Upper bound on `list_notifications` page size.
    pub max_page: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            max_page: 200,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Pretty,
    Compact,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Compact,
            filter: "ops_portal=info".into(),
        }
    }
}

impl PortalConfig {
    /// Loads `path` if it exists, then applies environment overrides.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            Self::from_toml(&contents)
                .with_context(|| format!("failed to parse {}", path.display()))?
        } else {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(raw) = std::env::var("PORTAL_STORE_PATH") {
            self.store_path = PathBuf::from(raw);
        }
        if let Some(days) = env_parse("PORTAL_UPCOMING_WINDOW_DAYS") {
            self.views.upcoming_window_days = days;
        }
        if let Some(attempts) = env_parse("PORTAL_DISPATCH_ATTEMPTS") {
            self.dispatch.attempts = attempts;
        }
        if let Ok(filter) = std::env::var("PORTAL_LOG") {
            self.logging.filter = filter;
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparseable environment override");
            None
        }
    }
}
