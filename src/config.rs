//! Board configuration
//!
//! Four parameters cross the boundary from URL or command line: rows,
//! particle count, duration and seed. Everything past this module assumes
//! they are already in range.

use serde::{Deserialize, Serialize};

use crate::consts::*;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid number for '{key}': {value:?}")]
    InvalidNumber { key: String, value: String },

    #[error("unknown parameter: {0}")]
    UnknownKey(String),
}

/// Validated board parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardConfig {
    pub rows: u32,
    pub particles: u32,
    pub duration_secs: f64,
    pub seed: u64,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            rows: 24,
            particles: 1200,
            duration_secs: 60.0,
            seed: 42,
        }
    }
}

/// Which field a query key names
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Key {
    Rows,
    Particles,
    Duration,
    Seed,
}

impl Key {
    fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "rows" | "r" => Some(Key::Rows),
            "particles" | "n" => Some(Key::Particles),
            "duration" | "t" => Some(Key::Duration),
            "seed" | "s" => Some(Key::Seed),
            _ => None,
        }
    }
}

impl BoardConfig {
    pub fn total_ms(&self) -> f64 {
        self.duration_secs * 1000.0
    }

    /// Force every field into its accepted range
    pub fn clamped(self) -> Self {
        let duration_secs = if self.duration_secs.is_finite() {
            self.duration_secs.max(MIN_DURATION_SECS)
        } else {
            Self::default().duration_secs
        };
        Self {
            rows: self.rows.clamp(MIN_ROWS, MAX_ROWS),
            particles: self.particles.clamp(MIN_PARTICLES, MAX_PARTICLES),
            duration_secs,
            seed: self.seed,
        }
    }

    /// Lenient parse: bad or unknown entries are logged and skipped
    pub fn from_query(query: &str) -> Self {
        let mut config = Self::default();
        for (key, value) in pairs(query) {
            let Some(k) = Key::from_str(key) else {
                log::warn!("Ignoring unknown parameter '{}'", key);
                continue;
            };
            if let Err(e) = config.set(k, key, value) {
                log::warn!("{}; keeping {}", e, config.describe(k));
            }
        }
        config.clamped_logged()
    }

    /// Strict parse: the first bad or unknown entry is an error
    pub fn parse_strict(query: &str) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        for (key, value) in pairs(query) {
            let k = Key::from_str(key).ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;
            config.set(k, key, value)?;
        }
        Ok(config.clamped_logged())
    }

    /// Canonical query string that reproduces this board
    pub fn to_query(&self) -> String {
        format!(
            "rows={}&particles={}&duration={}&seed={}",
            self.rows, self.particles, self.duration_secs, self.seed
        )
    }

    fn set(&mut self, k: Key, key: &str, value: &str) -> Result<(), ConfigError> {
        let invalid = || ConfigError::InvalidNumber {
            key: key.to_string(),
            value: value.to_string(),
        };
        match k {
            Key::Rows => self.rows = parse_count(value).ok_or_else(invalid)?,
            Key::Particles => self.particles = parse_count(value).ok_or_else(invalid)?,
            Key::Duration => {
                self.duration_secs = value
                    .parse::<f64>()
                    .ok()
                    .filter(|d| d.is_finite())
                    .ok_or_else(invalid)?
            }
            Key::Seed => self.seed = value.parse().map_err(|_| invalid())?,
        }
        Ok(())
    }

    fn describe(&self, k: Key) -> String {
        match k {
            Key::Rows => format!("rows={}", self.rows),
            Key::Particles => format!("particles={}", self.particles),
            Key::Duration => format!("duration={}", self.duration_secs),
            Key::Seed => format!("seed={}", self.seed),
        }
    }

    fn clamped_logged(self) -> Self {
        let clamped = self.clamped();
        if clamped != self {
            log::info!("Configuration clamped: {} -> {}", self.to_query(), clamped.to_query());
        }
        clamped
    }
}

/// Non-empty `key=value` pairs of a query string, leading `?` allowed
fn pairs(query: &str) -> impl Iterator<Item = (&str, &str)> {
    query
        .trim()
        .trim_start_matches('?')
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (key.trim(), value.trim())
        })
}

/// Whole counts; a fractional value is truncated, a negative one is zero
fn parse_count(value: &str) -> Option<u32> {
    if let Ok(n) = value.parse::<u32>() {
        return Some(n);
    }
    let f = value.parse::<f64>().ok().filter(|f| f.is_finite())?;
    Some(f.clamp(0.0, f64::from(u32::MAX)) as u32)
}
