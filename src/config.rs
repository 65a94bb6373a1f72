//! TOML settings for probewatch.
//!
//! Every section has compiled-in defaults, so an empty (or missing) file is a
//! valid configuration. The file is looked up from an explicit path, then the
//! `PROBEWATCH_CONFIG` environment variable, then `./probewatch.toml`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable naming an alternative settings file.
pub const CONFIG_ENV: &str = "PROBEWATCH_CONFIG";

/// Settings file picked up from the working directory when nothing else is set.
pub const LOCAL_CONFIG: &str = "probewatch.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse settings file {}: {source}", .path.display())]
    Settings {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to parse endpoint list {}: {source}", .path.display())]
    Endpoints {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("endpoint #{index}: {reason}")]
    InvalidEndpoint { index: usize, reason: String },

    #[error("endpoint list {} is empty", .0.display())]
    NoEndpoints(PathBuf),

    #[error("invalid setting {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

// ---------------------------------------------------------------------------
// Top-level settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub probe: ProbeSettings,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Settings {
    /// Load settings from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let settings: Self = toml::from_str(&content).map_err(|source| ConfigError::Settings {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(settings)
    }

    /// Resolve the settings file.
    ///
    /// An explicit path must load. A path from the environment that fails to
    /// load is skipped, as is a broken local file; in the end the compiled-in
    /// defaults are used. Skipped files are returned rather than logged, since
    /// the subscriber is configured from the result.
    pub fn resolve(explicit: Option<&Path>) -> Result<Resolved, ConfigError> {
        if let Some(path) = explicit {
            return Ok(Resolved::from_file(Self::load(path)?, path, Vec::new()));
        }

        let mut skipped = Vec::new();

        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            let path = Path::new(&env_path);
            match Self::load(path) {
                Ok(settings) => return Ok(Resolved::from_file(settings, path, skipped)),
                Err(e) => skipped.push(e),
            }
        }

        let local = Path::new(LOCAL_CONFIG);
        if local.exists() {
            match Self::load(local) {
                Ok(settings) => return Ok(Resolved::from_file(settings, local, skipped)),
                Err(e) => skipped.push(e),
            }
        }

        Ok(Resolved {
            settings: Self::default(),
            source: None,
            skipped,
        })
    }

    /// Reject values the run cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.probe.max_retry == 0 {
            return Err(ConfigError::Invalid {
                key: "probe.max_retry",
                reason: "must be at least 1".into(),
            });
        }
        if self.probe.timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                key: "probe.timeout_ms",
                reason: "must be positive".into(),
            });
        }
        if self.scheduler.concurrency == 0 {
            return Err(ConfigError::Invalid {
                key: "scheduler.concurrency",
                reason: "must be at least 1".into(),
            });
        }
        if self.history.max_days == 0 {
            return Err(ConfigError::Invalid {
                key: "history.max_days",
                reason: "must be at least 1".into(),
            });
        }
        if !(-23..=23).contains(&self.report.utc_offset_hours) {
            return Err(ConfigError::Invalid {
                key: "report.utc_offset_hours",
                reason: format!("{} is outside -23..=23", self.report.utc_offset_hours),
            });
        }
        if self.probe.search_enabled && self.probe.search_keyword.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "probe.search_keyword",
                reason: "search is enabled but the keyword is empty".into(),
            });
        }
        Ok(())
    }
}

/// Settings picked by [`Settings::resolve`], with the files passed over on the way.
#[derive(Debug)]
pub struct Resolved {
    pub settings: Settings,
    /// `None` when the compiled-in defaults are in use.
    pub source: Option<PathBuf>,
    /// Candidate files that exist (or were named) but failed to load.
    pub skipped: Vec<ConfigError>,
}

impl Resolved {
    fn from_file(settings: Settings, path: &Path, skipped: Vec<ConfigError>) -> Self {
        Self {
            settings,
            source: Some(path.to_path_buf()),
            skipped,
        }
    }
}

// ---------------------------------------------------------------------------
// Paths
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// JSON array of endpoint definitions.
    pub endpoints: PathBuf,
    /// Markdown report, read for history and rewritten every run.
    pub report: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            endpoints: PathBuf::from("endpoints.json"),
            report: PathBuf::from("report.md"),
        }
    }
}

// ---------------------------------------------------------------------------
// Probe
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeSettings {
    /// Per-attempt timeout.
    pub timeout_ms: u64,
    /// Total attempts per sub-probe, first try included.
    pub max_retry: u32,
    pub retry_delay_ms: u64,
    pub search_enabled: bool,
    pub search_keyword: String,
    pub search_param: String,
    pub list_field: String,
    pub user_agent: String,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            max_retry: 3,
            retry_delay_ms: 500,
            search_enabled: true,
            search_keyword: "斗罗大陆".to_string(),
            search_param: "wd".to_string(),
            list_field: "list".to_string(),
            user_agent: concat!("probewatch/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Maximum number of endpoints probed at the same time.
    pub concurrency: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { concurrency: 10 }
    }
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Rolling window size, in runs.
    pub max_days: usize,
    /// Consecutive failed runs before an endpoint is critical.
    pub warn_streak: u32,
    pub trend_len: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_days: 30,
            warn_streak: 3,
            trend_len: 7,
        }
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub title: String,
    /// Offset applied to the "last updated" timestamp.
    pub utc_offset_hours: i32,
    pub timezone_label: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            title: "Source endpoint health report".to_string(),
            utc_offset_hours: 8,
            timezone_label: "CST".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
