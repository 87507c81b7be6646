//! Runtime configuration for the poller and the chart view.
//!
//! Loaded from a TOML file (`options_flow.toml` by default). Every field has a
//! default so an empty file is a valid configuration:
//!
//! ```toml
//! storage_root = "./optionsdata"
//! tracked_tickers = ["SPX", "SPY"]
//! poll_interval_seconds = 30
//! timezone = "America/New_York"
//!
//! [page]
//! url_template = "https://example.com/underlyingStatistics?symbol={ticker}"
//!
//! [chart]
//! width = 160
//! ```

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    time::Duration,
};

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::ticker::Ticker;

/// Placeholder substituted with the ticker in [`PageSettings::url_template`].
pub const TICKER_PLACEHOLDER: &str = "{ticker}";

pub const DEFAULT_CONFIG_PATH: &str = "options_flow.toml";

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

const DEFAULT_URL_TEMPLATE: &str = "https://researchtools.fidelity.com/ftgw/mloptions/goto/underlyingStatistics?cusip=&symbol={ticker}&Search=Search";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FlowConfig {
    /// Folder holding the `<TICKER>data-<day>.csv` files.
    #[serde(default = "default_storage_root")]
    pub storage_root: PathBuf,

    #[serde(default = "default_tickers")]
    pub tracked_tickers: Vec<Ticker>,

    /// Target period of one full polling pass.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,

    /// IANA zone used for timestamps and day boundaries. Local time if unset.
    #[serde(default)]
    pub timezone: Option<String>,

    #[serde(default)]
    pub page: PageSettings,

    #[serde(default)]
    pub chart: ChartSettings,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PageSettings {
    #[serde(default = "default_url_template")]
    pub url_template: String,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ChartSettings {
    /// Timer period for re-rendering; falls back to the poll interval.
    #[serde(default)]
    pub refresh_seconds: Option<u64>,

    #[serde(default)]
    pub width: Option<u32>,

    #[serde(default)]
    pub height: Option<u32>,
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("./optionsdata")
}

fn default_tickers() -> Vec<Ticker> {
    ["SPX", "SPY"]
        .into_iter()
        .filter_map(|t| Ticker::new(t).ok())
        .collect()
}

fn default_poll_interval() -> u64 {
    30
}

fn default_url_template() -> String {
    DEFAULT_URL_TEMPLATE.to_string()
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

fn default_request_timeout() -> u64 {
    20
}

impl Default for PageSettings {
    fn default() -> Self {
        Self {
            url_template: default_url_template(),
            user_agent: default_user_agent(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            storage_root: default_storage_root(),
            tracked_tickers: default_tickers(),
            poll_interval_seconds: default_poll_interval(),
            timezone: None,
            page: PageSettings::default(),
            chart: ChartSettings::default(),
        }
    }
}

impl FlowConfig {
    /// Reads, parses and validates a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Loads `path` when given. Without a path the default file is used if
    /// it exists, otherwise the built-in defaults.
    pub fn resolve(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => Self::load(DEFAULT_CONFIG_PATH),
            None => Ok(Self::default()),
        }
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_seconds == 0 {
            return Err(ConfigError::Invalid(
                "poll_interval_seconds must be greater than zero".into(),
            ));
        }
        if self.tracked_tickers.is_empty() {
            return Err(ConfigError::Invalid(
                "tracked_tickers must list at least one ticker".into(),
            ));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = self.tracked_tickers.iter().find(|t| !seen.insert(*t)) {
            return Err(ConfigError::Invalid(format!(
                "tracked_tickers lists {dup} more than once"
            )));
        }
        if !self.page.url_template.contains(TICKER_PLACEHOLDER) {
            return Err(ConfigError::Invalid(format!(
                "page.url_template must contain {TICKER_PLACEHOLDER}"
            )));
        }
        if self.page.request_timeout_seconds == 0 {
            return Err(ConfigError::Invalid(
                "page.request_timeout_seconds must be greater than zero".into(),
            ));
        }
        if self.chart.refresh_seconds == Some(0) {
            return Err(ConfigError::Invalid(
                "chart.refresh_seconds must be greater than zero".into(),
            ));
        }
        self.time_zone()?;
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    pub fn chart_refresh(&self) -> Duration {
        Duration::from_secs(
            self.chart
                .refresh_seconds
                .unwrap_or(self.poll_interval_seconds),
        )
    }

    pub fn time_zone(&self) -> Result<Option<Tz>, ConfigError> {
        self.timezone
            .as_deref()
            .map(|name| {
                name.parse::<Tz>()
                    .map_err(|_| ConfigError::Invalid(format!("unknown timezone {name:?}")))
            })
            .transpose()
    }
}
