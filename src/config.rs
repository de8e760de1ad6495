use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::error::PeriwatchError;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Status checks after the initial query before the monitor gives up.
pub const DEFAULT_CHECK_LIMIT: u32 = 30;

/// Fixed delay between status checks (no backoff).
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(5000);

/// Per-request deadline for status and cleanup calls. Generation requests
/// get the server-side `timeout` on top of this.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Config file looked up in the working directory when `PERIWATCH_CONFIG`
/// is not set.
pub const CONFIG_FILE_NAME: &str = "periwatch.toml";

/// Bounded polling schedule for the task monitor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollConfig {
    pub check_limit: u32,
    pub interval: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            check_limit: DEFAULT_CHECK_LIMIT,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub base_url: String,
    pub auth_token: String,
    pub poll: PollConfig,
    pub request_timeout: Duration,
    /// Where synchronous documents are saved by the server binary.
    pub output_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            auth_token: String::new(),
            poll: PollConfig::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            output_dir: PathBuf::from(".periwatch/reports"),
        }
    }
}

/// On-disk shape of `periwatch.toml`. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    base_url: Option<String>,
    auth_token: Option<String>,
    check_limit: Option<u32>,
    poll_interval_ms: Option<u64>,
    request_timeout_secs: Option<u64>,
    output_dir: Option<String>,
}

impl Config {
    /// Defaults, then the TOML file (if any), then environment overrides.
    pub fn load() -> Self {
        let path = env::var("PERIWATCH_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(CONFIG_FILE_NAME));

        let mut config = match std::fs::read_to_string(&path) {
            Ok(text) => match Self::from_toml(&text) {
                Ok(c) => {
                    tracing::info!(path = %path.display(), "loaded config file");
                    c
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), "ignoring config file: {e}");
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        };

        config.apply_env(|key| env::var(key).ok());

        if config.auth_token.is_empty() {
            tracing::warn!("PERIWATCH_AUTH_TOKEN not set, requests will be rejected by the server");
        }
        config
    }

    /// Parse a TOML document on top of the defaults.
    pub fn from_toml(text: &str) -> Result<Self, PeriwatchError> {
        let file: FileConfig =
            toml::from_str(text).map_err(|e| PeriwatchError::Config(e.to_string()))?;

        let mut config = Self::default();
        if let Some(url) = file.base_url {
            config.base_url = url;
        }
        if let Some(token) = file.auth_token {
            config.auth_token = token;
        }
        if let Some(limit) = file.check_limit {
            config.poll.check_limit = limit;
        }
        if let Some(ms) = file.poll_interval_ms {
            config.poll.interval = Duration::from_millis(ms);
        }
        if let Some(secs) = file.request_timeout_secs {
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(dir) = file.output_dir {
            config.output_dir = PathBuf::from(dir);
        }
        Ok(config)
    }

    /// Apply `PERIWATCH_*` overrides from `lookup`. Unparseable numbers are
    /// logged and ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("PERIWATCH_BASE_URL").filter(|v| !v.trim().is_empty()) {
            self.base_url = url;
        }
        if let Some(token) = lookup("PERIWATCH_AUTH_TOKEN") {
            self.auth_token = token;
        }
        if let Some(limit) = parse_env::<u32>(&lookup, "PERIWATCH_CHECK_LIMIT") {
            self.poll.check_limit = limit;
        }
        if let Some(ms) = parse_env::<u64>(&lookup, "PERIWATCH_POLL_INTERVAL_MS") {
            self.poll.interval = Duration::from_millis(ms);
        }
        if let Some(secs) = parse_env::<u64>(&lookup, "PERIWATCH_REQUEST_TIMEOUT_SECS") {
            self.request_timeout = Duration::from_secs(secs);
        }
        if let Some(dir) = lookup("PERIWATCH_OUTPUT_DIR").filter(|v| !v.trim().is_empty()) {
            self.output_dir = PathBuf::from(dir);
        }
    }
}

fn parse_env<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key = key, value = raw, "ignoring unparseable value");
            None
        }
    }
}
