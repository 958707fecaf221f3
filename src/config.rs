use chrono_tz::Tz;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::auth::MasterToken;
use crate::device::Device;
use crate::error::{Result, SyncError};
use crate::nest::DEFAULT_API_BASE;
use crate::sync::DEFAULT_FETCH_RANGE_MINUTES;

const DEFAULT_LOCAL_TIMEZONE: &str = "America/New_York";
const DEFAULT_REFRESH_INTERVAL_MINUTES: u64 = 60;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const MAX_REFRESH_INTERVAL_MINUTES: u64 = 7 * 24 * 60;
const MAX_FETCH_RANGE_MINUTES: i64 = 7 * 24 * 60;
const MAX_REQUEST_TIMEOUT_SECS: u64 = 60 * 60;

pub const CONFIG_PATH_ENV: &str = "NEST_SYNC_CONFIG";

#[derive(Debug, Deserialize, Default)]
struct SyncConfigFile {
    base_path: Option<PathBuf>,
    google_username: Option<String>,
    google_master_token: Option<String>,
    local_timezone: Option<String>,
    refresh_interval_minutes: Option<u64>,
    fetch_range_minutes: Option<i64>,
    api_base: Option<String>,
    request_timeout_secs: Option<u64>,
    devices: Option<Vec<Device>>,
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub base_path: PathBuf,
    pub google_username: String,
    pub master_token: MasterToken,
    pub local_timezone: Tz,
    pub refresh_interval: Duration,
    pub fetch_range_minutes: i64,
    pub api_base: Url,
    pub request_timeout: Duration,
    /// When set, discovery is skipped and these devices are synced.
    pub devices: Option<Vec<Device>>,
}

/// Settings before validation; strings as given by file or environment.
#[derive(Debug, Default)]
struct RawSettings {
    base_path: Option<PathBuf>,
    google_username: Option<String>,
    google_master_token: Option<String>,
    local_timezone: String,
    refresh_interval_minutes: u64,
    fetch_range_minutes: i64,
    api_base: String,
    request_timeout_secs: u64,
    devices: Option<Vec<Device>>,
}

impl SyncConfig {
    /// Loads the config file named by `path` (or `NEST_SYNC_CONFIG`), applies
    /// environment overrides, then validates.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let env_path = std::env::var(CONFIG_PATH_ENV)
            .ok()
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);
        let file_cfg = match path.map(Path::to_path_buf).or(env_path) {
            Some(path) => read_config_file(&path)?,
            None => SyncConfigFile::default(),
        };
        let mut raw = RawSettings::from_file(file_cfg);
        raw.apply_env()?;
        raw.validate()
    }

    /// Logs the effective settings with the master token masked.
    pub fn display(&self) {
        log::info!("base path: {}", self.base_path.display());
        log::info!("google username: {}", self.google_username);
        log::info!("google master token: {}", self.master_token.masked());
        log::info!("local timezone: {}", self.local_timezone.name());
        log::info!(
            "refresh interval: {} minutes",
            self.refresh_interval.as_secs() / 60
        );
        log::info!("fetch range: {} minutes", self.fetch_range_minutes);
        log::info!("api base: {}", self.api_base);
        match &self.devices {
            Some(devices) => log::info!("devices: {} configured, discovery disabled", devices.len()),
            None => log::info!("devices: discovered from home graph"),
        }
    }
}

impl RawSettings {
    fn from_file(file: SyncConfigFile) -> Self {
        Self {
            base_path: file.base_path,
            google_username: file.google_username,
            google_master_token: file.google_master_token,
            local_timezone: file
                .local_timezone
                .unwrap_or_else(|| DEFAULT_LOCAL_TIMEZONE.to_string()),
            refresh_interval_minutes: file
                .refresh_interval_minutes
                .unwrap_or(DEFAULT_REFRESH_INTERVAL_MINUTES),
            fetch_range_minutes: file
                .fetch_range_minutes
                .unwrap_or(DEFAULT_FETCH_RANGE_MINUTES),
            api_base: file
                .api_base
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            request_timeout_secs: file
                .request_timeout_secs
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
            devices: file.devices,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(path) = env_value("BASE_PATH") {
            self.base_path = Some(PathBuf::from(path));
        }
        if let Some(username) = env_value("GOOGLE_USERNAME") {
            self.google_username = Some(username);
        }
        if let Some(token) = env_value("GOOGLE_MASTER_TOKEN") {
            self.google_master_token = Some(token);
        }
        if let Some(tz) = env_value("LOCAL_TIMEZONE") {
            self.local_timezone = tz;
        }
        if let Some(minutes) = env_value("REFRESH_INTERVAL") {
            self.refresh_interval_minutes = minutes.parse().map_err(|_| {
                SyncError::Config("REFRESH_INTERVAL must be an integer number of minutes".into())
            })?;
        }
        if let Some(minutes) = env_value("FETCH_RANGE_MINUTES") {
            self.fetch_range_minutes = minutes.parse().map_err(|_| {
                SyncError::Config("FETCH_RANGE_MINUTES must be an integer number of minutes".into())
            })?;
        }
        if let Some(base) = env_value("NEST_API_BASE") {
            self.api_base = base;
        }
        if let Some(secs) = env_value("NEST_REQUEST_TIMEOUT_SECS") {
            self.request_timeout_secs = secs.parse().map_err(|_| {
                SyncError::Config("NEST_REQUEST_TIMEOUT_SECS must be an integer number of seconds".into())
            })?;
        }
        Ok(())
    }

    fn validate(self) -> Result<SyncConfig> {
        let base_path = self
            .base_path
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or_else(|| SyncError::Config("BASE_PATH is required".into()))?;
        let google_username = self
            .google_username
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| SyncError::Config("GOOGLE_USERNAME is required".into()))?;
        let master_token = self
            .google_master_token
            .filter(|t| !t.trim().is_empty())
            .map(MasterToken::new)
            .ok_or_else(|| SyncError::Config("GOOGLE_MASTER_TOKEN is required".into()))?;
        let local_timezone: Tz = self.local_timezone.trim().parse().map_err(|_| {
            SyncError::Config(format!("unknown timezone '{}'", self.local_timezone))
        })?;
        if !(1..=MAX_REFRESH_INTERVAL_MINUTES).contains(&self.refresh_interval_minutes) {
            return Err(SyncError::Config(format!(
                "refresh interval must be between 1 and {} minutes",
                MAX_REFRESH_INTERVAL_MINUTES
            )));
        }
        if !(1..=MAX_FETCH_RANGE_MINUTES).contains(&self.fetch_range_minutes) {
            return Err(SyncError::Config(format!(
                "fetch range must be between 1 and {} minutes",
                MAX_FETCH_RANGE_MINUTES
            )));
        }
        if !(1..=MAX_REQUEST_TIMEOUT_SECS).contains(&self.request_timeout_secs) {
            return Err(SyncError::Config(format!(
                "request timeout must be between 1 and {} seconds",
                MAX_REQUEST_TIMEOUT_SECS
            )));
        }
        let api_base = Url::parse(&self.api_base)
            .map_err(|e| SyncError::Config(format!("invalid api base '{}': {}", self.api_base, e)))?;
        if !matches!(api_base.scheme(), "http" | "https") {
            return Err(SyncError::Config(format!(
                "api base '{}' must be an http(s) url",
                self.api_base
            )));
        }
        if let Some(devices) = &self.devices {
            if devices
                .iter()
                .any(|d| d.id.trim().is_empty() || d.name.trim().is_empty())
            {
                return Err(SyncError::Config(
                    "configured devices need a non-empty id and name".into(),
                ));
            }
        }

        Ok(SyncConfig {
            base_path,
            google_username,
            master_token,
            local_timezone,
            refresh_interval: Duration::from_secs(self.refresh_interval_minutes * 60),
            fetch_range_minutes: self.fetch_range_minutes,
            api_base,
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            devices: self.devices,
        })
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// `.json` files (Home Assistant add-on options) are JSON; anything else is TOML.
fn read_config_file(path: &Path) -> Result<SyncConfigFile> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        SyncError::Config(format!("failed to read config file {}: {}", path.display(), e))
    })?;
    let is_json = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if is_json {
        serde_json::from_str(&raw)
            .map_err(|e| SyncError::Config(format!("invalid config file {}: {}", path.display(), e)))
    } else {
        toml::from_str(&raw)
            .map_err(|e| SyncError::Config(format!("invalid config file {}: {}", path.display(), e)))
    }
}
