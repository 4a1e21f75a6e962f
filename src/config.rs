use crate::engine::EngineOptions;
use crate::engine::interpolation::MissingStatusPolicy;
use crate::engine::schedule::{DuplicateDayRules, SchedulePolicy, UnscheduledDays};
use crate::engine::timezone::parse_zone;
use crate::jobs::SnapshotMode;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";
pub const DEFAULT_SERVER_PORT: u16 = 8080;
pub const DEFAULT_OBSERVATIONS_PATH: &str = "data/store_status.csv";
pub const DEFAULT_SCHEDULES_PATH: &str = "data/menu_hours.csv";
pub const DEFAULT_TIMEZONES_PATH: &str = "data/timezones.csv";
pub const DEFAULT_OUTPUT_DIR: &str = "reports";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub app: AppSection,
    pub logging: LoggingSection,
    #[serde(default)]
    pub server: Option<ServerSection>,
    #[serde(default)]
    pub data: Option<DataSection>,
    #[serde(default)]
    pub reports: Option<ReportsSection>,
    #[serde(default)]
    pub engine: Option<EngineSection>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppSection {
    pub name: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSection {
    pub level: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSection {
    /// Port to listen on (default: 8080)
    pub port: Option<u16>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DataSection {
    pub observations_path: Option<PathBuf>,
    pub schedules_path: Option<PathBuf>,
    pub timezones_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReportsSection {
    /// Directory receiving `report_<id>.csv` artifacts (default: reports)
    pub output_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct EngineSection {
    /// IANA zone for stores without a usable mapping (default: America/Chicago)
    pub default_timezone: Option<String>,
    pub missing_status: Option<MissingStatusPolicy>,
    pub unscheduled_days: Option<UnscheduledDays>,
    pub duplicate_day_rules: Option<DuplicateDayRules>,
    pub allow_overnight: Option<bool>,
    pub include_unobserved_stores: Option<bool>,
    pub snapshot: Option<SnapshotMode>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("unknown default timezone: {0}")]
    Zone(String),
}

pub fn load_default() -> Result<Config, ConfigError> {
    load_from_path(DEFAULT_CONFIG_PATH)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&contents)?;
    Ok(config)
}

impl Config {
    /// Returns the configured log level, or INFO when missing or unrecognised.
    pub fn log_level(&self) -> tracing::Level {
        tracing::Level::from_str(self.logging.level.trim()).unwrap_or(tracing::Level::INFO)
    }

    /// Returns the server port (default: 8080)
    pub fn server_port(&self) -> u16 {
        self.server
            .as_ref()
            .and_then(|s| s.port)
            .unwrap_or(DEFAULT_SERVER_PORT)
    }

    pub fn observations_path(&self) -> PathBuf {
        self.data
            .as_ref()
            .and_then(|d| d.observations_path.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OBSERVATIONS_PATH))
    }

    pub fn schedules_path(&self) -> PathBuf {
        self.data
            .as_ref()
            .and_then(|d| d.schedules_path.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SCHEDULES_PATH))
    }

    pub fn timezones_path(&self) -> PathBuf {
        self.data
            .as_ref()
            .and_then(|d| d.timezones_path.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_TIMEZONES_PATH))
    }

    pub fn output_dir(&self) -> PathBuf {
        self.reports
            .as_ref()
            .and_then(|r| r.output_dir.clone())
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR))
    }

    pub fn snapshot_mode(&self) -> SnapshotMode {
        self.engine
            .as_ref()
            .and_then(|e| e.snapshot)
            .unwrap_or_default()
    }

    /// Builds engine options, rejecting an unknown default zone up front so a
    /// bad config never reaches a report run.
    pub fn engine_options(&self) -> Result<EngineOptions, ConfigError> {
        let section = self.engine.clone().unwrap_or_default();
        let defaults = EngineOptions::default();

        let default_zone = match section.default_timezone.as_deref() {
            Some(zone_id) => parse_zone(zone_id).ok_or_else(|| ConfigError::Zone(zone_id.to_string()))?,
            None => defaults.default_zone,
        };

        Ok(EngineOptions {
            default_zone,
            missing_status: section.missing_status.unwrap_or(defaults.missing_status),
            schedule: SchedulePolicy {
                unscheduled_days: section
                    .unscheduled_days
                    .unwrap_or(defaults.schedule.unscheduled_days),
                duplicate_day_rules: section
                    .duplicate_day_rules
                    .unwrap_or(defaults.schedule.duplicate_day_rules),
                allow_overnight: section
                    .allow_overnight
                    .unwrap_or(defaults.schedule.allow_overnight),
            },
            include_unobserved_stores: section
                .include_unobserved_stores
                .unwrap_or(defaults.include_unobserved_stores),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn write_temp_config(label: &str, contents: &str) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let unique = SystemTime::now().duration_since(UNIX_EPOCH)?.as_nanos();
        let path = std::env::temp_dir().join(format!("store-uptime-config-{label}-{unique}.toml"));
        fs::write(&path, contents)?;
        Ok(path)
    }

    #[test]
    fn default_config_builds_engine_options() -> Result<(), Box<dyn std::error::Error>> {
        let config = load_default()?;
        let options = config.engine_options()?;
        assert_eq!(options.default_zone, chrono_tz::America::Chicago);
        assert_eq!(options.missing_status, MissingStatusPolicy::Backfill);
        Ok(())
    }

    #[test]
    fn minimal_config_uses_defaults() -> Result<(), Box<dyn std::error::Error>> {
        let path = write_temp_config(
            "minimal",
            r#"
[app]
name = "store-uptime"

[logging]
level = "debug"
"#,
        )?;

        let config = load_from_path(&path)?;
        let _ = fs::remove_file(&path);

        assert_eq!(config.server_port(), DEFAULT_SERVER_PORT);
        assert_eq!(config.log_level(), tracing::Level::DEBUG);
        assert_eq!(config.output_dir(), PathBuf::from(DEFAULT_OUTPUT_DIR));
        assert_eq!(config.snapshot_mode(), SnapshotMode::WallClock);
        let options = config.engine_options()?;
        assert!(!options.include_unobserved_stores);
        assert!(options.schedule.allow_overnight);
        assert_eq!(options.schedule.unscheduled_days, UnscheduledDays::Open);
        Ok(())
    }

    #[test]
    fn engine_section_overrides_policies() -> Result<(), Box<dyn std::error::Error>> {
        let path = write_temp_config(
            "engine",
            r#"
[app]
name = "store-uptime"

[logging]
level = "info"

[engine]
default_timezone = "Asia/Kolkata"
missing_status = "exclude"
unscheduled_days = "closed"
duplicate_day_rules = "split_shifts"
allow_overnight = false
include_unobserved_stores = true
snapshot = "latest_observation"
"#,
        )?;

        let config = load_from_path(&path)?;
        let _ = fs::remove_file(&path);
        let options = config.engine_options()?;

        assert_eq!(options.default_zone, chrono_tz::Asia::Kolkata);
        assert_eq!(options.missing_status, MissingStatusPolicy::Exclude);
        assert_eq!(options.schedule.unscheduled_days, UnscheduledDays::Closed);
        assert_eq!(
            options.schedule.duplicate_day_rules,
            DuplicateDayRules::SplitShifts
        );
        assert!(!options.schedule.allow_overnight);
        assert!(options.include_unobserved_stores);
        assert_eq!(config.snapshot_mode(), SnapshotMode::LatestObservation);
        Ok(())
    }

    #[test]
    fn unknown_default_zone_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
        let path = write_temp_config(
            "zone",
            r#"
[app]
name = "store-uptime"

[logging]
level = "info"

[engine]
default_timezone = "Central/Nowhere"
"#,
        )?;

        let config = load_from_path(&path)?;
        let _ = fs::remove_file(&path);

        assert!(matches!(config.engine_options(), Err(ConfigError::Zone(_))));
        Ok(())
    }

    #[test]
    fn missing_config_file_returns_read_error() {
        let unique = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time before unix epoch")
            .as_nanos();
        let path = std::env::temp_dir().join(format!("store-uptime-config-missing-{unique}.toml"));

        let result = load_from_path(&path);

        assert!(matches!(result, Err(ConfigError::Read(_))));
    }

    #[test]
    fn invalid_toml_returns_parse_error() -> Result<(), Box<dyn std::error::Error>> {
        let path = write_temp_config("invalid", "not = [valid")?;

        let result = load_from_path(&path);
        let _ = fs::remove_file(&path);

        assert!(matches!(result, Err(ConfigError::Parse(_))));
        Ok(())
    }
}
