//! Harness configuration: webhook HTTP settings and log output.
//!
//! Sources are layered defaults, then `swaig.toml`, then `SWAIG_*` variables,
//! then caller overrides. The file may reference environment variables as
//! `${NAME}`.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::datamap::InterpreterSettings;

pub const CONFIG_FILE_CANDIDATES: [&str; 2] = ["swaig.toml", "config/swaig.toml"];

const TIMEOUT_RANGE_SECS: std::ops::RangeInclusive<u64> = 1..=300;
const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

const ENV_TIMEOUT: &[&str] = &["SWAIG_HTTP_TIMEOUT_SECS"];
const ENV_USER_AGENT: &[&str] = &["SWAIG_HTTP_USER_AGENT"];
const ENV_LOG_LEVEL: &[&str] = &["SWAIG_LOGGING_LEVEL", "SWAIG_LOG_LEVEL"];
const ENV_LOG_FORMAT: &[&str] = &["SWAIG_LOGGING_FORMAT", "SWAIG_LOG_FORMAT"];

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub http: HttpConfig,
    pub logging: LoggingConfig,
}

/// Settings applied to every outbound webhook request.
#[derive(Clone, Debug)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub user_agent: String,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

/// Values set programmatically, typically from CLI flags. They win over every file and env source.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub http_timeout_secs: Option<u64>,
    pub http_user_agent: Option<String>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read swaig config `{path}`: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("swaig config `{path}` is not valid TOML: {source}")]
    Parse { path: PathBuf, source: toml::de::Error },
    #[error("swaig config `{0}` does not exist")]
    NotFound(PathBuf),
    #[error("swaig config references `${{{name}}}` but the variable is not set")]
    UnsetVariable { name: String },
    #[error("swaig config has an unclosed `${{` starting at byte {offset}")]
    UnclosedVariable { offset: usize },
    #[error("{key}={value:?} is not a valid {expected}")]
    InvalidEnv { key: &'static str, value: String, expected: &'static str },
    #[error("invalid swaig configuration: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            http: HttpConfig {
                timeout_secs: 30,
                user_agent: format!("swaig-test/{}", env!("CARGO_PKG_VERSION")),
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "log format `{other}` is not one of compact, pretty, json"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        match resolve_config_path(options.config_path.as_deref()) {
            Some(path) => config.merge_file(FileLayer::read(&path)?),
            None if options.require_file => {
                return Err(ConfigError::NotFound(
                    options.config_path.unwrap_or_else(|| CONFIG_FILE_CANDIDATES[0].into()),
                ));
            }
            None => {}
        }

        config.merge_env()?;
        config.merge_overrides(options.overrides);
        config.validate()?;
        Ok(config)
    }

    /// Webhook timeout handed to the DataMap interpreter.
    pub fn interpreter_settings(&self) -> InterpreterSettings {
        InterpreterSettings { timeout: Duration::from_secs(self.http.timeout_secs) }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !TIMEOUT_RANGE_SECS.contains(&self.http.timeout_secs) {
            return Err(ConfigError::Validation(format!(
                "http.timeout_secs is {} but webhook timeouts must be within 1..=300 seconds",
                self.http.timeout_secs
            )));
        }
        if self.http.user_agent.trim().is_empty() {
            return Err(ConfigError::Validation(
                "http.user_agent is blank; webhook requests need a User-Agent".to_string(),
            ));
        }

        let level = self.logging.level.trim().to_ascii_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::Validation(format!(
                "logging.level `{}` is not one of {}",
                self.logging.level,
                LOG_LEVELS.join(", ")
            )));
        }
        Ok(())
    }

    fn merge_file(&mut self, layer: FileLayer) {
        let http = layer.http.unwrap_or_default();
        let logging = layer.logging.unwrap_or_default();

        set_if_some(&mut self.http.timeout_secs, http.timeout_secs);
        set_if_some(&mut self.http.user_agent, http.user_agent);
        set_if_some(&mut self.logging.level, logging.level);
        set_if_some(&mut self.logging.format, logging.format);
    }

    fn merge_env(&mut self) -> Result<(), ConfigError> {
        if let Some((key, raw)) = first_env(ENV_TIMEOUT) {
            self.http.timeout_secs = raw.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                key,
                value: raw.clone(),
                expected: "number of seconds",
            })?;
        }
        if let Some((_, raw)) = first_env(ENV_USER_AGENT) {
            self.http.user_agent = raw;
        }
        if let Some((_, raw)) = first_env(ENV_LOG_LEVEL) {
            self.logging.level = raw;
        }
        if let Some((key, raw)) = first_env(ENV_LOG_FORMAT) {
            self.logging.format = raw.parse().map_err(|_| ConfigError::InvalidEnv {
                key,
                value: raw.clone(),
                expected: "log format (compact, pretty, json)",
            })?;
        }
        Ok(())
    }

    fn merge_overrides(&mut self, overrides: ConfigOverrides) {
        set_if_some(&mut self.http.timeout_secs, overrides.http_timeout_secs);
        set_if_some(&mut self.http.user_agent, overrides.http_user_agent);
        set_if_some(&mut self.logging.level, overrides.log_level);
        set_if_some(&mut self.logging.format, overrides.log_format);
    }
}

/// First existing config file: the explicit path, else the default candidates.
pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    match explicit_path {
        Some(path) => path.exists().then(|| path.to_path_buf()),
        None => CONFIG_FILE_CANDIDATES.iter().map(PathBuf::from).find(|path| path.exists()),
    }
}

fn set_if_some<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

/// First non-blank variable among `keys`, with the name that supplied it.
fn first_env(keys: &[&'static str]) -> Option<(&'static str, String)> {
    keys.iter().find_map(|key| {
        env::var(key).ok().filter(|value| !value.trim().is_empty()).map(|value| (*key, value))
    })
}

/// Replaces each `${NAME}` in the raw file text with the variable's value.
fn substitute_env(raw: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(raw.len());
    let mut rest = raw;
    let mut consumed = 0;

    while let Some(start) = rest.find("${") {
        output.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];
        let Some(len) = after_open.find('}') else {
            return Err(ConfigError::UnclosedVariable { offset: consumed + start });
        };

        let name = &after_open[..len];
        let value = env::var(name)
            .map_err(|_| ConfigError::UnsetVariable { name: name.to_string() })?;
        output.push_str(&value);

        let advance = start + 2 + len + 1;
        consumed += advance;
        rest = &rest[advance..];
    }

    output.push_str(rest);
    Ok(output)
}

#[derive(Debug, Default, Deserialize)]
struct FileLayer {
    http: Option<HttpLayer>,
    logging: Option<LoggingLayer>,
}

#[derive(Debug, Default, Deserialize)]
struct HttpLayer {
    timeout_secs: Option<u64>,
    user_agent: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingLayer {
    level: Option<String>,
    format: Option<LogFormat>,
}

impl FileLayer {
    fn read(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        toml::from_str(&substitute_env(&raw)?)
            .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
    }
}
