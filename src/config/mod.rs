//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

use std::{collections::BTreeMap, num::NonZeroUsize, str::FromStr, time::Duration};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::transport::ChaosConfig;

pub use cli::{ClientOverrides, CliArgs, Command, GetArgs, SubmitArgs};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "hyperjson";
const ENV_PREFIX: &str = "HYPERJSON";
const DEFAULT_MAX_SIZE: u64 = 500;
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_CHAOS_ERROR_DELAY_MS: u64 = 500;
const DEFAULT_CHAOS_TIMEOUT_DELAY_MS: u64 = 5000;

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub client: ClientSettings,
    pub chaos: ChaosSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub api_root: Url,
    pub max_size: NonZeroUsize,
    pub timeout: Duration,
    /// Basic credentials as `(user, password)`.
    pub credentials: Option<(String, String)>,
    /// Extra headers sent with every request.
    pub headers: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct ChaosSettings {
    pub enabled: bool,
    pub weight: f64,
    pub error_delay: Duration,
    pub timeout_delay: Duration,
}

impl From<&ChaosSettings> for ChaosConfig {
    fn from(settings: &ChaosSettings) -> Self {
        Self {
            weight: settings.weight,
            error_delay: settings.error_delay,
            timeout_delay: settings.timeout_delay,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_overrides(&cli.overrides);

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    client: RawClientSettings,
    chaos: RawChaosSettings,
    logging: RawLoggingSettings,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawClientSettings {
    api_root: Option<String>,
    max_size: Option<u64>,
    timeout_seconds: Option<u64>,
    user: Option<String>,
    password: Option<String>,
    headers: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawChaosSettings {
    enabled: Option<bool>,
    weight: Option<f64>,
    error_delay_ms: Option<u64>,
    timeout_delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &ClientOverrides) {
        if let Some(api_root) = overrides.api_root.as_ref() {
            self.client.api_root = Some(api_root.clone());
        }
        if let Some(max_size) = overrides.max_size {
            self.client.max_size = Some(max_size);
        }
        if let Some(timeout) = overrides.timeout_seconds {
            self.client.timeout_seconds = Some(timeout);
        }
        if let Some(chaos) = overrides.chaos {
            self.chaos.enabled = Some(chaos);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            client,
            chaos,
            logging,
        } = raw;

        let client = build_client_settings(client)?;
        let chaos = build_chaos_settings(chaos)?;
        let logging = build_logging_settings(logging)?;

        Ok(Self {
            client,
            chaos,
            logging,
        })
    }
}

fn build_client_settings(client: RawClientSettings) -> Result<ClientSettings, LoadError> {
    let api_root = client
        .api_root
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| LoadError::invalid("client.api_root", "must be set"))?;
    let api_root = Url::parse(&api_root)
        .map_err(|err| LoadError::invalid("client.api_root", format!("invalid URL: {err}")))?;
    if api_root.cannot_be_a_base() {
        return Err(LoadError::invalid(
            "client.api_root",
            "must be a hierarchical URL such as https://host/",
        ));
    }

    let max_size = non_zero_usize(client.max_size.unwrap_or(DEFAULT_MAX_SIZE), "client.max_size")?;

    let timeout_secs = client.timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECS);
    if timeout_secs == 0 {
        return Err(LoadError::invalid(
            "client.timeout_seconds",
            "must be greater than zero",
        ));
    }

    let credentials = match (client.user, client.password) {
        (Some(user), password) => Some((user, password.unwrap_or_default())),
        (None, Some(_)) => {
            return Err(LoadError::invalid(
                "client.password",
                "requires client.user to be set",
            ));
        }
        (None, None) => None,
    };

    Ok(ClientSettings {
        api_root,
        max_size,
        timeout: Duration::from_secs(timeout_secs),
        credentials,
        headers: client.headers.into_iter().collect(),
    })
}

fn build_chaos_settings(chaos: RawChaosSettings) -> Result<ChaosSettings, LoadError> {
    if let Some(weight) = chaos.weight {
        if !weight.is_finite() || !(0.0..=1.0).contains(&weight) {
            return Err(LoadError::invalid(
                "chaos.weight",
                "must be between 0.0 and 1.0",
            ));
        }
    }

    Ok(ChaosSettings {
        enabled: chaos.enabled.unwrap_or(false),
        weight: ChaosConfig::weight_or_default(chaos.weight),
        error_delay: Duration::from_millis(
            chaos.error_delay_ms.unwrap_or(DEFAULT_CHAOS_ERROR_DELAY_MS),
        ),
        timeout_delay: Duration::from_millis(
            chaos
                .timeout_delay_ms
                .unwrap_or(DEFAULT_CHAOS_TIMEOUT_DELAY_MS),
        ),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn non_zero_usize(value: u64, key: &'static str) -> Result<NonZeroUsize, LoadError> {
    let value: usize = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for usize"))?;
    NonZeroUsize::new(value).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}
