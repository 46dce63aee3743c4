use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::deal::OemProfile;
use crate::errors::ApplicationError;
use crate::external::{HttpModelService, HttpNarrativeClient};

#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub model_service: ModelServiceConfig,
    pub narrative: NarrativeConfig,
    pub deal_cache_ttl_secs: u64,
    pub oem_profiles: Vec<OemProfile>,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct ModelServiceConfig {
    /// Absent URL disables the external-model path entirely.
    pub url: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct NarrativeConfig {
    pub endpoint: Option<String>,
    pub api_key: Option<SecretString>,
    pub cache_ttl_secs: u64,
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

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model_service: ModelServiceConfig { url: None, timeout_secs: 2 },
            narrative: NarrativeConfig { endpoint: None, api_key: None, cache_ttl_secs: 900 },
            deal_cache_ttl_secs: 300,
            oem_profiles: Vec::new(),
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    model_service: Option<ModelServicePatch>,
    narrative: Option<NarrativePatch>,
    deal_cache_ttl_secs: Option<u64>,
    oem_profiles: Option<Vec<OemProfile>>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct ModelServicePatch {
    url: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct NarrativePatch {
    endpoint: Option<String>,
    api_key: Option<String>,
    cache_ttl_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

impl EngineConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("dealwise.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(model_service) = patch.model_service {
            if let Some(url) = model_service.url {
                self.model_service.url = Some(url);
            }
            if let Some(timeout_secs) = model_service.timeout_secs {
                self.model_service.timeout_secs = timeout_secs;
            }
        }

        if let Some(narrative) = patch.narrative {
            if let Some(endpoint) = narrative.endpoint {
                self.narrative.endpoint = Some(endpoint);
            }
            if let Some(api_key_value) = narrative.api_key {
                self.narrative.api_key = Some(api_key_value.into());
            }
            if let Some(cache_ttl_secs) = narrative.cache_ttl_secs {
                self.narrative.cache_ttl_secs = cache_ttl_secs;
            }
        }

        if let Some(ttl) = patch.deal_cache_ttl_secs {
            self.deal_cache_ttl_secs = ttl;
        }
        if let Some(profiles) = patch.oem_profiles {
            self.oem_profiles = profiles;
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("DEALWISE_MODEL_URL") {
            self.model_service.url = Some(value);
        }
        if let Some(value) = read_env("DEALWISE_MODEL_TIMEOUT_SECS") {
            self.model_service.timeout_secs = parse_u64("DEALWISE_MODEL_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("DEALWISE_NARRATIVE_ENDPOINT") {
            self.narrative.endpoint = Some(value);
        }
        if let Some(value) = read_env("DEALWISE_NARRATIVE_API_KEY") {
            self.narrative.api_key = Some(value.into());
        }
        if let Some(value) = read_env("DEALWISE_LOG_LEVEL") {
            self.logging.level = value;
        }
        if let Some(value) = read_env("DEALWISE_LOG_FORMAT") {
            self.logging.format = value.parse()?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.model_service.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "model_service.timeout_secs must be positive".to_string(),
            ));
        }
        for profile in &self.oem_profiles {
            if profile.vendor.trim().is_empty() {
                return Err(ConfigError::Validation(
                    "oem_profiles entries require a vendor name".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Configured OEM profile by vendor name, case-insensitive.
    pub fn oem_profile(&self, vendor: &str) -> Option<&OemProfile> {
        self.oem_profiles
            .iter()
            .find(|profile| profile.vendor.eq_ignore_ascii_case(vendor.trim()))
    }

    /// Remote model client, when an inference URL is configured.
    pub fn model_service_client(&self) -> Result<Option<HttpModelService>, ApplicationError> {
        self.model_service
            .url
            .as_deref()
            .map(|url| {
                HttpModelService::new(url, Duration::from_secs(self.model_service.timeout_secs))
            })
            .transpose()
    }

    /// Narrative client, when an endpoint is configured. A missing API key
    /// behaves like any other narrative failure downstream.
    pub fn narrative_client(&self) -> Result<Option<HttpNarrativeClient>, ApplicationError> {
        self.narrative
            .endpoint
            .as_deref()
            .map(|endpoint| {
                HttpNarrativeClient::new(
                    endpoint,
                    self.narrative.api_key.clone(),
                    Duration::from_secs(self.narrative.cache_ttl_secs),
                )
            })
            .transpose()
    }
}

fn resolve_config_path(requested: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = requested {
        return path.exists().then(|| path.to_path_buf());
    }
    let default = PathBuf::from("dealwise.toml");
    default.exists().then_some(default)
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;
    toml::from_str(&raw)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}
