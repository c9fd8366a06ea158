use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{EngineError, Result};
use crate::messaging::PlatformType;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Listen address for the inbound webhook.
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Skill started when an inbound event does not name one.
    #[serde(default = "default_skill")]
    pub default_skill: String,

    #[serde(default)]
    pub nlu: NluConfig,

    #[serde(default)]
    pub morph: MorphConfig,

    #[serde(default)]
    pub platforms: PlatformsConfig,
}

// -- NLU -----------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct NluConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Name skills use to reference this service from a parser.
    #[serde(default = "default_nlu_service")]
    pub service: String,

    /// Query endpoint. The access token is read from `NLU_ACCESS_TOKEN`.
    #[serde(default)]
    pub endpoint: String,

    #[serde(default = "default_language")]
    pub language: String,

    #[serde(default = "default_service_timeout_secs")]
    pub timeout_secs: u64,
}

// -- Morphological analyzer ------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct MorphConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub endpoint: String,

    #[serde(default = "default_service_timeout_secs")]
    pub timeout_secs: u64,
}

// -- Platforms -------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct PlatformsConfig {
    #[serde(default = "default_line")]
    pub line: PlatformConfig,

    #[serde(default = "default_facebook")]
    pub facebook: PlatformConfig,

    #[serde(default = "default_generic")]
    pub generic: PlatformConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlatformConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Base URL of the relay that performs the platform API calls.
    #[serde(default)]
    pub bridge_url: String,

    /// Messages per platform send (0 = unlimited).
    #[serde(default)]
    pub max_messages_per_reply: usize,
}

impl PlatformsConfig {
    /// Enabled platforms with their settings.
    pub fn enabled(&self) -> Vec<(PlatformType, &PlatformConfig)> {
        [
            (PlatformType::Line, &self.line),
            (PlatformType::Facebook, &self.facebook),
            (PlatformType::Generic, &self.generic),
        ]
        .into_iter()
        .filter(|(_, c)| c.enabled)
        .collect()
    }
}

fn default_bind() -> String {
    "127.0.0.1:3040".to_string()
}
fn default_skill() -> String {
    "pizza-order".to_string()
}
fn default_nlu_service() -> String {
    "dialogflow".to_string()
}
fn default_language() -> String {
    "ja".to_string()
}
fn default_service_timeout_secs() -> u64 {
    10
}
fn default_line() -> PlatformConfig {
    PlatformConfig {
        enabled: false,
        bridge_url: "http://127.0.0.1:3050".to_string(),
        max_messages_per_reply: 5,
    }
}
fn default_facebook() -> PlatformConfig {
    PlatformConfig {
        enabled: false,
        bridge_url: "http://127.0.0.1:3051".to_string(),
        max_messages_per_reply: 1,
    }
}
fn default_generic() -> PlatformConfig {
    PlatformConfig {
        enabled: false,
        bridge_url: "http://127.0.0.1:3052".to_string(),
        max_messages_per_reply: 0,
    }
}

impl Default for NluConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            service: default_nlu_service(),
            endpoint: String::new(),
            language: default_language(),
            timeout_secs: default_service_timeout_secs(),
        }
    }
}

impl Default for MorphConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: String::new(),
            timeout_secs: default_service_timeout_secs(),
        }
    }
}

impl Default for PlatformsConfig {
    fn default() -> Self {
        Self {
            line: default_line(),
            facebook: default_facebook(),
            generic: default_generic(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            default_skill: default_skill(),
            nlu: NluConfig::default(),
            morph: MorphConfig::default(),
            platforms: PlatformsConfig::default(),
        }
    }
}

// -- Config impl ---------------------------------------------------------

impl Config {
    /// Load config from the given path, or the default XDG config location.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_config_path(),
        };

        let config = if config_path.exists() {
            info!("loading config from {}", config_path.display());
            let contents = std::fs::read_to_string(&config_path)?;
            toml::from_str(&contents).map_err(|e| EngineError::Config(format!("parse error: {e}")))?
        } else {
            info!("no config file found, using defaults");
            Config::default()
        };

        Ok(config)
    }

    /// Returns the default config file path: `$XDG_CONFIG_HOME/skill-dialog/config.toml`
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join("skill-dialog")
            .join("config.toml")
    }

    /// Bearer token for the NLU endpoint, if set.
    pub fn nlu_access_token() -> Option<String> {
        std::env::var("NLU_ACCESS_TOKEN").ok().filter(|t| !t.is_empty())
    }

    /// Generate the default config file contents.
    pub fn default_config_contents() -> &'static str {
        include_str!("../config.example.toml")
    }
}
