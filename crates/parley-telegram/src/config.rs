//! Destination configuration: environment, `.env`, keychain and `parley.yml` layers.

use std::fmt;
use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::poller::DEFAULT_LONG_POLL_SECS;
use crate::types::ChannelId;

pub const BOT_TOKEN_ENV: &str = "TELEGRAM_BOT_TOKEN";
pub const GROUP_ID_ENV: &str = "TELEGRAM_GROUP_ID";
pub const API_BASE_ENV: &str = "TELEGRAM_API_BASE";

pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";
pub const DEFAULT_CONFIG_FILE: &str = "parley.yml";

/// Resolved destination configuration.
#[derive(Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub channel_id: ChannelId,
    pub api_base: String,
    pub long_poll_secs: u64,
}

/// One layer of partially specified configuration.
///
/// Layers are merged field by field; see [`TelegramConfig::resolve`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigSources {
    pub bot_token: Option<String>,
    pub channel_id: Option<String>,
    pub api_base: Option<String>,
    pub long_poll_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    telegram: FileSection,
}

#[derive(Debug, Default, Deserialize)]
struct FileSection {
    bot_token: Option<String>,
    // Group ids are usually written as bare negative integers.
    group_id: Option<serde_yaml::Value>,
    api_base: Option<String>,
    long_poll_secs: Option<u64>,
}

impl ConfigSources {
    /// Read `TELEGRAM_*` variables, loading a `.env` file first if one exists.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        Self {
            bot_token: std::env::var(BOT_TOKEN_ENV).ok(),
            channel_id: std::env::var(GROUP_ID_ENV).ok(),
            api_base: std::env::var(API_BASE_ENV).ok(),
            long_poll_secs: None,
        }
    }

    /// Read the `telegram:` section of a YAML config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Like [`from_file`](Self::from_file) but an absent file is an empty layer.
    pub fn from_optional_file(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        // An empty file deserializes to unit; treat it as an empty layer.
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let file: ConfigFile = serde_yaml::from_str(content)?;
        let section = file.telegram;
        Ok(Self {
            bot_token: section.bot_token,
            channel_id: section.group_id.as_ref().and_then(yaml_scalar),
            api_base: section.api_base,
            long_poll_secs: section.long_poll_secs,
        })
    }
}

fn yaml_scalar(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn normalize(value: Option<&String>) -> Option<String> {
    value.and_then(|raw| {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

impl TelegramConfig {
    /// Merge layers, highest precedence first. Empty strings count as unset.
    pub fn resolve(layers: &[ConfigSources]) -> Result<Self, ConfigError> {
        let first = |pick: fn(&ConfigSources) -> Option<&String>| {
            layers.iter().find_map(|layer| normalize(pick(layer)))
        };

        let bot_token = first(|l| l.bot_token.as_ref()).ok_or(ConfigError::MissingBotToken)?;
        let channel_id = first(|l| l.channel_id.as_ref()).ok_or(ConfigError::MissingChannel)?;
        if channel_id.parse::<i64>().is_err() {
            return Err(ConfigError::InvalidChannel(channel_id));
        }
        let api_base =
            first(|l| l.api_base.as_ref()).unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        let long_poll_secs = layers
            .iter()
            .find_map(|l| l.long_poll_secs)
            .unwrap_or(DEFAULT_LONG_POLL_SECS);

        Ok(Self {
            bot_token,
            channel_id: ChannelId::new(channel_id),
            api_base,
            long_poll_secs,
        })
    }

    /// Bot token masked for logging.
    pub fn bot_token_masked(&self) -> String {
        if self.bot_token.len() > 8 && self.bot_token.is_ascii() {
            format!(
                "{}...{}",
                &self.bot_token[..4],
                &self.bot_token[self.bot_token.len() - 4..]
            )
        } else {
            "****".to_string()
        }
    }
}

impl fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("bot_token", &self.bot_token_masked())
            .field("channel_id", &self.channel_id)
            .field("api_base", &self.api_base)
            .field("long_poll_secs", &self.long_poll_secs)
            .finish()
    }
}
