//! Resolved run configuration.

use std::{fmt, path::PathBuf, str::FromStr, time::Duration};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::prompts;

/// Default pause between two prompts.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(3);

/// Default message ceiling.
pub const DEFAULT_MAX_MESSAGES: u32 = 50;

/// Prompt corpus selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptCategory {
    #[default]
    General,
    Qa,
    Creative,
    Technical,
    Educational,
    /// User-supplied prompt list.
    Custom,
}

impl PromptCategory {
    /// Every category, in display order.
    pub const ALL: &'static [Self] = &[
        Self::General,
        Self::Qa,
        Self::Creative,
        Self::Technical,
        Self::Educational,
        Self::Custom,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Qa => "qa",
            Self::Creative => "creative",
            Self::Technical => "technical",
            Self::Educational => "educational",
            Self::Custom => "custom",
        }
    }
}

impl fmt::Display for PromptCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PromptCategory {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == wanted)
            .ok_or_else(|| ConfigError::UnknownCategory(s.to_string()))
    }
}

/// Configuration error.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Endpoint address is required")]
    MissingEndpoint,
    #[error("Unknown prompt category: {0}")]
    UnknownCategory(String),
    #[error("Maximum message count must be at least 1")]
    InvalidMaxMessages,
    #[error("Invalid interval: {0}")]
    InvalidInterval(String),
}

/// Settings for one session, immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    /// Endpoint address (e.g. `ws://localhost:8080/chat`).
    pub endpoint: String,
    pub category: PromptCategory,
    /// Only meaningful when `category` is `Custom`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub custom_prompts: Vec<String>,
    #[serde(rename = "interval_secs", with = "duration_secs")]
    pub interval: Duration,
    pub max_messages: u32,
    pub log_path: PathBuf,
    /// Set when a custom category had no usable prompts.
    #[serde(default)]
    pub fallback_to_default: bool,
}

impl Configuration {
    /// Start building a configuration for an endpoint.
    #[must_use]
    pub fn builder(endpoint: impl Into<String>) -> ConfigurationBuilder {
        ConfigurationBuilder::new(endpoint)
    }

    /// The ordered prompt sequence this configuration resolves to.
    #[must_use]
    pub fn prompts(&self) -> Vec<String> {
        if self.category == PromptCategory::Custom && !self.fallback_to_default {
            self.custom_prompts.clone()
        } else {
            prompts::builtin_owned(self.category)
        }
    }
}

/// Builder for [`Configuration`].
#[derive(Debug, Clone)]
pub struct ConfigurationBuilder {
    endpoint: String,
    category: PromptCategory,
    custom_prompts: Vec<String>,
    interval: Duration,
    max_messages: u32,
    log_path: Option<PathBuf>,
}

impl ConfigurationBuilder {
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            category: PromptCategory::default(),
            custom_prompts: Vec::new(),
            interval: DEFAULT_INTERVAL,
            max_messages: DEFAULT_MAX_MESSAGES,
            log_path: None,
        }
    }

    #[must_use]
    pub const fn category(mut self, category: PromptCategory) -> Self {
        self.category = category;
        self
    }

    #[must_use]
    pub fn custom_prompts<I, S>(mut self, prompts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.custom_prompts = prompts.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub const fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Interval in (possibly fractional) seconds.
    ///
    /// # Errors
    /// Returns error if the value is negative or not finite.
    pub fn interval_secs(self, secs: f64) -> Result<Self, ConfigError> {
        let interval = Duration::try_from_secs_f64(secs)
            .map_err(|_| ConfigError::InvalidInterval(secs.to_string()))?;
        Ok(self.interval(interval))
    }

    #[must_use]
    pub const fn max_messages(mut self, max_messages: u32) -> Self {
        self.max_messages = max_messages;
        self
    }

    #[must_use]
    pub fn log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    /// Validate and produce the configuration.
    ///
    /// # Errors
    /// Returns error if the endpoint is empty or the ceiling is zero.
    pub fn build(self) -> Result<Configuration, ConfigError> {
        let endpoint = self.endpoint.trim().to_string();
        if endpoint.is_empty() {
            return Err(ConfigError::MissingEndpoint);
        }
        if self.max_messages == 0 {
            return Err(ConfigError::InvalidMaxMessages);
        }

        let custom_prompts: Vec<String> = self
            .custom_prompts
            .into_iter()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();

        let fallback_to_default =
            self.category == PromptCategory::Custom && custom_prompts.is_empty();
        if fallback_to_default {
            tracing::warn!("Custom category selected without prompts, using the general set");
        }

        Ok(Configuration {
            endpoint,
            category: self.category,
            custom_prompts,
            interval: self.interval,
            max_messages: self.max_messages,
            log_path: self
                .log_path
                .unwrap_or_else(|| default_log_path(Local::now())),
            fallback_to_default,
        })
    }
}

/// Log file name derived from a start time.
#[must_use]
pub fn default_log_path(at: DateTime<Local>) -> PathBuf {
    PathBuf::from(format!("chat-log-{}.json", at.format("%Y-%m-%d-%H%M%S")))
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(D::Error::custom)
    }
}
