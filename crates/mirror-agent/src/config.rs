//! Configuration read from the environment.

use std::env;
use std::fmt::{self, Debug, Display};
use std::str::FromStr;

use mirror_agent_anthropic_model::{AnthropicConfig, AnthropicConfigBuilder};
use mirror_agent_core::DEFAULT_MAX_TURNS;

use crate::screen::CaptureRegion;

/// The Anthropic API key. Required.
pub const API_KEY_VAR: &str = "ANTHROPIC_API_KEY";
/// Overrides the Anthropic API endpoint.
pub const BASE_URL_VAR: &str = "ANTHROPIC_BASE_URL";
/// The model identifier.
pub const MODEL_VAR: &str = "MIRROR_AGENT_MODEL";
/// Maximum number of output tokens per model response.
pub const MAX_TOKENS_VAR: &str = "MIRROR_AGENT_MAX_TOKENS";
/// Sampling temperature, between 0 and 1.
pub const TEMPERATURE_VAR: &str = "MIRROR_AGENT_TEMPERATURE";
/// Maximum number of messages a task's conversation may hold.
pub const MAX_MESSAGES_VAR: &str = "MIRROR_AGENT_MAX_MESSAGES";
/// Region of the display to capture, as `x,y,width,height`.
pub const CAPTURE_REGION_VAR: &str = "MIRROR_AGENT_CAPTURE_REGION";

/// An error in the configuration.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A required variable is not set.
    #[error("{0} environment variable is not set")]
    Missing(&'static str),
    /// A variable is set to something unusable.
    #[error("{var} is invalid: {reason}")]
    Invalid {
        /// The offending variable.
        var: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

/// Everything needed to assemble a session.
#[derive(Clone, PartialEq)]
pub struct Config {
    /// The Anthropic API key.
    pub api_key: String,
    /// The API endpoint, if not the default one.
    pub base_url: Option<String>,
    /// The model identifier, if not the default one.
    pub model: Option<String>,
    /// Maximum output tokens, if not the default.
    pub max_tokens: Option<u32>,
    /// Sampling temperature, if any.
    pub temperature: Option<f32>,
    /// Maximum number of messages in a task's conversation.
    pub max_messages: usize,
    /// Region of the display to capture, if not the whole display.
    pub capture_region: Option<CaptureRegion>,
}

impl Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &"<deducted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("max_messages", &self.max_messages)
            .field("capture_region", &self.capture_region)
            .finish()
    }
}

impl Config {
    /// Creates a configuration with defaults for everything but the key.
    pub fn with_api_key<S: Into<String>>(api_key: S) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: None,
            model: None,
            max_tokens: None,
            temperature: None,
            max_messages: DEFAULT_MAX_TURNS,
            capture_region: None,
        }
    }

    /// Reads the configuration from the process environment.
    #[inline]
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Reads the configuration through `lookup`, which returns the value of
    /// a variable if it is set. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| {
            lookup(var)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };

        let api_key =
            get(API_KEY_VAR).ok_or(ConfigError::Missing(API_KEY_VAR))?;
        let mut config = Self::with_api_key(api_key);
        config.base_url = get(BASE_URL_VAR);
        config.model = get(MODEL_VAR);
        config.max_tokens = parse(MAX_TOKENS_VAR, get(MAX_TOKENS_VAR))?;
        config.temperature = parse(TEMPERATURE_VAR, get(TEMPERATURE_VAR))?;
        if let Some(max_messages) =
            parse(MAX_MESSAGES_VAR, get(MAX_MESSAGES_VAR))?
        {
            config.max_messages = max_messages;
        }
        config.capture_region =
            parse(CAPTURE_REGION_VAR, get(CAPTURE_REGION_VAR))?;

        config.validate()?;
        Ok(config)
    }

    /// Checks values that parse but make no sense.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_tokens == Some(0) {
            return Err(invalid(MAX_TOKENS_VAR, "must be positive"));
        }
        if let Some(temperature) = self.temperature {
            if !(0.0..=1.0).contains(&temperature) {
                return Err(invalid(
                    TEMPERATURE_VAR,
                    "must be between 0 and 1",
                ));
            }
        }
        if self.max_messages == 0 {
            return Err(invalid(MAX_MESSAGES_VAR, "must be positive"));
        }
        Ok(())
    }

    /// Returns the configuration of the model provider.
    pub fn provider_config(&self) -> AnthropicConfig {
        let mut builder = AnthropicConfigBuilder::with_api_key(&self.api_key);
        if let Some(base_url) = &self.base_url {
            builder = builder.with_base_url(base_url);
        }
        if let Some(model) = &self.model {
            builder = builder.with_model(model);
        }
        if let Some(max_tokens) = self.max_tokens {
            builder = builder.with_max_tokens(max_tokens);
        }
        if let Some(temperature) = self.temperature {
            builder = builder.with_temperature(temperature);
        }
        builder.build()
    }
}

fn parse<T>(
    var: &'static str,
    value: Option<String>,
) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    value
        .map(|value| value.parse::<T>().map_err(|err| invalid(var, err)))
        .transpose()
}

#[inline]
fn invalid(var: &'static str, reason: impl Display) -> ConfigError {
    ConfigError::Invalid {
        var,
        reason: reason.to_string(),
    }
}
