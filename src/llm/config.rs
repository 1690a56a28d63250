//! LLM configuration parsed from environment variables.

use super::types::LlmError;

pub const DEFAULT_LLM_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_LLM_MODEL: &str = "gpt-4.1-mini";
pub const DEFAULT_LLM_REQUEST_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_LLM_CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LlmTimeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmConfig {
    pub api_key: String,
    pub model: String,
    pub title_model: String,
    pub base_url: String,
    pub timeouts: LlmTimeouts,
}

impl LlmConfig {
    /// Build typed LLM config from environment variables.
    ///
    /// Required:
    /// - `LLM_API_KEY_ENV` (names the env var containing the key)
    ///
    /// Optional:
    /// - `LLM_MODEL`: default `gpt-4.1-mini`
    /// - `LLM_TITLE_MODEL`: defaults to `LLM_MODEL`
    /// - `LLM_BASE_URL`: any OpenAI-compatible endpoint, default OpenAI
    /// - `LLM_REQUEST_TIMEOUT_SECS`: default 120
    /// - `LLM_CONNECT_TIMEOUT_SECS`: default 10
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::MissingApiKey`] when the key cannot be resolved.
    pub fn from_env() -> Result<Self, LlmError> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build the config from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::MissingApiKey`] when the key cannot be resolved.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self, LlmError> {
        let key_var = var("LLM_API_KEY_ENV")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| LlmError::MissingApiKey { var: "LLM_API_KEY_ENV".into() })?;
        let api_key = var(&key_var)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| LlmError::MissingApiKey { var: key_var.clone() })?;

        let model = non_blank(var("LLM_MODEL")).unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string());
        let title_model = non_blank(var("LLM_TITLE_MODEL")).unwrap_or_else(|| model.clone());
        let base_url = non_blank(var("LLM_BASE_URL"))
            .unwrap_or_else(|| DEFAULT_LLM_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        let request_secs = var("LLM_REQUEST_TIMEOUT_SECS");
        let connect_secs = var("LLM_CONNECT_TIMEOUT_SECS");
        let timeouts = LlmTimeouts {
            request_secs: parse_u64(request_secs, DEFAULT_LLM_REQUEST_TIMEOUT_SECS),
            connect_secs: parse_u64(connect_secs, DEFAULT_LLM_CONNECT_TIMEOUT_SECS),
        };

        Ok(Self { api_key, model, title_model, base_url, timeouts })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_u64(value: Option<String>, default: u64) -> u64 {
    value
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
