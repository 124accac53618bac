use std::env;

use otter_clients_openai::DeepSeekConfig;

pub const DEFAULT_PROVIDER_TIMEOUT_SECONDS: u64 = 120;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub deepseek: DeepSeekConfig,
    pub stream: bool,
    pub system_instruction: Option<String>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("DEEPSEEK_API_KEY is not set")]
    MissingApiKey,
    #[error("invalid OTTER_PROVIDER_TIMEOUT value: {0}")]
    InvalidProviderTimeout(String),
    #[error("invalid OTTER_STREAM value: {0}")]
    InvalidStreamBool(String),
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let non_blank = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let api_key = non_blank("DEEPSEEK_API_KEY").ok_or(ConfigError::MissingApiKey)?;
        let base_url = non_blank("DEEPSEEK_BASE_URL");
        let model = non_blank("DEEPSEEK_MODEL").map(|value| value.trim().to_string());

        let timeout_raw = non_blank("OTTER_PROVIDER_TIMEOUT")
            .unwrap_or_else(|| DEFAULT_PROVIDER_TIMEOUT_SECONDS.to_string());
        let timeout_seconds = parse_positive_u64(&timeout_raw)
            .ok_or(ConfigError::InvalidProviderTimeout(timeout_raw))?;

        let stream_raw = non_blank("OTTER_STREAM").unwrap_or_else(|| "false".to_string());
        let stream =
            parse_bool(&stream_raw).ok_or_else(|| ConfigError::InvalidStreamBool(stream_raw))?;

        let system_instruction = non_blank("OTTER_SYSTEM_INSTRUCTION");

        Ok(Self {
            deepseek: DeepSeekConfig {
                api_key,
                base_url,
                model,
                timeout_seconds: Some(timeout_seconds),
            },
            stream,
            system_instruction,
        })
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_positive_u64(value: &str) -> Option<u64> {
    let parsed = value.trim().parse::<u64>().ok()?;
    if parsed == 0 { None } else { Some(parsed) }
}
