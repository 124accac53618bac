use async_trait::async_trait;
use otter_contracts::GenericRequest;
use otter_core::{CoreError, LanguageModel, ResponseStream};
use reqwest::Client;

use crate::OpenAiCompatibleModel;

pub const DEFAULT_DEEPSEEK_MODEL: &str = "deepseek-chat";
pub const DEFAULT_DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeepSeekConfig {
    pub api_key: String,
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub timeout_seconds: Option<u64>,
}

/// DeepSeek flavour of the OpenAI-compatible adapter.
#[derive(Clone)]
pub struct DeepSeekClient {
    inner: OpenAiCompatibleModel,
}

impl DeepSeekClient {
    pub fn from_config(config: &DeepSeekConfig) -> Result<Self, CoreError> {
        Self::from_config_with_http_client(config, None)
    }

    pub fn from_config_with_http_client(
        config: &DeepSeekConfig,
        http_client: Option<Client>,
    ) -> Result<Self, CoreError> {
        let model = config
            .model
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or(DEFAULT_DEEPSEEK_MODEL);
        let base_url = config
            .base_url
            .as_deref()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or(DEFAULT_DEEPSEEK_BASE_URL);

        let mut builder = OpenAiCompatibleModel::builder()
            .api_key(&config.api_key)
            .base_url(base_url)
            .model_name(model);
        if let Some(timeout_seconds) = config.timeout_seconds {
            builder = builder.timeout_seconds(timeout_seconds);
        }
        if let Some(http_client) = http_client {
            builder = builder.http_client(http_client);
        }
        Ok(Self { inner: builder.build()? })
    }
}

#[async_trait]
impl LanguageModel for DeepSeekClient {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn generate_content(&self, request: GenericRequest, stream: bool) -> ResponseStream {
        self.inner.generate_content(request, stream)
    }
}
