use std::time::Duration;

use async_trait::async_trait;
use futures::{StreamExt, stream};
use otter_contracts::GenericRequest;
use otter_core::{CoreError, LanguageModel, ResponseStream};
use reqwest::Client;
use tracing::{debug, error};
use uuid::Uuid;

mod clients;
mod convert;
mod extract;
mod request;
mod response;
mod sse;
mod transport;
pub mod wire;

pub use clients::{DeepSeekClient, DeepSeekConfig};
pub use convert::{convert_tool, convert_turn};
pub use extract::extract_tool_calls;
pub use request::build_request;
pub use response::{convert_response, decode_response};
pub use sse::StreamDecoder;
pub use transport::Transport;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 120;

pub(crate) fn fabricate_call_id() -> String {
    format!("call_{}", Uuid::new_v4().simple())
}

/// Chat-completions adapter for any OpenAI-compatible upstream.
#[derive(Clone)]
pub struct OpenAiCompatibleModel {
    model_name: String,
    transport: Transport,
    include_stream_usage: bool,
}

#[derive(Debug, Default)]
pub struct OpenAiCompatibleModelBuilder {
    api_key: Option<String>,
    base_url: Option<String>,
    model_name: Option<String>,
    http_client: Option<Client>,
    timeout_seconds: Option<u64>,
    include_stream_usage: Option<bool>,
}

impl OpenAiCompatibleModelBuilder {
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn model_name(mut self, model_name: impl Into<String>) -> Self {
        self.model_name = Some(model_name.into());
        self
    }

    /// Uses a prebuilt client; `timeout_seconds` is then ignored.
    pub fn http_client(mut self, http_client: Client) -> Self {
        self.http_client = Some(http_client);
        self
    }

    pub fn timeout_seconds(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = Some(timeout_seconds);
        self
    }

    pub fn include_stream_usage(mut self, include: bool) -> Self {
        self.include_stream_usage = Some(include);
        self
    }

    pub fn build(self) -> Result<OpenAiCompatibleModel, CoreError> {
        let api_key = self
            .api_key
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| CoreError::Config("API key is required".to_string()))?;
        let base_url = self
            .base_url
            .map(|value| value.trim().trim_end_matches('/').to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let http_client = match self.http_client {
            Some(client) => client,
            None => build_http_client(self.timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECONDS))?,
        };
        let model_name = self.model_name.unwrap_or_default();

        debug!(event = "provider.model.built", model = %model_name, base_url = %base_url);
        Ok(OpenAiCompatibleModel {
            model_name,
            transport: Transport::new(http_client, base_url, api_key),
            include_stream_usage: self.include_stream_usage.unwrap_or(true),
        })
    }
}

pub fn build_http_client(timeout_seconds: u64) -> Result<Client, CoreError> {
    if timeout_seconds == 0 {
        return Err(CoreError::Config("timeout must be a positive number of seconds".to_string()));
    }
    Client::builder()
        .timeout(Duration::from_secs(timeout_seconds))
        .build()
        .map_err(|err| CoreError::Config(format!("http client init failed: {err}")))
}

impl OpenAiCompatibleModel {
    pub fn builder() -> OpenAiCompatibleModelBuilder {
        OpenAiCompatibleModelBuilder::default()
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    fn failed(err: CoreError) -> ResponseStream {
        Box::pin(stream::iter([Err(err)]))
    }
}

#[async_trait]
impl LanguageModel for OpenAiCompatibleModel {
    fn name(&self) -> &str {
        &self.model_name
    }

    fn generate_content(&self, request: GenericRequest, stream: bool) -> ResponseStream {
        let body =
            match build_request(&self.model_name, &request, stream, self.include_stream_usage) {
                Ok(body) => body,
                Err(err) => {
                    error!(event = "provider.request.convert_failed", error = %err);
                    return Self::failed(err);
                }
            };
        let transport = self.transport.clone();

        if stream {
            let response = stream::once(async move { transport.post_chat_completions(&body).await });
            return Box::pin(response.flat_map(|result| -> ResponseStream {
                match result {
                    Ok(response) => sse::decode_event_stream(response.bytes_stream()),
                    Err(err) => Self::failed(err),
                }
            }));
        }

        Box::pin(stream::once(async move {
            let response = transport.post_chat_completions(&body).await?;
            let bytes = response.bytes().await.map_err(|err| {
                error!(event = "provider.response.read_failed", error = %err);
                CoreError::Transport(format!("reading response body failed: {err}"))
            })?;
            decode_response(&bytes)
        }))
    }
}
