use otter_core::CoreError;
use reqwest::{Client, Response};
use tracing::{debug, error};

use crate::wire::ChatCompletionsRequest;

/// HTTP side of the adapter: one POST per invocation, no retries.
#[derive(Clone)]
pub struct Transport {
    client: Client,
    base_url: String,
    api_key: String,
}

impl Transport {
    pub fn new(client: Client, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url, api_key: api_key.into() }
    }

    pub fn chat_completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    /// Sends `body` and returns the still-open response on 2xx.
    ///
    /// Any other status is drained and reported as [`CoreError::Upstream`].
    pub async fn post_chat_completions(
        &self,
        body: &ChatCompletionsRequest,
    ) -> Result<Response, CoreError> {
        let payload = serde_json::to_vec(body)
            .map_err(|err| CoreError::Encode(format!("chat completion request: {err}")))?;
        let url = self.chat_completions_url();
        debug!(
            event = "provider.request.sent",
            url = %url,
            model = %body.model,
            stream = body.stream,
            bytes = payload.len()
        );

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .bearer_auth(&self.api_key)
            .body(payload)
            .send()
            .await
            .map_err(|err| {
                error!(event = "provider.request.failed", url = %url, error = %err);
                CoreError::Transport(format!("request to {url} failed: {err}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(
                event = "provider.response.status_error",
                url = %url,
                status = status.as_u16(),
                body = %body
            );
            return Err(CoreError::Upstream { status: status.as_u16(), body });
        }

        debug!(event = "provider.response.received", status = status.as_u16());
        Ok(response)
    }
}
