use std::pin::Pin;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use otter_contracts::{FinishReason, GenericRequest, GenericResponse, Part};
use tracing::debug;

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("conversion failed: {0}")]
    Conversion(String),
    #[error("encode failed: {0}")]
    Encode(String),
    #[error("upstream returned status {status}: {body}")]
    Upstream { status: u16, body: String },
    #[error("decode failed: {0}")]
    Decode(String),
    #[error("stream error: {0}")]
    Stream(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Lazy sequence of responses for one model invocation.
///
/// Nothing is sent upstream until the stream is first polled, and dropping
/// the stream releases the underlying HTTP body.
pub type ResponseStream = Pin<Box<dyn Stream<Item = Result<GenericResponse, CoreError>> + Send>>;

#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn name(&self) -> &str;

    fn generate_content(&self, request: GenericRequest, stream: bool) -> ResponseStream;

    async fn generate(&self, request: GenericRequest) -> Result<GenericResponse, CoreError> {
        collect_final(self.generate_content(request, false)).await
    }
}

/// Text and reasoning carried by the partial responses seen so far.
#[derive(Debug, Default)]
pub struct PartialTrail {
    partials: usize,
    text: String,
    reasoning: String,
}

impl PartialTrail {
    pub fn record(&mut self, response: &GenericResponse) {
        self.partials += 1;
        for part in &response.parts {
            match part {
                Part::Text { text } => self.text.push_str(text),
                Part::Reasoning { text } => self.reasoning.push_str(text),
                _ => {}
            }
        }
    }

    pub fn partials(&self) -> usize {
        self.partials
    }

    /// Closing `Stop` response for a sequence that ended without one.
    pub fn into_implicit_final(self) -> GenericResponse {
        let mut parts = Vec::new();
        if !self.reasoning.is_empty() {
            parts.push(Part::Reasoning { text: self.reasoning });
        }
        if !self.text.is_empty() {
            parts.push(Part::Text { text: self.text });
        }
        GenericResponse {
            parts,
            finish_reason: Some(FinishReason::Stop),
            usage_metadata: None,
            partial: false,
        }
    }
}

/// Drains `stream` and returns its closing `partial=false` response.
///
/// The first error ends the drain. A stream that closes without a final
/// response ends with an implicit `Stop` built from the drained partials.
pub async fn collect_final(mut stream: ResponseStream) -> Result<GenericResponse, CoreError> {
    let mut trail = PartialTrail::default();
    while let Some(item) = stream.next().await {
        let response = item?;
        if !response.partial {
            debug!(event = "model.response.final", partials = trail.partials());
            return Ok(response);
        }
        trail.record(&response);
    }
    debug!(event = "model.response.implicit_stop", partials = trail.partials());
    Ok(trail.into_implicit_final())
}

#[cfg(test)]
mod tests {
    use futures::stream;
    use super::*;

    fn boxed(items: Vec<Result<GenericResponse, CoreError>>) -> ResponseStream {
        Box::pin(stream::iter(items))
    }

    fn final_response(text: &str) -> GenericResponse {
        GenericResponse {
            parts: vec![Part::text(text)],
            finish_reason: Some(FinishReason::Stop),
            usage_metadata: None,
            partial: false,
        }
    }

    struct FixedModel {
        responses: Vec<Result<GenericResponse, CoreError>>,
    }

    #[async_trait]
    impl LanguageModel for FixedModel {
        fn name(&self) -> &str {
            "fixed"
        }

        fn generate_content(&self, _request: GenericRequest, _stream: bool) -> ResponseStream {
            boxed(self.responses.clone())
        }
    }

    #[tokio::test]
    async fn collect_final_skips_partials() {
        let stream = boxed(vec![
            Ok(GenericResponse::partial(vec![Part::text("Hel")])),
            Ok(GenericResponse::partial(vec![Part::text("lo")])),
            Ok(final_response("Hello")),
        ]);
        let response = collect_final(stream).await.expect("final response");
        assert!(!response.partial);
        assert_eq!(response.text(), "Hello");
    }

    #[tokio::test]
    async fn collect_final_surfaces_first_error() {
        let stream = boxed(vec![
            Ok(GenericResponse::partial(vec![Part::text("Hel")])),
            Err(CoreError::Stream("connection reset".to_string())),
            Ok(final_response("never")),
        ]);
        let error = collect_final(stream).await.expect_err("error must surface");
        assert_eq!(error, CoreError::Stream("connection reset".to_string()));
    }

    #[tokio::test]
    async fn stream_without_closing_response_ends_with_implicit_stop() {
        let stream = boxed(vec![
            Ok(GenericResponse::partial(vec![Part::reasoning("Think.")])),
            Ok(GenericResponse::partial(vec![Part::text("Hel")])),
            Ok(GenericResponse::partial(vec![Part::text("lo")])),
        ]);
        let response = collect_final(stream).await.expect("implicit final");
        assert!(!response.partial);
        assert_eq!(response.finish_reason, Some(FinishReason::Stop));
        assert_eq!(response.parts, vec![Part::reasoning("Think."), Part::text("Hello")]);
        assert_eq!(response.usage_metadata, None);
    }

    #[tokio::test]
    async fn empty_stream_ends_with_empty_stop() {
        let response = collect_final(boxed(Vec::new())).await.expect("implicit final");
        assert!(!response.partial);
        assert!(response.parts.is_empty());
        assert_eq!(response.finish_reason, Some(FinishReason::Stop));
    }

    #[tokio::test]
    async fn generate_defaults_to_final_response() {
        let model = FixedModel { responses: vec![Ok(final_response("done"))] };
        let response = model.generate(GenericRequest::default()).await.expect("response");
        assert_eq!(response.text(), "done");
        assert_eq!(model.name(), "fixed");
    }

    #[test]
    fn upstream_error_renders_status_and_body() {
        let error = CoreError::Upstream { status: 429, body: "rate limited".to_string() };
        assert_eq!(error.to_string(), "upstream returned status 429: rate limited");
    }
}
