use std::io::Write;

use futures::StreamExt;
use otter_contracts::{GenericRequest, GenericResponse, Part, Turn};
use otter_core::{CoreError, LanguageModel, PartialTrail};
use tracing::info;

pub mod config;

pub const USAGE: &str = "usage: otter-app [--stream] <prompt...>";

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Model(#[from] CoreError),
    #[error("writing output failed: {0}")]
    Output(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliArgs {
    pub stream: bool,
    pub prompt: String,
}

impl CliArgs {
    /// Parses arguments after the program name. `None` means there is no prompt.
    pub fn parse(args: impl IntoIterator<Item = String>, stream_default: bool) -> Option<Self> {
        let mut stream = stream_default;
        let mut words = Vec::new();
        for arg in args {
            match arg.as_str() {
                "--stream" => stream = true,
                "--no-stream" => stream = false,
                _ => words.push(arg),
            }
        }
        let prompt = words.join(" ").trim().to_string();
        if prompt.is_empty() { None } else { Some(Self { stream, prompt }) }
    }
}

pub fn build_prompt_request(prompt: &str, system_instruction: Option<&str>) -> GenericRequest {
    let request = GenericRequest::new(vec![Turn::user_text(prompt)]);
    match system_instruction {
        Some(instruction) => request.with_system_instruction(instruction),
        None => request,
    }
}

/// Runs one prompt and writes the answer to `writer`.
///
/// In streaming mode text increments are written as they arrive. Function
/// calls of the final response follow the text, one per line. A stream that
/// ends without a final response closes with an implicit `Stop`.
pub async fn run_prompt<M, W>(
    model: &M,
    request: GenericRequest,
    stream: bool,
    writer: &mut W,
) -> Result<GenericResponse, AppError>
where
    M: LanguageModel + ?Sized,
    W: Write,
{
    info!(event = "app.prompt.started", model = model.name(), stream = stream);
    let mut responses = model.generate_content(request, stream);
    let mut streamed_text = false;
    let mut trail = PartialTrail::default();

    while let Some(item) = responses.next().await {
        let response = item?;
        if response.partial {
            for part in &response.parts {
                if let Part::Text { text } = part {
                    writer.write_all(text.as_bytes())?;
                    streamed_text = true;
                }
            }
            writer.flush()?;
            trail.record(&response);
            continue;
        }

        let text = response.text();
        if !streamed_text && !text.is_empty() {
            writer.write_all(text.as_bytes())?;
        }
        if streamed_text || !text.is_empty() {
            writeln!(writer)?;
        }
        for call in response.function_calls() {
            let args = serde_json::Value::Object(call.args.clone());
            writeln!(writer, "-> {}({args})", call.name)?;
        }
        writer.flush()?;

        info!(
            event = "app.prompt.finished",
            finish_reason = ?response.finish_reason,
            function_calls = response.function_calls().len()
        );
        return Ok(response);
    }

    if streamed_text {
        writeln!(writer)?;
        writer.flush()?;
    }
    info!(event = "app.prompt.implicit_stop", partials = trail.partials());
    Ok(trail.into_implicit_final())
}
