use std::collections::VecDeque;
use std::fmt::Display;
use std::pin::Pin;

use bytes::Bytes;
use futures::{Stream, StreamExt, stream};
use otter_contracts::{FinishReason, GenericResponse, Part};
use otter_core::{CoreError, ResponseStream};
use tracing::{debug, warn};

use crate::response::{assemble_parts, usage_metadata};
use crate::wire::{ChatCompletionChunk, ChunkDelta, ToolCallDelta, WireToolCall, WireUsage};

const DATA_PREFIX: &str = "data:";
const DONE_MARKER: &str = "[DONE]";

/// Splits raw body bytes into lines, carrying partial lines across chunks.
#[derive(Debug, Default)]
pub(crate) struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub(crate) fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(position) = self.pending.iter().position(|byte| *byte == b'\n') {
            let line = self.pending.drain(..=position).collect::<Vec<_>>();
            lines.push(decode_line_bytes(&line[..position]));
        }
        lines
    }

    /// Returns the unterminated tail, if any.
    pub(crate) fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let tail = std::mem::take(&mut self.pending);
        Some(decode_line_bytes(&tail))
    }
}

fn decode_line_bytes(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecoderState {
    Idle,
    Accumulating,
    Finished,
}

/// Per-invocation SSE state machine for chat-completion chunks.
#[derive(Debug)]
pub struct StreamDecoder {
    state: DecoderState,
    text: String,
    reasoning: String,
    tool_calls: Vec<WireToolCall>,
    usage: Option<WireUsage>,
}

impl Default for StreamDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self {
            state: DecoderState::Idle,
            text: String::new(),
            reasoning: String::new(),
            tool_calls: Vec::new(),
            usage: None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.state == DecoderState::Finished
    }

    /// Feeds one line and returns the responses it produced.
    ///
    /// At most one item is non-partial, and once it (or an error) has been
    /// returned every further line is ignored.
    pub fn decode_line(&mut self, line: &str) -> Vec<Result<GenericResponse, CoreError>> {
        if self.is_finished() {
            return Vec::new();
        }
        let Some(data) = line.strip_prefix(DATA_PREFIX) else {
            return Vec::new();
        };
        let data = data.strip_prefix(' ').unwrap_or(data).trim_end();
        if data == DONE_MARKER {
            debug!(event = "provider.stream.done_marker");
            return self.finish().into_iter().collect();
        }

        let chunk = match serde_json::from_str::<ChatCompletionChunk>(data) {
            Ok(chunk) => chunk,
            Err(err) => {
                warn!(event = "provider.stream.chunk_skipped", error = %err);
                return Vec::new();
            }
        };
        self.state = DecoderState::Accumulating;
        if chunk.usage.is_some() {
            self.usage = chunk.usage;
        }

        let Some(choice) = chunk.choices.into_iter().next() else {
            return Vec::new();
        };
        let mut out = match choice.delta {
            Some(delta) => self.apply_delta(delta),
            None => Vec::new(),
        };
        if let Some(reason) = choice.finish_reason.filter(|reason| !reason.is_empty()) {
            debug!(event = "provider.stream.finished", finish_reason = %reason);
            out.push(self.assemble(FinishReason::from_wire(&reason)));
        }
        out
    }

    /// Closes the stream. Accumulated state without a finish reason is
    /// flushed as a synthetic `Stop` response.
    pub fn finish(&mut self) -> Option<Result<GenericResponse, CoreError>> {
        if self.is_finished() {
            return None;
        }
        if self.text.is_empty() && self.reasoning.is_empty() && self.tool_calls.is_empty() {
            self.state = DecoderState::Finished;
            return None;
        }
        debug!(event = "provider.stream.fallback_flush");
        Some(self.assemble(FinishReason::Stop))
    }

    fn apply_delta(&mut self, delta: ChunkDelta) -> Vec<Result<GenericResponse, CoreError>> {
        let mut out = Vec::new();
        if let Some(reasoning) =
            delta.reasoning_content.or(delta.reasoning).filter(|value| !value.is_empty())
        {
            self.reasoning.push_str(&reasoning);
            out.push(Ok(GenericResponse::partial(vec![Part::reasoning(reasoning)])));
        }
        if let Some(content) = delta.content.filter(|value| !value.is_empty()) {
            self.text.push_str(&content);
            out.push(Ok(GenericResponse::partial(vec![Part::text(content)])));
        }
        for (position, call) in delta.tool_calls.unwrap_or_default().into_iter().enumerate() {
            self.merge_tool_call(position, call);
        }
        out
    }

    fn merge_tool_call(&mut self, position: usize, delta: ToolCallDelta) {
        let index = delta.index.unwrap_or(position);
        if self.tool_calls.len() <= index {
            self.tool_calls.resize_with(index + 1, WireToolCall::default);
        }
        let entry = &mut self.tool_calls[index];
        if let Some(id) = delta.id.filter(|id| !id.is_empty()) {
            entry.id = id;
        }
        if let Some(kind) = delta.kind.filter(|kind| !kind.is_empty()) {
            entry.kind = kind;
        }
        if let Some(function) = delta.function {
            if let Some(name) = function.name.filter(|name| !name.is_empty()) {
                entry.function.name = name;
            }
            if let Some(arguments) = function.arguments {
                entry.function.arguments.push_str(&arguments);
            }
        }
    }

    fn assemble(&mut self, finish_reason: FinishReason) -> Result<GenericResponse, CoreError> {
        self.state = DecoderState::Finished;
        let text = std::mem::take(&mut self.text);
        let reasoning = std::mem::take(&mut self.reasoning);
        let tool_calls = std::mem::take(&mut self.tool_calls)
            .into_iter()
            .filter(|call| {
                let named = !call.function.name.is_empty();
                if !named {
                    warn!(event = "provider.stream.tool_call_unnamed", id = %call.id);
                }
                named
            })
            .collect::<Vec<_>>();

        let reasoning = if reasoning.is_empty() { Vec::new() } else { vec![reasoning] };
        Ok(GenericResponse {
            parts: assemble_parts(reasoning, &text, &tool_calls)?,
            finish_reason: Some(finish_reason),
            usage_metadata: usage_metadata(self.usage.as_ref()),
            partial: false,
        })
    }
}

struct EventStream<S> {
    body: Option<Pin<Box<S>>>,
    lines: LineBuffer,
    decoder: StreamDecoder,
    pending: VecDeque<Result<GenericResponse, CoreError>>,
}

impl<S> EventStream<S> {
    fn close(&mut self) {
        self.body = None;
    }

    fn feed(&mut self, lines: Vec<String>) {
        for line in lines {
            self.pending.extend(self.decoder.decode_line(&line));
            if self.decoder.is_finished() {
                self.close();
                return;
            }
        }
    }
}

/// Turns an SSE body into a lazy response stream.
///
/// The body is only polled when the consumer asks for the next item. It is
/// released as soon as the decoder finishes, an error is yielded, or the
/// returned stream is dropped.
pub(crate) fn decode_event_stream<S, E>(body: S) -> ResponseStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    let state = EventStream {
        body: Some(Box::pin(body)),
        lines: LineBuffer::default(),
        decoder: StreamDecoder::new(),
        pending: VecDeque::new(),
    };

    Box::pin(stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                if item.is_err() {
                    state.pending.clear();
                    state.close();
                }
                return Some((item, state));
            }
            let body = state.body.as_mut()?;
            match body.next().await {
                Some(Ok(chunk)) => {
                    let lines = state.lines.push(&chunk);
                    state.feed(lines);
                }
                Some(Err(err)) => {
                    warn!(event = "provider.stream.read_failed", error = %err);
                    state.close();
                    state.pending.push_back(Err(CoreError::Stream(err.to_string())));
                }
                None => {
                    state.close();
                    if let Some(tail) = state.lines.finish() {
                        state.feed(vec![tail]);
                    }
                    state.pending.extend(state.decoder.finish());
                }
            }
        }
    }))
}
