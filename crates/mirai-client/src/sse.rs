//! # Stream Decoder
//!
//! Turns the chunked body of `POST /api/chat/stream` into [`StreamEvent`]s:
//! - Residual buffering across arbitrary chunk boundaries
//! - `data:` prefix extraction (everything else is ignored)
//! - `[DONE]` sentinel handling (nothing is emitted after it)
//! - Per-record JSON interpretation with malformed records skipped

use std::collections::VecDeque;
use std::fmt::Display;

use bytes::{Bytes, BytesMut};
use futures::Stream;
use mirai_core::{ClientError, StreamEvent};
use serde_json::Value;
use tokio_stream::StreamExt;
use tracing::{debug, warn};

const DONE_SENTINEL: &str = "[DONE]";
const DEFAULT_PROVIDER_ERROR: &str = "Upstream provider error";

/// Options for the stream decoder.
#[derive(Clone, Copy, Debug, Default)]
pub struct DecoderOptions {
    /// Parse an unterminated final line when the byte stream ends.
    /// Default: `false` (records are newline-terminated).
    pub flush_trailing_record: bool,
}

/// Incremental decoder for one stream. Not reusable across streams.
#[derive(Debug)]
pub struct StreamDecoder {
    buffer: BytesMut,
    done: bool,
    options: DecoderOptions,
}

impl Default for StreamDecoder {
    fn default() -> Self {
        Self::new(DecoderOptions::default())
    }
}

impl StreamDecoder {
    pub fn new(options: DecoderOptions) -> Self {
        Self {
            buffer: BytesMut::with_capacity(8192),
            done: false,
            options,
        }
    }

    /// `true` once the terminal sentinel has been seen.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feed one raw chunk and return every event completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if self.done {
            return events;
        }
        self.buffer.extend_from_slice(chunk);

        while let Some(newline_pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let mut line_bytes = self.buffer.split_to(newline_pos + 1);
            line_bytes.truncate(line_bytes.len() - 1);
            if line_bytes.last() == Some(&b'\r') {
                line_bytes.truncate(line_bytes.len() - 1);
            }

            let Ok(line) = std::str::from_utf8(&line_bytes) else {
                debug!(bytes = line_bytes.len(), "skipping non-UTF-8 line");
                continue;
            };

            if decode_line(line, &mut events) {
                self.done = true;
                self.buffer.clear();
                break;
            }
        }
        events
    }

    /// Signal end of input. Emits the unterminated tail only when
    /// [`DecoderOptions::flush_trailing_record`] is set.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        let tail = self.buffer.split();
        if self.done || tail.is_empty() {
            return events;
        }
        if !self.options.flush_trailing_record {
            debug!(bytes = tail.len(), "discarding unterminated trailing record");
            return events;
        }
        if let Ok(line) = std::str::from_utf8(&tail) {
            if decode_line(line, &mut events) {
                self.done = true;
            }
        }
        events
    }
}

/// Decode one complete line. Returns `true` for the terminal sentinel.
fn decode_line(line: &str, events: &mut Vec<StreamEvent>) -> bool {
    let Some(payload) = extract_data(line) else {
        return false;
    };
    if payload == DONE_SENTINEL {
        events.push(StreamEvent::Done);
        return true;
    }
    decode_payload(payload, events);
    false
}

/// Payload of a `data:` line, trimmed. `None` for comments, blank lines,
/// other SSE fields and empty data.
fn extract_data(line: &str) -> Option<&str> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with(':') {
        return None;
    }
    let data = trimmed.strip_prefix("data:")?.trim();
    (!data.is_empty()).then_some(data)
}

/// Interpret one JSON record. Emits, in order: `ConversationAssigned`
/// (if `meta.conversation_id` is an integer), then either `ProviderError`
/// or a non-empty `ContentDelta`.
fn decode_payload(payload: &str, events: &mut Vec<StreamEvent>) {
    let value: Value = match serde_json::from_str(payload) {
        Ok(value) => value,
        Err(e) => {
            warn!(
                error = %e,
                data_preview = %preview(payload, 100),
                "skipping malformed stream record"
            );
            return;
        }
    };

    if let Some(conversation_id) = value
        .get("meta")
        .and_then(|meta| meta.get("conversation_id"))
        .and_then(Value::as_i64)
    {
        events.push(StreamEvent::ConversationAssigned { conversation_id });
    }

    if let Some(message) = provider_error(&value) {
        events.push(StreamEvent::ProviderError { message });
        return;
    }

    if let Some(delta) = content_fragment(&value) {
        if !delta.is_empty() {
            events.push(StreamEvent::ContentDelta {
                delta: delta.to_string(),
            });
        }
    }
}

fn provider_error(value: &Value) -> Option<String> {
    let top_level_message = value.get("message").and_then(Value::as_str);
    match value.get("error") {
        None | Some(Value::Null) | Some(Value::Bool(false)) => {
            if value.get("choices").is_none() {
                top_level_message.map(str::to_string)
            } else {
                None
            }
        }
        Some(Value::String(message)) => Some(message.clone()),
        Some(error) => Some(
            error
                .get("message")
                .and_then(Value::as_str)
                .or(top_level_message)
                .unwrap_or(DEFAULT_PROVIDER_ERROR)
                .to_string(),
        ),
    }
}

/// `choices[0].delta.content`, falling back to `choices[0].message.content`.
fn content_fragment(value: &Value) -> Option<&str> {
    let choice = value.get("choices")?.get(0)?;
    choice
        .get("delta")
        .and_then(|delta| delta.get("content"))
        .and_then(Value::as_str)
        .or_else(|| {
            choice
                .get("message")
                .and_then(|message| message.get("content"))
                .and_then(Value::as_str)
        })
}

fn preview(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Decode a byte stream lazily.
///
/// Events are yielded in arrival order. A read error is yielded once as
/// [`ClientError::StreamInterrupted`] and ends the stream; so does the
/// terminal sentinel, after which the source is no longer polled.
pub fn decode_stream<S, E>(
    byte_stream: S,
    options: DecoderOptions,
) -> impl Stream<Item = Result<StreamEvent, ClientError>> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send + Unpin + 'static,
    E: Display + Send + 'static,
{
    futures::stream::unfold(
        (byte_stream, StreamDecoder::new(options), VecDeque::new(), false),
        |(mut stream, mut decoder, mut pending, mut finished)| async move {
            loop {
                if let Some(event) = pending.pop_front() {
                    return Some((Ok(event), (stream, decoder, pending, finished)));
                }
                if finished {
                    return None;
                }

                match stream.next().await {
                    Some(Ok(chunk)) => {
                        pending.extend(decoder.push(&chunk));
                        finished = decoder.is_done();
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "stream read error");
                        let err = ClientError::StreamInterrupted(e.to_string());
                        return Some((Err(err), (stream, decoder, pending, true)));
                    }
                    None => {
                        pending.extend(decoder.finish());
                        finished = true;
                    }
                }
            }
        },
    )
}
