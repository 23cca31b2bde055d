//! Server-sent-event decoding for the Anthropic Messages stream.
//!
//! Two stages:
//! - [`LineBuffer`] splits raw body bytes into complete lines, holding back a
//!   trailing partial line (and any multi-byte character cut by a chunk
//!   boundary) until the rest arrives.
//! - [`EventTranslator`] turns each `data:` payload into zero or more
//!   [`ModelEvent`]s.

use std::collections::HashSet;

use dealroom_core::error::ProviderError;
use dealroom_core::provider::{BlockDelta, BlockKind, ModelEvent, Usage};
use tracing::trace;

/// Accumulates body bytes and yields complete lines.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    /// Append a chunk and drain every complete line (without the terminator).
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw[..raw.len() - 1]);
            lines.push(line.trim_end_matches('\r').to_string());
        }
        lines
    }
}

/// Whether the upstream message is complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Finished,
}

/// Maps Anthropic stream payloads onto [`ModelEvent`]s.
///
/// Block kinds other than `text` and `tool_use` (thinking, redacted thinking)
/// are tracked by index and all their events are dropped.
#[derive(Debug, Default)]
pub struct EventTranslator {
    skipped: HashSet<usize>,
    input_tokens: u32,
}

impl EventTranslator {
    /// Translate one SSE line. `event:` lines, comments and blank lines carry
    /// nothing the `data:` payload doesn't, so they are ignored.
    pub fn translate_line(
        &mut self,
        line: &str,
        out: &mut Vec<ModelEvent>,
    ) -> Result<Flow, ProviderError> {
        let Some(data) = line.strip_prefix("data:") else {
            return Ok(Flow::Continue);
        };
        let data = data.trim();
        if data.is_empty() {
            return Ok(Flow::Continue);
        }
        self.translate(data, out)
    }

    /// Translate one `data:` payload.
    pub fn translate(
        &mut self,
        data: &str,
        out: &mut Vec<ModelEvent>,
    ) -> Result<Flow, ProviderError> {
        let payload: serde_json::Value = match serde_json::from_str(data) {
            Ok(v) => v,
            Err(e) => {
                trace!(error = %e, data = %data, "Ignoring unparseable SSE payload");
                return Ok(Flow::Continue);
            }
        };

        match payload["type"].as_str().unwrap_or("") {
            "message_start" => {
                if let Some(n) = payload["message"]["usage"]["input_tokens"].as_u64() {
                    self.input_tokens = n as u32;
                }
            }
            "content_block_start" => {
                let Some(index) = block_index(&payload) else {
                    return Ok(Flow::Continue);
                };
                let block = &payload["content_block"];
                match block["type"].as_str().unwrap_or("") {
                    "text" => {
                        out.push(ModelEvent::BlockStart {
                            index,
                            kind: BlockKind::Text,
                        });
                        // Start frames normally carry an empty string
                        if let Some(text) = block["text"].as_str().filter(|t| !t.is_empty()) {
                            out.push(ModelEvent::BlockDelta {
                                index,
                                delta: BlockDelta::Text(text.to_string()),
                            });
                        }
                    }
                    "tool_use" => out.push(ModelEvent::BlockStart {
                        index,
                        kind: BlockKind::ToolUse {
                            id: block["id"].as_str().unwrap_or_default().to_string(),
                            name: block["name"].as_str().unwrap_or_default().to_string(),
                        },
                    }),
                    other => {
                        trace!(index, kind = %other, "Skipping content block");
                        self.skipped.insert(index);
                    }
                }
            }
            "content_block_delta" => {
                let Some(index) = block_index(&payload) else {
                    return Ok(Flow::Continue);
                };
                if self.skipped.contains(&index) {
                    return Ok(Flow::Continue);
                }
                let delta = &payload["delta"];
                let fragment = match delta["type"].as_str().unwrap_or("") {
                    "text_delta" => delta["text"].as_str().map(|t| BlockDelta::Text(t.to_string())),
                    "input_json_delta" => delta["partial_json"]
                        .as_str()
                        .map(|j| BlockDelta::Json(j.to_string())),
                    _ => None,
                };
                if let Some(delta) = fragment {
                    out.push(ModelEvent::BlockDelta { index, delta });
                }
            }
            "content_block_stop" => {
                if let Some(index) = block_index(&payload)
                    && !self.skipped.contains(&index)
                {
                    out.push(ModelEvent::BlockStop { index });
                }
            }
            "message_delta" => {
                let stop_reason = payload["delta"]["stop_reason"].as_str().map(String::from);
                let usage = payload["usage"]["output_tokens"].as_u64().map(|output| Usage {
                    input_tokens: payload["usage"]["input_tokens"]
                        .as_u64()
                        .map(|n| n as u32)
                        .unwrap_or(self.input_tokens),
                    output_tokens: output as u32,
                });
                out.push(ModelEvent::TurnDelta { stop_reason, usage });
            }
            "message_stop" => return Ok(Flow::Finished),
            "error" => {
                let kind = payload["error"]["type"].as_str().unwrap_or("error");
                let message = payload["error"]["message"].as_str().unwrap_or("unknown error");
                return Err(ProviderError::StreamInterrupted(format!("{kind}: {message}")));
            }
            _ => {} // ping and future event types
        }

        Ok(Flow::Continue)
    }
}

fn block_index(payload: &serde_json::Value) -> Option<usize> {
    payload["index"].as_u64().map(|i| i as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn translate_all(lines: &[&str]) -> (Vec<ModelEvent>, Flow) {
        let mut translator = EventTranslator::default();
        let mut out = Vec::new();
        let mut flow = Flow::Continue;
        for line in lines {
            flow = translator.translate_line(line, &mut out).unwrap();
        }
        (out, flow)
    }

    #[test]
    fn line_buffer_holds_partial_lines() {
        let mut buf = LineBuffer::default();
        assert!(buf.push(b"event: ping\r\ndata: {\"ty").len() == 1);
        let lines = buf.push(b"pe\":\"ping\"}\n\n");
        assert_eq!(lines, vec!["data: {\"type\":\"ping\"}".to_string(), String::new()]);
    }

    #[test]
    fn line_buffer_rejoins_split_utf8() {
        let mut buf = LineBuffer::default();
        let text = "data: café\n".as_bytes();
        // Split inside the two-byte 'é'
        let cut = text.iter().position(|b| *b == 0xC3).unwrap() + 1;
        assert!(buf.push(&text[..cut]).is_empty());
        assert_eq!(buf.push(&text[cut..]), vec!["data: café".to_string()]);
    }

    #[test]
    fn translates_text_and_tool_blocks() {
        let (events, flow) = translate_all(&[
            "event: message_start",
            r#"data: {"type":"message_start","message":{"usage":{"input_tokens":42,"output_tokens":1}}}"#,
            r#"data: {"type":"content_block_start","index":0,"content_block":{"type":"text","text":""}}"#,
            r#"data: {"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Checking"}}"#,
            r#"data: {"type":"content_block_stop","index":0}"#,
            r#"data: {"type":"content_block_start","index":1,"content_block":{"type":"tool_use","id":"toolu_1","name":"get_deal","input":{}}}"#,
            r#"data: {"type":"content_block_delta","index":1,"delta":{"type":"input_json_delta","partial_json":"{\"deal_id\":"}}"#,
            r#"data: {"type":"content_block_delta","index":1,"delta":{"type":"input_json_delta","partial_json":"\"d-1\"}"}}"#,
            r#"data: {"type":"content_block_stop","index":1}"#,
            r#"data: {"type":"message_delta","delta":{"stop_reason":"tool_use"},"usage":{"output_tokens":17}}"#,
            r#"data: {"type":"message_stop"}"#,
        ]);

        assert_eq!(flow, Flow::Finished);
        assert_eq!(
            events,
            vec![
                ModelEvent::BlockStart { index: 0, kind: BlockKind::Text },
                ModelEvent::BlockDelta { index: 0, delta: BlockDelta::Text("Checking".into()) },
                ModelEvent::BlockStop { index: 0 },
                ModelEvent::BlockStart {
                    index: 1,
                    kind: BlockKind::ToolUse { id: "toolu_1".into(), name: "get_deal".into() },
                },
                ModelEvent::BlockDelta { index: 1, delta: BlockDelta::Json("{\"deal_id\":".into()) },
                ModelEvent::BlockDelta { index: 1, delta: BlockDelta::Json("\"d-1\"}".into()) },
                ModelEvent::BlockStop { index: 1 },
                ModelEvent::TurnDelta {
                    stop_reason: Some("tool_use".into()),
                    usage: Some(Usage { input_tokens: 42, output_tokens: 17 }),
                },
            ]
        );
    }

    #[test]
    fn thinking_blocks_are_dropped() {
        let (events, _) = translate_all(&[
            r#"data: {"type":"content_block_start","index":0,"content_block":{"type":"thinking","thinking":""}}"#,
            r#"data: {"type":"content_block_delta","index":0,"delta":{"type":"thinking_delta","thinking":"hmm"}}"#,
            r#"data: {"type":"content_block_stop","index":0}"#,
            r#"data: {"type":"content_block_start","index":1,"content_block":{"type":"text","text":""}}"#,
            r#"data: {"type":"content_block_stop","index":1}"#,
        ]);
        assert_eq!(
            events,
            vec![
                ModelEvent::BlockStart { index: 1, kind: BlockKind::Text },
                ModelEvent::BlockStop { index: 1 },
            ]
        );
    }

    #[test]
    fn error_payload_is_terminal() {
        let mut translator = EventTranslator::default();
        let mut out = Vec::new();
        let err = translator
            .translate(
                r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#,
                &mut out,
            )
            .unwrap_err();
        assert!(err.to_string().contains("overloaded_error: Overloaded"));
        assert!(out.is_empty());
    }

    #[test]
    fn garbage_and_pings_are_ignored() {
        let (events, flow) = translate_all(&[
            ": keep-alive",
            "data: not json",
            r#"data: {"type":"ping"}"#,
            "",
        ]);
        assert!(events.is_empty());
        assert_eq!(flow, Flow::Continue);
    }
}
