//! Decoding of the upstream `text/event-stream` body.
//!
//! Network chunks are not aligned with lines, so the decoder keeps the
//! trailing partial line (as raw bytes, which may also split a UTF-8
//! sequence) until the next push.

use crate::services::tool_calls::ToolCallChunk;
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseFrame {
    /// The `[DONE]` sentinel.
    Done,
    /// Any other `data:` payload, untouched.
    Data(String),
}

#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a network chunk and returns every complete frame it finished.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(bytes);

        let mut frames = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(frame) = parse_line(&line) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Flushes a final line that was not newline-terminated.
    pub fn finish(&mut self) -> Option<SseFrame> {
        let line = std::mem::take(&mut self.buffer);
        parse_line(&line)
    }
}

fn parse_line(raw: &[u8]) -> Option<SseFrame> {
    let line = String::from_utf8_lossy(raw);
    let line = line.trim_end_matches(['\n', '\r']);

    if line.trim().is_empty() || line.starts_with(':') {
        return None;
    }

    let payload = line
        .strip_prefix("data: ")
        .or_else(|| line.strip_prefix("data:"))?;

    if payload.trim() == "[DONE]" {
        Some(SseFrame::Done)
    } else {
        Some(SseFrame::Data(payload.to_string()))
    }
}

/// How the proxy treats a data payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkKind {
    /// `choices[0].delta.tool_calls` present: buffer, never forward.
    ToolCallDelta(Vec<ToolCallChunk>),
    /// Regular completion chunk: forward verbatim.
    Content,
    /// Not JSON: forward verbatim.
    Unparseable,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Option<StreamDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    tool_calls: Option<Vec<ToolCallChunk>>,
}

pub fn classify(payload: &str) -> ChunkKind {
    let Ok(chunk) = serde_json::from_str::<StreamChunk>(payload) else {
        return ChunkKind::Unparseable;
    };

    let tool_calls = chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta)
        .and_then(|delta| delta.tool_calls);

    match tool_calls {
        Some(calls) if !calls.is_empty() => ChunkKind::ToolCallDelta(calls),
        _ => ChunkKind::Content,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_splits_lines_and_skips_noise() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.push(b": OPENROUTER PROCESSING\n\ndata: {\"a\":1}\n\ndata: [DONE]\n\n");
        assert_eq!(
            frames,
            vec![SseFrame::Data("{\"a\":1}".to_string()), SseFrame::Done]
        );
    }

    #[test]
    fn test_partial_lines_are_buffered_across_pushes() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: {\"choi").is_empty());
        assert!(decoder.push(b"ces\":[]}").is_empty());
        assert_eq!(
            decoder.push(b"\r\ndata: x"),
            vec![SseFrame::Data("{\"choices\":[]}".to_string())]
        );
        assert_eq!(decoder.finish(), Some(SseFrame::Data("x".to_string())));
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn test_split_utf8_sequence_survives() {
        let payload = "data: {\"content\":\"café\"}\n".as_bytes();
        let split = payload.len() - 4;
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(&payload[..split]).is_empty());
        assert_eq!(
            decoder.push(&payload[split..]),
            vec![SseFrame::Data("{\"content\":\"café\"}".to_string())]
        );
    }

    #[test]
    fn test_non_data_fields_ignored() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"event: ping\nid: 4\n").is_empty());
    }

    #[test]
    fn test_classify_content() {
        let payload = r#"{"choices":[{"delta":{"content":"Hello"}}]}"#;
        assert_eq!(classify(payload), ChunkKind::Content);
    }

    #[test]
    fn test_classify_tool_call_delta() {
        let payload = r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_1","type":"function","function":{"name":"search_web","arguments":""}}]}}]}"#;
        let ChunkKind::ToolCallDelta(calls) = classify(payload) else {
            panic!("expected tool call delta");
        };
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id.as_deref(), Some("call_1"));
        assert_eq!(
            calls[0].function.as_ref().and_then(|f| f.name.as_deref()),
            Some("search_web")
        );
    }

    #[test]
    fn test_classify_null_or_empty_tool_calls_is_content() {
        assert_eq!(
            classify(r#"{"choices":[{"delta":{"tool_calls":null}}]}"#),
            ChunkKind::Content
        );
        assert_eq!(
            classify(r#"{"choices":[{"delta":{"tool_calls":[]}}]}"#),
            ChunkKind::Content
        );
        assert_eq!(classify(r#"{"choices":[]}"#), ChunkKind::Content);
    }

    #[test]
    fn test_classify_garbage() {
        assert_eq!(classify("not json"), ChunkKind::Unparseable);
    }
}
