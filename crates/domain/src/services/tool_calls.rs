//! Reassembly of streamed function-call directives.
//!
//! The model announces a call with a chunk carrying an `id` and then streams
//! the JSON arguments in fragments that carry no id at all. Fragments always
//! extend the most recently announced call.

use crate::models::chat::ToolCall;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

/// One element of `choices[0].delta.tool_calls` in a stream chunk.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ToolCallChunk {
    #[serde(default)]
    pub index: Option<u32>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub function: Option<FunctionChunk>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FunctionChunk {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolCallError {
    #[error("Empty arguments for tool call")]
    EmptyArguments,

    #[error("{0}")]
    InvalidArguments(String),
}

/// A fully buffered call waiting to be executed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

impl PendingToolCall {
    pub fn arguments_trimmed(&self) -> &str {
        self.arguments.trim()
    }

    pub fn parse_arguments(&self) -> Result<Value, ToolCallError> {
        let raw = self.arguments_trimmed();
        if raw.is_empty() {
            return Err(ToolCallError::EmptyArguments);
        }
        serde_json::from_str(raw).map_err(|e| ToolCallError::InvalidArguments(e.to_string()))
    }

    /// The call as replayed to the model in the follow-up request.
    pub fn to_tool_call(&self) -> ToolCall {
        ToolCall::function(&self.id, &self.name, self.arguments_trimmed())
    }
}

#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    calls: HashMap<String, PendingToolCall>,
    current: Option<String>,
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn absorb(&mut self, chunk: ToolCallChunk) {
        if let Some(id) = chunk.id.filter(|id| !id.is_empty()) {
            self.calls
                .entry(id.clone())
                .or_insert_with(|| PendingToolCall {
                    id: id.clone(),
                    ..Default::default()
                });
            self.current = Some(id);
        }

        let Some(call) = self
            .current
            .as_ref()
            .and_then(|id| self.calls.get_mut(id))
        else {
            tracing::debug!("Tool call fragment before any call was announced, ignoring");
            return;
        };

        if let Some(function) = chunk.function {
            if let Some(name) = function.name.filter(|name| !name.is_empty()) {
                call.name = name;
            }
            if let Some(arguments) = function.arguments {
                call.arguments.push_str(&arguments);
            }
        }
    }

    pub fn absorb_all(&mut self, chunks: Vec<ToolCallChunk>) {
        for chunk in chunks {
            self.absorb(chunk);
        }
    }

    pub fn has_pending(&self) -> bool {
        self.current.is_some()
    }

    /// Removes and returns the most recently announced call. Earlier calls
    /// announced in the same turn are discarded.
    pub fn take_current(&mut self) -> Option<PendingToolCall> {
        let id = self.current.take()?;
        let call = self.calls.remove(&id);
        if !self.calls.is_empty() {
            tracing::debug!(
                discarded = self.calls.len(),
                "Multiple tool calls announced, executing the last one"
            );
            self.calls.clear();
        }
        call
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn opening(id: &str, name: &str, args: &str) -> ToolCallChunk {
        ToolCallChunk {
            index: Some(0),
            id: Some(id.to_string()),
            function: Some(FunctionChunk {
                name: Some(name.to_string()),
                arguments: Some(args.to_string()),
            }),
        }
    }

    fn fragment(args: &str) -> ToolCallChunk {
        ToolCallChunk {
            index: Some(0),
            id: None,
            function: Some(FunctionChunk {
                name: None,
                arguments: Some(args.to_string()),
            }),
        }
    }

    #[test]
    fn test_fragments_extend_current_call() {
        let mut acc = ToolCallAccumulator::new();
        acc.absorb(opening("call_1", "search_web", ""));
        acc.absorb(fragment("{\"que"));
        acc.absorb(fragment("ry\":\"sydney seo\"}"));

        let call = acc.take_current().unwrap();
        assert_eq!(call.id, "call_1");
        assert_eq!(call.name, "search_web");
        assert_eq!(call.parse_arguments().unwrap(), json!({"query": "sydney seo"}));
        assert!(acc.take_current().is_none());
    }

    #[test]
    fn test_fragment_before_announcement_is_ignored() {
        let mut acc = ToolCallAccumulator::new();
        acc.absorb(fragment("{}"));
        assert!(!acc.has_pending());
        assert!(acc.take_current().is_none());
    }

    #[test]
    fn test_last_announced_call_wins() {
        let mut acc = ToolCallAccumulator::new();
        acc.absorb(opening("call_1", "search_web", "{\"query\":\"a\"}"));
        acc.absorb(opening("call_2", "fetch_webpage", "{\"url\":"));
        acc.absorb(fragment("\"https://example.com\"}"));

        let call = acc.take_current().unwrap();
        assert_eq!(call.id, "call_2");
        assert_eq!(call.name, "fetch_webpage");
        assert_eq!(
            call.parse_arguments().unwrap(),
            json!({"url": "https://example.com"})
        );
    }

    #[test]
    fn test_repeated_id_reopens_buffer() {
        let mut acc = ToolCallAccumulator::new();
        acc.absorb(opening("call_1", "request_callback", "{\"name\":"));
        acc.absorb(ToolCallChunk {
            id: Some("call_1".to_string()),
            function: Some(FunctionChunk {
                name: None,
                arguments: Some("\"Ana\"}".to_string()),
            }),
            ..Default::default()
        });

        let call = acc.take_current().unwrap();
        assert_eq!(call.name, "request_callback");
        assert_eq!(call.arguments, "{\"name\":\"Ana\"}");
    }

    #[test]
    fn test_empty_arguments_rejected() {
        let call = PendingToolCall {
            id: "call_1".to_string(),
            name: "search_web".to_string(),
            arguments: "   ".to_string(),
        };
        assert_eq!(call.parse_arguments(), Err(ToolCallError::EmptyArguments));
        assert_eq!(
            ToolCallError::EmptyArguments.to_string(),
            "Empty arguments for tool call"
        );
    }

    #[test]
    fn test_truncated_arguments_rejected() {
        let call = PendingToolCall {
            id: "call_1".to_string(),
            name: "search_web".to_string(),
            arguments: "{\"query\": \"unfinished".to_string(),
        };
        assert!(matches!(
            call.parse_arguments(),
            Err(ToolCallError::InvalidArguments(_))
        ));
    }

    #[test]
    fn test_to_tool_call_uses_trimmed_arguments() {
        let call = PendingToolCall {
            id: "call_7".to_string(),
            name: "fetch_webpage".to_string(),
            arguments: " {\"url\":\"https://a.io\"}\n".to_string(),
        };
        let replay = call.to_tool_call();
        assert_eq!(replay.kind, "function");
        assert_eq!(replay.function.arguments, "{\"url\":\"https://a.io\"}");
    }
}
