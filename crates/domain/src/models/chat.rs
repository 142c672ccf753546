//! Chat widget models and the upstream chat-completion wire format.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::str::FromStr;
use validator::Validate;

/// Only this many trailing history entries are forwarded upstream.
pub const HISTORY_LIMIT: usize = 10;

/// History entries rendered into the context stored with a callback.
pub const CONTEXT_MESSAGES: usize = 5;

/// One message of the conversation as kept by the chat widget.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub content: String,
}

impl HistoryEntry {
    pub fn is_user(&self) -> bool {
        self.role == "user"
    }
}

/// Body of `POST /api/chat`.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default, deserialize_with = "text_or_empty")]
    #[validate(length(min = 1, message = "Message is required"))]
    pub message: String,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    pub session_id: Option<String>,
}

/// Reads any non-string value as empty, so it fails validation as missing.
fn text_or_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(text) => text,
        _ => String::new(),
    })
}

/// Body of `POST /api/chat/email-transcript`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub transcript: Vec<HistoryEntry>,
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptResponse {
    pub success: bool,
    pub message: String,
    pub reference_id: String,
}

/// Public widget configuration served by `GET /api/chat/config`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatConfigResponse {
    pub available: bool,
    pub model: String,
    pub max_tokens: u32,
    pub suggested_questions: Vec<String>,
    pub web_search_enabled: bool,
    pub callbacks_enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
    Tool,
}

/// Message in the OpenAI-compatible request body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    fn text(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::text(ChatRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::text(ChatRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::text(ChatRole::Assistant, content)
    }

    /// Assistant turn that requested a tool; content is sent as `null`.
    pub fn assistant_tool_call(call: ToolCall) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: None,
            tool_calls: Some(vec![call]),
            tool_call_id: None,
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Tool,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type", default = "function_kind")]
    pub kind: String,
    pub function: FunctionCall,
}

fn function_kind() -> String {
    "function".to_string()
}

impl ToolCall {
    pub fn function(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: function_kind(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded argument object, exactly as produced by the model.
    #[serde(default)]
    pub arguments: String,
}

/// Request body for `POST <api_url>/chat/completions`.
#[derive(Debug, Clone, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub tools: Value,
    pub max_tokens: u32,
    pub temperature: f32,
    pub stream: bool,
}

/// Non-streaming completion response. Only the fields the proxy reads.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompletionResponse {
    #[serde(default)]
    pub choices: Vec<CompletionChoice>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompletionChoice {
    #[serde(default)]
    pub message: Option<AssistantReply>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AssistantReply {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<ToolCall>>,
}

impl CompletionResponse {
    pub fn reply(&self) -> Option<&AssistantReply> {
        self.choices.first().and_then(|choice| choice.message.as_ref())
    }
}

/// Non-streaming answer returned to the widget.
#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    pub response: String,
    pub success: bool,
}

/// Non-streaming answer when the model asked for a tool.
#[derive(Debug, Clone, Serialize)]
pub struct ToolCallReply {
    pub tool_call: ExecutedToolCall,
    pub success: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutedToolCall {
    pub name: String,
    pub arguments: Value,
    pub result: Value,
}

/// Out-of-band notices written into the widget's event stream alongside
/// the forwarded upstream chunks.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StreamNotice {
    ToolStatus {
        tool_status: String,
        tool_name: String,
        tool_args: Value,
    },
    ToolResult {
        tool_result: Value,
        tool_name: String,
    },
    ToolError {
        tool_error: String,
    },
    Error {
        error: String,
    },
}

/// Functions the model may call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolName {
    SearchWeb,
    RequestCallback,
    FetchWebpage,
}

impl ToolName {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::SearchWeb => "search_web",
            ToolName::RequestCallback => "request_callback",
            ToolName::FetchWebpage => "fetch_webpage",
        }
    }

    /// Progress text shown in the widget while the tool runs.
    pub fn status_message(&self) -> &'static str {
        match self {
            ToolName::SearchWeb => "Searching the web...",
            ToolName::RequestCallback => "Scheduling your callback...",
            ToolName::FetchWebpage => "Fetching webpage...",
        }
    }
}

impl FromStr for ToolName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "search_web" => Ok(ToolName::SearchWeb),
            "request_callback" => Ok(ToolName::RequestCallback),
            "fetch_webpage" => Ok(ToolName::FetchWebpage),
            _ => Err(format!("Unknown tool: {}", s)),
        }
    }
}

impl std::fmt::Display for ToolName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Function schemas advertised to the model on every request.
pub fn tool_definitions() -> Value {
    json!([
        {
            "type": "function",
            "function": {
                "name": "search_web",
                "description": "Search the internet for current information, recent trends, statistics, competitor data, or specific queries. Use for information after 2024 or real-time data. Do not use for general knowledge already in training data.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "query": {
                            "type": "string",
                            "description": "The search query to find information about. Be specific and concise."
                        }
                    },
                    "required": ["query"]
                }
            }
        },
        {
            "type": "function",
            "function": {
                "name": "request_callback",
                "description": "Schedule a callback for the user when they want to speak with the Websited team, get pricing details, schedule a consultation, or discuss their business needs in detail. Collect name and at least one contact method (phone or email) before calling this function.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "name": { "type": "string", "description": "The user's full name" },
                        "phone": { "type": "string", "description": "The user's phone number (optional if email provided)" },
                        "email": { "type": "string", "description": "The user's email address (optional if phone provided)" },
                        "preferred_contact_method": {
                            "type": "string",
                            "enum": ["phone", "email", "sms", "any"],
                            "description": "How the user prefers to be contacted"
                        },
                        "preferred_time": {
                            "type": "string",
                            "description": "When the user prefers to be contacted (e.g., \"morning\", \"afternoon\", \"ASAP\")"
                        },
                        "message": {
                            "type": "string",
                            "description": "Additional message or context about what they want to discuss"
                        }
                    },
                    "required": ["name"]
                }
            }
        },
        {
            "type": "function",
            "function": {
                "name": "fetch_webpage",
                "description": "Fetch and analyze the content of a specific webpage. Use this to examine website structure, copy, SEO elements, design, services offered, or any page-specific details. Perfect for analyzing client websites or competitor research. Use search_web for general queries.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "url": {
                            "type": "string",
                            "description": "The full URL of the webpage to fetch and analyze (must include http:// or https://)"
                        }
                    },
                    "required": ["url"]
                }
            }
        }
    ])
}

/// System prompt, the trailing history and the new user message.
///
/// Entries with an empty role or content are dropped; anything that is not
/// from the user is replayed as an assistant turn.
pub fn build_conversation(system_prompt: &str, history: &[HistoryEntry], message: &str) -> Vec<ChatMessage> {
    let recent = &history[history.len().saturating_sub(HISTORY_LIMIT)..];

    let mut messages = Vec::with_capacity(recent.len() + 2);
    messages.push(ChatMessage::system(system_prompt));
    for entry in recent {
        if entry.role.is_empty() || entry.content.is_empty() {
            continue;
        }
        if entry.is_user() {
            messages.push(ChatMessage::user(entry.content.clone()));
        } else {
            messages.push(ChatMessage::assistant(entry.content.clone()));
        }
    }
    messages.push(ChatMessage::user(message));
    messages
}

/// Context saved with a callback request: the last few turns as
/// `User: ...` / `Assistant: ...` separated by blank lines.
pub fn conversation_context(history: &[HistoryEntry]) -> String {
    let recent = &history[history.len().saturating_sub(CONTEXT_MESSAGES)..];
    render_transcript(recent, "Assistant")
}

/// Full transcript stored with a download request.
pub fn transcript_context(transcript: &[HistoryEntry]) -> String {
    render_transcript(transcript, "AI Assistant")
}

fn render_transcript(entries: &[HistoryEntry], assistant_label: &str) -> String {
    entries
        .iter()
        .map(|entry| {
            let label = if entry.is_user() { "User" } else { assistant_label };
            format!("{}: {}", label, entry.content)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(role: &str, content: &str) -> HistoryEntry {
        HistoryEntry {
            role: role.to_string(),
            content: content.to_string(),
        }
    }

    #[test]
    fn test_build_conversation_keeps_last_ten() {
        let history: Vec<HistoryEntry> = (0..14)
            .map(|i| entry(if i % 2 == 0 { "user" } else { "assistant" }, &format!("m{}", i)))
            .collect();

        let messages = build_conversation("prompt", &history, "now");

        assert_eq!(messages.len(), 12);
        assert_eq!(messages[0], ChatMessage::system("prompt"));
        assert_eq!(messages[1].content.as_deref(), Some("m4"));
        assert_eq!(messages[11], ChatMessage::user("now"));
    }

    #[test]
    fn test_build_conversation_skips_empty_and_maps_roles() {
        let history = vec![
            entry("user", ""),
            entry("", "orphan"),
            entry("bot", "hello"),
            entry("user", "hi"),
        ];

        let messages = build_conversation("prompt", &history, "question");

        assert_eq!(messages.len(), 4);
        assert_eq!(messages[1].role, ChatRole::Assistant);
        assert_eq!(messages[2].role, ChatRole::User);
    }

    #[test]
    fn test_conversation_context_uses_last_five() {
        let history: Vec<HistoryEntry> = (0..7)
            .map(|i| entry(if i % 2 == 0 { "user" } else { "assistant" }, &format!("m{}", i)))
            .collect();

        let context = conversation_context(&history);

        assert!(context.starts_with("User: m2"));
        assert!(context.ends_with("User: m6"));
        assert_eq!(context.split("\n\n").count(), 5);
        assert!(context.contains("Assistant: m3"));
    }

    #[test]
    fn test_transcript_context_labels() {
        let transcript = vec![entry("user", "Hi"), entry("assistant", "Hello!")];
        assert_eq!(
            transcript_context(&transcript),
            "User: Hi\n\nAI Assistant: Hello!"
        );
    }

    #[test]
    fn test_chat_request_requires_message() {
        let request: ChatRequest = serde_json::from_str(r#"{"history":[]}"#).unwrap();
        let errors = request.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("message"));

        let request: ChatRequest =
            serde_json::from_str(r#"{"message":"hi","sessionId":"abc"}"#).unwrap();
        assert!(request.validate().is_ok());
        assert_eq!(request.session_id.as_deref(), Some("abc"));
        assert!(request.history.is_empty());
    }

    #[test]
    fn test_chat_request_non_string_message_is_missing() {
        for body in [r#"{"message":5}"#, r#"{"message":null}"#, r#"{"message":["hi"]}"#] {
            let request: ChatRequest = serde_json::from_str(body).unwrap();
            assert_eq!(request.message, "");
            let errors = request.validate().unwrap_err();
            assert!(errors.field_errors().contains_key("message"));
        }
    }

    #[test]
    fn test_assistant_tool_call_serializes_null_content() {
        let message = ChatMessage::assistant_tool_call(ToolCall::function(
            "call_1",
            "search_web",
            r#"{"query":"rust"}"#,
        ));
        let json = serde_json::to_value(&message).unwrap();

        assert_eq!(json["role"], "assistant");
        assert!(json["content"].is_null());
        assert_eq!(json["tool_calls"][0]["type"], "function");
        assert_eq!(json["tool_calls"][0]["function"]["name"], "search_web");
        assert!(json.get("tool_call_id").is_none());
    }

    #[test]
    fn test_tool_result_message() {
        let json = serde_json::to_value(ChatMessage::tool_result("call_1", "{}")).unwrap();
        assert_eq!(json["role"], "tool");
        assert_eq!(json["tool_call_id"], "call_1");
        assert!(json.get("tool_calls").is_none());
    }

    #[test]
    fn test_stream_notice_shapes() {
        let notice = StreamNotice::ToolStatus {
            tool_status: ToolName::FetchWebpage.status_message().to_string(),
            tool_name: ToolName::FetchWebpage.to_string(),
            tool_args: json!({"url": "https://example.com"}),
        };
        assert_eq!(
            serde_json::to_value(&notice).unwrap(),
            json!({
                "tool_status": "Fetching webpage...",
                "tool_name": "fetch_webpage",
                "tool_args": {"url": "https://example.com"}
            })
        );

        let error = StreamNotice::Error {
            error: "Stream error".to_string(),
        };
        assert_eq!(serde_json::to_string(&error).unwrap(), r#"{"error":"Stream error"}"#);
    }

    #[test]
    fn test_tool_names() {
        assert_eq!("search_web".parse::<ToolName>(), Ok(ToolName::SearchWeb));
        assert_eq!(
            "request_callback".parse::<ToolName>(),
            Ok(ToolName::RequestCallback)
        );
        assert!("delete_database".parse::<ToolName>().is_err());

        let definitions = tool_definitions();
        let names: Vec<&str> = definitions
            .as_array()
            .unwrap()
            .iter()
            .map(|tool| tool["function"]["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["search_web", "request_callback", "fetch_webpage"]);
    }

    #[test]
    fn test_completion_response_reply() {
        let response: CompletionResponse = serde_json::from_value(json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_9",
                        "type": "function",
                        "function": {"name": "fetch_webpage", "arguments": "{\"url\":\"https://a.b\"}"}
                    }]
                }
            }]
        }))
        .unwrap();

        let reply = response.reply().unwrap();
        assert!(reply.content.is_none());
        assert_eq!(reply.tool_calls.as_ref().unwrap()[0].function.name, "fetch_webpage");

        let empty: CompletionResponse = serde_json::from_str("{}").unwrap();
        assert!(empty.reply().is_none());
    }
}
