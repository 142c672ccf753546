//! Chat proxy: forwards the conversation to the completion API and runs at
//! most one tool call per turn.
//!
//! Streaming turns run in a spawned task that writes SSE `data` payloads
//! into a bounded channel. The task owns the upstream stream; when the
//! client goes away the next send fails and the task returns, dropping the
//! upstream connection with it.

use std::sync::Arc;
use std::time::Duration;

use domain::models::chat::{
    build_conversation, conversation_context, tool_definitions, ChatMessage, ChatReply,
    ChatRequest, CompletionRequest, ExecutedToolCall, StreamNotice, ToolCallReply, ToolName,
};
use domain::services::{classify, ChunkKind, PendingToolCall, SseDecoder, SseFrame, ToolCallAccumulator};
use futures::StreamExt;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::ChatConfig;
use crate::error::ApiError;
use crate::middleware::metrics::record_chat_request;
use crate::services::llm::{ByteStream, ChatCompletionApi, LlmError, GENERIC_FAILURE_MESSAGE};
use crate::services::tools::{ToolContext, ToolRunner};

/// Final payload of every completed stream.
pub const DONE: &str = "[DONE]";

const CHANNEL_CAPACITY: usize = 64;

pub const NOT_CONFIGURED_MESSAGE: &str = "AI service not configured";

#[derive(Debug, Error)]
pub enum ChatError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("No response from AI service")]
    EmptyReply,

    #[error("Invalid tool arguments: {0}")]
    InvalidToolArguments(String),
}

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::Llm(e) => e.into(),
            other => ApiError::server(GENERIC_FAILURE_MESSAGE, other),
        }
    }
}

/// Body of a non-streaming answer.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ChatResponse {
    Text(ChatReply),
    ToolCall(ToolCallReply),
}

enum Relay {
    Finished,
    ClientGone,
    Failed(LlmError),
}

#[derive(Clone)]
pub struct ChatService {
    config: Arc<ChatConfig>,
    llm: Arc<dyn ChatCompletionApi>,
    tools: Arc<dyn ToolRunner>,
}

impl ChatService {
    pub fn new(
        config: Arc<ChatConfig>,
        llm: Arc<dyn ChatCompletionApi>,
        tools: Arc<dyn ToolRunner>,
    ) -> Self {
        Self { config, llm, tools }
    }

    pub fn is_available(&self) -> bool {
        self.config.is_available()
    }

    pub fn uses_streaming(&self) -> bool {
        self.config.use_streaming
    }

    fn completion_request(&self, messages: Vec<ChatMessage>, stream: bool) -> CompletionRequest {
        CompletionRequest {
            model: self.config.model.clone(),
            messages,
            tools: tool_definitions(),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            stream,
        }
    }

    fn prepare(&self, request: &ChatRequest) -> (Vec<ChatMessage>, ToolContext) {
        let messages =
            build_conversation(&self.config.system_prompt, &request.history, &request.message);
        let context = ToolContext {
            session_id: request.session_id.clone(),
            conversation_context: conversation_context(&request.history),
        };
        (messages, context)
    }

    /// Single completion. A tool call in the reply is executed and returned
    /// as-is; the model does not see its result.
    pub async fn reply(&self, request: &ChatRequest) -> Result<ChatResponse, ChatError> {
        record_chat_request("standard");
        let (messages, context) = self.prepare(request);

        let completion = self
            .llm
            .complete(&self.completion_request(messages, false))
            .await?;
        let reply = completion.reply().ok_or(ChatError::EmptyReply)?;

        if let Some(call) = reply.tool_calls.as_ref().and_then(|calls| calls.first()) {
            let arguments: Value = serde_json::from_str(&call.function.arguments)
                .map_err(|e| ChatError::InvalidToolArguments(e.to_string()))?;

            let result = match call.function.name.parse::<ToolName>() {
                Ok(tool) => self.tools.run(tool, arguments.clone(), &context).await,
                Err(e) => {
                    warn!(error = %e, "Model requested an unknown tool");
                    Value::Null
                }
            };

            return Ok(ChatResponse::ToolCall(ToolCallReply {
                tool_call: ExecutedToolCall {
                    name: call.function.name.clone(),
                    arguments,
                    result,
                },
                success: true,
            }));
        }

        match reply.content.as_deref() {
            Some(content) if !content.is_empty() => Ok(ChatResponse::Text(ChatReply {
                response: content.to_string(),
                success: true,
            })),
            _ => Err(ChatError::EmptyReply),
        }
    }

    /// Opens the upstream stream and hands back the receiving end of the
    /// event channel. Upstream refusals are returned here, before anything
    /// is written to the client.
    pub async fn open_stream(
        &self,
        request: &ChatRequest,
    ) -> Result<mpsc::Receiver<String>, ChatError> {
        record_chat_request("stream");
        let (messages, context) = self.prepare(request);

        let upstream = self
            .llm
            .stream(
                &self.completion_request(messages.clone(), true),
                Duration::from_secs(self.config.request_timeout_secs),
            )
            .await?;

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let service = self.clone();
        tokio::spawn(async move {
            service.drive(upstream, messages, context, tx).await;
        });

        Ok(rx)
    }

    async fn drive(
        self,
        upstream: ByteStream,
        messages: Vec<ChatMessage>,
        context: ToolContext,
        tx: mpsc::Sender<String>,
    ) {
        let mut accumulator = ToolCallAccumulator::new();
        match relay(upstream, &tx, Some(&mut accumulator)).await {
            Relay::Finished => {}
            Relay::ClientGone => {
                debug!("Client disconnected during stream");
                return;
            }
            Relay::Failed(e) => {
                error!(error = %e, "Upstream stream failed");
                emit(
                    &tx,
                    &StreamNotice::Error {
                        error: "Stream error".to_string(),
                    },
                )
                .await;
                return;
            }
        }

        if let Some(call) = accumulator.take_current() {
            if tx.is_closed() {
                debug!("Client disconnected before tool execution");
                return;
            }
            if !self.run_tool_phase(call, messages, &context, &tx).await {
                return;
            }
        }

        let _ = tx.send(DONE.to_string()).await;
    }

    /// Executes the buffered call and streams the model's follow-up.
    /// Returns false when the client is gone.
    async fn run_tool_phase(
        &self,
        call: PendingToolCall,
        mut messages: Vec<ChatMessage>,
        context: &ToolContext,
        tx: &mpsc::Sender<String>,
    ) -> bool {
        let prepared = call
            .parse_arguments()
            .map_err(|e| e.to_string())
            .and_then(|args| call.name.parse::<ToolName>().map(|tool| (tool, args)));

        let (tool, arguments) = match prepared {
            Ok(prepared) => prepared,
            Err(reason) => {
                warn!(tool = %call.name, reason = %reason, "Tool call rejected");
                return emit(tx, &tool_error(&reason)).await;
            }
        };

        info!(tool = %tool, "Executing tool call");
        let status = StreamNotice::ToolStatus {
            tool_status: tool.status_message().to_string(),
            tool_name: tool.as_str().to_string(),
            tool_args: arguments.clone(),
        };
        if !emit(tx, &status).await {
            return false;
        }

        let result = self.tools.run(tool, arguments, context).await;
        let notice = StreamNotice::ToolResult {
            tool_result: result.clone(),
            tool_name: tool.as_str().to_string(),
        };
        if !emit(tx, &notice).await {
            return false;
        }

        messages.push(ChatMessage::assistant_tool_call(call.to_tool_call()));
        messages.push(ChatMessage::tool_result(&call.id, result.to_string()));

        let follow_up = self
            .llm
            .stream(
                &self.completion_request(messages, true),
                Duration::from_secs(self.config.follow_up_timeout_secs),
            )
            .await;

        match follow_up {
            Err(e) => {
                error!(error = %e, "Follow-up request failed");
                emit(tx, &tool_error(&e.to_string())).await
            }
            Ok(stream) => match relay(stream, tx, None).await {
                Relay::Finished => true,
                Relay::ClientGone => false,
                Relay::Failed(e) => {
                    error!(error = %e, "Follow-up stream failed");
                    emit(
                        tx,
                        &StreamNotice::Error {
                            error: "Analysis failed".to_string(),
                        },
                    )
                    .await
                }
            },
        }
    }
}

fn tool_error(reason: &str) -> StreamNotice {
    StreamNotice::ToolError {
        tool_error: format!("Tool execution failed: {}", reason),
    }
}

async fn emit(tx: &mpsc::Sender<String>, notice: &StreamNotice) -> bool {
    match serde_json::to_string(notice) {
        Ok(payload) => tx.send(payload).await.is_ok(),
        Err(e) => {
            error!(error = %e, "Failed to encode stream notice");
            true
        }
    }
}

/// Forwards upstream payloads until the stream ends. With an accumulator,
/// tool-call deltas are buffered instead of forwarded.
async fn relay(
    mut upstream: ByteStream,
    tx: &mpsc::Sender<String>,
    mut accumulator: Option<&mut ToolCallAccumulator>,
) -> Relay {
    let mut decoder = SseDecoder::new();

    while let Some(chunk) = upstream.next().await {
        let bytes = match chunk {
            Ok(bytes) => bytes,
            Err(e) => return Relay::Failed(e),
        };
        for frame in decoder.push(&bytes) {
            if !forward(frame, tx, accumulator.as_deref_mut()).await {
                return Relay::ClientGone;
            }
        }
    }

    if let Some(frame) = decoder.finish() {
        if !forward(frame, tx, accumulator.as_deref_mut()).await {
            return Relay::ClientGone;
        }
    }
    Relay::Finished
}

async fn forward(
    frame: SseFrame,
    tx: &mpsc::Sender<String>,
    accumulator: Option<&mut ToolCallAccumulator>,
) -> bool {
    // Upstream [DONE] is swallowed; the task sends its own at the very end.
    let SseFrame::Data(payload) = frame else {
        return true;
    };

    if let Some(accumulator) = accumulator {
        if let ChunkKind::ToolCallDelta(chunks) = classify(&payload) {
            accumulator.absorb_all(chunks);
            return true;
        }
    }

    tx.send(payload).await.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Bytes;
    use domain::models::chat::{ChatRole, CompletionResponse, HistoryEntry};
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio_stream::wrappers::UnboundedReceiverStream;

    /// `None` chunks become transport errors.
    type Script = Result<Vec<Option<&'static str>>, LlmError>;

    #[derive(Default)]
    struct FakeLlm {
        /// Fed chunk by chunk from the test; used before `streams`.
        live: Mutex<Option<mpsc::UnboundedReceiver<Result<Bytes, LlmError>>>>,
        streams: Mutex<VecDeque<Script>>,
        completions: Mutex<VecDeque<Result<CompletionResponse, LlmError>>>,
        requests: Mutex<Vec<CompletionRequest>>,
    }

    impl FakeLlm {
        fn streaming(scripts: Vec<Script>) -> Self {
            Self {
                streams: Mutex::new(scripts.into()),
                ..Default::default()
            }
        }

        fn completing(body: Value) -> Self {
            let response: CompletionResponse = serde_json::from_value(body).unwrap();
            Self {
                completions: Mutex::new(vec![Ok(response)].into()),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl ChatCompletionApi for FakeLlm {
        async fn complete(
            &self,
            request: &CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            self.requests.lock().unwrap().push(request.clone());
            self.completions.lock().unwrap().pop_front().unwrap()
        }

        async fn stream(
            &self,
            request: &CompletionRequest,
            _timeout: Duration,
        ) -> Result<ByteStream, LlmError> {
            self.requests.lock().unwrap().push(request.clone());
            if let Some(live) = self.live.lock().unwrap().take() {
                return Ok(UnboundedReceiverStream::new(live).boxed());
            }
            let chunks = self.streams.lock().unwrap().pop_front().unwrap()?;
            let items: Vec<Result<Bytes, LlmError>> = chunks
                .into_iter()
                .map(|chunk| match chunk {
                    Some(text) => Ok(Bytes::from_static(text.as_bytes())),
                    None => Err(LlmError::Http("connection reset".into())),
                })
                .collect();
            Ok(futures::stream::iter(items).boxed())
        }
    }

    struct FakeTools {
        calls: Mutex<Vec<(ToolName, Value, ToolContext)>>,
    }

    #[async_trait]
    impl ToolRunner for FakeTools {
        async fn run(&self, tool: ToolName, arguments: Value, context: &ToolContext) -> Value {
            self.calls
                .lock()
                .unwrap()
                .push((tool, arguments, context.clone()));
            json!({"results": [{"title": "T", "description": "D", "url": "https://e.com"}], "query": "seo"})
        }
    }

    fn service(llm: Arc<FakeLlm>) -> (ChatService, Arc<FakeTools>) {
        let tools = Arc::new(FakeTools {
            calls: Mutex::new(Vec::new()),
        });
        let config = ChatConfig {
            api_key: "sk-test".into(),
            use_streaming: true,
            ..Default::default()
        };
        let service = ChatService::new(Arc::new(config), llm, tools.clone());
        (service, tools)
    }

    fn request(message: &str) -> ChatRequest {
        ChatRequest {
            message: message.to_string(),
            history: vec![HistoryEntry {
                role: "user".into(),
                content: "Hi".into(),
            }],
            session_id: Some("sess-1".into()),
        }
    }

    async fn collect(mut rx: mpsc::Receiver<String>) -> Vec<String> {
        let mut out = Vec::new();
        while let Some(payload) = rx.recv().await {
            out.push(payload);
        }
        out
    }

    const CONTENT_A: &str = r#"{"choices":[{"delta":{"content":"Hel"}}]}"#;

    #[tokio::test]
    async fn test_content_is_forwarded_and_done_sent_once() {
        let llm = Arc::new(FakeLlm::streaming(vec![Ok(vec![
            Some(": OPENROUTER PROCESSING\n\ndata: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\ndata: {\"choi"),
            Some("ces\":[{\"delta\":{\"content\":\"lo\"}}]}\n\ndata: [DONE]\n\n"),
        ])]));
        let (service, tools) = service(llm.clone());

        let events = collect(service.open_stream(&request("Hello")).await.unwrap()).await;
        assert_eq!(
            events,
            vec![
                CONTENT_A.to_string(),
                r#"{"choices":[{"delta":{"content":"lo"}}]}"#.to_string(),
                DONE.to_string(),
            ]
        );
        assert!(tools.calls.lock().unwrap().is_empty());

        let sent = llm.requests.lock().unwrap();
        assert!(sent[0].stream);
        assert_eq!(sent[0].messages.len(), 3);
    }

    #[tokio::test]
    async fn test_tool_call_runs_and_follow_up_is_streamed() {
        let llm = Arc::new(FakeLlm::streaming(vec![
            Ok(vec![
                Some("data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"id\":\"call_1\",\"function\":{\"name\":\"search_web\",\"arguments\":\"\"}}]}}]}\n\n"),
                Some("data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"arguments\":\"{\\\"query\\\":\"}}]}}]}\n\n"),
                Some("data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"arguments\":\"\\\"seo\\\"}\"}}]}}]}\n\ndata: [DONE]\n\n"),
            ]),
            Ok(vec![Some(
                "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\ndata: [DONE]\n\n",
            )]),
        ]));
        let (service, tools) = service(llm.clone());

        let events = collect(service.open_stream(&request("Search SEO")).await.unwrap()).await;
        assert_eq!(events.len(), 4);

        let status: Value = serde_json::from_str(&events[0]).unwrap();
        assert_eq!(status["tool_status"], "Searching the web...");
        assert_eq!(status["tool_name"], "search_web");
        assert_eq!(status["tool_args"], json!({"query": "seo"}));

        let result: Value = serde_json::from_str(&events[1]).unwrap();
        assert_eq!(result["tool_name"], "search_web");
        assert_eq!(result["tool_result"]["query"], "seo");

        assert_eq!(events[2], CONTENT_A);
        assert_eq!(events[3], DONE);

        let calls = tools.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, ToolName::SearchWeb);
        assert_eq!(calls[0].2.session_id.as_deref(), Some("sess-1"));
        assert_eq!(calls[0].2.conversation_context, "User: Hi");

        let sent = llm.requests.lock().unwrap();
        let follow_up = &sent[1].messages;
        let assistant = &follow_up[follow_up.len() - 2];
        assert_eq!(assistant.role, ChatRole::Assistant);
        assert!(assistant.content.is_none());
        let replayed = &assistant.tool_calls.as_ref().unwrap()[0];
        assert_eq!(replayed.id, "call_1");
        assert_eq!(replayed.function.arguments, "{\"query\":\"seo\"}");

        let tool_message = follow_up.last().unwrap();
        assert_eq!(tool_message.role, ChatRole::Tool);
        assert_eq!(tool_message.tool_call_id.as_deref(), Some("call_1"));
    }

    #[tokio::test]
    async fn test_unknown_tool_reports_error_then_done() {
        let llm = Arc::new(FakeLlm::streaming(vec![Ok(vec![Some(
            "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"id\":\"c\",\"function\":{\"name\":\"delete_site\",\"arguments\":\"{}\"}}]}}]}\n\n",
        )])]));
        let (service, tools) = service(llm);

        let events = collect(service.open_stream(&request("x")).await.unwrap()).await;
        assert_eq!(
            events,
            vec![
                r#"{"tool_error":"Tool execution failed: Unknown tool: delete_site"}"#.to_string(),
                DONE.to_string(),
            ]
        );
        assert!(tools.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_arguments_report_error() {
        let llm = Arc::new(FakeLlm::streaming(vec![Ok(vec![Some(
            "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"id\":\"c\",\"function\":{\"name\":\"search_web\",\"arguments\":\"  \"}}]}}]}\n\n",
        )])]));
        let (service, _) = service(llm);

        let events = collect(service.open_stream(&request("x")).await.unwrap()).await;
        assert_eq!(
            events[0],
            r#"{"tool_error":"Tool execution failed: Empty arguments for tool call"}"#
        );
        assert_eq!(events[1], DONE);
    }

    #[tokio::test]
    async fn test_stream_error_closes_without_done() {
        let llm = Arc::new(FakeLlm::streaming(vec![Ok(vec![
            Some("data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n"),
            None,
        ])]));
        let (service, _) = service(llm);

        let events = collect(service.open_stream(&request("x")).await.unwrap()).await;
        assert_eq!(
            events,
            vec![CONTENT_A.to_string(), r#"{"error":"Stream error"}"#.to_string()]
        );
    }

    #[tokio::test]
    async fn test_follow_up_failure_reports_analysis_failed() {
        let llm = Arc::new(FakeLlm::streaming(vec![
            Ok(vec![Some(
                "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"id\":\"c\",\"function\":{\"name\":\"search_web\",\"arguments\":\"{\\\"query\\\":\\\"a\\\"}\"}}]}}]}\n\n",
            )]),
            Ok(vec![None]),
        ]));
        let (service, _) = service(llm);

        let events = collect(service.open_stream(&request("x")).await.unwrap()).await;
        assert_eq!(events.len(), 4);
        assert_eq!(events[2], r#"{"error":"Analysis failed"}"#);
        assert_eq!(events[3], DONE);
    }

    #[tokio::test]
    async fn test_client_gone_before_tool_runs() {
        let (upstream, live) = mpsc::unbounded_channel();
        let llm = Arc::new(FakeLlm {
            live: Mutex::new(Some(live)),
            ..Default::default()
        });
        let (service, tools) = service(llm.clone());

        let mut rx = service.open_stream(&request("Search SEO")).await.unwrap();
        upstream
            .send(Ok(Bytes::from_static(
                b"data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
            )))
            .unwrap();
        assert_eq!(rx.recv().await.as_deref(), Some(CONTENT_A));

        drop(rx);
        upstream
            .send(Ok(Bytes::from_static(
                b"data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"id\":\"c\",\"function\":{\"name\":\"search_web\",\"arguments\":\"{\\\"query\\\":\\\"seo\\\"}\"}}]}}]}\n\n",
            )))
            .unwrap();
        drop(upstream);

        // Lets the streaming task reach the end of the upstream.
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(tools.calls.lock().unwrap().is_empty());
        assert_eq!(llm.requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_open_failure_is_returned_before_streaming() {
        let llm = Arc::new(FakeLlm::streaming(vec![Err(LlmError::RateLimited)]));
        let (service, _) = service(llm);

        let err = service.open_stream(&request("x")).await.unwrap_err();
        assert!(matches!(err, ChatError::Llm(LlmError::RateLimited)));
    }

    #[tokio::test]
    async fn test_reply_with_text() {
        let llm = Arc::new(FakeLlm::completing(json!({
            "choices": [{"message": {"role": "assistant", "content": "Hello there"}}]
        })));
        let (service, _) = service(llm.clone());

        match service.reply(&request("Hi")).await.unwrap() {
            ChatResponse::Text(reply) => assert_eq!(reply.response, "Hello there"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(!llm.requests.lock().unwrap()[0].stream);
    }

    #[tokio::test]
    async fn test_reply_with_tool_call() {
        let llm = Arc::new(FakeLlm::completing(json!({
            "choices": [{"message": {"content": null, "tool_calls": [
                {"id": "c1", "type": "function", "function": {"name": "search_web", "arguments": "{\"query\":\"seo\"}"}}
            ]}}]
        })));
        let (service, tools) = service(llm);

        let response = service.reply(&request("Search")).await.unwrap();
        let body = serde_json::to_value(&response).unwrap();
        assert_eq!(body["success"], true);
        assert_eq!(body["tool_call"]["name"], "search_web");
        assert_eq!(body["tool_call"]["arguments"]["query"], "seo");
        assert_eq!(body["tool_call"]["result"]["query"], "seo");
        assert_eq!(tools.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_reply_without_content_is_an_error() {
        let llm = Arc::new(FakeLlm::completing(json!({"choices": []})));
        let (service, _) = service(llm);

        let err = service.reply(&request("Hi")).await.unwrap_err();
        assert!(matches!(err, ChatError::EmptyReply));
    }
}
