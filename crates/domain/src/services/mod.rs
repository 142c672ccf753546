//! Domain services for the Websited backend.
//!
//! Pure logic with no I/O: stream decoding, tool-call reassembly, page
//! analysis and lead classification.

pub mod html;
pub mod service_detection;
pub mod sse;
pub mod tool_calls;

pub use html::analyze_html;
pub use service_detection::detect_service;
pub use sse::{classify, ChunkKind, SseDecoder, SseFrame};
pub use tool_calls::{PendingToolCall, ToolCallAccumulator, ToolCallChunk, ToolCallError};
