//! The conversational agent: model client, tool registry and dispatcher,
//! confidence router, and the multi-round agent loop.

mod agent;
mod model;
mod prompt;
mod router;
mod schema;
mod tools;

pub use agent::{AgentLoop, DEFAULT_MODEL_WINDOW, DEFAULT_ROUND_CAP, LoopConfig, TurnOutcome};
pub use model::{ApiClient, ModelClient, ModelMessage, ModelRotator, ModelTurn, ToolRequest};
pub use prompt::SYSTEM_PROMPT;
pub use router::{ConfidenceRouter, DEFAULT_CONFIDENCE_THRESHOLD};
pub use schema::{ToolSchema, tool_schemas};
pub use tools::{CreatedEntry, DispatchResult, Dispatcher, ToolCall, ToolError, ToolOutcome};
