//! Agent runtime for the todo assistant.
//!
//! A triage agent reads each user turn and hands the conversation off to one
//! of four specialists (create, read, update, delete). Each specialist owns a
//! single tool backed by the todo store.
//!
//! # Flow
//!
//! 1. **Transcript** (`conversation`) accumulates user, assistant and tool messages
//! 2. **Routing** (`agents`) exposes handoffs as `transfer_to_*` tools
//! 3. **Execution** (`runtime`) drives model calls, tool calls and handoffs
//! 4. **Tools** (`tools`) translate arguments into store operations
//!
//! # Key Types
//!
//! - `AgentRuntime` - runs one turn to a final answer
//! - `CompletionModel` - pluggable completion endpoint (`OpenAiCompatibleModel`, `KeywordModel`)
//! - `ConversationLoop` - interactive prompt/answer loop
//!
//! The model only chooses intents and arguments. Persisting and matching todos
//! is always done by the store.

pub mod agents;
pub mod conversation;
pub mod keyword;
pub mod llm;
pub mod openai;
pub mod runtime;
pub mod tools;

pub use agents::{todo_agents, Agent};
pub use conversation::{ConversationLoop, HistoryPolicy, LoopSummary, Transcript};
pub use keyword::KeywordModel;
pub use llm::{CompletionModel, Message, ModelError, ToolCall};
pub use openai::OpenAiCompatibleModel;
pub use runtime::{AgentRuntime, RunError, RunResult};
pub use tools::ToolError;
