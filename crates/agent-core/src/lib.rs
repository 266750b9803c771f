//! # agent-core
//!
//! Session state, tool registry and the tool-dispatch loop of a
//! conversational agent, independent of any particular model backend.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     SessionManager                           │
//! │   send(session_id, text) ── one lock per session             │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────┐  │
//! │  │  AgentLoop  │──│ ToolInvoker │──│    ToolRegistry     │  │
//! │  │             │  └─────────────┘  └─────────────────────┘  │
//! │  │             │──────────────────── ModelClient (trait)    │
//! │  └─────────────┘                                            │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The `ModelClient` trait keeps the loop ignorant of how the model is
//! reached; `agent-runtime` provides the Ollama-backed client and
//! [`mock`] provides scripted and offline ones.

pub mod builtin;
pub mod error;
pub mod invoker;
pub mod mock;
pub mod provider;
pub mod reasoning;
pub mod service;
pub mod session;
pub mod tool;
pub mod turn;

pub use builtin::CurrentTimeTool;
pub use error::{AgentError, Result};
pub use invoker::ToolInvoker;
pub use provider::{GenerationOptions, ModelClient, ModelResponse, RawModelOutput};
pub use reasoning::{AgentBuilder, AgentConfig, AgentLoop};
pub use service::SessionManager;
pub use session::{SessionId, SessionState};
pub use tool::{ParamType, ParameterSchema, Tool, ToolCall, ToolRegistry, ToolResult, ToolSpec};
pub use turn::{Role, Turn, TurnContent};
