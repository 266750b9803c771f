//! # agent-runtime
//!
//! Model backends for the agent loop.
//!
//! ## Backends
//!
//! - **Ollama** (default feature): local inference through `ollama-rs`,
//!   using the text tool-call protocol in [`protocol`]
//!
//! ## Usage
//!
//! ```rust,ignore
//! use agent_runtime::{OllamaClient, OllamaConfig};
//!
//! let model = Arc::new(OllamaClient::from_config(OllamaConfig::default()));
//! let agent = AgentBuilder::new()
//!     .model(model)
//!     .tools(ToolRegistry::with_builtin_tools())
//!     .build()?;
//! ```

pub mod protocol;

#[cfg(feature = "ollama")]
pub mod ollama;

#[cfg(feature = "ollama")]
pub use ollama::{OllamaClient, OllamaConfig};

pub use protocol::DEFAULT_INSTRUCTION;

// Re-export core types for convenience
pub use agent_core::{AgentBuilder, AgentError, ModelClient, ModelResponse, Result, ToolRegistry};
