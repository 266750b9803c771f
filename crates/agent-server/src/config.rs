//! Server Configuration
//!
//! Everything comes from environment variables (a `.env` file is loaded
//! first). Unset values take defaults; values that are set but do not parse
//! stop the server at startup.

use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context};

use agent_core::{AgentConfig, SessionManager};
use agent_runtime::OllamaConfig;

/// Which model client to run with
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backend {
    /// Local Ollama server
    Ollama,
    /// Rule-based client, no model server needed
    Offline,
}

impl FromStr for Backend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "offline" => Ok(Self::Offline),
            other => bail!("unknown backend '{other}', expected 'ollama' or 'offline'"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub backend: Backend,
    pub ollama: OllamaConfig,
    pub agent: AgentConfig,
    /// Sessions unused for this long are dropped
    pub session_idle: Duration,
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let agent_defaults = AgentConfig::default();
        let ollama_defaults = OllamaConfig::default();

        let max_tool_rounds: usize =
            parse_or(&lookup, "AGENT_MAX_TOOL_ROUNDS", agent_defaults.max_tool_rounds)?;
        if max_tool_rounds == 0 {
            bail!("AGENT_MAX_TOOL_ROUNDS must be at least 1");
        }

        let model_timeout_secs =
            parse_secs(&lookup, "AGENT_MODEL_TIMEOUT_SECS", agent_defaults.model_timeout)?;
        let tool_timeout_secs =
            parse_secs(&lookup, "AGENT_TOOL_TIMEOUT_SECS", agent_defaults.tool_timeout)?;

        let session_idle_secs = parse_secs(
            &lookup,
            "AGENT_SESSION_IDLE_SECS",
            SessionManager::DEFAULT_IDLE_TIMEOUT,
        )?;

        let mut options = ollama_defaults.options.clone();
        if let Some(model) = lookup("AGENT_MODEL").filter(|m| !m.trim().is_empty()) {
            options.model = model;
        }

        Ok(Self {
            bind_addr: lookup("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:3000".into()),
            backend: parse_or(&lookup, "AGENT_BACKEND", Backend::Ollama)?,
            ollama: OllamaConfig {
                host: lookup("OLLAMA_HOST").unwrap_or_else(|| ollama_defaults.host.clone()),
                port: parse_or(&lookup, "OLLAMA_PORT", ollama_defaults.port)?,
                timeout_secs: model_timeout_secs,
                options,
                ..ollama_defaults
            },
            agent: AgentConfig {
                max_tool_rounds,
                model_timeout: Duration::from_secs(model_timeout_secs),
                tool_timeout: Duration::from_secs(tool_timeout_secs),
            },
            session_idle: Duration::from_secs(session_idle_secs),
        })
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{e}"))
            .with_context(|| format!("invalid {key}={raw:?}")),
    }
}

/// Whole seconds, at least one
fn parse_secs(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: Duration) -> anyhow::Result<u64> {
    let secs: u64 = parse_or(lookup, key, default.as_secs())?;
    if secs == 0 {
        bail!("{key} must be at least 1 second");
    }
    Ok(secs)
}
