//! Server Configuration

use agent_core::AgentConfig;

use crate::state::DEFAULT_MAX_SESSIONS;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_addr: String,

    /// Defaults for every agent run; requests may override model and step limit
    pub agent: AgentConfig,

    /// Idle sessions beyond this are evicted, oldest first
    pub max_sessions: usize,
}

impl ServerConfig {
    pub fn from_env(default_model: String) -> Self {
        let mut agent = AgentConfig::from_env();
        agent.generation.model = default_model;
        Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into()),
            agent,
            max_sessions: std::env::var("MAX_SESSIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|&n| n > 0)
                .unwrap_or(DEFAULT_MAX_SESSIONS),
        }
    }
}
