//! Service configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Default ceiling for stream monitoring.
pub const DEFAULT_STREAM_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Default per-invocation tool timeout.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

/// Identity advertised by the agent card.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AgentIdentity {
    /// Agent name.
    pub name: String,
    /// Agent description.
    pub description: String,
    /// Endpoint URL.
    pub url: String,
    /// Agent version.
    pub version: String,
}

impl Default for AgentIdentity {
    fn default() -> Self {
        Self {
            name: "capa2a".to_string(),
            description: "A2A task lifecycle engine with tool approval".to_string(),
            url: "http://localhost:8080".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Tunables for the task service.
///
/// Deserializes from camelCase JSON with every field optional:
///
/// ```json
/// { "streamTimeoutSecs": 600, "toolTimeoutMs": 5000, "defaultPageSize": 20,
///   "agent": { "name": "calc", "url": "https://calc.example" } }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceConfig {
    /// Stream monitoring ceiling in seconds.
    pub stream_timeout_secs: u64,
    /// Tool invocation timeout in milliseconds.
    pub tool_timeout_ms: u64,
    /// Page size used when `list_tasks` gets no limit.
    pub default_page_size: usize,
    /// Upper bound for a requested page size.
    pub max_page_size: usize,
    /// Discovery identity.
    pub agent: AgentIdentity,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            stream_timeout_secs: DEFAULT_STREAM_TIMEOUT.as_secs(),
            tool_timeout_ms: 30_000,
            default_page_size: 50,
            max_page_size: 100,
            agent: AgentIdentity::default(),
        }
    }
}

impl ServiceConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a JSON configuration document.
    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Sets the stream monitoring ceiling.
    #[must_use]
    pub const fn stream_timeout(mut self, timeout: Duration) -> Self {
        self.stream_timeout_secs = timeout.as_secs();
        self
    }

    /// Sets the tool timeout.
    #[must_use]
    pub const fn tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Sets the default and maximum page sizes.
    #[must_use]
    pub const fn page_sizes(mut self, default: usize, max: usize) -> Self {
        self.default_page_size = default;
        self.max_page_size = max;
        self
    }

    /// Sets the agent identity.
    #[must_use]
    pub fn agent(mut self, agent: AgentIdentity) -> Self {
        self.agent = agent;
        self
    }

    /// Stream monitoring ceiling.
    #[must_use]
    pub const fn stream_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.stream_timeout_secs)
    }

    /// Tool invocation timeout.
    #[must_use]
    pub const fn tool_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.tool_timeout_ms)
    }
}
