//! Agent discovery descriptor.
//!
//! The card is purely declarative: identity from configuration plus the
//! capability flags and skills of the service that publishes it.

use serde::{Deserialize, Serialize};

/// A self-describing manifest for an agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AgentCard {
    /// Human-readable name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// Preferred endpoint URL.
    pub url: String,
    /// The agent's own version.
    pub version: String,
    /// A2A protocol version spoken by the agent.
    pub protocol_version: String,
    /// Optional capabilities.
    pub capabilities: AgentCapabilities,
    /// Accepted input MIME types.
    pub default_input_modes: Vec<String>,
    /// Produced output MIME types.
    pub default_output_modes: Vec<String>,
    /// Advertised skills.
    pub skills: Vec<AgentSkill>,
}

impl AgentCard {
    /// Starts a card builder.
    pub fn builder(name: impl Into<String>, url: impl Into<String>) -> AgentCardBuilder {
        AgentCardBuilder::new(name, url)
    }

    /// Finds a skill by ID.
    #[must_use]
    pub fn find_skill(&self, skill_id: &str) -> Option<&AgentSkill> {
        self.skills.iter().find(|s| s.id == skill_id)
    }
}

/// Builder for [`AgentCard`].
#[derive(Debug)]
pub struct AgentCardBuilder {
    card: AgentCard,
}

impl AgentCardBuilder {
    /// Creates a builder with defaults for everything but name and URL.
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            card: AgentCard {
                name: name.into(),
                description: String::new(),
                url: url.into(),
                version: "1.0.0".to_string(),
                protocol_version: crate::PROTOCOL_VERSION.to_string(),
                capabilities: AgentCapabilities::default(),
                default_input_modes: vec!["text/plain".to_string()],
                default_output_modes: vec!["text/plain".to_string(), "application/json".to_string()],
                skills: Vec::new(),
            },
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.card.description = description.into();
        self
    }

    /// Sets the version.
    #[must_use]
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.card.version = version.into();
        self
    }

    /// Sets the capability flags.
    #[must_use]
    pub const fn capabilities(mut self, capabilities: AgentCapabilities) -> Self {
        self.card.capabilities = capabilities;
        self
    }

    /// Adds a skill.
    #[must_use]
    pub fn skill(mut self, skill: AgentSkill) -> Self {
        self.card.skills.push(skill);
        self
    }

    /// Finishes the card.
    #[must_use]
    pub fn build(self) -> AgentCard {
        self.card
    }
}

/// Optional features an agent supports.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AgentCapabilities {
    /// Streaming status/artifact updates.
    pub streaming: bool,
    /// Push notifications to a webhook.
    pub push_notifications: bool,
    /// Full status history retained on tasks.
    pub state_transition_history: bool,
}

/// A distinct function the agent can perform.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AgentSkill {
    /// Unique skill ID.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// What the skill does.
    pub description: String,
    /// Keywords.
    pub tags: Vec<String>,
}

impl AgentSkill {
    /// Creates a skill.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        tags: Vec<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            tags,
        }
    }
}
