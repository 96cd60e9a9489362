//! Agent discovery.

use async_trait::async_trait;

use super::service::TaskService;
use crate::error::Result;
use crate::types::{AgentCapabilities, AgentCard, AgentSkill, ToolDescriptor};

/// Produces the agent card published for discovery.
///
/// A static [`AgentCard`] returns itself. [`TaskService`] builds its card
/// from configuration and the tools registered at call time.
#[async_trait]
pub trait AgentCardProducer: Send + Sync {
    /// Returns the public agent card.
    async fn card(&self) -> Result<AgentCard>;
}

#[async_trait]
impl AgentCardProducer for AgentCard {
    async fn card(&self) -> Result<AgentCard> {
        Ok(self.clone())
    }
}

#[async_trait]
impl AgentCardProducer for TaskService {
    async fn card(&self) -> Result<AgentCard> {
        Ok(self.agent_card())
    }
}

/// Capabilities advertised by [`TaskService`].
pub const SERVICE_CAPABILITIES: AgentCapabilities = AgentCapabilities {
    streaming: true,
    push_notifications: false,
    state_transition_history: true,
};

impl TaskService {
    /// Builds the discovery descriptor.
    #[must_use]
    pub fn agent_card(&self) -> AgentCard {
        let identity = &self.config().agent;
        let mut builder = AgentCard::builder(&identity.name, &identity.url)
            .description(&identity.description)
            .version(&identity.version)
            .capabilities(SERVICE_CAPABILITIES);
        for tool in self.list_tools() {
            builder = builder.skill(tool_skill(tool));
        }
        builder.build()
    }
}

fn tool_skill(tool: ToolDescriptor) -> AgentSkill {
    let mut tags = vec!["tool".to_string()];
    if tool.requires_approval {
        tags.push("requires-approval".to_string());
    }
    AgentSkill::new(&tool.name, &tool.name, tool.description, tags)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AgentIdentity, ServiceConfig};
    use crate::tools::{FunctionTool, ToolRegistry};
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_static_card_returns_itself() {
        let card = AgentCard::builder("static", "http://static").build();
        assert_eq!(card.card().await.unwrap(), card);
    }

    #[tokio::test]
    async fn test_service_card() {
        let config = ServiceConfig::new().agent(AgentIdentity {
            name: "calc".into(),
            description: "Does sums".into(),
            url: "https://calc.example".into(),
            version: "2.1.0".into(),
        });
        let service = TaskService::builder().with_config(config).build();
        let card = service.card().await.unwrap();

        assert_eq!(card.name, "calc");
        assert_eq!(card.url, "https://calc.example");
        assert_eq!(card.version, "2.1.0");
        assert_eq!(card.protocol_version, crate::PROTOCOL_VERSION);
        assert!(card.capabilities.streaming);
        assert!(!card.capabilities.push_notifications);
        assert!(card.capabilities.state_transition_history);

        let read_file = card.find_skill("read_file").unwrap();
        assert!(read_file.tags.contains(&"requires-approval".to_string()));
        let calculator = card.find_skill("calculator").unwrap();
        assert_eq!(calculator.tags, vec!["tool"]);
    }

    #[tokio::test]
    async fn test_card_tracks_registered_tools() {
        let service = TaskService::builder()
            .with_registry(Arc::new(ToolRegistry::new()))
            .build();
        assert!(service.agent_card().skills.is_empty());

        service
            .tools()
            .registry()
            .register(FunctionTool::new(
                "ping",
                "Replies pong",
                json!({"type": "object"}),
                |_| async { Ok(json!("pong")) },
            ))
            .unwrap();
        let card = service.card().await.unwrap();
        assert_eq!(card.skills.len(), 1);
        assert_eq!(card.skills[0].description, "Replies pong");
    }
}
