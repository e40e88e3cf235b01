//! Decentralized forwarding for agents that know their own neighbours.
//!
//! The engine's field mapping is the canonical way data moves through a chain.
//! `ChainLinks` is a thin convenience for agents driven outside the engine: it
//! builds next-hop messages with the same `AgentMessage::next_hop` constructor,
//! so `chain_depth` and `previous_agent` agree with what the engine stamps.

use serde::{Deserialize, Serialize};

use psyche_core::traits::Agent;
use psyche_core::types::{AgentMessage, AgentResponse, NODE_ID_KEY};

use crate::graph::node::AgentNode;

/// Declared input and output agents of one chainable agent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainLinks {
    pub agent_id: String,
    #[serde(default)]
    pub input_agents: Vec<String>,
    #[serde(default)]
    pub output_agents: Vec<String>,
}

impl ChainLinks {
    pub fn new(agent_id: impl Into<String>, inputs: Vec<String>, outputs: Vec<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            input_agents: inputs,
            output_agents: outputs,
        }
    }

    /// Links as computed by the builder for a node in a chain.
    pub fn from_node(node: &AgentNode) -> Self {
        Self::new(&node.agent_id, node.inputs.clone(), node.outputs.clone())
    }

    pub fn add_output(&mut self, agent_id: impl Into<String>) {
        let agent_id = agent_id.into();
        if !self.output_agents.contains(&agent_id) {
            self.output_agents.push(agent_id);
        }
    }

    /// One outgoing message per declared output agent.
    ///
    /// A failed response forwards nothing. The whole response data becomes the
    /// next payload; there is no field mapping at this level.
    pub fn forward_to_next(
        &self,
        response: &AgentResponse,
        original: &AgentMessage,
    ) -> Vec<AgentMessage> {
        if !response.success {
            return Vec::new();
        }
        self.output_agents
            .iter()
            .map(|target| {
                original
                    .next_hop(&self.agent_id, response.data.clone())
                    .with_metadata(NODE_ID_KEY, serde_json::json!(target))
            })
            .collect()
    }
}

/// An agent that forwards its own results.
pub trait Chainable: Agent {
    fn links(&self) -> &ChainLinks;

    fn forward_to_next(
        &self,
        response: &AgentResponse,
        original: &AgentMessage,
    ) -> Vec<AgentMessage> {
        self.links().forward_to_next(response, original)
    }
}
