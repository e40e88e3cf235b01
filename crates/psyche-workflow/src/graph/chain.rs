use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use super::edge::ChainConnection;
use super::node::AgentNode;

/// A named directed graph of agent nodes and field-mapped connections.
///
/// `nodes` keeps insertion order, which is not necessarily execution order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentChain {
    pub chain_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Node where execution starts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_point: Option<String>,
    #[serde(default)]
    pub nodes: Vec<AgentNode>,
    #[serde(default)]
    pub connections: Vec<ChainConnection>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl AgentChain {
    pub fn new(
        chain_id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            chain_id: chain_id.into(),
            name: name.into(),
            description: description.into(),
            entry_point: None,
            nodes: vec![],
            connections: vec![],
            metadata: BTreeMap::new(),
        }
    }

    pub fn node(&self, agent_id: &str) -> Option<&AgentNode> {
        self.nodes.iter().find(|n| n.agent_id == agent_id)
    }

    pub(crate) fn node_mut(&mut self, agent_id: &str) -> Option<&mut AgentNode> {
        self.nodes.iter_mut().find(|n| n.agent_id == agent_id)
    }

    pub fn has_node(&self, agent_id: &str) -> bool {
        self.node(agent_id).is_some()
    }

    /// Connections whose target is `agent_id`.
    pub fn inbound<'a>(&'a self, agent_id: &'a str) -> impl Iterator<Item = &'a ChainConnection> {
        self.connections
            .iter()
            .filter(move |c| c.target_agent == agent_id)
    }

    /// Connections whose source is `agent_id`.
    pub fn outbound<'a>(
        &'a self,
        agent_id: &'a str,
    ) -> impl Iterator<Item = &'a ChainConnection> {
        self.connections
            .iter()
            .filter(move |c| c.source_agent == agent_id)
    }

    /// Recompute every node's `inputs`/`outputs` from the connections.
    pub fn rebuild_links(&mut self) {
        for node in &mut self.nodes {
            node.inputs.clear();
            node.outputs.clear();
        }
        let edges: Vec<(String, String)> = self
            .connections
            .iter()
            .map(|c| (c.source_agent.clone(), c.target_agent.clone()))
            .collect();
        for (source, target) in edges {
            if let Some(node) = self.node_mut(&source) {
                node.add_output(&target);
            }
            if let Some(node) = self.node_mut(&target) {
                node.add_input(&source);
            }
        }
    }

    /// Node ids reachable from the entry point, in insertion order.
    pub fn reachable(&self) -> Vec<String> {
        let depths = self.depths();
        self.nodes
            .iter()
            .filter(|n| depths.contains_key(&n.agent_id))
            .map(|n| n.agent_id.clone())
            .collect()
    }

    /// Shortest distance from the entry point for every reachable node.
    pub fn depths(&self) -> HashMap<String, u64> {
        let mut depths = HashMap::new();
        let Some(entry) = self.entry_point.as_deref().filter(|e| self.has_node(e)) else {
            return depths;
        };

        let mut queue = VecDeque::new();
        depths.insert(entry.to_string(), 0);
        queue.push_back(entry.to_string());

        while let Some(current) = queue.pop_front() {
            let depth = depths[&current];
            for conn in self.outbound(&current) {
                if !self.has_node(&conn.target_agent) || depths.contains_key(&conn.target_agent) {
                    continue;
                }
                depths.insert(conn.target_agent.clone(), depth + 1);
                queue.push_back(conn.target_agent.clone());
            }
        }
        depths
    }

    /// Find a directed cycle, returned as the node path `a -> b -> a`.
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Visiting,
            Done,
        }

        fn visit(
            chain: &AgentChain,
            id: &str,
            marks: &mut HashMap<String, Mark>,
            stack: &mut Vec<String>,
        ) -> Option<Vec<String>> {
            marks.insert(id.to_string(), Mark::Visiting);
            stack.push(id.to_string());

            let targets: Vec<&str> = chain
                .outbound(id)
                .map(|c| c.target_agent.as_str())
                .collect();
            for target in targets {
                match marks.get(target) {
                    Some(Mark::Visiting) => {
                        let start = stack.iter().position(|s| s == target).unwrap_or(0);
                        let mut cycle = stack[start..].to_vec();
                        cycle.push(target.to_string());
                        return Some(cycle);
                    }
                    Some(Mark::Done) => {}
                    None => {
                        if let Some(cycle) = visit(chain, target, marks, stack) {
                            return Some(cycle);
                        }
                    }
                }
            }

            stack.pop();
            marks.insert(id.to_string(), Mark::Done);
            None
        }

        let mut marks = HashMap::new();
        for node in &self.nodes {
            if marks.contains_key(&node.agent_id) {
                continue;
            }
            let mut stack = Vec::new();
            if let Some(cycle) = visit(self, &node.agent_id, &mut marks, &mut stack) {
                return Some(cycle);
            }
        }
        None
    }

    /// Upstream node ids of `agent_id`, deduplicated, in connection order.
    pub fn upstream(&self, agent_id: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        self.inbound(agent_id)
            .filter(|c| seen.insert(c.source_agent.clone()))
            .map(|c| c.source_agent.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::edge::mapping;

    fn diamond() -> AgentChain {
        let mut chain = AgentChain::new("d", "Diamond", "");
        for id in ["a", "b", "c", "d"] {
            chain.nodes.push(AgentNode::new(id, "echo"));
        }
        chain.entry_point = Some("a".into());
        for (s, t) in [("a", "b"), ("a", "c"), ("b", "d"), ("c", "d")] {
            chain
                .connections
                .push(ChainConnection::new(s, t, mapping([("out", "in")])));
        }
        chain.rebuild_links();
        chain
    }

    #[test]
    fn test_rebuild_links() {
        let chain = diamond();
        assert_eq!(chain.node("a").unwrap().outputs, vec!["b", "c"]);
        assert_eq!(chain.node("d").unwrap().inputs, vec!["b", "c"]);
        assert!(chain.node("a").unwrap().inputs.is_empty());
    }

    #[test]
    fn test_depths_and_reachable() {
        let mut chain = diamond();
        chain.nodes.push(AgentNode::new("orphan", "echo"));
        let depths = chain.depths();
        assert_eq!(depths["a"], 0);
        assert_eq!(depths["b"], 1);
        assert_eq!(depths["d"], 2);
        assert!(!depths.contains_key("orphan"));
        assert_eq!(chain.reachable(), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_depths_without_entry() {
        let mut chain = diamond();
        chain.entry_point = None;
        assert!(chain.depths().is_empty());
    }

    #[test]
    fn test_no_cycle_in_diamond() {
        assert!(diamond().find_cycle().is_none());
    }

    #[test]
    fn test_find_cycle() {
        let mut chain = diamond();
        chain
            .connections
            .push(ChainConnection::new("d", "b", mapping([("out", "in")])));
        let cycle = chain.find_cycle().expect("cycle");
        assert_eq!(cycle, vec!["b", "d", "b"]);
    }

    #[test]
    fn test_upstream_deduplicated() {
        let mut chain = diamond();
        chain
            .connections
            .push(ChainConnection::new("b", "d", mapping([("other", "x")])));
        assert_eq!(chain.upstream("d"), vec!["b", "c"]);
    }
}
