use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::sync::Arc;

use tracing::{debug, info, warn};

use psyche_core::error::{PsycheError, Result};
use psyche_core::traits::Agent;

use super::chain::AgentChain;
use super::condition::is_well_formed;
use super::edge::{ChainConnection, Transform};
use super::format::{check_chain_encodable, check_encodable, decode, encode, ChainFormat};
use super::node::{AgentNode, ExecutionMode};

/// Constructs an agent instance for a node: `(agent_id, node config)`.
pub type AgentFactory = Arc<
    dyn Fn(&str, &BTreeMap<String, serde_json::Value>) -> Result<Arc<dyn Agent>> + Send + Sync,
>;

/// Node description used by the convenience constructors.
#[derive(Debug, Clone)]
pub struct NodeSpec {
    pub agent_id: String,
    pub agent_class: String,
    pub config: BTreeMap<String, serde_json::Value>,
}

impl NodeSpec {
    pub fn new(agent_id: impl Into<String>, agent_class: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            agent_class: agent_class.into(),
            config: BTreeMap::new(),
        }
    }

    pub fn with_config(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.config.insert(key.into(), value);
        self
    }
}

/// Authors, validates and (de)serializes chain definitions.
///
/// Owns two registries: chains by id, and agent factories by class name.
/// It never executes anything; the `WorkflowEngine` reads from it.
#[derive(Default)]
pub struct ChainBuilder {
    chains: HashMap<String, AgentChain>,
    agent_types: HashMap<String, AgentFactory>,
}

impl ChainBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and register an empty chain. Fails if the id is taken.
    pub fn create_chain(
        &mut self,
        chain_id: &str,
        name: &str,
        description: &str,
    ) -> Result<&AgentChain> {
        if self.chains.contains_key(chain_id) {
            return Err(PsycheError::DuplicateChain(chain_id.to_string()));
        }
        info!(chain_id, name, "Chain created");
        Ok(self
            .chains
            .entry(chain_id.to_string())
            .or_insert_with(|| AgentChain::new(chain_id, name, description)))
    }

    /// Register a complete chain definition, replacing any chain with the same id.
    ///
    /// Fails when a config or metadata value cannot be exported in every format.
    pub fn register_chain(&mut self, mut chain: AgentChain) -> Result<String> {
        check_chain_encodable(&chain).map_err(PsycheError::InvalidChain)?;
        if chain.entry_point.is_none() {
            chain.entry_point = chain.nodes.first().map(|n| n.agent_id.clone());
        }
        chain.rebuild_links();
        let chain_id = chain.chain_id.clone();
        if self.chains.insert(chain_id.clone(), chain).is_some() {
            warn!(chain_id = %chain_id, "Replaced existing chain definition");
        }
        Ok(chain_id)
    }

    /// Register a factory for nodes declaring `agent_class = type_name`.
    pub fn register_agent<F>(&mut self, type_name: impl Into<String>, factory: F)
    where
        F: Fn(&str, &BTreeMap<String, serde_json::Value>) -> Result<Arc<dyn Agent>>
            + Send
            + Sync
            + 'static,
    {
        let type_name = type_name.into();
        debug!(agent_class = %type_name, "Agent type registered");
        self.agent_types.insert(type_name, Arc::new(factory));
    }

    pub fn is_registered(&self, type_name: &str) -> bool {
        self.agent_types.contains_key(type_name)
    }

    pub fn factory(&self, type_name: &str) -> Option<AgentFactory> {
        self.agent_types.get(type_name).cloned()
    }

    /// Registered agent class names, sorted.
    pub fn registered_types(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.agent_types.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn get_chain(&self, chain_id: &str) -> Option<&AgentChain> {
        self.chains.get(chain_id)
    }

    pub fn remove_chain(&mut self, chain_id: &str) -> Option<AgentChain> {
        self.chains.remove(chain_id)
    }

    /// Registered chain ids, sorted.
    pub fn list_chains(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.chains.keys().map(|s| s.as_str()).collect();
        ids.sort_unstable();
        ids
    }

    fn chain_mut(&mut self, chain_id: &str) -> Result<&mut AgentChain> {
        self.chains
            .get_mut(chain_id)
            .ok_or_else(|| PsycheError::ChainNotFound(chain_id.to_string()))
    }

    /// Append a node. The first node of a chain without an entry point becomes the entry point.
    pub fn add_agent(
        &mut self,
        chain_id: &str,
        agent_id: &str,
        agent_class: &str,
        config: BTreeMap<String, serde_json::Value>,
        execution_mode: ExecutionMode,
    ) -> Result<&AgentNode> {
        let node = AgentNode::new(agent_id, agent_class)
            .with_config(config)
            .with_mode(execution_mode);
        self.add_node(chain_id, node)
    }

    /// Append a fully specified node (conditional and loop nodes use this).
    pub fn add_node(&mut self, chain_id: &str, mut node: AgentNode) -> Result<&AgentNode> {
        for (key, value) in &node.config {
            check_encodable(&format!("{}.config.{}", node.agent_id, key), value)
                .map_err(PsycheError::InvalidChain)?;
        }
        let chain = self.chain_mut(chain_id)?;
        if chain.has_node(&node.agent_id) {
            return Err(PsycheError::InvalidChain(format!(
                "node '{}' already exists in chain '{}'",
                node.agent_id, chain_id
            )));
        }
        node.inputs.clear();
        node.outputs.clear();

        if chain.entry_point.is_none() {
            chain.entry_point = Some(node.agent_id.clone());
        }
        debug!(
            chain_id,
            agent_id = %node.agent_id,
            agent_class = %node.agent_class,
            mode = %node.execution_mode,
            "Node added"
        );
        chain.nodes.push(node);
        let added = chain.nodes.len() - 1;
        Ok(&chain.nodes[added])
    }

    /// Connect two existing nodes and update their `inputs`/`outputs`.
    pub fn connect_agents(
        &mut self,
        chain_id: &str,
        source_agent: &str,
        target_agent: &str,
        data_mapping: BTreeMap<String, String>,
        transform: Option<Transform>,
    ) -> Result<&ChainConnection> {
        let chain = self.chain_mut(chain_id)?;
        for id in [source_agent, target_agent] {
            if !chain.has_node(id) {
                return Err(PsycheError::UnknownNode {
                    chain_id: chain_id.to_string(),
                    node_id: id.to_string(),
                });
            }
        }

        let mut connection = ChainConnection::new(source_agent, target_agent, data_mapping);
        connection.transform = transform;
        chain.connections.push(connection);

        if let Some(node) = chain.node_mut(source_agent) {
            node.add_output(target_agent);
        }
        if let Some(node) = chain.node_mut(target_agent) {
            node.add_input(source_agent);
        }
        debug!(chain_id, source_agent, target_agent, "Nodes connected");

        let added = chain.connections.len() - 1;
        Ok(&chain.connections[added])
    }

    pub fn set_entry_point(&mut self, chain_id: &str, agent_id: &str) -> Result<()> {
        let chain = self.chain_mut(chain_id)?;
        if !chain.has_node(agent_id) {
            return Err(PsycheError::UnknownNode {
                chain_id: chain_id.to_string(),
                node_id: agent_id.to_string(),
            });
        }
        chain.entry_point = Some(agent_id.to_string());
        Ok(())
    }

    pub fn set_metadata(
        &mut self,
        chain_id: &str,
        key: impl Into<String>,
        value: serde_json::Value,
    ) -> Result<()> {
        let key = key.into();
        check_encodable(&format!("metadata.{}", key), &value).map_err(PsycheError::InvalidChain)?;
        self.chain_mut(chain_id)?.metadata.insert(key, value);
        Ok(())
    }

    /// Validate a chain, returning `(is_valid, errors)`.
    ///
    /// Checks in order: the chain exists; the entry point is set and exists;
    /// connection endpoints exist; every non-entry node has an inbound
    /// connection; every agent class is registered. Then: conditional nodes
    /// carry a well-formed condition, loop bounds are positive, no cycles.
    pub fn validate_chain(&self, chain_id: &str) -> (bool, Vec<String>) {
        let Some(chain) = self.chains.get(chain_id) else {
            return (false, vec![format!("chain '{}' not found", chain_id)]);
        };

        let mut errors = Vec::new();

        match chain.entry_point.as_deref() {
            None => errors.push("entry point is not set".to_string()),
            Some(entry) if !chain.has_node(entry) => {
                errors.push(format!("entry point '{}' does not exist", entry))
            }
            Some(_) => {}
        }

        errors.extend(dangling_endpoints(chain));

        for node in &chain.nodes {
            let is_entry = chain.entry_point.as_deref() == Some(node.agent_id.as_str());
            if !is_entry && chain.inbound(&node.agent_id).next().is_none() {
                errors.push(format!(
                    "node '{}' has no inbound connection",
                    node.agent_id
                ));
            }
        }

        for node in &chain.nodes {
            if !self.is_registered(&node.agent_class) {
                errors.push(format!(
                    "agent class '{}' for node '{}' is not registered",
                    node.agent_class, node.agent_id
                ));
            }
        }

        for node in &chain.nodes {
            match node.execution_mode {
                ExecutionMode::Conditional => match node.condition.as_deref() {
                    None => errors.push(format!(
                        "conditional node '{}' has no condition",
                        node.agent_id
                    )),
                    Some(expr) if !is_well_formed(expr) => errors.push(format!(
                        "condition of node '{}' is malformed: {}",
                        node.agent_id, expr
                    )),
                    Some(_) => {}
                },
                ExecutionMode::Loop if node.max_iterations == Some(0) => errors.push(format!(
                    "loop node '{}' must allow at least one iteration",
                    node.agent_id
                )),
                _ => {}
            }
        }

        if let Some(cycle) = chain.find_cycle() {
            errors.push(format!("cycle detected: {}", cycle.join(" -> ")));
        }

        (errors.is_empty(), errors)
    }

    /// Serialize a registered chain.
    pub fn export_chain(&self, chain_id: &str, format: ChainFormat) -> Result<String> {
        let chain = self
            .chains
            .get(chain_id)
            .ok_or_else(|| PsycheError::ChainNotFound(chain_id.to_string()))?;
        encode(chain, format)
    }

    /// Parse and register a chain, returning its id.
    ///
    /// Replaces an existing chain with the same id. On a parse error nothing
    /// is registered.
    pub fn import_chain(&mut self, data: &str, format: ChainFormat) -> Result<String> {
        let chain = decode(data, format)?;
        if chain.chain_id.trim().is_empty() {
            return Err(PsycheError::Parse {
                format: format.to_string(),
                message: "chain_id is empty".into(),
            });
        }
        let mut seen = std::collections::HashSet::new();
        if let Some(dup) = chain.nodes.iter().find(|n| !seen.insert(n.agent_id.as_str())) {
            return Err(PsycheError::Parse {
                format: format.to_string(),
                message: format!("duplicate node '{}'", dup.agent_id),
            });
        }

        check_chain_encodable(&chain).map_err(|message| PsycheError::Parse {
            format: format.to_string(),
            message,
        })?;

        let chain_id = self.register_chain(chain)?;
        info!(chain_id = %chain_id, %format, "Chain imported");
        Ok(chain_id)
    }

    /// Deterministic human-readable summary of a chain, for diagnostics.
    pub fn visualize_chain(&self, chain_id: &str) -> Result<String> {
        let chain = self
            .chains
            .get(chain_id)
            .ok_or_else(|| PsycheError::ChainNotFound(chain_id.to_string()))?;
        Ok(render(chain))
    }

    /// Build a linear chain `steps[0] -> steps[1] -> ...` using the same mapping on every edge.
    pub fn create_sequential_chain(
        &mut self,
        chain_id: &str,
        name: &str,
        steps: Vec<NodeSpec>,
        data_mapping: BTreeMap<String, String>,
    ) -> Result<()> {
        self.create_chain(chain_id, name, "Sequential chain")?;
        for step in &steps {
            self.add_agent(
                chain_id,
                &step.agent_id,
                &step.agent_class,
                step.config.clone(),
                ExecutionMode::Sequential,
            )?;
        }
        for pair in steps.windows(2) {
            self.connect_agents(
                chain_id,
                &pair[0].agent_id,
                &pair[1].agent_id,
                data_mapping.clone(),
                None,
            )?;
        }
        Ok(())
    }

    /// Build `entry -> {branches} (-> aggregator)` with the branches in PARALLEL mode.
    pub fn create_parallel_chain(
        &mut self,
        chain_id: &str,
        name: &str,
        entry: NodeSpec,
        branches: Vec<NodeSpec>,
        aggregator: Option<NodeSpec>,
        data_mapping: BTreeMap<String, String>,
    ) -> Result<()> {
        self.create_chain(chain_id, name, "Parallel chain")?;
        self.add_agent(
            chain_id,
            &entry.agent_id,
            &entry.agent_class,
            entry.config.clone(),
            ExecutionMode::Sequential,
        )?;
        for branch in &branches {
            self.add_agent(
                chain_id,
                &branch.agent_id,
                &branch.agent_class,
                branch.config.clone(),
                ExecutionMode::Parallel,
            )?;
            self.connect_agents(
                chain_id,
                &entry.agent_id,
                &branch.agent_id,
                data_mapping.clone(),
                None,
            )?;
        }
        if let Some(agg) = aggregator {
            self.add_agent(
                chain_id,
                &agg.agent_id,
                &agg.agent_class,
                agg.config.clone(),
                ExecutionMode::Sequential,
            )?;
            for branch in &branches {
                self.connect_agents(
                    chain_id,
                    &branch.agent_id,
                    &agg.agent_id,
                    data_mapping.clone(),
                    None,
                )?;
            }
        }
        Ok(())
    }
}

/// Errors for connections that reference nodes missing from the chain.
pub(crate) fn dangling_endpoints(chain: &AgentChain) -> Vec<String> {
    let mut errors = Vec::new();
    for conn in &chain.connections {
        for id in [&conn.source_agent, &conn.target_agent] {
            if !chain.has_node(id) {
                errors.push(format!(
                    "connection {} -> {} references missing node '{}'",
                    conn.source_agent, conn.target_agent, id
                ));
            }
        }
    }
    errors
}

fn render(chain: &AgentChain) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Chain: {} ({})", chain.name, chain.chain_id);
    if !chain.description.is_empty() {
        let _ = writeln!(out, "Description: {}", chain.description);
    }
    let _ = writeln!(
        out,
        "Entry point: {}",
        chain.entry_point.as_deref().unwrap_or("<none>")
    );

    let _ = writeln!(out, "Nodes ({}):", chain.nodes.len());
    for node in &chain.nodes {
        let _ = write!(
            out,
            "  - {} [{}] {}",
            node.agent_id, node.agent_class, node.execution_mode
        );
        match node.execution_mode {
            ExecutionMode::Conditional => {
                if let Some(expr) = &node.condition {
                    let _ = write!(out, " if {}", expr);
                }
            }
            ExecutionMode::Loop => {
                if let Some(max) = node.max_iterations {
                    let _ = write!(out, " max {}", max);
                }
            }
            _ => {}
        }
        out.push('\n');
    }

    let _ = writeln!(out, "Connections ({}):", chain.connections.len());
    for conn in &chain.connections {
        let fields = conn
            .data_mapping
            .iter()
            .map(|(s, t)| format!("{} -> {}", s, t))
            .collect::<Vec<_>>()
            .join(", ");
        let _ = write!(
            out,
            "  - {} -> {} {{{}}}",
            conn.source_agent, conn.target_agent, fields
        );
        if let Some(t) = conn.transform {
            let _ = write!(out, " | transform: {}", t);
        }
        out.push('\n');
    }

    if !chain.metadata.is_empty() {
        let _ = writeln!(out, "Metadata:");
        for (k, v) in &chain.metadata {
            let _ = writeln!(out, "  {}: {}", k, v);
        }
    }
    out
}
