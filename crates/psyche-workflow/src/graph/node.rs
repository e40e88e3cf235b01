use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// How a node is scheduled relative to its siblings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Runs on its own once its dependencies are done.
    #[default]
    #[serde(alias = "SEQUENTIAL")]
    Sequential,
    /// Batched with ready PARALLEL siblings that share the same upstream set.
    #[serde(alias = "PARALLEL")]
    Parallel,
    /// Runs only when `condition` holds over the merged input payload.
    #[serde(alias = "CONDITIONAL")]
    Conditional,
    /// Re-invoked up to `max_iterations` times, feeding each output back in.
    #[serde(alias = "LOOP")]
    Loop,
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ExecutionMode::Sequential => "SEQUENTIAL",
            ExecutionMode::Parallel => "PARALLEL",
            ExecutionMode::Conditional => "CONDITIONAL",
            ExecutionMode::Loop => "LOOP",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for ExecutionMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sequential" => Ok(ExecutionMode::Sequential),
            "parallel" => Ok(ExecutionMode::Parallel),
            "conditional" => Ok(ExecutionMode::Conditional),
            "loop" => Ok(ExecutionMode::Loop),
            other => Err(format!("unknown execution mode '{}'", other)),
        }
    }
}

/// One agent placement within a chain.
///
/// `inputs` and `outputs` are derived from the chain's connections and
/// kept in sync by the builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentNode {
    /// Unique identifier within the chain.
    pub agent_id: String,
    /// Registered agent type used to construct this node's agent.
    pub agent_class: String,
    #[serde(default)]
    pub execution_mode: ExecutionMode,
    /// Expression evaluated for CONDITIONAL nodes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    /// Iteration bound for LOOP nodes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<u32>,
    /// Upstream node ids.
    #[serde(default)]
    pub inputs: Vec<String>,
    /// Downstream node ids.
    #[serde(default)]
    pub outputs: Vec<String>,
    /// Construction-time parameters for the agent instance.
    #[serde(default)]
    pub config: BTreeMap<String, serde_json::Value>,
}

impl AgentNode {
    pub fn new(agent_id: impl Into<String>, agent_class: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            agent_class: agent_class.into(),
            execution_mode: ExecutionMode::Sequential,
            condition: None,
            max_iterations: None,
            inputs: vec![],
            outputs: vec![],
            config: BTreeMap::new(),
        }
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.execution_mode = mode;
        self
    }

    pub fn with_config(mut self, config: BTreeMap<String, serde_json::Value>) -> Self {
        self.config = config;
        self
    }

    /// Make this a CONDITIONAL node guarded by `expr`.
    pub fn with_condition(mut self, expr: impl Into<String>) -> Self {
        self.execution_mode = ExecutionMode::Conditional;
        self.condition = Some(expr.into());
        self
    }

    /// Make this a LOOP node bounded by `max_iterations`.
    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.execution_mode = ExecutionMode::Loop;
        self.max_iterations = Some(max_iterations);
        self
    }

    pub(crate) fn add_input(&mut self, id: &str) {
        if !self.inputs.iter().any(|i| i == id) {
            self.inputs.push(id.to_string());
        }
    }

    pub(crate) fn add_output(&mut self, id: &str) {
        if !self.outputs.iter().any(|o| o == id) {
            self.outputs.push(id.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_builder() {
        let mut config = BTreeMap::new();
        config.insert("language".into(), serde_json::json!("he"));
        let node = AgentNode::new("translate", "translation")
            .with_mode(ExecutionMode::Parallel)
            .with_config(config);

        assert_eq!(node.agent_id, "translate");
        assert_eq!(node.agent_class, "translation");
        assert_eq!(node.execution_mode, ExecutionMode::Parallel);
        assert_eq!(node.config["language"], serde_json::json!("he"));
        assert!(node.inputs.is_empty());
    }

    #[test]
    fn test_condition_and_loop_set_mode() {
        let node = AgentNode::new("n", "x").with_condition(r#"lang == "he""#);
        assert_eq!(node.execution_mode, ExecutionMode::Conditional);
        assert!(node.condition.is_some());

        let node = AgentNode::new("n", "x").with_max_iterations(4);
        assert_eq!(node.execution_mode, ExecutionMode::Loop);
        assert_eq!(node.max_iterations, Some(4));
    }

    #[test]
    fn test_inputs_outputs_deduplicated() {
        let mut node = AgentNode::new("n", "x");
        node.add_input("a");
        node.add_input("a");
        node.add_output("b");
        node.add_output("b");
        assert_eq!(node.inputs, vec!["a"]);
        assert_eq!(node.outputs, vec!["b"]);
    }

    #[test]
    fn test_mode_parsing_and_aliases() {
        assert_eq!("LOOP".parse::<ExecutionMode>().unwrap(), ExecutionMode::Loop);
        assert_eq!("parallel".parse::<ExecutionMode>().unwrap(), ExecutionMode::Parallel);
        assert!("fan_out".parse::<ExecutionMode>().is_err());

        let mode: ExecutionMode = serde_json::from_str(r#""CONDITIONAL""#).unwrap();
        assert_eq!(mode, ExecutionMode::Conditional);
        assert_eq!(serde_json::to_string(&mode).unwrap(), r#""conditional""#);
    }
}
