//! Chain graphs: definition, authoring, and execution.
//!
//! A chain is a directed graph of `AgentNode`s joined by `ChainConnection`s.
//! Each connection maps fields of the source node's output onto the target
//! node's input, optionally through a `Transform`.
//!
//! `ChainBuilder` owns the chain and agent-type registries. `WorkflowEngine`
//! walks a chain from its entry point, dispatching ready nodes (PARALLEL
//! siblings concurrently), skipping dependents of failed nodes, and recording
//! every outcome in an `Execution`.

pub mod builder;
pub mod chain;
pub mod condition;
pub mod edge;
pub mod execution;
pub mod executor;
pub mod format;
pub mod handoff;
pub mod node;

pub use builder::{AgentFactory, ChainBuilder, NodeSpec};
pub use chain::AgentChain;
pub use condition::evaluate_condition;
pub use edge::{mapping, ChainConnection, Transform};
pub use execution::{Execution, ExecutionMetrics, ExecutionStatus, NodeExecution, NodeStatus};
pub use executor::{WorkflowEngine, LOOP_COMPLETE_KEY};
pub use format::ChainFormat;
pub use handoff::{gather_inputs, HandoffContext};
pub use node::{AgentNode, ExecutionMode};
