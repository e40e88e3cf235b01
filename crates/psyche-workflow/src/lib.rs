pub mod chainable;
pub mod graph;
pub mod session;

pub use chainable::{ChainLinks, Chainable};
pub use graph::{
    AgentChain, AgentNode, ChainBuilder, ChainConnection, ChainFormat, Execution,
    ExecutionMetrics, ExecutionMode, ExecutionStatus, NodeExecution, NodeSpec, NodeStatus,
    Transform, WorkflowEngine,
};
pub use session::{MemorySessionStore, SafetyLevel, SessionState, SessionTurnRunner, TurnOutcome};
