use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use tokio::sync::RwLock;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use psyche_core::config::EngineConfig;
use psyche_core::error::{PsycheError, Result};
use psyche_core::traits::Agent;
use psyche_core::types::{
    AgentMessage, AgentResponse, Payload, ITERATION_KEY, NODE_ID_KEY, SYSTEM_SOURCE,
};

use super::builder::{dangling_endpoints, AgentFactory, ChainBuilder};
use super::chain::AgentChain;
use super::condition::evaluate_condition;
use super::execution::{Execution, ExecutionMetrics, ExecutionStatus, NodeExecution, NodeStatus};
use super::handoff::gather_inputs;
use super::node::{AgentNode, ExecutionMode};

/// Output key a LOOP node sets to `true` to stop iterating early.
pub const LOOP_COMPLETE_KEY: &str = "loop_complete";

/// Executes chains registered in a `ChainBuilder`.
///
/// The engine walks the graph from the entry point in dependency order.
/// Ready PARALLEL nodes that share the same upstream set are dispatched
/// together; everything else runs one node at a time. A node whose upstream
/// did not succeed is recorded as skipped and never invoked. A single
/// deadline covers the whole execution.
pub struct WorkflowEngine {
    builder: Arc<RwLock<ChainBuilder>>,
    agents: RwLock<HashMap<String, Arc<dyn Agent>>>,
    executions: RwLock<HashMap<String, Execution>>,
    config: EngineConfig,
    started: AtomicU64,
}

/// Everything a spawned node task needs.
struct NodeRun {
    node_id: String,
    mode: ExecutionMode,
    max_iterations: u32,
    validate_inputs: bool,
    message: AgentMessage,
}

/// How to obtain the agent for a node.
enum Resolution {
    Live(Arc<dyn Agent>),
    Factory(AgentFactory),
}

impl WorkflowEngine {
    pub fn new(builder: Arc<RwLock<ChainBuilder>>, config: EngineConfig) -> Self {
        Self {
            builder,
            agents: RwLock::new(HashMap::new()),
            executions: RwLock::new(HashMap::new()),
            config,
            started: AtomicU64::new(0),
        }
    }

    pub fn builder(&self) -> &Arc<RwLock<ChainBuilder>> {
        &self.builder
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Initialize a live agent and make it dispatchable under its agent id.
    ///
    /// Nodes whose `agent_id` matches use this instance instead of a
    /// factory-built one.
    pub async fn register_agent(&self, agent: Arc<dyn Agent>) -> Result<()> {
        let agent_id = agent.agent_id().to_string();
        agent
            .initialize()
            .await
            .map_err(|e| PsycheError::AgentInitialization {
                agent: agent_id.clone(),
                message: e.to_string(),
            })?;
        info!(agent_id = %agent_id, "Agent registered");
        self.agents.write().await.insert(agent_id, agent);
        Ok(())
    }

    pub async fn unregister_agent(&self, agent_id: &str) -> bool {
        self.agents.write().await.remove(agent_id).is_some()
    }

    /// Run a chain against `input_data`.
    ///
    /// Setup problems (unknown chain, malformed graph, unresolvable or
    /// failing-to-initialize agents) return `Err` before an execution is
    /// created. Node failures and timeouts never do: they are reported in the
    /// returned `Execution`.
    pub async fn execute_chain(
        &self,
        chain_id: &str,
        input_data: Payload,
        user_id: Option<&str>,
        timeout: Option<Duration>,
    ) -> Result<Execution> {
        let (chain, resolutions) = {
            let builder = self.builder.read().await;
            let chain = builder
                .get_chain(chain_id)
                .cloned()
                .ok_or_else(|| PsycheError::ChainNotFound(chain_id.to_string()))?;
            check_runnable(&chain)?;
            let resolutions = self.resolve(&builder, &chain).await?;
            (chain, resolutions)
        };
        let agents = instantiate(&chain, resolutions).await?;

        let timeout = timeout.unwrap_or_else(|| self.config.default_timeout());
        let mut execution = Execution::new(chain_id, user_id);
        execution.start();
        self.started.fetch_add(1, Ordering::Relaxed);
        self.store(&execution).await;

        info!(
            execution_id = %execution.execution_id,
            chain_id,
            timeout_ms = timeout.as_millis() as u64,
            "Execution started"
        );

        let deadline = deadline_after(timeout);
        let timed_out = self
            .run_graph(&chain, &agents, &input_data, &mut execution, deadline)
            .await;

        if timed_out {
            warn!(
                execution_id = %execution.execution_id,
                completed_nodes = execution.node_executions.len(),
                "Execution timed out"
            );
            execution.finish(
                ExecutionStatus::TimedOut,
                Some(format!(
                    "execution exceeded timeout of {:.3}s",
                    timeout.as_secs_f64()
                )),
            );
        } else {
            let entry = chain.entry_point.as_deref().unwrap_or_default();
            let entry_ok = execution.node(entry).is_some_and(|n| n.success);
            if entry_ok {
                execution.finish(ExecutionStatus::Completed, None);
            } else {
                let summary = execution
                    .first_failure()
                    .map(|n| {
                        format!(
                            "node '{}' {}: {}",
                            n.node_id,
                            if n.status == NodeStatus::Skipped { "skipped" } else { "failed" },
                            n.error.as_deref().unwrap_or("unknown error")
                        )
                    })
                    .unwrap_or_else(|| format!("entry node '{}' did not run", entry));
                execution.finish(ExecutionStatus::Failed, Some(summary));
            }
        }

        info!(
            execution_id = %execution.execution_id,
            status = %execution.status,
            nodes = execution.node_executions.len(),
            "Execution finished"
        );
        self.store(&execution).await;
        Ok(execution)
    }

    /// Walk the graph. Returns true if the deadline expired.
    async fn run_graph(
        &self,
        chain: &AgentChain,
        agents: &HashMap<String, Arc<dyn Agent>>,
        input_data: &Payload,
        execution: &mut Execution,
        deadline: Instant,
    ) -> bool {
        let order: HashMap<&str, usize> = chain
            .nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.agent_id.as_str(), i))
            .collect();
        let depths = chain.depths();
        let reachable: HashSet<&str> = depths.keys().map(|k| k.as_str()).collect();

        let mut waiting: HashMap<String, usize> = depths
            .keys()
            .map(|id| {
                let deps = chain
                    .upstream(id)
                    .iter()
                    .filter(|u| reachable.contains(u.as_str()))
                    .count();
                (id.clone(), deps)
            })
            .collect();
        let mut ready: Vec<String> = waiting
            .iter()
            .filter(|(_, deps)| **deps == 0)
            .map(|(id, _)| id.clone())
            .collect();
        let mut outputs: HashMap<String, Payload> = HashMap::new();

        while !ready.is_empty() {
            if Instant::now() >= deadline {
                return true;
            }

            ready.sort_by_key(|id| order.get(id.as_str()).copied().unwrap_or(usize::MAX));
            let batch = take_batch(chain, &mut ready);
            debug!(
                execution_id = %execution.execution_id,
                batch = ?batch,
                "Dispatching batch"
            );

            let mut tasks = JoinSet::new();
            let mut finished: Vec<String> = Vec::new();

            for node_id in &batch {
                let Some(node) = chain.node(node_id) else {
                    continue;
                };
                let upstream = chain.upstream(node_id);

                if let Some(failed) = upstream.iter().find(|u| {
                    reachable.contains(u.as_str())
                        && !execution.node(u).is_some_and(|n| n.success)
                }) {
                    debug!(node_id = %node_id, upstream = %failed, "Skipping node, upstream did not succeed");
                    execution.record(NodeExecution::skipped(
                        node_id.clone(),
                        format!("upstream node '{}' did not succeed", failed),
                    ));
                    finished.push(node_id.clone());
                    continue;
                }

                let is_entry = chain.entry_point.as_deref() == Some(node_id.as_str());
                let payload = gather_inputs(
                    is_entry.then_some(input_data),
                    chain.inbound(node_id),
                    &outputs,
                )
                .into_payload();

                if node.execution_mode == ExecutionMode::Conditional {
                    let expr = node.condition.as_deref().unwrap_or_default();
                    if !evaluate_condition(expr, &payload) {
                        debug!(node_id = %node_id, condition = %expr, "Condition not met");
                        execution.record(NodeExecution::skipped(
                            node_id.clone(),
                            format!("condition not met: {}", expr),
                        ));
                        finished.push(node_id.clone());
                        continue;
                    }
                }

                let Some(agent) = agents.get(node_id).cloned() else {
                    execution.record(NodeExecution::from_response(
                        node_id.clone(),
                        AgentResponse::failure(node_id.clone(), "no agent resolved for node"),
                        Utc::now(),
                        0,
                        0,
                    ));
                    finished.push(node_id.clone());
                    continue;
                };

                let previous = (upstream.len() == 1).then(|| upstream[0].as_str());
                let message = AgentMessage::new(previous.unwrap_or(SYSTEM_SOURCE), payload)
                    .with_correlation_id(execution.execution_id.clone())
                    .with_metadata("chain_id", serde_json::json!(chain.chain_id))
                    .with_metadata(NODE_ID_KEY, serde_json::json!(node_id))
                    .with_hop(depths.get(node_id).copied().unwrap_or(0), previous);

                let run = NodeRun {
                    node_id: node_id.clone(),
                    mode: node.execution_mode,
                    max_iterations: loop_bound(node, &self.config),
                    validate_inputs: self.config.validate_inputs,
                    message,
                };
                tasks.spawn(invoke_node(agent, run));
            }

            for node_id in &finished {
                self.store_node(execution, node_id).await;
            }

            while !tasks.is_empty() {
                match tokio::time::timeout_at(deadline, tasks.join_next()).await {
                    Ok(Some(Ok(record))) => {
                        if record.success {
                            outputs.insert(record.node_id.clone(), record.output_data.clone());
                        }
                        debug!(
                            node_id = %record.node_id,
                            success = record.success,
                            elapsed_ms = record.elapsed_ms,
                            "Node execution complete"
                        );
                        let node_id = record.node_id.clone();
                        execution.record(record);
                        self.store_node(execution, &node_id).await;
                        finished.push(node_id);
                    }
                    Ok(Some(Err(e))) => {
                        error!(error = %e, "Node task was cancelled");
                    }
                    Ok(None) => break,
                    Err(_) => {
                        tasks.abort_all();
                        return true;
                    }
                }
            }

            for node_id in &finished {
                waiting.remove(node_id);
                // A target connected twice to the same upstream only waits once.
                let mut released = HashSet::new();
                for conn in chain.outbound(node_id) {
                    let target = conn.target_agent.as_str();
                    if !reachable.contains(target) || !released.insert(target) {
                        continue;
                    }
                    if let Some(deps) = waiting.get_mut(target) {
                        *deps = deps.saturating_sub(1);
                        if *deps == 0 && !ready.iter().any(|r| r == target) {
                            ready.push(target.to_string());
                        }
                    }
                }
            }
            ready.retain(|id| !execution.node_executions.contains_key(id));
        }

        false
    }

    /// Look up a live instance or factory for every reachable node.
    async fn resolve(
        &self,
        builder: &ChainBuilder,
        chain: &AgentChain,
    ) -> Result<Vec<(String, Resolution)>> {
        let live = self.agents.read().await;
        chain
            .reachable()
            .into_iter()
            .map(|id| {
                let node = chain
                    .node(&id)
                    .ok_or_else(|| PsycheError::InvalidChain(format!("node '{}' vanished", id)))?;
                if let Some(agent) = live.get(&id) {
                    return Ok((id, Resolution::Live(agent.clone())));
                }
                match builder.factory(&node.agent_class) {
                    Some(factory) => Ok((id, Resolution::Factory(factory))),
                    None => Err(PsycheError::AgentClassNotRegistered(format!(
                        "{} (node '{}')",
                        node.agent_class, node.agent_id
                    ))),
                }
            })
            .collect()
    }

    pub async fn get_execution(&self, execution_id: &str) -> Option<Execution> {
        self.executions.read().await.get(execution_id).cloned()
    }

    /// Retained executions, oldest first, optionally filtered by status.
    pub async fn list_executions(&self, status: Option<ExecutionStatus>) -> Vec<Execution> {
        let mut list: Vec<Execution> = self
            .executions
            .read()
            .await
            .values()
            .filter(|e| status.map_or(true, |s| e.status == s))
            .cloned()
            .collect();
        list.sort_by_key(|e| e.started_at);
        list
    }

    pub async fn get_execution_metrics(&self) -> ExecutionMetrics {
        let executions = self.executions.read().await;
        let count = |s: ExecutionStatus| executions.values().filter(|e| e.status == s).count();
        ExecutionMetrics {
            total_executions: self.started.load(Ordering::Relaxed),
            active_executions: count(ExecutionStatus::Running),
            registered_agents: self.agents.read().await.len(),
            completed: count(ExecutionStatus::Completed),
            failed: count(ExecutionStatus::Failed),
            timed_out: count(ExecutionStatus::TimedOut),
        }
    }

    /// Insert or replace an execution, evicting the oldest finished ones over the cap.
    async fn store(&self, execution: &Execution) {
        let mut executions = self.executions.write().await;
        executions.insert(execution.execution_id.clone(), execution.clone());

        let cap = self.config.max_retained_executions.max(1);
        if executions.len() > cap {
            let mut evictable: Vec<(String, chrono::DateTime<Utc>)> = executions
                .values()
                .filter(|e| e.is_terminal())
                .map(|e| (e.execution_id.clone(), e.started_at))
                .collect();
            evictable.sort_by_key(|(_, t)| *t);

            let to_remove = executions.len() - cap;
            for (id, _) in evictable.into_iter().take(to_remove) {
                executions.remove(&id);
                debug!(execution_id = %id, "Evicted old execution");
            }
        }
    }

    /// Publish one node record so in-flight executions can be inspected.
    async fn store_node(&self, execution: &Execution, node_id: &str) {
        let Some(record) = execution.node(node_id) else {
            return;
        };
        if let Some(stored) = self
            .executions
            .write()
            .await
            .get_mut(&execution.execution_id)
        {
            stored.record(record.clone());
        }
    }
}

/// Reject graphs that cannot run at all.
fn check_runnable(chain: &AgentChain) -> Result<()> {
    let entry = chain
        .entry_point
        .as_deref()
        .ok_or_else(|| PsycheError::InvalidChain(format!("chain '{}' has no entry point", chain.chain_id)))?;
    if !chain.has_node(entry) {
        return Err(PsycheError::InvalidChain(format!(
            "entry point '{}' does not exist",
            entry
        )));
    }
    if let Some(problem) = dangling_endpoints(chain).into_iter().next() {
        return Err(PsycheError::InvalidChain(problem));
    }
    if let Some(cycle) = chain.find_cycle() {
        return Err(PsycheError::InvalidChain(format!(
            "cycle detected: {}",
            cycle.join(" -> ")
        )));
    }
    if let Some(node) = chain
        .nodes
        .iter()
        .find(|n| n.execution_mode == ExecutionMode::Conditional && n.condition.is_none())
    {
        return Err(PsycheError::InvalidChain(format!(
            "conditional node '{}' has no condition",
            node.agent_id
        )));
    }
    Ok(())
}

/// Build and initialize factory-backed agents; live ones are used as-is.
async fn instantiate(
    chain: &AgentChain,
    resolutions: Vec<(String, Resolution)>,
) -> Result<HashMap<String, Arc<dyn Agent>>> {
    let mut agents = HashMap::new();
    for (node_id, resolution) in resolutions {
        let agent = match resolution {
            Resolution::Live(agent) => agent,
            Resolution::Factory(factory) => {
                let config = chain
                    .node(&node_id)
                    .map(|n| n.config.clone())
                    .unwrap_or_default();
                let agent = factory(&node_id, &config)?;
                agent
                    .initialize()
                    .await
                    .map_err(|e| PsycheError::AgentInitialization {
                        agent: node_id.clone(),
                        message: e.to_string(),
                    })?;
                agent
            }
        };
        agents.insert(node_id, agent);
    }
    Ok(agents)
}

/// Take the next batch off the (sorted) ready list.
///
/// A PARALLEL head pulls in every ready PARALLEL node with the same upstream
/// set; any other head runs alone.
fn take_batch(chain: &AgentChain, ready: &mut Vec<String>) -> Vec<String> {
    let head = ready.remove(0);
    let is_parallel = |id: &str| {
        chain
            .node(id)
            .is_some_and(|n| n.execution_mode == ExecutionMode::Parallel)
    };
    if !is_parallel(&head) {
        return vec![head];
    }

    let upstream_set = |id: &str| {
        let mut ups = chain.upstream(id);
        ups.sort();
        ups
    };
    let key = upstream_set(&head);
    let mut batch = vec![head];
    ready.retain(|id| {
        if is_parallel(id) && upstream_set(id) == key {
            batch.push(id.clone());
            false
        } else {
            true
        }
    });
    batch
}

fn loop_bound(node: &AgentNode, config: &EngineConfig) -> u32 {
    match node.execution_mode {
        ExecutionMode::Loop => node
            .max_iterations
            .unwrap_or(config.default_max_iterations)
            .max(1),
        _ => 1,
    }
}

/// Invoke one node's agent, converting errors and panics into a failed record.
async fn invoke_node(agent: Arc<dyn Agent>, run: NodeRun) -> NodeExecution {
    let started_at = Utc::now();
    let start = std::time::Instant::now();
    let node_id = run.node_id.clone();
    let agent_id = agent.agent_id().to_string();

    let outcome = AssertUnwindSafe(drive(agent, run)).catch_unwind().await;
    let (response, iterations) = match outcome {
        Ok(result) => result,
        Err(panic) => {
            let reason = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!(node_id = %node_id, reason = %reason, "Agent panicked");
            (
                AgentResponse::failure(agent_id, format!("agent panicked: {}", reason)),
                1,
            )
        }
    };

    let elapsed_ms = start.elapsed().as_millis() as u64;
    let response = response.timed(start);
    if !response.success {
        warn!(
            node_id = %node_id,
            error = response.error.as_deref().unwrap_or_default(),
            "Node failed"
        );
    }
    NodeExecution::from_response(node_id, response, started_at, elapsed_ms, iterations)
}

async fn drive(agent: Arc<dyn Agent>, run: NodeRun) -> (AgentResponse, u32) {
    let agent_id = agent.agent_id().to_string();

    if run.validate_inputs {
        if let Err(e) = agent.validate_input(&run.message.payload) {
            return (AgentResponse::failure(agent_id, e.to_string()), 0);
        }
    }

    let mut payload = run.message.payload.clone();
    let mut last = AgentResponse::failure(agent_id.clone(), "agent was not invoked");
    let mut iterations = 0;

    while iterations < run.max_iterations {
        iterations += 1;
        let mut message = run.message.clone();
        message.payload = payload.clone();
        if run.mode == ExecutionMode::Loop {
            message = message.with_metadata(ITERATION_KEY, serde_json::json!(iterations));
        }

        last = match agent.process(message).await {
            Ok(response) => response,
            Err(e) => AgentResponse::failure(agent_id.clone(), e.to_string()),
        };

        if !last.success || run.mode != ExecutionMode::Loop {
            break;
        }
        if last
            .data
            .get(LOOP_COMPLETE_KEY)
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
        {
            debug!(node_id = %run.node_id, iterations, "Loop completed early");
            break;
        }
        for (k, v) in &last.data {
            payload.insert(k.clone(), v.clone());
        }
    }

    (last, iterations)
}

/// Deadline `timeout` from now. Timeouts past what `Instant` can represent
/// (`Duration::MAX` included) are treated as roughly thirty years.
fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout)
        .unwrap_or_else(|| now + Duration::from_secs(86_400 * 365 * 30))
}
