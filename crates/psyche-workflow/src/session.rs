use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use psyche_core::error::{PsycheError, Result};
use psyche_core::traits::SessionStore;
use psyche_core::types::Payload;

use crate::graph::execution::{Execution, ExecutionStatus};
use crate::graph::executor::WorkflowEngine;

/// Input key under which the current session state is handed to the chain.
pub const SESSION_KEY: &str = "session";
/// Output field a node sets to raise the session's safety level.
pub const SAFETY_LEVEL_KEY: &str = "safety_level";
/// Deepest level a multi-turn session can reach.
pub const MAX_DEPTH_LEVEL: u8 = 5;

/// Severity reported by safety-aware agents. Ordered from least to most severe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SafetyLevel {
    #[default]
    Low,
    Moderate,
    High,
    Crisis,
}

impl std::fmt::Display for SafetyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SafetyLevel::Low => "low",
            SafetyLevel::Moderate => "moderate",
            SafetyLevel::High => "high",
            SafetyLevel::Crisis => "crisis",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for SafetyLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(SafetyLevel::Low),
            "moderate" | "medium" => Ok(SafetyLevel::Moderate),
            "high" => Ok(SafetyLevel::High),
            "crisis" => Ok(SafetyLevel::Crisis),
            other => Err(format!("unknown safety level: {}", other)),
        }
    }
}

/// State carried across the turns of one multi-turn session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub turn_count: u32,
    #[serde(default = "default_depth")]
    pub depth_level: u8,
    #[serde(default)]
    pub safety_level: SafetyLevel,
    /// Latest successful output of every node, keyed by node id.
    #[serde(default)]
    pub accumulated: BTreeMap<String, Payload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_execution_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_depth() -> u8 {
    1
}

impl SessionState {
    pub fn new(session_id: impl Into<String>, user_id: Option<&str>) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            user_id: user_id.map(String::from),
            turn_count: 0,
            depth_level: default_depth(),
            safety_level: SafetyLevel::Low,
            accumulated: BTreeMap::new(),
            last_execution_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Fold one finished execution into the session.
    pub fn apply(&mut self, execution: &Execution) {
        self.turn_count += 1;
        if execution.status == ExecutionStatus::Completed {
            self.depth_level = (self.depth_level + 1).min(MAX_DEPTH_LEVEL);
        }
        for node_id in &execution.execution_order {
            let Some(record) = execution.node(node_id) else {
                continue;
            };
            if !record.success {
                continue;
            }
            if let Some(level) = record
                .output_data
                .get(SAFETY_LEVEL_KEY)
                .and_then(|v| v.as_str())
                .and_then(|s| s.parse::<SafetyLevel>().ok())
            {
                self.safety_level = self.safety_level.max(level);
            }
            self.accumulated
                .insert(node_id.clone(), record.output_data.clone());
        }
        self.last_execution_id = Some(execution.execution_id.clone());
        self.updated_at = Utc::now();
    }

    fn to_value(&self) -> Result<serde_json::Value> {
        serde_json::to_value(self).map_err(|e| PsycheError::Session(e.to_string()))
    }

    fn from_value(value: serde_json::Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| PsycheError::Session(e.to_string()))
    }
}

/// In-process `SessionStore`.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, serde_json::Value>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, session_id: &str) -> BoxFuture<'_, Result<Option<serde_json::Value>>> {
        let session_id = session_id.to_string();
        Box::pin(async move { Ok(self.sessions.read().await.get(&session_id).cloned()) })
    }

    fn put(&self, session_id: &str, state: serde_json::Value) -> BoxFuture<'_, Result<()>> {
        let session_id = session_id.to_string();
        Box::pin(async move {
            self.sessions.write().await.insert(session_id, state);
            Ok(())
        })
    }
}

/// Result of one session turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub execution: Execution,
    pub state: SessionState,
}

/// Runs chains as turns of a persistent session.
///
/// State is read from the store before the turn and written back after it,
/// whatever the execution's final status.
pub struct SessionTurnRunner {
    engine: Arc<WorkflowEngine>,
    store: Arc<dyn SessionStore>,
}

impl SessionTurnRunner {
    pub fn new(engine: Arc<WorkflowEngine>, store: Arc<dyn SessionStore>) -> Self {
        Self { engine, store }
    }

    pub async fn load(&self, session_id: &str) -> Result<Option<SessionState>> {
        self.store
            .get(session_id)
            .await?
            .map(SessionState::from_value)
            .transpose()
    }

    pub async fn run_turn(
        &self,
        session_id: &str,
        chain_id: &str,
        mut input: Payload,
        user_id: Option<&str>,
        timeout: Option<Duration>,
    ) -> Result<TurnOutcome> {
        let mut state = match self.load(session_id).await? {
            Some(state) => state,
            None => {
                debug!(session_id, "Starting new session");
                SessionState::new(session_id, user_id)
            }
        };

        input.insert(SESSION_KEY.to_string(), state.to_value()?);
        let execution = self
            .engine
            .execute_chain(chain_id, input, user_id.or(state.user_id.as_deref()), timeout)
            .await?;

        state.apply(&execution);
        self.store.put(session_id, state.to_value()?).await?;

        info!(
            session_id,
            turn = state.turn_count,
            depth_level = state.depth_level,
            safety_level = %state.safety_level,
            "Session turn recorded"
        );
        Ok(TurnOutcome { execution, state })
    }
}
