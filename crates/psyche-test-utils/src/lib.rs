//! Mock agents and fixtures shared by the workspace's tests.

use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use tempfile::NamedTempFile;

use psyche_core::error::{PsycheError, Result};
use psyche_core::traits::Agent;
use psyche_core::types::{AgentCapability, AgentMessage, AgentResponse, Payload, ITERATION_KEY};

/// Build a payload from `(key, value)` pairs.
pub fn payload<const N: usize>(pairs: [(&str, serde_json::Value); N]) -> Payload {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

/// Write `contents` to a temporary `.toml` file.
pub fn temp_toml(contents: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

fn mock_capability(id: &str) -> Vec<AgentCapability> {
    vec![AgentCapability::new(id, "Mock agent")]
}

// ── StaticAgent ─────────────────────────────────────────────────

/// Always succeeds with the same data.
pub struct StaticAgent {
    id: String,
    data: Payload,
    confidence: Option<f64>,
}

impl StaticAgent {
    pub fn new(id: &str, data: Payload) -> Self {
        Self {
            id: id.to_string(),
            data,
            confidence: None,
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }
}

impl Agent for StaticAgent {
    fn agent_id(&self) -> &str {
        &self.id
    }

    fn process(&self, _message: AgentMessage) -> BoxFuture<'_, Result<AgentResponse>> {
        Box::pin(async move {
            let response = AgentResponse::success(&self.id, self.data.clone());
            Ok(match self.confidence {
                Some(c) => response.with_confidence(c),
                None => response,
            })
        })
    }

    fn capabilities(&self) -> Vec<AgentCapability> {
        mock_capability(&self.id)
    }
}

// ── FailingAgent ────────────────────────────────────────────────

/// Reports failure, either as a failed response or as an `Err`.
pub struct FailingAgent {
    id: String,
    error: String,
    as_err: bool,
}

impl FailingAgent {
    pub fn new(id: &str, error: &str) -> Self {
        Self {
            id: id.to_string(),
            error: error.to_string(),
            as_err: false,
        }
    }

    /// Return `Err` from `process` instead of a failed response.
    pub fn erroring(id: &str, error: &str) -> Self {
        Self {
            as_err: true,
            ..Self::new(id, error)
        }
    }
}

impl Agent for FailingAgent {
    fn agent_id(&self) -> &str {
        &self.id
    }

    fn process(&self, _message: AgentMessage) -> BoxFuture<'_, Result<AgentResponse>> {
        Box::pin(async move {
            if self.as_err {
                return Err(PsycheError::AgentExecution {
                    agent: self.id.clone(),
                    message: self.error.clone(),
                });
            }
            Ok(AgentResponse::failure(&self.id, &self.error))
        })
    }

    fn capabilities(&self) -> Vec<AgentCapability> {
        mock_capability(&self.id)
    }
}

// ── SlowAgent ───────────────────────────────────────────────────

/// Sleeps before succeeding.
pub struct SlowAgent {
    id: String,
    delay: Duration,
    data: Payload,
}

impl SlowAgent {
    pub fn new(id: &str, delay: Duration) -> Self {
        Self {
            id: id.to_string(),
            delay,
            data: Payload::new(),
        }
    }

    pub fn with_data(mut self, data: Payload) -> Self {
        self.data = data;
        self
    }
}

impl Agent for SlowAgent {
    fn agent_id(&self) -> &str {
        &self.id
    }

    fn process(&self, _message: AgentMessage) -> BoxFuture<'_, Result<AgentResponse>> {
        Box::pin(async move {
            tokio::time::sleep(self.delay).await;
            Ok(AgentResponse::success(&self.id, self.data.clone()))
        })
    }

    fn capabilities(&self) -> Vec<AgentCapability> {
        mock_capability(&self.id)
    }
}

// ── PanickingAgent ──────────────────────────────────────────────

pub struct PanickingAgent {
    id: String,
}

impl PanickingAgent {
    pub fn new(id: &str) -> Self {
        Self { id: id.to_string() }
    }
}

impl Agent for PanickingAgent {
    fn agent_id(&self) -> &str {
        &self.id
    }

    fn process(&self, _message: AgentMessage) -> BoxFuture<'_, Result<AgentResponse>> {
        Box::pin(async move {
            if !self.id.is_empty() {
                panic!("{} blew up", self.id);
            }
            Ok(AgentResponse::success(&self.id, Payload::new()))
        })
    }

    fn capabilities(&self) -> Vec<AgentCapability> {
        mock_capability(&self.id)
    }
}

// ── EchoAgent ───────────────────────────────────────────────────

/// Echoes its payload back as data and records every message it receives.
pub struct EchoAgent {
    id: String,
    required: Option<String>,
    seen: Arc<Mutex<Vec<AgentMessage>>>,
}

impl EchoAgent {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            required: None,
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Reject payloads that lack `key` in `validate_input`.
    pub fn requiring(mut self, key: &str) -> Self {
        self.required = Some(key.to_string());
        self
    }

    /// Handle to the recorded messages, usable after the agent is moved into an `Arc`.
    pub fn recorder(&self) -> Arc<Mutex<Vec<AgentMessage>>> {
        self.seen.clone()
    }
}

impl Agent for EchoAgent {
    fn agent_id(&self) -> &str {
        &self.id
    }

    fn validate_input(&self, payload: &Payload) -> Result<()> {
        match &self.required {
            Some(key) if !payload.contains_key(key) => Err(PsycheError::InvalidInput(format!(
                "missing required field '{}'",
                key
            ))),
            _ => Ok(()),
        }
    }

    fn process(&self, message: AgentMessage) -> BoxFuture<'_, Result<AgentResponse>> {
        Box::pin(async move {
            let data = message.payload.clone();
            if let Ok(mut seen) = self.seen.lock() {
                seen.push(message);
            }
            Ok(AgentResponse::success(&self.id, data))
        })
    }

    fn capabilities(&self) -> Vec<AgentCapability> {
        mock_capability(&self.id)
    }
}

// ── LoopAgent ───────────────────────────────────────────────────

/// Counts iterations; reports `loop_complete` once `complete_after` is reached.
pub struct LoopAgent {
    id: String,
    complete_after: u64,
}

impl LoopAgent {
    pub fn new(id: &str, complete_after: u64) -> Self {
        Self {
            id: id.to_string(),
            complete_after,
        }
    }
}

impl Agent for LoopAgent {
    fn agent_id(&self) -> &str {
        &self.id
    }

    fn process(&self, message: AgentMessage) -> BoxFuture<'_, Result<AgentResponse>> {
        Box::pin(async move {
            let iteration = message
                .metadata
                .get(ITERATION_KEY)
                .and_then(|v| v.as_u64())
                .unwrap_or(1);
            let total = message
                .payload
                .get("total")
                .and_then(|v| v.as_u64())
                .unwrap_or(0);
            let data = payload([
                ("iteration", serde_json::json!(iteration)),
                ("total", serde_json::json!(total + iteration)),
                ("loop_complete", serde_json::json!(iteration >= self.complete_after)),
            ]);
            Ok(AgentResponse::success(&self.id, data))
        })
    }

    fn capabilities(&self) -> Vec<AgentCapability> {
        mock_capability(&self.id)
    }
}

// ── BrokenInitAgent ─────────────────────────────────────────────

/// Fails `initialize`.
pub struct BrokenInitAgent {
    id: String,
}

impl BrokenInitAgent {
    pub fn new(id: &str) -> Self {
        Self { id: id.to_string() }
    }
}

impl Agent for BrokenInitAgent {
    fn agent_id(&self) -> &str {
        &self.id
    }

    fn initialize(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move { Err(PsycheError::Config("reference tables missing".into())) })
    }

    fn process(&self, _message: AgentMessage) -> BoxFuture<'_, Result<AgentResponse>> {
        Box::pin(async move { Ok(AgentResponse::success(&self.id, Payload::new())) })
    }

    fn capabilities(&self) -> Vec<AgentCapability> {
        mock_capability(&self.id)
    }
}
