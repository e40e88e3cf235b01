use std::collections::HashMap;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Open key/value payload exchanged between agents.
pub type Payload = HashMap<String, serde_json::Value>;

/// Metadata key carrying the distance from the chain entry point.
pub const CHAIN_DEPTH_KEY: &str = "chain_depth";
/// Metadata key naming the node that produced this message's input.
pub const PREVIOUS_AGENT_KEY: &str = "previous_agent";
/// Metadata key naming the chain node a message is addressed to.
pub const NODE_ID_KEY: &str = "node_id";
/// Metadata key carrying the 1-based iteration index of a LOOP node.
pub const ITERATION_KEY: &str = "iteration";

/// Source id used for messages created by the engine or an API caller.
pub const SYSTEM_SOURCE: &str = "system";

/// A unit of work sent to an agent.
///
/// Messages are built fresh for every hop and never mutated after dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMessage {
    pub id: String,
    pub source_agent: String,
    #[serde(default)]
    pub payload: Payload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(default)]
    pub metadata: Payload,
    pub timestamp: DateTime<Utc>,
}

impl AgentMessage {
    pub fn new(source_agent: impl Into<String>, payload: Payload) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            source_agent: source_agent.into(),
            payload,
            correlation_id: None,
            metadata: Payload::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Stamp the hop bookkeeping shared by the engine and chainable agents.
    pub fn with_hop(mut self, chain_depth: u64, previous_agent: Option<&str>) -> Self {
        self.metadata
            .insert(CHAIN_DEPTH_KEY.into(), serde_json::json!(chain_depth));
        match previous_agent {
            Some(prev) => {
                self.metadata
                    .insert(PREVIOUS_AGENT_KEY.into(), serde_json::json!(prev));
            }
            None => {
                self.metadata.remove(PREVIOUS_AGENT_KEY);
            }
        }
        self
    }

    /// Build the message for the next hop after `from_agent` handled this one.
    ///
    /// Copies the correlation id and the remaining metadata, increments
    /// `chain_depth` and records `from_agent` as `previous_agent`.
    pub fn next_hop(&self, from_agent: &str, payload: Payload) -> AgentMessage {
        let mut next = AgentMessage::new(from_agent, payload);
        next.correlation_id = self.correlation_id.clone();
        next.metadata = self.metadata.clone();
        next.with_hop(self.chain_depth() + 1, Some(from_agent))
    }

    pub fn chain_depth(&self) -> u64 {
        self.metadata
            .get(CHAIN_DEPTH_KEY)
            .and_then(|v| v.as_u64())
            .unwrap_or(0)
    }

    pub fn previous_agent(&self) -> Option<&str> {
        self.metadata.get(PREVIOUS_AGENT_KEY).and_then(|v| v.as_str())
    }

    /// Get a payload value as a string, if it's a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(|v| v.as_str())
    }
}

/// An agent's result for one message.
///
/// On success `data` holds the result fields and `error` is `None`;
/// on failure `error` is set and `data` is empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResponse {
    pub success: bool,
    #[serde(default)]
    pub data: Payload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Wall-clock seconds spent in the invocation.
    #[serde(default)]
    pub processing_time: f64,
    pub agent_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl AgentResponse {
    pub fn success(agent_id: impl Into<String>, data: Payload) -> Self {
        Self {
            success: true,
            data,
            error: None,
            processing_time: 0.0,
            agent_id: agent_id.into(),
            confidence: None,
        }
    }

    pub fn failure(agent_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: Payload::new(),
            error: Some(error.into()),
            processing_time: 0.0,
            agent_id: agent_id.into(),
            confidence: None,
        }
    }

    /// Set the confidence, clamped to [0, 1]. NaN is dropped.
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = if confidence.is_nan() {
            None
        } else {
            Some(confidence.clamp(0.0, 1.0))
        };
        self
    }

    pub fn with_processing_time(mut self, seconds: f64) -> Self {
        self.processing_time = seconds;
        self
    }

    /// Record the time elapsed since `started` as the processing time.
    pub fn timed(self, started: Instant) -> Self {
        let secs = started.elapsed().as_secs_f64();
        self.with_processing_time(secs)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(|v| v.as_str())
    }
}

/// Static description of one operation an agent exposes.
///
/// Informational only: the engine never consults it for dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentCapability {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub input_schema: serde_json::Value,
    #[serde(default)]
    pub output_schema: serde_json::Value,
    /// Typical latency in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_latency_ms: Option<u64>,
}

impl AgentCapability {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema: serde_json::Value::Null,
            output_schema: serde_json::Value::Null,
            expected_latency_ms: None,
        }
    }

    pub fn with_input_schema(mut self, schema: serde_json::Value) -> Self {
        self.input_schema = schema;
        self
    }

    pub fn with_output_schema(mut self, schema: serde_json::Value) -> Self {
        self.output_schema = schema;
        self
    }

    pub fn with_expected_latency_ms(mut self, ms: u64) -> Self {
        self.expected_latency_ms = Some(ms);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_hop_metadata() {
        let mut payload = Payload::new();
        payload.insert("text".into(), serde_json::json!("hello"));
        let first = AgentMessage::new(SYSTEM_SOURCE, payload)
            .with_correlation_id("exec-1")
            .with_hop(0, None);

        let next = first.next_hop("translator", Payload::new());
        assert_eq!(next.source_agent, "translator");
        assert_eq!(next.correlation_id.as_deref(), Some("exec-1"));
        assert_eq!(next.chain_depth(), 1);
        assert_eq!(next.previous_agent(), Some("translator"));
        assert_ne!(next.id, first.id);

        let third = next.next_hop("features", Payload::new());
        assert_eq!(third.chain_depth(), 2);
        assert_eq!(third.previous_agent(), Some("features"));
    }

    #[test]
    fn test_with_hop_clears_previous_agent() {
        let msg = AgentMessage::new("api", Payload::new())
            .with_hop(2, Some("a"))
            .with_hop(3, None);
        assert_eq!(msg.chain_depth(), 3);
        assert!(msg.previous_agent().is_none());
    }

    #[test]
    fn test_response_confidence_is_clamped() {
        let r = AgentResponse::success("a", Payload::new()).with_confidence(1.7);
        assert_eq!(r.confidence, Some(1.0));
        let r = AgentResponse::success("a", Payload::new()).with_confidence(-0.2);
        assert_eq!(r.confidence, Some(0.0));
        let r = AgentResponse::success("a", Payload::new()).with_confidence(f64::NAN);
        assert_eq!(r.confidence, None);
    }

    #[test]
    fn test_failure_has_no_data() {
        let r = AgentResponse::failure("a", "boom");
        assert!(!r.success);
        assert!(r.data.is_empty());
        assert_eq!(r.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_capability_builder() {
        let cap = AgentCapability::new("translate", "Translate text")
            .with_input_schema(serde_json::json!({"type": "object"}))
            .with_expected_latency_ms(50);
        assert_eq!(cap.name, "translate");
        assert_eq!(cap.expected_latency_ms, Some(50));
        assert!(cap.output_schema.is_null());
    }
}
