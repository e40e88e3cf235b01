pub mod big_five;
pub mod enneagram;
pub mod ifs_parts;
pub mod report;
pub mod text_features;
pub mod translation;
pub mod values;

use std::collections::BTreeMap;

use psyche_core::error::{PsycheError, Result};
use psyche_core::types::Payload;

/// Per-node construction parameters, as declared in the chain file.
pub type NodeConfig = BTreeMap<String, serde_json::Value>;

fn bad_config(agent_id: &str, key: &str, expected: &str) -> PsycheError {
    PsycheError::AgentInitialization {
        agent: agent_id.to_string(),
        message: format!("config '{}' must be {}", key, expected),
    }
}

pub(crate) fn config_str(agent_id: &str, config: &NodeConfig, key: &str) -> Result<Option<String>> {
    match config.get(key) {
        None => Ok(None),
        Some(v) => v
            .as_str()
            .map(|s| Some(s.to_string()))
            .ok_or_else(|| bad_config(agent_id, key, "a string")),
    }
}

pub(crate) fn config_usize(agent_id: &str, config: &NodeConfig, key: &str) -> Result<Option<usize>> {
    match config.get(key) {
        None => Ok(None),
        Some(v) => v
            .as_u64()
            .map(|n| Some(n as usize))
            .ok_or_else(|| bad_config(agent_id, key, "a non-negative integer")),
    }
}

pub(crate) fn config_f64(agent_id: &str, config: &NodeConfig, key: &str) -> Result<Option<f64>> {
    match config.get(key) {
        None => Ok(None),
        Some(v) => v
            .as_f64()
            .map(Some)
            .ok_or_else(|| bad_config(agent_id, key, "a number")),
    }
}

/// Require a non-empty `text` field.
pub(crate) fn require_text(payload: &Payload) -> Result<()> {
    match payload.get("text").and_then(|v| v.as_str()) {
        Some(t) if !t.trim().is_empty() => Ok(()),
        Some(_) => Err(PsycheError::InvalidInput("field 'text' is empty".into())),
        None => Err(PsycheError::InvalidInput(
            "missing required string field 'text'".into(),
        )),
    }
}

pub(crate) fn text_of(payload: &Payload) -> &str {
    payload.get("text").and_then(|v| v.as_str()).unwrap_or_default()
}

/// Render category scores as a JSON object.
pub(crate) fn scores_object(scores: &[(String, f64)]) -> serde_json::Value {
    serde_json::Value::Object(
        scores
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::json!(v)))
            .collect(),
    )
}

/// The framework agents' shared `min_confidence` handling.
pub(crate) fn flag_low_confidence(data: &mut Payload, confidence: f64, min_confidence: f64) {
    if confidence < min_confidence {
        data.insert("low_confidence".into(), serde_json::json!(true));
    }
}
