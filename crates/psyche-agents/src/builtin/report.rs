use futures::future::BoxFuture;

use psyche_core::error::{PsycheError, Result};
use psyche_core::traits::Agent;
use psyche_core::types::{AgentCapability, AgentMessage, AgentResponse, Payload};

use crate::lexicon::round3;

/// Payload keys that are context rather than profile data.
const CONTEXT_KEYS: &[&str] = &["text", "session"];

fn first_of<'a>(payload: &'a Payload, keys: &[&str]) -> Option<&'a serde_json::Value> {
    keys.iter()
        .filter_map(|k| payload.get(*k))
        .find(|v| !v.is_null())
}

fn as_display(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Array(items) => items
            .iter()
            .map(as_display)
            .collect::<Vec<_>>()
            .join(", "),
        other => other.to_string(),
    }
}

/// Deterministic one-paragraph summary of the recognised profile fields.
pub fn summarize(payload: &Payload) -> String {
    let mut parts = Vec::new();

    if let Some(t) = first_of(payload, &["enneagram_type", "primary_type"]) {
        let mut s = format!("Enneagram type {}", as_display(t));
        if let Some(w) = first_of(payload, &["enneagram_wing", "wing"]) {
            s.push_str(&format!(" (wing {})", as_display(w)));
        }
        parts.push(s);
    }
    if let Some(t) = first_of(payload, &["dominant_trait"]) {
        parts.push(format!("Dominant Big Five trait: {}", as_display(t)));
    }
    if let Some(v) = first_of(payload, &["top_values"]) {
        let shown = as_display(v);
        if !shown.is_empty() {
            parts.push(format!("Top values: {}", shown));
        }
    }
    if let Some(p) = first_of(payload, &["dominant_part"]) {
        parts.push(format!("Dominant part: {}", as_display(p)));
    }
    if let Some(s) = first_of(payload, &["sentiment"]) {
        parts.push(format!("Overall sentiment: {}", as_display(s)));
    }
    if let Some(level) = first_of(payload, &["safety_level"]) {
        parts.push(format!("Safety level: {}", as_display(level)));
    }

    if parts.is_empty() {
        "No profile data available.".to_string()
    } else {
        format!("{}.", parts.join(". "))
    }
}

/// Mean of every numeric field whose name ends in `confidence`.
fn mean_confidence(payload: &Payload) -> Option<f64> {
    let values: Vec<f64> = payload
        .iter()
        .filter(|(k, _)| k.ends_with("confidence"))
        .filter_map(|(_, v)| v.as_f64())
        .collect();
    if values.is_empty() {
        return None;
    }
    Some(round3(values.iter().sum::<f64>() / values.len() as f64))
}

// ── ReportAgent ─────────────────────────────────────────────────

/// Aggregates whatever upstream results were mapped into it.
pub struct ReportAgent {
    id: String,
}

impl ReportAgent {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    fn build(&self, payload: &Payload) -> AgentResponse {
        let profile: serde_json::Map<String, serde_json::Value> = payload
            .iter()
            .filter(|(k, _)| !CONTEXT_KEYS.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let mut data = Payload::new();
        data.insert("summary".into(), serde_json::json!(summarize(payload)));
        data.insert("profile".into(), serde_json::Value::Object(profile));
        if let Some(level) = payload.get("safety_level") {
            data.insert("safety_level".into(), level.clone());
        }

        let response = AgentResponse::success(&self.id, data);
        match mean_confidence(payload) {
            Some(c) => response.with_confidence(c),
            None => response,
        }
    }
}

impl Agent for ReportAgent {
    fn agent_id(&self) -> &str {
        &self.id
    }

    fn validate_input(&self, payload: &Payload) -> Result<()> {
        if payload.keys().all(|k| CONTEXT_KEYS.contains(&k.as_str())) {
            return Err(PsycheError::InvalidInput(
                "no upstream results to report".into(),
            ));
        }
        Ok(())
    }

    fn process(&self, message: AgentMessage) -> BoxFuture<'_, Result<AgentResponse>> {
        Box::pin(async move { Ok(self.build(&message.payload)) })
    }

    fn capabilities(&self) -> Vec<AgentCapability> {
        vec![AgentCapability::new("report", "Summarize mapped assessment results.")
            .with_output_schema(serde_json::json!({
                "type": "object",
                "properties": {
                    "summary": { "type": "string" },
                    "profile": { "type": "object" }
                }
            }))]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use psyche_test_utils::payload;
    use serde_json::json;

    #[test]
    fn test_summary_is_deterministic() {
        let p = payload([
            ("enneagram_type", json!(4)),
            ("enneagram_wing", json!(5)),
            ("dominant_trait", json!("openness")),
            ("top_values", json!(["benevolence", "universalism"])),
            ("dominant_part", json!("exile")),
            ("safety_level", json!("moderate")),
        ]);
        assert_eq!(
            summarize(&p),
            "Enneagram type 4 (wing 5). Dominant Big Five trait: openness. \
             Top values: benevolence, universalism. Dominant part: exile. \
             Safety level: moderate."
        );
    }

    #[test]
    fn test_null_fields_are_ignored() {
        let p = payload([("primary_type", json!(null)), ("top_values", json!([]))]);
        assert_eq!(summarize(&p), "No profile data available.");
    }

    #[tokio::test]
    async fn test_report_profile_and_confidence() {
        let agent = ReportAgent::new("report");
        let resp = agent
            .process(AgentMessage::new(
                "system",
                payload([
                    ("text", json!("raw text")),
                    ("dominant_part", json!("self")),
                    ("safety_level", json!("low")),
                    ("ifs_confidence", json!(0.5)),
                    ("values_confidence", json!(0.7)),
                ]),
            ))
            .await
            .unwrap();
        assert!(resp.success);
        assert_eq!(resp.confidence, Some(0.6));
        assert_eq!(resp.get_str("safety_level"), Some("low"));
        let profile = resp.data["profile"].as_object().unwrap();
        assert!(!profile.contains_key("text"));
        assert_eq!(profile["dominant_part"], json!("self"));
    }

    #[test]
    fn test_rejects_empty_input() {
        let agent = ReportAgent::new("report");
        assert!(agent.validate_input(&payload([("text", json!("x"))])).is_err());
        assert!(agent
            .validate_input(&payload([("dominant_part", json!("self"))]))
            .is_ok());
    }
}
