use futures::future::BoxFuture;

use psyche_core::error::Result;
use psyche_core::traits::Agent;
use psyche_core::types::{AgentCapability, AgentMessage, AgentResponse, Payload};

use super::{flag_low_confidence, require_text, text_of};
use crate::lexicon::{self, round3};

/// Internal Family Systems part categories.
const PARTS: &[(&str, &[&str])] = &[
    ("manager", &["control", "plan", "must", "should", "perfect", "organize", "careful", "responsible", "worry"]),
    ("firefighter", &["escape", "drink", "drinking", "numb", "binge", "distract", "scroll", "rage", "explode"]),
    ("exile", &["alone", "hurt", "ashamed", "worthless", "abandoned", "unloved", "small", "rejected", "empty"]),
    ("self", &["curious", "calm", "compassion", "connected", "clarity", "confident", "courage", "creative"]),
];

const CRISIS_PHRASES: &[&str] = &[
    "kill myself",
    "end my life",
    "want to die",
    "suicide",
    "hurt myself",
    "self-harm",
];

const HIGH_RISK_PHRASES: &[&str] = &["hopeless", "can't go on", "no way out", "worthless"];

/// Safety level of `text` given the detected part hits.
fn assess_safety(text: &str, exile_hits: usize, firefighter_hits: usize) -> &'static str {
    if lexicon::contains_phrase(text, CRISIS_PHRASES) {
        "crisis"
    } else if lexicon::contains_phrase(text, HIGH_RISK_PHRASES) {
        "high"
    } else if exile_hits + firefighter_hits > 0 {
        "moderate"
    } else {
        "low"
    }
}

// ── IfsPartsAgent ───────────────────────────────────────────────

/// Detects protective and wounded parts plus a safety level.
pub struct IfsPartsAgent {
    id: String,
    min_confidence: f64,
}

impl IfsPartsAgent {
    pub fn new(id: impl Into<String>, min_confidence: f64) -> Self {
        Self {
            id: id.into(),
            min_confidence,
        }
    }

    fn detect(&self, text: &str) -> (Payload, f64) {
        let tokens = lexicon::tokenize(text);
        let mut parts: Vec<(&str, Vec<&str>)> = PARTS
            .iter()
            .map(|(name, words)| (*name, lexicon::matches(&tokens, words)))
            .filter(|(_, evidence)| !evidence.is_empty())
            .collect();
        parts.sort_by(|a, b| b.1.len().cmp(&a.1.len()));

        let total: usize = parts.iter().map(|(_, e)| e.len()).sum();
        let hits_of = |name: &str| {
            parts
                .iter()
                .find(|(n, _)| *n == name)
                .map_or(0, |(_, e)| e.len())
        };
        let safety = assess_safety(text, hits_of("exile"), hits_of("firefighter"));
        let confidence = lexicon::evidence_confidence(total);

        let detected: Vec<serde_json::Value> = parts
            .iter()
            .map(|(name, evidence)| {
                let mut words = evidence.clone();
                words.dedup();
                serde_json::json!({
                    "part": name,
                    "score": round3(evidence.len() as f64 / total as f64),
                    "evidence": words,
                })
            })
            .collect();

        let mut data = Payload::new();
        data.insert("parts".into(), serde_json::json!(detected));
        data.insert(
            "dominant_part".into(),
            serde_json::json!(parts.first().map(|(name, _)| *name)),
        );
        data.insert("safety_level".into(), serde_json::json!(safety));
        data.insert("confidence".into(), serde_json::json!(confidence));
        flag_low_confidence(&mut data, confidence, self.min_confidence);
        (data, confidence)
    }
}

impl Agent for IfsPartsAgent {
    fn agent_id(&self) -> &str {
        &self.id
    }

    fn validate_input(&self, payload: &Payload) -> Result<()> {
        require_text(payload)
    }

    fn process(&self, message: AgentMessage) -> BoxFuture<'_, Result<AgentResponse>> {
        Box::pin(async move {
            let (data, confidence) = self.detect(text_of(&message.payload));
            Ok(AgentResponse::success(&self.id, data).with_confidence(confidence))
        })
    }

    fn capabilities(&self) -> Vec<AgentCapability> {
        vec![AgentCapability::new(
            "ifs_parts",
            "Detect manager, firefighter, exile and Self energy; report a safety level.",
        )
        .with_input_schema(serde_json::json!({
            "type": "object",
            "properties": { "text": { "type": "string" } },
            "required": ["text"]
        }))
        .with_output_schema(serde_json::json!({
            "type": "object",
            "properties": {
                "parts": { "type": "array" },
                "dominant_part": { "type": ["string", "null"] },
                "safety_level": { "type": "string", "enum": ["low", "moderate", "high", "crisis"] },
                "confidence": { "type": "number" }
            }
        }))]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn agent() -> IfsPartsAgent {
        IfsPartsAgent::new("ifs", 0.0)
    }

    #[test]
    fn test_detects_parts_in_order() {
        let (data, _) = agent().detect("I must plan everything and stay in control, or I feel alone.");
        assert_eq!(data["dominant_part"], json!("manager"));
        assert_eq!(data["parts"][0]["evidence"], json!(["must", "plan", "control"]));
        assert_eq!(data["parts"][1]["part"], json!("exile"));
        assert_eq!(data["safety_level"], json!("moderate"));
    }

    #[test]
    fn test_safety_levels() {
        let level = |text: &str| agent().detect(text).0["safety_level"].clone();
        assert_eq!(level("I feel calm and curious"), json!("low"));
        assert_eq!(level("Everything is hopeless"), json!("high"));
        assert_eq!(level("Sometimes I want to die"), json!("crisis"));
    }

    #[test]
    fn test_nothing_detected() {
        let (data, confidence) = agent().detect("The bus was late.");
        assert_eq!(data["parts"], json!([]));
        assert_eq!(data["dominant_part"], serde_json::Value::Null);
        assert_eq!(confidence, 0.0);
    }
}
