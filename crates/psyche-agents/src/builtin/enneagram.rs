use futures::future::BoxFuture;

use psyche_core::error::Result;
use psyche_core::traits::Agent;
use psyche_core::types::{AgentCapability, AgentMessage, AgentResponse, Payload};

use super::{flag_low_confidence, require_text, scores_object, text_of};
use crate::lexicon;

const TYPES: &[(&str, &[&str])] = &[
    ("type_1", &["should", "right", "wrong", "perfect", "mistake", "correct", "standards", "improve"]),
    ("type_2", &["help", "care", "caring", "needed", "give", "giving", "others", "appreciated"]),
    ("type_3", &["success", "achieve", "goal", "goals", "win", "image", "accomplish", "efficient"]),
    ("type_4", &["unique", "different", "misunderstood", "identity", "longing", "authentic", "special"]),
    ("type_5", &["understand", "knowledge", "think", "privacy", "observe", "research", "energy"]),
    ("type_6", &["worry", "worried", "safe", "trust", "loyal", "doubt", "security", "anxious"]),
    ("type_7", &["fun", "adventure", "exciting", "options", "plans", "new", "bored", "freedom"]),
    ("type_8", &["control", "strong", "power", "fight", "justice", "protect", "weak", "direct"]),
    ("type_9", &["peace", "calm", "harmony", "avoid", "comfortable", "conflict", "easygoing"]),
];

/// The type number (1-9) encoded in a `type_N` key.
fn type_number(key: &str) -> Option<u8> {
    key.strip_prefix("type_").and_then(|n| n.parse().ok())
}

/// The adjacent type with the higher score; ties go to the lower neighbour.
fn wing(primary: u8, scores: &[(String, f64)]) -> Option<u8> {
    let left = if primary == 1 { 9 } else { primary - 1 };
    let right = if primary == 9 { 1 } else { primary + 1 };
    let score_of = |t: u8| scores.get(usize::from(t) - 1).map_or(0.0, |(_, s)| *s);
    let (l, r) = (score_of(left), score_of(right));
    if l == 0.0 && r == 0.0 {
        return None;
    }
    Some(if r > l { right } else { left })
}

// ── EnneagramAgent ──────────────────────────────────────────────

/// Nine-type keyword scoring.
pub struct EnneagramAgent {
    id: String,
    min_confidence: f64,
}

impl EnneagramAgent {
    pub fn new(id: impl Into<String>, min_confidence: f64) -> Self {
        Self {
            id: id.into(),
            min_confidence,
        }
    }

    fn score(&self, text: &str) -> (Payload, f64) {
        let tokens = lexicon::tokenize(text);
        let hits = lexicon::category_hits(&tokens, TYPES);
        let total: usize = hits.iter().map(|(_, n)| n).sum();
        let scores = lexicon::relative_scores(&hits);
        let primary = lexicon::strongest(&scores).and_then(type_number);
        let confidence = lexicon::evidence_confidence(total);

        let mut data = Payload::new();
        data.insert("primary_type".into(), serde_json::json!(primary));
        data.insert(
            "wing".into(),
            serde_json::json!(primary.and_then(|p| wing(p, &scores))),
        );
        data.insert("scores".into(), scores_object(&scores));
        data.insert("confidence".into(), serde_json::json!(confidence));
        flag_low_confidence(&mut data, confidence, self.min_confidence);
        (data, confidence)
    }
}

impl Agent for EnneagramAgent {
    fn agent_id(&self) -> &str {
        &self.id
    }

    fn validate_input(&self, payload: &Payload) -> Result<()> {
        require_text(payload)
    }

    fn process(&self, message: AgentMessage) -> BoxFuture<'_, Result<AgentResponse>> {
        Box::pin(async move {
            let (data, confidence) = self.score(text_of(&message.payload));
            Ok(AgentResponse::success(&self.id, data).with_confidence(confidence))
        })
    }

    fn capabilities(&self) -> Vec<AgentCapability> {
        vec![AgentCapability::new("enneagram", "Score text against the nine Enneagram types.")
            .with_input_schema(serde_json::json!({
                "type": "object",
                "properties": { "text": { "type": "string" } },
                "required": ["text"]
            }))
            .with_output_schema(serde_json::json!({
                "type": "object",
                "properties": {
                    "primary_type": { "type": ["integer", "null"], "minimum": 1, "maximum": 9 },
                    "wing": { "type": ["integer", "null"] },
                    "scores": { "type": "object" },
                    "confidence": { "type": "number" }
                }
            }))]
    }
}
