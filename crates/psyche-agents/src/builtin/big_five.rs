use futures::future::BoxFuture;

use psyche_core::error::Result;
use psyche_core::traits::Agent;
use psyche_core::types::{AgentCapability, AgentMessage, AgentResponse, Payload};

use super::{flag_low_confidence, require_text, scores_object, text_of};
use crate::lexicon::{self, round3};

const TRAITS: &[(&str, &[&str])] = &[
    ("openness", &["curious", "imagine", "creative", "art", "ideas", "explore", "new", "wonder"]),
    ("conscientiousness", &["plan", "organized", "careful", "work", "responsible", "schedule", "finish", "discipline"]),
    ("extraversion", &["friends", "party", "talk", "people", "social", "outgoing", "energetic", "together"]),
    ("agreeableness", &["kind", "help", "trust", "care", "forgive", "cooperate", "gentle", "share"]),
    ("neuroticism", &["worried", "anxious", "stressed", "sad", "angry", "afraid", "nervous", "upset"]),
];

/// Each keyword hit moves a trait this far from neutral.
const STEP: f64 = 0.1;

/// Compute OCEAN scores in [0, 1], neutral at 0.5, nudged by an upstream
/// sentiment score in [-1, 1] when one is present.
pub fn ocean_scores(tokens: &[String], sentiment: Option<f64>) -> (Vec<(String, f64)>, usize) {
    let hits = lexicon::category_hits(tokens, TRAITS);
    let total = hits.iter().map(|(_, n)| n).sum();
    let s = sentiment.unwrap_or(0.0).clamp(-1.0, 1.0);
    let scores = hits
        .into_iter()
        .map(|(name, n)| {
            let mut score = 0.5 + STEP * n as f64;
            match name.as_str() {
                "neuroticism" => score -= 0.1 * s,
                "extraversion" => score += 0.05 * s,
                _ => {}
            }
            (name, round3(score.clamp(0.0, 1.0)))
        })
        .collect();
    (scores, total)
}

// ── BigFiveAgent ────────────────────────────────────────────────

/// OCEAN keyword scoring.
pub struct BigFiveAgent {
    id: String,
    min_confidence: f64,
}

impl BigFiveAgent {
    pub fn new(id: impl Into<String>, min_confidence: f64) -> Self {
        Self {
            id: id.into(),
            min_confidence,
        }
    }

    fn score(&self, payload: &Payload) -> (Payload, f64) {
        let tokens = lexicon::tokenize(text_of(payload));
        let sentiment = payload.get("sentiment_score").and_then(|v| v.as_f64());
        let (scores, total) = ocean_scores(&tokens, sentiment);
        let confidence = lexicon::evidence_confidence(total);

        let dominant = scores
            .iter()
            .fold(None::<&(String, f64)>, |best, cur| match best {
                Some(b) if b.1 >= cur.1 => Some(b),
                _ => Some(cur),
            })
            .map(|(name, _)| name.clone());

        let mut data = Payload::new();
        data.insert("traits".into(), scores_object(&scores));
        data.insert("dominant_trait".into(), serde_json::json!(dominant));
        data.insert("confidence".into(), serde_json::json!(confidence));
        flag_low_confidence(&mut data, confidence, self.min_confidence);
        (data, confidence)
    }
}

impl Agent for BigFiveAgent {
    fn agent_id(&self) -> &str {
        &self.id
    }

    fn validate_input(&self, payload: &Payload) -> Result<()> {
        require_text(payload)
    }

    fn process(&self, message: AgentMessage) -> BoxFuture<'_, Result<AgentResponse>> {
        Box::pin(async move {
            let (data, confidence) = self.score(&message.payload);
            Ok(AgentResponse::success(&self.id, data).with_confidence(confidence))
        })
    }

    fn capabilities(&self) -> Vec<AgentCapability> {
        vec![AgentCapability::new("big_five", "Score text on the five OCEAN traits.")
            .with_input_schema(serde_json::json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string" },
                    "sentiment_score": { "type": "number" }
                },
                "required": ["text"]
            }))
            .with_output_schema(serde_json::json!({
                "type": "object",
                "properties": {
                    "traits": { "type": "object" },
                    "dominant_trait": { "type": "string" },
                    "confidence": { "type": "number" }
                }
            }))]
    }
}
