use futures::future::BoxFuture;

use psyche_core::error::Result;
use psyche_core::traits::Agent;
use psyche_core::types::{AgentCapability, AgentMessage, AgentResponse, Payload};

use super::{config_usize, flag_low_confidence, require_text, scores_object, text_of, NodeConfig};
use crate::lexicon;

/// Schwartz basic human values.
const VALUES: &[(&str, &[&str])] = &[
    ("self_direction", &["freedom", "independent", "choose", "create", "curious", "own"]),
    ("stimulation", &["adventure", "exciting", "challenge", "new", "travel", "risk"]),
    ("hedonism", &["enjoy", "pleasure", "fun", "relax", "treat"]),
    ("achievement", &["success", "achieve", "ambitious", "goal", "career", "win"]),
    ("power", &["power", "control", "money", "status", "wealth", "authority"]),
    ("security", &["safe", "security", "stable", "home", "order", "protect"]),
    ("conformity", &["rules", "polite", "obey", "expected", "proper", "should"]),
    ("tradition", &["tradition", "faith", "religion", "heritage", "respect", "custom"]),
    ("benevolence", &["family", "friends", "help", "loyal", "care", "honest"]),
    ("universalism", &["equality", "justice", "nature", "peace", "world", "environment"]),
];

const DEFAULT_TOP_N: usize = 3;

// ── ValuesAgent ─────────────────────────────────────────────────

pub struct ValuesAgent {
    id: String,
    min_confidence: f64,
    top_n: usize,
}

impl ValuesAgent {
    pub fn new(id: impl Into<String>, min_confidence: f64) -> Self {
        Self {
            id: id.into(),
            min_confidence,
            top_n: DEFAULT_TOP_N,
        }
    }

    /// Node config: `top_n` (default 3) limits `top_values`.
    pub fn from_config(id: &str, min_confidence: f64, config: &NodeConfig) -> Result<Self> {
        let mut agent = Self::new(id, min_confidence);
        if let Some(n) = config_usize(id, config, "top_n")? {
            agent.top_n = n;
        }
        Ok(agent)
    }

    fn score(&self, text: &str) -> (Payload, f64) {
        let tokens = lexicon::tokenize(text);
        let hits = lexicon::category_hits(&tokens, VALUES);
        let total: usize = hits.iter().map(|(_, n)| n).sum();
        let scores = lexicon::relative_scores(&hits);
        let confidence = lexicon::evidence_confidence(total);

        let mut ranked: Vec<&(String, f64)> = scores.iter().filter(|(_, s)| *s > 0.0).collect();
        // Stable sort keeps declaration order among equal scores.
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        let top: Vec<&str> = ranked
            .into_iter()
            .take(self.top_n)
            .map(|(name, _)| name.as_str())
            .collect();

        let mut data = Payload::new();
        data.insert("values".into(), scores_object(&scores));
        data.insert("top_values".into(), serde_json::json!(top));
        data.insert("confidence".into(), serde_json::json!(confidence));
        flag_low_confidence(&mut data, confidence, self.min_confidence);
        (data, confidence)
    }
}

impl Agent for ValuesAgent {
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
        vec![AgentCapability::new("values", "Score text against Schwartz's ten basic values.")
            .with_input_schema(serde_json::json!({
                "type": "object",
                "properties": { "text": { "type": "string" } },
                "required": ["text"]
            }))
            .with_output_schema(serde_json::json!({
                "type": "object",
                "properties": {
                    "values": { "type": "object" },
                    "top_values": { "type": "array", "items": { "type": "string" } },
                    "confidence": { "type": "number" }
                }
            }))]
    }
}
