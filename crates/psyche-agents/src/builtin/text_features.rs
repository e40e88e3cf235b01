use futures::future::BoxFuture;

use psyche_core::error::{PsycheError, Result};
use psyche_core::traits::Agent;
use psyche_core::types::{AgentCapability, AgentMessage, AgentResponse, Payload};

use super::{config_usize, require_text, text_of, NodeConfig};
use crate::lexicon::{self, round3};

/// Confidence reported by the keyword fallback, whatever the input.
const FALLBACK_CONFIDENCE: f64 = 0.6;

const POSITIVE: &[&str] = &[
    "happy", "glad", "love", "joy", "great", "good", "calm", "hope", "hopeful", "grateful",
    "proud", "excited", "peaceful", "relieved", "wonderful", "safe", "confident",
];

const NEGATIVE: &[&str] = &[
    "sad", "angry", "afraid", "scared", "tired", "alone", "lonely", "hurt", "hate", "bad",
    "worried", "anxious", "hopeless", "worthless", "ashamed", "guilty", "empty", "stressed",
];

const NEGATIONS: &[&str] = &["not", "never", "no", "don't", "can't", "isn't", "wasn't"];

const EMOTIONS: &[(&str, &[&str])] = &[
    ("joy", &["happy", "glad", "joy", "excited", "wonderful", "proud", "love"]),
    ("sadness", &["sad", "lonely", "alone", "empty", "hopeless", "cry", "grief", "miss"]),
    ("anger", &["angry", "furious", "hate", "annoyed", "rage", "resent"]),
    ("fear", &["afraid", "scared", "worried", "anxious", "panic", "nervous"]),
    ("surprise", &["surprised", "shocked", "unexpected", "suddenly"]),
    ("disgust", &["disgusted", "gross", "sick", "revolting"]),
    ("trust", &["trust", "safe", "rely", "secure", "confident"]),
];

/// Sentiment in [-1, 1]. A negation directly before an affect word flips it.
pub fn sentiment_score(tokens: &[String]) -> f64 {
    let (mut pos, mut neg) = (0i32, 0i32);
    for (i, token) in tokens.iter().enumerate() {
        let polarity = if POSITIVE.contains(&token.as_str()) {
            1
        } else if NEGATIVE.contains(&token.as_str()) {
            -1
        } else {
            continue;
        };
        let negated = i > 0 && NEGATIONS.contains(&tokens[i - 1].as_str());
        if (polarity > 0) != negated {
            pos += 1;
        } else {
            neg += 1;
        }
    }
    let total = pos + neg;
    if total == 0 {
        return 0.0;
    }
    round3(f64::from(pos - neg) / f64::from(total))
}

pub fn sentiment_label(score: f64) -> &'static str {
    if score > 0.1 {
        "positive"
    } else if score < -0.1 {
        "negative"
    } else {
        "neutral"
    }
}

/// Emotions with at least one hit, strongest first, scores summing to 1.
pub fn ranked_emotions(tokens: &[String]) -> Vec<(String, f64)> {
    let hits = lexicon::category_hits(tokens, EMOTIONS);
    let total: usize = hits.iter().map(|(_, n)| n).sum();
    if total == 0 {
        return vec![("neutral".to_string(), 1.0)];
    }
    let mut ranked: Vec<(String, f64)> = hits
        .into_iter()
        .filter(|(_, n)| *n > 0)
        .map(|(e, n)| (e, round3(n as f64 / total as f64)))
        .collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    ranked
}

/// Hashed bag-of-words, L2-normalized. All zeros for empty input.
pub fn embed(tokens: &[String], dims: usize) -> Vec<f64> {
    let mut v = vec![0.0; dims];
    if dims == 0 {
        return v;
    }
    for token in tokens {
        let h = lexicon::fnv1a(token.as_bytes());
        let slot = (h % dims as u64) as usize;
        let sign = if (h >> 63) & 1 == 0 { 1.0 } else { -1.0 };
        v[slot] += sign;
    }
    let norm = v.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm > 0.0 {
        for x in &mut v {
            *x = round3(*x / norm);
        }
    }
    v
}

// ── TextFeatureAgent ────────────────────────────────────────────

/// Keyword fallback for the text feature extractor.
pub struct TextFeatureAgent {
    id: String,
    embedding_dims: usize,
}

impl TextFeatureAgent {
    pub fn new(id: impl Into<String>, embedding_dims: usize) -> Self {
        Self {
            id: id.into(),
            embedding_dims,
        }
    }

    /// Node config: `embedding_dims` overrides the catalog default.
    pub fn from_config(id: &str, default_dims: usize, config: &NodeConfig) -> Result<Self> {
        let dims = config_usize(id, config, "embedding_dims")?.unwrap_or(default_dims);
        if dims == 0 {
            return Err(PsycheError::AgentInitialization {
                agent: id.to_string(),
                message: "embedding_dims must be at least 1".into(),
            });
        }
        Ok(Self::new(id, dims))
    }

    fn extract(&self, text: &str) -> Payload {
        let tokens = lexicon::tokenize(text);
        let score = sentiment_score(&tokens);
        let emotions: Vec<serde_json::Value> = ranked_emotions(&tokens)
            .into_iter()
            .map(|(emotion, score)| serde_json::json!({ "emotion": emotion, "score": score }))
            .collect();

        let mut data = Payload::new();
        data.insert("sentiment".into(), serde_json::json!(sentiment_label(score)));
        data.insert("sentiment_score".into(), serde_json::json!(score));
        data.insert("emotions".into(), serde_json::json!(emotions));
        data.insert(
            "embedding".into(),
            serde_json::json!(embed(&tokens, self.embedding_dims)),
        );
        data.insert("token_count".into(), serde_json::json!(tokens.len()));
        data.insert("char_count".into(), serde_json::json!(text.chars().count()));
        data.insert(
            "sentence_count".into(),
            serde_json::json!(lexicon::sentence_count(text)),
        );
        data.insert("text".into(), serde_json::json!(text));
        data
    }
}

impl Agent for TextFeatureAgent {
    fn agent_id(&self) -> &str {
        &self.id
    }

    fn validate_input(&self, payload: &Payload) -> Result<()> {
        require_text(payload)
    }

    fn process(&self, message: AgentMessage) -> BoxFuture<'_, Result<AgentResponse>> {
        Box::pin(async move {
            let data = self.extract(text_of(&message.payload));
            Ok(AgentResponse::success(&self.id, data).with_confidence(FALLBACK_CONFIDENCE))
        })
    }

    fn capabilities(&self) -> Vec<AgentCapability> {
        vec![AgentCapability::new(
            "extract_features",
            "Sentiment, ranked emotions, a hashed embedding and basic text statistics.",
        )
        .with_input_schema(serde_json::json!({
            "type": "object",
            "properties": { "text": { "type": "string" } },
            "required": ["text"]
        }))
        .with_output_schema(serde_json::json!({
            "type": "object",
            "properties": {
                "sentiment": { "type": "string", "enum": ["positive", "negative", "neutral"] },
                "sentiment_score": { "type": "number", "minimum": -1, "maximum": 1 },
                "emotions": { "type": "array" },
                "embedding": { "type": "array", "items": { "type": "number" } },
                "token_count": { "type": "integer" },
                "char_count": { "type": "integer" },
                "sentence_count": { "type": "integer" }
            }
        }))
        .with_expected_latency_ms(2)]
    }
}
