use futures::future::BoxFuture;
use serde::Deserialize;
use tracing::debug;

use psyche_core::error::{PsycheError, Result};
use psyche_core::traits::Agent;
use psyche_core::types::{AgentCapability, AgentMessage, AgentResponse, Payload};

use super::{config_str, require_text, NodeConfig};
use crate::lexicon::round3;

pub const SUPPORTED_LANGUAGES: [&str; 4] = ["en", "he", "es", "fr"];

/// Rows of (en, he, es, fr).
const DICTIONARY: &[(&str, &str, &str, &str)] = &[
    ("i", "אני", "yo", "je"),
    ("feel", "מרגיש", "siento", "sens"),
    ("sad", "עצוב", "triste", "triste"),
    ("happy", "שמח", "feliz", "heureux"),
    ("angry", "כועס", "enojado", "fâché"),
    ("afraid", "מפחד", "asustado", "effrayé"),
    ("tired", "עייף", "cansado", "fatigué"),
    ("alone", "לבד", "solo", "seul"),
    ("love", "אוהב", "amo", "aime"),
    ("family", "משפחה", "familia", "famille"),
    ("work", "עבודה", "trabajo", "travail"),
    ("friends", "חברים", "amigos", "amis"),
    ("want", "רוצה", "quiero", "veux"),
    ("need", "צריך", "necesito", "besoin"),
    ("help", "עזרה", "ayuda", "aide"),
    ("always", "תמיד", "siempre", "toujours"),
    ("today", "היום", "hoy", "aujourd'hui"),
    ("life", "חיים", "vida", "vie"),
    ("very", "מאוד", "muy", "très"),
    ("my", "שלי", "mi", "mon"),
    ("with", "עם", "con", "avec"),
    ("calm", "רגוע", "tranquilo", "calme"),
    ("worried", "מודאג", "preocupado", "inquiet"),
    ("hope", "תקווה", "esperanza", "espoir"),
    ("and", "וגם", "y", "et"),
];

fn column(lang: &str) -> Option<usize> {
    SUPPORTED_LANGUAGES.iter().position(|l| *l == lang)
}

fn entry(row: &(&'static str, &'static str, &'static str, &'static str), col: usize) -> &'static str {
    match col {
        0 => row.0,
        1 => row.1,
        2 => row.2,
        _ => row.3,
    }
}

fn lookup(word: &str, from: usize, to: usize) -> Option<&'static str> {
    DICTIONARY
        .iter()
        .find(|row| entry(row, from) == word)
        .map(|row| entry(row, to))
}

/// Detect the language of `text`: Hebrew script wins outright, otherwise the
/// language with the most dictionary hits, defaulting to English.
pub fn detect_language(text: &str) -> &'static str {
    if text.chars().any(|c| ('\u{0590}'..='\u{05FF}').contains(&c)) {
        return "he";
    }
    let words: Vec<String> = split_words(text).map(|(_, w, _)| w.to_lowercase()).collect();
    let mut best = ("en", 0usize);
    for lang in ["en", "es", "fr"] {
        let Some(col) = column(lang) else { continue };
        let hits = words
            .iter()
            .filter(|w| DICTIONARY.iter().any(|row| entry(row, col) == w.as_str()))
            .count();
        if hits > best.1 {
            best = (lang, hits);
        }
    }
    best.0
}

/// Split on whitespace into (leading punctuation, word, trailing punctuation).
fn split_words(text: &str) -> impl Iterator<Item = (&str, &str, &str)> {
    text.split_whitespace().map(|token| {
        let start = token
            .find(|c: char| c.is_alphanumeric())
            .unwrap_or(token.len());
        let end = token
            .rfind(|c: char| c.is_alphanumeric())
            .map(|i| i + token[i..].chars().next().map_or(1, char::len_utf8))
            .unwrap_or(start);
        (&token[..start], &token[start..end.max(start)], &token[end.max(start)..])
    })
}

/// Word-by-word dictionary translation. Returns the text and the share of
/// words that were found in the dictionary.
fn translate(text: &str, from: usize, to: usize) -> (String, f64) {
    let mut out = Vec::new();
    let (mut total, mut known) = (0usize, 0usize);
    for (lead, word, trail) in split_words(text) {
        if word.is_empty() {
            out.push(format!("{}{}", lead, trail));
            continue;
        }
        total += 1;
        let translated = match lookup(&word.to_lowercase(), from, to) {
            Some(t) => {
                known += 1;
                t.to_string()
            }
            None => word.to_string(),
        };
        out.push(format!("{}{}{}", lead, translated, trail));
    }
    let coverage = if total == 0 { 0.0 } else { known as f64 / total as f64 };
    (out.join(" "), coverage)
}

// ── TranslationAgent ────────────────────────────────────────────

/// Dictionary fallback for the translation service.
pub struct TranslationAgent {
    id: String,
    default_target: String,
}

#[derive(Deserialize)]
struct TranslationInput {
    text: String,
    #[serde(default)]
    target_language: Option<String>,
    #[serde(default)]
    source_language: Option<String>,
}

impl TranslationAgent {
    pub fn new(id: impl Into<String>, default_target: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            default_target: default_target.into(),
        }
    }

    /// Node config: `target_language` overrides the catalog default.
    pub fn from_config(id: &str, default_target: &str, config: &NodeConfig) -> Result<Self> {
        let target = config_str(id, config, "target_language")?
            .unwrap_or_else(|| default_target.to_string());
        if column(&target).is_none() {
            return Err(PsycheError::AgentInitialization {
                agent: id.to_string(),
                message: format!("unsupported default target language: {}", target),
            });
        }
        Ok(Self::new(id, target))
    }

    fn run(&self, payload: Payload) -> AgentResponse {
        let input: TranslationInput =
            match serde_json::from_value(serde_json::Value::Object(payload.into_iter().collect())) {
                Ok(input) => input,
                Err(e) => return AgentResponse::failure(&self.id, e.to_string()),
            };

        let target = input
            .target_language
            .unwrap_or_else(|| self.default_target.clone())
            .to_lowercase();
        let source = input
            .source_language
            .map(|s| s.to_lowercase())
            .unwrap_or_else(|| detect_language(&input.text).to_string());

        let (Some(from), Some(to)) = (column(&source), column(&target)) else {
            let bad = if column(&source).is_none() { &source } else { &target };
            return AgentResponse::failure(&self.id, format!("unsupported language code: {}", bad));
        };

        let (translated, confidence) = if from == to {
            (input.text.clone(), 1.0)
        } else {
            let (text, coverage) = translate(&input.text, from, to);
            (text, round3(0.3 + 0.6 * coverage))
        };
        debug!(agent_id = %self.id, source = %source, target = %target, "Translated text");

        let mut data = Payload::new();
        data.insert("translated_text".into(), serde_json::json!(translated));
        data.insert("original_text".into(), serde_json::json!(input.text));
        data.insert("source_language".into(), serde_json::json!(source));
        data.insert("target_language".into(), serde_json::json!(target));
        data.insert("confidence".into(), serde_json::json!(confidence));
        AgentResponse::success(&self.id, data).with_confidence(confidence)
    }
}

impl Agent for TranslationAgent {
    fn agent_id(&self) -> &str {
        &self.id
    }

    fn validate_input(&self, payload: &Payload) -> Result<()> {
        require_text(payload)
    }

    fn process(&self, message: AgentMessage) -> BoxFuture<'_, Result<AgentResponse>> {
        Box::pin(async move { Ok(self.run(message.payload)) })
    }

    fn capabilities(&self) -> Vec<AgentCapability> {
        vec![AgentCapability::new("translate", "Translate text between en, he, es and fr.")
            .with_input_schema(serde_json::json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string" },
                    "target_language": { "type": "string", "enum": SUPPORTED_LANGUAGES },
                    "source_language": { "type": "string", "enum": SUPPORTED_LANGUAGES }
                },
                "required": ["text"]
            }))
            .with_output_schema(serde_json::json!({
                "type": "object",
                "properties": {
                    "translated_text": { "type": "string" },
                    "source_language": { "type": "string" },
                    "target_language": { "type": "string" },
                    "confidence": { "type": "number" }
                }
            }))
            .with_expected_latency_ms(5)]
    }
}
