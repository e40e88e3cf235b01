use serde::{Deserialize, Serialize};
use serde_json::Value;

use psyche_core::error::{PsycheError, Result};

use super::chain::AgentChain;

/// Textual encodings a chain can be exported to and imported from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainFormat {
    /// Structured-record encoding.
    Json,
    /// Human-block encoding.
    Toml,
}

impl ChainFormat {
    /// Guess the format from a file extension.
    pub fn from_path(path: &std::path::Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(|e| e.parse().ok())
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ChainFormat::Json => "json",
            ChainFormat::Toml => "toml",
        }
    }
}

impl std::fmt::Display for ChainFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

impl std::str::FromStr for ChainFormat {
    type Err = PsycheError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(ChainFormat::Json),
            "toml" => Ok(ChainFormat::Toml),
            other => Err(PsycheError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Serialize a chain.
pub fn encode(chain: &AgentChain, format: ChainFormat) -> Result<String> {
    match format {
        ChainFormat::Json => serde_json::to_string_pretty(chain)
            .map_err(|e| PsycheError::Serialize(e.to_string())),
        ChainFormat::Toml => {
            toml::to_string_pretty(chain).map_err(|e| PsycheError::Serialize(e.to_string()))
        }
    }
}

/// Check that `value` survives both encodings.
///
/// TOML has no null and no integers above `i64::MAX`, so chains holding
/// either could be exported as JSON but not as TOML. `path` names the value
/// in the error message.
pub fn check_encodable(path: &str, value: &Value) -> std::result::Result<(), String> {
    match value {
        Value::Null => Err(format!("'{}' is null, which a toml chain cannot hold", path)),
        Value::Number(n) if n.is_u64() && n.as_i64().is_none() => Err(format!(
            "'{}' = {} is out of range for a toml integer",
            path, n
        )),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .try_for_each(|(i, v)| check_encodable(&format!("{}[{}]", path, i), v)),
        Value::Object(map) => map
            .iter()
            .try_for_each(|(k, v)| check_encodable(&format!("{}.{}", path, k), v)),
        _ => Ok(()),
    }
}

/// `check_encodable` over every node config and metadata value of a chain.
pub fn check_chain_encodable(chain: &AgentChain) -> std::result::Result<(), String> {
    for node in &chain.nodes {
        for (key, value) in &node.config {
            check_encodable(&format!("{}.config.{}", node.agent_id, key), value)?;
        }
    }
    for (key, value) in &chain.metadata {
        check_encodable(&format!("metadata.{}", key), value)?;
    }
    Ok(())
}

/// Parse a chain. Nothing is registered here; callers decide what to do with it.
pub fn decode(data: &str, format: ChainFormat) -> Result<AgentChain> {
    let parsed = match format {
        ChainFormat::Json => serde_json::from_str(data).map_err(|e| e.to_string()),
        ChainFormat::Toml => toml::from_str(data).map_err(|e| e.to_string()),
    };
    parsed.map_err(|message| PsycheError::Parse {
        format: format.to_string(),
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::edge::{mapping, ChainConnection, Transform};
    use crate::graph::node::{AgentNode, ExecutionMode};

    fn sample() -> AgentChain {
        let mut chain = AgentChain::new("sample", "Sample", "two nodes");
        let mut config = std::collections::BTreeMap::new();
        config.insert("threshold".into(), serde_json::json!(0.25));
        config.insert("tags".into(), serde_json::json!(["a", "b"]));
        chain
            .nodes
            .push(AgentNode::new("first", "text_features").with_config(config));
        chain.nodes.push(
            AgentNode::new("second", "big_five")
                .with_mode(ExecutionMode::Parallel),
        );
        chain.connections.push(
            ChainConnection::new("first", "second", mapping([("sentiment_score", "sentiment")]))
                .with_transform(Transform::Round2),
        );
        chain.entry_point = Some("first".into());
        chain
            .metadata
            .insert("version".into(), serde_json::json!("1.0"));
        chain.rebuild_links();
        chain
    }

    #[test]
    fn test_json_roundtrip() {
        let chain = sample();
        let text = encode(&chain, ChainFormat::Json).unwrap();
        assert!(text.contains("\"entry_point\": \"first\""));
        assert_eq!(decode(&text, ChainFormat::Json).unwrap(), chain);
    }

    #[test]
    fn test_toml_roundtrip() {
        let chain = sample();
        let text = encode(&chain, ChainFormat::Toml).unwrap();
        assert!(text.contains("[[nodes]]"));
        assert!(text.contains("[[connections]]"));
        assert_eq!(decode(&text, ChainFormat::Toml).unwrap(), chain);
    }

    #[test]
    fn test_decode_handwritten_toml() {
        let text = r#"
chain_id = "hand"
name = "Handwritten"
entry_point = "t"

[[nodes]]
agent_id = "t"
agent_class = "translation"
execution_mode = "SEQUENTIAL"

[nodes.config]
target_language = "en"

[[nodes]]
agent_id = "f"
agent_class = "text_features"

[[connections]]
source = "t"
target = "f"
mapping = { translated_text = "text" }
"#;
        let chain = decode(text, ChainFormat::Toml).unwrap();
        assert_eq!(chain.nodes.len(), 2);
        assert_eq!(chain.nodes[1].execution_mode, ExecutionMode::Sequential);
        assert_eq!(chain.connections[0].data_mapping["translated_text"], "text");
        assert_eq!(chain.description, "");
    }

    #[test]
    fn test_null_values_are_not_encodable() {
        assert!(check_encodable("x", &serde_json::json!({"a": [1, "b", {"c": true}]})).is_ok());

        let err = check_encodable("n.config.fallback", &Value::Null).unwrap_err();
        assert!(err.contains("'n.config.fallback' is null"));

        let nested = serde_json::json!({"outer": {"items": [1, null]}});
        let err = check_encodable("meta", &nested).unwrap_err();
        assert!(err.contains("'meta.outer.items[1]'"), "{}", err);

        assert!(check_encodable("big", &serde_json::json!(u64::MAX)).is_err());

        let mut chain = sample();
        assert!(check_chain_encodable(&chain).is_ok());
        chain.metadata.insert("owner".into(), Value::Null);
        assert!(check_chain_encodable(&chain).unwrap_err().contains("metadata.owner"));
    }

    #[test]
    fn test_parse_error_names_format() {
        let err = decode("{ not json", ChainFormat::Json).unwrap_err();
        assert!(matches!(err, PsycheError::Parse { ref format, .. } if format == "json"));

        let err = decode("chain_id = ", ChainFormat::Toml).unwrap_err();
        assert!(err.to_string().starts_with("Failed to parse toml chain"));
    }

    #[test]
    fn test_unknown_transform_is_a_parse_error() {
        let text = r#"{"chain_id":"x","name":"x","connections":[{"source":"a","target":"b","transform":"reverse","mapping":{}}]}"#;
        assert!(decode(text, ChainFormat::Json).is_err());
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("JSON".parse::<ChainFormat>().unwrap(), ChainFormat::Json);
        assert!(matches!(
            "xml".parse::<ChainFormat>(),
            Err(PsycheError::UnsupportedFormat(_))
        ));
        assert_eq!(
            ChainFormat::from_path(std::path::Path::new("chains/a.toml")),
            Some(ChainFormat::Toml)
        );
        assert_eq!(ChainFormat::from_path(std::path::Path::new("a.yaml")), None);
    }
}
