use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A directed connection between two nodes in a chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainConnection {
    /// Source node id.
    #[serde(rename = "source")]
    pub source_agent: String,
    /// Target node id.
    #[serde(rename = "target")]
    pub target_agent: String,
    /// Applied to every mapped value before delivery.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<Transform>,
    /// Source output field -> target input field. Unmapped fields are dropped.
    #[serde(rename = "mapping", default)]
    pub data_mapping: BTreeMap<String, String>,
}

impl ChainConnection {
    pub fn new(
        source_agent: impl Into<String>,
        target_agent: impl Into<String>,
        data_mapping: BTreeMap<String, String>,
    ) -> Self {
        Self {
            source_agent: source_agent.into(),
            target_agent: target_agent.into(),
            transform: None,
            data_mapping,
        }
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = Some(transform);
        self
    }

    /// Map `source_data` onto the target's input fields.
    ///
    /// Returns `(target_field, value)` pairs for every mapped field present
    /// in the source output.
    pub fn map_fields(
        &self,
        source_data: &std::collections::HashMap<String, serde_json::Value>,
    ) -> Vec<(String, serde_json::Value)> {
        self.data_mapping
            .iter()
            .filter_map(|(src, dst)| {
                let value = source_data.get(src)?;
                let value = match self.transform {
                    Some(t) => t.apply(value),
                    None => value.clone(),
                };
                Some((dst.clone(), value))
            })
            .collect()
    }
}

/// Build a mapping from `(source_field, target_field)` pairs.
pub fn mapping<I, S, T>(pairs: I) -> BTreeMap<String, String>
where
    I: IntoIterator<Item = (S, T)>,
    S: Into<String>,
    T: Into<String>,
{
    pairs
        .into_iter()
        .map(|(s, t)| (s.into(), t.into()))
        .collect()
}

/// Named transformation applied to a mapped value.
///
/// Transforms that do not apply to a value's type pass it through unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transform {
    #[default]
    Identity,
    Lowercase,
    Uppercase,
    Trim,
    /// Render any value as a string.
    ToString,
    /// Parse strings and booleans into numbers.
    ToNumber,
    /// Round numbers to two decimals.
    Round2,
    /// First element of an array.
    First,
    /// Length of a string, array or object.
    Length,
    /// Serialize the value as a JSON string.
    JsonString,
}

impl Transform {
    pub fn apply(&self, value: &serde_json::Value) -> serde_json::Value {
        use serde_json::Value;

        match (self, value) {
            (Transform::Identity, v) => v.clone(),
            (Transform::Lowercase, Value::String(s)) => Value::String(s.to_lowercase()),
            (Transform::Uppercase, Value::String(s)) => Value::String(s.to_uppercase()),
            (Transform::Trim, Value::String(s)) => Value::String(s.trim().to_string()),
            (Transform::ToString, Value::String(s)) => Value::String(s.clone()),
            (Transform::ToString, v) => Value::String(v.to_string()),
            (Transform::ToNumber, Value::String(s)) => s
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .unwrap_or_else(|| value.clone()),
            (Transform::ToNumber, Value::Bool(b)) => serde_json::json!(if *b { 1 } else { 0 }),
            (Transform::Round2, Value::Number(n)) => match n.as_f64() {
                Some(f) if !n.is_i64() && !n.is_u64() => {
                    serde_json::json!((f * 100.0).round() / 100.0)
                }
                _ => value.clone(),
            },
            (Transform::First, Value::Array(items)) => {
                items.first().cloned().unwrap_or(Value::Null)
            }
            (Transform::Length, Value::String(s)) => serde_json::json!(s.chars().count()),
            (Transform::Length, Value::Array(items)) => serde_json::json!(items.len()),
            (Transform::Length, Value::Object(map)) => serde_json::json!(map.len()),
            (Transform::JsonString, v) => Value::String(v.to_string()),
            (_, v) => v.clone(),
        }
    }
}

impl std::fmt::Display for Transform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Transform::Identity => "identity",
            Transform::Lowercase => "lowercase",
            Transform::Uppercase => "uppercase",
            Transform::Trim => "trim",
            Transform::ToString => "to_string",
            Transform::ToNumber => "to_number",
            Transform::Round2 => "round2",
            Transform::First => "first",
            Transform::Length => "length",
            Transform::JsonString => "json_string",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for Transform {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        serde_json::from_value(serde_json::Value::String(s.to_string()))
            .map_err(|_| format!("unknown transform '{}'", s))
    }
}
