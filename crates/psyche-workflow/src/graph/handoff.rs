use std::collections::HashMap;

use psyche_core::types::Payload;

use super::edge::ChainConnection;

/// Input payload under construction for one node.
///
/// The entry node starts from the caller's input; every other node starts
/// empty and receives only the fields its inbound connections map in.
#[derive(Debug, Clone, Default)]
pub struct HandoffContext {
    data: Payload,
}

impl HandoffContext {
    pub fn from_map(data: Payload) -> Self {
        Self { data }
    }

    /// Deliver the mapped fields of an upstream node's output.
    pub fn ingest_mapped(&mut self, connection: &ChainConnection, source_data: &Payload) {
        for (field, value) in connection.map_fields(source_data) {
            self.data.insert(field, value);
        }
    }

    pub fn into_payload(self) -> Payload {
        self.data
    }
}

/// Build the input of `target` from the outputs of its completed upstream nodes.
///
/// Connections are applied in declaration order, so a later mapping onto the
/// same field wins.
pub fn gather_inputs<'a>(
    base: Option<&Payload>,
    inbound: impl Iterator<Item = &'a ChainConnection>,
    outputs: &HashMap<String, Payload>,
) -> HandoffContext {
    let mut ctx = base.cloned().map(HandoffContext::from_map).unwrap_or_default();
    for conn in inbound {
        if let Some(data) = outputs.get(&conn.source_agent) {
            ctx.ingest_mapped(conn, data);
        }
    }
    ctx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::edge::mapping;
    use psyche_test_utils::payload;
    use serde_json::json;

    #[test]
    fn test_later_mapping_wins() {
        let first = ChainConnection::new("a", "n", mapping([("score", "score")]));
        let second = ChainConnection::new("b", "n", mapping([("value", "score")]));
        let mut outputs = HashMap::new();
        outputs.insert("a".to_string(), payload([("score", json!(1))]));
        outputs.insert("b".to_string(), payload([("value", json!(2))]));

        let data = gather_inputs(None, [first, second].iter(), &outputs).into_payload();
        assert_eq!(data, payload([("score", json!(2))]));
    }

    #[test]
    fn test_gather_from_two_sources() {
        let left = ChainConnection::new("left", "join", mapping([("score", "left_score")]));
        let right = ChainConnection::new("right", "join", mapping([("score", "right_score")]));

        let mut outputs = HashMap::new();
        let mut l = Payload::new();
        l.insert("score".into(), json!(0.2));
        l.insert("noise".into(), json!("dropped"));
        let mut r = Payload::new();
        r.insert("score".into(), json!(0.8));
        outputs.insert("left".to_string(), l);
        outputs.insert("right".to_string(), r);

        let connections = [left, right];
        let data = gather_inputs(None, connections.iter(), &outputs).into_payload();
        assert_eq!(data.get("left_score"), Some(&json!(0.2)));
        assert_eq!(data.get("right_score"), Some(&json!(0.8)));
        assert!(data.get("noise").is_none());
        assert_eq!(data.len(), 2);
    }

    #[test]
    fn test_gather_keeps_base_and_skips_missing_sources() {
        let conn = ChainConnection::new("ghost", "n", mapping([("x", "y")]));
        let mut base = Payload::new();
        base.insert("text".into(), json!("input"));
        let ctx = gather_inputs(Some(&base), std::iter::once(&conn), &HashMap::new());
        assert_eq!(ctx.into_payload(), base);
    }
}
