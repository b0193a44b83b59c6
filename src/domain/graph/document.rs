//! Graph document decoding.
//!
//! The document is JSON:
//!
//! ```json
//! { "version": 1,
//!   "nodes": [{ "id": "n1", "type": "rsi", "data": {}, "optimizableFields": [] }],
//!   "edges": [{ "source": "n1", "target": "n2" }],
//!   "settings": { "eaName": "MyEA" } }
//! ```

use serde::Deserialize;

use super::node::NodeData;
use super::{Edge, Node};
use crate::domain::context::GenerationContext;
use crate::domain::error::EaforgeError;

pub const SUPPORTED_VERSION: u32 = 1;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawNode {
    id: String,
    #[serde(rename = "type")]
    node_type: String,
    #[serde(default)]
    data: serde_json::Value,
    #[serde(default)]
    optimizable_fields: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawDocument {
    #[serde(default = "default_version")]
    version: u32,
    #[serde(default)]
    nodes: Vec<RawNode>,
    #[serde(default)]
    edges: Vec<Edge>,
    #[serde(default)]
    settings: GenerationContext,
}

fn default_version() -> u32 {
    SUPPORTED_VERSION
}

#[derive(Debug, Clone)]
pub struct GraphDocument {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub settings: GenerationContext,
}

impl GraphDocument {
    pub fn from_json(text: &str) -> Result<Self, EaforgeError> {
        let raw: RawDocument = serde_json::from_str(text)?;
        if raw.version != SUPPORTED_VERSION {
            return Err(EaforgeError::InvalidDocument {
                reason: format!(
                    "unsupported document version {} (expected {})",
                    raw.version, SUPPORTED_VERSION
                ),
            });
        }

        let nodes = raw
            .nodes
            .into_iter()
            .map(decode_node)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            nodes,
            edges: raw.edges,
            settings: raw.settings,
        })
    }
}

fn decode_node(raw: RawNode) -> Result<Node, EaforgeError> {
    let data = NodeData::parse(&raw.node_type, raw.data)
        .map_err(|e| EaforgeError::InvalidDocument {
            reason: format!("node {} ({}): {}", raw.id, raw.node_type, e),
        })?
        .ok_or_else(|| EaforgeError::UnknownNodeType {
            node_id: raw.id.clone(),
            node_type: raw.node_type.clone(),
        })?;
    Ok(Node {
        id: raw.id,
        data,
        optimizable_fields: raw.optimizable_fields,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_nodes_edges_and_settings() {
        let doc = GraphDocument::from_json(
            r#"{
                "version": 1,
                "nodes": [
                    { "id": "ma", "type": "moving-average", "data": { "period": 30 },
                      "optimizableFields": ["period"] },
                    { "id": "buy", "type": "place-buy" }
                ],
                "edges": [{ "source": "ma", "target": "buy" }],
                "settings": { "eaName": "Demo", "magicNumber": 42 }
            }"#,
        )
        .unwrap();
        assert_eq!(doc.nodes.len(), 2);
        assert!(doc.nodes[0].is_optimizable("period"));
        assert_eq!(doc.edges[0].target, "buy");
        assert_eq!(doc.settings.ea_name, "Demo");
        assert_eq!(doc.settings.magic_number, 42);
    }

    #[test]
    fn unknown_type_is_named() {
        let err = GraphDocument::from_json(
            r#"{ "nodes": [{ "id": "x", "type": "martingale-magic" }] }"#,
        )
        .unwrap_err();
        match err {
            EaforgeError::UnknownNodeType { node_id, node_type } => {
                assert_eq!(node_id, "x");
                assert_eq!(node_type, "martingale-magic");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn bad_payload_names_node() {
        let err = GraphDocument::from_json(
            r#"{ "nodes": [{ "id": "r", "type": "rsi", "data": { "period": [] } }] }"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("node r (rsi)"));
    }

    #[test]
    fn wrong_version_rejected() {
        let err = GraphDocument::from_json(r#"{ "version": 7 }"#).unwrap_err();
        assert!(matches!(err, EaforgeError::InvalidDocument { .. }));
    }

    #[test]
    fn malformed_json_is_json_error() {
        let err = GraphDocument::from_json("{ nodes: ").unwrap_err();
        assert!(matches!(err, EaforgeError::Json(_)));
    }
}
