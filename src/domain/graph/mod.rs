//! Strategy graph model.
//!
//! Nodes keep document order. That order is the tie-break for everything the
//! compiler derives from the graph: emission order, name allocation and the
//! per-category ordinals used as identifier prefixes.

pub mod document;
pub mod node;
pub mod resolve;

use std::collections::HashMap;

use crate::domain::diagnostics::Diagnostics;
use crate::domain::error::EaforgeError;
pub use node::{NodeCategory, NodeData};

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: String,
    pub data: NodeData,
    pub optimizable_fields: Vec<String>,
}

impl Node {
    pub fn new(id: impl Into<String>, data: NodeData) -> Self {
        Self {
            id: id.into(),
            data,
            optimizable_fields: Vec::new(),
        }
    }

    pub fn with_optimizable(mut self, fields: &[&str]) -> Self {
        self.optimizable_fields = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    /// Whether `field` is exposed to the strategy tester's optimizer.
    pub fn is_optimizable(&self, field: &str) -> bool {
        self.optimizable_fields.iter().any(|f| f == field)
    }

    pub fn category(&self) -> NodeCategory {
        self.data.category()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    #[serde(default)]
    pub id: Option<String>,
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub source_handle: Option<String>,
    #[serde(default)]
    pub target_handle: Option<String>,
}

impl Edge {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            id: None,
            source: source.into(),
            target: target.into(),
            source_handle: None,
            target_handle: None,
        }
    }

    /// The other end of this edge if it touches `node_id`.
    pub fn other_end(&self, node_id: &str) -> Option<&str> {
        if self.source == node_id {
            Some(&self.target)
        } else if self.target == node_id {
            Some(&self.source)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone)]
pub struct StrategyGraph {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    index: HashMap<String, usize>,
    ordinals: HashMap<String, usize>,
}

impl StrategyGraph {
    /// Build the graph, rejecting duplicate ids and dropping edges whose
    /// endpoints do not exist.
    pub fn new(
        nodes: Vec<Node>,
        edges: Vec<Edge>,
        diag: &mut Diagnostics,
    ) -> Result<Self, EaforgeError> {
        let mut index = HashMap::with_capacity(nodes.len());
        for (i, node) in nodes.iter().enumerate() {
            if node.id.is_empty() {
                return Err(EaforgeError::InvalidDocument {
                    reason: format!("node at position {} has an empty id", i),
                });
            }
            if index.insert(node.id.clone(), i).is_some() {
                return Err(EaforgeError::DuplicateNodeId(node.id.clone()));
            }
        }

        let edges = edges
            .into_iter()
            .filter(|edge| {
                let known = index.contains_key(&edge.source) && index.contains_key(&edge.target);
                if !known {
                    diag.warn(
                        None,
                        format!(
                            "edge {} -> {} references a missing node and was ignored",
                            edge.source, edge.target
                        ),
                    );
                }
                known
            })
            .collect();

        let ordinals = assign_ordinals(&nodes);

        Ok(Self {
            nodes,
            edges,
            index,
            ordinals,
        })
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    /// Zero-based position of the node among nodes that share its prefix
    /// family (all indicators, all range-breakout nodes, all timing gates, ...).
    pub fn ordinal(&self, id: &str) -> usize {
        self.ordinals.get(id).copied().unwrap_or(0)
    }
}

/// Prefix family a node's ordinal is counted in.
fn ordinal_family(data: &NodeData) -> &'static str {
    match data {
        NodeData::RangeBreakout(_) => "range",
        NodeData::CandlestickPattern(_) => "candle",
        NodeData::TradingSession(_) | NodeData::CustomTimes(_) => "time",
        NodeData::MaxSpread(_) => "spread",
        NodeData::PartialClose(_) => "partial",
        NodeData::MultiLevelTp(_) => "multi-tp",
        NodeData::GridPyramid(_) => "grid",
        other => match other.category() {
            NodeCategory::Indicator => "indicator",
            _ => "other",
        },
    }
}

fn assign_ordinals(nodes: &[Node]) -> HashMap<String, usize> {
    let mut counters: HashMap<&'static str, usize> = HashMap::new();
    nodes
        .iter()
        .map(|node| {
            let counter = counters.entry(ordinal_family(&node.data)).or_insert(0);
            let ordinal = *counter;
            *counter += 1;
            (node.id.clone(), ordinal)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::node::*;
    use super::*;

    fn ma(id: &str) -> Node {
        Node::new(id, NodeData::MovingAverage(MovingAverageData::default()))
    }

    #[test]
    fn duplicate_ids_rejected() {
        let mut diag = Diagnostics::new();
        let err = StrategyGraph::new(vec![ma("a"), ma("a")], vec![], &mut diag).unwrap_err();
        assert!(matches!(err, EaforgeError::DuplicateNodeId(id) if id == "a"));
    }

    #[test]
    fn dangling_edges_are_dropped_with_warning() {
        let mut diag = Diagnostics::new();
        let graph = StrategyGraph::new(
            vec![ma("a"), ma("b")],
            vec![Edge::new("a", "b"), Edge::new("a", "ghost")],
            &mut diag,
        )
        .unwrap();
        assert_eq!(graph.edges().len(), 1);
        assert_eq!(diag.warnings().len(), 1);
    }

    #[test]
    fn ordinals_count_per_family() {
        let mut diag = Diagnostics::new();
        let nodes = vec![
            ma("m1"),
            Node::new("r1", NodeData::Rsi(RsiData::default())),
            Node::new("s1", NodeData::MaxSpread(MaxSpreadData::default())),
            ma("m2"),
        ];
        let graph = StrategyGraph::new(nodes, vec![], &mut diag).unwrap();
        assert_eq!(graph.ordinal("m1"), 0);
        assert_eq!(graph.ordinal("r1"), 1);
        assert_eq!(graph.ordinal("m2"), 2);
        assert_eq!(graph.ordinal("s1"), 0);
    }

    #[test]
    fn optimizable_lookup() {
        let node = ma("m").with_optimizable(&["period"]);
        assert!(node.is_optimizable("period"));
        assert!(!node.is_optimizable("method"));
    }
}
