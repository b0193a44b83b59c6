//! Connection resolution between nodes.

use super::{Node, StrategyGraph};

impl StrategyGraph {
    /// Find the node `node_id` is wired to.
    ///
    /// An explicit reference stored on the node's payload wins. Otherwise the
    /// edges are scanned in document order, in either direction, and the first
    /// neighbour accepted by `accept` is returned.
    pub fn connected_node(&self, node_id: &str, accept: impl Fn(&Node) -> bool) -> Option<&Node> {
        let node = self.node(node_id)?;
        if let Some(explicit) = node.data.explicit_reference() {
            if let Some(target) = self.node(explicit) {
                if accept(target) {
                    return Some(target);
                }
            }
        }
        self.edges()
            .iter()
            .filter_map(|edge| edge.other_end(node_id))
            .filter(|&other| other != node_id)
            .filter_map(|other| self.node(other))
            .find(|candidate| accept(candidate))
    }
}
