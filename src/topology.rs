//! Namespace id to node name lookup, used in diagnostics.

use std::collections::HashMap;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Node {
    pub id: String,
    pub name: String,
}

#[derive(Clone, Debug, Default)]
pub struct TopologyMap {
    nodes: HashMap<String, Node>,
}

impl TopologyMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node, replacing any earlier node with the same id.
    pub fn add_node(&mut self, id: impl Into<String>, name: impl Into<String>) {
        let id = id.into();
        let node = Node {
            id: id.clone(),
            name: name.into(),
        };
        self.nodes.insert(id, node);
    }

    pub fn get_node(&self, ns_id: &str) -> Option<&Node> {
        self.nodes.get(ns_id)
    }

    /// Display name for `ns_id`, falling back to the id itself.
    pub fn node_name(&self, ns_id: &str) -> String {
        self.get_node(ns_id)
            .map(|node| node.name.clone())
            .unwrap_or_else(|| ns_id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_name_lookup() {
        let mut topo = TopologyMap::new();
        topo.add_node("ns-a1b2", "client-host");
        assert_eq!(topo.node_name("ns-a1b2"), "client-host");
        assert_eq!(topo.node_name("ns-ffff"), "ns-ffff");
    }

    #[test]
    fn test_add_node_replaces() {
        let mut topo = TopologyMap::new();
        topo.add_node("ns1", "old");
        topo.add_node("ns1", "new");
        assert_eq!(topo.get_node("ns1").map(|n| n.name.as_str()), Some("new"));
    }
}
