//! Topology export for graph-drawing tools.
//!
//! The exported shape is consumed by external renderers and must stay
//! stable:
//!
//! ```json
//! {
//!   "nodes": [{"data": {"id": "n0", "name": "A"}}],
//!   "edges": [{"data": {"id": "e0_1", "source": "n0", "target": "n1"}}]
//! }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Node and edge lists describing a graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Topology {
    pub nodes: Vec<TopologyNode>,
    pub edges: Vec<TopologyEdge>,
}

/// A single exported node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopologyNode {
    pub data: NodeAttributes,
}

/// Exported node fields: the id plus any caller-supplied extras.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeAttributes {
    pub id: String,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A single exported edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopologyEdge {
    pub data: EdgeAttributes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeAttributes {
    pub id: String,
    pub source: String,
    pub target: String,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a node with the given id and extra fields.
    ///
    /// An `id` key in `extra` is ignored; the node id always wins.
    pub fn push_node(&mut self, id: impl Into<String>, mut extra: Map<String, Value>) {
        extra.remove("id");
        self.nodes.push(TopologyNode {
            data: NodeAttributes {
                id: id.into(),
                extra,
            },
        });
    }

    /// Appends an edge.
    pub fn push_edge(
        &mut self,
        id: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
    ) {
        self.edges.push(TopologyEdge {
            data: EdgeAttributes {
                id: id.into(),
                source: source.into(),
                target: target.into(),
            },
        });
    }

    /// Returns true if a node with the given id was exported.
    pub fn contains_node(&self, id: &str) -> bool {
        self.nodes.iter().any(|n| n.data.id == id)
    }

    /// Returns true if an edge from `source` to `target` was exported.
    pub fn contains_edge(&self, source: &str, target: &str) -> bool {
        self.edges
            .iter()
            .any(|e| e.data.source == source && e.data.target == target)
    }

    /// Serializes the topology to a JSON string.
    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_export_shape() {
        let mut topology = Topology::new();
        let mut extra = Map::new();
        extra.insert("name".to_string(), json!("A"));
        topology.push_node("n0", extra);
        topology.push_node("n1", Map::new());
        topology.push_edge("e0_1", "n0", "n1");

        let value = serde_json::to_value(&topology).unwrap();
        assert_eq!(
            value,
            json!({
                "nodes": [
                    {"data": {"id": "n0", "name": "A"}},
                    {"data": {"id": "n1"}}
                ],
                "edges": [
                    {"data": {"id": "e0_1", "source": "n0", "target": "n1"}}
                ]
            })
        );
    }

    #[test]
    fn test_extra_cannot_override_id() {
        let mut topology = Topology::new();
        let mut extra = Map::new();
        extra.insert("id".to_string(), json!("bogus"));
        topology.push_node("n3", extra);

        assert!(topology.contains_node("n3"));
        assert!(!topology.contains_node("bogus"));
    }

    #[test]
    fn test_parse_exported_json() {
        let text = r#"{"nodes":[{"data":{"id":"A","label":"A"}}],"edges":[{"data":{"id":"A_A","source":"A","target":"A"}}]}"#;
        let topology: Topology = serde_json::from_str(text).unwrap();
        assert_eq!(topology.nodes[0].data.extra["label"], json!("A"));
        assert!(topology.contains_edge("A", "A"));
    }

    #[test]
    fn test_to_json_string() {
        let mut topology = Topology::new();
        topology.push_node("n0", Map::new());

        let text = topology.to_json_string().unwrap();
        let parsed: Topology = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, topology);
        assert!(text.contains('\n'));
    }
}
