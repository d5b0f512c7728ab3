//! Serialized graph form.
//!
//! Only child edges are stored; parent edges are rebuilt on load. A raw
//! graph is validated before it becomes a [`Graph`]: the payload kind must
//! match, every edge must point at a stored node, and every node must be
//! reachable from the root.

use crate::error::GraphError;
use crate::graph::Graph;
use crate::node::{GraphId, NodeData, NodeEntry};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Raw graph as stored/transmitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphRaw<T> {
    pub id: GraphId,

    /// Payload kind the graph was created with.
    pub kind: String,

    pub root: u64,

    /// Next index to allocate; always above every stored index.
    pub next_index: u64,

    pub nodes: Vec<NodeRaw<T>>,
}

/// Raw node: index, child indexes and payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRaw<T> {
    pub index: u64,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<u64>,

    pub data: T,
}

impl<T: NodeData> Graph<T> {
    /// Returns the raw form of this graph.
    pub fn to_raw(&self) -> GraphRaw<T> {
        GraphRaw {
            id: self.id,
            kind: T::KIND.to_string(),
            root: self.root,
            next_index: self.next_index,
            nodes: self
                .nodes
                .iter()
                .map(|(&index, entry)| NodeRaw {
                    index,
                    children: entry.children.iter().copied().collect(),
                    data: entry.data.clone(),
                })
                .collect(),
        }
    }

    /// Validates a raw graph and builds the in-memory form.
    pub fn from_raw(raw: GraphRaw<T>) -> Result<Self, GraphError> {
        if raw.kind != T::KIND {
            return Err(GraphError::InvalidPayloadType {
                expected: T::KIND.to_string(),
                found: raw.kind,
            });
        }

        let mut nodes = BTreeMap::new();
        let mut edges = Vec::new();
        for node in raw.nodes {
            if node.index >= raw.next_index {
                return Err(GraphError::InvalidGraph {
                    reason: format!(
                        "node index {} is not below next index {}",
                        node.index, raw.next_index
                    ),
                });
            }
            for &child in &node.children {
                edges.push((node.index, child));
            }
            if nodes.insert(node.index, NodeEntry::new(node.data)).is_some() {
                return Err(GraphError::InvalidGraph {
                    reason: format!("duplicate node index {}", node.index),
                });
            }
        }

        if !nodes.contains_key(&raw.root) {
            return Err(GraphError::InvalidGraph {
                reason: format!("root node {} not in node list", raw.root),
            });
        }

        for (parent, child) in edges {
            if !nodes.contains_key(&child) {
                return Err(GraphError::InvalidGraph {
                    reason: format!("edge {} -> {} targets a missing node", parent, child),
                });
            }
            if let Some(entry) = nodes.get_mut(&parent) {
                entry.children.insert(child);
            }
            if let Some(entry) = nodes.get_mut(&child) {
                entry.parents.insert(parent);
            }
        }

        let graph = Self {
            id: raw.id,
            root: raw.root,
            next_index: raw.next_index,
            nodes,
        };

        let mut reached = BTreeSet::from([graph.root]);
        let mut stack = vec![graph.root];
        while let Some(current) = stack.pop() {
            if let Some(entry) = graph.nodes.get(&current) {
                for &child in &entry.children {
                    if reached.insert(child) {
                        stack.push(child);
                    }
                }
            }
        }
        if reached.len() != graph.nodes.len() {
            return Err(GraphError::InvalidGraph {
                reason: format!(
                    "{} node(s) not reachable from the root",
                    graph.nodes.len() - reached.len()
                ),
            });
        }

        Ok(graph)
    }
}
