//! Node identity and the payload contract.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

/// Identity of a graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GraphId(pub Uuid);

impl GraphId {
    /// Allocates a fresh graph identity.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for GraphId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for GraphId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "graph:{}", self.0)
    }
}

/// Handle to a node: the owning graph plus the node's index within it.
///
/// Indexes are allocated per graph and never reused, so a handle to a
/// removed node never aliases a later one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId {
    pub graph: GraphId,
    pub index: u64,
}

impl NodeId {
    pub fn new(graph: GraphId, index: u64) -> Self {
        Self { graph, index }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.index)
    }
}

/// Payload carried by every node of a graph.
///
/// `KIND` names the payload type. It is stored with a serialized graph so
/// that a graph can only be restored as the payload type it was built with.
pub trait NodeData: Clone + fmt::Debug + Serialize + DeserializeOwned {
    const KIND: &'static str;
}

/// Arena slot for a single node.
#[derive(Debug, Clone)]
pub(crate) struct NodeEntry<T> {
    pub(crate) parents: BTreeSet<u64>,
    pub(crate) children: BTreeSet<u64>,
    pub(crate) data: T,
}

impl<T> NodeEntry<T> {
    pub(crate) fn new(data: T) -> Self {
        Self {
            parents: BTreeSet::new(),
            children: BTreeSet::new(),
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_display() {
        let graph = GraphId::new();
        assert_eq!(NodeId::new(graph, 7).to_string(), "n7");
    }

    #[test]
    fn test_graph_ids_are_distinct() {
        assert_ne!(GraphId::new(), GraphId::new());
    }
}
