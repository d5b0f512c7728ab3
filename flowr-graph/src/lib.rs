//! # flowr-graph
//!
//! Rooted, directed, cyclic graph for flowr.
//!
//! This crate provides:
//! - Arena-backed graphs with a single root and a typed payload per node
//! - Child/parent linkage, including cycles back to the root
//! - Global and root-bounded ancestor/descendant traversal
//! - Safe node removal and subtree pruning
//! - Topology export for graph-drawing tools

pub mod error;
pub mod graph;
pub mod node;
pub mod raw;
pub mod topology;

pub use error::GraphError;
pub use graph::{Graph, TreeSpec};
pub use node::{GraphId, NodeData, NodeId};
pub use raw::{GraphRaw, NodeRaw};
pub use topology::{EdgeAttributes, NodeAttributes, Topology, TopologyEdge, TopologyNode};
