//! Rooted directed graph with cycles.
//!
//! Every node is reachable from the root by following child edges, but
//! edges may point anywhere in the same graph, including back at the root
//! or at the node itself. Nodes live in an arena keyed by a per-graph index
//! and edges are stored as index sets in both directions.

use crate::error::GraphError;
use crate::node::{GraphId, NodeData, NodeEntry, NodeId};
use crate::topology::Topology;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

/// Nested description of a tree to build below a root.
#[derive(Debug, Clone)]
pub struct TreeSpec<T> {
    pub data: T,
    pub children: Vec<TreeSpec<T>>,
}

impl<T> TreeSpec<T> {
    pub fn leaf(data: T) -> Self {
        Self {
            data,
            children: Vec::new(),
        }
    }

    pub fn branch(data: T, children: Vec<TreeSpec<T>>) -> Self {
        Self { data, children }
    }
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Up,
    Down,
}

/// A directed, root-connected graph whose nodes carry `T` payloads.
#[derive(Debug, Clone)]
pub struct Graph<T: NodeData> {
    pub(crate) id: GraphId,
    pub(crate) root: u64,
    pub(crate) next_index: u64,
    pub(crate) nodes: BTreeMap<u64, NodeEntry<T>>,
}

impl<T: NodeData> Graph<T> {
    /// Creates a graph together with its root node and the root's payload.
    pub fn create(root_data: T) -> Self {
        let id = GraphId::new();
        let mut nodes = BTreeMap::new();
        nodes.insert(0, NodeEntry::new(root_data));

        tracing::debug!("Created {} graph {}", T::KIND, id);

        Self {
            id,
            root: 0,
            next_index: 1,
            nodes,
        }
    }

    /// Creates a graph and builds the given tree below its root.
    ///
    /// Children are added in the order given. Only tree edges are created;
    /// cross links and cycles need subsequent [`Graph::connect_child`] calls.
    pub fn create_from_tree(root_data: T, children: Vec<TreeSpec<T>>) -> Self {
        let mut graph = Self::create(root_data);
        let root = graph.root;
        for child in children {
            graph.build_subtree(root, child);
        }
        graph
    }

    fn build_subtree(&mut self, parent: u64, spec: TreeSpec<T>) {
        let node = self.insert_child(parent, spec.data);
        for child in spec.children {
            self.build_subtree(node, child);
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn id(&self) -> GraphId {
        self.id
    }

    /// Returns the payload kind of this graph.
    pub fn kind(&self) -> &'static str {
        T::KIND
    }

    pub fn root(&self) -> NodeId {
        self.handle(self.root)
    }

    pub fn is_root(&self, node: NodeId) -> bool {
        node.graph == self.id && node.index == self.root
    }

    /// Returns true if the node belongs to this graph and has not been removed.
    pub fn contains(&self, node: NodeId) -> bool {
        node.graph == self.id && self.nodes.contains_key(&node.index)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Returns the number of parent -> child edges.
    pub fn edge_count(&self) -> usize {
        self.nodes.values().map(|n| n.children.len()).sum()
    }

    /// Returns all node handles in index order.
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.keys().map(|&i| self.handle(i)).collect()
    }

    pub fn data(&self, node: NodeId) -> Result<&T, GraphError> {
        let index = self.index_of(node)?;
        Ok(&self.entry(index)?.data)
    }

    pub fn data_mut(&mut self, node: NodeId) -> Result<&mut T, GraphError> {
        let index = self.index_of(node)?;
        let id = self.id;
        self.nodes
            .get_mut(&index)
            .map(|e| &mut e.data)
            .ok_or(GraphError::NodeNotFound { node, graph: id })
    }

    pub fn parents(&self, node: NodeId) -> Result<Vec<NodeId>, GraphError> {
        let index = self.index_of(node)?;
        Ok(self.handles(&self.entry(index)?.parents))
    }

    pub fn children(&self, node: NodeId) -> Result<Vec<NodeId>, GraphError> {
        let index = self.index_of(node)?;
        Ok(self.handles(&self.entry(index)?.children))
    }

    /// Returns the nodes whose payload matches the filter.
    pub fn find_nodes<F>(&self, filter: F) -> Vec<NodeId>
    where
        F: Fn(&T) -> bool,
    {
        self.nodes
            .iter()
            .filter(|(_, entry)| filter(&entry.data))
            .map(|(&i, _)| self.handle(i))
            .collect()
    }

    // =========================================================================
    // Linkage
    // =========================================================================

    /// Creates a new node carrying `data` as a child of `parent`.
    pub fn add_child(&mut self, parent: NodeId, data: T) -> Result<NodeId, GraphError> {
        let parent_index = self.index_of(parent)?;
        let index = self.insert_child(parent_index, data);

        tracing::debug!("Added {} as child of {} in {}", index, parent_index, self.id);

        Ok(self.handle(index))
    }

    /// Adds an edge from `parent` to an existing node.
    ///
    /// Cycles are allowed, including self-loops and edges back to the root.
    /// Connecting an already connected pair is a no-op.
    pub fn connect_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), GraphError> {
        let parent_index = self.index_of(parent)?;
        if child.graph != self.id {
            return Err(GraphError::CrossGraphConnection { parent, child });
        }
        let child_index = self.index_of(child)?;
        self.link(parent_index, child_index);

        tracing::debug!(
            "Connected {} -> {} in {}",
            parent_index,
            child_index,
            self.id
        );

        Ok(())
    }

    fn insert_child(&mut self, parent: u64, data: T) -> u64 {
        let index = self.next_index;
        self.next_index += 1;
        self.nodes.insert(index, NodeEntry::new(data));
        self.link(parent, index);
        index
    }

    fn link(&mut self, parent: u64, child: u64) {
        if let Some(entry) = self.nodes.get_mut(&parent) {
            entry.children.insert(child);
        }
        if let Some(entry) = self.nodes.get_mut(&child) {
            entry.parents.insert(parent);
        }
    }

    // =========================================================================
    // Traversal
    // =========================================================================

    /// Returns every node from which `node` can be reached, excluding itself.
    pub fn ancestors(&self, node: NodeId) -> Result<BTreeSet<NodeId>, GraphError> {
        let index = self.index_of(node)?;
        Ok(self.handle_set(self.walk(index, Direction::Up, false)))
    }

    /// Returns every node reachable from `node`, excluding itself.
    pub fn descendants(&self, node: NodeId) -> Result<BTreeSet<NodeId>, GraphError> {
        let index = self.index_of(node)?;
        Ok(self.handle_set(self.walk(index, Direction::Down, false)))
    }

    /// Like [`Graph::ancestors`], but never walks upstream of the root.
    ///
    /// The root is included when reached. Called on the root itself the
    /// result is empty.
    pub fn ancestors_bounded_by_root(
        &self,
        node: NodeId,
    ) -> Result<BTreeSet<NodeId>, GraphError> {
        let index = self.index_of(node)?;
        if index == self.root {
            return Ok(BTreeSet::new());
        }
        Ok(self.handle_set(self.walk(index, Direction::Up, true)))
    }

    /// Like [`Graph::descendants`], but never walks downstream of the root.
    ///
    /// The root is included when a cycle leads back to it.
    pub fn descendants_bounded_by_root(
        &self,
        node: NodeId,
    ) -> Result<BTreeSet<NodeId>, GraphError> {
        let index = self.index_of(node)?;
        Ok(self.handle_set(self.walk(index, Direction::Down, true)))
    }

    /// Depth-first closure from `start`. With `bounded`, the root is
    /// collected but not expanded. `start` is never part of the result.
    fn walk(&self, start: u64, direction: Direction, bounded: bool) -> BTreeSet<u64> {
        let mut visited = BTreeSet::new();
        let mut stack = vec![start];

        while let Some(current) = stack.pop() {
            let Some(entry) = self.nodes.get(&current) else {
                continue;
            };
            let next = match direction {
                Direction::Up => &entry.parents,
                Direction::Down => &entry.children,
            };
            for &n in next {
                if visited.insert(n) && !(bounded && n == self.root) {
                    stack.push(n);
                }
            }
        }

        visited.remove(&start);
        visited
    }

    /// Indexes reachable from the root when `skip` is treated as absent.
    fn reachable_without(&self, skip: &BTreeSet<u64>) -> BTreeSet<u64> {
        let mut visited = BTreeSet::new();
        if skip.contains(&self.root) {
            return visited;
        }
        visited.insert(self.root);
        let mut stack = vec![self.root];

        while let Some(current) = stack.pop() {
            let Some(entry) = self.nodes.get(&current) else {
                continue;
            };
            for &child in &entry.children {
                if !skip.contains(&child) && visited.insert(child) {
                    stack.push(child);
                }
            }
        }

        visited
    }

    // =========================================================================
    // Removal
    // =========================================================================

    /// Returns true if removing `node` keeps every other node reachable from
    /// the root.
    ///
    /// A node qualifies when it has no children or when all of its children
    /// are among its root-bounded ancestors. The root never qualifies.
    pub fn can_remove(&self, node: NodeId) -> Result<bool, GraphError> {
        let index = self.index_of(node)?;
        Ok(self.removable(index))
    }

    fn removable(&self, index: u64) -> bool {
        if index == self.root {
            return false;
        }
        let Some(entry) = self.nodes.get(&index) else {
            return false;
        };
        let children: Vec<u64> = entry
            .children
            .iter()
            .copied()
            .filter(|&c| c != index)
            .collect();
        if children.is_empty() {
            return true;
        }

        let ancestors = self.walk(index, Direction::Up, true);
        if !children.iter().all(|c| ancestors.contains(c)) {
            return false;
        }

        // an ancestor may itself only be reachable through this node
        let skip = BTreeSet::from([index]);
        self.reachable_without(&skip).len() == self.nodes.len() - 1
    }

    /// Removes a single node and returns its payload.
    pub fn remove(&mut self, node: NodeId) -> Result<T, GraphError> {
        let index = self.index_of(node)?;
        if !self.removable(index) {
            return Err(GraphError::UnremovableNode { node });
        }

        let data = self.detach(index)?;
        tracing::debug!("Removed node {} from {}", index, self.id);
        Ok(data)
    }

    /// Returns the nodes [`Graph::prune`] would remove: `node` plus its
    /// root-bounded descendants, never the root.
    pub fn prune_list(&self, node: NodeId) -> Result<BTreeSet<NodeId>, GraphError> {
        let index = self.index_of(node)?;
        Ok(self.handle_set(self.prune_targets(index, node)?))
    }

    /// Removes `node` and its root-bounded descendants and returns their
    /// payloads, `node`'s own payload first.
    pub fn prune(&mut self, node: NodeId) -> Result<Vec<T>, GraphError> {
        let index = self.index_of(node)?;
        let mut targets = self.prune_targets(index, node)?;
        targets.remove(&index);

        let mut removed = Vec::with_capacity(targets.len() + 1);
        removed.push(self.detach(index)?);
        for target in &targets {
            removed.push(self.detach(*target)?);
        }

        tracing::debug!(
            "Pruned {} node(s) below {} from {}",
            removed.len(),
            index,
            self.id
        );

        Ok(removed)
    }

    fn prune_targets(&self, index: u64, node: NodeId) -> Result<BTreeSet<u64>, GraphError> {
        if index == self.root {
            return Err(GraphError::UnremovableNode { node });
        }
        let mut targets = self.walk(index, Direction::Down, true);
        targets.remove(&self.root);
        targets.insert(index);
        Ok(targets)
    }

    /// Unlinks a node from all neighbours and takes it out of the arena.
    fn detach(&mut self, index: u64) -> Result<T, GraphError> {
        let entry = self
            .nodes
            .remove(&index)
            .ok_or_else(|| GraphError::NodeNotFound {
                node: NodeId::new(self.id, index),
                graph: self.id,
            })?;

        for parent in &entry.parents {
            if let Some(p) = self.nodes.get_mut(parent) {
                p.children.remove(&index);
            }
        }
        for child in &entry.children {
            if let Some(c) = self.nodes.get_mut(child) {
                c.parents.remove(&index);
            }
        }

        Ok(entry.data)
    }

    // =========================================================================
    // Export
    // =========================================================================

    /// Exports every node as `n<index>` and every edge as `e<src>_<dst>`.
    ///
    /// `extra_fields` attaches caller-defined key/value pairs to each node.
    pub fn export_topology<F>(&self, extra_fields: F) -> Topology
    where
        F: Fn(NodeId, &T) -> Map<String, Value>,
    {
        let mut topology = Topology::new();
        for (&index, entry) in &self.nodes {
            let handle = self.handle(index);
            topology.push_node(handle.to_string(), extra_fields(handle, &entry.data));
            for &child in &entry.children {
                topology.push_edge(
                    format!("e{}_{}", index, child),
                    format!("n{}", index),
                    format!("n{}", child),
                );
            }
        }
        topology
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn handle(&self, index: u64) -> NodeId {
        NodeId::new(self.id, index)
    }

    fn handles(&self, indexes: &BTreeSet<u64>) -> Vec<NodeId> {
        indexes.iter().map(|&i| self.handle(i)).collect()
    }

    fn handle_set(&self, indexes: BTreeSet<u64>) -> BTreeSet<NodeId> {
        indexes.into_iter().map(|i| self.handle(i)).collect()
    }

    fn index_of(&self, node: NodeId) -> Result<u64, GraphError> {
        if self.contains(node) {
            Ok(node.index)
        } else {
            Err(GraphError::NodeNotFound {
                node,
                graph: self.id,
            })
        }
    }

    fn entry(&self, index: u64) -> Result<&NodeEntry<T>, GraphError> {
        self.nodes
            .get(&index)
            .ok_or_else(|| GraphError::NodeNotFound {
                node: self.handle(index),
                graph: self.id,
            })
    }
}
