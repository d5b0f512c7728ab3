//! Flows: graphs of rule-bound nodes.
//!
//! Every edge added to a flow is checked against the rule hierarchy of the
//! node it leaves. A node bound to a single-path rule takes one child; a
//! node bound to a multi-path rule takes at most one child per declared
//! child rule, never two children for the same rule.

use crate::error::CoreError;
use crate::id::{FlowId, RuleSetId};
use crate::registry::RuleRegistry;
use crate::rule::{Rule, RuleId};
use crate::rule_set::RuleSet;
use flowr_graph::{Graph, GraphError, GraphRaw, NodeData, NodeId, Topology};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Payload of a flow node: the rule the node is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowNodeData {
    pub rule: RuleId,
}

impl FlowNodeData {
    pub fn new(rule: impl Into<RuleId>) -> Self {
        Self { rule: rule.into() }
    }
}

impl NodeData for FlowNodeData {
    const KIND: &'static str = "flowr.flow_node";
}

/// Serialized flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowRecord {
    pub id: FlowId,
    pub name: String,
    pub rule_set: RuleSetId,
    pub graph: GraphRaw<FlowNodeData>,
}

/// A named graph of rule-bound nodes.
#[derive(Clone)]
pub struct Flow {
    id: FlowId,
    name: String,
    rule_set: RuleSetId,
    graph: Graph<FlowNodeData>,
    rules: Arc<RuleRegistry>,
}

impl Flow {
    /// Creates a flow whose root is bound to the rule set's root rule.
    pub fn create(
        name: impl Into<String>,
        rule_set: &RuleSet,
        rules: Arc<RuleRegistry>,
    ) -> Result<Self, CoreError> {
        rules.get(&rule_set.root)?;
        let graph = Graph::create(FlowNodeData::new(rule_set.root.clone()));
        let flow = Self {
            id: FlowId::new(),
            name: name.into(),
            rule_set: rule_set.id,
            graph,
            rules,
        };

        tracing::debug!(
            "Created flow {} ({}) rooted at {}",
            flow.name,
            flow.id,
            rule_set.root
        );

        Ok(flow)
    }

    /// Restores a flow, checking every node's rule is registered.
    pub fn from_record(record: FlowRecord, rules: Arc<RuleRegistry>) -> Result<Self, CoreError> {
        let graph = Graph::from_raw(record.graph)?;
        for node in graph.node_ids() {
            rules.get(&graph.data(node)?.rule)?;
        }

        Ok(Self {
            id: record.id,
            name: record.name,
            rule_set: record.rule_set,
            graph,
            rules,
        })
    }

    pub fn to_record(&self) -> FlowRecord {
        FlowRecord {
            id: self.id,
            name: self.name.clone(),
            rule_set: self.rule_set,
            graph: self.graph.to_raw(),
        }
    }

    pub fn id(&self) -> FlowId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rule_set(&self) -> RuleSetId {
        self.rule_set
    }

    pub fn graph(&self) -> &Graph<FlowNodeData> {
        &self.graph
    }

    pub fn root(&self) -> NodeId {
        self.graph.root()
    }

    pub fn root_data(&self) -> Result<&FlowNodeData, CoreError> {
        Ok(self.graph.data(self.graph.root())?)
    }

    /// Returns the rule a node is bound to.
    pub fn rule_of(&self, node: NodeId) -> Result<Arc<dyn Rule>, CoreError> {
        let data = self.graph.data(node)?;
        self.rules.get(&data.rule)
    }

    /// Rules that could still be added under `node` right now.
    pub fn allowed_children(&self, node: NodeId) -> Result<Vec<RuleId>, CoreError> {
        let rule = self.rule_of(node)?;
        let present = self.child_rules(node)?;
        if present.len() >= max_children(rule.as_ref()) {
            return Ok(Vec::new());
        }
        Ok(rule
            .children()
            .into_iter()
            .filter(|c| !present.contains(c))
            .collect())
    }

    // =========================================================================
    // Building
    // =========================================================================

    /// Adds a new node bound to `child_rule` under `node`.
    pub fn add_child_rule(&mut self, node: NodeId, child_rule: RuleId) -> Result<NodeId, CoreError> {
        self.check_child(node, &child_rule)?;
        let child = self.graph.add_child(node, FlowNodeData::new(child_rule))?;

        tracing::debug!("Flow {}: added {} under {}", self.id, child, node);

        Ok(child)
    }

    /// Wires an existing node under `node`. This is how loops are built.
    pub fn connect_child(&mut self, node: NodeId, existing: NodeId) -> Result<(), CoreError> {
        if existing.graph != self.graph.id() {
            return Err(GraphError::CrossGraphConnection {
                parent: node,
                child: existing,
            }
            .into());
        }
        let child_rule = self.graph.data(existing)?.rule.clone();
        self.check_child(node, &child_rule)?;
        self.graph.connect_child(node, existing)?;

        tracing::debug!("Flow {}: connected {} under {}", self.id, existing, node);

        Ok(())
    }

    fn check_child(&self, node: NodeId, candidate: &RuleId) -> Result<(), CoreError> {
        let rule = self.rule_of(node)?;
        let present = self.child_rules(node)?;

        let max = max_children(rule.as_ref());
        if present.len() >= max {
            return Err(CoreError::ArityExceeded {
                rule: rule.label().to_string(),
                max,
            });
        }

        if present.contains(candidate) {
            return Err(CoreError::DuplicateChild {
                rule: rule.label().to_string(),
                child: candidate.to_string(),
            });
        }

        if !rule.children().contains(candidate) {
            return Err(CoreError::IllegalTransition {
                parent: rule.label().to_string(),
                child: candidate.to_string(),
            });
        }

        Ok(())
    }

    fn child_rules(&self, node: NodeId) -> Result<Vec<RuleId>, CoreError> {
        self.graph
            .children(node)?
            .into_iter()
            .map(|c| Ok(self.graph.data(c)?.rule.clone()))
            .collect()
    }

    // =========================================================================
    // Removal
    // =========================================================================

    pub fn can_remove(&self, node: NodeId) -> Result<bool, CoreError> {
        Ok(self.graph.can_remove(node)?)
    }

    /// Removes a single node; see [`Graph::remove`].
    pub fn remove_node(&mut self, node: NodeId) -> Result<FlowNodeData, CoreError> {
        let data = self.graph.remove(node)?;
        tracing::debug!("Flow {}: removed {} ({})", self.id, node, data.rule);
        Ok(data)
    }

    /// Nodes [`Flow::prune_node`] would remove.
    pub fn prune_list(&self, node: NodeId) -> Result<BTreeSet<NodeId>, CoreError> {
        Ok(self.graph.prune_list(node)?)
    }

    /// Removes a node and everything below it up to the root.
    pub fn prune_node(&mut self, node: NodeId) -> Result<Vec<FlowNodeData>, CoreError> {
        let removed = self.graph.prune(node)?;
        tracing::debug!(
            "Flow {}: pruned {} node(s) starting at {}",
            self.id,
            removed.len(),
            node
        );
        Ok(removed)
    }

    // =========================================================================
    // Presentation
    // =========================================================================

    /// Exports the flow graph with each node's rule display name.
    pub fn export_topology(&self) -> Topology {
        self.graph.export_topology(|_, data| {
            let name = self
                .rules
                .get(&data.rule)
                .map(|r| r.name().to_string())
                .unwrap_or_else(|_| data.rule.to_string());
            let mut extra = Map::new();
            extra.insert("name".to_string(), Value::String(name));
            extra
        })
    }

    /// Renders the edit screen of the rule bound to `node`.
    pub fn edit_screen(&self, node: NodeId, context: &Value) -> Result<String, CoreError> {
        let rule = self.rule_of(node)?;
        if !rule.has_edit_screen() {
            return Err(CoreError::EditScreenNotImplemented {
                rule: rule.label().to_string(),
            });
        }
        rule.edit_screen(context, self.graph.data(node)?)
    }
}

fn max_children(rule: &dyn Rule) -> usize {
    if rule.multiple_paths() {
        rule.children().len()
    } else {
        1
    }
}

impl fmt::Debug for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Flow")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("rule_set", &self.rule_set)
            .field("graph", &self.graph)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::DeclaredRule;
    use serde_json::json;

    fn sample_rules() -> Arc<RuleRegistry> {
        let mut registry = RuleRegistry::new();
        registry
            .register(DeclaredRule::new("t::A").with_children(["t::B", "t::C"]))
            .unwrap();
        registry.register(DeclaredRule::new("t::B")).unwrap();
        registry
            .register(
                DeclaredRule::new("t::C")
                    .with_children(["t::D", "t::E"])
                    .with_multiple_paths(true),
            )
            .unwrap();
        registry
            .register(DeclaredRule::new("t::D").with_edit_screen(|_, data| {
                Ok(format!("editing {}", data.rule))
            }))
            .unwrap();
        registry
            .register(DeclaredRule::new("t::E").with_children(["t::A"]))
            .unwrap();
        registry.validate().unwrap();
        Arc::new(registry)
    }

    fn new_flow(name: &str) -> Flow {
        let rules = sample_rules();
        let rule_set = RuleSet::create("Rules", RuleId::from("t::A"), &rules).unwrap();
        Flow::create(name, &rule_set, rules).unwrap()
    }

    fn rule(label: &str) -> RuleId {
        RuleId::from(label)
    }

    #[test]
    fn test_create_binds_root() {
        let flow = new_flow("Flow");
        assert_eq!(flow.root_data().unwrap().rule, rule("t::A"));
        assert_eq!(flow.graph().node_count(), 1);
        assert_eq!(flow.rule_of(flow.root()).unwrap().name(), "A");
    }

    #[test]
    fn test_single_path_arity() {
        let mut flow = new_flow("Simple Flow");
        let root = flow.root();
        flow.add_child_rule(root, rule("t::B")).unwrap();

        let result = flow.add_child_rule(root, rule("t::C"));
        assert!(matches!(result, Err(CoreError::ArityExceeded { max: 1, .. })));
        assert!(flow.allowed_children(root).unwrap().is_empty());
    }

    #[test]
    fn test_illegal_transition() {
        let mut flow = new_flow("Flow");
        let root = flow.root();
        let result = flow.add_child_rule(root, rule("t::D"));
        assert!(matches!(result, Err(CoreError::IllegalTransition { .. })));
        assert_eq!(flow.graph().node_count(), 1);
    }

    #[test]
    fn test_multiple_paths() {
        let mut flow = new_flow("Flow");
        let c = flow.add_child_rule(flow.root(), rule("t::C")).unwrap();

        assert_eq!(
            flow.allowed_children(c).unwrap(),
            vec![rule("t::D"), rule("t::E")]
        );
        flow.add_child_rule(c, rule("t::D")).unwrap();

        let dup = flow.add_child_rule(c, rule("t::D"));
        assert!(matches!(dup, Err(CoreError::DuplicateChild { .. })));
        assert_eq!(flow.allowed_children(c).unwrap(), vec![rule("t::E")]);

        flow.add_child_rule(c, rule("t::E")).unwrap();
        let full = flow.add_child_rule(c, rule("t::D"));
        assert!(matches!(full, Err(CoreError::ArityExceeded { max: 2, .. })));
    }

    #[test]
    fn test_connect_loop() {
        let mut flow = new_flow("Branching, Looping Flow");
        let root = flow.root();
        let c = flow.add_child_rule(root, rule("t::C")).unwrap();
        flow.add_child_rule(c, rule("t::D")).unwrap();
        let e = flow.add_child_rule(c, rule("t::E")).unwrap();

        flow.connect_child(e, root).unwrap();
        assert_eq!(flow.graph().children(e).unwrap(), vec![root]);
        assert_eq!(flow.graph().edge_count(), 4);

        // E is single-path and already points at A.
        let again = flow.connect_child(e, root);
        assert!(matches!(again, Err(CoreError::ArityExceeded { .. })));
    }

    #[test]
    fn test_connect_illegal() {
        let mut flow = new_flow("Flow");
        let root = flow.root();
        let c = flow.add_child_rule(root, rule("t::C")).unwrap();
        let d = flow.add_child_rule(c, rule("t::D")).unwrap();

        let result = flow.connect_child(d, root);
        assert!(matches!(result, Err(CoreError::IllegalTransition { .. })));
    }

    #[test]
    fn test_connect_foreign_node() {
        let mut flow = new_flow("Flow");
        let other = new_flow("Other");
        let root = flow.root();

        let result = flow.connect_child(root, other.root());
        assert!(matches!(
            result,
            Err(CoreError::Graph(GraphError::CrossGraphConnection { .. }))
        ));
    }

    #[test]
    fn test_remove_and_prune() {
        let mut flow = new_flow("Flow");
        let root = flow.root();
        let c = flow.add_child_rule(root, rule("t::C")).unwrap();
        let d = flow.add_child_rule(c, rule("t::D")).unwrap();
        let e = flow.add_child_rule(c, rule("t::E")).unwrap();
        flow.connect_child(e, root).unwrap();

        assert!(!flow.can_remove(c).unwrap());
        assert!(flow.can_remove(d).unwrap());
        assert_eq!(flow.prune_list(c).unwrap(), BTreeSet::from([c, d, e]));

        let removed = flow.remove_node(d).unwrap();
        assert_eq!(removed.rule, rule("t::D"));

        let pruned = flow.prune_node(c).unwrap();
        assert_eq!(pruned.len(), 2);
        assert_eq!(flow.graph().node_count(), 1);

        let root_prune = flow.prune_node(root);
        assert!(matches!(
            root_prune,
            Err(CoreError::Graph(GraphError::UnremovableNode { .. }))
        ));
    }

    #[test]
    fn test_export_topology() {
        let mut flow = new_flow("Flow");
        let root = flow.root();
        flow.add_child_rule(root, rule("t::B")).unwrap();

        let json = serde_json::to_value(flow.export_topology()).unwrap();
        assert_eq!(
            json,
            json!({
                "nodes": [
                    {"data": {"id": "n0", "name": "A"}},
                    {"data": {"id": "n1", "name": "B"}}
                ],
                "edges": [
                    {"data": {"id": "e0_1", "source": "n0", "target": "n1"}}
                ]
            })
        );
    }

    #[test]
    fn test_edit_screen() {
        let mut flow = new_flow("Flow");
        let root = flow.root();
        let c = flow.add_child_rule(root, rule("t::C")).unwrap();
        let d = flow.add_child_rule(c, rule("t::D")).unwrap();

        assert_eq!(flow.edit_screen(d, &json!({})).unwrap(), "editing t::D");
        assert!(matches!(
            flow.edit_screen(root, &json!({})),
            Err(CoreError::EditScreenNotImplemented { .. })
        ));
    }

    #[test]
    fn test_record_restore() {
        let mut flow = new_flow("Flow");
        let root = flow.root();
        let c = flow.add_child_rule(root, rule("t::C")).unwrap();
        let e = flow.add_child_rule(c, rule("t::E")).unwrap();
        flow.connect_child(e, root).unwrap();

        let json = serde_json::to_value(flow.to_record()).unwrap();
        let record: FlowRecord = serde_json::from_value(json).unwrap();
        let restored = Flow::from_record(record, sample_rules()).unwrap();

        assert_eq!(restored.id(), flow.id());
        assert_eq!(restored.name(), "Flow");
        assert_eq!(restored.graph().children(e).unwrap(), vec![root]);
        assert_eq!(restored.export_topology(), flow.export_topology());
    }

    #[test]
    fn test_restore_unknown_rule() {
        let flow = new_flow("Flow");
        let mut registry = RuleRegistry::new();
        registry.register(DeclaredRule::new("t::B")).unwrap();

        let result = Flow::from_record(flow.to_record(), Arc::new(registry));
        assert!(matches!(result, Err(CoreError::RuleNotFound { .. })));
    }
}
