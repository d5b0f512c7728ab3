//! Rule sets.

use crate::error::CoreError;
use crate::id::RuleSetId;
use crate::registry::RuleRegistry;
use crate::rule::{Rule, RuleId};
use flowr_graph::Topology;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Named entry point into a rule hierarchy.
///
/// Rule sets are immutable once created; flows keep a reference to the
/// rule set they were built from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSet {
    pub id: RuleSetId,
    pub name: String,
    pub root: RuleId,
}

impl RuleSet {
    /// Creates a rule set rooted at a registered rule.
    pub fn create(
        name: impl Into<String>,
        root: RuleId,
        registry: &RuleRegistry,
    ) -> Result<Self, CoreError> {
        registry.get(&root)?;
        Ok(Self {
            id: RuleSetId::new(),
            name: name.into(),
            root,
        })
    }

    /// Every rule reachable from the root, depth-first in declaration
    /// order, each listed once.
    pub fn reachable_rules(&self, registry: &RuleRegistry) -> Result<Vec<Arc<dyn Rule>>, CoreError> {
        let mut seen = BTreeSet::new();
        let mut order = Vec::new();
        let mut stack = vec![self.root.clone()];

        while let Some(id) = stack.pop() {
            if !seen.insert(id.clone()) {
                continue;
            }
            let rule = registry.get(&id)?;
            let mut children = rule.children();
            children.reverse();
            stack.extend(children.into_iter().filter(|c| !seen.contains(c)));
            order.push(rule);
        }

        Ok(order)
    }

    /// Exports the reachable rule hierarchy, nodes and edges keyed by
    /// display name.
    pub fn export_topology(&self, registry: &RuleRegistry) -> Result<Topology, CoreError> {
        let mut topology = Topology::new();

        for rule in self.reachable_rules(registry)? {
            let name = rule.name().to_string();

            let mut extra = Map::new();
            extra.insert("label".to_string(), Value::String(name.clone()));
            topology.push_node(name.clone(), extra);

            for child in rule.children() {
                let child = registry.get(&child)?;
                topology.push_edge(
                    format!("{}_{}", name, child.name()),
                    name.clone(),
                    child.name().to_string(),
                );
            }
        }

        Ok(topology)
    }
}
