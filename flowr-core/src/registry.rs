//! Rule registry.
//!
//! Resolves rule labels to rule behaviour. Flows and rule sets store only
//! labels, so the same registry has to be supplied when they are loaded.

use crate::error::CoreError;
use crate::rule::{Rule, RuleId};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Label-to-rule lookup table.
#[derive(Default, Clone)]
pub struct RuleRegistry {
    rules: BTreeMap<RuleId, Arc<dyn Rule>>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a rule under its label.
    pub fn register<R: Rule + 'static>(&mut self, rule: R) -> Result<(), CoreError> {
        let id = rule.id();
        if self.rules.contains_key(&id) {
            return Err(CoreError::DuplicateRule { rule: id.0 });
        }
        tracing::debug!("Registered rule {}", id);
        self.rules.insert(id, Arc::new(rule));
        Ok(())
    }

    /// Looks up a rule by label.
    pub fn get(&self, id: &RuleId) -> Result<Arc<dyn Rule>, CoreError> {
        self.rules
            .get(id)
            .cloned()
            .ok_or_else(|| CoreError::RuleNotFound {
                rule: id.to_string(),
            })
    }

    pub fn contains(&self, id: &RuleId) -> bool {
        self.rules.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Registered labels, sorted.
    pub fn labels(&self) -> Vec<RuleId> {
        self.rules.keys().cloned().collect()
    }

    /// Checks that every declared child resolves to a registered rule and
    /// that no rule lists the same child twice.
    pub fn validate(&self) -> Result<(), CoreError> {
        for (id, rule) in &self.rules {
            let children = rule.children();
            for (i, child) in children.iter().enumerate() {
                if !self.rules.contains_key(child) {
                    return Err(CoreError::InvalidRuleGraph {
                        reason: format!("rule {} declares unknown child {}", id, child),
                    });
                }
                if children[..i].contains(child) {
                    return Err(CoreError::InvalidRuleGraph {
                        reason: format!("rule {} declares child {} twice", id, child),
                    });
                }
            }
        }
        Ok(())
    }
}

impl fmt::Debug for RuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleRegistry")
            .field("rules", &self.rules.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::DeclaredRule;

    #[test]
    fn test_register_and_get() {
        let mut registry = RuleRegistry::new();
        registry
            .register(DeclaredRule::new("r::A").with_children(["r::B"]))
            .unwrap();
        registry.register(DeclaredRule::new("r::B")).unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get(&RuleId::from("r::A")).unwrap().name(), "A");
        assert!(matches!(
            registry.get(&RuleId::from("r::Z")),
            Err(CoreError::RuleNotFound { .. })
        ));
        registry.validate().unwrap();
    }

    #[test]
    fn test_duplicate_rule() {
        let mut registry = RuleRegistry::new();
        registry.register(DeclaredRule::new("r::A")).unwrap();
        let result = registry.register(DeclaredRule::new("r::A"));
        assert!(matches!(result, Err(CoreError::DuplicateRule { .. })));
    }

    #[test]
    fn test_validate_unknown_child() {
        let mut registry = RuleRegistry::new();
        registry
            .register(DeclaredRule::new("r::A").with_children(["r::Missing"]))
            .unwrap();
        assert!(matches!(
            registry.validate(),
            Err(CoreError::InvalidRuleGraph { .. })
        ));
    }

    #[test]
    fn test_validate_repeated_child() {
        let mut registry = RuleRegistry::new();
        registry
            .register(DeclaredRule::new("r::A").with_children(["r::B", "r::B"]))
            .unwrap();
        registry.register(DeclaredRule::new("r::B")).unwrap();
        assert!(matches!(
            registry.validate(),
            Err(CoreError::InvalidRuleGraph { .. })
        ));
    }
}
