//! Sample rule hierarchy used by `flowr seed` and `flowr demo`.
//!
//! ```text
//! A -> [B, C]
//! C -> [D, E]   (multiple paths)
//! E -> [A]
//! ```

use flowr_core::{
    CoreError, DeclaredRule, FlowEngine, FlowId, FlowNodeData, RuleId, RuleRegistry, RuleSet,
    State,
};
use serde_json::Value;

pub const A: &str = "sample::A";
pub const B: &str = "sample::B";
pub const C: &str = "sample::C";
pub const D: &str = "sample::D";
pub const E: &str = "sample::E";

pub const RULE_SET_NAME: &str = "Sample Rules";
pub const SIMPLE_FLOW: &str = "Simple Flow";
pub const LOOPING_FLOW: &str = "Branching, Looping Flow";

fn traced(label: &'static str) -> DeclaredRule {
    DeclaredRule::new(label)
        .on_enter(move |state: &State| {
            tracing::info!("State {} entering {}", state.id(), label);
            Ok(())
        })
        .on_leave(move |state: &State| {
            tracing::info!("State {} leaving {}", state.id(), label);
            Ok(())
        })
}

fn render_review(context: &Value, data: &FlowNodeData) -> Result<String, CoreError> {
    let title = context
        .get("title")
        .and_then(Value::as_str)
        .unwrap_or("Review");
    Ok(format!(
        "<form data-rule=\"{}\"><h1>{}</h1><button>Approve</button></form>",
        data.rule, title
    ))
}

/// Builds the registry of sample rules.
pub fn registry() -> Result<RuleRegistry, CoreError> {
    let mut registry = RuleRegistry::new();
    registry.register(traced(A).with_children([B, C]))?;
    registry.register(traced(B))?;
    registry.register(
        traced(C)
            .with_children([D, E])
            .with_multiple_paths(true),
    )?;
    registry.register(traced(D).with_edit_screen(render_review))?;
    registry.register(traced(E).with_children([A]))?;
    Ok(registry)
}

/// Flows created by [`seed`].
#[derive(Debug)]
pub struct Seeded {
    pub rule_set: RuleSet,
    pub simple: FlowId,
    pub looping: FlowId,
}

/// Creates the sample rule set and its two flows.
pub fn seed(engine: &FlowEngine) -> Result<Seeded, CoreError> {
    let rule_set = engine.create_rule_set(RULE_SET_NAME, RuleId::from(A))?;

    let simple = engine.create_flow(SIMPLE_FLOW, rule_set.id)?;
    engine.add_child_rule(simple.id(), simple.root(), RuleId::from(B))?;

    let looping = engine.create_flow(LOOPING_FLOW, rule_set.id)?;
    let root = looping.root();
    let c = engine.add_child_rule(looping.id(), root, RuleId::from(C))?;
    engine.add_child_rule(looping.id(), c, RuleId::from(D))?;
    let e = engine.add_child_rule(looping.id(), c, RuleId::from(E))?;
    engine.connect_child(looping.id(), e, root)?;

    Ok(Seeded {
        rule_set,
        simple: simple.id(),
        looping: looping.id(),
    })
}
