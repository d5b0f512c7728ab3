//! Command execution.

use crate::sample;
use crate::Commands;
use colored::Colorize;
use flowr_core::{CoreError, FlowEngine, FlowId, Recorder, RuleId, RuleRegistry};
use flowr_graph::NodeId;
use serde_json::Value;
use std::sync::Arc;

/// Executes a command and returns the formatted output.
pub fn execute(engine: &FlowEngine, cmd: Commands) -> Result<String, Box<dyn std::error::Error>> {
    match cmd {
        Commands::Seed => {
            let seeded = sample::seed(engine)?;
            Ok(format!(
                "{} rule set {} ({})\n{} flow {} ({})\n{} flow {} ({})",
                "Created".green(),
                seeded.rule_set.name.cyan(),
                seeded.rule_set.id,
                "Created".green(),
                sample::SIMPLE_FLOW.cyan(),
                seeded.simple,
                "Created".green(),
                sample::LOOPING_FLOW.cyan(),
                seeded.looping
            ))
        }

        Commands::Demo => {
            let seeded = sample::seed(engine)?;
            let simple = run(engine, seeded.simple, Vec::new(), 20)?;
            let looping = run(engine, seeded.looping, vec!["E".to_string()], 3)?;
            Ok(format!("{}\n\n{}", simple, looping))
        }

        Commands::RuleSets => {
            let rule_sets = engine.list_rule_sets();
            if rule_sets.is_empty() {
                return Ok("No rule sets".yellow().to_string());
            }
            let mut output = format!("{}\n", "Rule sets:".bold());
            for rule_set in rule_sets {
                output.push_str(&format!(
                    "  {} {} [root: {}]\n",
                    rule_set.id,
                    rule_set.name.cyan(),
                    rule_set.root
                ));
            }
            Ok(output.trim_end().to_string())
        }

        Commands::Flows => {
            let flows = engine.list_flows();
            if flows.is_empty() {
                return Ok("No flows".yellow().to_string());
            }
            let mut output = format!("{}\n", "Flows:".bold());
            for flow in flows {
                let in_use = if engine.flow_in_use(flow.id()) {
                    " (in use)".yellow().to_string()
                } else {
                    String::new()
                };
                output.push_str(&format!(
                    "  {} {} [nodes: {}, edges: {}]{}\n",
                    flow.id(),
                    flow.name().cyan(),
                    flow.graph().node_count(),
                    flow.graph().edge_count(),
                    in_use
                ));
            }
            Ok(output.trim_end().to_string())
        }

        Commands::States => {
            let states = engine.list_states();
            if states.is_empty() {
                return Ok("No states".yellow().to_string());
            }
            let mut output = format!("{}\n", "States:".bold());
            for state in states {
                let flow = engine.get_flow(state.flow_id())?;
                let at = match state.current() {
                    Some(node) => {
                        let rule = &flow.graph().data(node)?.rule;
                        format!(" at {}", rule_name(engine.rules(), rule))
                    }
                    None => String::new(),
                };
                output.push_str(&format!(
                    "  {} {} {}{}\n",
                    state.id(),
                    flow.name().cyan(),
                    state.status(&flow)?.to_string().yellow(),
                    at
                ));
            }
            Ok(output.trim_end().to_string())
        }

        Commands::ExportRules { id } => {
            Ok(engine.export_rule_set(id)?.to_json_string()?)
        }

        Commands::ExportFlow { id } => {
            Ok(engine.export_flow(id)?.to_json_string()?)
        }

        Commands::Run {
            flow,
            choices,
            max_steps,
        } => run(engine, flow, choices, max_steps),

        Commands::EditScreen {
            flow,
            node,
            context,
        } => {
            let flow = engine.get_flow(flow)?;
            let context: Value = match context {
                Some(s) => serde_json::from_str(&s)?,
                None => Value::Object(Default::default()),
            };
            let node = NodeId::new(flow.graph().id(), node);
            Ok(flow.edit_screen(node, &context)?)
        }

        Commands::DeleteFlow { id } => {
            engine.delete_flow(id)?;
            Ok(format!("{} flow {}", "Deleted".green(), id.to_string().cyan()))
        }

        Commands::DeleteState { id } => {
            engine.delete_state(id)?;
            Ok(format!("{} state {}", "Deleted".green(), id.to_string().cyan()))
        }
    }
}

/// Creates a state over `flow_id`, starts it and advances it up to
/// `max_steps` times, consuming one choice per multi-path step.
fn run(
    engine: &FlowEngine,
    flow_id: FlowId,
    choices: Vec<String>,
    max_steps: usize,
) -> Result<String, Box<dyn std::error::Error>> {
    let flow = engine.get_flow(flow_id)?;
    let recorder = Arc::new(Recorder::new());
    let state = engine.create_state(flow_id, Some(recorder.clone()))?;
    engine.start_state(state.id())?;

    let mut choices = choices.into_iter();
    let mut stopped = None;
    for _ in 0..max_steps {
        match engine.next_state(state.id(), None) {
            Ok(_) => {}
            Err(CoreError::ChoiceRequired { rule }) => {
                let Some(choice) = choices.next() else {
                    stopped = Some(format!("rule {} needs a --choice", rule));
                    break;
                };
                let choice = resolve_rule(engine.rules(), &choice)?;
                engine.next_state(state.id(), Some(&choice))?;
            }
            Err(CoreError::NoNextState { .. }) => {
                stopped = Some("no next state".to_string());
                break;
            }
            Err(e) => return Err(e.into()),
        }
    }

    let mut output = format!(
        "{} flow {} as state {}\n",
        "Running".green(),
        flow.name().cyan(),
        state.id()
    );
    for rule in recorder.entered() {
        output.push_str(&format!(
            "  {} {}\n",
            "->".dimmed(),
            rule_name(engine.rules(), &rule).yellow()
        ));
    }

    let status = engine.get_state(state.id())?.status(&flow)?;
    match stopped {
        Some(reason) => output.push_str(&format!("{} ({}): {}", "Stopped".yellow(), status, reason)),
        None => output.push_str(&format!(
            "{} after {} step(s) ({})",
            "Paused".yellow(),
            max_steps,
            status
        )),
    }

    Ok(output)
}

/// Resolves a rule given either its full label or its display name.
fn resolve_rule(registry: &RuleRegistry, input: &str) -> Result<RuleId, CoreError> {
    let id = RuleId::from(input);
    if registry.contains(&id) {
        return Ok(id);
    }
    registry
        .labels()
        .into_iter()
        .find(|label| {
            registry
                .get(label)
                .map(|rule| rule.name() == input)
                .unwrap_or(false)
        })
        .ok_or_else(|| CoreError::RuleNotFound {
            rule: input.to_string(),
        })
}

fn rule_name(registry: &RuleRegistry, rule: &RuleId) -> String {
    registry
        .get(rule)
        .map(|r| r.name().to_string())
        .unwrap_or_else(|_| rule.to_string())
}
