//! Execution states.
//!
//! A state is a cursor over one flow. It starts at the flow's root and
//! moves one edge at a time, running the `on_leave` hook of the rule it
//! leaves and the `on_enter` hook of the rule it enters. If a hook fails
//! the cursor stays where it was.

use crate::error::CoreError;
use crate::flow::Flow;
use crate::id::{FlowId, StateId};
use crate::observer::StateObserver;
use crate::rule::{Rule, RuleId};
use flowr_graph::NodeId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Coarse position of a state within its flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateStatus {
    Unstarted,
    Active,
    /// Started, but the current node has no outgoing edges.
    Stuck,
}

impl fmt::Display for StateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StateStatus::Unstarted => "unstarted",
            StateStatus::Active => "active",
            StateStatus::Stuck => "stuck",
        };
        write!(f, "{}", s)
    }
}

/// Cursor over a flow.
#[derive(Clone, Serialize, Deserialize)]
pub struct State {
    id: StateId,
    flow: FlowId,
    current: Option<NodeId>,

    #[serde(skip)]
    observer: Option<Arc<dyn StateObserver>>,
}

impl State {
    /// Creates an unstarted state over `flow`.
    pub fn new(flow: FlowId) -> Self {
        Self {
            id: StateId::new(),
            flow,
            current: None,
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn StateObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn set_observer(&mut self, observer: Option<Arc<dyn StateObserver>>) {
        self.observer = observer;
    }

    pub fn id(&self) -> StateId {
        self.id
    }

    pub fn flow_id(&self) -> FlowId {
        self.flow
    }

    /// Node the cursor is on, if started.
    pub fn current(&self) -> Option<NodeId> {
        self.current
    }

    pub fn is_started(&self) -> bool {
        self.current.is_some()
    }

    pub fn status(&self, flow: &Flow) -> Result<StateStatus, CoreError> {
        self.check_flow(flow)?;
        match self.current {
            None => Ok(StateStatus::Unstarted),
            Some(node) if flow.graph().children(node)?.is_empty() => Ok(StateStatus::Stuck),
            Some(_) => Ok(StateStatus::Active),
        }
    }

    /// Places the cursor on the flow's root.
    pub fn start(&mut self, flow: &Flow) -> Result<NodeId, CoreError> {
        self.check_flow(flow)?;
        if self.current.is_some() {
            return Err(CoreError::AlreadyStarted {
                state: self.id.to_string(),
            });
        }

        let root = flow.root();
        let rule = flow.rule_of(root)?;
        self.enter(rule.as_ref())?;
        self.current = Some(root);

        tracing::debug!("State {} started at {} ({})", self.id, root, rule.label());

        Ok(root)
    }

    /// Moves the cursor to the next node.
    ///
    /// With a single outgoing edge the choice is ignored. At a multi-path
    /// rule with more than one declared child, `choice` names the rule of
    /// the child to move to.
    pub fn next_state(&mut self, flow: &Flow, choice: Option<&RuleId>) -> Result<NodeId, CoreError> {
        self.check_flow(flow)?;
        let current = self.current.ok_or_else(|| CoreError::NotStarted {
            state: self.id.to_string(),
        })?;

        let rule = flow.rule_of(current)?;
        let target = self.resolve_target(flow, current, rule.as_ref(), choice)?;
        let target_rule = flow.rule_of(target)?;

        self.leave(rule.as_ref())?;
        self.enter(target_rule.as_ref())?;
        self.current = Some(target);

        tracing::debug!(
            "State {} moved {} ({}) -> {} ({})",
            self.id,
            current,
            rule.label(),
            target,
            target_rule.label()
        );

        Ok(target)
    }

    fn resolve_target(
        &self,
        flow: &Flow,
        current: NodeId,
        rule: &dyn Rule,
        choice: Option<&RuleId>,
    ) -> Result<NodeId, CoreError> {
        let children = flow.graph().children(current)?;

        match children.as_slice() {
            [] => Err(CoreError::NoNextState {
                state: self.id.to_string(),
                flow: flow.id().to_string(),
            }),
            [only] => Ok(*only),
            _ if rule.multiple_paths() && rule.children().len() > 1 => {
                let choice = choice.ok_or_else(|| CoreError::ChoiceRequired {
                    rule: rule.label().to_string(),
                })?;
                for &child in &children {
                    if flow.graph().data(child)?.rule == *choice {
                        return Ok(child);
                    }
                }
                Err(CoreError::InvalidChoice {
                    rule: rule.label().to_string(),
                    choice: choice.to_string(),
                })
            }
            [first, ..] => Ok(*first),
        }
    }

    fn enter(&self, rule: &dyn Rule) -> Result<(), CoreError> {
        rule.on_enter(self)?;
        if let Some(observer) = &self.observer {
            observer.rule_entered(self, &rule.id());
        }
        Ok(())
    }

    fn leave(&self, rule: &dyn Rule) -> Result<(), CoreError> {
        rule.on_leave(self)?;
        if let Some(observer) = &self.observer {
            observer.rule_left(self, &rule.id());
        }
        Ok(())
    }

    fn check_flow(&self, flow: &Flow) -> Result<(), CoreError> {
        if flow.id() != self.flow {
            return Err(CoreError::FlowMismatch {
                state: self.id.to_string(),
                expected: self.flow.to_string(),
                actual: flow.id().to_string(),
            });
        }
        Ok(())
    }
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State")
            .field("id", &self.id)
            .field("flow", &self.flow)
            .field("current", &self.current)
            .field("observed", &self.observer.is_some())
            .finish()
    }
}
