//! Rule declarations.
//!
//! A rule is a static description of one kind of step: which rules may
//! follow it, whether more than one of them may follow at once, and what
//! happens when a state enters or leaves a node bound to it.

use crate::error::CoreError;
use crate::flow::FlowNodeData;
use crate::state::State;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Fully qualified rule label, e.g. `"billing::Invoice"`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleId(pub String);

impl RuleId {
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RuleId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for RuleId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Behaviour attached to a rule label.
///
/// Hooks run with the state as it was before the transition. An `Err`
/// from a hook aborts the step and leaves the state where it was.
pub trait Rule: Send + Sync {
    /// Fully qualified label, unique within a registry.
    fn label(&self) -> &str;

    /// Display name: the last `::` segment of the label.
    fn name(&self) -> &str {
        let label = self.label();
        label.rsplit("::").next().unwrap_or(label)
    }

    /// Rules that may follow this one, in declaration order.
    fn children(&self) -> Vec<RuleId>;

    /// Whether a flow node bound to this rule may have one child per
    /// declared child rule instead of exactly one.
    fn multiple_paths(&self) -> bool {
        false
    }

    fn has_edit_screen(&self) -> bool {
        false
    }

    fn on_enter(&self, _state: &State) -> Result<(), CoreError> {
        Ok(())
    }

    fn on_leave(&self, _state: &State) -> Result<(), CoreError> {
        Ok(())
    }

    /// Renders the editor for a flow node bound to this rule.
    fn edit_screen(&self, _context: &Value, _data: &FlowNodeData) -> Result<String, CoreError> {
        Err(CoreError::EditScreenNotImplemented {
            rule: self.label().to_string(),
        })
    }

    fn id(&self) -> RuleId {
        RuleId::new(self.label())
    }
}

type Hook = Arc<dyn Fn(&State) -> Result<(), CoreError> + Send + Sync>;
type EditScreen = Arc<dyn Fn(&Value, &FlowNodeData) -> Result<String, CoreError> + Send + Sync>;

/// Rule built from plain values and optional closures.
#[derive(Clone)]
pub struct DeclaredRule {
    label: String,
    children: Vec<RuleId>,
    multiple_paths: bool,
    on_enter: Option<Hook>,
    on_leave: Option<Hook>,
    edit_screen: Option<EditScreen>,
}

impl DeclaredRule {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            children: Vec::new(),
            multiple_paths: false,
            on_enter: None,
            on_leave: None,
            edit_screen: None,
        }
    }

    pub fn with_children<I, R>(mut self, children: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<RuleId>,
    {
        self.children = children.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_multiple_paths(mut self, multiple_paths: bool) -> Self {
        self.multiple_paths = multiple_paths;
        self
    }

    pub fn on_enter<F>(mut self, hook: F) -> Self
    where
        F: Fn(&State) -> Result<(), CoreError> + Send + Sync + 'static,
    {
        self.on_enter = Some(Arc::new(hook));
        self
    }

    pub fn on_leave<F>(mut self, hook: F) -> Self
    where
        F: Fn(&State) -> Result<(), CoreError> + Send + Sync + 'static,
    {
        self.on_leave = Some(Arc::new(hook));
        self
    }

    pub fn with_edit_screen<F>(mut self, render: F) -> Self
    where
        F: Fn(&Value, &FlowNodeData) -> Result<String, CoreError> + Send + Sync + 'static,
    {
        self.edit_screen = Some(Arc::new(render));
        self
    }
}

impl fmt::Debug for DeclaredRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeclaredRule")
            .field("label", &self.label)
            .field("children", &self.children)
            .field("multiple_paths", &self.multiple_paths)
            .field("has_edit_screen", &self.edit_screen.is_some())
            .finish()
    }
}

impl Rule for DeclaredRule {
    fn label(&self) -> &str {
        &self.label
    }

    fn children(&self) -> Vec<RuleId> {
        self.children.clone()
    }

    fn multiple_paths(&self) -> bool {
        self.multiple_paths
    }

    fn has_edit_screen(&self) -> bool {
        self.edit_screen.is_some()
    }

    fn on_enter(&self, state: &State) -> Result<(), CoreError> {
        match &self.on_enter {
            Some(hook) => hook(state),
            None => Ok(()),
        }
    }

    fn on_leave(&self, state: &State) -> Result<(), CoreError> {
        match &self.on_leave {
            Some(hook) => hook(state),
            None => Ok(()),
        }
    }

    fn edit_screen(&self, context: &Value, data: &FlowNodeData) -> Result<String, CoreError> {
        match &self.edit_screen {
            Some(render) => render(context, data),
            None => Err(CoreError::EditScreenNotImplemented {
                rule: self.label.clone(),
            }),
        }
    }
}
