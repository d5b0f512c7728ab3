//! Core error types.

use thiserror::Error;

/// Errors from rules, flows, states and the engine.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("rule not found: {rule}")]
    RuleNotFound { rule: String },

    #[error("rule already registered: {rule}")]
    DuplicateRule { rule: String },

    #[error("invalid rule graph: {reason}")]
    InvalidRuleGraph { reason: String },

    #[error("rule {child} is not a valid child of rule {parent}")]
    IllegalTransition { parent: String, child: String },

    #[error("rule {rule} allows at most {max} child path(s)")]
    ArityExceeded { rule: String, max: usize },

    #[error("rule {rule} already has a child for rule {child}")]
    DuplicateChild { rule: String, child: String },

    #[error("current rule {rule} is multipath but no choice was passed in")]
    ChoiceRequired { rule: String },

    #[error("current rule {rule} is multipath and choice {choice} is not in the flow")]
    InvalidChoice { rule: String, choice: String },

    #[error("state {state} has not been started")]
    NotStarted { state: String },

    #[error("state {state} has already been started")]
    AlreadyStarted { state: String },

    #[error("no next state in flow {flow} for state {state}")]
    NoNextState { state: String, flow: String },

    #[error("state {state} belongs to flow {expected}, not {actual}")]
    FlowMismatch {
        state: String,
        expected: String,
        actual: String,
    },

    #[error("flow {flow} is in use by one or more states")]
    FlowInUse { flow: String },

    #[error("rule set not found: {rule_set}")]
    RuleSetNotFound { rule_set: String },

    #[error("flow not found: {flow}")]
    FlowNotFound { flow: String },

    #[error("state not found: {state}")]
    StateNotFound { state: String },

    #[error("rule {rule} does not implement an edit screen")]
    EditScreenNotImplemented { rule: String },

    #[error("hook failed in rule {rule}: {reason}")]
    Hook { rule: String, reason: String },

    #[error("graph error: {0}")]
    Graph(#[from] flowr_graph::GraphError),

    #[error("store error: {0}")]
    Store(#[from] flowr_storage::StoreError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    /// Builds a hook failure for the given rule.
    pub fn hook(rule: impl Into<String>, reason: impl Into<String>) -> Self {
        CoreError::Hook {
            rule: rule.into(),
            reason: reason.into(),
        }
    }

    /// Returns whether this error indicates the operation can be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::Store(e) if e.is_retryable())
    }

    /// Returns an error code suitable for boundary responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            CoreError::RuleNotFound { .. } => "RULE_NOT_FOUND",
            CoreError::DuplicateRule { .. } => "DUPLICATE_RULE",
            CoreError::InvalidRuleGraph { .. } => "BAD_REQUEST",
            CoreError::IllegalTransition { .. } => "ILLEGAL_TRANSITION",
            CoreError::ArityExceeded { .. } => "ARITY_EXCEEDED",
            CoreError::DuplicateChild { .. } => "DUPLICATE_CHILD",
            CoreError::ChoiceRequired { .. } => "CHOICE_REQUIRED",
            CoreError::InvalidChoice { .. } => "INVALID_CHOICE",
            CoreError::NotStarted { .. } => "NOT_STARTED",
            CoreError::AlreadyStarted { .. } => "NOT_STARTED",
            CoreError::NoNextState { .. } => "NO_NEXT_STATE",
            CoreError::FlowMismatch { .. } => "BAD_REQUEST",
            CoreError::FlowInUse { .. } => "FLOW_IN_USE",
            CoreError::RuleSetNotFound { .. } => "RULE_SET_NOT_FOUND",
            CoreError::FlowNotFound { .. } => "FLOW_NOT_FOUND",
            CoreError::StateNotFound { .. } => "STATE_NOT_FOUND",
            CoreError::EditScreenNotImplemented { .. } => "NOT_IMPLEMENTED",
            CoreError::Hook { .. } => "HOOK_FAILED",
            CoreError::Graph(e) => e.error_code(),
            CoreError::Store(e) => e.error_code(),
            CoreError::Json(_) => "BAD_REQUEST",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowr_storage::StoreError;

    #[test]
    fn test_is_retryable() {
        let io = CoreError::from(StoreError::Io(std::io::Error::other("disk busy")));
        assert!(io.is_retryable());
        assert_eq!(io.error_code(), "STORE_IO_ERROR");

        let corrupt = CoreError::from(StoreError::Corruption("bad checksum".to_string()));
        assert!(!corrupt.is_retryable());

        let in_use = CoreError::FlowInUse {
            flow: "f".to_string(),
        };
        assert!(!in_use.is_retryable());
        assert_eq!(in_use.error_code(), "FLOW_IN_USE");
    }

    #[test]
    fn test_hook_message() {
        let err = CoreError::hook("t::A", "boom");
        assert_eq!(err.to_string(), "hook failed in rule t::A: boom");
        assert_eq!(err.error_code(), "HOOK_FAILED");
    }
}
