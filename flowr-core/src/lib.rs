//! # flowr-core
//!
//! Rule-validated flow engine for flowr.
//!
//! This crate provides:
//! - Rule declarations and the registry that resolves them by label
//! - Rule sets: named entry points into a rule hierarchy
//! - Flows: graphs whose every edge is checked against the rule hierarchy
//! - States: cursors that walk a flow and fire rule hooks
//! - An engine that persists all of the above through a record store

pub mod engine;
pub mod error;
pub mod flow;
pub mod id;
pub mod observer;
pub mod registry;
pub mod rule;
pub mod rule_set;
pub mod state;

pub use engine::FlowEngine;
pub use error::CoreError;
pub use flow::{Flow, FlowNodeData, FlowRecord};
pub use id::{FlowId, RuleSetId, StateId};
pub use observer::{Recorder, StateObserver, Visit};
pub use registry::RuleRegistry;
pub use rule::{DeclaredRule, Rule, RuleId};
pub use rule_set::RuleSet;
pub use state::{State, StateStatus};
