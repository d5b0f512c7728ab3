//! Flow engine - coordinates rule sets, flows, states and the record store.
//!
//! Every mutation is applied to a copy of the affected flow or state,
//! written to the store, and only then swapped in. A failed validation,
//! hook or write leaves both memory and store untouched.
//!
//! Lock order: a flow's lock is always taken before a state's lock.

use crate::error::CoreError;
use crate::flow::{Flow, FlowNodeData, FlowRecord};
use crate::id::{FlowId, RuleSetId, StateId};
use crate::observer::StateObserver;
use crate::registry::RuleRegistry;
use crate::rule::RuleId;
use crate::rule_set::RuleSet;
use crate::state::State;
use dashmap::DashMap;
use flowr_graph::{NodeId, Topology};
use flowr_storage::{RecordKind, RecordStore};
use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::sync::Arc;

/// The flow engine.
pub struct FlowEngine {
    /// Rule lookup shared with every flow.
    rules: Arc<RuleRegistry>,

    rule_sets: DashMap<RuleSetId, Arc<RuleSet>>,

    /// A slot holds `None` once its record is deleted, so a caller that
    /// was waiting on the lock sees the deletion.
    flows: DashMap<FlowId, RwLock<Option<Flow>>>,

    states: DashMap<StateId, RwLock<Option<State>>>,

    store: Arc<dyn RecordStore>,
}

impl FlowEngine {
    /// Opens an engine over `store`, restoring every record it holds.
    pub fn open(rules: RuleRegistry, store: Arc<dyn RecordStore>) -> Result<Self, CoreError> {
        rules.validate()?;

        let engine = Self {
            rules: Arc::new(rules),
            rule_sets: DashMap::new(),
            flows: DashMap::new(),
            states: DashMap::new(),
            store,
        };

        engine.replay()?;

        Ok(engine)
    }

    fn replay(&self) -> Result<(), CoreError> {
        for (id, value) in self.store.list(RecordKind::RuleSet)? {
            let restored = serde_json::from_value::<RuleSet>(value)
                .map_err(CoreError::from)
                .and_then(|rs| self.rules.get(&rs.root).map(|_| rs));
            match restored {
                Ok(rule_set) => {
                    self.rule_sets.insert(rule_set.id, Arc::new(rule_set));
                }
                Err(e) => tracing::warn!("Skipping rule set {}: {}", id, e),
            }
        }

        for (id, value) in self.store.list(RecordKind::Flow)? {
            let restored = serde_json::from_value::<FlowRecord>(value)
                .map_err(CoreError::from)
                .and_then(|record| Flow::from_record(record, self.rules.clone()));
            match restored {
                Ok(flow) => {
                    if !self.rule_sets.contains_key(&flow.rule_set()) {
                        tracing::warn!(
                            "Flow {} references unknown rule set {}",
                            flow.id(),
                            flow.rule_set()
                        );
                    }
                    self.flows.insert(flow.id(), RwLock::new(Some(flow)));
                }
                Err(e) => tracing::warn!("Skipping flow {}: {}", id, e),
            }
        }

        for (id, value) in self.store.list(RecordKind::State)? {
            match serde_json::from_value::<State>(value) {
                Ok(state) if self.flows.contains_key(&state.flow_id()) => {
                    self.states.insert(state.id(), RwLock::new(Some(state)));
                }
                Ok(state) => {
                    tracing::warn!(
                        "Skipping state {}: flow {} not found",
                        id,
                        state.flow_id()
                    );
                }
                Err(e) => tracing::warn!("Skipping state {}: {}", id, e),
            }
        }

        if !self.rule_sets.is_empty() || !self.flows.is_empty() || !self.states.is_empty() {
            tracing::info!(
                "Recovery complete: {} rule sets, {} flows, {} states",
                self.rule_sets.len(),
                self.flows.len(),
                self.states.len()
            );
        }

        Ok(())
    }

    /// Returns the rule registry.
    pub fn rules(&self) -> &Arc<RuleRegistry> {
        &self.rules
    }

    // =========================================================================
    // Rule Sets
    // =========================================================================

    /// Creates and stores a rule set rooted at `root`.
    pub fn create_rule_set(&self, name: &str, root: RuleId) -> Result<RuleSet, CoreError> {
        let rule_set = RuleSet::create(name, root, &self.rules)?;

        self.store.put(
            RecordKind::RuleSet,
            &rule_set.id.to_string(),
            &serde_json::to_value(&rule_set)?,
        )?;
        self.rule_sets
            .insert(rule_set.id, Arc::new(rule_set.clone()));

        tracing::info!(
            "Created rule set {} ({}) rooted at {}",
            rule_set.name,
            rule_set.id,
            rule_set.root
        );

        Ok(rule_set)
    }

    pub fn get_rule_set(&self, id: RuleSetId) -> Result<Arc<RuleSet>, CoreError> {
        self.rule_sets
            .get(&id)
            .map(|r| r.clone())
            .ok_or_else(|| CoreError::RuleSetNotFound {
                rule_set: id.to_string(),
            })
    }

    /// Lists rule sets sorted by name.
    pub fn list_rule_sets(&self) -> Vec<Arc<RuleSet>> {
        let mut result: Vec<_> = self.rule_sets.iter().map(|r| r.value().clone()).collect();
        result.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        result
    }

    pub fn export_rule_set(&self, id: RuleSetId) -> Result<Topology, CoreError> {
        self.get_rule_set(id)?.export_topology(&self.rules)
    }

    // =========================================================================
    // Flows
    // =========================================================================

    /// Creates and stores an empty flow over a rule set.
    pub fn create_flow(&self, name: &str, rule_set: RuleSetId) -> Result<Flow, CoreError> {
        let rule_set = self.get_rule_set(rule_set)?;
        let flow = Flow::create(name, &rule_set, self.rules.clone())?;

        self.persist_flow(&flow)?;
        self.flows.insert(flow.id(), RwLock::new(Some(flow.clone())));

        tracing::info!("Created flow {} ({})", flow.name(), flow.id());

        Ok(flow)
    }

    /// Returns a copy of a flow.
    pub fn get_flow(&self, id: FlowId) -> Result<Flow, CoreError> {
        self.read_flow(id, |flow| Ok(flow.clone()))
    }

    /// Lists flows sorted by name.
    pub fn list_flows(&self) -> Vec<Flow> {
        let mut result: Vec<_> = self
            .flows
            .iter()
            .filter_map(|r| r.read().clone())
            .collect();
        result.sort_by(|a, b| a.name().cmp(b.name()).then(a.id().cmp(&b.id())));
        result
    }

    /// Returns true if any state runs over the flow.
    pub fn flow_in_use(&self, id: FlowId) -> bool {
        self.states.iter().any(|s| {
            s.read()
                .as_ref()
                .map(|state| state.flow_id() == id)
                .unwrap_or(false)
        })
    }

    /// Deletes a flow and its graph. Fails while states run over it.
    pub fn delete_flow(&self, id: FlowId) -> Result<(), CoreError> {
        {
            let lock = self.flows.get(&id).ok_or_else(|| flow_not_found(id))?;
            let mut flow = lock.write();
            if flow.is_none() {
                return Err(flow_not_found(id));
            }
            if self.flow_in_use(id) {
                return Err(CoreError::FlowInUse {
                    flow: id.to_string(),
                });
            }
            self.store.delete(RecordKind::Flow, &id.to_string())?;
            *flow = None;
        }
        self.flows.remove_if(&id, |_, slot| slot.read().is_none());

        tracing::info!("Deleted flow {}", id);

        Ok(())
    }

    pub fn export_flow(&self, id: FlowId) -> Result<Topology, CoreError> {
        self.read_flow(id, |flow| Ok(flow.export_topology()))
    }

    pub fn add_child_rule(
        &self,
        flow: FlowId,
        node: NodeId,
        child_rule: RuleId,
    ) -> Result<NodeId, CoreError> {
        self.mutate_flow(flow, |f| f.add_child_rule(node, child_rule))
    }

    pub fn connect_child(&self, flow: FlowId, node: NodeId, existing: NodeId) -> Result<(), CoreError> {
        self.mutate_flow(flow, |f| f.connect_child(node, existing))
    }

    pub fn remove_node(&self, flow: FlowId, node: NodeId) -> Result<FlowNodeData, CoreError> {
        self.mutate_flow(flow, |f| f.remove_node(node))
    }

    pub fn prune_list(&self, flow: FlowId, node: NodeId) -> Result<BTreeSet<NodeId>, CoreError> {
        self.read_flow(flow, |f| f.prune_list(node))
    }

    pub fn prune_node(&self, flow: FlowId, node: NodeId) -> Result<Vec<FlowNodeData>, CoreError> {
        self.mutate_flow(flow, |f| f.prune_node(node))
    }

    fn read_flow<R, F>(&self, id: FlowId, op: F) -> Result<R, CoreError>
    where
        F: FnOnce(&Flow) -> Result<R, CoreError>,
    {
        let lock = self.flows.get(&id).ok_or_else(|| flow_not_found(id))?;
        let flow = lock.read();
        op(flow.as_ref().ok_or_else(|| flow_not_found(id))?)
    }

    /// Applies `op` to a copy of the flow, persists the copy, then swaps it in.
    fn mutate_flow<R, F>(&self, id: FlowId, op: F) -> Result<R, CoreError>
    where
        F: FnOnce(&mut Flow) -> Result<R, CoreError>,
    {
        let lock = self.flows.get(&id).ok_or_else(|| flow_not_found(id))?;
        let mut slot = lock.write();
        let flow = slot.as_mut().ok_or_else(|| flow_not_found(id))?;

        if self.flow_in_use(id) {
            return Err(CoreError::FlowInUse {
                flow: id.to_string(),
            });
        }

        let mut draft = flow.clone();
        let result = op(&mut draft)?;
        self.persist_flow(&draft)?;
        *flow = draft;

        Ok(result)
    }

    fn persist_flow(&self, flow: &Flow) -> Result<(), CoreError> {
        let value = serde_json::to_value(flow.to_record())?;
        self.store
            .put(RecordKind::Flow, &flow.id().to_string(), &value)?;
        Ok(())
    }

    // =========================================================================
    // States
    // =========================================================================

    /// Creates and stores an unstarted state over a flow.
    pub fn create_state(
        &self,
        flow: FlowId,
        observer: Option<Arc<dyn StateObserver>>,
    ) -> Result<State, CoreError> {
        let lock = self.flows.get(&flow).ok_or_else(|| flow_not_found(flow))?;
        let slot = lock.read();
        if slot.is_none() {
            return Err(flow_not_found(flow));
        }

        let mut state = State::new(flow);
        state.set_observer(observer);

        self.persist_state(&state)?;
        self.states
            .insert(state.id(), RwLock::new(Some(state.clone())));

        tracing::debug!("Created state {} over flow {}", state.id(), flow);

        Ok(state)
    }

    /// Returns a copy of a state.
    pub fn get_state(&self, id: StateId) -> Result<State, CoreError> {
        self.states
            .get(&id)
            .and_then(|r| r.read().clone())
            .ok_or_else(|| state_not_found(id))
    }

    pub fn list_states(&self) -> Vec<State> {
        let mut result: Vec<_> = self
            .states
            .iter()
            .filter_map(|r| r.read().clone())
            .collect();
        result.sort_by_key(|s| s.id());
        result
    }

    /// Replaces the observer notified by a state's hooks.
    pub fn set_state_observer(
        &self,
        id: StateId,
        observer: Option<Arc<dyn StateObserver>>,
    ) -> Result<(), CoreError> {
        let lock = self.states.get(&id).ok_or_else(|| state_not_found(id))?;
        let mut slot = lock.write();
        slot.as_mut()
            .ok_or_else(|| state_not_found(id))?
            .set_observer(observer);
        Ok(())
    }

    pub fn start_state(&self, id: StateId) -> Result<NodeId, CoreError> {
        self.step_state(id, |state, flow| state.start(flow))
    }

    pub fn next_state(&self, id: StateId, choice: Option<&RuleId>) -> Result<NodeId, CoreError> {
        self.step_state(id, |state, flow| state.next_state(flow, choice))
    }

    /// Deletes a state. Waits for an in-flight step on it to finish.
    pub fn delete_state(&self, id: StateId) -> Result<(), CoreError> {
        {
            let lock = self.states.get(&id).ok_or_else(|| state_not_found(id))?;
            let mut state = lock.write();
            if state.is_none() {
                return Err(state_not_found(id));
            }
            self.store.delete(RecordKind::State, &id.to_string())?;
            *state = None;
        }
        self.states.remove_if(&id, |_, slot| slot.read().is_none());

        tracing::debug!("Deleted state {}", id);

        Ok(())
    }

    /// Runs `op` on a copy of the state, persists it, then swaps it in.
    fn step_state<F>(&self, id: StateId, op: F) -> Result<NodeId, CoreError>
    where
        F: FnOnce(&mut State, &Flow) -> Result<NodeId, CoreError>,
    {
        let flow_id = self.get_state(id)?.flow_id();
        let flow_lock = self
            .flows
            .get(&flow_id)
            .ok_or_else(|| flow_not_found(flow_id))?;
        let flow_slot = flow_lock.read();
        let flow = flow_slot.as_ref().ok_or_else(|| flow_not_found(flow_id))?;

        let state_lock = self.states.get(&id).ok_or_else(|| state_not_found(id))?;
        let mut state_slot = state_lock.write();
        let state = state_slot.as_mut().ok_or_else(|| state_not_found(id))?;

        let mut draft = state.clone();
        let node = op(&mut draft, flow)?;
        self.persist_state(&draft)?;
        *state = draft;

        Ok(node)
    }

    fn persist_state(&self, state: &State) -> Result<(), CoreError> {
        let value = serde_json::to_value(state)?;
        self.store
            .put(RecordKind::State, &state.id().to_string(), &value)?;
        Ok(())
    }
}

fn flow_not_found(id: FlowId) -> CoreError {
    CoreError::FlowNotFound {
        flow: id.to_string(),
    }
}

fn state_not_found(id: StateId) -> CoreError {
    CoreError::StateNotFound {
        state: id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::Recorder;
    use crate::rule::DeclaredRule;
    use flowr_storage::{FileStore, MemoryStore, StoreConfig};
    use std::sync::Barrier;
    use std::thread;
    use std::time::Duration;
    use tempfile::TempDir;

    fn rule(label: &str) -> RuleId {
        RuleId::from(label)
    }

    fn sample_rules() -> RuleRegistry {
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
        registry.register(DeclaredRule::new("t::D")).unwrap();
        registry
            .register(DeclaredRule::new("t::E").with_children(["t::A"]))
            .unwrap();
        registry
    }

    fn test_engine() -> FlowEngine {
        FlowEngine::open(sample_rules(), Arc::new(MemoryStore::new())).unwrap()
    }

    /// Builds A -> C -> {D, E}, E -> A.
    fn looping_flow(engine: &FlowEngine) -> (Flow, NodeId, NodeId, NodeId) {
        let rule_set = engine.create_rule_set("Rules", rule("t::A")).unwrap();
        let flow = engine
            .create_flow("Branching, Looping Flow", rule_set.id)
            .unwrap();
        let root = flow.root();
        let c = engine.add_child_rule(flow.id(), root, rule("t::C")).unwrap();
        let d = engine.add_child_rule(flow.id(), c, rule("t::D")).unwrap();
        let e = engine.add_child_rule(flow.id(), c, rule("t::E")).unwrap();
        engine.connect_child(flow.id(), e, root).unwrap();
        (engine.get_flow(flow.id()).unwrap(), c, d, e)
    }

    #[test]
    fn test_open_rejects_invalid_registry() {
        let mut registry = RuleRegistry::new();
        registry
            .register(DeclaredRule::new("t::A").with_children(["t::Missing"]))
            .unwrap();
        let result = FlowEngine::open(registry, Arc::new(MemoryStore::new()));
        assert!(matches!(result, Err(CoreError::InvalidRuleGraph { .. })));
    }

    #[test]
    fn test_rule_sets() {
        let engine = test_engine();
        let rule_set = engine.create_rule_set("Rules", rule("t::A")).unwrap();

        assert_eq!(engine.get_rule_set(rule_set.id).unwrap().root, rule("t::A"));
        assert_eq!(engine.list_rule_sets().len(), 1);
        assert_eq!(engine.export_rule_set(rule_set.id).unwrap().nodes.len(), 5);

        let missing = engine.get_rule_set(RuleSetId::new());
        assert!(matches!(missing, Err(CoreError::RuleSetNotFound { .. })));
        let unknown = engine.create_rule_set("Bad", rule("t::Nope"));
        assert!(matches!(unknown, Err(CoreError::RuleNotFound { .. })));
    }

    #[test]
    fn test_flow_mutations() {
        let engine = test_engine();
        let (flow, c, d, e) = looping_flow(&engine);

        assert_eq!(flow.graph().node_count(), 4);
        assert_eq!(flow.graph().edge_count(), 4);

        let illegal = engine.add_child_rule(flow.id(), d, rule("t::A"));
        assert!(matches!(illegal, Err(CoreError::IllegalTransition { .. })));

        assert_eq!(
            engine.prune_list(flow.id(), c).unwrap(),
            BTreeSet::from([c, d, e])
        );
        engine.remove_node(flow.id(), d).unwrap();
        let pruned = engine.prune_node(flow.id(), c).unwrap();
        assert_eq!(pruned.len(), 2);
        assert_eq!(engine.get_flow(flow.id()).unwrap().graph().node_count(), 1);
    }

    #[test]
    fn test_failed_mutation_leaves_flow_unchanged() {
        let engine = test_engine();
        let (flow, ..) = looping_flow(&engine);

        let result = engine.prune_node(flow.id(), flow.root());
        assert!(result.is_err());
        assert_eq!(
            engine.export_flow(flow.id()).unwrap(),
            flow.export_topology()
        );
    }

    #[test]
    fn test_flow_in_use() {
        let engine = test_engine();
        let (flow, _, d, _) = looping_flow(&engine);

        let state = engine.create_state(flow.id(), None).unwrap();
        assert!(engine.flow_in_use(flow.id()));

        let mutate = engine.remove_node(flow.id(), d);
        assert!(matches!(mutate, Err(CoreError::FlowInUse { .. })));
        let delete = engine.delete_flow(flow.id());
        assert!(matches!(delete, Err(CoreError::FlowInUse { .. })));

        engine.delete_state(state.id()).unwrap();
        assert!(!engine.flow_in_use(flow.id()));
        engine.delete_flow(flow.id()).unwrap();

        let gone = engine.get_flow(flow.id());
        assert!(matches!(gone, Err(CoreError::FlowNotFound { .. })));
    }

    #[test]
    fn test_run_looping_flow() {
        let engine = test_engine();
        let (flow, c, _, e) = looping_flow(&engine);

        let recorder = Arc::new(Recorder::new());
        let state = engine
            .create_state(flow.id(), Some(recorder.clone()))
            .unwrap();

        assert_eq!(engine.start_state(state.id()).unwrap(), flow.root());
        assert_eq!(engine.next_state(state.id(), None).unwrap(), c);

        let missing = engine.next_state(state.id(), None);
        assert!(matches!(missing, Err(CoreError::ChoiceRequired { .. })));
        assert_eq!(engine.get_state(state.id()).unwrap().current(), Some(c));

        assert_eq!(engine.next_state(state.id(), Some(&rule("t::E"))).unwrap(), e);
        assert_eq!(engine.next_state(state.id(), None).unwrap(), flow.root());

        assert_eq!(
            recorder.entered(),
            vec![rule("t::A"), rule("t::C"), rule("t::E"), rule("t::A")]
        );
        assert_eq!(recorder.left(), vec![rule("t::A"), rule("t::C"), rule("t::E")]);
    }

    #[test]
    fn test_state_not_found() {
        let engine = test_engine();
        let result = engine.start_state(StateId::new());
        assert!(matches!(result, Err(CoreError::StateNotFound { .. })));
        let delete = engine.delete_state(StateId::new());
        assert!(matches!(delete, Err(CoreError::StateNotFound { .. })));
    }

    #[test]
    fn test_reopen_restores_everything() {
        let dir = TempDir::new().unwrap();
        let open = || {
            let store = FileStore::open(StoreConfig::new(dir.path())).unwrap();
            FlowEngine::open(sample_rules(), Arc::new(store)).unwrap()
        };

        let (flow, state, c) = {
            let engine = open();
            let (flow, c, _, _) = looping_flow(&engine);
            let state = engine.create_state(flow.id(), None).unwrap();
            engine.start_state(state.id()).unwrap();
            engine.next_state(state.id(), None).unwrap();
            (flow, state, c)
        };

        let engine = open();
        assert_eq!(engine.list_rule_sets().len(), 1);
        assert_eq!(
            engine.export_flow(flow.id()).unwrap(),
            flow.export_topology()
        );

        let restored = engine.get_state(state.id()).unwrap();
        assert_eq!(restored.current(), Some(c));

        let recorder = Arc::new(Recorder::new());
        engine
            .set_state_observer(state.id(), Some(recorder.clone()))
            .unwrap();
        engine.next_state(state.id(), Some(&rule("t::D"))).unwrap();
        assert_eq!(recorder.entered(), vec![rule("t::D")]);
    }

    #[test]
    fn test_replay_skips_unknown_rules() {
        let store: Arc<dyn RecordStore> = Arc::new(MemoryStore::new());
        let flow_id = {
            let engine = FlowEngine::open(sample_rules(), store.clone()).unwrap();
            let (flow, ..) = looping_flow(&engine);
            flow.id()
        };

        let mut registry = RuleRegistry::new();
        registry.register(DeclaredRule::new("t::B")).unwrap();
        let engine = FlowEngine::open(registry, store).unwrap();

        assert!(engine.list_rule_sets().is_empty());
        let result = engine.get_flow(flow_id);
        assert!(matches!(result, Err(CoreError::FlowNotFound { .. })));
    }

    #[test]
    fn test_delete_state_waits_for_step() {
        let entered = Arc::new(Barrier::new(2));
        let release = Arc::new(Barrier::new(2));

        let mut registry = RuleRegistry::new();
        registry
            .register(DeclaredRule::new("t::A").with_children(["t::B"]))
            .unwrap();
        let (hook_entered, hook_release) = (entered.clone(), release.clone());
        registry
            .register(DeclaredRule::new("t::B").on_enter(move |_| {
                hook_entered.wait();
                hook_release.wait();
                Ok(())
            }))
            .unwrap();

        let store = Arc::new(MemoryStore::new());
        let engine = FlowEngine::open(registry, store.clone()).unwrap();
        let rule_set = engine.create_rule_set("Rules", rule("t::A")).unwrap();
        let flow = engine.create_flow("Flow", rule_set.id).unwrap();
        engine
            .add_child_rule(flow.id(), flow.root(), rule("t::B"))
            .unwrap();
        let state = engine.create_state(flow.id(), None).unwrap();
        engine.start_state(state.id()).unwrap();

        thread::scope(|scope| {
            let step = scope.spawn(|| engine.next_state(state.id(), None));
            entered.wait();
            let delete = scope.spawn(|| engine.delete_state(state.id()));
            thread::sleep(Duration::from_millis(50));
            release.wait();

            assert!(step.join().unwrap().is_ok());
            delete.join().unwrap().unwrap();
        });

        let key = state.id().to_string();
        assert!(store.get(RecordKind::State, &key).unwrap().is_none());
        assert!(matches!(
            engine.get_state(state.id()),
            Err(CoreError::StateNotFound { .. })
        ));
        assert!(matches!(
            engine.delete_state(state.id()),
            Err(CoreError::StateNotFound { .. })
        ));

        engine.delete_flow(flow.id()).unwrap();
        let orphan = engine.create_state(flow.id(), None);
        assert!(matches!(orphan, Err(CoreError::FlowNotFound { .. })));
        assert!(store.list(RecordKind::State).unwrap().is_empty());
    }
}
