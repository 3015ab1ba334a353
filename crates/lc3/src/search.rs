use std::collections::{BTreeSet, VecDeque};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::alloc::{Result, StateAllocator};
use crate::flow::FlowGraph;
use crate::state::StateId;

pub mod pruning;

pub use pruning::PruningSearcher;

/// Scheduling policy over the states waiting to be stepped.
pub trait Searcher {
    /// Select the next normal state to step, if any is eligible at the current level.
    fn fetch(&mut self, states: &mut StateAllocator) -> Result<Option<StateId>>;

    /// Hand over states produced by a step. States that are no longer normal are recorded as
    /// completed.
    fn push(&mut self, states: &mut StateAllocator, graph: &FlowGraph, pushed: &[StateId])
        -> Result<()>;

    /// States still waiting to run.
    fn normal_states(&self) -> Vec<StateId>;

    fn completed_states(&self) -> &BTreeSet<StateId>;

    fn remove_completed(&mut self, id: StateId);

    /// Lower priority states may only be fetched at a higher level.
    fn set_level(&mut self, _level: u32) {}

    /// Log searcher statistics at the end of a run.
    fn report(&self) {}
}

impl<S: Searcher + ?Sized> Searcher for Box<S> {
    fn fetch(&mut self, states: &mut StateAllocator) -> Result<Option<StateId>> {
        (**self).fetch(states)
    }

    fn push(
        &mut self,
        states: &mut StateAllocator,
        graph: &FlowGraph,
        pushed: &[StateId],
    ) -> Result<()> {
        (**self).push(states, graph, pushed)
    }

    fn normal_states(&self) -> Vec<StateId> {
        (**self).normal_states()
    }

    fn completed_states(&self) -> &BTreeSet<StateId> {
        (**self).completed_states()
    }

    fn remove_completed(&mut self, id: StateId) {
        (**self).remove_completed(id)
    }

    fn set_level(&mut self, level: u32) {
        (**self).set_level(level)
    }

    fn report(&self) {
        (**self).report()
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearcherKind {
    SimpleFifo,
    SimpleFilo,
    #[default]
    PrioritizedFilo,
    RandomPicking,

    /// Loop-aware pruning over a prioritized FILO searcher.
    Pruning,
}

/// Runs states in the order they were pushed.
#[derive(Clone, Debug, Default)]
pub struct SimpleFifo {
    normal: VecDeque<StateId>,
    completed: BTreeSet<StateId>,
}

impl Searcher for SimpleFifo {
    fn fetch(&mut self, _states: &mut StateAllocator) -> Result<Option<StateId>> {
        Ok(self.normal.pop_front())
    }

    fn push(
        &mut self,
        states: &mut StateAllocator,
        _graph: &FlowGraph,
        pushed: &[StateId],
    ) -> Result<()> {
        for id in pushed.iter().copied() {
            if states.get(id)?.is_normal() {
                self.normal.push_back(id);
            } else {
                self.completed.insert(id);
            }
        }
        Ok(())
    }

    fn normal_states(&self) -> Vec<StateId> {
        self.normal.iter().copied().collect()
    }

    fn completed_states(&self) -> &BTreeSet<StateId> {
        &self.completed
    }

    fn remove_completed(&mut self, id: StateId) {
        self.completed.remove(&id);
    }
}

/// Runs the most recently pushed state first.
#[derive(Clone, Debug, Default)]
pub struct SimpleFilo {
    normal: Vec<StateId>,
    completed: BTreeSet<StateId>,
}

impl Searcher for SimpleFilo {
    fn fetch(&mut self, _states: &mut StateAllocator) -> Result<Option<StateId>> {
        Ok(self.normal.pop())
    }

    fn push(
        &mut self,
        states: &mut StateAllocator,
        _graph: &FlowGraph,
        pushed: &[StateId],
    ) -> Result<()> {
        for id in pushed.iter().copied() {
            if states.get(id)?.is_normal() {
                self.normal.push(id);
            } else {
                self.completed.insert(id);
            }
        }
        Ok(())
    }

    fn normal_states(&self) -> Vec<StateId> {
        self.normal.clone()
    }

    fn completed_states(&self) -> &BTreeSet<StateId> {
        &self.completed
    }

    fn remove_completed(&mut self, id: StateId) {
        self.completed.remove(&id);
    }
}

/// Last in, first out, but states that just covered a new edge or segment go first.
#[derive(Clone, Debug, Default)]
pub struct PrioritizedFilo {
    fresh: Vec<StateId>,
    normal: Vec<StateId>,
    completed: BTreeSet<StateId>,
}

impl Searcher for PrioritizedFilo {
    fn fetch(&mut self, _states: &mut StateAllocator) -> Result<Option<StateId>> {
        Ok(self.fresh.pop().or_else(|| self.normal.pop()))
    }

    fn push(
        &mut self,
        states: &mut StateAllocator,
        _graph: &FlowGraph,
        pushed: &[StateId],
    ) -> Result<()> {
        for id in pushed.iter().copied() {
            let state = states.get(id)?;
            if !state.is_normal() {
                self.completed.insert(id);
            } else if state.covered_new_edge() || state.covered_new_segment() {
                self.fresh.push(id);
            } else {
                self.normal.push(id);
            }
        }
        Ok(())
    }

    fn normal_states(&self) -> Vec<StateId> {
        self.normal.iter().chain(&self.fresh).copied().collect()
    }

    fn completed_states(&self) -> &BTreeSet<StateId> {
        &self.completed
    }

    fn remove_completed(&mut self, id: StateId) {
        self.completed.remove(&id);
    }
}

/// Follows one randomly picked state until it completes, then picks again.
#[derive(Clone, Debug)]
pub struct RandomPicking {
    picked: Option<StateId>,
    others: Vec<StateId>,
    completed: BTreeSet<StateId>,
    rng: StdRng,
}

impl RandomPicking {
    pub fn new(seed: u64) -> Self {
        tracing::debug!(seed, "random picking searcher");
        Self {
            picked: None,
            others: Vec::new(),
            completed: BTreeSet::new(),
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Searcher for RandomPicking {
    fn fetch(&mut self, _states: &mut StateAllocator) -> Result<Option<StateId>> {
        if self.picked.is_none() && !self.others.is_empty() {
            let index = self.rng.gen_range(0..self.others.len());
            self.picked = Some(self.others.swap_remove(index));
        }
        Ok(self.picked)
    }

    fn push(
        &mut self,
        states: &mut StateAllocator,
        _graph: &FlowGraph,
        pushed: &[StateId],
    ) -> Result<()> {
        let last_picked = self.picked.take();
        for id in pushed.iter().copied() {
            if !states.get(id)?.is_normal() {
                self.completed.insert(id);
            } else if Some(id) == last_picked {
                self.picked = Some(id);
            } else {
                self.others.push(id);
            }
        }
        Ok(())
    }

    fn normal_states(&self) -> Vec<StateId> {
        self.others.iter().chain(&self.picked).copied().collect()
    }

    fn completed_states(&self) -> &BTreeSet<StateId> {
        &self.completed
    }

    fn remove_completed(&mut self, id: StateId) {
        self.completed.remove(&id);
    }
}
