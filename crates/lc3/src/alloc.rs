use std::collections::BTreeMap;

use sym::ConstraintSet;
use thiserror;

use crate::image::ProgramImage;
use crate::mem::Memory;
use crate::state::{MachineState, StateId, Status};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The state was never allocated or has already been released.
    #[error("unknown state {0}")]
    UnknownState(StateId),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Owns every live [MachineState] and hands out their identities.
#[derive(Debug, Default)]
pub struct StateAllocator {
    states: BTreeMap<StateId, MachineState>,
    next_id: u64,
}

impl StateAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&mut self) -> StateId {
        let id = StateId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Create a state positioned at the entry of `image` with the given constraints.
    pub fn create_initial(&mut self, image: &ProgramImage, constraints: ConstraintSet) -> StateId {
        let id = self.next_id();
        let memory = Memory::new(image.cells.clone());
        self.states
            .insert(id, MachineState::new(id, memory, image.entry, constraints));
        id
    }

    /// Copy `parent` into a new state with a fresh identity.
    pub fn fork(&mut self, parent: StateId) -> Result<StateId> {
        let id = StateId(self.next_id);
        let child = self
            .states
            .get(&parent)
            .ok_or(Error::UnknownState(parent))?
            .fork(id);
        self.next_id += 1;
        self.states.insert(id, child);
        Ok(id)
    }

    /// Drop a state. Only terminal states should be released.
    pub fn release(&mut self, id: StateId) -> Option<MachineState> {
        let state = self.states.remove(&id);
        debug_assert!(
            state.as_ref().is_none_or(|s| s.status() != Status::Normal),
            "released state {id} is still running"
        );
        state
    }

    pub fn get(&self, id: StateId) -> Result<&MachineState> {
        self.states.get(&id).ok_or(Error::UnknownState(id))
    }

    pub fn get_mut(&mut self, id: StateId) -> Result<&mut MachineState> {
        self.states.get_mut(&id).ok_or(Error::UnknownState(id))
    }

    pub fn contains(&self, id: StateId) -> bool {
        self.states.contains_key(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MachineState> {
        self.states.values()
    }

    /// Number of states currently held.
    pub fn alive_count(&self) -> usize {
        self.states.len()
    }

    /// Number of states ever allocated.
    pub fn total_count(&self) -> u64 {
        self.next_id
    }
}
