use crate::block::{BlockState, GLOBAL_STATE_COUNT};
use std::collections::HashMap;

/// Bidirectional id <-> block-state map backing a storage section.
///
/// The indirect variant assigns dense ids starting at 0 in insertion
/// order; id 0 is reserved for the storage's default value. The direct
/// variant is the identity over the global id space and has no growth
/// concept.
#[derive(Debug, Clone)]
pub enum Palette {
    Indirect {
        id_to_state: Vec<BlockState>,
        state_to_id: HashMap<BlockState, u32>,
    },
    Direct,
}

impl Palette {
    /// New indirect palette seeded with `default` at id 0.
    pub fn indirect(default: BlockState) -> Self {
        Palette::seeded(default, Vec::new())
    }

    /// Indirect palette with `default` at id 0 and `states` occupying
    /// ids 1..=N positionally, exactly as read off the wire. Duplicate
    /// states keep their first id.
    pub fn seeded(default: BlockState, states: Vec<BlockState>) -> Self {
        let mut id_to_state = Vec::with_capacity(states.len() + 1);
        let mut state_to_id = HashMap::with_capacity(states.len() + 1);
        id_to_state.push(default);
        state_to_id.insert(default, 0);
        for state in states {
            let id = id_to_state.len() as u32;
            id_to_state.push(state);
            state_to_id.entry(state).or_insert(id);
        }
        Palette::Indirect {
            id_to_state,
            state_to_id,
        }
    }

    pub fn is_direct(&self) -> bool {
        matches!(self, Palette::Direct)
    }

    /// Number of distinct entries. For the direct palette this is the
    /// whole global id space.
    pub fn len(&self) -> usize {
        match self {
            Palette::Indirect { id_to_state, .. } => id_to_state.len(),
            Palette::Direct => GLOBAL_STATE_COUNT as usize,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, id: u32) -> Option<BlockState> {
        match self {
            Palette::Indirect { id_to_state, .. } => id_to_state.get(id as usize).copied(),
            Palette::Direct => (id < GLOBAL_STATE_COUNT).then(|| BlockState::new(id)),
        }
    }

    /// Id of `state`, or `None` when the state is not in the palette.
    /// Callers use `None` to trigger insertion.
    pub fn id_of(&self, state: BlockState) -> Option<u32> {
        match self {
            Palette::Indirect { state_to_id, .. } => state_to_id.get(&state).copied(),
            Palette::Direct => Some(state.global_id()),
        }
    }

    /// Appends `state` under the next sequential id and returns that id.
    /// For an already-present state the existing id is returned. The
    /// direct palette is the identity, so add is a lookup there.
    pub fn add(&mut self, state: BlockState) -> u32 {
        match self {
            Palette::Indirect {
                id_to_state,
                state_to_id,
            } => {
                if let Some(id) = state_to_id.get(&state) {
                    return *id;
                }
                let id = id_to_state.len() as u32;
                id_to_state.push(state);
                state_to_id.insert(state, id);
                id
            }
            Palette::Direct => state.global_id(),
        }
    }
}
