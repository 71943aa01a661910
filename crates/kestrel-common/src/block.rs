use serde::{Deserialize, Serialize};

/// Number of block states in the global registry for protocol 754
/// (Minecraft 1.16.5). The direct palette spans exactly this id space.
pub const GLOBAL_STATE_COUNT: u32 = 17112;

/// A block state identified by its global registry id.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct BlockState(u32);

/// Air, global id 0. The default value of freshly allocated storage.
pub const AIR: BlockState = BlockState(0);

impl BlockState {
    pub fn new(global_id: u32) -> Self {
        BlockState(global_id)
    }

    pub fn global_id(self) -> u32 {
        self.0
    }
}

/// Smallest bit width able to represent every value in `0..count`.
pub fn bits_needed(count: u32) -> usize {
    let max = count.saturating_sub(1);
    (32 - max.leading_zeros()).max(1) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bits_needed_matches_registry_sizes() {
        assert_eq!(bits_needed(2), 1);
        assert_eq!(bits_needed(16), 4);
        assert_eq!(bits_needed(17), 5);
        assert_eq!(bits_needed(256), 8);
        assert_eq!(bits_needed(GLOBAL_STATE_COUNT), 15);
    }
}
