use crate::bitarray::{FlexibleStorage, MIN_BITS_PER_ENTRY};
use crate::block::{bits_needed, BlockState, GLOBAL_STATE_COUNT};
use crate::buffer::PacketBuffer;
use crate::error::KestrelError;
use crate::palette::Palette;
use crate::types::Result;

/// Edge length of a storage section, in blocks.
pub const SECTION_DIM: usize = 16;
/// Entries in one section.
pub const SECTION_VOLUME: usize = SECTION_DIM * SECTION_DIM * SECTION_DIM;

/// Widths above this use the direct palette.
const MAX_INDIRECT_BITS: usize = 8;

fn malformed(msg: impl Into<String>) -> KestrelError {
    KestrelError::MalformedChunkData(msg.into())
}

/// Palette-compressed storage for one 16x16x16 section of block states.
///
/// Composes a [`FlexibleStorage`] with a [`Palette`]; both are replaced
/// together whenever the bit width grows. Widths widen one bit at a time
/// while the palette stays indirect; once `MAX_INDIRECT_BITS` is
/// exhausted the section switches to the direct palette for good.
#[derive(Debug, Clone)]
pub struct BlockStorage {
    bits: usize,
    storage: FlexibleStorage,
    palette: Palette,
    default: BlockState,
}

impl BlockStorage {
    pub fn new(default: BlockState) -> Self {
        Self {
            bits: MIN_BITS_PER_ENTRY,
            storage: FlexibleStorage::new(MIN_BITS_PER_ENTRY, SECTION_VOLUME),
            palette: Palette::indirect(default),
            default,
        }
    }

    pub fn bits_per_entry(&self) -> usize {
        self.bits
    }

    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    fn index(x: usize, y: usize, z: usize) -> usize {
        ((y * SECTION_DIM) + z) * SECTION_DIM + x
    }

    fn check_bounds(x: usize, y: usize, z: usize) {
        assert!(x < SECTION_DIM, "x coordinate {} out of bounds", x);
        assert!(y < SECTION_DIM, "y coordinate {} out of bounds", y);
        assert!(z < SECTION_DIM, "z coordinate {} out of bounds", z);
    }

    /// Block state at `(x, y, z)`.
    ///
    /// # Panics
    /// Panics if any coordinate is outside `0..16`.
    pub fn get(&self, x: usize, y: usize, z: usize) -> BlockState {
        Self::check_bounds(x, y, z);
        let id = self.storage.get(Self::index(x, y, z));
        self.palette.get(id).unwrap_or(self.default)
    }

    /// Stores `state` at `(x, y, z)`, growing the palette and bit width
    /// as needed.
    ///
    /// # Panics
    /// Panics if any coordinate is outside `0..16`.
    pub fn set(&mut self, x: usize, y: usize, z: usize, state: BlockState) {
        Self::check_bounds(x, y, z);
        let id = self.id_for(state);
        self.storage.set(Self::index(x, y, z), id);
    }

    /// Palette id for `state`, inserting it on first use. An insert that
    /// overflows the current width triggers exactly one migration: widen
    /// the indirect palette by one bit while `bits + 1` stays below the
    /// indirect maximum, otherwise switch to the direct palette.
    fn id_for(&mut self, state: BlockState) -> u32 {
        if let Some(id) = self.palette.id_of(state) {
            return id;
        }

        let id = self.palette.add(state);
        if (id as usize) < (1usize << self.bits) {
            return id;
        }

        let new_bits = self.bits + 1;
        if new_bits < MAX_INDIRECT_BITS {
            // Same ids, wider entries; a raw pointwise copy suffices.
            let mut widened = FlexibleStorage::new(new_bits, SECTION_VOLUME);
            for i in 0..SECTION_VOLUME {
                widened.set(i, self.storage.get(i));
            }
            self.storage = widened;
            self.bits = new_bits;
            id
        } else {
            // One-way switch: every stored id is re-encoded as its
            // state's global id at the direct width.
            let direct_bits = bits_needed(GLOBAL_STATE_COUNT);
            let mut migrated = FlexibleStorage::new(direct_bits, SECTION_VOLUME);
            for i in 0..SECTION_VOLUME {
                let old = self.storage.get(i);
                let state = self.palette.get(old).unwrap_or(self.default);
                migrated.set(i, state.global_id());
            }
            self.storage = migrated;
            self.palette = Palette::Direct;
            self.bits = direct_bits;
            state.global_id()
        }
    }

    /// Decodes a section payload, replacing this storage's palette and
    /// data array. The previous contents are only discarded once the new
    /// ones are fully built, so a decode failure leaves the section as
    /// it was.
    ///
    /// Wire layout: `u8` bits-per-entry, varint palette count, that many
    /// varint global ids (present but unused for the direct form), varint
    /// word count, that many big-endian `i64` words. Entries unpack in
    /// (y, z, x) order and never span a word boundary.
    pub fn read(&mut self, buffer: &mut PacketBuffer) -> Result<()> {
        let declared_bits = buffer.read_u8()? as usize;
        let palette_len = buffer.read_varint()?;
        if palette_len < 0 || palette_len as usize > SECTION_VOLUME {
            return Err(malformed(format!("palette length {}", palette_len)));
        }

        let bits = declared_bits.max(MIN_BITS_PER_ENTRY);
        let (bits, palette) = if bits <= MAX_INDIRECT_BITS {
            let mut states = Vec::with_capacity(palette_len as usize);
            for _ in 0..palette_len {
                let global_id = buffer.read_varint()? as u32;
                let state = Palette::Direct
                    .get(global_id)
                    .ok_or_else(|| malformed(format!("global id {} out of range", global_id)))?;
                states.push(state);
            }
            (bits, Palette::seeded(self.default, states))
        } else {
            // Direct form. The entries still occupy the stream and must
            // be consumed to keep position. The declared width is not
            // trusted past this branch: direct sections always unpack at
            // the global-id width, so a hostile width byte can at worst
            // make the word-count check fail, never widen a shift past
            // the word size.
            for _ in 0..palette_len {
                buffer.read_varint()?;
            }
            (bits_needed(GLOBAL_STATE_COUNT), Palette::Direct)
        };

        let word_count = buffer.read_varint()?;
        if word_count < 0 || word_count as usize > SECTION_VOLUME {
            return Err(malformed(format!("word count {}", word_count)));
        }
        let mut words = Vec::with_capacity(word_count as usize);
        for _ in 0..word_count {
            words.push(buffer.read_i64()? as u64);
        }

        let storage = unpack_words(&words, bits)?;

        self.storage = storage;
        self.palette = palette;
        self.bits = bits;
        Ok(())
    }

    /// Encodes this section in the layout `read` accepts. The indirect
    /// palette writes ids 1..=N (id 0 is the implied default); the direct
    /// palette writes a zero-length entry list for stream-position
    /// compatibility.
    pub fn write(&self, buffer: &mut PacketBuffer) {
        buffer.write_u8(self.bits as u8);
        match &self.palette {
            Palette::Indirect { id_to_state, .. } => {
                buffer.write_varint((id_to_state.len() - 1) as i32);
                for state in &id_to_state[1..] {
                    buffer.write_varint(state.global_id() as i32);
                }
            }
            Palette::Direct => buffer.write_varint(0),
        }
        buffer.write_varint(self.storage.words().len() as i32);
        for word in self.storage.words() {
            buffer.write_i64(*word as i64);
        }
    }
}

/// Unpacks `SECTION_VOLUME` entries from raw wire words, skipping to the
/// next word whenever fewer than `bits` bits remain in the current one.
fn unpack_words(words: &[u64], bits: usize) -> Result<FlexibleStorage> {
    let mut storage = FlexibleStorage::new(bits, SECTION_VOLUME);
    let mask = (1u64 << bits) - 1;
    let mut bit_offset = 0usize;

    for y in 0..SECTION_DIM {
        for z in 0..SECTION_DIM {
            for x in 0..SECTION_DIM {
                if 64 - (bit_offset % 64) < bits {
                    bit_offset += 64 - (bit_offset % 64);
                }
                let word = bit_offset / 64;
                let offset = bit_offset % 64;
                bit_offset += bits;

                let raw = words
                    .get(word)
                    .ok_or_else(|| malformed("data array too short for section"))?;
                storage.set(BlockStorage::index(x, y, z), ((raw >> offset) & mask) as u32);
            }
        }
    }

    Ok(storage)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::AIR;
    use assert_matches::assert_matches;

    #[test]
    fn new_storage_is_default_everywhere() {
        let storage = BlockStorage::new(AIR);
        for y in 0..SECTION_DIM {
            for z in 0..SECTION_DIM {
                for x in 0..SECTION_DIM {
                    assert_eq!(storage.get(x, y, z), AIR);
                }
            }
        }
        assert_eq!(storage.bits_per_entry(), 4);
    }

    #[test]
    fn set_then_get_round_trips() {
        let mut storage = BlockStorage::new(AIR);
        storage.set(0, 0, 0, BlockState::new(33));
        storage.set(15, 15, 15, BlockState::new(33));
        storage.set(7, 3, 9, BlockState::new(90));

        assert_eq!(storage.get(0, 0, 0), BlockState::new(33));
        assert_eq!(storage.get(15, 15, 15), BlockState::new(33));
        assert_eq!(storage.get(7, 3, 9), BlockState::new(90));
        assert_eq!(storage.get(1, 0, 0), AIR);
    }

    #[test]
    fn overflowing_insert_widens_once_and_preserves_values() {
        let mut storage = BlockStorage::new(AIR);

        // Default occupies id 0; fifteen more states fill the 4-bit
        // palette exactly.
        for i in 0..15u32 {
            storage.set(i as usize, 0, 0, BlockState::new(100 + i));
            assert_eq!(storage.bits_per_entry(), 4);
        }

        // The sixteenth distinct state overflows and widens to 5 bits.
        storage.set(15, 0, 0, BlockState::new(200));
        assert_eq!(storage.bits_per_entry(), 5);
        assert!(!storage.palette().is_direct());

        for i in 0..15u32 {
            assert_eq!(storage.get(i as usize, 0, 0), BlockState::new(100 + i));
        }
        assert_eq!(storage.get(15, 0, 0), BlockState::new(200));
        assert_eq!(storage.get(0, 8, 0), AIR);
    }

    #[test]
    fn exhausting_indirect_widths_switches_to_direct_once() {
        let mut storage = BlockStorage::new(AIR);

        // 200 distinct states blow through every indirect width
        // (4..=7 bits hold at most 128 entries).
        for i in 0..200u32 {
            let x = (i % 16) as usize;
            let z = ((i / 16) % 16) as usize;
            let y = (i / 256) as usize;
            storage.set(x, y, z, BlockState::new(1000 + i));
        }

        assert!(storage.palette().is_direct());
        assert_eq!(storage.bits_per_entry(), bits_needed(GLOBAL_STATE_COUNT));

        for i in 0..200u32 {
            let x = (i % 16) as usize;
            let z = ((i / 16) % 16) as usize;
            let y = (i / 256) as usize;
            assert_eq!(storage.get(x, y, z), BlockState::new(1000 + i));
        }

        // No shrink-back: further inserts stay direct.
        storage.set(0, 15, 0, BlockState::new(5));
        assert!(storage.palette().is_direct());
        assert_eq!(storage.get(0, 15, 0), BlockState::new(5));
    }

    /// Builds the wire form of a section whose cell ids follow `id_at`.
    fn encode_section(bits: usize, palette_entries: &[u32], id_at: impl Fn(usize) -> u32) -> Vec<u8> {
        let mut array = FlexibleStorage::new(bits, SECTION_VOLUME);
        for i in 0..SECTION_VOLUME {
            array.set(i, id_at(i));
        }

        let mut buffer = PacketBuffer::new();
        buffer.write_u8(bits as u8);
        buffer.write_varint(palette_entries.len() as i32);
        for entry in palette_entries {
            buffer.write_varint(*entry as i32);
        }
        buffer.write_varint(array.words().len() as i32);
        for word in array.words() {
            buffer.write_i64(*word as i64);
        }
        buffer.into_bytes()
    }

    #[test]
    fn decodes_indirect_section_at_every_coordinate() {
        // Two palette entries; id 0 stays the default, ids 1 and 2 map
        // to the entries. Cells alternate 0/1/2 by linear index.
        let bytes = encode_section(4, &[100, 200], |i| (i % 3) as u32);

        let mut storage = BlockStorage::new(AIR);
        storage.read(&mut PacketBuffer::from_bytes(bytes)).unwrap();

        for y in 0..SECTION_DIM {
            for z in 0..SECTION_DIM {
                for x in 0..SECTION_DIM {
                    let i = ((y * SECTION_DIM) + z) * SECTION_DIM + x;
                    let expected = match i % 3 {
                        0 => AIR,
                        1 => BlockState::new(100),
                        _ => BlockState::new(200),
                    };
                    assert_eq!(storage.get(x, y, z), expected, "at ({},{},{})", x, y, z);
                }
            }
        }
        assert_eq!(storage.bits_per_entry(), 4);
    }

    #[test]
    fn declared_width_is_clamped_up() {
        let bytes = encode_section(4, &[77], |_| 1);
        // Rewrite the width byte below the minimum; layout stays 4-bit.
        let mut bytes = bytes;
        bytes[0] = 2;

        let mut storage = BlockStorage::new(AIR);
        storage.read(&mut PacketBuffer::from_bytes(bytes)).unwrap();
        assert_eq!(storage.bits_per_entry(), 4);
        assert_eq!(storage.get(3, 3, 3), BlockState::new(77));
    }

    #[test]
    fn hostile_width_byte_is_malformed_not_a_panic() {
        // Widths at or past the word size must never reach a shift by
        // the declared amount; the direct path re-derives its width and
        // the undersized data array fails the unpack instead.
        for declared in [32u8, 64, 200] {
            let mut buffer = PacketBuffer::new();
            buffer.write_u8(declared);
            buffer.write_varint(0);
            buffer.write_varint(1);
            buffer.write_i64(0);

            let mut storage = BlockStorage::new(AIR);
            storage.set(1, 2, 3, BlockState::new(42));
            let result = storage.read(&mut PacketBuffer::from_bytes(buffer.into_bytes()));
            assert_matches!(result, Err(KestrelError::MalformedChunkData(_)), "width {}", declared);
            assert_eq!(storage.get(1, 2, 3), BlockState::new(42));
        }
    }

    #[test]
    fn decodes_direct_section_and_discards_palette_entries() {
        let direct_bits = bits_needed(GLOBAL_STATE_COUNT);
        // Palette entries are present but not applicable at this width.
        let bytes = encode_section(direct_bits, &[1, 2], |i| (i as u32) % 5000);

        let mut buffer = PacketBuffer::from_bytes(bytes);
        let mut storage = BlockStorage::new(AIR);
        storage.read(&mut buffer).unwrap();

        assert!(storage.palette().is_direct());
        assert_eq!(storage.get(0, 0, 0), BlockState::new(0));
        assert_eq!(storage.get(5, 0, 0), BlockState::new(5));
        assert_eq!(storage.get(0, 1, 0), BlockState::new(256 % 5000));
        // The discarded entries kept the stream position aligned.
        assert_eq!(buffer.remaining(), 0);
    }

    #[test]
    fn failed_decode_leaves_previous_contents() {
        let mut storage = BlockStorage::new(AIR);
        storage.set(1, 2, 3, BlockState::new(42));

        let mut buffer = PacketBuffer::new();
        buffer.write_u8(4);
        buffer.write_varint(1);
        buffer.write_varint(42);
        buffer.write_varint(9999); // word count beyond any valid section

        let result = storage.read(&mut PacketBuffer::from_bytes(buffer.into_bytes()));
        assert_matches!(result, Err(KestrelError::MalformedChunkData(_)));
        assert_eq!(storage.get(1, 2, 3), BlockState::new(42));
    }

    #[test]
    fn truncated_data_array_is_malformed() {
        let mut buffer = PacketBuffer::new();
        buffer.write_u8(4);
        buffer.write_varint(1);
        buffer.write_varint(100);
        buffer.write_varint(2); // far fewer words than 4096 entries need
        buffer.write_i64(0);
        buffer.write_i64(0);

        let mut storage = BlockStorage::new(AIR);
        let result = storage.read(&mut PacketBuffer::from_bytes(buffer.into_bytes()));
        assert_matches!(result, Err(KestrelError::MalformedChunkData(_)));
    }

    #[test]
    fn write_then_read_preserves_section() {
        let mut storage = BlockStorage::new(AIR);
        for i in 0..40u32 {
            storage.set((i % 16) as usize, (i / 16) as usize, 5, BlockState::new(300 + i % 6));
        }

        let mut buffer = PacketBuffer::new();
        storage.write(&mut buffer);

        let mut decoded = BlockStorage::new(AIR);
        decoded
            .read(&mut PacketBuffer::from_bytes(buffer.into_bytes()))
            .unwrap();

        for y in 0..SECTION_DIM {
            for z in 0..SECTION_DIM {
                for x in 0..SECTION_DIM {
                    assert_eq!(decoded.get(x, y, z), storage.get(x, y, z));
                }
            }
        }
    }
}
