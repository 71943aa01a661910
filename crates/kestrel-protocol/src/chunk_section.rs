use crate::packet::Packet;
use kestrel_common::block::AIR;
use kestrel_common::storage::BlockStorage;
use kestrel_common::{PacketBuffer, Result};

/// Chunk-section data. Carries one 16x16x16 palette-compressed block
/// section; the heavy lifting lives in [`BlockStorage::read`].
#[derive(Debug, Clone)]
pub struct ChunkSectionPacket {
    pub chunk_x: i32,
    pub chunk_z: i32,
    /// Section index within the column, bottom up.
    pub section_y: u8,
    /// Non-air blocks in the section.
    pub block_count: u16,
    pub storage: BlockStorage,
}

impl Packet for ChunkSectionPacket {
    fn packet_id(&self) -> i32 {
        0x20
    }

    fn read_from_buffer(buffer: &mut PacketBuffer) -> Result<Self> {
        let chunk_x = buffer.read_varint()?;
        let chunk_z = buffer.read_varint()?;
        let section_y = buffer.read_u8()?;
        let block_count = buffer.read_u16()?;

        let mut storage = BlockStorage::new(AIR);
        storage.read(buffer)?;

        Ok(ChunkSectionPacket {
            chunk_x,
            chunk_z,
            section_y,
            block_count,
            storage,
        })
    }

    fn write_to_buffer(&self, buffer: &mut PacketBuffer) -> Result<()> {
        buffer.write_varint(self.chunk_x);
        buffer.write_varint(self.chunk_z);
        buffer.write_u8(self.section_y);
        buffer.write_u16(self.block_count);
        self.storage.write(buffer);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_common::block::BlockState;

    #[test]
    fn chunk_section_round_trip() {
        let mut storage = BlockStorage::new(AIR);
        let mut block_count = 0u16;
        for x in 0..16 {
            for z in 0..16 {
                storage.set(x, 0, z, BlockState::new(9));
                block_count += 1;
            }
        }
        storage.set(8, 7, 8, BlockState::new(1400));
        block_count += 1;

        let packet = ChunkSectionPacket {
            chunk_x: -3,
            chunk_z: 12,
            section_y: 4,
            block_count,
            storage,
        };

        let mut buffer = PacketBuffer::new();
        packet.write_to_buffer(&mut buffer).unwrap();

        let mut read = PacketBuffer::from_bytes(buffer.into_bytes());
        let decoded = ChunkSectionPacket::read_from_buffer(&mut read).unwrap();
        assert_eq!(decoded.chunk_x, -3);
        assert_eq!(decoded.chunk_z, 12);
        assert_eq!(decoded.section_y, 4);
        assert_eq!(decoded.block_count, block_count);
        assert_eq!(decoded.storage.get(3, 0, 3), BlockState::new(9));
        assert_eq!(decoded.storage.get(8, 7, 8), BlockState::new(1400));
        assert_eq!(decoded.storage.get(8, 8, 8), AIR);
        assert_eq!(read.remaining(), 0);
    }
}
