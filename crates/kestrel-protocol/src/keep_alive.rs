use crate::packet::Packet;
use kestrel_common::{PacketBuffer, Result};

/// Clientbound keep-alive; the peer expects the same id echoed back
/// within the timeout window.
#[derive(Debug, Clone)]
pub struct KeepAlivePacket {
    pub keep_alive_id: i64,
}

impl Packet for KeepAlivePacket {
    fn packet_id(&self) -> i32 {
        0x1F
    }

    fn read_from_buffer(buffer: &mut PacketBuffer) -> Result<Self> {
        Ok(KeepAlivePacket {
            keep_alive_id: buffer.read_i64()?,
        })
    }

    fn write_to_buffer(&self, buffer: &mut PacketBuffer) -> Result<()> {
        buffer.write_i64(self.keep_alive_id);
        Ok(())
    }
}

/// Serverbound keep-alive echo.
#[derive(Debug, Clone)]
pub struct KeepAliveResponsePacket {
    pub keep_alive_id: i64,
}

impl Packet for KeepAliveResponsePacket {
    fn packet_id(&self) -> i32 {
        0x10
    }

    fn read_from_buffer(buffer: &mut PacketBuffer) -> Result<Self> {
        Ok(KeepAliveResponsePacket {
            keep_alive_id: buffer.read_i64()?,
        })
    }

    fn write_to_buffer(&self, buffer: &mut PacketBuffer) -> Result<()> {
        buffer.write_i64(self.keep_alive_id);
        Ok(())
    }
}
