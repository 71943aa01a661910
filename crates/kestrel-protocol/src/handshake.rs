use crate::packet::Packet;
use kestrel_common::{PacketBuffer, Result};

/// Protocol version spoken by this crate (Minecraft 1.16.5).
pub const PROTOCOL_VERSION: i32 = 754;

pub const NEXT_STATE_STATUS: i32 = 1;
pub const NEXT_STATE_LOGIN: i32 = 2;

/// Handshake packet. The first and only packet of the Handshake state;
/// its `next_state` selects the Status or Login path.
#[derive(Debug, Clone)]
pub struct HandshakePacket {
    pub protocol_version: i32,
    pub server_address: String,
    pub server_port: u16,
    pub next_state: i32,
}

impl HandshakePacket {
    pub fn status(server_address: String, server_port: u16) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            server_address,
            server_port,
            next_state: NEXT_STATE_STATUS,
        }
    }

    pub fn login(server_address: String, server_port: u16) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            server_address,
            server_port,
            next_state: NEXT_STATE_LOGIN,
        }
    }
}

impl Packet for HandshakePacket {
    fn packet_id(&self) -> i32 {
        0x00
    }

    fn read_from_buffer(buffer: &mut PacketBuffer) -> Result<Self> {
        Ok(HandshakePacket {
            protocol_version: buffer.read_varint()?,
            server_address: buffer.read_string()?,
            server_port: buffer.read_u16()?,
            next_state: buffer.read_varint()?,
        })
    }

    fn write_to_buffer(&self, buffer: &mut PacketBuffer) -> Result<()> {
        buffer.write_varint(self.protocol_version);
        buffer.write_string(&self.server_address);
        buffer.write_u16(self.server_port);
        buffer.write_varint(self.next_state);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handshake_round_trip() {
        let packet = HandshakePacket::status("localhost".to_owned(), 25565);

        let mut buffer = PacketBuffer::new();
        packet.write_to_buffer(&mut buffer).unwrap();

        let mut read = PacketBuffer::from_bytes(buffer.into_bytes());
        let decoded = HandshakePacket::read_from_buffer(&mut read).unwrap();
        assert_eq!(decoded.protocol_version, PROTOCOL_VERSION);
        assert_eq!(decoded.server_address, "localhost");
        assert_eq!(decoded.server_port, 25565);
        assert_eq!(decoded.next_state, NEXT_STATE_STATUS);
    }
}
