use crate::packet::Packet;
use kestrel_common::{PacketBuffer, Result};
use uuid::Uuid;

/// Login start, carrying the requested username.
#[derive(Debug, Clone)]
pub struct LoginStartPacket {
    pub username: String,
}

impl Packet for LoginStartPacket {
    fn packet_id(&self) -> i32 {
        0x00
    }

    fn read_from_buffer(buffer: &mut PacketBuffer) -> Result<Self> {
        Ok(LoginStartPacket {
            username: buffer.read_string()?,
        })
    }

    fn write_to_buffer(&self, buffer: &mut PacketBuffer) -> Result<()> {
        buffer.write_string(&self.username);
        Ok(())
    }
}

/// Login success. Receiving this moves the connection into the Play
/// state.
#[derive(Debug, Clone)]
pub struct LoginSuccessPacket {
    pub uuid: Uuid,
    pub username: String,
}

impl LoginSuccessPacket {
    pub fn new(username: String) -> Self {
        // Offline-mode UUID (version 3, derived from the username).
        let uuid = Uuid::new_v3(
            &Uuid::NAMESPACE_DNS,
            format!("OfflinePlayer:{}", username).as_bytes(),
        );

        LoginSuccessPacket { uuid, username }
    }
}

impl Packet for LoginSuccessPacket {
    fn packet_id(&self) -> i32 {
        0x02
    }

    fn read_from_buffer(buffer: &mut PacketBuffer) -> Result<Self> {
        Ok(LoginSuccessPacket {
            uuid: buffer.read_uuid()?,
            username: buffer.read_string()?,
        })
    }

    fn write_to_buffer(&self, buffer: &mut PacketBuffer) -> Result<()> {
        buffer.write_uuid(self.uuid);
        buffer.write_string(&self.username);
        Ok(())
    }
}

/// Login disconnect with a reason string.
#[derive(Debug, Clone)]
pub struct LoginDisconnectPacket {
    pub reason: String,
}

impl Packet for LoginDisconnectPacket {
    fn packet_id(&self) -> i32 {
        0x00
    }

    fn read_from_buffer(buffer: &mut PacketBuffer) -> Result<Self> {
        Ok(LoginDisconnectPacket {
            reason: buffer.read_string()?,
        })
    }

    fn write_to_buffer(&self, buffer: &mut PacketBuffer) -> Result<()> {
        buffer.write_string(&self.reason);
        Ok(())
    }
}

/// Compression negotiation. Frames at or above `threshold` bytes are
/// deflated from the next frame on.
#[derive(Debug, Clone)]
pub struct SetCompressionPacket {
    pub threshold: i32,
}

impl Packet for SetCompressionPacket {
    fn packet_id(&self) -> i32 {
        0x03
    }

    fn read_from_buffer(buffer: &mut PacketBuffer) -> Result<Self> {
        Ok(SetCompressionPacket {
            threshold: buffer.read_varint()?,
        })
    }

    fn write_to_buffer(&self, buffer: &mut PacketBuffer) -> Result<()> {
        buffer.write_varint(self.threshold);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_success_round_trip() {
        let packet = LoginSuccessPacket::new("TestPlayer".to_owned());

        let mut buffer = PacketBuffer::new();
        packet.write_to_buffer(&mut buffer).unwrap();

        let mut read = PacketBuffer::from_bytes(buffer.into_bytes());
        let decoded = LoginSuccessPacket::read_from_buffer(&mut read).unwrap();
        assert_eq!(decoded.uuid, packet.uuid);
        assert_eq!(decoded.username, "TestPlayer");
    }

    #[test]
    fn offline_uuid_is_stable() {
        let a = LoginSuccessPacket::new("Alice".to_owned());
        let b = LoginSuccessPacket::new("Alice".to_owned());
        assert_eq!(a.uuid, b.uuid);
    }
}
