use crate::packet::Packet;
use kestrel_common::{KestrelError, PacketBuffer, Result};
use serde::{Deserialize, Serialize};
use std::io;

/// Status request. Empty body; asks the server for its status JSON.
#[derive(Debug, Clone)]
pub struct StatusRequestPacket;

impl Packet for StatusRequestPacket {
    fn packet_id(&self) -> i32 {
        0x00
    }

    fn read_from_buffer(_buffer: &mut PacketBuffer) -> Result<Self> {
        Ok(StatusRequestPacket)
    }

    fn write_to_buffer(&self, _buffer: &mut PacketBuffer) -> Result<()> {
        Ok(())
    }
}

/// Status response carrying the server's status document as a JSON
/// string.
#[derive(Debug, Clone)]
pub struct StatusResponsePacket {
    pub response: String,
}

impl StatusResponsePacket {
    pub fn info(&self) -> Result<StatusInfo> {
        serde_json::from_str(&self.response).map_err(|err| {
            KestrelError::SocketFault(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("invalid status JSON: {}", err),
            ))
        })
    }
}

impl Packet for StatusResponsePacket {
    fn packet_id(&self) -> i32 {
        0x00
    }

    fn read_from_buffer(buffer: &mut PacketBuffer) -> Result<Self> {
        Ok(StatusResponsePacket {
            response: buffer.read_string()?,
        })
    }

    fn write_to_buffer(&self, buffer: &mut PacketBuffer) -> Result<()> {
        buffer.write_string(&self.response);
        Ok(())
    }
}

/// Ping with an arbitrary payload the server echoes back.
#[derive(Debug, Clone)]
pub struct PingPacket {
    pub payload: i64,
}

impl Packet for PingPacket {
    fn packet_id(&self) -> i32 {
        0x01
    }

    fn read_from_buffer(buffer: &mut PacketBuffer) -> Result<Self> {
        Ok(PingPacket {
            payload: buffer.read_i64()?,
        })
    }

    fn write_to_buffer(&self, buffer: &mut PacketBuffer) -> Result<()> {
        buffer.write_i64(self.payload);
        Ok(())
    }
}

/// Pong echoing the ping payload.
#[derive(Debug, Clone)]
pub struct PongPacket {
    pub payload: i64,
}

impl Packet for PongPacket {
    fn packet_id(&self) -> i32 {
        0x01
    }

    fn read_from_buffer(buffer: &mut PacketBuffer) -> Result<Self> {
        Ok(PongPacket {
            payload: buffer.read_i64()?,
        })
    }

    fn write_to_buffer(&self, buffer: &mut PacketBuffer) -> Result<()> {
        buffer.write_i64(self.payload);
        Ok(())
    }
}

/// Typed view of the status-response JSON document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusInfo {
    pub version: StatusVersion,
    pub players: StatusPlayers,
    #[serde(default)]
    pub description: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusVersion {
    pub name: String,
    pub protocol: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusPlayers {
    pub max: i32,
    pub online: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_response_round_trip() {
        let packet = StatusResponsePacket {
            response: r#"{"version":{"name":"1.16.5","protocol":754},"players":{"max":20,"online":3},"description":{"text":"hi"}}"#.to_owned(),
        };

        let mut buffer = PacketBuffer::new();
        packet.write_to_buffer(&mut buffer).unwrap();

        let mut read = PacketBuffer::from_bytes(buffer.into_bytes());
        let decoded = StatusResponsePacket::read_from_buffer(&mut read).unwrap();

        let info = decoded.info().unwrap();
        assert_eq!(info.version.protocol, 754);
        assert_eq!(info.players.online, 3);
    }

    #[test]
    fn bad_status_json_is_an_error() {
        let packet = StatusResponsePacket {
            response: "not json".to_owned(),
        };
        assert!(packet.info().is_err());
    }

    #[test]
    fn ping_pong_round_trip() {
        let ping = PingPacket { payload: -12345 };
        let mut buffer = PacketBuffer::new();
        ping.write_to_buffer(&mut buffer).unwrap();

        let mut read = PacketBuffer::from_bytes(buffer.into_bytes());
        assert_eq!(PongPacket::read_from_buffer(&mut read).unwrap().payload, -12345);
    }
}
