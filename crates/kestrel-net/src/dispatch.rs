use crate::connection::Connection;
use kestrel_common::{ConnectionState, KestrelError, PacketBuffer, Result};
use kestrel_logger::log::log;
use kestrel_logger::severity::LogSeverity::Warning;
use kestrel_protocol::chunk_section::ChunkSectionPacket;
use kestrel_protocol::keep_alive::KeepAlivePacket;
use kestrel_protocol::login::{LoginDisconnectPacket, LoginSuccessPacket, SetCompressionPacket};
use kestrel_protocol::packet::Packet;
use kestrel_protocol::status::{PongPacket, StatusResponsePacket};
use std::collections::HashMap;

/// Every inbound packet the pipeline can decode, across all states.
#[derive(Debug)]
pub enum InboundPacket {
    StatusResponse(StatusResponsePacket),
    Pong(PongPacket),
    LoginDisconnect(LoginDisconnectPacket),
    LoginSuccess(LoginSuccessPacket),
    SetCompression(SetCompressionPacket),
    KeepAlive(KeepAlivePacket),
    ChunkSection(ChunkSectionPacket),
}

/// Per-state packet-id decoder table. An id with no decoder in the
/// current state yields [`KestrelError::UnknownPacketId`]; the read loop
/// recovers from that variant locally instead of tearing down.
pub fn decode_packet(
    state: ConnectionState,
    packet_id: i32,
    payload: Vec<u8>,
) -> Result<InboundPacket> {
    let mut buffer = PacketBuffer::from_bytes(payload);
    let packet = match (state, packet_id) {
        (ConnectionState::Status, 0x00) => {
            InboundPacket::StatusResponse(StatusResponsePacket::read_from_buffer(&mut buffer)?)
        }
        (ConnectionState::Status, 0x01) => {
            InboundPacket::Pong(PongPacket::read_from_buffer(&mut buffer)?)
        }
        (ConnectionState::Login, 0x00) => {
            InboundPacket::LoginDisconnect(LoginDisconnectPacket::read_from_buffer(&mut buffer)?)
        }
        (ConnectionState::Login, 0x02) => {
            InboundPacket::LoginSuccess(LoginSuccessPacket::read_from_buffer(&mut buffer)?)
        }
        (ConnectionState::Login, 0x03) => {
            InboundPacket::SetCompression(SetCompressionPacket::read_from_buffer(&mut buffer)?)
        }
        (ConnectionState::Play, 0x1F) => {
            InboundPacket::KeepAlive(KeepAlivePacket::read_from_buffer(&mut buffer)?)
        }
        (ConnectionState::Play, 0x20) => {
            InboundPacket::ChunkSection(ChunkSectionPacket::read_from_buffer(&mut buffer)?)
        }
        _ => {
            return Err(KestrelError::UnknownPacketId {
                state,
                id: packet_id,
            })
        }
    };
    Ok(packet)
}

/// Capability consumed by the connection: game logic implements this to
/// receive decoded packets. Handlers run on the read loop, one packet
/// at a time, and therefore never race with each other.
pub trait PacketHandler: Send + Sync {
    fn handle_handshake(&self, _connection: &Connection, _packet: InboundPacket) {}
    fn handle_status(&self, _connection: &Connection, _packet: InboundPacket) {}
    fn handle_login(&self, _connection: &Connection, _packet: InboundPacket) {}
    fn handle_play(&self, _connection: &Connection, _packet: InboundPacket) {}
}

/// Counts packet ids with no decoder, keyed by (state, id). Owned by the
/// read loop alone, so plain map mutation is enough. Each pair is logged
/// the first time only; totals come out in the shutdown summary.
pub(crate) struct UnknownPacketFilter {
    counts: HashMap<(ConnectionState, i32), u64>,
}

impl UnknownPacketFilter {
    pub(crate) fn new() -> Self {
        Self {
            counts: HashMap::new(),
        }
    }

    /// Records one sighting; returns true on the first for this pair.
    pub(crate) fn record(&mut self, state: ConnectionState, packet_id: i32) -> bool {
        let count = self.counts.entry((state, packet_id)).or_insert(0);
        *count += 1;
        *count == 1
    }

    pub(crate) fn log_summary(&self) {
        for ((state, packet_id), count) in &self.counts {
            log(
                format!("({:?}) unhandled: 0x{:02x} * {}", state, packet_id, count),
                Warning,
            );
        }
    }
}
