use kestrel_common::{PacketBuffer, Result};

/// Packet trait. Contains the packet id and the functions to write and
/// read the packet body (the id varint itself belongs to the frame, not
/// the body).
pub trait Packet: Send + Sync {
    /// Packet id, only meaningful within the connection state the packet
    /// travels in.
    fn packet_id(&self) -> i32;

    /// Reads the packet body from the buffer. Default implementation is
    /// used for packets that only travel outward, as they are never
    /// decoded locally.
    fn read_from_buffer(_buffer: &mut PacketBuffer) -> Result<Self>
    where
        Self: Sized,
    {
        unimplemented!("outbound-only packets don't need read")
    }

    /// Writes the packet body to the buffer. Default implementation is
    /// used for packets that only arrive inbound, as they are never
    /// encoded locally.
    fn write_to_buffer(&self, _buffer: &mut PacketBuffer) -> Result<()> {
        unimplemented!("inbound-only packets don't need write")
    }
}
