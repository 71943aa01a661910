pub mod chunk_section;
pub mod frame;
pub mod handshake;
pub mod keep_alive;
pub mod login;
pub mod packet;
pub mod status;

pub use frame::{decode_frame_body, encode_packet, CompressionSnapshot};
pub use packet::Packet;
