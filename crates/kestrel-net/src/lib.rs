pub mod connection;
pub mod dispatch;

mod crypt;

// Re-export commonly used items
pub use connection::Connection;
pub use dispatch::{InboundPacket, PacketHandler};
