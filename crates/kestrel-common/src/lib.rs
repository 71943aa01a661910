pub mod bitarray;
pub mod block;
pub mod buffer;
pub mod error;
pub mod palette;
pub mod storage;
pub mod types;

// Re-export commonly used items
pub use buffer::PacketBuffer;
pub use error::KestrelError;
pub use types::{ConnectionState, Result};
