use crate::types::ConnectionState;
use std::error::Error;
use std::fmt;

#[derive(Debug)]
pub enum KestrelError {
    /// A varint had no terminating byte within five bytes.
    MalformedVarint,
    /// The declared uncompressed length of a frame did not match the
    /// inflated size.
    FrameLengthMismatch { declared: usize, actual: usize },
    /// A frame declared a length beyond the protocol cap.
    FrameTooLarge { declared: usize, limit: usize },
    /// A compressed frame arrived while compression was not negotiated,
    /// or vice versa.
    UnsupportedCompressionState(String),
    /// Chunk-section payload failed to decode.
    MalformedChunkData(String),
    /// A packet id with no decoder in the current state. Recovered
    /// locally by the read loop; never terminates the connection.
    UnknownPacketId { state: ConnectionState, id: i32 },
    SocketFault(std::io::Error),
    EncryptionAlreadyInstalled,
    /// The outbound queue is closed; the packet was not enqueued.
    ConnectionClosed,
    /// Connection states only move forward.
    InvalidStateTransition {
        from: ConnectionState,
        to: ConnectionState,
    },
}

impl fmt::Display for KestrelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KestrelError::MalformedVarint => write!(f, "malformed varint"),
            KestrelError::FrameLengthMismatch { declared, actual } => write!(
                f,
                "frame length mismatch: declared {} bytes, inflated {}",
                declared, actual
            ),
            KestrelError::FrameTooLarge { declared, limit } => {
                write!(f, "frame of {} bytes exceeds limit of {}", declared, limit)
            }
            KestrelError::UnsupportedCompressionState(msg) => {
                write!(f, "unsupported compression state: {}", msg)
            }
            KestrelError::MalformedChunkData(msg) => write!(f, "malformed chunk data: {}", msg),
            KestrelError::UnknownPacketId { state, id } => {
                write!(f, "unknown packet id 0x{:02x} in {:?} state", id, state)
            }
            KestrelError::SocketFault(err) => write!(f, "socket fault: {}", err),
            KestrelError::EncryptionAlreadyInstalled => {
                write!(f, "encryption has already been installed")
            }
            KestrelError::ConnectionClosed => write!(f, "connection is closed"),
            KestrelError::InvalidStateTransition { from, to } => {
                write!(f, "invalid state transition {:?} -> {:?}", from, to)
            }
        }
    }
}

impl Error for KestrelError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            KestrelError::SocketFault(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for KestrelError {
    fn from(err: std::io::Error) -> Self {
        KestrelError::SocketFault(err)
    }
}
