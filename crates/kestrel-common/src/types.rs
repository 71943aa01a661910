pub type Result<T> = std::result::Result<T, crate::error::KestrelError>;

/// Protocol phase of a connection. Packet ids are only meaningful within
/// a state, and transitions are forward-only: Handshake -> Status or
/// Login, Login -> Play, anything -> Closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Handshake,
    Status,
    Login,
    Play,
    Closed,
}

impl ConnectionState {
    /// Whether the protocol allows moving from `self` to `to`.
    pub fn can_transition_to(self, to: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, to),
            (Handshake, Status) | (Handshake, Login) | (Login, Play) | (_, Closed)
        )
    }
}
