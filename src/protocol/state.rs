/// Why a session stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DisconnectReason {
    /// Reliable data went unacknowledged for longer than the connection timeout.
    TimedOut,
    /// The owner destroyed the connection state.
    ClosedLocally,
    /// The session was killed explicitly, e.g. after malformed data.
    Killed,
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DisconnectReason::TimedOut => "timed out",
            DisconnectReason::ClosedLocally => "closed locally",
            DisconnectReason::Killed => "killed",
        };
        f.write_str(s)
    }
}
