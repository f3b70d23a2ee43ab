//! Stream lifecycle state.
//!
//! Transitions are driven by [`crate::stream::Streamer::close`]; this module
//! only names the states.
//!
//! ```text
//!  OPEN ──close()──▶ CLOSING ──drained + listener joined──▶ CLOSED
//! ```
//!
//! There is no way back: a closed stream stays closed.

/// All possible states of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamState {
    /// Sends and receives accepted; listener running.
    #[default]
    Open,
    /// `close()` in progress: new sends refused, waiting for every
    /// outstanding segment to be acknowledged.
    Closing,
    /// Listener stopped and background tasks joined.
    Closed,
}

impl StreamState {
    pub fn accepts_sends(self) -> bool {
        self == Self::Open
    }
}

impl std::fmt::Display for StreamState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Open => "OPEN",
            Self::Closing => "CLOSING",
            Self::Closed => "CLOSED",
        };
        f.write_str(name)
    }
}
