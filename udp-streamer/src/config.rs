//! Tunable stream parameters.
//!
//! The binary fills a [`StreamConfig`] from CLI flags; library users start
//! from [`StreamConfig::default`] and override fields as needed.

use std::time::Duration;

use thiserror::Error;

use crate::packet::MAX_PAYLOAD;

/// Default retransmission timeout.
pub const DEFAULT_RTO: Duration = Duration::from_millis(500);

/// Default interval between scans of the outstanding-segment set.
pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_millis(50);

/// Default quiet period a closing stream keeps acknowledging for.
pub const DEFAULT_LINGER: Duration = Duration::from_millis(1500);

/// Adjustable parameters for one [`crate::stream::Streamer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    /// Largest payload placed in one DATA segment (at most [`MAX_PAYLOAD`]).
    pub max_payload: usize,
    /// Age after which an unacknowledged segment is sent again.
    pub rto: Duration,
    /// How often the retransmission timer scans for expired segments.
    pub scan_interval: Duration,
    /// Give up after this many retransmissions of a single segment.
    ///
    /// `None` retransmits forever, on the assumption that loss is always
    /// eventually recoverable.
    pub max_retries: Option<u32>,
    /// After its own data is drained, a closing stream keeps answering the
    /// peer's DATA until none has arrived for this long.  Covers a final
    /// ACK that was lost, which the peer can only recover by resending.
    ///
    /// Should exceed `rto` so at least one resend lands inside the window.
    /// Zero disables lingering.
    pub linger: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            max_payload: MAX_PAYLOAD,
            rto: DEFAULT_RTO,
            scan_interval: DEFAULT_SCAN_INTERVAL,
            max_retries: None,
            linger: DEFAULT_LINGER,
        }
    }
}

impl StreamConfig {
    /// Reject values the protocol cannot honour.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_payload == 0 || self.max_payload > MAX_PAYLOAD {
            return Err(ConfigError::MaxPayload(self.max_payload));
        }
        if self.rto.is_zero() {
            return Err(ConfigError::ZeroDuration("rto"));
        }
        if self.scan_interval.is_zero() {
            return Err(ConfigError::ZeroDuration("scan_interval"));
        }
        Ok(())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("max_payload must be within 1..={MAX_PAYLOAD}, got {0}")]
    MaxPayload(usize),
    #[error("{0} must be non-zero")]
    ZeroDuration(&'static str),
}
