//! Acknowledgment generation.
//!
//! Every DATA segment the listener receives, duplicate or not, is answered
//! with an ACK naming its sequence number, sent back to whichever address the
//! segment came from.  Acks are fire-and-forget: if one is lost, the peer's
//! retransmission brings the segment back and it is acked again.

use std::net::SocketAddr;
use std::sync::Arc;

use crate::packet::Segment;
use crate::socket::Transport;

/// Stateless ACK sender.
#[derive(Clone)]
pub struct AckGenerator {
    transport: Arc<dyn Transport>,
}

impl AckGenerator {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Send an ACK for `seq` to `to`.  Failures are logged, never retried.
    pub async fn ack(&self, seq: u32, to: SocketAddr) {
        let bytes = Segment::ack(seq).encode();
        match self.transport.send_to(&bytes, to).await {
            Ok(()) => log::debug!("[ack] → ACK seq={seq} to {to}"),
            Err(e) => log::warn!("[ack] ACK seq={seq} to {to} failed: {e}"),
        }
    }
}
