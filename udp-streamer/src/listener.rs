//! Background listener loop.
//!
//! One [`Listener`] runs per stream for as long as the stream is open or
//! closing.  It drains the transport and demultiplexes by segment kind:
//!
//! ```text
//!  transport.recv_from()
//!        │
//!        ├── DATA ──▶ Reassembler::on_segment ──▶ AckGenerator::ack
//!        │
//!        └── ACK  ──▶ RetransmitEngine::on_ack
//! ```
//!
//! Datagrams from any address other than the stream's peer are dropped
//! before decoding.
//!
//! The listener holds handles to exactly the structures it updates, never
//! the owning stream.  Only [`TransportError::Interrupted`] ends the loop;
//! any other receive or decode failure is logged and skipped.

use std::net::SocketAddr;
use std::sync::Arc;

use crate::ack::AckGenerator;
use crate::packet::{Segment, SegmentKind};
use crate::receiver::{Arrival, Reassembler};
use crate::retransmit::RetransmitEngine;
use crate::socket::{Transport, TransportError};

pub(crate) struct Listener {
    pub(crate) peer: SocketAddr,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) reassembler: Arc<Reassembler>,
    pub(crate) engine: Arc<RetransmitEngine>,
    pub(crate) acks: AckGenerator,
}

impl Listener {
    /// Run until the transport is interrupted.
    pub(crate) async fn run(self) {
        log::debug!("[listen] started");
        loop {
            match self.transport.recv_from().await {
                Ok((bytes, from)) => self.dispatch(&bytes, from).await,
                Err(TransportError::Interrupted) => break,
                Err(e) => log::warn!("[listen] receive failed, continuing: {e}"),
            }
        }
        log::debug!("[listen] stopped");
    }

    async fn dispatch(&self, bytes: &[u8], from: SocketAddr) {
        if from != self.peer {
            log::debug!("[listen] dropping datagram from stranger {from}");
            return;
        }
        let segment = match Segment::decode(bytes) {
            Ok(segment) => segment,
            Err(e) => {
                log::debug!("[listen] dropping malformed datagram from {from}: {e}");
                return;
            }
        };

        match segment.kind {
            SegmentKind::Data => {
                let seq = segment.seq;
                // Acked whatever the outcome, so a lost ACK can be repaired.
                if self.reassembler.on_segment(seq, segment.payload).await == Arrival::Closed {
                    log::debug!("[listen] DATA seq={seq} after close, acking only");
                }
                self.acks.ack(seq, from).await;
            }
            SegmentKind::Ack => {
                self.engine.on_ack(segment.seq).await;
            }
        }
    }
}
