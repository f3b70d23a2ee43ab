//! Outbound segmentation and sequence numbering.
//!
//! [`Segmenter`] turns application writes into DATA segments.  It does
//! **not** touch the socket; [`crate::stream::Streamer`] hands every segment
//! it produces to the [`crate::retransmit::RetransmitEngine`], which owns
//! transmission and tracking.
//!
//! # Contract
//! - Each chunk carries at most `max_payload` bytes; order is preserved.
//! - Sequence numbers start at 0 and advance by exactly one per chunk,
//!   whether or not the chunk ever reaches the wire.
//! - An empty write produces no segments.

use crate::packet::{Segment, MAX_PAYLOAD};

/// Send-side sequence state for one stream.
#[derive(Debug)]
pub struct Segmenter {
    /// Sequence number the **next** chunk will carry.
    next_seq: u32,
    max_payload: usize,
}

impl Default for Segmenter {
    fn default() -> Self {
        Self::new(MAX_PAYLOAD)
    }
}

impl Segmenter {
    /// Create a segmenter that emits chunks of at most `max_payload` bytes.
    ///
    /// `max_payload` is clamped into `1..=MAX_PAYLOAD`.
    pub fn new(max_payload: usize) -> Self {
        Self {
            next_seq: 0,
            max_payload: max_payload.clamp(1, MAX_PAYLOAD),
        }
    }

    /// Sequence number that the next emitted segment will use.
    #[cfg(test)]
    pub(crate) fn next_seq(&self) -> u32 {
        self.next_seq
    }

    #[cfg(test)]
    pub(crate) fn max_payload(&self) -> usize {
        self.max_payload
    }

    /// Split `data` into tagged DATA segments, advancing the sequence counter.
    pub fn segment(&mut self, data: &[u8]) -> Vec<Segment> {
        data.chunks(self.max_payload)
            .map(|chunk| {
                let seg = Segment::data(self.next_seq, chunk.to_vec());
                self.next_seq = self.next_seq.wrapping_add(1);
                seg
            })
            .collect()
    }
}
