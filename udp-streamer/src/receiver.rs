//! Inbound segment reassembly.
//!
//! The [`Reassembler`] is responsible for everything that happens *after* a
//! DATA segment is decoded and *before* the application reads it:
//! - Buffering out-of-order segments until the gap before them fills.
//! - Delivering payloads strictly in sequence order, one per `take`.
//! - Detecting and discarding duplicates.
//! - Reporting end-of-stream once the stream is closed.
//!
//! The [`Reassembler`] does **not** send ACKs itself; the listener acks every
//! DATA segment after handing it over, duplicates included.
//!
//! The listener inserts while the application takes, so the buffer sits
//! behind one mutex and `ready` wakes blocked readers.

use std::collections::BTreeMap;

use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

/// What happened to an arriving DATA segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arrival {
    /// Stored for delivery.
    Buffered,
    /// Already delivered, or already buffered; payload discarded.
    Duplicate,
    /// The stream is closed; payload discarded.
    Closed,
}

#[derive(Debug, Default)]
struct ReceiveBuffer {
    /// Next sequence number due for delivery.
    expected: u32,
    /// Arrived but undelivered payloads.  Every key is `>= expected`.
    pending: BTreeMap<u32, Vec<u8>>,
    closed: bool,
    /// When the most recent DATA segment arrived, duplicates included.
    last_arrival: Option<Instant>,
}

impl ReceiveBuffer {
    fn pop_ready(&mut self) -> Option<Vec<u8>> {
        let payload = self.pending.remove(&self.expected)?;
        self.expected = self.expected.wrapping_add(1);
        Some(payload)
    }
}

/// Receive-side reassembly state for one stream.
#[derive(Debug, Default)]
pub struct Reassembler {
    inner: Mutex<ReceiveBuffer>,
    ready: Notify,
}

impl Reassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept one DATA segment from the wire.
    pub async fn on_segment(&self, seq: u32, payload: Vec<u8>) -> Arrival {
        let mut buf = self.inner.lock().await;
        buf.last_arrival = Some(Instant::now());
        if buf.closed {
            return Arrival::Closed;
        }
        if seq < buf.expected || buf.pending.contains_key(&seq) {
            log::debug!(
                "[rx] ← DATA seq={} duplicate (expected={})",
                seq,
                buf.expected
            );
            return Arrival::Duplicate;
        }

        let len = payload.len();
        buf.pending.insert(seq, payload);
        log::debug!(
            "[rx] ← DATA seq={} len={} expected={} buffered={}",
            seq,
            len,
            buf.expected,
            buf.pending.len()
        );
        if seq == buf.expected {
            self.ready.notify_waiters();
        }
        Arrival::Buffered
    }

    /// Wait for the next in-order payload.
    ///
    /// Returns `None` once the stream is closed and nothing deliverable is
    /// left.  A delivered payload is never empty.
    pub async fn take(&self) -> Option<Vec<u8>> {
        loop {
            let notified = self.ready.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut buf = self.inner.lock().await;
                if let Some(payload) = buf.pop_ready() {
                    return Some(payload);
                }
                if buf.closed {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Non-blocking variant of [`take`](Self::take).
    #[cfg(test)]
    pub(crate) async fn try_take(&self) -> Option<Vec<u8>> {
        self.inner.lock().await.pop_ready()
    }

    /// Mark the stream closed and wake every blocked reader.
    ///
    /// Payloads already deliverable in order are still handed out by later
    /// `take` calls; anything stuck behind a gap is dropped.
    pub async fn close(&self) {
        let mut buf = self.inner.lock().await;
        buf.closed = true;
        let expected = buf.expected;
        let stranded = buf.pending.keys().filter(|&&seq| seq != expected).count();
        if stranded > 0 {
            log::debug!("[rx] closing with {stranded} out-of-order segment(s) undelivered");
        }
        self.ready.notify_waiters();
    }

    /// Arrival time of the latest DATA segment, if any has been seen.
    pub async fn last_arrival(&self) -> Option<Instant> {
        self.inner.lock().await.last_arrival
    }

    #[cfg(test)]
    pub(crate) async fn expected(&self) -> u32 {
        self.inner.lock().await.expected
    }

    #[cfg(test)]
    pub(crate) async fn buffered(&self) -> usize {
        self.inner.lock().await.pending.len()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn in_order_segment_is_deliverable() {
        let r = Reassembler::new();
        assert_eq!(r.on_segment(0, b"hello".to_vec()).await, Arrival::Buffered);
        assert_eq!(r.try_take().await, Some(b"hello".to_vec()));
        assert_eq!(r.expected().await, 1);
    }

    #[tokio::test]
    async fn arrival_3_1_2_delivers_1_2_3() {
        let r = Reassembler::new();
        // Consume seq 0 so that 1 is the next expected.
        r.on_segment(0, b"zero".to_vec()).await;
        assert_eq!(r.take().await, Some(b"zero".to_vec()));

        r.on_segment(3, b"three".to_vec()).await;
        assert_eq!(r.try_take().await, None);
        r.on_segment(1, b"one".to_vec()).await;
        r.on_segment(2, b"two".to_vec()).await;

        assert_eq!(r.take().await, Some(b"one".to_vec()));
        assert_eq!(r.take().await, Some(b"two".to_vec()));
        assert_eq!(r.take().await, Some(b"three".to_vec()));
        assert_eq!(r.buffered().await, 0);
        assert_eq!(r.expected().await, 4);
    }

    #[tokio::test]
    async fn duplicate_delivered_once() {
        let r = Reassembler::new();
        assert_eq!(r.on_segment(0, b"a".to_vec()).await, Arrival::Buffered);
        assert_eq!(r.on_segment(0, b"a".to_vec()).await, Arrival::Duplicate);
        assert_eq!(r.take().await, Some(b"a".to_vec()));

        // Retransmission of an already-delivered segment.
        assert_eq!(r.on_segment(0, b"a".to_vec()).await, Arrival::Duplicate);
        assert_eq!(r.try_take().await, None);
    }

    #[tokio::test]
    async fn buffered_duplicate_keeps_first_copy() {
        let r = Reassembler::new();
        r.on_segment(1, b"first".to_vec()).await;
        assert_eq!(r.on_segment(1, b"second".to_vec()).await, Arrival::Duplicate);
        r.on_segment(0, b"zero".to_vec()).await;
        assert_eq!(r.take().await, Some(b"zero".to_vec()));
        assert_eq!(r.take().await, Some(b"first".to_vec()));
    }

    #[tokio::test]
    async fn take_blocks_until_gap_fills() {
        let r = Arc::new(Reassembler::new());
        r.on_segment(1, b"later".to_vec()).await;

        let reader = {
            let r = r.clone();
            tokio::spawn(async move { r.take().await })
        };
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(!reader.is_finished());

        r.on_segment(0, b"first".to_vec()).await;
        let got = tokio::time::timeout(Duration::from_secs(1), reader)
            .await
            .expect("reader not woken")
            .unwrap();
        assert_eq!(got, Some(b"first".to_vec()));
    }

    #[tokio::test]
    async fn close_releases_blocked_reader_with_end_of_stream() {
        let r = Arc::new(Reassembler::new());
        let reader = {
            let r = r.clone();
            tokio::spawn(async move { r.take().await })
        };
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        r.close().await;
        let got = tokio::time::timeout(Duration::from_secs(1), reader)
            .await
            .expect("reader not woken")
            .unwrap();
        assert_eq!(got, None);
    }

    #[tokio::test]
    async fn close_still_delivers_in_order_data() {
        let r = Reassembler::new();
        r.on_segment(0, b"kept".to_vec()).await;
        r.on_segment(2, b"stranded".to_vec()).await;
        r.close().await;

        assert_eq!(r.take().await, Some(b"kept".to_vec()));
        assert_eq!(r.take().await, None);
        assert_eq!(r.on_segment(1, b"late".to_vec()).await, Arrival::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn duplicates_refresh_last_arrival() {
        let r = Reassembler::new();
        assert_eq!(r.last_arrival().await, None);

        r.on_segment(0, b"a".to_vec()).await;
        let first = r.last_arrival().await.unwrap();

        tokio::time::advance(Duration::from_millis(200)).await;
        assert_eq!(r.on_segment(0, b"a".to_vec()).await, Arrival::Duplicate);
        let second = r.last_arrival().await.unwrap();
        assert_eq!(second - first, Duration::from_millis(200));
    }
}
