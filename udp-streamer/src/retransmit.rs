//! Retransmission engine: the send window of unacknowledged segments.
//!
//! [`RetransmitEngine`] exclusively owns every DATA segment that has been
//! sent but not yet acknowledged.  Unlike Go-Back-N, acknowledgments are
//! **selective**: an ACK names exactly one segment and retires exactly that
//! entry, in whatever order ACKs happen to arrive.
//!
//! # Protocol contract
//!
//! - [`track`](RetransmitEngine::track) records the segment, then transmits
//!   it.  A failed transmission leaves it recorded so the timer retries it.
//! - [`retransmit_expired`](RetransmitEngine::retransmit_expired) is driven
//!   by the timer task; every entry older than the RTO is resent and its
//!   timestamp refreshed.
//! - [`on_ack`](RetransmitEngine::on_ack) removes the named entry.  ACKs
//!   for unknown sequence numbers are stale duplicates and are ignored.
//! - [`drain_and_wait`](RetransmitEngine::drain_and_wait) suspends until the
//!   window is empty.
//!
//! The application task, the listener and the timer all touch the window,
//! so it sits behind one mutex; `drained` wakes anyone waiting for it to
//! empty.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use crate::config::StreamConfig;
use crate::packet::Segment;
use crate::socket::Transport;

// ---------------------------------------------------------------------------
// SendWindowEntry
// ---------------------------------------------------------------------------

/// A single in-flight segment awaiting its ACK.
#[derive(Debug, Clone)]
pub struct SendWindowEntry {
    pub seq: u32,
    /// The encoded segment, resent verbatim on timeout.
    pub bytes: Vec<u8>,
    /// Time of the most recent transmission attempt.
    pub sent_at: Instant,
    /// Total number of transmission attempts (1 = first send).
    pub tx_count: u32,
}

/// Raised when a configured retry cap is exceeded.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RetransmitError {
    #[error("segment {seq} unacknowledged after {attempts} transmissions; peer unresponsive")]
    RetriesExhausted { seq: u32, attempts: u32 },
}

#[derive(Debug, Default)]
struct SendWindow {
    entries: BTreeMap<u32, SendWindowEntry>,
    /// Set once when the retry cap trips; the window is abandoned.
    failure: Option<RetransmitError>,
}

// ---------------------------------------------------------------------------
// RetransmitEngine
// ---------------------------------------------------------------------------

/// Send-side reliability state for one stream.
pub struct RetransmitEngine {
    transport: Arc<dyn Transport>,
    peer: SocketAddr,
    rto: Duration,
    max_retries: Option<u32>,
    window: Mutex<SendWindow>,
    /// Signalled whenever the window becomes empty or is abandoned.
    drained: Notify,
}

impl RetransmitEngine {
    pub fn new(transport: Arc<dyn Transport>, peer: SocketAddr, config: &StreamConfig) -> Self {
        Self {
            transport,
            peer,
            rto: config.rto,
            max_retries: config.max_retries,
            window: Mutex::new(SendWindow::default()),
            drained: Notify::new(),
        }
    }

    /// Record `segment` as outstanding and transmit it.
    ///
    /// The entry is inserted before the first send so that an ACK racing
    /// back from the peer always finds it.
    pub async fn track(&self, segment: Segment) {
        let seq = segment.seq;
        let bytes = segment.encode();
        let outstanding = {
            let mut window = self.window.lock().await;
            window.entries.insert(
                seq,
                SendWindowEntry {
                    seq,
                    bytes: bytes.clone(),
                    sent_at: Instant::now(),
                    tx_count: 1,
                },
            );
            window.entries.len()
        };

        match self.transport.send_to(&bytes, self.peer).await {
            Ok(()) => log::debug!(
                "[rtx] → DATA seq={} len={} outstanding={}",
                seq,
                segment.payload.len(),
                outstanding
            ),
            Err(e) => log::warn!("[rtx] send of seq={seq} failed, will retry: {e}"),
        }
    }

    /// Retire the entry for `seq`.
    ///
    /// Returns `true` if an entry was removed, `false` for a stale or
    /// duplicate ACK.
    pub async fn on_ack(&self, seq: u32) -> bool {
        let mut window = self.window.lock().await;
        let removed = window.entries.remove(&seq).is_some();
        if removed {
            log::debug!(
                "[rtx] ← ACK seq={} outstanding={}",
                seq,
                window.entries.len()
            );
        } else {
            log::debug!("[rtx] ← ACK seq={seq} (stale, ignored)");
        }
        if window.entries.is_empty() {
            self.drained.notify_waiters();
        }
        removed
    }

    /// Resend every entry whose last transmission is at least one RTO old.
    ///
    /// Returns the number of segments resent.  If a retry cap is configured
    /// and any expired entry has already used it up, the whole window is
    /// abandoned and drain waiters are released with an error.
    pub async fn retransmit_expired(&self) -> usize {
        let now = Instant::now();
        let mut due: Vec<(u32, Vec<u8>)> = Vec::new();
        {
            let mut window = self.window.lock().await;
            let mut exhausted = None;

            for entry in window.entries.values_mut() {
                if now.duration_since(entry.sent_at) < self.rto {
                    continue;
                }
                if self.max_retries.is_some_and(|max| entry.tx_count > max) {
                    exhausted = Some(RetransmitError::RetriesExhausted {
                        seq: entry.seq,
                        attempts: entry.tx_count,
                    });
                    break;
                }
                entry.tx_count += 1;
                entry.sent_at = now;
                due.push((entry.seq, entry.bytes.clone()));
            }

            if let Some(err) = exhausted {
                log::warn!("[rtx] giving up: {err}");
                window.entries.clear();
                window.failure = Some(err);
                self.drained.notify_waiters();
                return 0;
            }
        }

        for (seq, bytes) in &due {
            match self.transport.send_to(bytes, self.peer).await {
                Ok(()) => log::debug!("[rtx] timeout, resent seq={seq}"),
                Err(e) => log::warn!("[rtx] resend of seq={seq} failed: {e}"),
            }
        }
        due.len()
    }

    /// Suspend until every tracked segment has been acknowledged.
    ///
    /// Fails only if the retry cap tripped.
    pub async fn drain_and_wait(&self) -> Result<(), RetransmitError> {
        loop {
            let notified = self.drained.notified();
            tokio::pin!(notified);
            // Register before inspecting the window so a concurrent ACK
            // cannot slip between the check and the wait.
            notified.as_mut().enable();

            {
                let window = self.window.lock().await;
                if let Some(err) = &window.failure {
                    return Err(err.clone());
                }
                if window.entries.is_empty() {
                    return Ok(());
                }
                log::debug!(
                    "[rtx] draining, {} segment(s) outstanding",
                    window.entries.len()
                );
            }

            notified.await;
        }
    }

    /// Sequence numbers still awaiting acknowledgment, ascending.
    pub async fn outstanding(&self) -> Vec<u32> {
        self.window.lock().await.entries.keys().copied().collect()
    }

    /// The retry-cap failure, once it has happened.
    pub async fn failure(&self) -> Option<RetransmitError> {
        self.window.lock().await.failure.clone()
    }

    #[cfg(test)]
    pub(crate) async fn entry(&self, seq: u32) -> Option<SendWindowEntry> {
        self.window.lock().await.entries.get(&seq).cloned()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::socket::mock::MockTransport;

    const RTO: Duration = Duration::from_millis(100);

    fn peer() -> SocketAddr {
        "127.0.0.1:5000".parse().unwrap()
    }

    fn engine(max_retries: Option<u32>) -> (Arc<MockTransport>, Arc<RetransmitEngine>) {
        let transport = Arc::new(MockTransport::new());
        let config = StreamConfig {
            rto: RTO,
            max_retries,
            ..StreamConfig::default()
        };
        let engine = RetransmitEngine::new(transport.clone(), peer(), &config);
        (transport, Arc::new(engine))
    }

    #[tokio::test]
    async fn track_transmits_immediately() {
        let (transport, engine) = engine(None);
        engine.track(Segment::data(0, b"abc".to_vec())).await;

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, peer());
        assert_eq!(Segment::decode(&sent[0].0).unwrap(), Segment::data(0, b"abc".to_vec()));
        assert_eq!(engine.outstanding().await, vec![0]);
    }

    #[tokio::test]
    async fn ack_retires_only_named_segment() {
        let (_, engine) = engine(None);
        for seq in 0..3 {
            engine.track(Segment::data(seq, vec![seq as u8])).await;
        }

        assert!(engine.on_ack(2).await);
        assert!(engine.on_ack(0).await);
        assert_eq!(engine.outstanding().await, vec![1]);
    }

    #[tokio::test]
    async fn duplicate_and_unknown_acks_are_ignored() {
        let (_, engine) = engine(None);
        engine.track(Segment::data(0, b"x".to_vec())).await;

        assert!(engine.on_ack(0).await);
        assert!(!engine.on_ack(0).await);
        assert!(!engine.on_ack(99).await);
        assert!(engine.outstanding().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn expired_segment_is_resent() {
        let (transport, engine) = engine(None);
        engine.track(Segment::data(0, b"late".to_vec())).await;

        assert_eq!(engine.retransmit_expired().await, 0);

        tokio::time::advance(RTO).await;
        assert_eq!(engine.retransmit_expired().await, 1);
        assert_eq!(transport.sent().len(), 2);
        assert_eq!(transport.sent()[0].0, transport.sent()[1].0);
        assert_eq!(engine.entry(0).await.unwrap().tx_count, 2);

        // Timestamp was refreshed, so nothing is due yet.
        assert_eq!(engine.retransmit_expired().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn acked_segment_is_not_resent() {
        let (transport, engine) = engine(None);
        engine.track(Segment::data(0, b"a".to_vec())).await;
        engine.track(Segment::data(1, b"b".to_vec())).await;
        engine.on_ack(0).await;

        tokio::time::advance(RTO).await;
        assert_eq!(engine.retransmit_expired().await, 1);
        let last = transport.sent().pop().unwrap();
        assert_eq!(Segment::decode(&last.0).unwrap().seq, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_send_stays_tracked() {
        let (transport, engine) = engine(None);
        transport.set_fail_sends(true);
        engine.track(Segment::data(0, b"lost".to_vec())).await;
        assert!(transport.sent().is_empty());
        assert_eq!(engine.outstanding().await, vec![0]);

        transport.set_fail_sends(false);
        tokio::time::advance(RTO).await;
        assert_eq!(engine.retransmit_expired().await, 1);
        assert_eq!(transport.sent().len(), 1);
    }

    #[tokio::test]
    async fn drain_returns_immediately_when_empty() {
        let (_, engine) = engine(None);
        assert_eq!(engine.drain_and_wait().await, Ok(()));
    }

    #[tokio::test]
    async fn drain_waits_for_last_ack() {
        let (_, engine) = engine(None);
        engine.track(Segment::data(0, b"a".to_vec())).await;
        engine.track(Segment::data(1, b"b".to_vec())).await;

        let waiter = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.drain_and_wait().await })
        };

        engine.on_ack(1).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(!waiter.is_finished());

        engine.on_ack(0).await;
        let result = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("drain did not complete")
            .unwrap();
        assert_eq!(result, Ok(()));
    }

    #[tokio::test(start_paused = true)]
    async fn retry_cap_abandons_window() {
        let (transport, engine) = engine(Some(2));
        engine.track(Segment::data(0, b"void".to_vec())).await;

        // Two retransmissions allowed, the third expiry gives up.
        for _ in 0..2 {
            tokio::time::advance(RTO).await;
            assert_eq!(engine.retransmit_expired().await, 1);
        }
        tokio::time::advance(RTO).await;
        assert_eq!(engine.retransmit_expired().await, 0);

        assert_eq!(transport.sent().len(), 3);
        assert!(engine.outstanding().await.is_empty());
        assert_eq!(
            engine.failure().await,
            Some(RetransmitError::RetriesExhausted { seq: 0, attempts: 3 })
        );
        assert_eq!(
            engine.drain_and_wait().await,
            Err(RetransmitError::RetriesExhausted { seq: 0, attempts: 3 })
        );
    }
}
