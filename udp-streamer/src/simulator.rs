//! Fault-injecting transport for testing and demos.
//!
//! Real networks drop, reorder, and duplicate packets.  To exercise the
//! reliability mechanisms without depending on actual network conditions,
//! [`LossyTransport`] wraps any [`Transport`] and applies a configurable
//! fault model to every outbound datagram:
//!
//! | Fault            | Description                                      |
//! |------------------|--------------------------------------------------|
//! | Packet loss      | Drop a packet with probability `loss_rate`.      |
//! | Duplication      | Deliver a packet twice.                          |
//! | Reordering       | Delay a packet by `reorder_delay`, letting later |
//! |                  | packets overtake it.                             |
//! | Drop rule        | Drop exactly the packets a predicate selects.    |
//!
//! Bytes are never altered: the protocol assumes an uncorrupting channel.
//! Randomness comes from a seeded RNG so failures are reproducible.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::Mutex;

use crate::socket::{Transport, TransportError};

/// Predicate over outbound datagrams; returning `true` drops the datagram.
pub type DropRule = Box<dyn FnMut(&[u8]) -> bool + Send>;

/// Configuration for the fault-injection model.
///
/// All probabilities are in the range `[0.0, 1.0]`.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Probability that any given packet is silently dropped.
    pub loss_rate: f64,
    /// Probability that a packet is sent twice.
    pub duplicate_rate: f64,
    /// Probability that a packet is held back before sending.
    pub reorder_rate: f64,
    /// Delay applied to held-back packets.
    pub reorder_delay: Duration,
    /// RNG seed; `None` draws one from the OS.
    pub seed: Option<u64>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        // No faults by default: the simulator is a transparent pass-through.
        Self {
            loss_rate: 0.0,
            duplicate_rate: 0.0,
            reorder_rate: 0.0,
            reorder_delay: Duration::from_millis(20),
            seed: None,
        }
    }
}

enum Fate {
    Drop,
    Send { copies: usize, delay: Option<Duration> },
}

/// A fault-injecting wrapper around another transport.
pub struct LossyTransport {
    inner: Arc<dyn Transport>,
    config: SimulatorConfig,
    rng: Mutex<StdRng>,
    drop_rule: Mutex<Option<DropRule>>,
}

impl LossyTransport {
    pub fn new(inner: Arc<dyn Transport>, config: SimulatorConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            inner,
            config,
            rng: Mutex::new(rng),
            drop_rule: Mutex::new(None),
        }
    }

    /// Wrap `inner` with no random faults, dropping whatever `rule` selects.
    pub fn with_drop_rule(inner: Arc<dyn Transport>, rule: DropRule) -> Self {
        Self {
            drop_rule: Mutex::new(Some(rule)),
            ..Self::new(inner, SimulatorConfig::default())
        }
    }

    /// Install or replace the deterministic drop rule.
    pub async fn set_drop_rule(&self, rule: Option<DropRule>) {
        *self.drop_rule.lock().await = rule;
    }

    async fn fate(&self, bytes: &[u8]) -> Fate {
        if let Some(rule) = self.drop_rule.lock().await.as_mut() {
            if rule(bytes) {
                return Fate::Drop;
            }
        }

        let mut rng = self.rng.lock().await;
        if rng.random_bool(self.config.loss_rate.clamp(0.0, 1.0)) {
            return Fate::Drop;
        }
        let copies = if rng.random_bool(self.config.duplicate_rate.clamp(0.0, 1.0)) {
            2
        } else {
            1
        };
        let delay = rng
            .random_bool(self.config.reorder_rate.clamp(0.0, 1.0))
            .then_some(self.config.reorder_delay);
        Fate::Send { copies, delay }
    }
}

#[async_trait]
impl Transport for LossyTransport {
    async fn send_to(&self, bytes: &[u8], dest: SocketAddr) -> Result<(), TransportError> {
        match self.fate(bytes).await {
            Fate::Drop => {
                log::trace!("[sim] dropped {} bytes to {dest}", bytes.len());
                Ok(())
            }
            Fate::Send {
                copies,
                delay: Some(delay),
            } => {
                let inner = Arc::clone(&self.inner);
                let bytes = bytes.to_vec();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    for _ in 0..copies {
                        if let Err(e) = inner.send_to(&bytes, dest).await {
                            log::trace!("[sim] delayed send failed: {e}");
                        }
                    }
                });
                Ok(())
            }
            Fate::Send { copies, delay: None } => {
                for _ in 0..copies {
                    self.inner.send_to(bytes, dest).await?;
                }
                Ok(())
            }
        }
    }

    async fn recv_from(&self) -> Result<(Vec<u8>, SocketAddr), TransportError> {
        self.inner.recv_from().await
    }

    fn interrupt(&self) {
        self.inner.interrupt();
    }

    fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        self.inner.local_addr()
    }
}
