//! Retransmission timer task.
//!
//! Reliable delivery requires that unacknowledged segments are re-sent if no
//! ACK arrives within a bounded time.  The timer runs as its own task, apart
//! from the listener, so scanning never stalls behind a blocked receive.
//!
//! Every `scan_interval` it asks the [`RetransmitEngine`] to resend whatever
//! has been outstanding for at least one RTO.  The RTO is fixed; there is no
//! RTT estimation or back-off.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::retransmit::RetransmitEngine;
use crate::socket::raised;

/// Scan `engine` every `scan_interval` until `shutdown` is raised.
pub(crate) async fn run(
    engine: Arc<RetransmitEngine>,
    scan_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(scan_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = raised(&mut shutdown) => break,
            _ = ticker.tick() => {
                let resent = engine.retransmit_expired().await;
                if resent > 0 {
                    log::debug!("[timer] resent {resent} segment(s)");
                }
            }
        }
    }
    log::debug!("[timer] stopped");
}
