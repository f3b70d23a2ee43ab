//! Reliable stream: the application-facing handle.
//!
//! # Architecture
//!
//! ```text
//!  Application
//!      │ send(bytes)            recv() ▲
//!      ▼                               │
//!  Segmenter ──▶ RetransmitEngine   Reassembler
//!                  ▲     │  ▲           ▲
//!       timer task ┘     │  │ ACK       │ DATA ──▶ AckGenerator
//!                        │  └──── listener task ───┘
//!                        ▼            ▲
//!                  Arc<dyn Transport> ┘
//! ```
//!
//! A [`Streamer`] owns both background tasks.  Each task holds handles to
//! the pieces it updates rather than to the stream itself.
//!
//! # Lifecycle
//!
//! [`Streamer::close`] moves OPEN → CLOSING and waits for every outstanding
//! segment to be acknowledged.  It then lingers while the peer is still
//! sending, so that a lost final ACK can be answered again.  Finally it
//! interrupts the transport, releases blocked readers with end-of-stream,
//! joins both tasks, and lands in CLOSED.
//!
//! ```ignore
//! let stream = Streamer::bind(peer, "0.0.0.0:0".parse()?).await?;
//! stream.send(b"hello").await?;
//! while let Some(chunk) = stream.recv().await? { /* ... */ }
//! stream.close().await?;
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::ack::AckGenerator;
use crate::config::{ConfigError, StreamConfig};
use crate::listener::Listener;
use crate::receiver::Reassembler;
use crate::retransmit::{RetransmitEngine, RetransmitError};
use crate::sender::Segmenter;
use crate::socket::{Transport, TransportError, UdpTransport};
use crate::state::StreamState;
use crate::timer;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors surfaced to stream users.
#[derive(Debug, Error)]
pub enum StreamError {
    /// The operation is not allowed in the stream's current state.
    #[error("stream is {0}")]
    InvalidState(StreamState),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Only possible when `max_retries` is configured.
    #[error(transparent)]
    Retransmit(#[from] RetransmitError),
}

struct BackgroundTasks {
    listener: JoinHandle<()>,
    timer: JoinHandle<()>,
}

// ---------------------------------------------------------------------------
// Streamer
// ---------------------------------------------------------------------------

/// A reliable, ordered byte stream to one peer.
///
/// All methods take `&self`; wrap the stream in an `Arc` to read and write
/// from different tasks.
pub struct Streamer {
    peer: SocketAddr,
    config: StreamConfig,
    transport: Arc<dyn Transport>,
    /// Also serialises concurrent `send` calls so their segments are
    /// numbered and tracked as one unit.
    segmenter: Mutex<Segmenter>,
    engine: Arc<RetransmitEngine>,
    reassembler: Arc<Reassembler>,
    state: watch::Sender<StreamState>,
    timer_stop: watch::Sender<bool>,
    tasks: Mutex<Option<BackgroundTasks>>,
    /// Held by whichever `close` call is driving teardown.  A cancelled
    /// call releases it and leaves the rest to the next caller.
    teardown: Mutex<()>,
}

impl Streamer {
    /// Bind a UDP socket on `src` and open a stream to `dst` with default
    /// settings.
    pub async fn bind(dst: SocketAddr, src: SocketAddr) -> Result<Self, StreamError> {
        Self::bind_with_config(dst, src, StreamConfig::default()).await
    }

    pub async fn bind_with_config(
        dst: SocketAddr,
        src: SocketAddr,
        config: StreamConfig,
    ) -> Result<Self, StreamError> {
        config.validate()?;
        let transport = UdpTransport::bind(src).await?;
        Self::with_transport(Arc::new(transport), dst, config)
    }

    /// Open a stream over an existing transport.
    ///
    /// Spawns the listener and timer tasks, so this must be called from
    /// within a tokio runtime.
    pub fn with_transport(
        transport: Arc<dyn Transport>,
        peer: SocketAddr,
        config: StreamConfig,
    ) -> Result<Self, StreamError> {
        config.validate()?;

        let engine = Arc::new(RetransmitEngine::new(transport.clone(), peer, &config));
        let reassembler = Arc::new(Reassembler::new());
        let listener = Listener {
            peer,
            transport: transport.clone(),
            reassembler: reassembler.clone(),
            engine: engine.clone(),
            acks: AckGenerator::new(transport.clone()),
        };
        let (timer_stop, timer_rx) = watch::channel(false);
        let tasks = BackgroundTasks {
            listener: tokio::spawn(listener.run()),
            timer: tokio::spawn(timer::run(engine.clone(), config.scan_interval, timer_rx)),
        };

        match transport.local_addr() {
            Ok(local) => log::info!("[stream] open {local} → {peer}"),
            Err(_) => log::info!("[stream] open → {peer}"),
        }

        Ok(Self {
            peer,
            segmenter: Mutex::new(Segmenter::new(config.max_payload)),
            config,
            transport,
            engine,
            reassembler,
            state: watch::channel(StreamState::Open).0,
            timer_stop,
            tasks: Mutex::new(Some(tasks)),
            teardown: Mutex::new(()),
        })
    }

    // -----------------------------------------------------------------------
    // Data transfer
    // -----------------------------------------------------------------------

    /// Queue `data` for reliable delivery.
    ///
    /// Returns once every segment has been handed to the transport at least
    /// once; delivery is confirmed asynchronously.  An empty slice is a
    /// no-op.  Fails with [`StreamError::InvalidState`] once `close` has
    /// begun, and with [`StreamError::Retransmit`] once the retry cap has
    /// given up on the peer.
    pub async fn send(&self, data: &[u8]) -> Result<(), StreamError> {
        let mut segmenter = self.segmenter.lock().await;
        let state = self.state();
        if !state.accepts_sends() {
            return Err(StreamError::InvalidState(state));
        }
        if let Some(err) = self.engine.failure().await {
            return Err(err.into());
        }

        for segment in segmenter.segment(data) {
            self.engine.track(segment).await;
        }
        Ok(())
    }

    /// Receive the next in-order payload.
    ///
    /// Returns `Ok(None)` at end-of-stream, which happens once this stream
    /// is closed, including when `close` runs while this call is waiting.
    /// Calling `recv` on an already closed stream is an error.
    pub async fn recv(&self) -> Result<Option<Vec<u8>>, StreamError> {
        let state = self.state();
        if state == StreamState::Closed {
            return Err(StreamError::InvalidState(state));
        }
        Ok(self.reassembler.take().await)
    }

    // -----------------------------------------------------------------------
    // Teardown
    // -----------------------------------------------------------------------

    /// Wait until all sent data is acknowledged, then tear the stream down.
    ///
    /// Safe to call more than once, concurrently, or again after an earlier
    /// call was cancelled: the next caller picks up the teardown, and once
    /// the stream is CLOSED further calls return `Ok(())`.  With a retry cap
    /// configured, a peer that stops acknowledging makes this return
    /// [`StreamError::Retransmit`] after the teardown itself still
    /// completes.  Without a cap, a peer that has already gone away never
    /// acknowledges, and this waits indefinitely.
    pub async fn close(&self) -> Result<(), StreamError> {
        self.state.send_if_modified(|state| {
            let opening = *state == StreamState::Open;
            if opening {
                *state = StreamState::Closing;
            }
            opening
        });

        let _teardown = self.teardown.lock().await;
        if self.state() == StreamState::Closed {
            return Ok(());
        }

        log::info!("[stream] closing, draining outstanding segments");
        let drained = {
            // Let any send already past its state check finish first.
            let _segmenter = self.segmenter.lock().await;
            self.engine.drain_and_wait().await
        };
        if drained.is_ok() {
            self.linger().await;
        }

        self.transport.interrupt();
        self.timer_stop.send_replace(true);
        self.reassembler.close().await;

        let tasks = self.tasks.lock().await.take();
        if let Some(tasks) = tasks {
            for (name, handle) in [("listener", tasks.listener), ("timer", tasks.timer)] {
                if let Err(e) = handle.await {
                    log::warn!("[stream] {name} task ended abnormally: {e}");
                }
            }
        }

        self.state.send_replace(StreamState::Closed);
        log::info!("[stream] closed");
        drained.map_err(StreamError::from)
    }

    /// Keep the listener answering until the peer has been quiet for
    /// `config.linger`.  Returns at once if no DATA ever arrived.
    async fn linger(&self) {
        if self.config.linger.is_zero() {
            return;
        }
        while let Some(last) = self.reassembler.last_arrival().await {
            let deadline = last + self.config.linger;
            if Instant::now() >= deadline {
                break;
            }
            log::debug!("[stream] lingering for late peer DATA");
            tokio::time::sleep_until(deadline).await;
        }
    }

    // -----------------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------------

    pub fn state(&self) -> StreamState {
        *self.state.borrow()
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn local_addr(&self) -> Result<SocketAddr, StreamError> {
        Ok(self.transport.local_addr()?)
    }

    /// Sequence numbers sent but not yet acknowledged, ascending.
    pub async fn unacknowledged(&self) -> Vec<u32> {
        self.engine.outstanding().await
    }
}

impl Drop for Streamer {
    fn drop(&mut self) {
        if let Some(tasks) = self.tasks.get_mut().take() {
            log::debug!("[stream] dropped without close; aborting background tasks");
            self.transport.interrupt();
            tasks.listener.abort();
            tasks.timer.abort();
        }
    }
}
