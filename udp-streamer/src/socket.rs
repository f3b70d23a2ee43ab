//! Datagram transport abstraction.
//!
//! [`Transport`] is the seam between the reliability protocol and whatever
//! actually moves datagrams.  It speaks raw bytes, may lose, duplicate or
//! reorder them, and must offer [`Transport::interrupt`] so a stream can
//! unblock its listener during teardown.
//!
//! [`UdpTransport`] is the production implementation over
//! `tokio::net::UdpSocket`.  All protocol logic lives elsewhere; this module
//! owns only byte I/O.

use std::net::SocketAddr;

use async_trait::async_trait;
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::watch;

/// Receive buffer size; comfortably above the largest segment we produce.
const MAX_DATAGRAM: usize = 65_535;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can arise from transport operations.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Underlying I/O error from the OS.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// A pending or new receive was cancelled by [`Transport::interrupt`].
    #[error("transport receive interrupted")]
    Interrupted,
}

// ---------------------------------------------------------------------------
// Transport trait
// ---------------------------------------------------------------------------

/// An unreliable, packet-oriented datagram channel.
///
/// Implementations need not guarantee delivery, ordering or deduplication.
/// They must not corrupt bytes.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Send `bytes` as a single datagram to `dest`.
    async fn send_to(&self, bytes: &[u8], dest: SocketAddr) -> Result<(), TransportError>;

    /// Wait for the next datagram.  Returns `(bytes, source_address)`.
    ///
    /// After [`Transport::interrupt`] has been called, pending and future
    /// calls return [`TransportError::Interrupted`].
    async fn recv_from(&self) -> Result<(Vec<u8>, SocketAddr), TransportError>;

    /// Unblock any pending [`Transport::recv_from`].  Never blocks.
    fn interrupt(&self);

    fn local_addr(&self) -> Result<SocketAddr, TransportError>;
}

// ---------------------------------------------------------------------------
// UdpTransport
// ---------------------------------------------------------------------------

/// A UDP socket with an interruptible receive.
#[derive(Debug)]
pub struct UdpTransport {
    inner: UdpSocket,
    /// Flips to `true` once; pending receives observe it through [`raised`].
    interrupted: watch::Sender<bool>,
}

impl UdpTransport {
    /// Bind a new socket to `local_addr`.
    ///
    /// Passing `0.0.0.0:0` lets the OS choose an ephemeral port.
    pub async fn bind(local_addr: SocketAddr) -> Result<Self, TransportError> {
        let inner = UdpSocket::bind(local_addr).await?;
        log::debug!("[udp] bound {}", inner.local_addr()?);
        Ok(Self::from_socket(inner))
    }

    /// Wrap an already-bound tokio socket.
    pub fn from_socket(inner: UdpSocket) -> Self {
        let (interrupted, _) = watch::channel(false);
        Self { inner, interrupted }
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn send_to(&self, bytes: &[u8], dest: SocketAddr) -> Result<(), TransportError> {
        self.inner.send_to(bytes, dest).await?;
        Ok(())
    }

    async fn recv_from(&self) -> Result<(Vec<u8>, SocketAddr), TransportError> {
        let mut interrupted = self.interrupted.subscribe();
        let mut buf = vec![0u8; MAX_DATAGRAM];

        tokio::select! {
            biased;
            _ = raised(&mut interrupted) => Err(TransportError::Interrupted),
            result = self.inner.recv_from(&mut buf) => {
                let (n, addr) = result?;
                buf.truncate(n);
                Ok((buf, addr))
            }
        }
    }

    fn interrupt(&self) {
        self.interrupted.send_replace(true);
    }

    fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.inner.local_addr()?)
    }
}

/// Resolves once the watched flag reads `true`.
///
/// Used for one-shot interruption and shutdown signals.  If the sending half
/// disappears without raising the flag, this never resolves.
pub(crate) async fn raised(flag: &mut watch::Receiver<bool>) {
    loop {
        if *flag.borrow_and_update() {
            return;
        }
        if flag.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

// ---------------------------------------------------------------------------
// In-memory double for unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use tokio::sync::{mpsc, Mutex};

    /// A datagram, or the I/O error the next receive should report.
    type Inbound = Result<(Vec<u8>, SocketAddr), std::io::ErrorKind>;

    /// Records every outbound datagram and replays whatever the test injects.
    pub(crate) struct MockTransport {
        pub(crate) local: SocketAddr,
        sent: std::sync::Mutex<Vec<(Vec<u8>, SocketAddr)>>,
        inbound_tx: mpsc::UnboundedSender<Inbound>,
        inbound_rx: Mutex<mpsc::UnboundedReceiver<Inbound>>,
        interrupted: watch::Sender<bool>,
        fail_sends: std::sync::atomic::AtomicBool,
    }

    impl MockTransport {
        pub(crate) fn new() -> Self {
            let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
            Self {
                local: "127.0.0.1:4000".parse().unwrap(),
                sent: std::sync::Mutex::new(Vec::new()),
                inbound_tx,
                inbound_rx: Mutex::new(inbound_rx),
                interrupted: watch::channel(false).0,
                fail_sends: std::sync::atomic::AtomicBool::new(false),
            }
        }

        pub(crate) fn inject(&self, bytes: Vec<u8>, from: SocketAddr) {
            self.inbound_tx.send(Ok((bytes, from))).unwrap();
        }

        /// Make one receive fail with a non-interrupt I/O error.
        pub(crate) fn inject_error(&self, kind: std::io::ErrorKind) {
            self.inbound_tx.send(Err(kind)).unwrap();
        }

        pub(crate) fn sent(&self) -> Vec<(Vec<u8>, SocketAddr)> {
            self.sent.lock().unwrap().clone()
        }

        pub(crate) fn set_fail_sends(&self, fail: bool) {
            self.fail_sends
                .store(fail, std::sync::atomic::Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send_to(&self, bytes: &[u8], dest: SocketAddr) -> Result<(), TransportError> {
            if self.fail_sends.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(std::io::Error::other("send refused").into());
            }
            self.sent.lock().unwrap().push((bytes.to_vec(), dest));
            Ok(())
        }

        async fn recv_from(&self) -> Result<(Vec<u8>, SocketAddr), TransportError> {
            let mut interrupted = self.interrupted.subscribe();
            let mut rx = self.inbound_rx.lock().await;
            tokio::select! {
                biased;
                _ = raised(&mut interrupted) => Err(TransportError::Interrupted),
                next = rx.recv() => match next {
                    Some(Ok(datagram)) => Ok(datagram),
                    Some(Err(kind)) => Err(std::io::Error::from(kind).into()),
                    None => Err(TransportError::Interrupted),
                },
            }
        }

        fn interrupt(&self) {
            self.interrupted.send_replace(true);
        }

        fn local_addr(&self) -> Result<SocketAddr, TransportError> {
            Ok(self.local)
        }
    }
}
