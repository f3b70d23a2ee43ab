//! Entry point for `udp-streamer`.
//!
//! Parses CLI arguments and dispatches into either **send** or **recv** mode.
//! All protocol work is delegated to the library; `main.rs` owns only
//! process setup (logging, signal handling, argument parsing).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use udp_streamer::simulator::{LossyTransport, SimulatorConfig};
use udp_streamer::{StreamConfig, Streamer, Transport, UdpTransport};

/// Reliable in-order byte stream over UDP.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,

    #[command(flatten)]
    tuning: Tuning,
}

#[derive(Subcommand)]
enum Mode {
    /// Stream a file (or stdin) to a peer, then close once everything is acknowledged.
    Send {
        /// Remote peer address (e.g. 127.0.0.1:9000).
        #[arg(short, long)]
        to: SocketAddr,
        /// Local address to bind; the receiver only accepts this source.
        #[arg(short, long, default_value = "0.0.0.0:9001")]
        bind: SocketAddr,
        /// File to send; stdin when omitted.
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
    /// Print the incoming stream to stdout until Ctrl-C.
    Recv {
        /// Local address to bind (e.g. 0.0.0.0:9000).
        #[arg(short, long, default_value = "0.0.0.0:9000")]
        bind: SocketAddr,
        /// Address the sending peer is bound to (e.g. 127.0.0.1:9001).
        #[arg(short, long)]
        peer: SocketAddr,
    },
}

#[derive(Args)]
struct Tuning {
    /// Retransmission timeout in milliseconds.
    #[arg(long, global = true, default_value_t = 500)]
    rto_ms: u64,
    /// Retransmissions per segment before giving up (unbounded when omitted).
    #[arg(long, global = true)]
    max_retries: Option<u32>,
    /// How long a closing stream keeps acknowledging a silent peer, in milliseconds.
    #[arg(long, global = true, default_value_t = 1500)]
    linger_ms: u64,
    /// Simulated probability of dropping an outbound datagram.
    #[arg(long, global = true, default_value_t = 0.0)]
    loss_rate: f64,
    /// Simulated probability of duplicating an outbound datagram.
    #[arg(long, global = true, default_value_t = 0.0)]
    duplicate_rate: f64,
    /// Simulated probability of delaying an outbound datagram.
    #[arg(long, global = true, default_value_t = 0.0)]
    reorder_rate: f64,
    /// Seed for the simulator's RNG.
    #[arg(long, global = true)]
    seed: Option<u64>,
}

impl Tuning {
    fn stream_config(&self) -> StreamConfig {
        StreamConfig {
            rto: Duration::from_millis(self.rto_ms),
            max_retries: self.max_retries,
            linger: Duration::from_millis(self.linger_ms),
            ..StreamConfig::default()
        }
    }

    fn simulating(&self) -> bool {
        self.loss_rate > 0.0 || self.duplicate_rate > 0.0 || self.reorder_rate > 0.0
    }

    async fn open(&self, bind: SocketAddr, peer: SocketAddr) -> anyhow::Result<Streamer> {
        let udp = UdpTransport::bind(bind)
            .await
            .with_context(|| format!("binding {bind}"))?;
        let transport: Arc<dyn Transport> = if self.simulating() {
            log::info!(
                "Simulating loss={} duplicate={} reorder={}",
                self.loss_rate,
                self.duplicate_rate,
                self.reorder_rate
            );
            let sim = SimulatorConfig {
                loss_rate: self.loss_rate,
                duplicate_rate: self.duplicate_rate,
                reorder_rate: self.reorder_rate,
                seed: self.seed,
                ..SimulatorConfig::default()
            };
            Arc::new(LossyTransport::new(Arc::new(udp), sim))
        } else {
            Arc::new(udp)
        };
        Ok(Streamer::with_transport(transport, peer, self.stream_config())?)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    let cli = Cli::parse();

    match cli.mode {
        Mode::Send { to, bind, file } => {
            let data = match file {
                Some(path) => tokio::fs::read(&path)
                    .await
                    .with_context(|| format!("reading {}", path.display()))?,
                None => {
                    let mut buf = Vec::new();
                    tokio::io::stdin().read_to_end(&mut buf).await?;
                    buf
                }
            };

            let stream = cli.tuning.open(bind, to).await?;
            log::info!("Sending {} bytes to {to}", data.len());
            stream.send(&data).await?;
            stream.close().await?;
            log::info!("All data acknowledged");
        }
        Mode::Recv { bind, peer } => {
            let stream = Arc::new(cli.tuning.open(bind, peer).await?);
            log::info!("Receiving on {bind}; Ctrl-C to stop");

            let reader = {
                let stream = Arc::clone(&stream);
                tokio::spawn(async move {
                    let mut stdout = tokio::io::stdout();
                    while let Some(chunk) = stream.recv().await? {
                        stdout.write_all(&chunk).await?;
                        stdout.flush().await?;
                    }
                    anyhow::Ok(())
                })
            };

            tokio::signal::ctrl_c().await?;
            stream.close().await?;
            reader.await??;
        }
    }

    Ok(())
}
