//! `udp-streamer`: a reliable, in-order byte stream over lossy UDP.
//!
//! # Architecture
//!
//! ```text
//!  ┌───────────┐  DATA segments  ┌───────────┐
//!  │ Segmenter │────────────────▶│Reassembler│
//!  └─────┬─────┘                 └─────┬─────┘
//!        │ track                       │ ack every DATA
//!  ┌─────▼──────────┐     ACKs   ┌─────▼──────┐
//!  │RetransmitEngine│◀───────────│AckGenerator│
//!  └─────┬──────────┘            └────────────┘
//!        │
//!  ┌─────▼────────────────────────────┐
//!  │             Streamer             │
//!  │ (owns listener + timer tasks)    │
//!  └─────┬────────────────────────────┘
//!        │ raw datagrams
//!  ┌─────▼─────┐
//!  │ Transport │  (UDP socket, or the lossy simulator around one)
//!  └───────────┘
//! ```
//!
//! Each module has a single responsibility:
//! - [`packet`]: wire format (serialise / deserialise)
//! - [`sender`]: segmentation and sequence numbering
//! - [`retransmit`]: outstanding-segment set, resends, drain
//! - [`receiver`]: out-of-order buffering and in-order delivery
//! - [`ack`]: acknowledgment generation
//! - `listener`: background receive loop and demultiplexing
//! - `timer`: retransmission scan task
//! - [`state`]: stream lifecycle states
//! - [`config`]: tunable parameters
//! - [`socket`]: transport trait and UDP implementation
//! - [`simulator`]: loss / duplication / reordering for testing
//! - [`stream`]: the application-facing [`Streamer`]

pub mod ack;
pub mod config;
mod listener;
pub mod packet;
pub mod receiver;
pub mod retransmit;
pub mod sender;
pub mod simulator;
pub mod socket;
pub mod state;
pub mod stream;
mod timer;

pub use config::StreamConfig;
pub use socket::{Transport, TransportError, UdpTransport};
pub use state::StreamState;
pub use stream::{StreamError, Streamer};
