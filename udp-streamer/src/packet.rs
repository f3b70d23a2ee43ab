//! Wire-format definitions for stream segments.
//!
//! Every datagram exchanged between peers is a [`Segment`].  This module is
//! responsible for:
//! - Defining the on-wire binary layout (sequence number, kind, payload).
//! - Serialising a [`Segment`] into a byte buffer ready for transmission.
//! - Deserialising a raw byte slice back into a [`Segment`], returning errors
//!   for malformed or truncated input.
//!
//! No I/O happens here; this is pure data transformation.
//!
//! # Wire format
//!
//! All multi-byte integers are **big-endian**.
//!
//! ```text
//!  0               1               2               3
//!  0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                        Sequence Number                        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |     Kind      |              Payload ... (DATA only)          |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Total header size: [`HEADER_LEN`] = 5 bytes.
//!
//! For a DATA segment the sequence number is the segment's position in the
//! stream; for an ACK it names the DATA segment being acknowledged.  The two
//! sequence spaces never mix because the kind byte is always present.

use thiserror::Error;

/// Byte length of the fixed-size header on the wire.
pub const HEADER_LEN: usize = 5;

/// Largest payload a single DATA segment may carry.
pub const MAX_PAYLOAD: usize = 1472;

/// Largest datagram this protocol ever produces.
pub const MAX_SEGMENT_LEN: usize = HEADER_LEN + MAX_PAYLOAD;

const OFF_SEQ: usize = 0;
const OFF_KIND: usize = 4;

/// Discriminates payload-carrying segments from acknowledgments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SegmentKind {
    Data = 0x00,
    Ack = 0x01,
}

impl TryFrom<u8> for SegmentKind {
    type Error = SegmentError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            0x00 => Ok(Self::Data),
            0x01 => Ok(Self::Ack),
            other => Err(SegmentError::UnknownKind(other)),
        }
    }
}

/// A complete protocol datagram: header + payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub seq: u32,
    pub kind: SegmentKind,
    pub payload: Vec<u8>,
}

impl Segment {
    /// A DATA segment at position `seq` carrying `payload`.
    pub fn data(seq: u32, payload: Vec<u8>) -> Self {
        Self {
            seq,
            kind: SegmentKind::Data,
            payload,
        }
    }

    /// An ACK for the DATA segment numbered `seq`.
    pub fn ack(seq: u32) -> Self {
        Self {
            seq,
            kind: SegmentKind::Ack,
            payload: Vec::new(),
        }
    }

    pub fn is_ack(&self) -> bool {
        self.kind == SegmentKind::Ack
    }

    /// Serialise this segment into a newly allocated byte vector.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_LEN + self.payload.len());
        buf.extend_from_slice(&self.seq.to_be_bytes());
        buf.push(self.kind as u8);
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Parse a [`Segment`] from a raw byte slice.
    ///
    /// Returns [`Err`] if:
    /// - `buf` is shorter than [`HEADER_LEN`],
    /// - the kind byte is neither DATA nor ACK,
    /// - an ACK carries payload bytes, or
    /// - the payload exceeds [`MAX_PAYLOAD`].
    pub fn decode(buf: &[u8]) -> Result<Self, SegmentError> {
        if buf.len() < HEADER_LEN {
            return Err(SegmentError::BufferTooShort(buf.len()));
        }

        let mut seq_bytes = [0u8; 4];
        seq_bytes.copy_from_slice(&buf[OFF_SEQ..OFF_SEQ + 4]);
        let seq = u32::from_be_bytes(seq_bytes);
        let kind = SegmentKind::try_from(buf[OFF_KIND])?;
        let payload = &buf[HEADER_LEN..];

        if payload.len() > MAX_PAYLOAD {
            return Err(SegmentError::PayloadTooLarge(payload.len()));
        }
        if kind == SegmentKind::Ack && !payload.is_empty() {
            return Err(SegmentError::AckWithPayload(payload.len()));
        }

        Ok(Segment {
            seq,
            kind,
            payload: payload.to_vec(),
        })
    }
}

/// Errors that can arise when parsing a raw datagram.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SegmentError {
    #[error("datagram of {0} bytes is too short to contain a header")]
    BufferTooShort(usize),
    #[error("unknown segment kind {0:#04x}")]
    UnknownKind(u8),
    #[error("ACK segment carries {0} payload bytes")]
    AckWithPayload(usize),
    #[error("payload of {0} bytes exceeds the {MAX_PAYLOAD}-byte limit")]
    PayloadTooLarge(usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_roundtrip() {
        let seg = Segment::data(42, b"hello".to_vec());
        let decoded = Segment::decode(&seg.encode()).unwrap();
        assert_eq!(decoded, seg);
        assert!(!decoded.is_ack());
    }

    #[test]
    fn ack_is_header_only() {
        let bytes = Segment::ack(7).encode();
        assert_eq!(bytes.len(), HEADER_LEN);
        assert_eq!(bytes[OFF_KIND], SegmentKind::Ack as u8);
        assert!(Segment::decode(&bytes).unwrap().is_ack());
    }

    #[test]
    fn seq_big_endian_on_wire() {
        let bytes = Segment::data(0x0102_0304, vec![]).encode();
        assert_eq!(&bytes[OFF_SEQ..OFF_SEQ + 4], &[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(bytes[OFF_KIND], 0x00);
    }

    #[test]
    fn decode_empty_buffer_returns_error() {
        assert_eq!(Segment::decode(&[]), Err(SegmentError::BufferTooShort(0)));
    }

    #[test]
    fn decode_short_header_returns_error() {
        assert_eq!(
            Segment::decode(&[0u8; HEADER_LEN - 1]),
            Err(SegmentError::BufferTooShort(HEADER_LEN - 1))
        );
    }

    #[test]
    fn decode_unknown_kind_returns_error() {
        let mut bytes = Segment::data(1, b"x".to_vec()).encode();
        bytes[OFF_KIND] = 0x7f;
        assert_eq!(Segment::decode(&bytes), Err(SegmentError::UnknownKind(0x7f)));
    }

    #[test]
    fn decode_ack_with_payload_returns_error() {
        let mut bytes = Segment::ack(3).encode();
        bytes.extend_from_slice(b"junk");
        assert_eq!(Segment::decode(&bytes), Err(SegmentError::AckWithPayload(4)));
    }

    #[test]
    fn decode_oversized_payload_returns_error() {
        let bytes = Segment::data(0, vec![0u8; MAX_PAYLOAD + 1]).encode();
        assert_eq!(
            Segment::decode(&bytes),
            Err(SegmentError::PayloadTooLarge(MAX_PAYLOAD + 1))
        );
    }

    #[test]
    fn full_sized_payload_fits() {
        let bytes = Segment::data(9, vec![0xab; MAX_PAYLOAD]).encode();
        assert_eq!(bytes.len(), MAX_SEGMENT_LEN);
        assert_eq!(Segment::decode(&bytes).unwrap().payload.len(), MAX_PAYLOAD);
    }
}
