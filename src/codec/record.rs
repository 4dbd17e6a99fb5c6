//! Record model and wire encoding.

use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;
use std::net::SocketAddr;
use thiserror::Error;

/// Fixed header size: type (1), version (2), length (2).
pub const HEADER_LEN: usize = 5;

/// Largest payload a single record can carry.
pub const MAX_PAYLOAD_LEN: usize = u16::MAX as usize;

/// A payload too long for the 16-bit length field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("payload of {0} bytes exceeds the 65535-byte record limit")]
pub struct PayloadTooLarge(pub usize);

/// Record content type.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecordType {
    ChangeCipherSpec = 0x14,
    Alert = 0x15,
    Handshake = 0x16,
    ApplicationData = 0x17,
    Heartbeat = 0x18,
}

impl RecordType {
    /// All record types in wire order.
    pub const ALL: [RecordType; 5] = [
        RecordType::ChangeCipherSpec,
        RecordType::Alert,
        RecordType::Handshake,
        RecordType::ApplicationData,
        RecordType::Heartbeat,
    ];

    /// Short label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::ChangeCipherSpec => "change_cipher_spec",
            RecordType::Alert => "alert",
            RecordType::Handshake => "handshake",
            RecordType::ApplicationData => "application_data",
            RecordType::Heartbeat => "heartbeat",
        }
    }
}

impl TryFrom<u8> for RecordType {
    /// The rejected byte.
    type Error = u8;

    fn try_from(val: u8) -> Result<Self, Self::Error> {
        match val {
            0x14 => Ok(RecordType::ChangeCipherSpec),
            0x15 => Ok(RecordType::Alert),
            0x16 => Ok(RecordType::Handshake),
            0x17 => Ok(RecordType::ApplicationData),
            0x18 => Ok(RecordType::Heartbeat),
            other => Err(other),
        }
    }
}

impl From<RecordType> for u8 {
    fn from(t: RecordType) -> Self {
        t as u8
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.as_str(), *self as u8)
    }
}

/// One framed record.
///
/// Decoded records always satisfy `payload.len() == length`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Peer of the inbound connection this record arrived on, if any.
    pub remote: Option<SocketAddr>,
    pub record_type: RecordType,
    /// Opaque protocol version bytes.
    pub version: [u8; 2],
    /// Declared payload length.
    pub length: u16,
    pub payload: Bytes,
}

impl Record {
    /// Build a record; the length field is derived from the payload.
    pub fn try_new(
        record_type: RecordType,
        version: [u8; 2],
        payload: impl Into<Bytes>,
    ) -> Result<Self, PayloadTooLarge> {
        let payload = payload.into();
        let length = u16::try_from(payload.len()).map_err(|_| PayloadTooLarge(payload.len()))?;
        Ok(Self {
            remote: None,
            record_type,
            version,
            length,
            payload,
        })
    }

    /// Like [`Record::try_new`] for payloads known to fit.
    ///
    /// # Panics
    /// If the payload is longer than [`MAX_PAYLOAD_LEN`].
    pub fn new(record_type: RecordType, version: [u8; 2], payload: impl Into<Bytes>) -> Self {
        match Self::try_new(record_type, version, payload) {
            Ok(record) => record,
            Err(e) => panic!("{e}"),
        }
    }

    /// Attach the peer address the record was read from.
    pub fn with_remote(mut self, remote: SocketAddr) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Size of the encoded record.
    pub fn encoded_len(&self) -> usize {
        HEADER_LEN + self.payload.len()
    }

    /// Serialize to wire format.
    ///
    /// The length written is `payload.len()`, not the stored `length` field.
    ///
    /// # Panics
    /// If `payload` was replaced with one longer than [`MAX_PAYLOAD_LEN`].
    pub fn encode(&self) -> Bytes {
        let length = match u16::try_from(self.payload.len()) {
            Ok(length) => length,
            Err(_) => panic!("{}", PayloadTooLarge(self.payload.len())),
        };
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        buf.put_u8(self.record_type.into());
        buf.put_slice(&self.version);
        buf.put_u16(length);
        buf.put_slice(&self.payload);
        buf.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_type_range() {
        for t in RecordType::ALL {
            assert_eq!(RecordType::try_from(u8::from(t)), Ok(t));
        }
        assert_eq!(RecordType::try_from(0x13), Err(0x13));
        assert_eq!(RecordType::try_from(0x19), Err(0x19));
    }

    #[test]
    fn encode_layout() {
        let record = Record::new(RecordType::Handshake, [3, 3], &b"abc"[..]);
        assert_eq!(&record.encode()[..], &[0x16, 3, 3, 0, 3, b'a', b'b', b'c']);
    }

    #[test]
    fn encode_ignores_stale_length() {
        let mut record = Record::new(RecordType::Alert, [3, 1], &b"xy"[..]);
        record.length = 900;
        let bytes = record.encode();
        assert_eq!(&bytes[3..5], &[0, 2]);
        assert_eq!(bytes.len(), HEADER_LEN + 2);
    }

    #[test]
    fn oversize_payload_is_rejected() {
        let fits = Record::try_new(RecordType::ApplicationData, [3, 3], vec![0u8; MAX_PAYLOAD_LEN]).unwrap();
        assert_eq!(fits.length, u16::MAX);

        let err = Record::try_new(RecordType::ApplicationData, [3, 3], vec![0u8; MAX_PAYLOAD_LEN + 1]).unwrap_err();
        assert_eq!(err, PayloadTooLarge(MAX_PAYLOAD_LEN + 1));
        assert!(err.to_string().contains("65536"));
    }

    #[test]
    #[should_panic(expected = "exceeds")]
    fn encode_refuses_to_wrap_the_length() {
        let mut record = Record::new(RecordType::ApplicationData, [3, 3], &b""[..]);
        record.payload = Bytes::from(vec![0u8; MAX_PAYLOAD_LEN + 1]);
        record.encode();
    }
}
