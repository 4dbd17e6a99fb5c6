//! Record decoding over partial-read streams.
//!
//! # Responsibilities
//! - Read the fixed header and reject unknown record types
//! - Collect exactly `length` payload bytes with bounded reads
//! - Flag unusually large records
//! - Keep partial records across cancelled reads

use bytes::BytesMut;
use std::future::Future;
use std::io;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::codec::record::{Record, RecordType, HEADER_LEN};
use crate::config::CodecConfig;

/// Errors produced while decoding a record.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The type byte is outside the record range; the stream cannot be resynchronized.
    #[error("unknown record type {0:#04x}, closing connection")]
    MalformedHeader(u8),

    /// The underlying stream failed or ended mid-record.
    #[error("record read failed: {0}")]
    Io(#[from] io::Error),
}

impl CodecError {
    /// True for framing violations (as opposed to transport failures).
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, CodecError::MalformedHeader(_))
    }
}

/// A stream that can serve one bounded read at a time.
///
/// Implemented for every Tokio reader and for route handles, whose reads
/// retry across reconnects.
pub trait ChunkSource {
    /// Read at most `buf.len()` bytes. `Ok(0)` means end of stream.
    fn read_chunk(&mut self, buf: &mut [u8]) -> impl Future<Output = io::Result<usize>> + Send;
}

impl<T> ChunkSource for T
where
    T: AsyncRead + Unpin + Send,
{
    async fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read(buf).await
    }
}

/// Decoder configured with read chunking and large-record reporting.
#[derive(Debug, Clone, Copy)]
pub struct RecordDecoder {
    chunk_size: usize,
    large_record_threshold: usize,
}

impl RecordDecoder {
    /// Create a decoder from codec settings.
    pub fn new(config: &CodecConfig) -> Self {
        Self {
            chunk_size: config.read_chunk_size.max(1),
            large_record_threshold: config.large_record_threshold,
        }
    }

    /// Decode the next record from `source`.
    ///
    /// Fails with [`CodecError::MalformedHeader`] on an unknown type byte; the
    /// caller must close the connection since framing is lost.
    pub async fn decode<S>(&self, source: &mut S) -> Result<Record, CodecError>
    where
        S: ChunkSource + Send,
    {
        self.decode_into(source, &mut PartialRecord::default()).await
    }

    /// Decode the next record, keeping the bytes read so far in `partial`.
    ///
    /// Cancel-safe whenever `source.read_chunk` is: dropping the future
    /// leaves every consumed byte in `partial`, and the next call with the
    /// same `partial` carries on from there. Reads never go past the end of
    /// the current record.
    pub async fn decode_into<S>(
        &self,
        source: &mut S,
        partial: &mut PartialRecord,
    ) -> Result<Record, CodecError>
    where
        S: ChunkSource + Send,
    {
        let mut chunk = vec![0u8; self.chunk_size];
        loop {
            if let Some(record_type) = partial.record_type {
                if partial.missing() == 0 {
                    return Ok(partial.finish(record_type));
                }
            }

            let wanted = partial.missing().min(self.chunk_size);
            let n = source.read_chunk(&mut chunk[..wanted]).await?;
            if n == 0 {
                let have = partial.len();
                partial.clear();
                return Err(CodecError::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("stream ended after {have} bytes of a record"),
                )));
            }

            let had_header = partial.len() >= HEADER_LEN;
            partial.buf.extend_from_slice(&chunk[..n]);
            if !had_header && partial.len() >= HEADER_LEN {
                self.check_header(partial)?;
            }
        }
    }

    fn check_header(&self, partial: &mut PartialRecord) -> Result<(), CodecError> {
        let record_type = match RecordType::try_from(partial.buf[0]) {
            Ok(record_type) => record_type,
            Err(byte) => {
                partial.clear();
                return Err(CodecError::MalformedHeader(byte));
            }
        };

        let length = partial.declared_len();
        if length > self.large_record_threshold {
            tracing::warn!(
                record_type = %record_type,
                length,
                threshold = self.large_record_threshold,
                "Large record found"
            );
        }
        partial.record_type = Some(record_type);
        Ok(())
    }
}

/// Bytes of a record that has not been fully read yet.
#[derive(Debug, Default)]
pub struct PartialRecord {
    buf: BytesMut,
    /// Set once the header is complete and valid.
    record_type: Option<RecordType>,
}

impl PartialRecord {
    /// Bytes held so far, header included.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Forget any buffered bytes.
    pub fn clear(&mut self) {
        self.buf.clear();
        self.record_type = None;
    }

    fn declared_len(&self) -> usize {
        usize::from(u16::from_be_bytes([self.buf[3], self.buf[4]]))
    }

    /// Bytes still needed to finish the header, or the record once the header is known.
    fn missing(&self) -> usize {
        if self.buf.len() < HEADER_LEN {
            HEADER_LEN - self.buf.len()
        } else {
            HEADER_LEN + self.declared_len() - self.buf.len()
        }
    }

    fn finish(&mut self, record_type: RecordType) -> Record {
        self.record_type = None;
        let mut payload = self.buf.split().freeze();
        let header = payload.split_to(HEADER_LEN);
        Record {
            remote: None,
            record_type,
            version: [header[1], header[2]],
            length: u16::from_be_bytes([header[3], header[4]]),
            payload,
        }
    }
}

impl Default for RecordDecoder {
    fn default() -> Self {
        Self::new(&CodecConfig::default())
    }
}
