//! DCE RPC transport layer
//!
//! For connection-oriented transports PDUs are self-delimiting via the
//! frag_length field in the header. Reads are buffered: one read from the
//! stream may return the tail of one PDU and the start of the next.

use crate::dcerpc::{Pdu, PduHeader};
use crate::error::{Result, RpcError};
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Maximum PDU size (64 KB default, typical DCE RPC limit)
pub const DEFAULT_MAX_PDU_SIZE: usize = 65536;

/// DCE RPC transport for reading/writing PDUs over a byte stream
pub struct DceRpcTransport<T> {
    inner: T,
    max_pdu_size: usize,
    read_buf: BytesMut,
}

impl<T> DceRpcTransport<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            max_pdu_size: DEFAULT_MAX_PDU_SIZE,
            read_buf: BytesMut::with_capacity(8192),
        }
    }

    pub fn with_max_pdu_size(mut self, max_size: usize) -> Self {
        self.max_pdu_size = max_size;
        self
    }

    pub fn into_inner(self) -> T {
        self.inner
    }

    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }
}

impl<T: AsyncRead + Unpin> DceRpcTransport<T> {
    /// Read a complete DCE RPC PDU
    pub async fn read_pdu(&mut self) -> Result<Bytes> {
        // The 16-byte common header comes first; a close before any of it
        // arrived is an orderly end of the connection
        if !self.fill_to(PduHeader::SIZE).await? {
            if self.read_buf.is_empty() {
                return Err(RpcError::ConnectionClosed);
            }
            return Err(unexpected_eof("incomplete PDU header".to_string()));
        }

        // frag_length at offset 8 covers header, body and auth trailer.
        // Only the length is needed to frame; the rest is validated on decode
        let frag_length = u16::from_le_bytes([self.read_buf[8], self.read_buf[9]]) as usize;

        if frag_length < PduHeader::SIZE {
            return Err(RpcError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("invalid fragment length: {} < header size", frag_length),
            )));
        }

        // Checked before buffering the body so a peer cannot make us grow
        // the read buffer past the limit
        if frag_length > self.max_pdu_size {
            return Err(RpcError::RecordTooLarge {
                size: frag_length,
                max: self.max_pdu_size,
            });
        }

        if !self.fill_to(frag_length).await? {
            return Err(unexpected_eof(format!(
                "incomplete PDU: expected {} bytes, got {}",
                frag_length,
                self.read_buf.len()
            )));
        }

        // Bytes past frag_length belong to the next PDU and stay buffered
        Ok(self.read_buf.split_to(frag_length).freeze())
    }

    /// Read and decode a complete PDU
    pub async fn read_pdu_decoded(&mut self) -> Result<Pdu> {
        let data = self.read_pdu().await?;
        Pdu::decode(&data)
    }

    /// Read until at least `len` bytes are buffered. Returns `false` if the
    /// stream ends first.
    async fn fill_to(&mut self, len: usize) -> Result<bool> {
        while self.read_buf.len() < len {
            if self.fill_buf().await? == 0 {
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn fill_buf(&mut self) -> Result<usize> {
        // keep some spare room so small reads don't reallocate every time
        if self.read_buf.capacity() - self.read_buf.len() < 4096 {
            self.read_buf.reserve(8192);
        }
        Ok(self.inner.read_buf(&mut self.read_buf).await?)
    }
}

fn unexpected_eof(message: String) -> RpcError {
    RpcError::Io(std::io::Error::new(
        std::io::ErrorKind::UnexpectedEof,
        message,
    ))
}

impl<T: AsyncWrite + Unpin> DceRpcTransport<T> {
    /// Write a complete DCE RPC PDU (already encoded)
    ///
    /// The peer frames on frag_length, so the whole PDU goes out before the
    /// flush.
    pub async fn write_pdu(&mut self, data: &[u8]) -> Result<()> {
        if data.len() > self.max_pdu_size {
            return Err(RpcError::PduTooLarge {
                size: data.len(),
                max: self.max_pdu_size,
            });
        }
        self.inner.write_all(data).await?;
        self.inner.flush().await?;
        Ok(())
    }

    /// Encode and write a PDU
    pub async fn write_pdu_encoded(&mut self, pdu: &Pdu) -> Result<()> {
        let data = pdu.encode()?;
        self.write_pdu(&data).await
    }
}
