//! Packet representation shared between the engines and their collaborators.
//!
//! A packet couples a reference-counted IPv6 header with a payload that may
//! be scattered over several independently allocated chunks. The header
//! `Rc` stands in for the stack's reference-counted packet-buffer arena:
//! whoever clones the handle shares ownership, and the count drops back
//! when a reassembly context or the packet itself is released.

use std::rc::Rc;

use bytes::{Bytes, BytesMut};

use crate::error::{FragError, Result};
use crate::ipv6::{Ipv6Header, IPV6_HEADER_SIZE};

/// A payload assembled from possibly many non-aligned memory chunks,
/// presented as one logical contiguous byte stream.
///
/// Chunk sizes are not assumed to be multiples of 8; readers cross chunk
/// boundaries transparently.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PayloadChunks {
    chunks: Vec<Bytes>,
    len: usize,
}

impl PayloadChunks {
    /// Create an empty payload.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total length in bytes across all chunks.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check whether the payload holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of backing chunks.
    pub fn num_chunks(&self) -> usize {
        self.chunks.len()
    }

    /// Append a chunk to the logical stream. Empty chunks are discarded.
    pub fn push(&mut self, chunk: Bytes) {
        if chunk.is_empty() {
            return;
        }
        self.len += chunk.len();
        self.chunks.push(chunk);
    }

    /// Copy `len` bytes starting at `offset` out of the logical stream.
    ///
    /// The range is clamped to the available bytes. When it falls inside a
    /// single chunk the returned `Bytes` shares that chunk's storage.
    pub fn copy_range(&self, offset: usize, len: usize) -> Bytes {
        let end = (offset + len).min(self.len);
        if offset >= end {
            return Bytes::new();
        }

        let mut out = BytesMut::with_capacity(end - offset);
        let mut pos = 0usize;
        for chunk in &self.chunks {
            let chunk_start = pos;
            pos += chunk.len();
            if pos <= offset {
                continue;
            }
            if chunk_start >= end {
                break;
            }
            if chunk_start <= offset && end <= pos {
                return chunk.slice(offset - chunk_start..end - chunk_start);
            }
            let from = offset.saturating_sub(chunk_start);
            let to = (end - chunk_start).min(chunk.len());
            out.extend_from_slice(&chunk[from..to]);
        }
        out.freeze()
    }

    /// Flatten the payload into a single contiguous `Bytes`.
    pub fn to_bytes(&self) -> Bytes {
        self.copy_range(0, self.len)
    }
}

impl From<Bytes> for PayloadChunks {
    fn from(chunk: Bytes) -> Self {
        let mut payload = Self::new();
        payload.push(chunk);
        payload
    }
}

impl From<Vec<u8>> for PayloadChunks {
    fn from(chunk: Vec<u8>) -> Self {
        Bytes::from(chunk).into()
    }
}

impl From<Vec<Bytes>> for PayloadChunks {
    fn from(chunks: Vec<Bytes>) -> Self {
        let mut payload = Self::new();
        for chunk in chunks {
            payload.push(chunk);
        }
        payload
    }
}

/// An IPv6 packet: shared header handle plus chunked payload.
///
/// For inbound fragments the payload starts with the Fragment extension
/// header; for outbound datagrams it is the upper-layer payload named by
/// `header.next_header`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ipv6Packet {
    /// Header, shared with whoever else holds the packet buffer.
    pub header: Rc<Ipv6Header>,
    /// Payload bytes following the fixed header.
    pub payload: PayloadChunks,
}

impl Ipv6Packet {
    /// Create a packet, fixing the header's payload-length field to match.
    pub fn new(mut header: Ipv6Header, payload: impl Into<PayloadChunks>) -> Self {
        let payload = payload.into();
        header.payload_length = payload.len() as u16;
        Self {
            header: Rc::new(header),
            payload,
        }
    }

    /// Create a packet around an already shared header, leaving it untouched.
    pub fn with_shared(header: Rc<Ipv6Header>, payload: impl Into<PayloadChunks>) -> Self {
        Self {
            header,
            payload: payload.into(),
        }
    }

    /// Parse a packet from wire bytes.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let header = Ipv6Header::from_bytes(data)?;
        let total = IPV6_HEADER_SIZE + header.payload_length as usize;
        if data.len() < total {
            return Err(FragError::TooShort {
                expected: total,
                actual: data.len(),
            });
        }

        let payload = Bytes::copy_from_slice(&data[IPV6_HEADER_SIZE..total]);

        Ok(Self {
            header: Rc::new(header),
            payload: payload.into(),
        })
    }

    /// Serialize the packet to wire bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(IPV6_HEADER_SIZE + self.payload.len());
        buf.extend_from_slice(&self.header.to_bytes());
        buf.extend_from_slice(&self.payload.to_bytes());
        buf
    }

    /// Payload length in bytes.
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    /// Total wire size (header + payload).
    pub fn total_size(&self) -> usize {
        IPV6_HEADER_SIZE + self.payload.len()
    }
}
