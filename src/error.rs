//! Error types for fragmentation and reassembly operations.

use thiserror::Error;

/// Errors that can occur while fragmenting or reassembling datagrams.
#[derive(Error, Debug)]
pub enum FragError {
    /// Not enough bytes to parse a header.
    #[error("Packet too short: expected at least {expected} bytes, got {actual}")]
    TooShort { expected: usize, actual: usize },

    /// The version field of a supposed IPv6 header is not 6.
    #[error("Not an IPv6 packet: version field is {0}")]
    NotIpv6(u8),

    /// A fragment offset that is not a multiple of 8 bytes.
    #[error("Fragment offset {offset} is not a multiple of 8 bytes")]
    OffsetUnaligned { offset: usize },

    /// A fragment offset that does not fit the 13-bit offset field.
    #[error("Fragment offset {offset} exceeds the 13-bit offset field (max {max} bytes)")]
    OffsetTooLarge { offset: usize, max: usize },

    /// The MTU cannot carry the IPv6 and Fragment headers plus one payload unit.
    #[error("MTU too small: {mtu} bytes, need at least {min} for headers plus one 8-byte unit")]
    MtuTooSmall { mtu: usize, min: usize },

    /// A reassembly buffer would have to grow past the configured limit.
    #[error("Datagram too large: {size} bytes exceeds reassembly limit of {max} bytes")]
    DatagramTooLarge { size: usize, max: usize },

    /// A reassembly context holds too many disjoint byte ranges.
    #[error("Range tracker full: context already holds {max} disjoint ranges")]
    RangesExhausted { max: usize },

    /// The link rejected a frame handed to it.
    #[error("Link send failed: {0}")]
    LinkSend(String),
}

/// Result type alias for fragmentation operations.
pub type Result<T> = std::result::Result<T, FragError>;
