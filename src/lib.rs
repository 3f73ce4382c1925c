//! IPv6 fragmentation and reassembly engine.
//!
//! This crate implements the fragmentation layer of an IPv6 stack: it
//! splits datagrams larger than a link's MTU into 8-byte-aligned wire
//! fragments on send, and reconstructs original datagrams from fragments
//! arriving out of order, interleaved with fragments of unrelated
//! datagrams, on receive. Reassembly state lives in a fixed-size buffer
//! pool so memory stays bounded on lossy or adversarial networks.
//!
//! # Features
//!
//! - Fragment extension header codec
//! - Order-independent reassembly with coalescing byte-range tracking
//! - Fixed-capacity reassembly buffer pool with timeout garbage collection
//!   and oldest-first eviction under pressure
//! - Greedy MTU packing of payloads scattered across non-aligned chunks
//! - Single-threaded, synchronous, non-blocking: one packet event at a time
//!
//! # Example
//!
//! ```
//! use ip6frag_rs::{Fragmenter, Reassembler, Ipv6Header, Ipv6Packet, PROTO_UDP};
//! use std::net::Ipv6Addr;
//!
//! let src = Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 1);
//! let dst = Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 2);
//! let header = Ipv6Header::new(src, dst).with_next_header(PROTO_UDP);
//! let datagram = Ipv6Packet::new(header, vec![0xAB; 3000]);
//!
//! // Split into fragments that fit a 1280-byte MTU
//! let mut fragmenter = Fragmenter::new();
//! let fragments = fragmenter.fragment(&datagram, 1280).unwrap();
//!
//! // Feed them back; the last one completes the datagram
//! let mut reassembler = Reassembler::new();
//! let mut completed = None;
//! for fragment in &fragments {
//!     completed = reassembler.reassemble(fragment);
//! }
//!
//! assert_eq!(
//!     completed.unwrap().payload.to_bytes(),
//!     datagram.payload.to_bytes()
//! );
//! ```
//!
//! # Wire format
//!
//! Fragments carry the Fragment extension header (8 bytes, network byte
//! order) between the IPv6 header and the payload slice:
//!
//! ```text
//! +--------+--------+--------+--------+
//! |NextHdr |Reserved| Offset(13)|R2|M |  (4 bytes)
//! +--------+--------+--------+--------+
//! |         Identification            |  (4 bytes)
//! +--------+--------+--------+--------+
//! |         Payload slice ...         |  (variable)
//! +--------+--------+--------+--------+
//! ```
//!
//! Offsets are in 8-byte units, so every fragment payload except the last
//! is a multiple of 8 bytes long.

pub mod error;
pub mod frag;
pub mod ipv6;
pub mod packet;

// Re-export commonly used types at the crate root
pub use error::{FragError, Result};
pub use frag::{
    needs_fragmentation, FragConfig, FragmentHeader, FragmentKey, FragmentSpan, Fragmenter,
    LinkTx, RangeSet, Reassembler, ReassemblyPool, FRAGMENT_HEADER_SIZE,
};
pub use ipv6::{
    Ipv6Header, IPV6_HEADER_SIZE, PROTO_FRAGMENT, PROTO_ICMPV6, PROTO_NONE, PROTO_TCP, PROTO_UDP,
};
pub use packet::{Ipv6Packet, PayloadChunks};
