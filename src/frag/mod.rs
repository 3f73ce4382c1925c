//! IPv6 fragmentation and reassembly.
//!
//! Carries datagrams larger than a link's MTU by splitting them into
//! fragments on send and losslessly reconstructing the original datagram on
//! receive, with reassembly memory fixed at configuration time.
//!
//! # Overview
//!
//! - Outbound datagrams are split into 8-byte-aligned fragments, each
//!   carrying an 8-byte Fragment extension header after the IPv6 header
//! - Inbound fragments are absorbed one per call, in any order, interleaved
//!   with fragments of unrelated datagrams
//! - In-progress datagrams live in a fixed-size buffer pool keyed by
//!   (source, destination, identification), with timeout garbage collection
//!   and oldest-first eviction under pressure
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
//! let mut fragmenter = Fragmenter::new();
//! let fragments = fragmenter.fragment(&datagram, 1280).unwrap();
//!
//! let mut reassembler = Reassembler::new();
//! let mut completed = None;
//! for fragment in &fragments {
//!     completed = reassembler.reassemble(fragment);
//! }
//!
//! let completed = completed.unwrap();
//! assert_eq!(completed.payload.to_bytes(), datagram.payload.to_bytes());
//! ```

mod config;
mod header;
mod ranges;
mod rbuf;
mod reassembly;
mod send;

pub use config::{
    FragConfig, DEFAULT_MAX_DATAGRAM_SIZE, DEFAULT_MAX_RANGES, DEFAULT_POOL_SIZE,
    DEFAULT_REASSEMBLY_TIMEOUT,
};
pub use header::{FragmentHeader, FRAGMENT_HEADER_SIZE, MAX_OFFSET_BYTES, OFFSET_UNIT};
pub use ranges::{Range, RangeSet};
pub use rbuf::{FragmentKey, ReassemblyContext, ReassemblyPool};
pub use reassembly::Reassembler;
pub use send::{needs_fragmentation, FragmentSpan, Fragmenter, LinkTx};
