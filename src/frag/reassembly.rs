//! Datagram reassembly from fragments.

use std::time::Instant;

use log::{debug, trace};

use crate::frag::config::FragConfig;
use crate::frag::header::{FragmentHeader, FRAGMENT_HEADER_SIZE};
use crate::frag::rbuf::{FragmentKey, ReassemblyPool};
use crate::ipv6::PROTO_FRAGMENT;
use crate::packet::Ipv6Packet;

/// Reassembles fragmented datagrams, one fragment per call.
///
/// Fragments may arrive in any order and interleaved with fragments of
/// unrelated datagrams; contexts are tracked per (source, destination,
/// identification) in a fixed-size pool. Each call either absorbs the
/// fragment or returns the completed datagram for protocol demultiplexing.
///
/// Malformed fragments are dropped silently: losing one fragment is no
/// different from the network losing it, and the sender's retry logic (if
/// any) lives above this layer.
#[derive(Debug)]
pub struct Reassembler {
    pool: ReassemblyPool,
}

impl Reassembler {
    /// Create a reassembler with the default configuration.
    pub fn new() -> Self {
        Self::with_config(FragConfig::default())
    }

    /// Create a reassembler with a custom configuration.
    pub fn with_config(config: FragConfig) -> Self {
        Self {
            pool: ReassemblyPool::new(config),
        }
    }

    /// The underlying buffer pool.
    pub fn pool(&self) -> &ReassemblyPool {
        &self.pool
    }

    /// Mutable access to the underlying buffer pool.
    pub fn pool_mut(&mut self) -> &mut ReassemblyPool {
        &mut self.pool
    }

    /// Feed one fragment.
    ///
    /// Returns `Some(datagram)` when this fragment completes its datagram,
    /// `None` when it was absorbed (or dropped).
    pub fn reassemble(&mut self, pkt: &Ipv6Packet) -> Option<Ipv6Packet> {
        self.reassemble_at(pkt, Instant::now())
    }

    /// Feed one fragment, parsing it from wire bytes first.
    ///
    /// Malformed input is dropped silently, like any other bad fragment.
    pub fn reassemble_bytes(&mut self, data: &[u8]) -> Option<Ipv6Packet> {
        match Ipv6Packet::from_bytes(data) {
            Ok(pkt) => self.reassemble(&pkt),
            Err(err) => {
                debug!("reass: dropping unparseable packet: {err}");
                None
            }
        }
    }

    /// [`reassemble`](Self::reassemble) with an explicit timestamp.
    ///
    /// The timestamp drives context ages for garbage collection and
    /// eviction order; the upstream event loop usually has one at hand.
    pub fn reassemble_at(&mut self, pkt: &Ipv6Packet, now: Instant) -> Option<Ipv6Packet> {
        if pkt.header.next_header != PROTO_FRAGMENT {
            debug!(
                "reass: dropping packet without fragment header (next header {})",
                pkt.header.next_header
            );
            return None;
        }

        let raw = pkt.payload.copy_range(0, FRAGMENT_HEADER_SIZE);
        let fragment = match FragmentHeader::from_bytes(&raw) {
            Ok(fragment) => fragment,
            Err(err) => {
                debug!("reass: dropping fragment with malformed header: {err}");
                return None;
            }
        };

        let payload = pkt
            .payload
            .copy_range(FRAGMENT_HEADER_SIZE, pkt.payload.len() - FRAGMENT_HEADER_SIZE);
        let key = FragmentKey::new(&pkt.header, &fragment);
        let max_datagram_size = self.pool.config().max_datagram_size;

        let ctx = self.pool.get(key, &pkt.header, now);
        if let Err(err) = ctx.write_fragment(&fragment, &payload, max_datagram_size) {
            debug!("reass: abandoning datagram {key:?}: {err}");
            self.pool.free(&key);
            return None;
        }

        if ctx.is_complete() {
            let ctx = self.pool.remove(&key)?;
            trace!("reass: completed datagram {key:?}");
            return Some(ctx.into_datagram());
        }

        None
    }
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frag::config::FragConfig;
    use crate::ipv6::{Ipv6Header, PROTO_UDP};
    use bytes::Bytes;
    use std::net::Ipv6Addr;
    use std::rc::Rc;
    use std::time::Duration;

    fn addrs() -> (Ipv6Addr, Ipv6Addr) {
        (
            Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 1),
            Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 2),
        )
    }

    /// Build a wire fragment by hand: IPv6 header + fragment header + slice.
    fn fragment(id: u32, offset: usize, data: &[u8], more: bool) -> Ipv6Packet {
        let (src, dst) = addrs();
        let header = Ipv6Header::new(src, dst).with_next_header(PROTO_FRAGMENT);
        let frag_hdr = FragmentHeader::from_byte_offset(PROTO_UDP, offset, more, id).unwrap();

        let mut payload = Vec::with_capacity(FRAGMENT_HEADER_SIZE + data.len());
        payload.extend_from_slice(&frag_hdr.to_bytes());
        payload.extend_from_slice(data);

        Ipv6Packet::new(header, payload)
    }

    fn payload_pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn test_in_order_completion() {
        let mut reassembler = Reassembler::new();
        let data = payload_pattern(61);

        assert!(reassembler
            .reassemble(&fragment(7, 0, &data[0..24], true))
            .is_none());
        assert!(reassembler
            .reassemble(&fragment(7, 24, &data[24..48], true))
            .is_none());

        let done = reassembler
            .reassemble(&fragment(7, 48, &data[48..], false))
            .unwrap();

        assert_eq!(done.payload.to_bytes().as_ref(), data.as_slice());
        assert_eq!(reassembler.pool().active_contexts(), 0);
    }

    #[test]
    fn test_out_of_order_completion() {
        let data = payload_pattern(61);
        let frags = [
            fragment(7, 0, &data[0..24], true),
            fragment(7, 24, &data[24..48], true),
            fragment(7, 48, &data[48..], false),
        ];

        let mut in_order = Reassembler::new();
        let mut expected = None;
        for frag in &frags {
            expected = in_order.reassemble(frag);
        }
        let expected = expected.unwrap();

        let mut reversed = Reassembler::new();
        assert!(reversed.reassemble(&frags[2]).is_none());
        assert!(reversed.reassemble(&frags[1]).is_none());
        let done = reversed.reassemble(&frags[0]).unwrap();

        assert_eq!(done.payload.to_bytes(), expected.payload.to_bytes());
        assert_eq!(done.header, expected.header);
    }

    #[test]
    fn test_single_fragment_datagram() {
        let mut reassembler = Reassembler::new();
        let data = payload_pattern(40);

        let done = reassembler.reassemble(&fragment(1, 0, &data, false)).unwrap();

        assert_eq!(done.payload.to_bytes().as_ref(), data.as_slice());
        assert_eq!(reassembler.pool().active_contexts(), 0);
    }

    #[test]
    fn test_completed_header_fixup() {
        let mut reassembler = Reassembler::new();
        let data = payload_pattern(29);

        let done = reassembler
            .reassemble(&fragment(3, 0, &data, false))
            .unwrap();

        assert_eq!(done.header.next_header, PROTO_UDP);
        assert_eq!(done.header.payload_length, 29);
    }

    #[test]
    fn test_final_fragment_shorter_than_unit() {
        let mut reassembler = Reassembler::new();
        let data = payload_pattern(13);

        assert!(reassembler
            .reassemble(&fragment(9, 0, &data[0..8], true))
            .is_none());
        let done = reassembler
            .reassemble(&fragment(9, 8, &data[8..], false))
            .unwrap();

        assert_eq!(done.payload.to_bytes().as_ref(), data.as_slice());
    }

    #[test]
    fn test_malformed_header_dropped_silently() {
        let mut reassembler = Reassembler::new();
        let (src, dst) = addrs();

        // Fragment header truncated to 5 bytes
        let header = Ipv6Header::new(src, dst).with_next_header(PROTO_FRAGMENT);
        let short = Ipv6Packet::new(header, vec![0u8; 5]);

        assert!(reassembler.reassemble(&short).is_none());
        assert_eq!(reassembler.pool().active_contexts(), 0);
    }

    #[test]
    fn test_non_fragment_dropped() {
        let mut reassembler = Reassembler::new();
        let (src, dst) = addrs();

        let header = Ipv6Header::new(src, dst).with_next_header(PROTO_UDP);
        let pkt = Ipv6Packet::new(header, vec![0u8; 64]);

        assert!(reassembler.reassemble(&pkt).is_none());
        assert_eq!(reassembler.pool().active_contexts(), 0);
    }

    #[test]
    fn test_eviction_under_pressure() {
        let mut reassembler = Reassembler::with_config(FragConfig::default().with_pool_size(1));
        let data = payload_pattern(32);

        // First datagram left incomplete
        let first = fragment(1, 0, &data[0..16], true);
        assert!(reassembler.reassemble(&first).is_none());
        assert_eq!(Rc::strong_count(&first.header), 2);

        // Unrelated datagram evicts it without leaking the header reference
        assert!(reassembler
            .reassemble(&fragment(2, 0, &data[0..16], true))
            .is_none());
        assert_eq!(Rc::strong_count(&first.header), 1);

        // The new datagram then reassembles normally
        let done = reassembler
            .reassemble(&fragment(2, 16, &data[16..], false))
            .unwrap();
        assert_eq!(done.payload.to_bytes().as_ref(), data.as_slice());

        // The evicted datagram's remaining fragment starts over, incomplete
        assert!(reassembler
            .reassemble(&fragment(1, 16, &data[16..], false))
            .is_none());
    }

    #[test]
    fn test_gc_releases_header_reference() {
        let mut reassembler =
            Reassembler::with_config(FragConfig::default().with_timeout(Duration::from_secs(5)));
        let now = Instant::now();

        let frag = fragment(4, 0, &payload_pattern(16), true);
        assert!(reassembler.reassemble_at(&frag, now).is_none());
        assert_eq!(Rc::strong_count(&frag.header), 2);

        let freed = reassembler
            .pool_mut()
            .gc(now + Duration::from_secs(6));

        assert_eq!(freed, 1);
        assert_eq!(Rc::strong_count(&frag.header), 1);
        assert_eq!(reassembler.pool().active_contexts(), 0);
    }

    #[test]
    fn test_overlapping_fragments_last_writer_wins() {
        let mut reassembler = Reassembler::new();

        assert!(reassembler
            .reassemble(&fragment(5, 0, &[0xAA; 16], true))
            .is_none());
        // Overwrites bytes 8..24
        assert!(reassembler
            .reassemble(&fragment(5, 8, &[0xBB; 16], true))
            .is_none());
        let done = reassembler
            .reassemble(&fragment(5, 24, &[0xCC; 5], false))
            .unwrap();

        let bytes = done.payload.to_bytes();
        assert_eq!(&bytes[0..8], &[0xAA; 8]);
        assert_eq!(&bytes[8..24], &[0xBB; 16]);
        assert_eq!(&bytes[24..29], &[0xCC; 5]);
    }

    #[test]
    fn test_oversized_datagram_abandoned() {
        let mut reassembler =
            Reassembler::with_config(FragConfig::default().with_max_datagram_size(64));

        assert!(reassembler
            .reassemble(&fragment(6, 0, &[0u8; 32], true))
            .is_none());
        assert_eq!(reassembler.pool().active_contexts(), 1);

        // Growing past the limit abandons the whole context
        assert!(reassembler
            .reassemble(&fragment(6, 56, &[0u8; 32], true))
            .is_none());
        assert_eq!(reassembler.pool().active_contexts(), 0);
    }

    #[test]
    fn test_interleaved_datagrams() {
        let mut reassembler = Reassembler::new();
        let data_a = vec![0xAA; 29];
        let data_b = vec![0xBB; 29];

        assert!(reassembler
            .reassemble(&fragment(10, 0, &data_a[0..16], true))
            .is_none());
        assert!(reassembler
            .reassemble(&fragment(11, 0, &data_b[0..16], true))
            .is_none());
        assert_eq!(reassembler.pool().active_contexts(), 2);

        let done_a = reassembler
            .reassemble(&fragment(10, 16, &data_a[16..], false))
            .unwrap();
        let done_b = reassembler
            .reassemble(&fragment(11, 16, &data_b[16..], false))
            .unwrap();

        assert_eq!(done_a.payload.to_bytes().as_ref(), data_a.as_slice());
        assert_eq!(done_b.payload.to_bytes().as_ref(), data_b.as_slice());
        assert_eq!(reassembler.pool().active_contexts(), 0);
    }

    #[test]
    fn test_reassemble_bytes_wire_path() {
        let mut reassembler = Reassembler::new();
        let data = payload_pattern(24);

        let wire = fragment(12, 0, &data, false).to_bytes();
        let done = reassembler.reassemble_bytes(&wire).unwrap();

        assert_eq!(done.payload.to_bytes().as_ref(), data.as_slice());
        assert!(reassembler.reassemble_bytes(&wire[..10]).is_none());
    }

    #[test]
    fn test_duplicate_fragment_is_idempotent() {
        let mut reassembler = Reassembler::new();
        let data = payload_pattern(29);
        let head = fragment(13, 0, &data[0..16], true);

        assert!(reassembler.reassemble(&head).is_none());
        assert!(reassembler.reassemble(&head).is_none());
        assert_eq!(reassembler.pool().active_contexts(), 1);

        let done = reassembler
            .reassemble(&fragment(13, 16, &data[16..], false))
            .unwrap();
        assert_eq!(done.payload.to_bytes().as_ref(), data.as_slice());
    }

    #[test]
    fn test_fragment_from_chunked_payload() {
        // A fragment whose own payload arrives scattered over chunks
        let (src, dst) = addrs();
        let frag_hdr = FragmentHeader::from_byte_offset(PROTO_UDP, 0, false, 14).unwrap();
        let data = payload_pattern(20);

        let header = Ipv6Header::new(src, dst).with_next_header(PROTO_FRAGMENT);
        let chunks = vec![
            Bytes::copy_from_slice(&frag_hdr.to_bytes()[..3]),
            Bytes::copy_from_slice(&frag_hdr.to_bytes()[3..]),
            Bytes::copy_from_slice(&data),
        ];
        let pkt = Ipv6Packet::new(header, chunks);

        let mut reassembler = Reassembler::new();
        let done = reassembler.reassemble(&pkt).unwrap();
        assert_eq!(done.payload.to_bytes().as_ref(), data.as_slice());
    }
}
