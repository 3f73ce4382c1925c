//! Outbound datagram fragmentation.

use std::rc::Rc;

use bytes::Bytes;
use log::debug;

use crate::error::{FragError, Result};
use crate::frag::header::{FragmentHeader, FRAGMENT_HEADER_SIZE, OFFSET_UNIT};
use crate::ipv6::{IPV6_HEADER_SIZE, PROTO_FRAGMENT};
use crate::packet::{Ipv6Packet, PayloadChunks};

/// The link-send primitive fragments are handed to, in offset order.
pub trait LinkTx {
    /// Queue one frame for transmission.
    fn transmit(&mut self, frame: Ipv6Packet) -> Result<()>;
}

/// One planned fragment: where it starts, how much it carries, and whether
/// more fragments follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentSpan {
    /// Byte offset of this fragment's payload in the original datagram.
    pub offset: usize,
    /// Payload length. A multiple of 8 for every span but the last.
    pub len: usize,
    /// Whether further fragments follow.
    pub more: bool,
}

/// Check whether a datagram exceeds the MTU and needs fragmenting.
///
/// `mtu` is the IPv6-layer MTU: the largest frame the link accepts after
/// its own link header.
pub fn needs_fragmentation(pkt: &Ipv6Packet, mtu: usize) -> bool {
    IPV6_HEADER_SIZE + pkt.payload.len() > mtu
}

/// Splits outbound datagrams into MTU-sized, 8-byte-aligned fragments.
///
/// Holds the identification counter shared by all fragments of one
/// datagram and advanced between datagrams.
#[derive(Debug)]
pub struct Fragmenter {
    next_id: u32,
}

impl Fragmenter {
    /// Create a fragmenter. Identifications start at an arbitrary value.
    pub fn new() -> Self {
        Self { next_id: 0 }
    }

    /// Create a fragmenter with a chosen first identification value.
    pub fn with_initial_id(next_id: u32) -> Self {
        Self { next_id }
    }

    fn next_identification(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        id
    }

    /// Plan the fragment spans for a payload of `payload_len` bytes.
    ///
    /// Greedy packing: every span but the last carries the largest multiple
    /// of 8 that fits within `mtu` after the IPv6 and Fragment headers; the
    /// last span carries whatever remains, aligned or not.
    pub fn plan(payload_len: usize, mtu: usize) -> Result<Vec<FragmentSpan>> {
        let overhead = IPV6_HEADER_SIZE + FRAGMENT_HEADER_SIZE;
        let max_payload = mtu.saturating_sub(overhead) & !(OFFSET_UNIT - 1);
        if max_payload == 0 {
            return Err(FragError::MtuTooSmall {
                mtu,
                min: overhead + OFFSET_UNIT,
            });
        }

        let mut spans = Vec::with_capacity(payload_len / max_payload + 1);
        let mut offset = 0;
        while offset < payload_len {
            let len = (payload_len - offset).min(max_payload);
            spans.push(FragmentSpan {
                offset,
                len,
                more: offset + len < payload_len,
            });
            offset += len;
        }
        Ok(spans)
    }

    /// Split a datagram into wire fragments.
    ///
    /// Each fragment carries a clone of the datagram's IPv6 header with the
    /// next-header field replaced by the Fragment protocol number and the
    /// length field set to that fragment's size, followed by a Fragment
    /// header holding the original upper-layer next-header, the running
    /// offset, the more flag, and one identification shared across the
    /// whole datagram. The payload is read out of the chunked stream, so
    /// chunk boundaries need not align with fragment boundaries.
    pub fn fragment(&mut self, pkt: &Ipv6Packet, mtu: usize) -> Result<Vec<Ipv6Packet>> {
        let payload_len = pkt.payload.len();
        let spans = Self::plan(payload_len, mtu)?;
        let id = self.next_identification();
        let upper_next_header = pkt.header.next_header;

        let mut fragments = Vec::with_capacity(spans.len());
        for span in &spans {
            let frag_hdr =
                FragmentHeader::from_byte_offset(upper_next_header, span.offset, span.more, id)?;

            let mut header = (*pkt.header).clone();
            header.next_header = PROTO_FRAGMENT;
            header.payload_length = (FRAGMENT_HEADER_SIZE + span.len) as u16;

            let mut payload = PayloadChunks::new();
            payload.push(Bytes::copy_from_slice(&frag_hdr.to_bytes()));
            payload.push(pkt.payload.copy_range(span.offset, span.len));

            fragments.push(Ipv6Packet {
                header: Rc::new(header),
                payload,
            });
        }

        debug!(
            "frag: split {payload_len} byte datagram into {} fragments (id {id:#010x})",
            fragments.len()
        );
        Ok(fragments)
    }

    /// Send a datagram, fragmenting it if the MTU requires.
    ///
    /// Fragments are handed to `link` in offset order. If a transmit
    /// fails, the send is abandoned and the error returned; fragments
    /// already handed off are not retracted.
    ///
    /// Returns the number of frames handed to the link.
    pub fn send<L: LinkTx>(&mut self, pkt: &Ipv6Packet, mtu: usize, link: &mut L) -> Result<usize> {
        if !needs_fragmentation(pkt, mtu) {
            link.transmit(pkt.clone())?;
            return Ok(1);
        }

        let fragments = self.fragment(pkt, mtu)?;
        let mut sent = 0;
        for fragment in fragments {
            link.transmit(fragment)?;
            sent += 1;
        }
        Ok(sent)
    }
}

impl Default for Fragmenter {
    fn default() -> Self {
        Self::new()
    }
}
