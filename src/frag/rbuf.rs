//! Fixed-size reassembly buffer pool.
//!
//! The pool is a table of `pool_size` slots, each holding the state of one
//! in-progress datagram. Slots are keyed by (source, destination,
//! identification). The table never reallocates: when every slot is busy
//! and a fragment for a new datagram arrives, the context with the oldest
//! last-update timestamp is evicted and its slot reused. With a single
//! slot this evicts any unrelated in-progress datagram the instant a
//! fragment for a different key arrives — a deliberate lossy policy that
//! keeps memory bounded on adversarial or lossy networks.

use std::net::Ipv6Addr;
use std::rc::Rc;
use std::time::Instant;

use bytes::BytesMut;
use log::debug;

use crate::error::{FragError, Result};
use crate::frag::config::FragConfig;
use crate::frag::header::{FragmentHeader, OFFSET_UNIT};
use crate::frag::ranges::RangeSet;
use crate::ipv6::Ipv6Header;
use crate::packet::{Ipv6Packet, PayloadChunks};

/// Identity of one reassembly: two fragments with equal keys belong to the
/// same original datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FragmentKey {
    /// Source address.
    pub src: Ipv6Addr,
    /// Destination address.
    pub dst: Ipv6Addr,
    /// Fragment identification.
    pub id: u32,
}

impl FragmentKey {
    /// Build the key for a fragment from its IPv6 and Fragment headers.
    pub fn new(header: &Ipv6Header, fragment: &FragmentHeader) -> Self {
        Self {
            src: header.src,
            dst: header.dst,
            id: fragment.identification,
        }
    }
}

/// State of one in-progress datagram (one pool slot).
#[derive(Debug)]
pub struct ReassemblyContext {
    key: FragmentKey,
    /// First-seen IPv6 header, shared with the packet that established the
    /// context. Released when the context is freed or the datagram detached.
    header: Rc<Ipv6Header>,
    /// Reassembled payload so far. Grows as fragments arrive, never
    /// relocating already-written bytes.
    buffer: BytesMut,
    ranges: RangeSet,
    /// Upper-layer protocol carried by the fragment headers.
    next_header: u8,
    /// Total payload length, known once the `more = false` fragment arrives.
    final_length: Option<usize>,
    last_update: Instant,
}

impl ReassemblyContext {
    fn new(key: FragmentKey, header: Rc<Ipv6Header>, max_ranges: usize, now: Instant) -> Self {
        Self {
            key,
            header,
            buffer: BytesMut::new(),
            ranges: RangeSet::new(max_ranges),
            next_header: 0,
            final_length: None,
            last_update: now,
        }
    }

    /// The datagram key this context reassembles.
    pub fn key(&self) -> &FragmentKey {
        &self.key
    }

    /// The shared first-seen IPv6 header.
    pub fn header(&self) -> &Rc<Ipv6Header> {
        &self.header
    }

    /// When this context last absorbed a fragment.
    pub fn last_update(&self) -> Instant {
        self.last_update
    }

    /// Absorb one fragment's payload.
    ///
    /// Grows the buffer when the fragment reaches past its current tail,
    /// preserving bytes already written at any offset. Bytes already
    /// covered are silently overwritten (last writer wins). On a
    /// `more = false` fragment the final datagram length is latched.
    pub fn write_fragment(
        &mut self,
        fragment: &FragmentHeader,
        payload: &[u8],
        max_datagram_size: usize,
    ) -> Result<()> {
        let offset = fragment.offset_bytes();
        let end = offset + payload.len();
        if end > max_datagram_size {
            return Err(FragError::DatagramTooLarge {
                size: end,
                max: max_datagram_size,
            });
        }

        if self.buffer.len() < end {
            self.buffer.resize(end, 0);
        }
        self.buffer[offset..end].copy_from_slice(payload);

        self.ranges
            .insert((offset / OFFSET_UNIT) as u16, (end / OFFSET_UNIT) as u16)?;

        self.next_header = fragment.next_header;
        if !fragment.more {
            self.final_length = Some(end);
        }

        Ok(())
    }

    /// Check whether every byte up to the final length has been received.
    pub fn is_complete(&self) -> bool {
        match self.final_length {
            Some(len) => self.ranges.is_complete((len / OFFSET_UNIT) as u16),
            None => false,
        }
    }

    fn touch(&mut self, now: Instant) {
        self.last_update = now;
    }

    /// Detach the reassembled datagram, consuming the context.
    ///
    /// The shared header's payload-length and next-header fields are fixed
    /// up here, exactly once, by the sole remaining owner.
    pub(crate) fn into_datagram(self) -> Ipv6Packet {
        let final_length = self.final_length.unwrap_or(self.buffer.len());
        let mut buffer = self.buffer;
        buffer.truncate(final_length);

        let mut header = self.header;
        let fixed = Rc::make_mut(&mut header);
        fixed.next_header = self.next_header;
        fixed.payload_length = final_length as u16;

        Ipv6Packet {
            header,
            payload: PayloadChunks::from(buffer.freeze()),
        }
    }
}

/// Fixed-capacity table of reassembly contexts.
#[derive(Debug)]
pub struct ReassemblyPool {
    slots: Vec<Option<ReassemblyContext>>,
    config: FragConfig,
}

impl ReassemblyPool {
    /// Create a pool with `config.pool_size` slots.
    pub fn new(config: FragConfig) -> Self {
        let mut slots = Vec::with_capacity(config.pool_size);
        slots.resize_with(config.pool_size, || None);
        Self { slots, config }
    }

    /// The pool's configuration.
    pub fn config(&self) -> &FragConfig {
        &self.config
    }

    /// Number of slots.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of in-progress reassemblies.
    pub fn active_contexts(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Get the context for `key`, creating it if absent.
    ///
    /// Runs a lazy garbage-collection sweep first, so stale contexts are
    /// freed even when no periodic tick drives [`gc`](Self::gc). A newly
    /// created context shares `header` rather than copying it. When no
    /// slot is free the context with the oldest last-update is evicted.
    pub fn get(
        &mut self,
        key: FragmentKey,
        header: &Rc<Ipv6Header>,
        now: Instant,
    ) -> &mut ReassemblyContext {
        self.gc(now);

        let idx = self.find_slot(&key);
        let max_ranges = self.config.max_ranges;
        let slot = &mut self.slots[idx];

        if slot.as_ref().is_some_and(|ctx| ctx.key != key) {
            if let Some(evicted) = slot.take() {
                debug!(
                    "rbuf: evicting incomplete datagram {:?} to make room for {:?}",
                    evicted.key, key
                );
            }
        }

        let ctx =
            slot.get_or_insert_with(|| ReassemblyContext::new(key, Rc::clone(header), max_ranges, now));
        ctx.touch(now);
        ctx
    }

    /// Slot holding `key`, or the best slot to claim for it: a free slot if
    /// one exists, otherwise the slot with the oldest last-update.
    fn find_slot(&self, key: &FragmentKey) -> usize {
        let mut free = None;
        let mut oldest = (0usize, None::<Instant>);

        for (i, slot) in self.slots.iter().enumerate() {
            match slot {
                Some(ctx) => {
                    if ctx.key == *key {
                        return i;
                    }
                    if oldest.1.is_none_or(|t| ctx.last_update < t) {
                        oldest = (i, Some(ctx.last_update));
                    }
                }
                None => {
                    if free.is_none() {
                        free = Some(i);
                    }
                }
            }
        }

        free.unwrap_or(oldest.0)
    }

    /// Take the context for `key` out of the pool, leaving its slot free.
    pub fn remove(&mut self, key: &FragmentKey) -> Option<ReassemblyContext> {
        self.slots
            .iter_mut()
            .find(|s| s.as_ref().is_some_and(|ctx| ctx.key == *key))
            .and_then(Option::take)
    }

    /// Release the context for `key`, dropping its header reference and
    /// payload buffer.
    pub fn free(&mut self, key: &FragmentKey) {
        if self.remove(key).is_some() {
            debug!("rbuf: freed datagram {key:?}");
        }
    }

    /// Free every context older than the configured timeout.
    ///
    /// Returns the number of contexts freed. Called lazily on every
    /// [`get`](Self::get); an upstream periodic tick may also drive it.
    pub fn gc(&mut self, now: Instant) -> usize {
        let timeout = self.config.timeout;
        let mut freed = 0;
        for slot in &mut self.slots {
            if slot
                .as_ref()
                .is_some_and(|ctx| now.duration_since(ctx.last_update) > timeout)
            {
                if let Some(ctx) = slot.take() {
                    debug!("rbuf: gc freed stale datagram {:?}", ctx.key);
                    freed += 1;
                }
            }
        }
        freed
    }

    /// Drop every in-progress reassembly.
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
    }
}
