// SPDX-License-Identifier: AGPL-3.0-or-later

//! Caravans: per-queue staging buffers that batch many small outbound
//! PDUs into one scatter-gather `sendmsg`.
//!
//! A queue owns exactly two: `caravan-large` (bulk data: c2h_data
//! headers, their payload, and the `rsp` that completes a write) and
//! `caravan-small` (control PDUs: r2t, and the `rsp` that completes a
//! read). Keeping them separate is the point of this whole design —
//! see `DESIGN.md` and `SPEC_FULL.md` §9: an r2t or read-completion
//! queued behind a large write payload would stall the write pipeline
//! waiting on a caravan that has nothing to do with it.
//!
//! Both are the same type, `Caravan`, parameterized only by capacity;
//! which caravan a given PDU belongs in is decided by [`CaravanKind`]
//! and [`classify`], not by two copies of this struct.

pub const SEND_BUDGET: usize = 16;
pub const CARAVAN_LARGE_CAPACITY: usize = 65536;
pub const CARAVAN_SMALL_CAPACITY: usize = 256;

use bytes::Bytes;

use crate::pdu::common::PduType;

/// Which of a queue's two caravans a PDU belongs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaravanKind {
    Large,
    Small,
}

/// Picks the caravan for an outbound PDU. `is_read_completion`
/// disambiguates a bare `rsp` PDU, which carries no type information
/// of its own about which data phase it closes out.
pub fn classify(pdu_type: PduType, is_read_completion: bool) -> CaravanKind {
    match pdu_type {
        PduType::C2hData => CaravanKind::Large,
        PduType::R2t => CaravanKind::Small,
        PduType::Rsp => {
            if is_read_completion {
                CaravanKind::Small
            } else {
                CaravanKind::Large
            }
        },
        other => unreachable!("{other:?} PDUs are never caravanned"),
    }
}

/// One staged-but-unsent batch of PDUs awaiting a single `sendmsg`.
#[derive(Debug)]
pub struct Caravan {
    capacity: usize,
    segments: Vec<Bytes>,
    /// Slots parked in this caravan; freed back to the pool once the
    /// flush's segments have actually been written to the socket.
    parked: Vec<u16>,
    mapped_pages: usize,
    bytes: usize,
    /// Set when a `push` was rejected for fullness, so the caller knows
    /// to flush before retrying instead of busy-looping on the same
    /// bound check.
    force_flush: bool,
}

/// Returned by [`Caravan::push`] when the batch cannot take the next
/// PDU without first being flushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaravanFull;

impl Caravan {
    pub fn new(capacity: usize) -> Self {
        Caravan {
            capacity,
            segments: Vec::new(),
            parked: Vec::new(),
            mapped_pages: 0,
            bytes: 0,
            force_flush: false,
        }
    }

    pub fn large() -> Self {
        Self::new(CARAVAN_LARGE_CAPACITY)
    }

    pub fn small() -> Self {
        Self::new(CARAVAN_SMALL_CAPACITY)
    }

    fn would_overflow(&self, incoming_bytes: usize, incoming_pages: usize, parks_cmd: bool) -> bool {
        self.bytes + incoming_bytes > self.capacity
            || self.segments.len() + 1 > 3 * SEND_BUDGET
            || (parks_cmd && self.parked.len() + 1 > SEND_BUDGET)
            || self.mapped_pages + incoming_pages > SEND_BUDGET
    }

    /// Appends one wire segment. `ttag` is `Some` exactly once per
    /// command parked in this flush (a command may contribute several
    /// segments — header, payload, digest — but is only parked once).
    pub fn push(
        &mut self,
        segment: Bytes,
        ttag: Option<u16>,
        mapped_pages: usize,
    ) -> Result<(), CaravanFull> {
        let parks_cmd = ttag.is_some() && !self.parked.contains(&ttag.unwrap_or_default());
        if self.force_flush || self.would_overflow(segment.len(), mapped_pages, parks_cmd) {
            self.force_flush = true;
            return Err(CaravanFull);
        }
        self.bytes += segment.len();
        self.mapped_pages += mapped_pages;
        self.segments.push(segment);
        if let Some(ttag) = ttag
            && !self.parked.contains(&ttag)
        {
            self.parked.push(ttag);
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn byte_len(&self) -> usize {
        self.bytes
    }

    pub fn segments(&self) -> &[Bytes] {
        &self.segments
    }

    /// Drains the staged batch after a successful flush `sendmsg`,
    /// returning the parked slots so the caller can unmap/free them.
    pub fn take(&mut self) -> Vec<u16> {
        self.segments.clear();
        self.bytes = 0;
        self.mapped_pages = 0;
        self.force_flush = false;
        std::mem::take(&mut self.parked)
    }
}
