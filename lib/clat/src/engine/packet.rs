// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! The output segment array.
//!
//! A translated packet is not one contiguous buffer: every header that
//! translation rewrites gets its own small owned segment, while the
//! payload is a borrowed view of the input packet. The segments live at
//! fixed positions in on-the-wire order; a slot a given packet doesn't
//! use stays empty. One position chain covers the common case, and the
//! `IcmpErr*` positions hold the single level of embedded packet that
//! an ICMP error message may carry.

use super::checksum::Checksum;
use super::checksum::HeaderChecksum;
use heapless::Vec;

/// Capacity of each owned header slot. The largest header we ever copy
/// is a TCP header with a full complement of options (15 words).
pub const MAX_HDR_LEN: usize = 60;

/// Number of owned header slots; the payload is the eighth segment.
const NUM_HDR_SLOTS: usize = 7;

/// A fixed position in the segment array, in wire order.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
#[repr(usize)]
pub enum Position {
    /// Tun-device packet information header, used only when the output
    /// is written to a tun fd.
    TunHdr = 0,
    /// The rewritten IP header.
    IpHdr = 1,
    /// IPv6 fragment header, when the packet is fragmented.
    FragHdr = 2,
    /// TCP/UDP/ICMP header.
    TransportHdr = 3,
    /// IP header of the packet embedded in an ICMP error.
    IcmpErrIpHdr = 4,
    /// Fragment header of the embedded packet.
    IcmpErrFragHdr = 5,
    /// Transport header of the embedded packet.
    IcmpErrTransportHdr = 6,
    /// The borrowed payload view.
    Payload = 7,
}

impl Position {
    const ALL: [Position; 8] = [
        Position::TunHdr,
        Position::IpHdr,
        Position::FragHdr,
        Position::TransportHdr,
        Position::IcmpErrIpHdr,
        Position::IcmpErrFragHdr,
        Position::IcmpErrTransportHdr,
        Position::Payload,
    ];

    /// Return the position `n` layers deeper in the packet.
    ///
    /// Layering is bounded: an embedded ICMP-error packet advances by
    /// at most one chain of IP + fragment + transport slots, which is
    /// exactly what the array has room for.
    pub fn offset(self, n: usize) -> Position {
        Self::ALL[self as usize + n]
    }
}

/// An output packet under construction: seven owned header slots plus
/// one borrowed payload, interpreted in [`Position`] order.
#[derive(Clone, Debug, Default)]
pub struct ClatPacket<'a> {
    hdrs: [Vec<u8, MAX_HDR_LEN>; NUM_HDR_SLOTS],
    payload: &'a [u8],
}

impl<'a> ClatPacket<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the bytes of the header at `pos`; empty if unset.
    pub fn hdr(&self, pos: Position) -> &[u8] {
        debug_assert!(pos < Position::Payload);
        &self.hdrs[pos as usize]
    }

    /// Mutable view of the header at `pos`, for in-place fixups of
    /// fields that are only known once the rest of the packet has been
    /// built (lengths, checksums).
    pub fn hdr_mut(&mut self, pos: Position) -> &mut [u8] {
        debug_assert!(pos < Position::Payload);
        &mut self.hdrs[pos as usize]
    }

    /// Fill the header slot at `pos` with a copy of `bytes`.
    ///
    /// `bytes` must fit [`MAX_HDR_LEN`]; callers validate (or clamp)
    /// header sizes before writing them here.
    pub fn set_hdr(&mut self, pos: Position, bytes: &[u8]) {
        debug_assert!(pos < Position::Payload);
        let slot = &mut self.hdrs[pos as usize];
        slot.clear();
        // Unwrap safety: all callers bound their input to MAX_HDR_LEN.
        slot.extend_from_slice(bytes).unwrap();
    }

    /// Point the payload segment at a view of the input packet. The
    /// payload is never copied.
    pub fn set_payload(&mut self, bytes: &'a [u8]) {
        self.payload = bytes;
    }

    pub fn payload(&self) -> &'a [u8] {
        self.payload
    }

    /// Sum every non-empty segment from `pos` through the payload into
    /// `partial` and finalize the result into wire form.
    ///
    /// This is how whole-datagram checksums (ICMP, freshly computed
    /// UDP) are produced: the caller seeds `partial` with whatever
    /// pseudo-header sum the protocol calls for.
    pub fn checksum_from(
        &self,
        mut partial: Checksum,
        pos: Position,
    ) -> HeaderChecksum {
        for seg in self.segments_from(pos) {
            partial.add_bytes(seg);
        }

        HeaderChecksum::from(partial)
    }

    /// Total wire length of all segments strictly after `pos`.
    ///
    /// With `pos` at the IP header this is exactly the value for the
    /// IPv6 payload-length field, and 20 less than the IPv4 total
    /// length.
    pub fn wire_len_after(&self, pos: Position) -> usize {
        self.segments_from(pos).skip(1).map(<[u8]>::len).sum()
    }

    /// Iterate the segments from `pos` onward, including empty slots.
    fn segments_from(
        &self,
        pos: Position,
    ) -> impl Iterator<Item = &[u8]> + '_ {
        Position::ALL[pos as usize..].iter().map(move |p| match p {
            Position::Payload => self.payload,
            p => &*self.hdrs[*p as usize],
        })
    }

    /// Iterate the non-empty segments in wire order, ready to hand to
    /// a vectored write.
    pub fn segments(&self) -> impl Iterator<Item = &[u8]> + '_ {
        self.segments_from(Position::TunHdr).filter(|s| !s.is_empty())
    }

    /// Total wire length of the assembled packet.
    pub fn wire_len(&self) -> usize {
        self.segments().map(<[u8]>::len).sum()
    }
}
