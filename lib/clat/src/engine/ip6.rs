// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! IPv6 headers, including the fragment extension header.

use super::checksum::Checksum;
use super::checksum::ipv6_pseudo_csum;
use super::ip4::IP_MF;
use super::ip4::IP_OFFMASK;
use super::ip4::Ipv4HdrRaw;
use super::nat;
use clat_api::ClatConfig;
use clat_api::Ipv6Addr;
use core::fmt;
use core::fmt::Display;
use smoltcp::wire::IpProtocol;
use zerocopy::AsBytes;
use zerocopy::FromBytes;
use zerocopy::FromZeroes;
use zerocopy::Unaligned;

pub const IPV6_VERSION: u8 = 6;

/// Fragment-header offset/flags word: the 13-bit offset, left-aligned.
pub const IP6F_OFF_MASK: u16 = 0xFFF8;
/// Fragment-header offset/flags word: more fragments follow.
pub const IP6F_MORE_FRAG: u16 = 0x0001;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Ipv6HdrError {
    HeaderTruncated { len: usize },
    FragHeaderTruncated { len: usize },
}

impl Display for Ipv6HdrError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::HeaderTruncated { len } => {
                write!(f, "too short for an IPv6 header: {len}")
            }

            Self::FragHeaderTruncated { len } => {
                write!(f, "too short for a fragment header: {len}")
            }
        }
    }
}

/// Note: Kept unaligned so it can be read at any offset of a packet
/// buffer.
#[repr(C)]
#[derive(Clone, Debug, FromBytes, AsBytes, FromZeroes, Unaligned)]
pub struct Ipv6HdrRaw {
    pub ver_tc_flow: [u8; 4],
    pub pay_len: [u8; 2],
    pub next_hdr: u8,
    pub hop_limit: u8,
    pub src: [u8; 16],
    pub dst: [u8; 16],
}

impl Default for Ipv6HdrRaw {
    fn default() -> Self {
        Ipv6HdrRaw {
            ver_tc_flow: [IPV6_VERSION << 4, 0x0, 0x0, 0x0],
            pay_len: [0x0; 2],
            next_hdr: 255,
            hop_limit: 64,
            src: [0x0; 16],
            dst: [0x0; 16],
        }
    }
}

impl Ipv6HdrRaw {
    pub const SIZE: usize = core::mem::size_of::<Self>();

    /// Read an IPv6 header from the front of `bytes`.
    pub fn parse(bytes: &[u8]) -> Result<Self, Ipv6HdrError> {
        Self::read_from_prefix(bytes)
            .ok_or(Ipv6HdrError::HeaderTruncated { len: bytes.len() })
    }

    pub fn src(&self) -> Ipv6Addr {
        Ipv6Addr::from(self.src)
    }

    pub fn dst(&self) -> Ipv6Addr {
        Ipv6Addr::from(self.dst)
    }

    pub fn pay_len(&self) -> u16 {
        u16::from_be_bytes(self.pay_len)
    }

    pub fn set_pay_len(&mut self, len: u16) {
        self.pay_len = len.to_be_bytes();
    }

    /// Return a pseudo-header partial sum for a ULP datagram of
    /// `ulp_len` bytes carried by this header.
    ///
    /// `proto` is passed explicitly because the pseudo-header carries
    /// the ULP protocol even when this header's next-header field
    /// points at an extension header instead.
    pub fn pseudo_csum(&self, ulp_len: u32, proto: u8) -> Checksum {
        ipv6_pseudo_csum(self.src(), self.dst(), ulp_len, proto)
    }
}

/// The IPv6 fragment extension header (RFC 2460 §4.5).
#[repr(C)]
#[derive(Clone, Debug, Default, FromBytes, AsBytes, FromZeroes, Unaligned)]
pub struct FragHdrRaw {
    pub next_hdr: u8,
    pub reserved: u8,
    pub off_flags: [u8; 2],
    pub ident: [u8; 4],
}

impl FragHdrRaw {
    pub const SIZE: usize = core::mem::size_of::<Self>();

    pub fn parse(bytes: &[u8]) -> Result<Self, Ipv6HdrError> {
        Self::read_from_prefix(bytes)
            .ok_or(Ipv6HdrError::FragHeaderTruncated { len: bytes.len() })
    }

    /// Fragment offset in 8-byte units.
    pub fn offset(&self) -> u16 {
        (u16::from_be_bytes(self.off_flags) & IP6F_OFF_MASK) >> 3
    }

    pub fn more_frags(&self) -> bool {
        u16::from_be_bytes(self.off_flags) & IP6F_MORE_FRAG != 0
    }

    /// A non-first fragment carries no transport header, so nothing
    /// downstream of the IP layer can be translated.
    pub fn is_first(&self) -> bool {
        self.offset() == 0
    }
}

/// Build the IPv6 header replacing `old`'s IPv4 header (RFC 6145 §4.1).
///
/// The payload length is seeded with `payload_len` (usually zero; the
/// dispatcher patches the real value in once the downstream segments
/// exist). Address mapping never fails in this direction.
pub fn fill_ip6_header(
    cfg: &ClatConfig,
    old: &Ipv4HdrRaw,
    payload_len: u16,
    proto: u8,
) -> Ipv6HdrRaw {
    let mut hdr = Ipv6HdrRaw {
        next_hdr: proto,
        hop_limit: old.ttl,
        src: nat::ipv4_to_ipv6(cfg, old.src()).bytes(),
        dst: nat::ipv4_to_ipv6(cfg, old.dst()).bytes(),
        ..Default::default()
    };
    hdr.set_pay_len(payload_len);
    hdr
}

/// If `old` is fragmented, produce the equivalent IPv6 fragment header
/// and rewire `ip6`'s next-header chain through it; an unfragmented
/// packet produces nothing and leaves `ip6` untouched.
///
/// The 16-bit IPv4 identification is zero-extended into the 32-bit
/// IPv6 fragment identifier, and the 13-bit offset moves from the low
/// bits of the IPv4 word to bits 3-15 of the IPv6 one.
pub fn maybe_fill_frag_header(
    ip6: &mut Ipv6HdrRaw,
    old: &Ipv4HdrRaw,
) -> Option<FragHdrRaw> {
    let frag_flags = old.frag_flags();
    let frag_off = frag_flags & IP_OFFMASK;

    if frag_off == 0 && frag_flags & IP_MF == 0 {
        return None;
    }

    let mut off_flags = frag_off << 3;
    if frag_flags & IP_MF != 0 {
        off_flags |= IP6F_MORE_FRAG;
    }

    let frag = FragHdrRaw {
        next_hdr: ip6.next_hdr,
        reserved: 0,
        off_flags: off_flags.to_be_bytes(),
        ident: u32::from(u16::from_be_bytes(old.ident)).to_be_bytes(),
    };

    ip6.next_hdr = u8::from(IpProtocol::Ipv6Frag);
    Some(frag)
}

/// Fold an IPv6 fragment header back into `ip4`'s fragmentation fields
/// and return the true next-header value it carries (the enclosing
/// IPv6 header's own next-header field only says "fragment").
///
/// The 32-bit identifier is truncated to 16 bits; the low 16 bits are
/// the ones a conforming translator put it in.
pub fn parse_frag_header(frag: &FragHdrRaw, ip4: &mut Ipv4HdrRaw) -> u8 {
    let mut frag_off = frag.offset();
    if frag.more_frags() {
        frag_off |= IP_MF;
    }

    ip4.frag_and_flags = frag_off.to_be_bytes();
    ip4.ident = ((u32::from_be_bytes(frag.ident) & 0xFFFF) as u16).to_be_bytes();
    ip4.proto = frag.next_hdr;
    frag.next_hdr
}
