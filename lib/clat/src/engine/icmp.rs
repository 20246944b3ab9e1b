// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! ICMP/ICMPv6 translation (RFC 6145 §4.2, §5.2).
//!
//! Echo messages translate header-for-header. Error messages carry the
//! offending packet inside them, and that embedded packet is itself
//! translated, one level deep, into the `IcmpErr*` segment slots.
//! Message types with no counterpart in the other family (NDP, MLD,
//! source quench, ...) drop the whole packet.

use super::checksum::Checksum;
use super::packet::ClatPacket;
use super::packet::Position;
use super::translate::TranslateError;
use super::translate::ipv4_packet;
use super::translate::ipv6_packet;
use clat_api::ClatConfig;
use zerocopy::AsBytes;
use zerocopy::FromBytes;
use zerocopy::FromZeroes;
use zerocopy::Unaligned;

pub const ICMP4_ECHO_REPLY: u8 = 0;
pub const ICMP4_DEST_UNREACH: u8 = 3;
pub const ICMP4_ECHO_REQUEST: u8 = 8;
pub const ICMP4_TIME_EXCEEDED: u8 = 11;

pub const ICMP6_DEST_UNREACH: u8 = 1;
pub const ICMP6_PACKET_TOO_BIG: u8 = 2;
pub const ICMP6_TIME_EXCEEDED: u8 = 3;
pub const ICMP6_PARAM_PROB: u8 = 4;
pub const ICMP6_ECHO_REQUEST: u8 = 128;
pub const ICMP6_ECHO_REPLY: u8 = 129;

/// The four fixed bytes shared by ICMPv4 and ICMPv6, plus the
/// message-dependent "rest of header" word (echo id/seq, PTB MTU,
/// unused for most errors).
#[repr(C)]
#[derive(Clone, Debug, Default, FromBytes, AsBytes, FromZeroes, Unaligned)]
pub struct IcmpHdrRaw {
    pub msg_type: u8,
    pub code: u8,
    pub csum: [u8; 2],
    pub rest: [u8; 4],
}

impl IcmpHdrRaw {
    pub const SIZE: usize = core::mem::size_of::<Self>();

    pub fn parse(bytes: &[u8]) -> Result<Self, TranslateError> {
        Self::read_from_prefix(bytes).ok_or(TranslateError::UlpTruncated {
            proto: u8::from(smoltcp::wire::IpProtocol::Icmp),
            len: bytes.len(),
        })
    }
}

/// An ICMPv4 error message, i.e. one carrying an embedded packet.
pub fn is_icmp_error(msg_type: u8) -> bool {
    matches!(msg_type, 3 | 11 | 12)
}

/// An ICMPv6 error message; informational types have the high bit set.
pub fn is_icmp6_error(msg_type: u8) -> bool {
    msg_type < 128
}

/// Guess the number of hops a packet has traversed from its remaining
/// TTL, assuming the sender started from the next common initial TTL
/// up (32, 64, 128, or 255).
pub fn icmp_guess_ttl(ttl: u8) -> u8 {
    if ttl > 128 {
        255 - ttl
    } else if ttl > 64 {
        128 - ttl
    } else if ttl > 32 {
        64 - ttl
    } else {
        32 - ttl
    }
}

/// Map an ICMPv4 type/code pair onto ICMPv6, or `None` if the message
/// has no ICMPv6 counterpart and the packet should be dropped.
pub fn map_icmp_to_icmp6(msg_type: u8, code: u8) -> Option<(u8, u8)> {
    match (msg_type, code) {
        (ICMP4_ECHO_REQUEST, _) => Some((ICMP6_ECHO_REQUEST, 0)),
        (ICMP4_ECHO_REPLY, _) => Some((ICMP6_ECHO_REPLY, 0)),
        (ICMP4_TIME_EXCEEDED, c) => Some((ICMP6_TIME_EXCEEDED, c)),
        (ICMP4_DEST_UNREACH, c) => match c {
            0 | 1 | 5 | 6 | 7 | 8 | 11 | 12 => Some((ICMP6_DEST_UNREACH, 0)),
            // Administratively prohibited, one way or another.
            9 | 10 | 13 | 15 => Some((ICMP6_DEST_UNREACH, 1)),
            3 => Some((ICMP6_DEST_UNREACH, 4)),
            4 => Some((ICMP6_PACKET_TOO_BIG, 0)),
            _ => None,
        },
        _ => None,
    }
}

/// Map an ICMPv6 type/code pair onto ICMPv4, or `None` if the message
/// has no ICMPv4 counterpart and the packet should be dropped.
pub fn map_icmp6_to_icmp(msg_type: u8, code: u8) -> Option<(u8, u8)> {
    match (msg_type, code) {
        (ICMP6_ECHO_REQUEST, _) => Some((ICMP4_ECHO_REQUEST, 0)),
        (ICMP6_ECHO_REPLY, _) => Some((ICMP4_ECHO_REPLY, 0)),
        (ICMP6_DEST_UNREACH, c) => match c {
            0 | 2 | 3 => Some((ICMP4_DEST_UNREACH, 1)),
            1 => Some((ICMP4_DEST_UNREACH, 10)),
            4 => Some((ICMP4_DEST_UNREACH, 3)),
            _ => None,
        },
        (ICMP6_PACKET_TOO_BIG, _) => Some((ICMP4_DEST_UNREACH, 4)),
        (ICMP6_TIME_EXCEEDED, c) => Some((ICMP4_TIME_EXCEEDED, c)),
        // Unrecognized next header maps onto protocol unreachable.
        (ICMP6_PARAM_PROB, 1) => Some((ICMP4_DEST_UNREACH, 2)),
        _ => None,
    }
}

/// Translate an ICMPv4 message at `bytes` into the ICMPv6 message at
/// `pos`, recursing into the embedded packet of an error message.
///
/// `partial` is the ICMPv6 pseudo-header sum computed by the caller
/// from the new IPv6 header. `depth` bounds the error recursion: an
/// error embedded in an error is not translated.
pub(crate) fn icmp_to_icmp6<'a>(
    cfg: &ClatConfig,
    out: &mut ClatPacket<'a>,
    pos: Position,
    mut partial: Checksum,
    bytes: &'a [u8],
    depth: u8,
) -> Result<(), TranslateError> {
    let icmp = IcmpHdrRaw::parse(bytes)?;
    let payload = &bytes[IcmpHdrRaw::SIZE..];

    let (msg_type, code) = map_icmp_to_icmp6(icmp.msg_type, icmp.code)
        .ok_or(TranslateError::UnsupportedIcmp {
            msg_type: icmp.msg_type,
            code: icmp.code,
        })?;

    let mut hdr =
        IcmpHdrRaw { msg_type, code, csum: [0; 2], rest: [0; 4] };

    if msg_type == ICMP6_PACKET_TOO_BIG {
        // The IPv4 MTU sits in the low half of the word; widen it by
        // the 20 bytes the IPv6 header adds. Zero stays zero, meaning
        // the router didn't report one.
        let mtu = u16::from_be_bytes([icmp.rest[2], icmp.rest[3]]);
        let mtu6 = if mtu == 0 { 0 } else { u32::from(mtu) + 20 };
        hdr.rest = mtu6.to_be_bytes();
    }

    if is_icmp6_error(msg_type) {
        if depth == 0 {
            return Err(TranslateError::IcmpErrorDepth);
        }

        out.set_hdr(pos, hdr.as_bytes());
        ipv4_packet(cfg, out, pos.offset(1), payload, depth - 1)?;

        // The caller's pseudo-header sum used the IPv4 ULP length, but
        // translating the embedded IPv4 header into IPv6 grew the
        // message by 20 bytes.
        partial.add_bytes(&20u16.to_be_bytes());
    } else {
        // Echo: the id/seq word carries over untouched.
        hdr.rest = icmp.rest;
        out.set_hdr(pos, hdr.as_bytes());
        out.set_payload(payload);
    }

    let hc = out.checksum_from(partial, pos);
    out.hdr_mut(pos)[2..4].copy_from_slice(&hc.bytes());
    Ok(())
}

/// Translate an ICMPv6 message at `bytes` into the ICMPv4 message at
/// `pos`. Unlike ICMPv6, the ICMPv4 checksum covers no pseudo-header.
pub(crate) fn icmp6_to_icmp<'a>(
    cfg: &ClatConfig,
    out: &mut ClatPacket<'a>,
    pos: Position,
    bytes: &'a [u8],
    depth: u8,
) -> Result<(), TranslateError> {
    let icmp6 = IcmpHdrRaw::parse(bytes)?;
    let payload = &bytes[IcmpHdrRaw::SIZE..];

    let (msg_type, code) = map_icmp6_to_icmp(icmp6.msg_type, icmp6.code)
        .ok_or(TranslateError::UnsupportedIcmp {
            msg_type: icmp6.msg_type,
            code: icmp6.code,
        })?;

    let mut hdr =
        IcmpHdrRaw { msg_type, code, csum: [0; 2], rest: [0; 4] };

    if icmp6.msg_type == ICMP6_PACKET_TOO_BIG {
        // Narrow the MTU by the 20 bytes the IPv4 header saves, into
        // the low half of the word. Zero stays zero.
        let mtu6 = u32::from_be_bytes(icmp6.rest);
        let mtu = if mtu6 == 0 {
            0
        } else {
            mtu6.saturating_sub(20).min(u32::from(u16::MAX)) as u16
        };
        hdr.rest[2..4].copy_from_slice(&mtu.to_be_bytes());
    }

    if is_icmp_error(msg_type) {
        if depth == 0 {
            return Err(TranslateError::IcmpErrorDepth);
        }

        out.set_hdr(pos, hdr.as_bytes());
        ipv6_packet(cfg, out, pos.offset(1), payload, depth - 1)?;
    } else {
        hdr.rest = icmp6.rest;
        out.set_hdr(pos, hdr.as_bytes());
        out.set_payload(payload);
    }

    let hc = out.checksum_from(Checksum::new(), pos);
    out.hdr_mut(pos)[2..4].copy_from_slice(&hc.bytes());
    Ok(())
}
