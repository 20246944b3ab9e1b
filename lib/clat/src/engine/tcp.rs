// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! TCP translation.
//!
//! The segment itself is address-family agnostic; all that changes is
//! the checksum, and that only because the pseudo-header does. The
//! header (options included) is copied, the checksum is patched by
//! incremental update (RFC 1624), and the payload rides along
//! untouched.

use super::checksum::Checksum;
use super::checksum::HeaderChecksum;
use super::checksum::adjust;
use super::packet::ClatPacket;
use super::packet::MAX_HDR_LEN;
use super::packet::Position;
use super::translate::TranslateError;
use smoltcp::wire::IpProtocol;
use zerocopy::AsBytes;
use zerocopy::FromBytes;
use zerocopy::FromZeroes;
use zerocopy::Unaligned;

pub const TCP_HDR_CSUM_OFF: usize = 16;

/// Note: Offset 12 is the data offset (upper nibble) and reserved
/// bits; the flags live in the following byte.
#[repr(C)]
#[derive(Clone, Debug, Default, FromBytes, AsBytes, FromZeroes, Unaligned)]
pub struct TcpHdrRaw {
    pub src_port: [u8; 2],
    pub dst_port: [u8; 2],
    pub seq: [u8; 4],
    pub ack: [u8; 4],
    pub doff: u8,
    pub flags: u8,
    pub window: [u8; 2],
    pub csum: [u8; 2],
    pub urg: [u8; 2],
}

impl TcpHdrRaw {
    pub const SIZE: usize = core::mem::size_of::<Self>();

    pub fn parse(bytes: &[u8]) -> Result<Self, TranslateError> {
        Self::read_from_prefix(bytes).ok_or(TranslateError::UlpTruncated {
            proto: u8::from(IpProtocol::Tcp),
            len: bytes.len(),
        })
    }

    /// Header length in bytes, from the data-offset nibble.
    pub fn hdr_len(&self) -> usize {
        usize::from(self.doff >> 4) * 4
    }
}

/// Copy the TCP header (with options) into `pos`, fix its checksum for
/// the new pseudo-header, and point the payload at the rest.
///
/// `old_sum` and `new_sum` are the pseudo-header sums under the
/// original and the translated IP header.
pub(crate) fn tcp_translate<'a>(
    out: &mut ClatPacket<'a>,
    pos: Position,
    bytes: &'a [u8],
    old_sum: Checksum,
    new_sum: Checksum,
) -> Result<(), TranslateError> {
    let hdr = TcpHdrRaw::parse(bytes)?;
    let mut hdr_len = hdr.hdr_len();

    if hdr_len < TcpHdrRaw::SIZE || hdr_len > bytes.len() {
        return Err(TranslateError::BadTcpOffset { doff: hdr.doff >> 4 });
    }

    if hdr_len > MAX_HDR_LEN {
        // Unreachable while the offset nibble tops out at 15 words,
        // but the slot capacity is a hard bound.
        log::error!("TCP header of {hdr_len} bytes, clamping");
        hdr_len = MAX_HDR_LEN;
    }

    out.set_hdr(pos, &bytes[..hdr_len]);
    let hc = adjust(HeaderChecksum::wrap(hdr.csum), old_sum, new_sum);
    out.hdr_mut(pos)[TCP_HDR_CSUM_OFF..TCP_HDR_CSUM_OFF + 2]
        .copy_from_slice(&hc.bytes());
    out.set_payload(&bytes[hdr_len..]);
    Ok(())
}
