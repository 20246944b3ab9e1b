// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! UDP translation.
//!
//! Like TCP, only the checksum changes, with one wrinkle: IPv4 allows
//! a zero (absent) checksum and IPv6 does not, so a zero-checksum
//! datagram headed for IPv6 gets a full checksum computed from
//! scratch. RFC 768 reserves zero to mean "no checksum", so a computed
//! value of zero is transmitted as 0xFFFF.

use super::checksum::Checksum;
use super::checksum::HeaderChecksum;
use super::checksum::adjust;
use super::packet::ClatPacket;
use super::packet::Position;
use super::translate::TranslateError;
use smoltcp::wire::IpProtocol;
use zerocopy::AsBytes;
use zerocopy::FromBytes;
use zerocopy::FromZeroes;
use zerocopy::Unaligned;

pub const UDP_HDR_CSUM_OFF: usize = 6;

#[repr(C)]
#[derive(Clone, Debug, Default, FromBytes, AsBytes, FromZeroes, Unaligned)]
pub struct UdpHdrRaw {
    pub src_port: [u8; 2],
    pub dst_port: [u8; 2],
    pub length: [u8; 2],
    pub csum: [u8; 2],
}

impl UdpHdrRaw {
    pub const SIZE: usize = core::mem::size_of::<Self>();

    pub fn parse(bytes: &[u8]) -> Result<Self, TranslateError> {
        Self::read_from_prefix(bytes).ok_or(TranslateError::UlpTruncated {
            proto: u8::from(IpProtocol::Udp),
            len: bytes.len(),
        })
    }
}

/// Copy the UDP header into `pos`, give it a checksum valid under the
/// new pseudo-header, and point the payload at the rest.
///
/// A nonzero checksum is patched incrementally from `old_sum` to
/// `new_sum`; a zero one is computed in full, seeded from `new_sum`.
pub(crate) fn udp_translate<'a>(
    out: &mut ClatPacket<'a>,
    pos: Position,
    bytes: &'a [u8],
    old_sum: Checksum,
    new_sum: Checksum,
) -> Result<(), TranslateError> {
    let hdr = UdpHdrRaw::parse(bytes)?;
    out.set_hdr(pos, &bytes[..UdpHdrRaw::SIZE]);
    out.set_payload(&bytes[UdpHdrRaw::SIZE..]);

    let hc = if hdr.csum != [0; 2] {
        adjust(HeaderChecksum::wrap(hdr.csum), old_sum, new_sum)
    } else {
        // No checksum on the IPv4 side; IPv6 requires one.
        out.hdr_mut(pos)[UDP_HDR_CSUM_OFF..UDP_HDR_CSUM_OFF + 2]
            .copy_from_slice(&[0; 2]);
        out.checksum_from(new_sum, pos)
    };

    let wire = match hc.bytes() {
        [0, 0] => [0xFF, 0xFF],
        b => b,
    };
    out.hdr_mut(pos)[UDP_HDR_CSUM_OFF..UDP_HDR_CSUM_OFF + 2]
        .copy_from_slice(&wire);
    Ok(())
}
