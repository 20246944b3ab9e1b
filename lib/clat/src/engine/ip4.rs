// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! IPv4 headers.

use super::checksum::Checksum;
use super::checksum::HeaderChecksum;
use super::checksum::ipv4_pseudo_csum;
use super::icmp::icmp_guess_ttl;
use super::ip6::Ipv6HdrRaw;
use super::nat;
use clat_api::ClatConfig;
use clat_api::Ipv4Addr;
use core::fmt;
use core::fmt::Display;
use zerocopy::AsBytes;
use zerocopy::FromBytes;
use zerocopy::FromZeroes;
use zerocopy::Unaligned;

pub const IPV4_HDR_LEN_MASK: u8 = 0x0F;
pub const IPV4_HDR_VER_SHIFT: u8 = 4;
pub const IPV4_VERSION: u8 = 4;

/// Flags/fragment-offset word: don't fragment.
pub const IP_DF: u16 = 0x4000;
/// Flags/fragment-offset word: more fragments follow.
pub const IP_MF: u16 = 0x2000;
/// Flags/fragment-offset word: the 13-bit fragment offset.
pub const IP_OFFMASK: u16 = 0x1FFF;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Ipv4HdrError {
    BadVersion { vsn: u8 },
    HeaderTruncated { len: usize },
    BadHeaderLen { ihl: u8 },
    HeaderLenExceedsPacket { hdr_len: usize, len: usize },
}

impl Display for Ipv4HdrError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::BadVersion { vsn } => {
                write!(f, "IP header version not 4: {vsn:#x}")
            }

            Self::HeaderTruncated { len } => {
                write!(f, "too short for an IP header: {len}")
            }

            Self::BadHeaderLen { ihl } => {
                write!(f, "IP header length set to less than 5: {ihl:#x}")
            }

            Self::HeaderLenExceedsPacket { hdr_len, len } => {
                write!(
                    f,
                    "IP header length set too large: {hdr_len} > {len}"
                )
            }
        }
    }
}

/// Note: Kept unaligned so it can be read at any offset of a packet
/// buffer.
#[repr(C)]
#[derive(Clone, Debug, Eq, PartialEq, FromBytes, AsBytes, FromZeroes, Unaligned)]
pub struct Ipv4HdrRaw {
    pub ver_hdr_len: u8,
    pub dscp_ecn: u8,
    pub total_len: [u8; 2],
    pub ident: [u8; 2],
    pub frag_and_flags: [u8; 2],
    pub ttl: u8,
    pub proto: u8,
    pub csum: [u8; 2],
    pub src: [u8; 4],
    pub dst: [u8; 4],
}

impl Default for Ipv4HdrRaw {
    fn default() -> Self {
        Ipv4HdrRaw {
            ver_hdr_len: 0x45,
            dscp_ecn: 0x0,
            total_len: [0x0; 2],
            ident: [0x0; 2],
            frag_and_flags: IP_DF.to_be_bytes(),
            ttl: 64,
            proto: 255,
            csum: [0x0; 2],
            src: [0x0; 4],
            dst: [0x0; 4],
        }
    }
}

impl Ipv4HdrRaw {
    pub const SIZE: usize = core::mem::size_of::<Self>();

    /// Read and validate an IPv4 header from the front of `bytes`.
    ///
    /// RFC 6145: IPv4 options are not translated; the caller skips
    /// them by honoring [`Self::hdr_len`] when locating the ULP.
    pub fn parse(bytes: &[u8]) -> Result<Self, Ipv4HdrError> {
        let hdr = Self::read_from_prefix(bytes)
            .ok_or(Ipv4HdrError::HeaderTruncated { len: bytes.len() })?;

        let vsn = hdr.ver_hdr_len >> IPV4_HDR_VER_SHIFT;
        if vsn != IPV4_VERSION {
            return Err(Ipv4HdrError::BadVersion { vsn });
        }

        let ihl = hdr.ver_hdr_len & IPV4_HDR_LEN_MASK;
        if ihl < 5 {
            return Err(Ipv4HdrError::BadHeaderLen { ihl });
        }

        let hdr_len = usize::from(ihl) * 4;
        if hdr_len > bytes.len() {
            return Err(Ipv4HdrError::HeaderLenExceedsPacket {
                hdr_len,
                len: bytes.len(),
            });
        }

        Ok(hdr)
    }

    /// Return the header length in bytes, including options.
    pub fn hdr_len(&self) -> usize {
        usize::from(self.ver_hdr_len & IPV4_HDR_LEN_MASK) * 4
    }

    pub fn src(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.src)
    }

    pub fn dst(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.dst)
    }

    /// The flags/fragment-offset word as a host-order value.
    pub fn frag_flags(&self) -> u16 {
        u16::from_be_bytes(self.frag_and_flags)
    }

    pub fn total_len(&self) -> u16 {
        u16::from_be_bytes(self.total_len)
    }

    pub fn set_total_len(&mut self, len: u16) {
        self.total_len = len.to_be_bytes();
    }

    /// Return a pseudo-header partial sum for a ULP datagram of
    /// `ulp_len` bytes carried by this header.
    pub fn pseudo_csum(&self, ulp_len: u16) -> Checksum {
        ipv4_pseudo_csum(self.src(), self.dst(), ulp_len, self.proto)
    }

    /// Compute and store the header checksum. The checksum field takes
    /// part in its own computation, so it is zeroed first; call this
    /// only once every other field is final.
    pub fn compute_hdr_csum(&mut self) {
        self.csum = [0; 2];
        let csum = Checksum::compute(self.as_bytes());
        self.csum = HeaderChecksum::from(csum).bytes();
    }
}

/// Build the IPv4 header replacing `old`'s IPv6 header (RFC 6145 §5.1).
///
/// The total length is seeded with `payload_len` (usually zero; the
/// dispatcher patches the real value in once the downstream segments
/// exist) and the checksum is left zeroed for the same reason. The DF
/// flag is always set: an IPv6 sender that wants fragmentation says so
/// with a fragment header, which takes the explicit fragment path
/// instead of this one.
pub fn fill_ip_header(
    cfg: &ClatConfig,
    old: &Ipv6HdrRaw,
    payload_len: u16,
    proto: u8,
) -> Ipv4HdrRaw {
    let mut hdr = Ipv4HdrRaw {
        ttl: old.hop_limit,
        proto,
        ..Default::default()
    };
    hdr.set_total_len(Ipv4HdrRaw::SIZE as u16 + payload_len);

    hdr.dst = match nat::ipv6_to_ipv4(cfg, old.dst()) {
        Some(dst) => dst.bytes(),
        // A packet addressed to an untranslatable destination should
        // not have reached us; let it fail routing as 255.255.255.255
        // rather than dropping it here.
        None => Ipv4Addr::LOCAL_BCAST.bytes(),
    };

    hdr.src = match nat::ipv6_to_ipv4(cfg, old.src()) {
        Some(src) => src.bytes(),
        // Third-party IPv6 source (e.g. a router sourcing an ICMP
        // error). Synthesize 255.0.0.<original ttl> so traceroute
        // output stays readable.
        None => [255, 0, 0, icmp_guess_ttl(old.hop_limit)],
    };

    hdr
}
