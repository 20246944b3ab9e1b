// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Types for calculating the internet checksum.
//!
//! [`Checksum`] is a rolling one's complement sum: carries are
//! accumulated in the upper bits of a `u32` and folded only when the
//! finalized value is needed. [`HeaderChecksum`] is the complemented
//! on-wire form.
//!
//! Byte order: the checksum is a pair of bytes, not a logical `u16`.
//! Each pair of summed bytes is treated as a native-endian 16-bit
//! integer (`from_ne_bytes`), and the result is written back the same
//! way, so no `hton`/`ntoh` conversion is ever applied to a checksum
//! field. See RFC 1071 §1.B.
//!
//! Relevant RFCs:
//!
//! * 1071 Computing the Internet Checksum
//! * 1624 Computation of the Internet Checksum via Incremental Update

use clat_api::Ipv4Addr;
use clat_api::Ipv6Addr;

/// The checksum value as it is contained in a network header, i.e.,
/// with one's complement applied.
pub struct HeaderChecksum {
    inner: [u8; 2],
}

impl HeaderChecksum {
    /// Return the bytes of this header checksum.
    pub fn bytes(&self) -> [u8; 2] {
        self.inner
    }

    /// Wrap a pair of header bytes which represent a header checksum.
    pub fn wrap(hc: [u8; 2]) -> Self {
        Self { inner: hc }
    }
}

impl From<Checksum> for HeaderChecksum {
    /// Finalize the rolling checksum and put it into header form by
    /// performing one's complement.
    fn from(mut csum: Checksum) -> HeaderChecksum {
        // See the module-level comment about why it's important to
        // convert using native-endian.
        Self { inner: (!csum.finalize()).to_ne_bytes() }
    }
}

/// A rolling one's complement checksum calculation.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Checksum {
    inner: u32,
}

impl Checksum {
    /// Creates a new checksum counter.
    pub fn new() -> Self {
        Self::from(0)
    }

    /// Update the sum by adding the contents of `bytes`.
    pub fn add_bytes(&mut self, bytes: &[u8]) {
        self.inner = csum_add(self.inner, bytes);
    }

    /// Create a new rolling checksum, starting with the passed in
    /// `bytes`.
    pub fn compute(bytes: &[u8]) -> Self {
        Self { inner: csum_add(0, bytes) }
    }

    /// Update the sum by subtracting the contents of `bytes`.
    ///
    /// This is useful for incrementally updating an existing checksum
    /// where only a portion of the summed bytes are being rewritten.
    pub fn sub_bytes(&mut self, bytes: &[u8]) {
        self.inner = csum_sub(self.inner, bytes);
    }

    /// Finalize the sum by folding all accumulated carries and
    /// returning the resulting value as a `u16`.
    pub fn finalize(&mut self) -> u16 {
        while (self.inner >> 16) != 0 {
            self.inner = (self.inner >> 16) + (self.inner & 0xFFFF);
        }

        (self.inner & 0xFFFF) as u16
    }
}

impl From<HeaderChecksum> for Checksum {
    // Convert a header's checksum bytes back into a rolling checksum.
    fn from(hc: HeaderChecksum) -> Self {
        // See the module-level comment about why it's important to
        // convert using native-endian.
        Self { inner: (!u16::from_ne_bytes(hc.bytes())) as u32 }
    }
}

impl From<u32> for Checksum {
    fn from(csum: u32) -> Self {
        Self { inner: csum }
    }
}

impl core::ops::AddAssign for Checksum {
    fn add_assign(&mut self, other: Self) {
        self.inner += other.inner
    }
}

impl core::ops::SubAssign for Checksum {
    fn sub_assign(&mut self, mut other: Self) {
        let other_bytes = other.finalize().to_ne_bytes();
        self.sub_bytes(&other_bytes);
    }
}

/// Return the partial sum of the IPv4 pseudo-header for a ULP datagram
/// of `ulp_len` bytes carried between `src` and `dst`.
pub fn ipv4_pseudo_csum(
    src: Ipv4Addr,
    dst: Ipv4Addr,
    ulp_len: u16,
    proto: u8,
) -> Checksum {
    let mut bytes = [0u8; 12];
    bytes[0..4].copy_from_slice(&src.bytes());
    bytes[4..8].copy_from_slice(&dst.bytes());
    bytes[9] = proto;
    bytes[10..12].copy_from_slice(&ulp_len.to_be_bytes());
    Checksum::compute(&bytes)
}

/// Return the partial sum of the IPv6 pseudo-header. Note that the
/// pseudo-header length field is 32 bits wide (RFC 2460 §8.1).
pub fn ipv6_pseudo_csum(
    src: Ipv6Addr,
    dst: Ipv6Addr,
    ulp_len: u32,
    proto: u8,
) -> Checksum {
    let mut bytes = [0u8; 40];
    bytes[0..16].copy_from_slice(&src.bytes());
    bytes[16..32].copy_from_slice(&dst.bytes());
    bytes[32..36].copy_from_slice(&ulp_len.to_be_bytes());
    bytes[39] = proto;
    Checksum::compute(&bytes)
}

/// Incrementally update a header checksum whose covered pseudo-header
/// changed from `old_sum` to `new_sum`, without re-summing the
/// unchanged remainder (RFC 1624).
pub fn adjust(
    hc: HeaderChecksum,
    old_sum: Checksum,
    new_sum: Checksum,
) -> HeaderChecksum {
    let mut csum = Checksum::from(hc);
    csum -= old_sum;
    csum += new_sum;
    HeaderChecksum::from(csum)
}

fn csum_add(mut csum: u32, bytes: &[u8]) -> u32 {
    let mut len = bytes.len();
    let mut pos = 0;

    while len > 1 {
        // See the module-level comment about why it's important to
        // convert using native-endian.
        csum += (u16::from_ne_bytes([bytes[pos], bytes[pos + 1]])) as u32;
        pos += 2;
        len -= 2;
    }

    if len == 1 {
        csum += bytes[pos] as u32;
    }

    csum
}

fn csum_sub(mut csum: u32, bytes: &[u8]) -> u32 {
    let mut len = bytes.len();
    let mut pos = 0;

    while len > 1 {
        let sub = (!u16::from_ne_bytes([bytes[pos], bytes[pos + 1]])) as u32;
        csum += sub;
        pos += 2;
        len -= 2;
    }

    if len == 1 {
        csum += (!bytes[pos]) as u32;
    }

    csum
}
