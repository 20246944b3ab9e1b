// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Packet-level translation (RFC 6145).
//!
//! [`translate_packet`] is the entry point: it parses the IP header,
//! builds its opposite-family replacement, hands the upper layer to
//! the protocol-specific translators, and pushes the finished segment
//! array into a [`PacketSink`]. The dispatchers are reentrant: an ICMP
//! error's embedded packet goes through the same code one position
//! chain deeper.

use super::icmp::icmp6_to_icmp;
use super::icmp::icmp_to_icmp6;
use super::ip4::IP_OFFMASK;
use super::ip4::Ipv4HdrError;
use super::ip4::Ipv4HdrRaw;
use super::ip4::fill_ip_header;
use super::ip6::FragHdrRaw;
use super::ip6::Ipv6HdrError;
use super::ip6::Ipv6HdrRaw;
use super::ip6::fill_ip6_header;
use super::ip6::maybe_fill_frag_header;
use super::ip6::parse_frag_header;
use super::nat;
use super::packet::ClatPacket;
use super::packet::Position;
use super::tcp::tcp_translate;
use super::udp::udp_translate;
use clat_api::ClatConfig;
use clat_api::Direction;
use clat_api::Ipv6Addr;
use smoltcp::wire::IpProtocol;
use std::io;
use thiserror::Error;
use zerocopy::AsBytes;
use zerocopy::FromBytes;
use zerocopy::FromZeroes;
use zerocopy::Unaligned;

pub const IPPROTO_GRE: u8 = 47;
pub const IPPROTO_ESP: u8 = 50;

/// EtherType for IPv4, as carried in the tun packet-information
/// header.
pub const ETH_P_IP: u16 = 0x0800;

/// Why a packet was dropped instead of translated.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum TranslateError {
    #[error("bad IPv4 header: {0}")]
    BadIpv4Hdr(Ipv4HdrError),

    #[error("bad IPv6 header: {0}")]
    BadIpv6Hdr(Ipv6HdrError),

    #[error("multicast destination {0}")]
    MulticastDst(Ipv6Addr),

    #[error("source {0} is neither local nor in the PLAT prefix")]
    UntranslatableSrc(Ipv6Addr),

    #[error("unsupported protocol {proto}")]
    UnsupportedProtocol { proto: u8 },

    #[error("ICMP type {msg_type} code {code} has no counterpart")]
    UnsupportedIcmp { msg_type: u8, code: u8 },

    #[error("ICMP error embedded in an ICMP error")]
    IcmpErrorDepth,

    #[error("protocol {proto} datagram truncated at {len} bytes")]
    UlpTruncated { proto: u8, len: usize },

    #[error("TCP data offset of {doff} words")]
    BadTcpOffset { doff: u8 },

    #[error("translated packet of {len} bytes overflows the length field")]
    PacketTooLong { len: usize },

    #[error("packet write failed: {0}")]
    Write(String),
}

impl From<Ipv4HdrError> for TranslateError {
    fn from(e: Ipv4HdrError) -> Self {
        Self::BadIpv4Hdr(e)
    }
}

impl From<Ipv6HdrError> for TranslateError {
    fn from(e: Ipv6HdrError) -> Self {
        Self::BadIpv6Hdr(e)
    }
}

/// Where finished packets go. The daemon implements this over its tun
/// fd and raw IPv6 socket; tests implement it over a buffer.
pub trait PacketSink {
    /// Deliver a translated IPv4 packet, tun packet-information header
    /// included, to the local stack.
    fn send_tun(&mut self, pkt: &ClatPacket) -> io::Result<()>;

    /// Send a translated IPv6 packet toward `dst`. The raw socket
    /// needs the destination out-of-band even though it also sits in
    /// the packet's own header.
    fn send_rawv6(&mut self, dst: Ipv6Addr, pkt: &ClatPacket)
    -> io::Result<()>;
}

/// Tun packet-information header: two bytes of flags, EtherType.
#[repr(C)]
#[derive(Clone, Debug, Default, FromBytes, AsBytes, FromZeroes, Unaligned)]
pub struct TunPiRaw {
    pub flags: [u8; 2],
    pub proto: [u8; 2],
}

/// A packet (or embedded-packet tail) we pass through untouched:
/// GRE, ESP, and non-first fragments, whose contents don't depend on
/// the address family.
fn generic_packet<'a>(out: &mut ClatPacket<'a>, bytes: &'a [u8]) {
    out.set_payload(bytes);
}

/// Translate the IPv4 packet in `packet` into IPv6 segments rooted at
/// `pos`. `depth` is the remaining ICMP-error recursion budget.
pub(crate) fn ipv4_packet<'a>(
    cfg: &ClatConfig,
    out: &mut ClatPacket<'a>,
    pos: Position,
    packet: &'a [u8],
    depth: u8,
) -> Result<(), TranslateError> {
    let hdr = Ipv4HdrRaw::parse(packet)?;
    let hdr_len = hdr.hdr_len();
    let payload = &packet[hdr_len..];
    let ulp_len = payload.len();

    // ICMP becomes ICMPv6; everything else keeps its number.
    let proto = hdr.proto;
    let nxt = if proto == u8::from(IpProtocol::Icmp) {
        u8::from(IpProtocol::Icmpv6)
    } else {
        proto
    };

    let mut ip6 = fill_ip6_header(cfg, &hdr, 0, nxt);

    if let Some(frag) = maybe_fill_frag_header(&mut ip6, &hdr) {
        out.set_hdr(pos.offset(1), frag.as_bytes());
    }

    let old_sum = hdr.pseudo_csum(ulp_len as u16);
    let new_sum = ip6.pseudo_csum(ulp_len as u32, nxt);
    let tpos = pos.offset(2);

    if hdr.frag_flags() & IP_OFFMASK != 0 {
        // Non-first fragment: the transport header is in another
        // packet, so there is nothing past the IP layer to rewrite.
        generic_packet(out, payload);
    } else {
        match IpProtocol::from(proto) {
            IpProtocol::Tcp => {
                tcp_translate(out, tpos, payload, old_sum, new_sum)?
            }

            IpProtocol::Udp => {
                udp_translate(out, tpos, payload, old_sum, new_sum)?
            }

            IpProtocol::Icmp => {
                icmp_to_icmp6(cfg, out, tpos, new_sum, payload, depth)?
            }

            other => {
                let raw = u8::from(other);
                if raw == IPPROTO_GRE || raw == IPPROTO_ESP {
                    generic_packet(out, payload);
                } else {
                    log::debug!("cannot translate protocol {raw} to IPv6");
                    return Err(TranslateError::UnsupportedProtocol {
                        proto: raw,
                    });
                }
            }
        }
    }

    // Only now is the payload length known.
    let pay_len = out.wire_len_after(pos);
    let pay_len = u16::try_from(pay_len)
        .map_err(|_| TranslateError::PacketTooLong { len: pay_len })?;
    ip6.set_pay_len(pay_len);
    out.set_hdr(pos, ip6.as_bytes());
    Ok(())
}

/// Translate the IPv6 packet in `packet` into IPv4 segments rooted at
/// `pos`. `depth` is the remaining ICMP-error recursion budget.
pub(crate) fn ipv6_packet<'a>(
    cfg: &ClatConfig,
    out: &mut ClatPacket<'a>,
    pos: Position,
    packet: &'a [u8],
    depth: u8,
) -> Result<(), TranslateError> {
    let hdr = Ipv6HdrRaw::parse(packet)?;
    let dst = hdr.dst();

    if dst.is_multicast() {
        return Err(TranslateError::MulticastDst(dst));
    }

    // Only traffic from the PLAT prefix or from ourselves translates
    // to something the IPv4 stack can make sense of. ICMPv6 is the
    // exception: routers source errors from their own addresses, and
    // those synthesize a placeholder IPv4 source downstream.
    let src = hdr.src();
    if !nat::is_in_plat_subnet(cfg, src)
        && src != cfg.ipv6_local_subnet
        && hdr.next_hdr != u8::from(IpProtocol::Icmpv6)
    {
        log::debug!("dropping IPv6 packet from unknown source {src}");
        return Err(TranslateError::UntranslatableSrc(src));
    }

    let mut payload = &packet[Ipv6HdrRaw::SIZE..];
    let mut proto = hdr.next_hdr;
    let mut ip4 = fill_ip_header(cfg, &hdr, 0, proto);
    let mut frag_offset = 0;

    if proto == u8::from(IpProtocol::Ipv6Frag) {
        let frag = FragHdrRaw::parse(payload)?;
        payload = &payload[FragHdrRaw::SIZE..];
        proto = parse_frag_header(&frag, &mut ip4);
        frag_offset = frag.offset();
    }

    if proto == u8::from(IpProtocol::Icmpv6) {
        ip4.proto = u8::from(IpProtocol::Icmp);
    }

    let ulp_len = payload.len();
    let old_sum = hdr.pseudo_csum(ulp_len as u32, proto);
    let new_sum = ip4.pseudo_csum(ulp_len as u16);
    let tpos = pos.offset(2);

    if frag_offset != 0 {
        generic_packet(out, payload);
    } else {
        match IpProtocol::from(proto) {
            IpProtocol::Tcp => {
                tcp_translate(out, tpos, payload, old_sum, new_sum)?
            }

            IpProtocol::Udp => {
                udp_translate(out, tpos, payload, old_sum, new_sum)?
            }

            IpProtocol::Icmpv6 => {
                icmp6_to_icmp(cfg, out, tpos, payload, depth)?
            }

            other => {
                let raw = u8::from(other);
                if raw == IPPROTO_GRE || raw == IPPROTO_ESP {
                    generic_packet(out, payload);
                } else {
                    log::debug!("cannot translate protocol {raw} to IPv4");
                    return Err(TranslateError::UnsupportedProtocol {
                        proto: raw,
                    });
                }
            }
        }
    }

    let wire_len = Ipv4HdrRaw::SIZE + out.wire_len_after(pos);
    let total_len = u16::try_from(wire_len)
        .map_err(|_| TranslateError::PacketTooLong { len: wire_len })?;
    ip4.set_total_len(total_len);
    ip4.compute_hdr_csum();
    out.set_hdr(pos, ip4.as_bytes());
    Ok(())
}

/// Translate one packet and hand it to `sink`.
///
/// `ToIpv6` expects a raw IPv4 packet (the kind read from the tun
/// device) and produces an IPv6 packet for the raw socket; `ToIpv4`
/// is the reverse and prepends the tun packet-information header.
/// On error nothing is written and the input should be dropped.
pub fn translate_packet<S: PacketSink>(
    cfg: &ClatConfig,
    dir: Direction,
    packet: &[u8],
    sink: &mut S,
) -> Result<(), TranslateError> {
    let mut out = ClatPacket::new();

    let res = match dir {
        Direction::ToIpv6 => {
            ipv4_packet(cfg, &mut out, Position::IpHdr, packet, 1).and_then(
                |()| {
                    let hdr = Ipv6HdrRaw::parse(out.hdr(Position::IpHdr))?;
                    sink.send_rawv6(hdr.dst(), &out)
                        .map_err(|e| TranslateError::Write(e.to_string()))
                },
            )
        }

        Direction::ToIpv4 => {
            ipv6_packet(cfg, &mut out, Position::IpHdr, packet, 1).and_then(
                |()| {
                    let pi = TunPiRaw {
                        flags: [0; 2],
                        proto: ETH_P_IP.to_be_bytes(),
                    };
                    out.set_hdr(Position::TunHdr, pi.as_bytes());
                    sink.send_tun(&out)
                        .map_err(|e| TranslateError::Write(e.to_string()))
                },
            )
        }
    };

    if let Err(e) = &res {
        log::debug!("dropping {dir} packet: {e}");
    }

    res
}

#[cfg(test)]
mod test {
    use super::*;

    fn test_config() -> ClatConfig {
        ClatConfig::new(
            "64:ff9b::".parse().unwrap(),
            "192.0.0.4".parse().unwrap(),
            "2001:db8:a:b::4".parse().unwrap(),
        )
        .unwrap()
    }

    fn v6_udp_packet(src: &str, dst: &str) -> Vec<u8> {
        let mut hdr = Ipv6HdrRaw::default();
        hdr.src = src.parse::<Ipv6Addr>().unwrap().bytes();
        hdr.dst = dst.parse::<Ipv6Addr>().unwrap().bytes();
        hdr.next_hdr = u8::from(IpProtocol::Udp);
        hdr.set_pay_len(8);

        let mut bytes = Vec::new();
        bytes.extend_from_slice(hdr.as_bytes());
        // Ports, length, checksum; the checksum is junk but nonzero,
        // so the adjust path runs.
        bytes.extend_from_slice(&[
            0x30, 0x39, 0x00, 0x35, 0x00, 0x08, 0x12, 0x34,
        ]);
        bytes
    }

    #[test]
    fn multicast_destination_dropped() {
        let cfg = test_config();
        let pkt = v6_udp_packet("64:ff9b::cb00:7101", "ff02::1");
        let mut out = ClatPacket::new();

        let res = ipv6_packet(&cfg, &mut out, Position::IpHdr, &pkt, 1);
        assert!(matches!(res, Err(TranslateError::MulticastDst(_))));
    }

    #[test]
    fn unknown_source_dropped() {
        let cfg = test_config();
        let pkt = v6_udp_packet("2001:db8:face::1", "2001:db8:a:b::4");
        let mut out = ClatPacket::new();

        let res = ipv6_packet(&cfg, &mut out, Position::IpHdr, &pkt, 1);
        assert!(matches!(res, Err(TranslateError::UntranslatableSrc(_))));
    }

    #[test]
    fn unknown_protocol_dropped() {
        let cfg = test_config();
        let mut pkt = v6_udp_packet("64:ff9b::cb00:7101", "2001:db8:a:b::4");
        pkt[6] = 132; // SCTP
        let mut out = ClatPacket::new();

        let res = ipv6_packet(&cfg, &mut out, Position::IpHdr, &pkt, 1);
        assert_eq!(
            res,
            Err(TranslateError::UnsupportedProtocol { proto: 132 })
        );
    }

    #[test]
    fn esp_passes_through() {
        let cfg = test_config();
        let mut pkt = v6_udp_packet("64:ff9b::cb00:7101", "2001:db8:a:b::4");
        pkt[6] = IPPROTO_ESP;
        let mut out = ClatPacket::new();

        ipv6_packet(&cfg, &mut out, Position::IpHdr, &pkt, 1).unwrap();
        assert!(out.hdr(Position::TransportHdr).is_empty());
        assert_eq!(out.payload().len(), 8);

        let v4 = Ipv4HdrRaw::parse(out.hdr(Position::IpHdr)).unwrap();
        assert_eq!(v4.proto, IPPROTO_ESP);
        assert_eq!(v4.total_len(), 28);
    }

    #[test]
    fn oversize_payload_dropped() {
        let cfg = test_config();
        let mut hdr = Ipv6HdrRaw::default();
        hdr.src = "64:ff9b::cb00:7101".parse::<Ipv6Addr>().unwrap().bytes();
        hdr.dst = "2001:db8:a:b::4".parse::<Ipv6Addr>().unwrap().bytes();
        hdr.next_hdr = IPPROTO_ESP;
        hdr.set_pay_len(u16::MAX);

        // An IPv6 ULP this large plus the 20-byte IPv4 header no
        // longer fits the IPv4 total length field.
        let mut pkt = Vec::new();
        pkt.extend_from_slice(hdr.as_bytes());
        pkt.resize(pkt.len() + 65530, 0);
        let mut out = ClatPacket::new();

        let res = ipv6_packet(&cfg, &mut out, Position::IpHdr, &pkt, 1);
        assert_eq!(res, Err(TranslateError::PacketTooLong { len: 65550 }));
    }

    #[test]
    fn truncated_input_dropped() {
        let cfg = test_config();
        let mut out = ClatPacket::new();

        let res = ipv6_packet(&cfg, &mut out, Position::IpHdr, &[0u8; 12], 1);
        assert!(matches!(res, Err(TranslateError::BadIpv6Hdr(_))));

        let res = ipv4_packet(&cfg, &mut out, Position::IpHdr, &[0u8; 12], 1);
        assert!(matches!(res, Err(TranslateError::BadIpv4Hdr(_))));
    }
}
