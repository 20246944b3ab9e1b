// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! End-to-end translation scenarios, driven through [`translate_packet`]
//! and a recording sink the way the daemon drives the real engine.

use clat::api::ClatConfig;
use clat::api::Direction;
use clat::api::Ipv6Addr;
use clat::engine::PacketSink;
use clat::engine::TranslateError;
use clat::engine::checksum::Checksum;
use clat::engine::checksum::HeaderChecksum;
use clat::engine::checksum::ipv4_pseudo_csum;
use clat::engine::checksum::ipv6_pseudo_csum;
use clat::engine::ip4::IP_DF;
use clat::engine::ip4::IP_MF;
use clat::engine::ip4::Ipv4HdrRaw;
use clat::engine::ip6::Ipv6HdrRaw;
use clat::engine::packet::ClatPacket;
use clat::engine::translate_packet;
use std::io;
use zerocopy::AsBytes;

const V4_LOCAL: [u8; 4] = [192, 0, 0, 4];
const V4_REMOTE: [u8; 4] = [203, 0, 113, 1];
const V6_REMOTE: &str = "64:ff9b::cb00:7101";
const V6_LOCAL: &str = "2001:db8:a:b::4";

fn cfg() -> ClatConfig {
    ClatConfig::new(
        "64:ff9b::".parse().unwrap(),
        "192.0.0.4".parse().unwrap(),
        V6_LOCAL.parse().unwrap(),
    )
    .unwrap()
}

#[derive(Default)]
struct RecordingSink {
    tun: Vec<Vec<u8>>,
    raw: Vec<(Ipv6Addr, Vec<u8>)>,
}

impl RecordingSink {
    fn flatten(pkt: &ClatPacket) -> Vec<u8> {
        pkt.segments().flatten().copied().collect()
    }
}

impl PacketSink for RecordingSink {
    fn send_tun(&mut self, pkt: &ClatPacket) -> io::Result<()> {
        self.tun.push(Self::flatten(pkt));
        Ok(())
    }

    fn send_rawv6(
        &mut self,
        dst: Ipv6Addr,
        pkt: &ClatPacket,
    ) -> io::Result<()> {
        self.raw.push((dst, Self::flatten(pkt)));
        Ok(())
    }
}

fn v4_packet(
    proto: u8,
    ttl: u8,
    frag: u16,
    ident: u16,
    ulp: &[u8],
) -> Vec<u8> {
    let mut hdr = Ipv4HdrRaw::default();
    hdr.src = V4_LOCAL;
    hdr.dst = V4_REMOTE;
    hdr.proto = proto;
    hdr.ttl = ttl;
    hdr.frag_and_flags = frag.to_be_bytes();
    hdr.ident = ident.to_be_bytes();
    hdr.set_total_len((Ipv4HdrRaw::SIZE + ulp.len()) as u16);
    hdr.compute_hdr_csum();

    let mut bytes = Vec::from(hdr.as_bytes());
    bytes.extend_from_slice(ulp);
    bytes
}

fn v6_packet(src: &str, dst: &str, next_hdr: u8, ulp: &[u8]) -> Vec<u8> {
    let mut hdr = Ipv6HdrRaw::default();
    hdr.src = src.parse::<Ipv6Addr>().unwrap().bytes();
    hdr.dst = dst.parse::<Ipv6Addr>().unwrap().bytes();
    hdr.next_hdr = next_hdr;
    hdr.hop_limit = 61;
    hdr.set_pay_len(ulp.len() as u16);

    let mut bytes = Vec::from(hdr.as_bytes());
    bytes.extend_from_slice(ulp);
    bytes
}

/// A UDP datagram with a checksum valid under `pseudo` (or absent).
fn udp_datagram(pseudo: Option<Checksum>, payload: &[u8]) -> Vec<u8> {
    let len = (8 + payload.len()) as u16;
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&33333u16.to_be_bytes());
    bytes.extend_from_slice(&53u16.to_be_bytes());
    bytes.extend_from_slice(&len.to_be_bytes());
    bytes.extend_from_slice(&[0, 0]);
    bytes.extend_from_slice(payload);

    if let Some(mut sum) = pseudo {
        sum.add_bytes(&bytes);
        let hc = HeaderChecksum::from(sum).bytes();
        bytes[6..8].copy_from_slice(&hc);
    }

    bytes
}

fn verify(mut pseudo: Checksum, bytes: &[u8]) -> u16 {
    pseudo.add_bytes(bytes);
    pseudo.finalize()
}

fn v4_pseudo(ulp_len: usize, proto: u8) -> Checksum {
    ipv4_pseudo_csum(
        V4_LOCAL.into(),
        V4_REMOTE.into(),
        ulp_len as u16,
        proto,
    )
}

fn v6_pseudo(src: &str, dst: &str, ulp_len: usize, proto: u8) -> Checksum {
    ipv6_pseudo_csum(
        src.parse().unwrap(),
        dst.parse().unwrap(),
        ulp_len as u32,
        proto,
    )
}

#[test]
fn udp_v4_to_v6() {
    let udp = udp_datagram(Some(v4_pseudo(13, 17)), b"hello");
    let pkt = v4_packet(17, 64, IP_DF, 0x1234, &udp);

    let mut sink = RecordingSink::default();
    translate_packet(&cfg(), Direction::ToIpv6, &pkt, &mut sink).unwrap();

    assert!(sink.tun.is_empty());
    let (dst, out) = &sink.raw[0];
    assert_eq!(*dst, V6_REMOTE.parse::<Ipv6Addr>().unwrap());
    assert_eq!(out.len(), 40 + 13);

    let hdr = Ipv6HdrRaw::parse(out).unwrap();
    assert_eq!(hdr.ver_tc_flow[0] >> 4, 6);
    assert_eq!(hdr.next_hdr, 17);
    assert_eq!(hdr.hop_limit, 64);
    assert_eq!(hdr.pay_len(), 13);
    assert_eq!(hdr.src(), V6_LOCAL.parse::<Ipv6Addr>().unwrap());

    // The rewritten datagram must verify under the IPv6 pseudo-header.
    assert_eq!(
        verify(v6_pseudo(V6_LOCAL, V6_REMOTE, 13, 17), &out[40..]),
        0xFFFF
    );
    assert_eq!(&out[40 + 8..], b"hello");
}

#[test]
fn udp_zero_checksum_gains_one() {
    let udp = udp_datagram(None, b"xy");
    let pkt = v4_packet(17, 64, IP_DF, 0, &udp);

    let mut sink = RecordingSink::default();
    translate_packet(&cfg(), Direction::ToIpv6, &pkt, &mut sink).unwrap();

    let (_, out) = &sink.raw[0];
    assert_ne!(&out[46..48], &[0, 0]);
    assert_eq!(
        verify(v6_pseudo(V6_LOCAL, V6_REMOTE, 10, 17), &out[40..]),
        0xFFFF
    );
}

#[test]
fn truncated_udp_writes_nothing() {
    let pkt = v4_packet(17, 64, IP_DF, 0, &[0u8; 5]);

    let mut sink = RecordingSink::default();
    let res = translate_packet(&cfg(), Direction::ToIpv6, &pkt, &mut sink);
    assert!(matches!(res, Err(TranslateError::UlpTruncated { .. })));
    assert!(sink.raw.is_empty() && sink.tun.is_empty());
}

#[test]
fn tcp_v6_to_v4_prepends_tun_header() {
    // Minimal TCP header with a checksum valid under the IPv6
    // pseudo-header.
    let mut tcp = vec![0u8; 20];
    tcp[0..2].copy_from_slice(&443u16.to_be_bytes());
    tcp[2..4].copy_from_slice(&43211u16.to_be_bytes());
    tcp[12] = 5 << 4;
    tcp[13] = 0x10; // ACK
    let mut sum = v6_pseudo(V6_REMOTE, V6_LOCAL, 20, 6);
    sum.add_bytes(&tcp);
    let hc = HeaderChecksum::from(sum).bytes();
    tcp[16..18].copy_from_slice(&hc);

    let pkt = v6_packet(V6_REMOTE, V6_LOCAL, 6, &tcp);
    let mut sink = RecordingSink::default();
    translate_packet(&cfg(), Direction::ToIpv4, &pkt, &mut sink).unwrap();

    assert!(sink.raw.is_empty());
    let out = &sink.tun[0];

    // Tun packet information: no flags, EtherType of IPv4.
    assert_eq!(&out[..4], &[0, 0, 0x08, 0x00]);

    let hdr = Ipv4HdrRaw::parse(&out[4..]).unwrap();
    assert_eq!(hdr.src, V4_REMOTE);
    assert_eq!(hdr.dst, V4_LOCAL);
    assert_eq!(hdr.proto, 6);
    assert_eq!(hdr.ttl, 61);
    assert_eq!(hdr.total_len(), 40);
    assert_eq!(hdr.frag_flags(), IP_DF);
    assert_eq!(Checksum::compute(&out[4..24]).finalize(), 0xFFFF);

    let mut check = ipv4_pseudo_csum(
        V4_REMOTE.into(),
        V4_LOCAL.into(),
        20,
        6,
    );
    check.add_bytes(&out[24..]);
    assert_eq!(check.finalize(), 0xFFFF);
}

#[test]
fn echo_request_v4_to_v6() {
    // ICMPv4 echo request, id 0x0102, seq 7.
    let mut icmp = vec![8u8, 0, 0, 0, 0x01, 0x02, 0, 7];
    icmp.extend_from_slice(b"ping payload");
    let csum = HeaderChecksum::from(Checksum::compute(&icmp)).bytes();
    icmp[2..4].copy_from_slice(&csum);

    let pkt = v4_packet(1, 64, IP_DF, 0, &icmp);
    let mut sink = RecordingSink::default();
    translate_packet(&cfg(), Direction::ToIpv6, &pkt, &mut sink).unwrap();

    let (_, out) = &sink.raw[0];
    let hdr = Ipv6HdrRaw::parse(out).unwrap();
    assert_eq!(hdr.next_hdr, 58);

    assert_eq!(out[40], 128);
    assert_eq!(out[41], 0);
    // id/seq carry over.
    assert_eq!(&out[44..48], &[0x01, 0x02, 0, 7]);
    assert_eq!(&out[48..], b"ping payload");
    assert_eq!(
        verify(v6_pseudo(V6_LOCAL, V6_REMOTE, icmp.len(), 58), &out[40..]),
        0xFFFF
    );
}

#[test]
fn first_fragment_gains_fragment_header() {
    let udp = udp_datagram(Some(v4_pseudo(12, 17)), b"frag");
    let pkt = v4_packet(17, 64, IP_MF, 0xABCD, &udp);

    let mut sink = RecordingSink::default();
    translate_packet(&cfg(), Direction::ToIpv6, &pkt, &mut sink).unwrap();

    let (_, out) = &sink.raw[0];
    let hdr = Ipv6HdrRaw::parse(out).unwrap();
    assert_eq!(hdr.next_hdr, 44);
    assert_eq!(hdr.pay_len(), 8 + 12);

    // Fragment header: UDP next, offset 0, MF, zero-extended ident.
    assert_eq!(&out[40..48], &[17, 0, 0, 1, 0, 0, 0xAB, 0xCD]);
    // First fragment still carries the transport header, so the
    // checksum is adjusted as usual.
    assert_eq!(&out[48 + 8..], b"frag");
}

#[test]
fn non_first_fragment_passes_through() {
    let body = [0x5Au8; 24];
    let pkt = v4_packet(17, 64, IP_MF | 185, 0xABCD, &body);

    let mut sink = RecordingSink::default();
    translate_packet(&cfg(), Direction::ToIpv6, &pkt, &mut sink).unwrap();

    let (_, out) = &sink.raw[0];
    assert_eq!(out.len(), 40 + 8 + 24);
    let off_flags = u16::from_be_bytes([out[42], out[43]]);
    assert_eq!(off_flags, (185 << 3) | 1);
    assert_eq!(&out[48..], &body);
}

#[test]
fn time_exceeded_v6_to_v4_translates_embedded_packet() {
    // The packet we sent, as it appeared on the IPv6 side.
    let udp = udp_datagram(
        Some(v6_pseudo(V6_LOCAL, V6_REMOTE, 12, 17)),
        b"trac",
    );
    let sent = v6_packet(V6_LOCAL, V6_REMOTE, 17, &udp);

    // A router's time exceeded error wrapping it, sourced from an
    // address with no IPv4 mapping.
    let mut icmp6 = vec![3u8, 0, 0, 0, 0, 0, 0, 0];
    icmp6.extend_from_slice(&sent);
    let err = v6_packet("2001:db8:beef::1", V6_LOCAL, 58, &icmp6);

    let mut sink = RecordingSink::default();
    translate_packet(&cfg(), Direction::ToIpv4, &err, &mut sink).unwrap();

    let out = &sink.tun[0];
    let outer = Ipv4HdrRaw::parse(&out[4..]).unwrap();
    assert_eq!(outer.proto, 1);
    assert_eq!(outer.dst, V4_LOCAL);
    // Unmappable router source becomes the traceroute placeholder,
    // carrying the guessed hop count.
    assert_eq!(outer.src, [255, 0, 0, 3]);

    // Time exceeded, with a fresh whole-message checksum.
    assert_eq!(out[24], 11);
    assert_eq!(out[25], 0);
    assert_eq!(Checksum::compute(&out[24..]).finalize(), 0xFFFF);

    // The embedded packet is itself translated back to IPv4.
    let inner = Ipv4HdrRaw::parse(&out[32..]).unwrap();
    assert_eq!(inner.src, V4_LOCAL);
    assert_eq!(inner.dst, V4_REMOTE);
    assert_eq!(inner.proto, 17);
    assert_eq!(&out[out.len() - 4..], b"trac");

    // Outer IPv4 total length covers the whole translated message.
    assert_eq!(usize::from(outer.total_len()) + 4, out.len());
}

#[test]
fn packet_too_big_v6_to_v4_halves_header_overhead() {
    let udp = udp_datagram(
        Some(v6_pseudo(V6_LOCAL, V6_REMOTE, 12, 17)),
        b"mtu!",
    );
    let sent = v6_packet(V6_LOCAL, V6_REMOTE, 17, &udp);

    let mut icmp6 = vec![2u8, 0, 0, 0];
    icmp6.extend_from_slice(&1500u32.to_be_bytes());
    icmp6.extend_from_slice(&sent);
    let err = v6_packet("64:ff9b::cb00:7101", V6_LOCAL, 58, &icmp6);

    let mut sink = RecordingSink::default();
    translate_packet(&cfg(), Direction::ToIpv4, &err, &mut sink).unwrap();

    let out = &sink.tun[0];
    // Fragmentation needed, MTU shrunk by the IPv6/IPv4 header delta.
    assert_eq!(out[24], 3);
    assert_eq!(out[25], 4);
    assert_eq!(&out[28..32], &[0, 0, 0x05, 0xC8]); // 1480
    assert_eq!(Checksum::compute(&out[24..]).finalize(), 0xFFFF);
}

#[test]
fn time_exceeded_v4_to_v6_has_valid_outer_checksum() {
    // The embedded packet: a TCP segment the remote sent us, as it
    // looked on the IPv4 side.
    let mut tcp = vec![0u8; 20];
    tcp[0..2].copy_from_slice(&443u16.to_be_bytes());
    tcp[2..4].copy_from_slice(&43211u16.to_be_bytes());
    tcp[12] = 5 << 4;
    let mut sum = ipv4_pseudo_csum(
        V4_REMOTE.into(),
        V4_LOCAL.into(),
        20,
        6,
    );
    sum.add_bytes(&tcp);
    let hc = HeaderChecksum::from(sum).bytes();
    tcp[16..18].copy_from_slice(&hc);

    let mut embedded_hdr = Ipv4HdrRaw::default();
    embedded_hdr.src = V4_REMOTE;
    embedded_hdr.dst = V4_LOCAL;
    embedded_hdr.proto = 6;
    embedded_hdr.set_total_len(40);
    embedded_hdr.compute_hdr_csum();
    let mut embedded = Vec::from(embedded_hdr.as_bytes());
    embedded.extend_from_slice(&tcp);

    let mut icmp = vec![11u8, 0, 0, 0, 0, 0, 0, 0];
    icmp.extend_from_slice(&embedded);
    let csum = HeaderChecksum::from(Checksum::compute(&icmp)).bytes();
    icmp[2..4].copy_from_slice(&csum);

    let pkt = v4_packet(1, 64, 0, 0, &icmp);
    let mut sink = RecordingSink::default();
    translate_packet(&cfg(), Direction::ToIpv6, &pkt, &mut sink).unwrap();

    let (_, out) = &sink.raw[0];
    // Outer: 40 IPv6 + 8 ICMPv6, then the embedded packet grown by
    // its own 20 header bytes.
    assert_eq!(out.len(), 40 + 8 + 40 + 20);
    assert_eq!(out[40], 3); // time exceeded
    assert_eq!(out[41], 0);

    // Inner IPv6 header reverses our direction.
    let inner = Ipv6HdrRaw::parse(&out[48..]).unwrap();
    assert_eq!(inner.src(), V6_REMOTE.parse::<Ipv6Addr>().unwrap());
    assert_eq!(inner.dst(), V6_LOCAL.parse::<Ipv6Addr>().unwrap());
    assert_eq!(inner.next_hdr, 6);
    assert_eq!(inner.pay_len(), 20);

    // Inner TCP checksum verifies under the inner pseudo-header.
    assert_eq!(
        verify(v6_pseudo(V6_REMOTE, V6_LOCAL, 20, 6), &out[88..]),
        0xFFFF
    );

    // The outer ICMPv6 checksum covers the whole translated message,
    // 20 bytes longer than the original.
    let outer = Ipv6HdrRaw::parse(out).unwrap();
    assert_eq!(usize::from(outer.pay_len()), out.len() - 40);
    assert_eq!(
        verify(
            v6_pseudo(V6_LOCAL, V6_REMOTE, out.len() - 40, 58),
            &out[40..]
        ),
        0xFFFF
    );
}

#[test]
fn v6_fragment_folds_back_into_v4_fields() {
    // Non-first fragment: fragment header, then opaque payload.
    let mut ulp = vec![6u8, 0];
    ulp.extend_from_slice(&((90u16 << 3) | 1).to_be_bytes());
    ulp.extend_from_slice(&0x5678u32.to_be_bytes());
    ulp.extend_from_slice(&[0xA5; 32]);

    let pkt = v6_packet(V6_REMOTE, V6_LOCAL, 44, &ulp);
    let mut sink = RecordingSink::default();
    translate_packet(&cfg(), Direction::ToIpv4, &pkt, &mut sink).unwrap();

    let out = &sink.tun[0];
    let hdr = Ipv4HdrRaw::parse(&out[4..]).unwrap();
    assert_eq!(hdr.proto, 6);
    assert_eq!(hdr.frag_flags(), IP_MF | 90);
    assert_eq!(hdr.ident, 0x5678u16.to_be_bytes());
    assert_eq!(hdr.total_len(), 20 + 32);
    // No transport translation on a non-first fragment.
    assert_eq!(&out[24..], &[0xA5; 32]);
}

#[test]
fn udp_round_trip_preserves_datagram() {
    let udp = udp_datagram(Some(v4_pseudo(17, 17)), b"boomerang");
    let pkt = v4_packet(17, 64, IP_DF, 0x4321, &udp);

    let mut sink = RecordingSink::default();
    translate_packet(&cfg(), Direction::ToIpv6, &pkt, &mut sink).unwrap();
    let (_, v6) = sink.raw.remove(0);

    translate_packet(&cfg(), Direction::ToIpv4, &v6, &mut sink).unwrap();
    let back = &sink.tun[0][4..];

    let hdr = Ipv4HdrRaw::parse(back).unwrap();
    assert_eq!(hdr.src, V4_LOCAL);
    assert_eq!(hdr.dst, V4_REMOTE);
    assert_eq!(hdr.proto, 17);
    assert_eq!(hdr.total_len(), 20 + 17);

    // The datagram comes back byte-identical, checksum included.
    assert_eq!(&back[20..], &udp[..]);
}
