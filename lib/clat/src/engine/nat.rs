// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Stateless NAT64 address mapping.
//!
//! IPv4 addresses embed losslessly in the configured plat /96 prefix.
//! The device's own IPv4 address is the one exception: it maps to the
//! separately configured local IPv6 address rather than through the
//! prefix, so that locally originated traffic carries the address the
//! IPv6 network actually routes to us.

use clat_api::ClatConfig;
use clat_api::Ipv4Addr;
use clat_api::Ipv6Addr;
use clat_api::config::PLAT_PREFIX_BYTES;

/// Return `true` iff the top 96 bits of `addr` equal the configured
/// plat prefix.
pub fn is_in_plat_subnet(cfg: &ClatConfig, addr: Ipv6Addr) -> bool {
    addr.bytes()[..PLAT_PREFIX_BYTES]
        == cfg.plat_prefix.bytes()[..PLAT_PREFIX_BYTES]
}

/// Map an IPv6 address back to IPv4.
///
/// Returns `None` for third-party IPv6 addresses with no IPv4
/// equivalent; the caller decides how to cope (see
/// [`super::ip4::fill_ip_header`]).
pub fn ipv6_to_ipv4(cfg: &ClatConfig, addr: Ipv6Addr) -> Option<Ipv4Addr> {
    if is_in_plat_subnet(cfg, addr) {
        let b = addr.bytes();
        return Some(Ipv4Addr::from([b[12], b[13], b[14], b[15]]));
    }

    if addr == cfg.ipv6_local_subnet {
        return Some(cfg.ipv4_local_subnet);
    }

    None
}

/// Map an IPv4 address to IPv6. Total by construction: anything that is
/// not our own address goes through the plat prefix.
pub fn ipv4_to_ipv6(cfg: &ClatConfig, addr: Ipv4Addr) -> Ipv6Addr {
    if addr == cfg.ipv4_local_subnet {
        return cfg.ipv6_local_subnet;
    }

    let mut bytes = cfg.plat_prefix.bytes();
    bytes[PLAT_PREFIX_BYTES..].copy_from_slice(&addr.bytes());
    Ipv6Addr::from(bytes)
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

    #[test]
    fn plat_subnet_membership() {
        let cfg = test_config();
        assert!(is_in_plat_subnet(&cfg, "64:ff9b::c000:201".parse().unwrap()));
        assert!(!is_in_plat_subnet(&cfg, "2001:db8::1".parse().unwrap()));
        assert!(!is_in_plat_subnet(&cfg, cfg.ipv6_local_subnet));
    }

    #[test]
    fn v4_to_v6_round_trip_exact() {
        let cfg = test_config();

        for addr in
            ["0.0.0.0", "192.0.2.1", "255.255.255.255", "192.0.0.4", "8.8.8.8"]
        {
            let v4: Ipv4Addr = addr.parse().unwrap();
            assert_eq!(
                ipv6_to_ipv4(&cfg, ipv4_to_ipv6(&cfg, v4)),
                Some(v4),
                "round trip failed for {addr}"
            );
        }
    }

    #[test]
    fn plat_v6_round_trip_exact() {
        let cfg = test_config();

        let v6: Ipv6Addr = "64:ff9b::cb00:7101".parse().unwrap();
        let v4 = ipv6_to_ipv4(&cfg, v6).unwrap();
        assert_eq!(v4, "203.0.113.1".parse::<Ipv4Addr>().unwrap());
        assert_eq!(ipv4_to_ipv6(&cfg, v4), v6);
    }

    #[test]
    fn local_subnet_bypasses_prefix() {
        let cfg = test_config();

        assert_eq!(
            ipv4_to_ipv6(&cfg, cfg.ipv4_local_subnet),
            cfg.ipv6_local_subnet
        );
        assert_eq!(
            ipv6_to_ipv4(&cfg, cfg.ipv6_local_subnet),
            Some(cfg.ipv4_local_subnet)
        );
    }

    #[test]
    fn third_party_v6_has_no_mapping() {
        let cfg = test_config();
        assert_eq!(ipv6_to_ipv4(&cfg, "2001:db8::99".parse().unwrap()), None);
    }
}
