// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! API types shared between the CLAT translation engine and any daemon
//! embedding it: addresses, translation direction, and configuration.

#![deny(unreachable_patterns)]
#![deny(unused_must_use)]

use core::fmt;
use core::fmt::Display;
use serde::Deserialize;
use serde::Serialize;

pub mod config;
pub mod ip;

pub use config::*;
pub use ip::*;

/// The direction of a translation.
///
/// Direction is named for the address family of the packet we produce:
/// `ToIpv6` consumes an IPv4 packet from the tun device and emits an
/// IPv6 packet for the network; `ToIpv4` is the reverse path.
#[derive(
    Clone, Copy, Debug, Deserialize, Eq, Ord, PartialEq, PartialOrd, Serialize,
)]
pub enum Direction {
    ToIpv6 = 1,
    ToIpv4 = 2,
}

impl core::str::FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> core::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "to-ipv6" => Ok(Direction::ToIpv6),
            "to-ipv4" => Ok(Direction::ToIpv4),
            _ => Err(format!("invalid direction: {}", s)),
        }
    }
}

impl Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let dirstr = match self {
            Direction::ToIpv6 => "TO-IPV6",
            Direction::ToIpv4 => "TO-IPV4",
        };

        write!(f, "{}", dirstr)
    }
}
