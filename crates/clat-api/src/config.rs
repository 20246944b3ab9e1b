// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Translator configuration.
//!
//! A [`ClatConfig`] is loaded once at startup and passed by shared
//! reference into every translation entry point. Nothing in the packet
//! path mutates it, so concurrent translation over one config is safe.

use crate::ip::Ipv4Addr;
use crate::ip::Ipv6Addr;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

/// The number of leading bytes of the plat prefix that are significant.
/// The prefix is a /96: the remaining 4 bytes embed an IPv4 address.
pub const PLAT_PREFIX_BYTES: usize = 12;

#[derive(Clone, Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("{field}: {msg}")]
    BadAddress { field: &'static str, msg: String },

    #[error("plat prefix {0} is not a /96 (low 32 bits must be zero)")]
    BadPrefix(Ipv6Addr),
}

/// Static configuration for a CLAT instance.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ClatConfig {
    /// The NAT64 (plat-side) /96 prefix used to embed IPv4 addresses
    /// in IPv6.
    pub plat_prefix: Ipv6Addr,

    /// The device's IPv4 address, as seen by local IPv4 applications.
    pub ipv4_local_subnet: Ipv4Addr,

    /// The IPv6 address that represents `ipv4_local_subnet` on the
    /// IPv6 network.
    pub ipv6_local_subnet: Ipv6Addr,
}

impl ClatConfig {
    /// Build a config, verifying the plat prefix really is a /96.
    pub fn new(
        plat_prefix: Ipv6Addr,
        ipv4_local_subnet: Ipv4Addr,
        ipv6_local_subnet: Ipv6Addr,
    ) -> Result<Self, ConfigError> {
        if plat_prefix.bytes()[PLAT_PREFIX_BYTES..] != [0; 4] {
            return Err(ConfigError::BadPrefix(plat_prefix));
        }

        Ok(Self { plat_prefix, ipv4_local_subnet, ipv6_local_subnet })
    }

    /// Load a config from TOML text, e.g.:
    ///
    /// ```toml
    /// plat_prefix = "64:ff9b::"
    /// ipv4_local_subnet = "192.0.0.4"
    /// ipv6_local_subnet = "2001:db8:1:2:3:4:5:6"
    /// ```
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        #[derive(Deserialize)]
        struct Raw {
            plat_prefix: String,
            ipv4_local_subnet: String,
            ipv6_local_subnet: String,
        }

        let raw: Raw = toml::from_str(text)
            .map_err(|e| ConfigError::Parse(e.to_string()))?;

        let plat_prefix = raw.plat_prefix.parse().map_err(|msg| {
            ConfigError::BadAddress { field: "plat_prefix", msg }
        })?;
        let ipv4_local_subnet =
            raw.ipv4_local_subnet.parse().map_err(|msg| {
                ConfigError::BadAddress { field: "ipv4_local_subnet", msg }
            })?;
        let ipv6_local_subnet =
            raw.ipv6_local_subnet.parse().map_err(|msg| {
                ConfigError::BadAddress { field: "ipv6_local_subnet", msg }
            })?;

        Self::new(plat_prefix, ipv4_local_subnet, ipv6_local_subnet)
    }
}
