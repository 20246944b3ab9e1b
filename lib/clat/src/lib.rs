// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Stateless IPv4/IPv6 packet translation (RFC 6145) for CLAT.
//!
//! This crate implements the packet-transformation half of a 464XLAT
//! customer-side translator: given a raw IPv4 or IPv6 packet, produce
//! the equivalent packet in the other address family as an ordered set
//! of header segments plus a borrowed payload, ready for transmission.
//! Socket and tun-device plumbing live in the embedding daemon, behind
//! the [`engine::translate::PacketSink`] trait.

#![deny(unreachable_patterns)]
#![deny(unused_must_use)]

pub mod engine;

pub use clat_api as api;
