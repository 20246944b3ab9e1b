// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! The translation engine.

pub mod checksum;
pub mod icmp;
pub mod ip4;
pub mod ip6;
pub mod nat;
pub mod packet;
pub mod tcp;
pub mod translate;
pub mod udp;

pub use translate::PacketSink;
pub use translate::TranslateError;
pub use translate::translate_packet;
