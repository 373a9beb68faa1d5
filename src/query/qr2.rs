// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! QR2 ("QueryReporting v2") decoder, spec.md §4.3.2: fixed 11-byte probe,
//! reply skips a 5-byte header then reads NUL-terminated key/value pairs
//! until an empty key.
//!
//! `prequery_ip_verify` is accepted in configuration and reserved per
//! spec.md §9 but deliberately has no behavior here — the upstream
//! declares the field and never wires it to anything either.

use std::net::SocketAddrV4;

use super::{DecodedReply, QueryProtocol};
use crate::{endpoint::Endpoint, property_map::PropertyMap, wire::Reader};

const PROBE: [u8; 11] = [0xFE, 0xFD, 0, 0, 0, 0, 0, 0xFF, 0, 0, 0];

pub struct Qr2Query;

impl QueryProtocol for Qr2Query {
    fn probe_datagram(&self, _target: Endpoint) -> Vec<u8> {
        PROBE.to_vec()
    }

    fn decode_reply(&self, source: SocketAddrV4, buf: &[u8]) -> Option<DecodedReply> {
        let mut r = Reader::new(buf);
        r.skip(5).ok()?;

        let mut props = PropertyMap::new();
        loop {
            let key = r.read_cstr().ok()?;
            if key.is_empty() {
                break;
            }
            let value = r.read_cstr().ok()?;
            props.insert(key, value);
        }

        Some(DecodedReply { endpoint: Endpoint::new(*source.ip(), source.port()), props })
    }
}
