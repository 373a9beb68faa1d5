// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Tagged-text query decoder ("GOA query", spec.md §4.3.1): the probe is
//! the literal `\status\`; the reply is backslash-delimited ASCII fields,
//! pairs starting at index 1, accumulation stopped at the `final` or
//! `queryid` sentinel.

use std::net::SocketAddrV4;

use super::{DecodedReply, QueryProtocol};
use crate::{endpoint::Endpoint, property_map::PropertyMap};

pub struct GoaQuery;

impl QueryProtocol for GoaQuery {
    fn probe_datagram(&self, _target: Endpoint) -> Vec<u8> {
        b"\\status\\".to_vec()
    }

    fn decode_reply(&self, source: SocketAddrV4, buf: &[u8]) -> Option<DecodedReply> {
        let text = String::from_utf8_lossy(buf);
        let fields: Vec<&str> = text.split('\\').collect();

        let mut props = PropertyMap::new();
        let mut i = 1;
        while i + 1 < fields.len() {
            let key = fields[i];
            let value = fields[i + 1];
            if key == "final" || key == "queryid" {
                break;
            }
            props.insert(key, value);
            i += 2;
        }

        Some(DecodedReply { endpoint: Endpoint::new(*source.ip(), source.port()), props })
    }
}
