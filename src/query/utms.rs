// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Unreal query decoder, spec.md §4.3.4: little-endian probe, compact-int
//! and compact-string reply fields, and a one-off port convention — the
//! result is reported under the *game* port, one less than the UDP query
//! port the datagram actually arrived on.

use std::net::SocketAddrV4;

use super::{compact::decode_compact_string, DecodedReply, QueryProtocol};
use crate::{endpoint::Endpoint, property_map::PropertyMap, wire::Reader};

const UT2004_VERSION: u32 = 128;

pub struct UtmsQuery {
    pub version_id: u32,
}

impl QueryProtocol for UtmsQuery {
    fn probe_datagram(&self, _target: Endpoint) -> Vec<u8> {
        let mut out = Vec::with_capacity(5);
        out.extend_from_slice(&self.version_id.to_be_bytes());
        out.push(0x00);
        out
    }

    fn decode_reply(&self, source: SocketAddrV4, buf: &[u8]) -> Option<DecodedReply> {
        let mut r = Reader::new(buf);

        let version = r.read_u32_le().ok()?;
        if version != self.version_id {
            return None;
        }
        let query_type = r.read_u8().ok()?;
        if query_type != 0 {
            return None;
        }
        r.skip(4).ok()?; // server id
        let _address = decode_compact_string(&mut r).ok()?;
        r.skip(4).ok()?; // game port
        r.skip(4).ok()?; // query port

        let hostname = decode_compact_string(&mut r).ok()?;
        let mapname = decode_compact_string(&mut r).ok()?;
        let gametype = decode_compact_string(&mut r).ok()?;
        let numplayers = r.read_u32_le().ok()?;
        let maxplayers = r.read_u32_le().ok()?;
        r.skip(4).ok()?;

        let botlevel = if version == UT2004_VERSION {
            r.skip(4).ok()?;
            Some(decode_compact_string(&mut r).ok()?)
        } else {
            None
        };

        let mut props = PropertyMap::new();
        props.insert("hostname", hostname);
        props.insert("mapname", mapname);
        props.insert("gametype", gametype);
        props.insert("numplayers", numplayers.to_string());
        props.insert("maxplayers", maxplayers.to_string());
        props.insert("currentplayers", numplayers.to_string());
        props.insert("freespace", if numplayers < maxplayers { "1" } else { "0" });
        props.insert("standard", "true");
        props.insert("nomutators", "false");
        if let Some(botlevel) = botlevel {
            props.insert("botlevel", botlevel);
        }

        let game_port = source.port().saturating_sub(1);
        Some(DecodedReply {
            endpoint: Endpoint::new(*source.ip(), game_port),
            props,
        })
    }
}
