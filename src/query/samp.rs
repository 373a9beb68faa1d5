// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! SAMP ("San Andreas Multiplayer") decoder, spec.md §4.3.3: little-endian
//! throughout, `hostport` synthesized from the UDP datagram's source port
//! rather than anything in the payload.

use std::net::SocketAddrV4;

use super::{DecodedReply, QueryProtocol};
use crate::{endpoint::Endpoint, property_map::PropertyMap, wire::Reader};

const MAGIC: &[u8; 4] = b"SAMP";
/// `SAMP` + 4-byte IP + 2-byte LE port + 1-byte opcode, mirrored back by
/// the server ahead of the actual payload.
const HEADER_LEN: usize = 11;

pub struct SampQuery;

impl QueryProtocol for SampQuery {
    fn probe_datagram(&self, target: Endpoint) -> Vec<u8> {
        let mut out = Vec::with_capacity(11);
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&target.ip.octets());
        out.extend_from_slice(&target.port.to_le_bytes());
        out.push(b'i');
        out
    }

    fn decode_reply(&self, source: SocketAddrV4, buf: &[u8]) -> Option<DecodedReply> {
        if buf.len() < 11 || &buf[..4] != MAGIC {
            return None;
        }

        let mut r = Reader::new(buf);
        r.skip(HEADER_LEN).ok()?;

        let password_byte = r.read_u8().ok()?;
        let numplayers = r.read_u16_le().ok()?;
        let maxplayers = r.read_u16_le().ok()?;
        let hostname = r.read_len_prefixed_string_le().ok()?;
        let gamemode = r.read_len_prefixed_string_le().ok()?;
        let gamevariant = r.read_len_prefixed_string_le().ok()?;

        let mut props = PropertyMap::new();
        props.insert("password", if password_byte == 0 { "0" } else { "1" });
        props.insert("numplayers", numplayers.to_string());
        props.insert("maxplayers", maxplayers.to_string());
        props.insert("hostname", hostname);
        props.insert("gamemode", gamemode);
        props.insert("gamevariant", gamevariant);
        props.insert("hostport", source.port().to_string());

        Some(DecodedReply { endpoint: Endpoint::new(*source.ip(), source.port()), props })
    }
}
