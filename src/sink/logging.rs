// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::net::SocketAddrV4;

use tracing::info;

use super::Sink;
use crate::{endpoint::Endpoint, property_map::PropertyMap};

/// Default sink: records every publish through `tracing` instead of a real
/// key/value store. Keeps the crate runnable and testable without wiring
/// up `OSRedisOutput`'s concrete backend, which stays out of scope
/// (spec.md §1).
#[derive(Default)]
pub struct LoggingSink;

impl Sink for LoggingSink {
    fn publish(&self, source: SocketAddrV4, gamename: &str, props: PropertyMap) {
        info!(
            %source,
            gamename,
            properties = ?props.iter().collect::<Vec<_>>(),
            "published server"
        );
    }

    fn refresh_candidates(&self, gamename: &str) -> Vec<Endpoint> {
        info!(gamename, "refresh requested but LoggingSink retains no state");
        Vec::new()
    }
}
