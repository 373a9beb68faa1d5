// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::net::SocketAddrV4;

use dashmap::DashMap;

use super::Sink;
use crate::{endpoint::Endpoint, property_map::PropertyMap};

/// A `DashMap`-backed sink for integration tests and local/manual runs.
///
/// Its keying scheme (one entry set per game name) mirrors the
/// "injected-server" set the original `OpenSpyRedisOutputHandler` keeps in
/// Redis, scoped down to an in-process map: it is not a substitute for a
/// real key/value store and carries no TTL or persistence.
#[derive(Default)]
pub struct InMemorySink {
    published: DashMap<String, Vec<(Endpoint, PropertyMap)>>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn properties_for(&self, gamename: &str, endpoint: Endpoint) -> Option<PropertyMap> {
        self.published.get(gamename).and_then(|entries| {
            entries
                .iter()
                .find(|(ep, _)| *ep == endpoint)
                .map(|(_, props)| props.clone())
        })
    }
}

impl Sink for InMemorySink {
    fn publish(&self, source: SocketAddrV4, gamename: &str, props: PropertyMap) {
        let endpoint = Endpoint::new(*source.ip(), source.port());
        let mut entries = self.published.entry(gamename.to_string()).or_default();
        if let Some(existing) = entries.iter_mut().find(|(ep, _)| *ep == endpoint) {
            existing.1 = props;
        } else {
            entries.push((endpoint, props));
        }
    }

    fn refresh_candidates(&self, gamename: &str) -> Vec<Endpoint> {
        self.published
            .get(gamename)
            .map(|entries| entries.iter().map(|(ep, _)| *ep).collect())
            .unwrap_or_default()
    }
}
