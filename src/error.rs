// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Error taxonomy for the sync engine.
//!
//! Four kinds, matching the failure modes a listing protocol or query
//! decoder can hit: a misconfigured engine never starts, a dead transport
//! ends one lister without touching its peers, a malformed frame ends the
//! lister that produced it, and probe timeouts never escape the Monitor at
//! all (they are logged at abandonment, see [`crate::monitor`]).

use thiserror::Error;

/// Errors raised while building or running one engine triple.
///
/// [`EngineError::Transport`] and [`EngineError::Protocol`] are caught by
/// the listing protocol or query engine that produced them and turned into
/// an `end_lister` call; they never unwind past the task boundary.
/// [`EngineError::Configuration`] is fatal and propagates out of
/// [`crate::driver::Driver::run`].
#[derive(Debug, Error)]
pub enum EngineError {
    /// Unknown engine name, invalid params, or a UDP bind failure.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// TCP connect/read/write, HTTP, or DNS failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// Malformed frame, missing sentinel, or unsupported wire feature.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl EngineError {
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }
}
