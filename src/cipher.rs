// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The legacy secret-key/encryption primitive, kept behind a narrow trait
//! per spec.md §9 so a real `derive_cipher_state`/`decrypt_in_place`
//! implementation can be swapped in without touching the listing protocol
//! that uses it. This crate ships only a placeholder that satisfies the
//! trait contract; SBv2 is the one listing protocol that depends on it.

/// Opaque cipher state, ≈261 bytes per spec.md §3, owned by the lister that
/// derived it and dropped with the connection.
pub struct CipherState(Vec<u8>);

impl CipherState {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Derives cipher state and decrypts buffers in place. The real
/// implementation is an external collaborator (spec.md §1); this trait
/// exists so SBv2's decode loop never depends on a concrete algorithm.
pub trait Cipher: Send + Sync {
    fn derive(
        &self,
        secret: &[u8],
        client_challenge: &[u8],
        server_random: &[u8],
        key_material: &[u8],
    ) -> CipherState;

    fn decrypt(&self, state: &mut CipherState, buf: &mut [u8]);

    /// The GOA handshake's `cipher_validate(secret_key, challenge)` call
    /// (spec.md §4.2.1 step 2) — a third external routine alongside
    /// `derive`/`decrypt`, producing the validation string sent back to
    /// the master.
    fn validate(&self, secret: &[u8], challenge: &[u8]) -> String;
}

/// A no-op stand-in used where no real cipher has been wired in: `derive`
/// concatenates its inputs into the opaque state and `decrypt` is the
/// identity transform. Never use this for a real SBv2 deployment; it
/// exists so the listing protocol and its tests can exercise the full
/// handshake without a live external primitive.
#[derive(Default)]
pub struct IdentityCipher;

impl Cipher for IdentityCipher {
    fn derive(
        &self,
        secret: &[u8],
        client_challenge: &[u8],
        server_random: &[u8],
        key_material: &[u8],
    ) -> CipherState {
        let mut state = Vec::with_capacity(secret.len() + client_challenge.len() + server_random.len() + key_material.len());
        state.extend_from_slice(secret);
        state.extend_from_slice(client_challenge);
        state.extend_from_slice(server_random);
        state.extend_from_slice(key_material);
        CipherState(state)
    }

    fn decrypt(&self, _state: &mut CipherState, _buf: &mut [u8]) {}

    fn validate(&self, secret: &[u8], challenge: &[u8]) -> String {
        let mut combined = Vec::with_capacity(secret.len() + challenge.len());
        combined.extend_from_slice(secret);
        combined.extend_from_slice(challenge);
        hex::encode(combined)
    }
}
