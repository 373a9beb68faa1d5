// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Encrypted binary listing ("SBv2"/"QR2 master", spec.md §4.2.2). The one
//! listing protocol that negotiates a stream cipher mid-conversation; every
//! read past the key-exchange header goes through [`Cipher::decrypt`]
//! before use.
//!
//! `waitForDataOfLen`'s read-slice bug noted in spec.md §9 is fixed here by
//! construction: [`read_exact_decrypted`] always reads into
//! `buf[total_read..total_read + remaining]`, never just `buf[..remaining]`.

use std::sync::Arc;
use std::net::Ipv4Addr;

use bitflags::bitflags;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::CONNECT_TIMEOUT;
use crate::{
    cipher::{Cipher, CipherState},
    endpoint::Endpoint,
    error::EngineError,
    monitor::{ListerId, Monitor},
    query::QueryRunner,
};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct RecordFlags: u8 {
        const PRIVATE_IP = 2;
        const ICMP_IP = 8;
        const NONSTANDARD_PORT = 16;
        const NONSTANDARD_PRIVATE_PORT = 32;
        const HAS_KEYS = 64;
        const HAS_FULL_RULES = 128;
    }
}

#[derive(Debug, Clone)]
pub struct Sbv2ListerConfig {
    pub address: String,
    pub gamename: String,
    pub secretkey: String,
    pub query_gamename: String,
    pub fields: Vec<String>,
}

pub async fn run(
    cfg: Sbv2ListerConfig,
    lister_id: ListerId,
    monitor: Arc<Monitor>,
    query: Arc<QueryRunner>,
    cipher: Arc<dyn Cipher>,
    cancel: CancellationToken,
) {
    if let Err(e) = run_inner(&cfg, lister_id, &monitor, &query, cipher.as_ref(), &cancel).await {
        warn!(lister = "sbv2", address = %cfg.address, error = %e, "listing ended with error");
    }
    monitor.end_lister(lister_id).await;
}

async fn connect_and_timeout(address: &str, cancel: &CancellationToken) -> anyhow::Result<TcpStream> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => anyhow::bail!("cancelled before connect"),
        res = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(address)) => {
            let stream = res
                .map_err(|_| EngineError::transport(format!("connect to {address} timed out")))?
                .map_err(|e| EngineError::transport(format!("connect to {address}: {e}")))?;
            Ok(stream)
        }
    }
}

async fn run_inner(
    cfg: &Sbv2ListerConfig,
    lister_id: ListerId,
    monitor: &Monitor,
    query: &QueryRunner,
    cipher: &dyn Cipher,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let mut stream = connect_and_timeout(&cfg.address, cancel).await?;

    let request = build_request(cfg);
    let mut framed = Vec::with_capacity(2 + request.len());
    framed.extend_from_slice(&(request.len() as u16).to_be_bytes());
    framed.extend_from_slice(&request);
    stream
        .write_all(&framed)
        .await
        .map_err(|e| EngineError::transport(format!("write request: {e}")))?;

    let client_challenge = b"12345678";
    let crypt_len_xor = read_u8(&mut stream, cancel).await?;
    let crypt_len = crypt_len_xor ^ 0xEC;
    let server_random = read_n(&mut stream, crypt_len as usize, cancel).await?;
    let key_len_xor = read_u8(&mut stream, cancel).await?;
    let key_len = key_len_xor ^ 0xEA;
    let key_material = read_n(&mut stream, key_len as usize, cancel).await?;

    let mut state = cipher.derive(cfg.secretkey.as_bytes(), client_challenge, &server_random, &key_material);

    let _public_ip = read_decrypted(&mut stream, &mut state, cipher, 4, cancel).await?;
    let default_port = u16::from_be_bytes(
        read_decrypted(&mut stream, &mut state, cipher, 2, cancel).await?.try_into().expect("2 bytes"),
    );
    let num_fields = read_decrypted(&mut stream, &mut state, cipher, 1, cancel).await?[0];
    let mut field_types = Vec::with_capacity(num_fields as usize);
    for _ in 0..num_fields {
        let field_type = read_decrypted(&mut stream, &mut state, cipher, 1, cancel).await?[0];
        let _name = read_cstr_decrypted(&mut stream, &mut state, cipher, cancel).await?;
        field_types.push(field_type);
    }

    let num_popular = read_decrypted(&mut stream, &mut state, cipher, 1, cancel).await?[0];
    if num_popular != 0 {
        return Err(EngineError::protocol("non-zero popular-server count is unsupported").into());
    }

    loop {
        let flags_byte = read_decrypted(&mut stream, &mut state, cipher, 1, cancel).await?[0];
        let flags = RecordFlags::from_bits_truncate(flags_byte);
        let ip_bytes = read_decrypted(&mut stream, &mut state, cipher, 4, cancel).await?;
        if ip_bytes == [0xFF, 0xFF, 0xFF, 0xFF] {
            return Ok(());
        }

        let port = if flags.contains(RecordFlags::NONSTANDARD_PORT) {
            u16::from_be_bytes(read_decrypted(&mut stream, &mut state, cipher, 2, cancel).await?.try_into().expect("2 bytes"))
        } else {
            default_port
        };

        if flags.contains(RecordFlags::PRIVATE_IP) {
            read_decrypted(&mut stream, &mut state, cipher, 4, cancel).await?;
        }
        if flags.contains(RecordFlags::NONSTANDARD_PRIVATE_PORT) {
            read_decrypted(&mut stream, &mut state, cipher, 2, cancel).await?;
        }
        if flags.contains(RecordFlags::ICMP_IP) {
            read_decrypted(&mut stream, &mut state, cipher, 4, cancel).await?;
        }
        if flags.contains(RecordFlags::HAS_KEYS) {
            for &field_type in &field_types {
                match field_type {
                    0 => {
                        let marker = read_decrypted(&mut stream, &mut state, cipher, 1, cancel).await?[0];
                        if marker != 0xFF {
                            return Err(EngineError::protocol(format!(
                                "expected 0xFF popular-index marker, got {marker:#x}"
                            ))
                            .into());
                        }
                        read_cstr_decrypted(&mut stream, &mut state, cipher, cancel).await?;
                    }
                    1 => {
                        read_decrypted(&mut stream, &mut state, cipher, 1, cancel).await?;
                    }
                    2 => {
                        read_decrypted(&mut stream, &mut state, cipher, 2, cancel).await?;
                    }
                    other => return Err(EngineError::protocol(format!("unknown field type {other}")).into()),
                }
            }
        }
        if flags.contains(RecordFlags::HAS_FULL_RULES) {
            loop {
                let key = read_cstr_decrypted(&mut stream, &mut state, cipher, cancel).await?;
                if key.is_empty() {
                    break;
                }
                read_cstr_decrypted(&mut stream, &mut state, cipher, cancel).await?;
            }
        }

        let ip = Ipv4Addr::new(ip_bytes[0], ip_bytes[1], ip_bytes[2], ip_bytes[3]);
        let ep = Endpoint::new(ip, port);
        if monitor.begin_probe(lister_id, query.id(), ep).await {
            let _ = query.send(ep).await;
        }
    }
}

fn build_request(cfg: &Sbv2ListerConfig) -> Vec<u8> {
    let mut body = Vec::new();
    body.push(0); // msg_id
    body.push(1); // proto_ver
    body.push(3); // encoding
    body.extend_from_slice(&0u32.to_be_bytes()); // game_version
    body.extend_from_slice(cfg.query_gamename.as_bytes());
    body.push(0);
    body.extend_from_slice(cfg.gamename.as_bytes());
    body.push(0);
    body.extend_from_slice(b"12345678");
    body.push(0); // filter byte
    body.extend_from_slice(cfg.fields.join("\\").as_bytes());
    body.push(0);
    body.extend_from_slice(&1u32.to_be_bytes()); // options
    body
}

async fn read_u8(stream: &mut TcpStream, cancel: &CancellationToken) -> anyhow::Result<u8> {
    Ok(read_n(stream, 1, cancel).await?[0])
}

async fn read_n(stream: &mut TcpStream, len: usize, cancel: &CancellationToken) -> anyhow::Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    let mut total_read = 0;
    while total_read < len {
        let remaining = len - total_read;
        let n = tokio::select! {
            biased;
            () = cancel.cancelled() => anyhow::bail!("cancelled"),
            n = stream.read(&mut buf[total_read..total_read + remaining]) => {
                n.map_err(|e| EngineError::transport(format!("read failed: {e}")))?
            }
        };
        if n == 0 {
            return Err(EngineError::transport("connection closed mid-frame").into());
        }
        total_read += n;
    }
    Ok(buf)
}

async fn read_decrypted(
    stream: &mut TcpStream,
    state: &mut CipherState,
    cipher: &dyn Cipher,
    len: usize,
    cancel: &CancellationToken,
) -> anyhow::Result<Vec<u8>> {
    let mut buf = read_n(stream, len, cancel).await?;
    cipher.decrypt(state, &mut buf);
    Ok(buf)
}

async fn read_cstr_decrypted(
    stream: &mut TcpStream,
    state: &mut CipherState,
    cipher: &dyn Cipher,
    cancel: &CancellationToken,
) -> anyhow::Result<String> {
    let mut bytes = Vec::new();
    loop {
        let b = read_decrypted(stream, state, cipher, 1, cancel).await?[0];
        if b == 0 {
            break;
        }
        bytes.push(b);
    }
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
