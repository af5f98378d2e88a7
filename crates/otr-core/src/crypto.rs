// Copyright (c) 2026 Oleksandr Melnychenko, Ukraine
// Ecliptix Security — OTR Messaging Protocol
// Licensed under the MIT License

//! The symmetric primitives OTR composes.
//!
//! OTR v2/v3 is deliberately old-school: SHA-256 drives the AKE key schedule
//! and every SMP hash, SHA-1 drives the data-message key schedule and
//! fingerprints, MACs are HMAC truncated to 160 bits on the wire, and all
//! encryption is AES-128 in counter mode with an explicit upper counter
//! half. These wrappers pin the exact constructions so the state machines
//! above never touch a digest object directly.

use aes::Aes128;
use ctr::cipher::{KeyIvInit, StreamCipher};
use hmac::{Hmac, Mac};
use sha1::{Digest, Sha1};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::types::{AES_KEY_LENGTH, COUNTER_LENGTH};

type Aes128Ctr = ctr::Ctr128BE<Aes128>;
type HmacSha1 = Hmac<Sha1>;
type HmacSha256 = Hmac<Sha256>;

pub fn sha1(data: &[u8]) -> [u8; 20] {
    let mut h = Sha1::new();
    h.update(data);
    h.finalize().into()
}

pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut h = Sha256::new();
    h.update(data);
    h.finalize().into()
}

/// `SHA-1(prefix ‖ data)`, the `h1` function of the data-message key
/// schedule.
pub fn sha1_prefixed(prefix: u8, data: &[u8]) -> [u8; 20] {
    let mut h = Sha1::new();
    h.update([prefix]);
    h.update(data);
    h.finalize().into()
}

/// `SHA-256(prefix ‖ data)`, the `h2` function of the AKE key schedule and
/// the SMP Fiat–Shamir hash.
pub fn sha256_prefixed(prefix: u8, data: &[u8]) -> [u8; 32] {
    let mut h = Sha256::new();
    h.update([prefix]);
    h.update(data);
    h.finalize().into()
}

/// `SHA-256(prefix ‖ a ‖ b)`, the two-commitment variant of the SMP hash.
pub fn sha256_prefixed2(prefix: u8, a: &[u8], b: &[u8]) -> [u8; 32] {
    let mut h = Sha256::new();
    h.update([prefix]);
    h.update(a);
    h.update(b);
    h.finalize().into()
}

pub fn hmac_sha256(key: &[u8], data: &[u8]) -> [u8; 32] {
    let mut mac = HmacSha256::new_from_slice(key).expect("hmac accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

/// HMAC-SHA256 truncated to the 160 bits OTR puts on the wire for AKE tags.
pub fn hmac_sha256_160(key: &[u8], data: &[u8]) -> [u8; 20] {
    let full = hmac_sha256(key, data);
    let mut out = [0u8; 20];
    out.copy_from_slice(&full[..20]);
    out
}

/// HMAC-SHA1 over a data message; the full 20-byte tag is used.
pub fn hmac_sha1(key: &[u8], data: &[u8]) -> [u8; 20] {
    let mut mac = HmacSha1::new_from_slice(key).expect("hmac accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

/// AES-128-CTR with OTR's counter layout: the 8-byte `top_half` forms the
/// upper half of the 16-byte counter block, the lower half starts at zero.
///
/// Counter mode is an involution, so the same call encrypts and decrypts.
pub fn aes_ctr(key: &[u8; AES_KEY_LENGTH], top_half: &[u8; COUNTER_LENGTH], data: &[u8]) -> Vec<u8> {
    let mut iv = [0u8; 16];
    iv[..COUNTER_LENGTH].copy_from_slice(top_half);
    let mut cipher = Aes128Ctr::new(key.into(), &iv.into());
    let mut out = data.to_vec();
    cipher.apply_keystream(&mut out);
    out
}

/// AES-128-CTR with an all-zero counter block, as the AKE uses for the
/// committed `gx` and the encrypted signature blobs.
pub fn aes_ctr_zero(key: &[u8; AES_KEY_LENGTH], data: &[u8]) -> Vec<u8> {
    aes_ctr(key, &[0u8; COUNTER_LENGTH], data)
}

/// Constant-time equality; differing lengths compare unequal without
/// inspecting contents.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    bool::from(a.ct_eq(b))
}
