// Copyright (c) 2026 Oleksandr Melnychenko, Ukraine
// Ecliptix Security — OTR Messaging Protocol
// Licensed under the MIT License

//! Core library for the Ecliptix OTR (Off-the-Record) messaging engine.
//!
//! Implements the stateless building blocks of the OTR version 2/3 protocol:
//! multi-precision wire encoding, the 1536-bit MODP Diffie–Hellman group,
//! the symmetric primitives OTR composes (SHA-1, SHA-256, HMAC truncations,
//! AES-128-CTR), DSA long-term authentication keys, and the Type-Length-Value
//! records carried inside encrypted payloads.
//!
//! Everything stateful (the AKE, the data-message ratchet, and the Socialist
//! Millionaires' Protocol) lives in the `otr-conversation` crate on top of
//! these primitives.
//!
//! # Crate layout
//!
//! * [`types`] -- shared constants, error types, and secure byte containers.
//! * [`encoding`] -- word/DATA/MPI serialization and the cursor decoder.
//! * [`dh`] -- the RFC 3526 group-5 modulus, generator, and element checks.
//! * [`crypto`] -- hashes, MACs, and AES-CTR with OTR's counter layout.
//! * [`dsa`] -- long-term DSA authentication keys (parse, sign, verify).
//! * [`rand`] -- the fallible random-source collaborator.
//! * [`tlv`] -- Type-Length-Value records embedded in data messages.

/// Hashes, MACs, and AES-CTR with OTR's counter layout.
pub mod crypto;
/// The 1536-bit MODP group shared by the AKE and SMP.
pub mod dh;
/// Long-term DSA authentication keys.
pub mod dsa;
/// OTR wire primitives: words, length-prefixed DATA, MPIs.
pub mod encoding;
/// Fallible randomness collaborator.
pub mod rand;
/// Type-Length-Value records.
pub mod tlv;
/// Shared constants, error types, and secure byte containers.
pub mod types;
