// Copyright (c) 2026 Oleksandr Melnychenko, Ukraine
// Ecliptix Security — OTR Messaging Protocol
// Licensed under the MIT License

use subtle::ConstantTimeEq;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// AES-128 key size used for all symmetric encryption in OTR.
pub const AES_KEY_LENGTH: usize = 16;
/// MAC key size; OTR data-message MAC keys are raw SHA-1 outputs.
pub const MAC_KEY_LENGTH: usize = 20;
/// Data messages carry a full 20-byte HMAC-SHA1 tag.
pub const DATA_MAC_LENGTH: usize = 20;
/// AKE messages carry HMAC-SHA256 tags truncated to 160 bits.
pub const AKE_MAC_LENGTH: usize = 20;
/// Session identifier derived from the AKE shared secret.
pub const SSID_LENGTH: usize = 8;
/// Upper half of the 16-byte AES-CTR nonce carried on the wire.
pub const COUNTER_LENGTH: usize = 8;
/// SHA-1 fingerprint of a long-term public key.
pub const FINGERPRINT_LENGTH: usize = 20;
/// The AKE commit key `r`, revealed in the third handshake message.
pub const REVEAL_KEY_LENGTH: usize = 16;
/// DH private exponents are 320-bit.
pub const DH_PRIVATE_BYTES: usize = 40;
/// SMP exponents span the full 1536-bit group.
pub const SMP_EXPONENT_BYTES: usize = 192;
/// The extra symmetric key surfaced to the host on TLV 8.
pub const EXTRA_KEY_LENGTH: usize = 32;

/// Errors surfaced by the OTR engine.
///
/// Display strings are part of the protocol surface: hosts and tests match
/// on them, and the group-element variants name the offending field.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OtrError {
    #[error("wrong protocol version")]
    WrongProtocolVersion,
    #[error("invalid version")]
    InvalidVersion,
    #[error("invalid OTR message")]
    InvalidOtrMessage,
    #[error("encrypted message received without a secure channel")]
    EncryptedMessageWithNoSecureChannel,
    #[error("short read from random source")]
    ShortRandomRead,
    #[error("unexpected ourKeyID {0}")]
    UnexpectedOurKeyId(u32),
    #[error("unexpected theirKeyID {0}")]
    UnexpectedTheirKeyId(u32),
    #[error("counter regressed")]
    CounterRegressed,
    #[error("{0} is an invalid group element")]
    InvalidGroupElement(&'static str),
    #[error("{0} is not a valid zero knowledge proof")]
    InvalidZeroKnowledgeProof(&'static str),
    #[error("protocol failed: x != y")]
    SmpProtocolFailed,
    #[error("corrupt data message")]
    CorruptDataMessage,
    #[error("bad message MAC")]
    MacMismatch,
    #[error("revealed key does not match committed hash")]
    CommitHashMismatch,
    #[error("invalid signature")]
    InvalidSignature,
    #[error("invalid public key")]
    InvalidPublicKey,
    #[error("message too short")]
    ShortMessage,
    #[error("cannot authenticate without an encrypted channel")]
    CannotAuthenticate,
}

pub type OtrResult<T> = Result<T, OtrError>;

/// A 128-bit AES key, zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct AesKey(pub [u8; AES_KEY_LENGTH]);

impl std::fmt::Debug for AesKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AesKey([REDACTED])")
    }
}

/// A 160-bit MAC key, zeroized on drop.
///
/// Equality is constant time; retired instances are disclosed on the wire
/// for deniability, so the container itself is not secret forever, but it
/// must not leak early through timing.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MacKey(pub [u8; MAC_KEY_LENGTH]);

impl PartialEq for MacKey {
    fn eq(&self, other: &Self) -> bool {
        bool::from(self.0.ct_eq(&other.0))
    }
}

impl Eq for MacKey {}

impl std::fmt::Debug for MacKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MacKey([REDACTED])")
    }
}

/// Variable-length secret bytes, zeroized on drop and redacted in debug
/// output.
#[derive(Clone, Default, Zeroize, ZeroizeOnDrop)]
pub struct SecretBytes(Vec<u8>);

impl SecretBytes {
    pub fn from_slice(data: &[u8]) -> Self {
        Self(data.to_vec())
    }

    pub fn data(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for SecretBytes {
    fn from(v: Vec<u8>) -> Self {
        Self(v)
    }
}

impl AsRef<[u8]> for SecretBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for SecretBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecretBytes([REDACTED; {}])", self.0.len())
    }
}
