// Copyright (c) 2026 Oleksandr Melnychenko, Ukraine
// Ecliptix Security — OTR Messaging Protocol
// Licensed under the MIT License

//! Long-term DSA authentication keys.
//!
//! OTR authenticates the AKE with plain DSA signatures over a 32-byte MAC
//! output. Key material is supplied by the host; there is no parameter or
//! key generation here. The wire format still forces parse, serialize, sign,
//! verify, and fingerprinting into the engine: the peer's public key travels
//! inside the encrypted AKE signature blobs.
//!
//! Signature halves are sized from the key's own subgroup order `q`, so
//! standard DSA-1024 keys (20-byte halves) and larger parameters both
//! round-trip.

use num_bigint::BigUint;
use num_traits::{One, Zero};

use crate::crypto::sha1;
use crate::dh;
use crate::encoding::{append_mpi, append_short, Decoder};
use crate::rand::RandomSource;
use crate::types::{OtrError, OtrResult, FINGERPRINT_LENGTH};

/// The OTR key-type tag for DSA.
pub const KEY_TYPE_DSA: u16 = 0x0000;

/// A DSA public key: parameters `(p, q, g)` and the public value `y`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey {
    p: BigUint,
    q: BigUint,
    g: BigUint,
    y: BigUint,
}

/// A DSA private key; the secret exponent is wiped on drop.
#[derive(Debug, Clone)]
pub struct PrivateKey {
    public: PublicKey,
    x: BigUint,
}

impl PublicKey {
    /// Builds a key from raw components, rejecting degenerate parameters.
    pub fn from_components(p: BigUint, q: BigUint, g: BigUint, y: BigUint) -> OtrResult<Self> {
        if p.is_zero() || q.is_zero() || g <= BigUint::one() || y.is_zero() || y >= p {
            return Err(OtrError::InvalidPublicKey);
        }
        Ok(Self { p, q, g, y })
    }

    /// Parses the OTR serialization: key type, then MPIs `p`, `q`, `g`, `y`.
    pub fn parse(dec: &mut Decoder) -> OtrResult<Self> {
        if dec.read_short()? != KEY_TYPE_DSA {
            return Err(OtrError::InvalidPublicKey);
        }
        let mut mpis = dec.read_mpis(4)?;
        let y = mpis.pop().unwrap_or_default();
        let g = mpis.pop().unwrap_or_default();
        let q = mpis.pop().unwrap_or_default();
        let p = mpis.pop().unwrap_or_default();
        Self::from_components(p, q, g, y)
    }

    pub fn serialize(&self, out: &mut Vec<u8>) {
        append_short(out, KEY_TYPE_DSA);
        append_mpi(out, &self.p);
        append_mpi(out, &self.q);
        append_mpi(out, &self.g);
        append_mpi(out, &self.y);
    }

    /// Byte width of one signature half, set by `q`.
    fn q_length(&self) -> usize {
        ((self.q.bits() + 7) / 8) as usize
    }

    /// Total signature length for this key.
    pub fn signature_length(&self) -> usize {
        2 * self.q_length()
    }

    /// Verifies an `r ‖ s` signature over `digest`.
    pub fn verify(&self, digest: &[u8], signature: &[u8]) -> OtrResult<()> {
        let qlen = self.q_length();
        if signature.len() != 2 * qlen {
            return Err(OtrError::InvalidSignature);
        }
        let r = BigUint::from_bytes_be(&signature[..qlen]);
        let s = BigUint::from_bytes_be(&signature[qlen..]);
        if r.is_zero() || r >= self.q || s.is_zero() || s >= self.q {
            return Err(OtrError::InvalidSignature);
        }

        let h = hash_to_int(digest, &self.q);
        let w = dh::mod_inverse(&s, &self.q).map_err(|_| OtrError::InvalidSignature)?;
        let u1 = (&h * &w) % &self.q;
        let u2 = (&r * &w) % &self.q;
        let v = (self.g.modpow(&u1, &self.p) * self.y.modpow(&u2, &self.p)) % &self.p % &self.q;

        if v != r {
            return Err(OtrError::InvalidSignature);
        }
        Ok(())
    }

    /// The canonical 20-byte fingerprint: SHA-1 over the serialization with
    /// the key-type tag stripped.
    pub fn fingerprint(&self) -> [u8; FINGERPRINT_LENGTH] {
        let mut ser = Vec::new();
        self.serialize(&mut ser);
        sha1(&ser[2..])
    }
}

impl PrivateKey {
    /// Builds a private key from parameters and the secret exponent,
    /// deriving `y = g^x mod p`.
    pub fn from_components(p: BigUint, q: BigUint, g: BigUint, x: BigUint) -> OtrResult<Self> {
        if x.is_zero() || x >= q {
            return Err(OtrError::InvalidPublicKey);
        }
        let y = g.modpow(&x, &p);
        let public = PublicKey::from_components(p, q, g, y)?;
        Ok(Self { public, x })
    }

    /// Parses the OTR private-key serialization: the public part followed by
    /// MPI `x`.
    pub fn parse(dec: &mut Decoder) -> OtrResult<Self> {
        let public = PublicKey::parse(dec)?;
        let x = dec.read_mpi()?;
        if x.is_zero() || x >= public.q {
            return Err(OtrError::InvalidPublicKey);
        }
        Ok(Self { public, x })
    }

    pub fn serialize(&self, out: &mut Vec<u8>) {
        self.public.serialize(out);
        append_mpi(out, &self.x);
    }

    pub fn public(&self) -> &PublicKey {
        &self.public
    }

    /// Signs `digest`, returning fixed-width `r ‖ s`.
    ///
    /// # Errors
    ///
    /// Returns [`OtrError::ShortRandomRead`] when the randomness source
    /// cannot supply a nonce.
    pub fn sign(&self, rand: &mut dyn RandomSource, digest: &[u8]) -> OtrResult<Vec<u8>> {
        let q = &self.public.q;
        let qlen = self.public.q_length();
        let h = hash_to_int(digest, q);

        loop {
            let k = dh::random_exponent(rand, qlen)? % q;
            if k.is_zero() {
                continue;
            }
            let r = self.public.g.modpow(&k, &self.public.p) % q;
            if r.is_zero() {
                continue;
            }
            let k_inv = dh::mod_inverse(&k, q)?;
            let s = (&k_inv * (&h + &self.x * &r)) % q;
            if s.is_zero() {
                continue;
            }

            let mut sig = vec![0u8; 2 * qlen];
            let r_bytes = r.to_bytes_be();
            let s_bytes = s.to_bytes_be();
            sig[qlen - r_bytes.len()..qlen].copy_from_slice(&r_bytes);
            sig[2 * qlen - s_bytes.len()..].copy_from_slice(&s_bytes);
            return Ok(sig);
        }
    }
}

impl Drop for PrivateKey {
    fn drop(&mut self) {
        dh::wipe(&mut self.x);
    }
}

/// Interprets the leftmost `q.bits()` bits of `digest` as an integer, per
/// FIPS 186 signature truncation.
fn hash_to_int(digest: &[u8], q: &BigUint) -> BigUint {
    let q_bits = q.bits() as usize;
    let digest_bits = digest.len() * 8;
    let mut n = BigUint::from_bytes_be(digest);
    if digest_bits > q_bits {
        n >>= digest_bits - q_bits;
    }
    n
}
