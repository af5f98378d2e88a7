// Copyright (c) 2026 Oleksandr Melnychenko, Ukraine
// Ecliptix Security — OTR Messaging Protocol
// Licensed under the MIT License

//! The Diffie–Hellman group shared by the AKE, the data-message ratchet, and
//! the SMP: the 1536-bit MODP group from RFC 3526 (group 5) with generator 2.
//!
//! Exponent arithmetic for the SMP works in the prime-order subgroup of
//! order `q = (p - 1) / 2`.

use lazy_static::lazy_static;
use num_bigint::{BigInt, BigUint, Sign};
use num_integer::Integer;
use num_traits::{One, Zero};

use crate::rand::RandomSource;
use crate::types::{OtrError, OtrResult};

const MODULUS_HEX: &[u8] = b"FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD1\
29024E088A67CC74020BBEA63B139B22514A08798E3404DD\
EF9519B3CD3A431B302B0A6DF25F14374FE1356D6D51C245\
E485B576625E7EC6F44C42E9A637ED6B0BFF5CB6F406B7ED\
EE386BFB5A899FA5AE9F24117C4B1FE649286651ECE45B3D\
C2007CB8A163BF0598DA48361C55D39A69163FA8FD24CF5F\
83655D23DCA3AD961C62F356208552BB9ED529077096966D\
670C354E4ABC9804F1746C08CA237327FFFFFFFFFFFFFFFF";

lazy_static! {
    /// The 1536-bit prime modulus `p`.
    pub static ref MODULUS: BigUint =
        BigUint::parse_bytes(MODULUS_HEX, 16).expect("modulus is a valid hex constant");
    /// `p - 2`, the upper bound for valid group elements.
    pub static ref MODULUS_MINUS_TWO: BigUint = &*MODULUS - 2u32;
    /// The subgroup order `q = (p - 1) / 2`.
    pub static ref ORDER: BigUint = (&*MODULUS - 1u32) >> 1usize;
    /// The generator `g1 = 2`.
    pub static ref GENERATOR: BigUint = BigUint::from(2u32);
}

/// Whether `v` lies in the accepted range `[2, p - 2]`.
pub fn is_group_element(v: &BigUint) -> bool {
    *v >= *GENERATOR && *v <= *MODULUS_MINUS_TWO
}

/// Validates a received group element, naming the field in the error.
pub fn verify_group_element(name: &'static str, v: &BigUint) -> OtrResult<()> {
    if is_group_element(v) {
        return Ok(());
    }
    Err(OtrError::InvalidGroupElement(name))
}

/// Raises the generator to `exp` modulo `p`.
pub fn power_of_generator(exp: &BigUint) -> BigUint {
    GENERATOR.modpow(exp, &MODULUS)
}

/// Draws a random exponent of `len` bytes from `rand`.
///
/// # Errors
///
/// Returns [`OtrError::ShortRandomRead`] if the source is exhausted; no
/// partial value escapes.
pub fn random_exponent(rand: &mut dyn RandomSource, len: usize) -> OtrResult<BigUint> {
    let mut buf = vec![0u8; len];
    rand.fill_bytes(&mut buf)?;
    let exp = BigUint::from_bytes_be(&buf);
    buf.iter_mut().for_each(|b| *b = 0);
    Ok(exp)
}

/// `(a * b) mod m`.
pub fn mul_mod(a: &BigUint, b: &BigUint, m: &BigUint) -> BigUint {
    (a * b) % m
}

/// `(r - a * c) mod m` with floored semantics, as the SMP proof responses
/// require.
pub fn sub_mul_mod(r: &BigUint, a: &BigUint, c: &BigUint, m: &BigUint) -> BigUint {
    let r = BigInt::from_biguint(Sign::Plus, r.clone());
    let ac = BigInt::from_biguint(Sign::Plus, a * c);
    let m = BigInt::from_biguint(Sign::Plus, m.clone());
    let d = (r - ac).mod_floor(&m);
    d.to_biguint().unwrap_or_default()
}

/// Modular inverse of `a` modulo `m`.
///
/// # Errors
///
/// Returns [`OtrError::InvalidGroupElement`] when `a` has no inverse, which
/// for a prime modulus only happens for multiples of `m`.
pub fn mod_inverse(a: &BigUint, m: &BigUint) -> OtrResult<BigUint> {
    let a = BigInt::from_biguint(Sign::Plus, a % m);
    let m = BigInt::from_biguint(Sign::Plus, m.clone());

    let (mut t, mut new_t) = (BigInt::zero(), BigInt::one());
    let (mut r, mut new_r) = (m.clone(), a);

    while !new_r.is_zero() {
        let quotient = &r / &new_r;
        let tmp_t = &t - &quotient * &new_t;
        t = std::mem::replace(&mut new_t, tmp_t);
        let tmp_r = &r - &quotient * &new_r;
        r = std::mem::replace(&mut new_r, tmp_r);
    }

    if !r.is_one() {
        return Err(OtrError::InvalidGroupElement("inverse"));
    }
    let t = t.mod_floor(&m);
    Ok(t.to_biguint().unwrap_or_default())
}

/// `(a / b) mod m` via the modular inverse of `b`.
pub fn div_mod(a: &BigUint, b: &BigUint, m: &BigUint) -> OtrResult<BigUint> {
    Ok((a * mod_inverse(b, m)?) % m)
}

/// Best-effort wipe for retired secret exponents.
///
/// `BigUint` offers no in-place scrub, so this replaces the value and lets
/// the old allocation drop, matching what the reference implementation does.
pub fn wipe(n: &mut BigUint) {
    *n = BigUint::zero();
}
