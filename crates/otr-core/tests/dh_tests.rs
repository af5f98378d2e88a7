// Copyright (c) 2026 Oleksandr Melnychenko, Ukraine
// Ecliptix Security — OTR Messaging Protocol
// Licensed under the MIT License

use num_bigint::BigUint;
use num_traits::One;

use otr_core::dh::{
    div_mod, is_group_element, mod_inverse, mul_mod, power_of_generator, random_exponent,
    sub_mul_mod, verify_group_element, GENERATOR, MODULUS, MODULUS_MINUS_TWO, ORDER,
};
use otr_core::rand::FixedRandom;
use otr_core::types::OtrError;

#[test]
fn modulus_is_the_1536_bit_group() {
    assert_eq!(MODULUS.bits(), 1536);
    assert_eq!(*GENERATOR, BigUint::from(2u32));
    assert_eq!(&*ORDER << 1usize, &*MODULUS - 1u32);
}

#[test]
fn generator_has_subgroup_order() {
    // 2 is a quadratic residue for this prime, so its order is exactly q.
    assert!(GENERATOR.modpow(&ORDER, &MODULUS).is_one());
}

#[test]
fn group_element_bounds() {
    assert!(!is_group_element(&BigUint::from(0u32)));
    assert!(!is_group_element(&BigUint::from(1u32)));
    assert!(is_group_element(&BigUint::from(2u32)));
    assert!(is_group_element(&MODULUS_MINUS_TWO));
    assert!(!is_group_element(&(&*MODULUS - 1u32)));
    assert!(!is_group_element(&MODULUS));
}

#[test]
fn verify_group_element_names_the_field() {
    let err = verify_group_element("g2a", &BigUint::one()).unwrap_err();
    assert_eq!(err, OtrError::InvalidGroupElement("g2a"));
    assert_eq!(err.to_string(), "g2a is an invalid group element");
}

#[test]
fn random_exponent_consumes_exactly_len_bytes() {
    let mut rand = FixedRandom::new(vec![0xAB; 40]);
    let exp = random_exponent(&mut rand, 40).unwrap();
    assert_eq!(exp.to_bytes_be(), vec![0xAB; 40]);
}

#[test]
fn random_exponent_short_read() {
    let mut rand = FixedRandom::new(vec![0xAB, 0xCD]);
    assert_eq!(
        random_exponent(&mut rand, 3).unwrap_err(),
        OtrError::ShortRandomRead
    );
}

#[test]
fn mod_inverse_inverts() {
    let a = BigUint::from(0xDEADBEEFu32);
    let inv = mod_inverse(&a, &MODULUS).unwrap();
    assert!(mul_mod(&a, &inv, &MODULUS).is_one());
}

#[test]
fn div_mod_undoes_mul_mod() {
    let a = power_of_generator(&BigUint::from(1234u32));
    let b = power_of_generator(&BigUint::from(9876u32));
    let product = mul_mod(&a, &b, &MODULUS);
    assert_eq!(div_mod(&product, &b, &MODULUS).unwrap(), a);
}

#[test]
fn sub_mul_mod_wraps_negative_results() {
    // r - a*c is negative here; the result must still land in [0, m).
    let r = BigUint::from(3u32);
    let a = BigUint::from(10u32);
    let c = BigUint::from(2u32);
    let m = BigUint::from(7u32);
    // 3 - 20 = -17 ≡ 4 (mod 7)
    assert_eq!(sub_mul_mod(&r, &a, &c, &m), BigUint::from(4u32));
}

#[test]
fn diffie_hellman_agreement() {
    let x = BigUint::from(0x1111_2222_3333u64);
    let y = BigUint::from(0x4444_5555_6666u64);
    let gx = power_of_generator(&x);
    let gy = power_of_generator(&y);
    assert_eq!(gy.modpow(&x, &MODULUS), gx.modpow(&y, &MODULUS));
}
